//! Turns complete log entries into facts.
//!
//! Rules are tried in order and the first whose predicate matches owns the
//! entry, even when its extractor then finds nothing usable.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::{trace, warn};

use super::entry::LogEntry;
use crate::storage::model::{AutoVacuum, Deadlock, LogFact, Plan, PlanFormat};

// auto_explain header; groups pick the output format: 1 json, 2 xml, 3 yaml, 4 text
static AE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^duration: [0-9]+\.[0-9]+ ms  plan:\n[ \t]+(\{[ \t]*\n)?(<explain xml.*\n)?(Query Text: ".*"\n)?(Query Text: [^"].*\n)?"#,
    )
    .unwrap()
});
static AE_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+Query Text: (.*)$").unwrap());
static AE_PLAN_ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"cost=\d+.*rows=\d").unwrap());
static AV_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"automatic (aggressive )?vacuum (to prevent wraparound )?of table "([^"]+)": index"#,
    )
    .unwrap()
});
static AV_ELAPSED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"elapsed: ([0-9.]+) s").unwrap());

const DEADLOCK_LINE: &str = "deadlock detected";

struct Rule {
    name: &'static str,
    matches: fn(&LogEntry) -> bool,
    extract: fn(&LogEntry) -> Option<LogFact>,
}

const RULES: &[Rule] = &[
    Rule {
        name: "auto_explain",
        matches: is_auto_explain,
        extract: extract_plan,
    },
    Rule {
        name: "autovacuum",
        matches: is_autovacuum,
        extract: extract_autovacuum,
    },
    Rule {
        name: "deadlock",
        matches: is_deadlock,
        extract: extract_deadlock,
    },
];

fn is_auto_explain(entry: &LogEntry) -> bool {
    AE_START.is_match(&entry.line)
}

fn is_autovacuum(entry: &LogEntry) -> bool {
    AV_START.is_match(&entry.line)
}

fn is_deadlock(entry: &LogEntry) -> bool {
    entry.line == DEADLOCK_LINE
}

/// Extract at most one fact from `entry`.
pub fn classify(entry: &LogEntry) -> Option<LogFact> {
    let rule = RULES.iter().find(|rule| (rule.matches)(entry))?;
    let fact = (rule.extract)(entry);
    if fact.is_none() {
        trace!(rule = rule.name, "entry matched but yielded no fact");
    }
    fact
}

/// Output format announced by the auto_explain header, if recognizable.
fn explain_format(caps: &Captures<'_>) -> Option<PlanFormat> {
    [
        (1, PlanFormat::Json),
        (2, PlanFormat::Xml),
        (3, PlanFormat::Yaml),
        (4, PlanFormat::Text),
    ]
    .into_iter()
    .find(|(group, _)| caps.get(*group).is_some_and(|m| !m.is_empty()))
    .map(|(_, format)| format)
}

fn extract_plan(entry: &LogEntry) -> Option<LogFact> {
    let caps = AE_START.captures(&entry.line)?;
    let mut plan = Plan {
        database: entry.database.clone(),
        user_name: entry.user.clone(),
        format: PlanFormat::Text,
        at: entry.at.timestamp(),
        ..Default::default()
    };

    match explain_format(&caps) {
        Some(PlanFormat::Json) => {
            plan.format = PlanFormat::Json;
            json_plan(&mut plan, &entry.line);
        }
        Some(format @ (PlanFormat::Xml | PlanFormat::Yaml)) => {
            plan.format = format;
            warn!(
                "{} format auto_explain output not supported yet",
                format.as_str()
            );
        }
        Some(PlanFormat::Text) => text_plan(&mut plan, &entry.line),
        None => {}
    }

    Some(LogFact::Plan(plan))
}

/// Body is a JSON object after the header line; `Query Text` is moved out
/// into `plan.query`.
fn json_plan(plan: &mut Plan, line: &str) {
    let Some((_, body)) = line.split_once('\n') else {
        return;
    };
    let mut obj: Map<String, Value> = match serde_json::from_str(body) {
        Ok(obj) => obj,
        Err(e) => {
            trace!(error = %e, "unparsable json plan");
            return;
        }
    };
    if let Some(Value::String(query)) = obj.remove("Query Text") {
        plan.query = query;
    }
    if let Ok(body) = serde_json::to_string(&obj) {
        plan.plan = body;
    }
}

/// `Query Text:` starts the query; the first plan row switches to the plan.
fn text_plan(plan: &mut Plan, line: &str) {
    enum Target {
        Nothing,
        Query,
        Plan,
    }
    let mut target = Target::Nothing;

    for l in line.split('\n') {
        if let Some(caps) = AE_QUERY.captures(l) {
            plan.query = caps[1].to_string();
            target = Target::Query;
            continue;
        }
        if AE_PLAN_ROW.is_match(l) {
            target = Target::Plan;
        }
        match target {
            Target::Nothing => {}
            Target::Query => {
                plan.query.push('\n');
                plan.query.push_str(l);
            }
            Target::Plan => {
                plan.plan.push_str(l);
                plan.plan.push('\n');
            }
        }
    }
}

fn extract_autovacuum(entry: &LogEntry) -> Option<LogFact> {
    let table = AV_START.captures(&entry.line)?.get(3)?.as_str().to_string();
    let caps = std::iter::once(entry.line.as_str())
        .chain(entry.extra.iter().map(|e| e.line.as_str()))
        .find_map(|text| AV_ELAPSED.captures(text))?;
    let elapsed = caps[1].parse::<f64>().unwrap_or_else(|_| {
        trace!(text = &caps[1], "bad autovacuum elapsed value");
        0.0
    });

    Some(LogFact::AutoVacuum(AutoVacuum {
        at: entry.at.timestamp(),
        table_name: table,
        elapsed,
    }))
}

/// Only the first DETAIL part is used.
fn extract_deadlock(entry: &LogEntry) -> Option<LogFact> {
    let mut detail = entry.get("DETAIL").unwrap_or_default().replace('\t', "");
    detail.push('\n');
    Some(LogFact::Deadlock(Deadlock {
        at: entry.at.timestamp(),
        detail,
    }))
}
