//! PostgreSQL log facts.

use serde::{Deserialize, Serialize};

/// Output format of an auto_explain plan (`auto_explain.log_format`).
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanFormat {
    #[default]
    Text,
    Json,
    Xml,
    Yaml,
}

impl PlanFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanFormat::Text => "text",
            PlanFormat::Json => "json",
            PlanFormat::Xml => "xml",
            PlanFormat::Yaml => "yaml",
        }
    }
}

/// A query plan captured by auto_explain.
///
/// For XML and YAML plans only the format is known; `query` and `plan`
/// stay empty.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Plan {
    /// Database the query ran in (empty if the prefix has no `%d`).
    pub database: String,
    /// Role that ran the query (empty if the prefix has no `%u`).
    #[serde(rename = "user")]
    pub user_name: String,
    pub format: PlanFormat,
    /// Log time of the entry, Unix seconds.
    pub at: i64,
    pub query: String,
    /// Plan body; JSON text for [`PlanFormat::Json`], indented text otherwise.
    pub plan: String,
}

/// A completed autovacuum run.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct AutoVacuum {
    /// Log time of the entry, Unix seconds.
    pub at: i64,
    /// Table as logged, e.g. "mydb.public.orders".
    pub table_name: String,
    /// Elapsed wall-clock time in seconds.
    pub elapsed: f64,
}

/// A deadlock report.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Deadlock {
    /// Log time of the entry, Unix seconds.
    pub at: i64,
    /// DETAIL text with tabs removed, newline-terminated.
    pub detail: String,
}

/// One fact extracted from a log entry.
#[derive(Clone, Debug, PartialEq)]
pub enum LogFact {
    Plan(Plan),
    AutoVacuum(AutoVacuum),
    Deadlock(Deadlock),
}

/// Facts gathered from the log during one collection cycle.
///
/// Append-only; each list keeps log order.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct LogFacts {
    pub plans: Vec<Plan>,
    #[serde(rename = "autovacuums")]
    pub auto_vacuums: Vec<AutoVacuum>,
    pub deadlocks: Vec<Deadlock>,
}

impl LogFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fact: LogFact) {
        match fact {
            LogFact::Plan(p) => self.plans.push(p),
            LogFact::AutoVacuum(av) => self.auto_vacuums.push(av),
            LogFact::Deadlock(d) => self.deadlocks.push(d),
        }
    }

    /// Append all facts of `other`, keeping order.
    pub fn extend(&mut self, other: LogFacts) {
        self.plans.extend(other.plans);
        self.auto_vacuums.extend(other.auto_vacuums);
        self.deadlocks.extend(other.deadlocks);
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty() && self.auto_vacuums.is_empty() && self.deadlocks.is_empty()
    }

    /// Total number of facts.
    pub fn len(&self) -> usize {
        self.plans.len() + self.auto_vacuums.len() + self.deadlocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_routes_by_kind() {
        let mut facts = LogFacts::new();
        assert!(facts.is_empty());

        facts.push(LogFact::Deadlock(Deadlock {
            at: 1,
            detail: "x\n".to_string(),
        }));
        facts.push(LogFact::AutoVacuum(AutoVacuum {
            at: 2,
            table_name: "public.t".to_string(),
            elapsed: 0.5,
        }));

        assert_eq!(facts.len(), 2);
        assert_eq!(facts.deadlocks[0].at, 1);
        assert_eq!(facts.auto_vacuums[0].table_name, "public.t");
        assert!(facts.plans.is_empty());
    }

    #[test]
    fn test_extend_keeps_order() {
        let mut a = LogFacts::new();
        a.push(LogFact::Deadlock(Deadlock { at: 1, ..Default::default() }));
        let mut b = LogFacts::new();
        b.push(LogFact::Deadlock(Deadlock { at: 2, ..Default::default() }));
        a.extend(b);
        let ats: Vec<i64> = a.deadlocks.iter().map(|d| d.at).collect();
        assert_eq!(ats, vec![1, 2]);
    }

    #[test]
    fn test_plan_json_field_names() {
        let plan = Plan {
            database: "mydb".to_string(),
            user_name: "alice".to_string(),
            format: PlanFormat::Json,
            at: 10,
            query: "SELECT 1".to_string(),
            plan: "{}".to_string(),
        };
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["user"], "alice");
        assert_eq!(value["format"], "json");
        assert_eq!(value["at"], 10);
    }
}
