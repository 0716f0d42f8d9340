//! pglogscan - one-shot PostgreSQL log reader.
//!
//! Reads the last N minutes of a PostgreSQL stderr log and prints the
//! captured auto_explain plans, autovacuum runs and deadlocks as JSON.
//!
//! Usage:
//!   pglogscan --log-file /var/log/postgresql/postgresql.log --prefix '%m [%p] '
//!   pglogscan --postgres                 # prefix and log file from the server
//!   pglogscan --postgres --span 60 --pretty

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use pglogscan::collector::log_collector::{DEFAULT_LOG_SPAN_MINUTES, LOG_LINE_PREFIX};
use pglogscan::collector::settings::{connect_from_env, current_logfile, show_setting};
use pglogscan::collector::{LogCollector, LogCollectorConfig};
use pglogscan::storage::model::LogFacts;

/// PostgreSQL log reader.
#[derive(Parser)]
#[command(
    name = "pglogscan",
    about = "Extract plans, autovacuum runs and deadlocks from a PostgreSQL log",
    version
)]
struct Args {
    /// Path to the PostgreSQL stderr log file.
    /// With --postgres, defaults to pg_current_logfile().
    #[arg(short, long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Value of log_line_prefix. Overrides the server's value with --postgres.
    #[arg(short, long, value_name = "FORMAT")]
    prefix: Option<String>,

    /// How many minutes of log to read, counting back from now.
    #[arg(short, long, default_value_t = DEFAULT_LOG_SPAN_MINUTES)]
    span: u32,

    /// Ask the server for log_line_prefix and the current log file.
    /// Uses the standard PGHOST/PGPORT/PGUSER/PGPASSWORD/PGDATABASE variables.
    #[arg(long)]
    postgres: bool,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber on stderr; stdout carries the JSON.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("pglogscan={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints a PostgreSQL connection warning to stderr with ANSI colors.
fn print_pg_warning(error: &str) {
    const RED: &str = "\x1b[1;31m";
    const YELLOW: &str = "\x1b[33m";
    const RESET: &str = "\x1b[0m";

    eprintln!("{RED}{error}{RESET}");
    eprintln!();
    eprintln!("{YELLOW}  Configure connection with environment variables:");
    eprintln!("    export PGHOST=localhost");
    eprintln!("    export PGPORT=5432");
    eprintln!("    export PGUSER=postgres");
    eprintln!("    export PGPASSWORD=secret");
    eprintln!("    export PGDATABASE=postgres{RESET}");
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let mut settings: HashMap<String, String> = HashMap::new();
    let mut log_file = args.log_file;

    if args.postgres {
        match connect_from_env() {
            Ok(mut client) => {
                if let Some(prefix) = show_setting(&mut client, LOG_LINE_PREFIX) {
                    settings.insert(LOG_LINE_PREFIX.to_string(), prefix);
                }
                if log_file.is_none() {
                    log_file = current_logfile(&mut client);
                }
            }
            Err(e) => print_pg_warning(&e.to_string()),
        }
    }
    if let Some(prefix) = args.prefix {
        settings.insert(LOG_LINE_PREFIX.to_string(), prefix);
    }

    let Some(log_file) = log_file else {
        error!("no log file: pass --log-file, or --postgres with logging_collector enabled");
        return ExitCode::FAILURE;
    };

    let mut collector = LogCollector::new(LogCollectorConfig {
        log_span_minutes: args.span,
    });
    let mut facts = LogFacts::new();
    collector.read_log(&mut settings, &log_file, &mut facts);

    info!(
        "{}: {} plans, {} autovacuums, {} deadlocks in the last {} min",
        log_file.display(),
        facts.plans.len(),
        facts.auto_vacuums.len(),
        facts.deadlocks.len(),
        collector.config().log_span_minutes
    );

    let json = if args.pretty {
        serde_json::to_string_pretty(&facts)
    } else {
        serde_json::to_string(&facts)
    };
    match json {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("failed to serialize log facts: {}", e);
            ExitCode::FAILURE
        }
    }
}
