//! Server settings lookup.
//!
//! The log reader only needs a couple of `postgresql.conf` values. They
//! come either from a live server (`SHOW <name>`) or from a plain map
//! assembled elsewhere in the agent.

use std::collections::HashMap;
use std::path::PathBuf;

use postgres::{Client, NoTls};
use thiserror::Error;

/// Errors while talking to the server for settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("PostgreSQL: {0} not set")]
    EnvNotSet(String),

    #[error("PostgreSQL: {0}")]
    Connection(#[from] postgres::Error),
}

/// Anything that can answer "what is the value of setting X".
pub trait SettingsSource {
    fn setting(&mut self, name: &str) -> Option<String>;
}

impl SettingsSource for HashMap<String, String> {
    fn setting(&mut self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl SettingsSource for Client {
    fn setting(&mut self, name: &str) -> Option<String> {
        show_setting(self, name)
    }
}

/// Execute `SHOW <setting>` and return the value.
pub fn show_setting(client: &mut Client, name: &str) -> Option<String> {
    let query = format!("SHOW {}", name);
    client
        .query_one(&query as &str, &[])
        .ok()
        .and_then(|row| row.try_get::<_, String>(0).ok())
}

/// Path of the server's current stderr log file.
///
/// `pg_current_logfile()` returns a path relative to `data_directory`
/// unless `log_directory` is absolute.
pub fn current_logfile(client: &mut Client) -> Option<PathBuf> {
    let log_path = client
        .query_one("SELECT pg_current_logfile('stderr')", &[])
        .ok()
        .and_then(|row| row.try_get::<_, Option<String>>(0).ok())
        .flatten()
        .filter(|s| !s.is_empty())?;

    let log_path = PathBuf::from(log_path);
    if log_path.is_absolute() {
        return Some(log_path);
    }
    match show_setting(client, "data_directory") {
        Some(dd) => Some(PathBuf::from(dd).join(log_path)),
        None => Some(log_path),
    }
}

/// Build a libpq-style connection string from the standard `PG*` variables.
///
/// Uses `$USER` if `PGUSER` is not set.
pub fn connection_string_from_env() -> Result<String, SettingsError> {
    let user = std::env::var("PGUSER")
        .or_else(|_| std::env::var("USER"))
        .map_err(|_| SettingsError::EnvNotSet("PGUSER or USER".to_string()))?;

    let host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("PGPORT").unwrap_or_else(|_| "5432".to_string());
    let password = std::env::var("PGPASSWORD").unwrap_or_default();
    let database = std::env::var("PGDATABASE").unwrap_or_else(|_| user.clone());

    Ok(if password.is_empty() {
        format!(
            "host={} port={} user={} dbname={}",
            host, port, user, database
        )
    } else {
        format!(
            "host={} port={} user={} password={} dbname={}",
            host, port, user, password, database
        )
    })
}

/// Connect using [`connection_string_from_env`].
pub fn connect_from_env() -> Result<Client, SettingsError> {
    let connection_string = connection_string_from_env()?;
    Ok(Client::connect(&connection_string, NoTls)?)
}
