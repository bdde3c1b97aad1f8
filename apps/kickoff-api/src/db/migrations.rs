//! Embedded schema migrations, shared by `kickoff-migrate` and the
//! database-backed test suite.

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("failed to connect to database: {0}")]
    Connect(#[from] diesel::ConnectionError),
    #[error("failed to run migrations: {0}")]
    Run(Box<dyn std::error::Error + Send + Sync>),
}

/// Apply every pending migration, returning the versions applied.
///
/// Blocking: call it from a plain thread or `spawn_blocking`.
pub fn run_pending(database_url: &str) -> Result<Vec<String>, MigrationError> {
    let mut conn = PgConnection::establish(database_url)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(MigrationError::Run)?;
    Ok(applied.iter().map(|v| v.to_string()).collect())
}

/// Point a connection string at the `<name>_test` database, keeping any
/// query string. Already-suffixed URLs are returned unchanged.
pub fn with_test_db_suffix(database_url: &str) -> String {
    let mut parts = database_url.splitn(2, '?');
    let base = parts.next().unwrap_or(database_url);
    let query = parts.next();

    let mut base_parts = base.rsplitn(2, '/');
    let db_name = base_parts.next().unwrap_or("");
    let prefix = base_parts.next().unwrap_or("");

    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    let mut updated = format!("{prefix}/{db_name}_test");
    if let Some(query) = query {
        updated.push('?');
        updated.push_str(query);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::with_test_db_suffix;

    #[test]
    fn appends_suffix_once_and_keeps_query() {
        assert_eq!(
            with_test_db_suffix("postgres://u:p@localhost/kickoff?sslmode=disable"),
            "postgres://u:p@localhost/kickoff_test?sslmode=disable"
        );
        assert_eq!(
            with_test_db_suffix("postgres://localhost/kickoff_test"),
            "postgres://localhost/kickoff_test"
        );
    }
}
