// Copyright 2023 Remi Bernotavicius

use diesel::prelude::Connection as _;
use diesel::RunQueryDsl as _;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::error::Error;
use std::path::Path;

pub mod models;
pub mod schema;

pub type Connection = diesel::sqlite::SqliteConnection;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

diesel::define_sql_function! {
    /// Full Unicode lowercasing; sqlite's own `lower()` only folds ASCII.
    fn unicode_lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text;
}

pub fn establish_connection(
    path: impl AsRef<Path>,
) -> Result<Connection, Box<dyn Error + Send + Sync + 'static>> {
    let path = path.as_ref();
    let url = path
        .to_str()
        .ok_or_else(|| format!("database path {path:?} is not valid UTF-8"))?;
    let mut connection = Connection::establish(url)?;
    // sqlite leaves foreign keys off unless asked per connection
    diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut connection)?;
    unicode_lower_utils::register_impl(&mut connection, |s: String| s.to_lowercase())?;
    let applied = connection.run_pending_migrations(MIGRATIONS)?;
    for version in applied {
        log::info!("applied migration {version}");
    }
    Ok(connection)
}

#[cfg(test)]
pub fn test_connection() -> Connection {
    establish_connection(":memory:").unwrap()
}

#[test]
fn migrations() {
    let mut conn = test_connection();
    assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());

    conn.revert_all_migrations(MIGRATIONS).unwrap();
    assert!(conn.has_pending_migration(MIGRATIONS).unwrap());

    conn.run_pending_migrations(MIGRATIONS).unwrap();
    assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());
}

#[test]
fn unicode_lower_folds_cyrillic() {
    let lowered: String = diesel::select(unicode_lower("АБРИКОС Flour"))
        .get_result(&mut test_connection())
        .unwrap();
    assert_eq!(lowered, "абрикос flour");
}

#[test]
fn migrations_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let database_path = dir.path().join("database.sqlite");

    drop(establish_connection(&database_path).unwrap());
    assert!(database_path.exists());

    // Reopening must not try to apply anything twice.
    let mut conn = establish_connection(&database_path).unwrap();
    assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());
}
