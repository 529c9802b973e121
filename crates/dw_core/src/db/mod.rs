use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::{codes, AppError};

const MIGRATION_0001: (&str, &str) = (
    "0001_init.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0001_init.sql"
    )),
);

/// How long a connection waits on a lock held by another connection before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn migrations() -> Vec<(&'static str, &'static str)> {
    vec![MIGRATION_0001]
}

pub fn open(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path).map_err(|e| {
        AppError::new(codes::DB_OPEN_FAILED, "Failed to open SQLite database")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(|e| {
        AppError::new(codes::DB_OPEN_FAILED, "Failed to configure busy timeout")
            .with_details(e.to_string())
    })?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(|e| {
        AppError::new(
            codes::DB_OPEN_FAILED,
            "Failed to open in-memory SQLite database",
        )
        .with_details(e.to_string())
    })
}

pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    // Track migrations by name, applying each exactly once, in deterministic order.
    conn.execute_batch(
        r#"
      CREATE TABLE IF NOT EXISTS _migrations (
        name TEXT PRIMARY KEY NOT NULL,
        applied_at TEXT NOT NULL
      );
    "#,
    )
    .map_err(|e| {
        AppError::new(
            codes::DB_MIGRATION_FAILED,
            "Failed to ensure migrations table exists",
        )
        .with_details(e.to_string())
    })?;

    let applied: HashSet<String> = {
        let mut stmt = conn.prepare("SELECT name FROM _migrations").map_err(|e| {
            AppError::new(codes::DB_QUERY_FAILED, "Failed to query applied migrations")
                .with_details(e.to_string())
        })?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| {
                AppError::new(codes::DB_QUERY_FAILED, "Failed to read applied migrations")
                    .with_details(e.to_string())
            })?;

        let mut set = HashSet::new();
        for r in rows {
            let name = r.map_err(|e| {
                AppError::new(
                    codes::DB_QUERY_FAILED,
                    "Failed to read applied migration row",
                )
                .with_details(e.to_string())
            })?;
            set.insert(name);
        }
        set
    };

    for (name, sql) in migrations() {
        if applied.contains(name) {
            continue;
        }

        let tx = conn.transaction().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to start migration transaction")
                .with_details(e.to_string())
        })?;

        tx.execute_batch(sql).map_err(|e| {
            AppError::new(codes::DB_MIGRATION_FAILED, format!("Migration {name} failed"))
                .with_details(e.to_string())
        })?;

        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [name],
        )
        .map_err(|e| {
            AppError::new(
                codes::DB_MIGRATION_FAILED,
                format!("Failed to record migration {name}"),
            )
            .with_details(e.to_string())
        })?;

        tx.commit().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to commit migration transaction")
                .with_details(e.to_string())
        })?;

        tracing::debug!(migration = name, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::OptionalExtension;

    #[test]
    fn migrations_create_expected_tables() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='incidents'")
            .unwrap();
        let name: Option<String> = stmt.query_row([], |row| row.get(0)).optional().unwrap();
        assert_eq!(name.as_deref(), Some("incidents"));
    }

    #[test]
    fn migrations_are_applied_once() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("first");
        migrate(&mut conn).expect("second");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn storage_rejects_second_open_incident_for_target() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");

        let insert = r#"
          INSERT INTO incidents(id, target_id, target_name, target_address, status, opened_at, reported_by)
          VALUES (?1, 't1', 'api', 'https://api.example.com', 'OPEN', '2024-03-05T10:00:00.000000Z', 'u1')
        "#;
        conn.execute(insert, ["a"]).expect("first open");
        let err = conn.execute(insert, ["b"]).unwrap_err();
        assert_eq!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
    }
}
