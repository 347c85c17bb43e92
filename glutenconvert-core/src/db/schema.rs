//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: chat log, generation jobs, generated recipes
    r#"
    -- ============================================
    -- Chat log (append-only, scope-keyed)
    -- ============================================

    CREATE TABLE IF NOT EXISTS messages (
        id               TEXT PRIMARY KEY,
        scope            TEXT NOT NULL,
        seq              INTEGER NOT NULL,
        ts               DATETIME NOT NULL,
        is_from_user     INTEGER NOT NULL,
        text             TEXT NOT NULL,
        mode             TEXT,
        attached_image   TEXT,
        recipe_ref       TEXT,

        UNIQUE(scope, seq)
    );

    CREATE INDEX IF NOT EXISTS idx_messages_scope ON messages(scope, seq);

    -- ============================================
    -- Batch generation
    -- ============================================

    CREATE TABLE IF NOT EXISTS generation_jobs (
        id               TEXT PRIMARY KEY,
        owner_id         TEXT NOT NULL,
        status           TEXT NOT NULL,      -- 'pending', 'running', 'completed', 'failed'
        generated_count  INTEGER NOT NULL DEFAULT 0,
        total_target     INTEGER NOT NULL,
        current_category TEXT,               -- 'breakfast', 'snack', 'lunch', 'dinner'
        started_at       DATETIME NOT NULL,
        completed_at     DATETIME,
        error_message    TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_jobs_owner ON generation_jobs(owner_id, started_at DESC);

    -- At most one non-terminal job per owner; two racing starts cannot
    -- both satisfy this index.
    CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_one_active
        ON generation_jobs(owner_id)
        WHERE status IN ('pending', 'running');

    CREATE TABLE IF NOT EXISTS generated_recipes (
        id               TEXT PRIMARY KEY,
        job_id           TEXT NOT NULL REFERENCES generation_jobs(id),
        category         TEXT NOT NULL,
        title            TEXT NOT NULL,
        body             TEXT NOT NULL,
        created_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_recipes_job ON generated_recipes(job_id);
    CREATE INDEX IF NOT EXISTS idx_recipes_category ON generated_recipes(category);
    "#,
    // Version 2: entitlement source records (role, subscription, purchase)
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id          TEXT PRIMARY KEY,
        is_owner         INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS subscriptions (
        user_id          TEXT PRIMARY KEY,
        tier             TEXT,
        renews_at        DATETIME
    );

    CREATE TABLE IF NOT EXISTS generator_purchases (
        user_id          TEXT PRIMARY KEY,
        email            TEXT,
        paid             INTEGER NOT NULL DEFAULT 0,
        purchased_at     DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_purchases_email ON generator_purchases(email);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "messages",
            "generation_jobs",
            "generated_recipes",
            "user_roles",
            "subscriptions",
            "generator_purchases",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_one_active_job_index() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO generation_jobs (id, owner_id, status, total_target, started_at)
             VALUES ('j1', 'u1', 'running', 400, '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        // A second non-terminal job for the same owner violates the index
        let second = conn.execute(
            "INSERT INTO generation_jobs (id, owner_id, status, total_target, started_at)
             VALUES ('j2', 'u1', 'pending', 400, '2026-01-01T00:00:01Z')",
            [],
        );
        assert!(second.is_err());

        // A terminal job does not
        conn.execute(
            "INSERT INTO generation_jobs (id, owner_id, status, total_target, started_at)
             VALUES ('j3', 'u1', 'failed', 400, '2026-01-01T00:00:02Z')",
            [],
        )
        .unwrap();
    }
}
