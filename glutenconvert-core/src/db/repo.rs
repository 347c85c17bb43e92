//! Database repository layer
//!
//! Provides query and insert operations for messages, generation jobs,
//! generated recipes, and entitlement records.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

/// Database handle (single connection behind a mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Message operations
    // ============================================

    /// Append a message to a scope's log.
    ///
    /// The sequence number is assigned inside the insert, so ordering is
    /// insertion order even with interleaved writers on the same handle.
    pub fn append_message(&self, scope: &str, message: &Message) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO messages (id, scope, seq, ts, is_from_user, text, mode,
                                  attached_image, recipe_ref)
            VALUES (?1, ?2,
                    (SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE scope = ?2),
                    ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                message.id,
                scope,
                message.ts.to_rfc3339(),
                message.is_from_user,
                message.text,
                message.mode.map(|m| m.as_str()),
                message.attached_image,
                message.recipe_ref,
            ],
        )?;
        Ok(())
    }

    /// Full ordered log for a scope
    pub fn get_messages(&self, scope: &str) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM messages WHERE scope = ? ORDER BY seq ASC")?;
        let rows = stmt.query_map([scope], Self::row_to_message)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Number of messages in a scope's log
    pub fn count_messages(&self, scope: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count =
            conn.query_row("SELECT COUNT(*) FROM messages WHERE scope = ?", [scope], |r| {
                r.get(0)
            })?;
        Ok(count)
    }

    /// Delete a scope's entire log
    pub fn clear_messages(&self, scope: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM messages WHERE scope = ?", [scope])?;
        Ok(())
    }

    fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
        let ts_str: String = row.get("ts")?;
        let mode_str: Option<String> = row.get("mode")?;

        Ok(Message {
            id: row.get("id")?,
            text: row.get("text")?,
            is_from_user: row.get("is_from_user")?,
            ts: DateTime::parse_from_rfc3339(&ts_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            mode: mode_str.and_then(|s| ChatMode::from_str(&s).ok()),
            attached_image: row.get("attached_image")?,
            recipe_ref: row.get("recipe_ref")?,
        })
    }

    // ============================================
    // Generation job operations
    // ============================================

    /// Create a job record.
    ///
    /// The partial unique index on non-terminal jobs makes this the atomic
    /// at-most-one-job check: a second insert while one is pending or running
    /// fails with a constraint violation, surfaced as [`Error::AlreadyRunning`].
    pub fn create_job(&self, job: &GenerationJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            r#"
            INSERT INTO generation_jobs (id, owner_id, status, generated_count,
                                         total_target, current_category, started_at,
                                         completed_at, error_message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                job.id,
                job.owner_id,
                job.status.as_str(),
                job.generated_count,
                job.total_target,
                job.current_category.map(|c| c.as_str()),
                job.started_at.to_rfc3339(),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.error_message,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::AlreadyRunning(job.owner_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a job by id
    pub fn get_job(&self, job_id: &str) -> Result<Option<GenerationJob>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM generation_jobs WHERE id = ?",
            [job_id],
            Self::row_to_job,
        )
        .optional()
        .map_err(Error::from)
    }

    /// The owner's non-terminal job, if one exists
    pub fn get_active_job(&self, owner_id: &str) -> Result<Option<GenerationJob>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM generation_jobs
             WHERE owner_id = ? AND status IN ('pending', 'running')",
            [owner_id],
            Self::row_to_job,
        )
        .optional()
        .map_err(Error::from)
    }

    /// The owner's most recently started job, terminal or not
    pub fn get_latest_job(&self, owner_id: &str) -> Result<Option<GenerationJob>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM generation_jobs
             WHERE owner_id = ?
             ORDER BY started_at DESC LIMIT 1",
            [owner_id],
            Self::row_to_job,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Transition a pending job to running. Guarded so status only moves forward.
    pub fn mark_job_running(&self, job_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE generation_jobs SET status = 'running' WHERE id = ? AND status = 'pending'",
            [job_id],
        )?;
        Ok(())
    }

    /// Record the category currently in progress
    pub fn set_job_category(&self, job_id: &str, category: RecipeCategory) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE generation_jobs SET current_category = ?1
             WHERE id = ?2 AND status = 'running'",
            params![category.as_str(), job_id],
        )?;
        Ok(())
    }

    /// Durably write one recipe and advance the job's counter in the same
    /// transaction. The counter never moves without a written recipe, and a
    /// written recipe is never invisible to a polling reader.
    pub fn write_recipe_and_advance(&self, recipe: &GeneratedRecipe) -> Result<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO generated_recipes (id, job_id, category, title, body, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                recipe.id,
                recipe.job_id,
                recipe.category.as_str(),
                recipe.title,
                recipe.body,
                recipe.created_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "UPDATE generation_jobs SET generated_count = generated_count + 1
             WHERE id = ? AND status = 'running'",
            [&recipe.job_id],
        )?;

        let count: i64 = tx.query_row(
            "SELECT generated_count FROM generation_jobs WHERE id = ?",
            [&recipe.job_id],
            |r| r.get(0),
        )?;

        tx.commit()?;
        Ok(count)
    }

    /// Transition a running job to completed
    pub fn complete_job(&self, job_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE generation_jobs
             SET status = 'completed', completed_at = ?1, current_category = NULL
             WHERE id = ?2 AND status = 'running'",
            params![Utc::now().to_rfc3339(), job_id],
        )?;
        Ok(())
    }

    /// Transition a running job to failed, keeping its partial progress
    pub fn fail_job(&self, job_id: &str, error_message: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE generation_jobs
             SET status = 'failed', error_message = ?1
             WHERE id = ?2 AND status IN ('pending', 'running')",
            params![error_message, job_id],
        )?;
        Ok(())
    }

    /// Count recipes written by a job, optionally per category
    pub fn count_recipes(&self, job_id: &str, category: Option<RecipeCategory>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = match category {
            Some(c) => conn.query_row(
                "SELECT COUNT(*) FROM generated_recipes WHERE job_id = ?1 AND category = ?2",
                params![job_id, c.as_str()],
                |r| r.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM generated_recipes WHERE job_id = ?",
                [job_id],
                |r| r.get(0),
            )?,
        };
        Ok(count)
    }

    fn row_to_job(row: &Row) -> rusqlite::Result<GenerationJob> {
        let status_str: String = row.get("status")?;
        let category_str: Option<String> = row.get("current_category")?;
        let started_str: String = row.get("started_at")?;
        let completed_str: Option<String> = row.get("completed_at")?;

        Ok(GenerationJob {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            status: JobStatus::from_str(&status_str).unwrap_or(JobStatus::Failed),
            generated_count: row.get("generated_count")?,
            total_target: row.get("total_target")?,
            current_category: category_str.and_then(|s| RecipeCategory::from_str(&s).ok()),
            started_at: DateTime::parse_from_rfc3339(&started_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            completed_at: completed_str
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            error_message: row.get("error_message")?,
        })
    }

    // ============================================
    // Entitlement record operations
    // ============================================

    /// Insert or update a role record
    pub fn upsert_role(&self, role: &RoleRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO user_roles (user_id, is_owner)
            VALUES (?1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET is_owner = excluded.is_owner
            "#,
            params![role.user_id, role.is_owner],
        )?;
        Ok(())
    }

    /// Get a role record by user id
    pub fn get_role(&self, user_id: &str) -> Result<Option<RoleRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id, is_owner FROM user_roles WHERE user_id = ?",
            [user_id],
            |row| {
                Ok(RoleRecord {
                    user_id: row.get(0)?,
                    is_owner: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Insert or update a subscription record
    pub fn upsert_subscription(&self, sub: &SubscriptionRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO subscriptions (user_id, tier, renews_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                tier = excluded.tier,
                renews_at = excluded.renews_at
            "#,
            params![sub.user_id, sub.tier, sub.renews_at.map(|t| t.to_rfc3339())],
        )?;
        Ok(())
    }

    /// Get a subscription record by user id
    pub fn get_subscription(&self, user_id: &str) -> Result<Option<SubscriptionRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id, tier, renews_at FROM subscriptions WHERE user_id = ?",
            [user_id],
            |row| {
                let renews_str: Option<String> = row.get(2)?;
                Ok(SubscriptionRecord {
                    user_id: row.get(0)?,
                    tier: row.get(1)?,
                    renews_at: renews_str
                        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Insert or update a purchase record
    pub fn upsert_purchase(&self, purchase: &PurchaseRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO generator_purchases (user_id, email, paid, purchased_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                email = excluded.email,
                paid = excluded.paid,
                purchased_at = excluded.purchased_at
            "#,
            params![
                purchase.user_id,
                purchase.email,
                purchase.paid,
                purchase.purchased_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a purchase record by user id
    pub fn get_purchase_by_user(&self, user_id: &str) -> Result<Option<PurchaseRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id, email, paid, purchased_at FROM generator_purchases WHERE user_id = ?",
            [user_id],
            Self::row_to_purchase,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Get a purchase record by contact address (fallback match)
    pub fn get_purchase_by_email(&self, email: &str) -> Result<Option<PurchaseRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id, email, paid, purchased_at FROM generator_purchases WHERE email = ?",
            [email],
            Self::row_to_purchase,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_purchase(row: &Row) -> rusqlite::Result<PurchaseRecord> {
        let purchased_str: String = row.get(3)?;
        Ok(PurchaseRecord {
            user_id: row.get(0)?,
            email: row.get(1)?,
            paid: row.get(2)?,
            purchased_at: DateTime::parse_from_rfc3339(&purchased_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_message_ordering_is_insertion_order() {
        let db = test_db();

        for i in 0..5 {
            db.append_message("scope-a", &Message::user(format!("msg {}", i)))
                .unwrap();
        }

        let messages = db.get_messages("scope-a").unwrap();
        assert_eq!(messages.len(), 5);
        for (i, m) in messages.iter().enumerate() {
            assert_eq!(m.text, format!("msg {}", i));
        }
    }

    #[test]
    fn test_message_scopes_are_isolated() {
        let db = test_db();

        db.append_message("scope-a", &Message::user("for a")).unwrap();
        db.append_message("scope-b", &Message::user("for b")).unwrap();

        assert_eq!(db.count_messages("scope-a").unwrap(), 1);
        db.clear_messages("scope-a").unwrap();
        assert_eq!(db.count_messages("scope-a").unwrap(), 0);
        assert_eq!(db.count_messages("scope-b").unwrap(), 1);
    }

    #[test]
    fn test_message_fields_round_trip() {
        let db = test_db();

        let msg = Message::assistant_in_mode("analysis text", ChatMode::IngredientScan)
            .with_image("file:///tmp/label.jpg");
        db.append_message("s", &msg).unwrap();

        let stored = &db.get_messages("s").unwrap()[0];
        assert_eq!(stored.id, msg.id);
        assert_eq!(stored.mode, Some(ChatMode::IngredientScan));
        assert_eq!(stored.attached_image.as_deref(), Some("file:///tmp/label.jpg"));
    }

    #[test]
    fn test_second_active_job_rejected() {
        let db = test_db();

        let job = GenerationJob::new("owner-1");
        db.create_job(&job).unwrap();

        let second = db.create_job(&GenerationJob::new("owner-1"));
        assert!(matches!(second, Err(Error::AlreadyRunning(_))));

        // A different owner is unaffected
        db.create_job(&GenerationJob::new("owner-2")).unwrap();
    }

    #[test]
    fn test_new_job_allowed_after_terminal() {
        let db = test_db();

        let job = GenerationJob::new("owner-1");
        db.create_job(&job).unwrap();
        db.mark_job_running(&job.id).unwrap();
        db.fail_job(&job.id, "service down").unwrap();

        db.create_job(&GenerationJob::new("owner-1")).unwrap();
    }

    #[test]
    fn test_recipe_write_advances_counter() {
        let db = test_db();

        let job = GenerationJob::new("owner-1");
        db.create_job(&job).unwrap();
        db.mark_job_running(&job.id).unwrap();
        db.set_job_category(&job.id, RecipeCategory::Breakfast).unwrap();

        let recipe = GeneratedRecipe::new(
            &job.id,
            RecipeCategory::Breakfast,
            "Gluten-Free Blueberry Pancakes",
            "mix, cook, serve",
        );
        let count = db.write_recipe_and_advance(&recipe).unwrap();
        assert_eq!(count, 1);

        let stored = db.get_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.generated_count, 1);
        assert_eq!(stored.current_category, Some(RecipeCategory::Breakfast));
        assert_eq!(db.count_recipes(&job.id, None).unwrap(), 1);
    }

    #[test]
    fn test_status_only_moves_forward() {
        let db = test_db();

        let job = GenerationJob::new("owner-1");
        db.create_job(&job).unwrap();
        db.mark_job_running(&job.id).unwrap();
        db.complete_job(&job.id).unwrap();

        // A late failure report cannot reopen a completed job
        db.fail_job(&job.id, "too late").unwrap();
        let stored = db.get_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.completed_at.is_some());
        assert!(stored.error_message.is_none());
    }

    #[test]
    fn test_purchase_lookup_by_email() {
        let db = test_db();

        db.upsert_purchase(&PurchaseRecord {
            user_id: "u1".to_string(),
            email: Some("cook@example.com".to_string()),
            paid: true,
            purchased_at: Utc::now(),
        })
        .unwrap();

        let by_email = db.get_purchase_by_email("cook@example.com").unwrap();
        assert!(by_email.is_some());
        assert!(by_email.unwrap().paid);
        assert!(db.get_purchase_by_email("nobody@example.com").unwrap().is_none());
    }
}
