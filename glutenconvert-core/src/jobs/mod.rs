//! Batch recipe generation
//!
//! A generation job is a durable state machine (`pending -> running ->
//! completed | failed`) anchored in the database. The worker produces recipes
//! category by category; each durably written recipe advances the job's
//! counter in the same transaction, so a polling reader in any session sees
//! exact progress and never a count without a recipe behind it.

pub mod roster;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::gateway::{is_retryable_error, InferenceGateway, InferenceRequest};
use crate::types::{
    ChatMode, GeneratedRecipe, GenerationJob, RecipeCategory, CATEGORY_TARGET,
};

/// Produces the body of a single titled recipe.
///
/// Implemented by [`GatewayRecipeProducer`] in production and by scripted
/// fakes in tests.
pub trait RecipeProducer: Send + Sync + 'static {
    fn produce(
        &self,
        category: RecipeCategory,
        title: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// Producer that asks the inference service for each recipe
pub struct GatewayRecipeProducer<G: InferenceGateway> {
    gateway: G,
}

impl<G: InferenceGateway> GatewayRecipeProducer<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }
}

impl<G: InferenceGateway + Send + Sync + 'static> RecipeProducer for GatewayRecipeProducer<G> {
    async fn produce(&self, category: RecipeCategory, title: &str) -> Result<String> {
        let prompt = format!(
            "Generate a detailed gluten-free {} recipe for \"{}\". \
             Include ingredients with measurements, numbered steps, and any \
             substitution notes. Every ingredient must be gluten-free.",
            category.display_name().to_lowercase(),
            title
        );

        let reply = self
            .gateway
            .send(InferenceRequest::new(prompt, ChatMode::RecipeCreator))
            .await?;
        Ok(reply.text().to_string())
    }
}

/// Manages the lifecycle of generation jobs for all owners
pub struct GenerationJobManager<P: RecipeProducer> {
    db: Arc<Database>,
    config: GenerationConfig,
    producer: Arc<P>,
    /// Job ids with a worker task alive in this process. A job row is only
    /// ever written by one worker; this set refuses a second attach.
    live: Arc<Mutex<HashSet<String>>>,
}

impl<P: RecipeProducer> Clone for GenerationJobManager<P> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            config: self.config.clone(),
            producer: self.producer.clone(),
            live: self.live.clone(),
        }
    }
}

impl<P: RecipeProducer> GenerationJobManager<P> {
    pub fn new(db: Arc<Database>, config: GenerationConfig, producer: Arc<P>) -> Self {
        Self {
            db,
            config,
            producer,
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start a new generation job for an owner.
    ///
    /// Fails with [`Error::AlreadyRunning`] if the owner already has a
    /// non-terminal job; the unique index on non-terminal jobs makes this
    /// atomic under racing calls. The worker runs on its own task and
    /// outlives the caller.
    pub fn start(&self, owner_id: &str) -> Result<GenerationJob> {
        let job = GenerationJob::new(owner_id);
        self.db.create_job(&job)?;
        self.db.mark_job_running(&job.id)?;

        tracing::info!(
            job_id = %job.id,
            owner_id = %owner_id,
            total_target = job.total_target,
            "Generation job started"
        );

        self.register_worker(&job.id);
        self.spawn_worker(job.id.clone());

        // Reflect the transition the row just went through
        self.db
            .get_job(&job.id)?
            .ok_or_else(|| Error::InvalidInput(format!("job {} vanished", job.id)))
    }

    /// Re-attach a worker to the owner's non-terminal job, if one exists.
    ///
    /// Strictly a restart-recovery path: the durable row still says
    /// `running` but the process that was driving it is gone. A job this
    /// process already has a worker for is refused with
    /// [`Error::AlreadyRunning`], so resuming can never put two producers on
    /// one job row.
    pub fn resume(&self, owner_id: &str) -> Result<Option<GenerationJob>> {
        let Some(job) = self.db.get_active_job(owner_id)? else {
            return Ok(None);
        };

        if !self.register_worker(&job.id) {
            return Err(Error::AlreadyRunning(owner_id.to_string()));
        }

        self.db.mark_job_running(&job.id)?;
        tracing::info!(
            job_id = %job.id,
            owner_id = %owner_id,
            generated_count = job.generated_count,
            "Resuming generation job"
        );
        self.spawn_worker(job.id.clone());
        Ok(self.db.get_job(&job.id)?)
    }

    /// Read-only progress snapshot for the owner's most recent job.
    ///
    /// Safe to call from any session; polling this is how a disconnected
    /// client observes a job it did not start.
    pub fn get_progress(&self, owner_id: &str) -> Result<Option<GenerationJob>> {
        self.db.get_latest_job(owner_id)
    }

    /// Claim the job id for a worker in this process. Returns false when a
    /// worker already holds it.
    fn register_worker(&self, job_id: &str) -> bool {
        self.live.lock().unwrap().insert(job_id.to_string())
    }

    fn spawn_worker(&self, job_id: String) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_to_completion(&job_id).await;
            manager.live.lock().unwrap().remove(&job_id);
        });
    }

    /// Drive a job until it reaches a terminal state.
    ///
    /// Job-level failures are recorded on the row; partial progress is kept.
    pub async fn run_to_completion(&self, job_id: &str) {
        if let Err(e) = self.run_job(job_id).await {
            tracing::error!(job_id = %job_id, error = %e, "Generation job failed");
            if let Err(db_err) = self.db.fail_job(job_id, &e.to_string()) {
                tracing::error!(
                    job_id = %job_id,
                    error = %db_err,
                    "Failed to record job failure"
                );
            }
        }
    }

    async fn run_job(&self, job_id: &str) -> Result<()> {
        let mut consecutive_failures = 0usize;

        for category in RecipeCategory::ALL {
            // A resumed job skips what the interrupted run already wrote
            let done = self.db.count_recipes(job_id, Some(category))? as usize;
            if done >= CATEGORY_TARGET as usize {
                continue;
            }

            self.db.set_job_category(job_id, category)?;
            tracing::info!(job_id = %job_id, %category, done, "Generating category");

            for index in done..CATEGORY_TARGET as usize {
                let title = roster::recipe_title(category, index);

                match self.produce_with_retry(category, &title).await {
                    Ok(body) => {
                        let recipe = GeneratedRecipe::new(job_id, category, &title, body);
                        let count = self.db.write_recipe_and_advance(&recipe)?;
                        consecutive_failures = 0;
                        tracing::debug!(job_id = %job_id, %title, count, "Recipe written");
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        tracing::warn!(
                            job_id = %job_id,
                            %title,
                            error = %e,
                            consecutive_failures,
                            "Skipping recipe after exhausting retries"
                        );
                        if consecutive_failures >= self.config.consecutive_failure_threshold {
                            return Err(Error::Inference(format!(
                                "{} consecutive recipe failures, last: {}",
                                consecutive_failures, e
                            )));
                        }
                    }
                }

                if self.config.item_pacing_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.config.item_pacing_ms)).await;
                }
            }
        }

        self.db.complete_job(job_id)?;
        tracing::info!(job_id = %job_id, "Generation job completed");
        Ok(())
    }

    /// One item, bounded retries, each attempt under its own timeout.
    /// Permanent errors (bad credentials, malformed input) are not retried.
    async fn produce_with_retry(&self, category: RecipeCategory, title: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.config.item_retries {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(self.config.item_pacing_ms)).await;
            }

            let attempt_fut = self.producer.produce(category, title);
            match tokio::time::timeout(
                Duration::from_secs(self.config.item_timeout_secs),
                attempt_fut,
            )
            .await
            {
                Ok(Ok(body)) => return Ok(body),
                Ok(Err(e)) => {
                    if !is_retryable_error(&e) {
                        tracing::debug!(%title, attempt, error = %e, "Recipe attempt hit a permanent error");
                        return Err(e);
                    }
                    tracing::debug!(%title, attempt, error = %e, "Recipe attempt failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    last_error = Some(Error::Inference(format!(
                        "recipe attempt timed out after {}s",
                        self.config.item_timeout_secs
                    )));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Inference("recipe retries exhausted".to_string())))
    }
}
