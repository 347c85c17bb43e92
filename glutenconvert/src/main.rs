//! glutenconvert - gluten-free cooking assistant
//!
//! Interactive chat, ingredient label scanning, and batch recipe generation
//! on top of glutenconvert-core.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use glutenconvert_core::chat::{ChatSessionStore, ModeController, SERVING_PRESETS};
use glutenconvert_core::entitlement::{AccessSource, EntitlementGate};
use glutenconvert_core::jobs::{GatewayRecipeProducer, GenerationJobManager};
use glutenconvert_core::{
    capture, Actor, ChatMode, Config, Database, Error, HttpInferenceGateway, JobStatus,
};

#[derive(Parser)]
#[command(name = "glutenconvert")]
#[command(about = "Gluten-free cooking assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat session
    Chat {
        /// Session scope (a user id, or a local anonymous name)
        #[arg(short, long, default_value = "local")]
        scope: String,
    },
    /// Analyze an ingredient label photo
    Scan {
        /// Path to the label image (jpg, png, webp, heic)
        image: PathBuf,

        #[arg(short, long, default_value = "local")]
        scope: String,
    },
    /// Start (or resume) the batch recipe generation job
    Generate {
        /// Owner the job belongs to
        #[arg(short, long)]
        owner: String,

        /// Contact address for the purchase fallback check
        #[arg(long)]
        email: Option<String>,

        /// Re-attach a worker to a job left running by a previous process.
        /// Only for recovery after a crash; a job this process is already
        /// working on must not get a second worker.
        #[arg(long)]
        resume: bool,
    },
    /// Show generation progress for an owner
    Progress {
        #[arg(short, long)]
        owner: String,

        /// Keep polling until the job reaches a terminal state
        #[arg(long)]
        watch: bool,
    },
    /// Check generation access for a user
    Access {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        email: Option<String>,
    },
    /// Clear a session's chat log
    Reset {
        #[arg(short, long, default_value = "local")]
        scope: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = glutenconvert_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    let db_path = Config::database_path();
    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;
    tracing::info!(path = %db_path.display(), "Database ready");

    match cli.command {
        Command::Chat { scope } => run_chat(db, &config, scope).await,
        Command::Scan { image, scope } => run_scan(db, &config, &image, scope).await,
        Command::Generate {
            owner,
            email,
            resume,
        } => run_generate(db, &config, owner, email, resume).await,
        Command::Progress { owner, watch } => run_progress(db, &config, &owner, watch).await,
        Command::Access { user, email } => run_access(db, user, email),
        Command::Reset { scope } => {
            ChatSessionStore::new(db, scope).clear()?;
            println!("Chat log cleared.");
            Ok(())
        }
    }
}

fn controller(
    db: Arc<Database>,
    config: &Config,
    scope: String,
) -> Result<ModeController<HttpInferenceGateway>> {
    let gateway = HttpInferenceGateway::new(config.inference.clone())
        .context("failed to create inference gateway")?;
    let store = ChatSessionStore::new(db, scope);
    store.ensure_welcome()?;
    Ok(ModeController::new(store, gateway, config.chat.clone()))
}

async fn run_chat(db: Arc<Database>, config: &Config, scope: String) -> Result<()> {
    let mut ctl = controller(db, config, scope)?;

    for message in ctl.store().all()? {
        print_message(&message);
    }
    println!();
    println!("Modes: general, recipe-creator, conversion, nutrition, ingredient-scan");
    println!("Commands: /mode <name>, /serves <n>, /reset, /quit");
    println!();

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('/') {
            let mut parts = rest.splitn(2, ' ');
            match (parts.next().unwrap_or(""), parts.next()) {
                ("quit", _) | ("exit", _) => break,
                ("reset", _) => {
                    ctl.reset_to_general()?;
                    println!("Session reset.");
                }
                ("mode", Some(name)) => match ChatMode::from_str(name.trim()) {
                    Ok(mode) => {
                        ctl.enter_mode(mode)?;
                        if let Some(last) = ctl.store().all()?.last() {
                            print_message(last);
                        }
                        if ctl.awaiting_serving_size() {
                            println!(
                                "(pick a serving size with /serves: presets {:?} or any positive number)",
                                SERVING_PRESETS
                            );
                        }
                    }
                    Err(e) => println!("{}", e),
                },
                ("serves", Some(n)) => {
                    match n.trim().parse::<u32>().map_err(|_| {
                        Error::InvalidInput("serving size must be a positive integer".to_string())
                    }) {
                        Ok(n) => match ctl.resolve_serving_size(n) {
                            Ok(()) => {
                                // Give the delayed follow-up time to land
                                tokio::time::sleep(Duration::from_millis(
                                    config.chat.follow_up_delay_ms + 100,
                                ))
                                .await;
                                if let Some(last) = ctl.store().all()?.last() {
                                    print_message(last);
                                }
                            }
                            Err(e) => println!("{}", e),
                        },
                        Err(e) => println!("{}", e),
                    }
                }
                _ => println!("Unknown command."),
            }
            continue;
        }

        if ctl.awaiting_serving_size() {
            println!("Please pick a serving size first: /serves <n>");
            continue;
        }

        match ctl.submit_user_message(line).await {
            Ok(reply) => print_message(&reply),
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}

async fn run_scan(
    db: Arc<Database>,
    config: &Config,
    image_path: &PathBuf,
    scope: String,
) -> Result<()> {
    let image = capture::from_file(image_path).context("failed to read image")?;

    let mut ctl = controller(db, config, scope)?;
    ctl.enter_mode(ChatMode::IngredientScan)?;

    println!("Analyzing {}...", image_path.display());
    let reply = ctl.submit_image(&image).await?;
    println!();
    println!("{}", reply.text);

    if let Some(analysis) = reply.ingredient_analysis() {
        println!();
        if let Some(rating) = &analysis.safety_rating {
            println!("Safety rating: {}", rating);
        }
        if !analysis.allergen_warnings.is_empty() {
            println!("Allergens: {}", analysis.allergen_warnings.join(", "));
        }
    }

    Ok(())
}

async fn run_generate(
    db: Arc<Database>,
    config: &Config,
    owner: String,
    email: Option<String>,
    resume: bool,
) -> Result<()> {
    let gate = EntitlementGate::new(db.clone());
    let mut actor = Actor::new(&owner);
    if let Some(email) = email {
        actor = actor.with_email(email);
    }
    if !gate.can_use_generation(&actor)? {
        println!("Generation requires the owner role, an Annual subscription, or a generator purchase.");
        return Ok(());
    }

    let gateway = HttpInferenceGateway::new(config.inference.clone())
        .context("failed to create inference gateway")?;
    let producer = Arc::new(GatewayRecipeProducer::new(gateway));
    let manager = GenerationJobManager::new(db.clone(), config.generation.clone(), producer);

    let job = if resume {
        match manager.resume(&owner) {
            Ok(Some(job)) => job,
            Ok(None) => {
                println!("No interrupted job to resume for {}.", owner);
                return Ok(());
            }
            Err(Error::AlreadyRunning(_)) => {
                println!("That job already has a worker; watching its progress instead.");
                db.get_latest_job(&owner)?
                    .context("active job disappeared before it could be watched")?
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        match manager.start(&owner) {
            Ok(job) => job,
            Err(Error::AlreadyRunning(_)) => {
                // The existing worker keeps the job; just follow along
                println!("A job is already running for this owner; watching its progress.");
                db.get_latest_job(&owner)?
                    .context("active job disappeared before it could be watched")?
            }
            Err(e) => return Err(e.into()),
        }
    };

    watch_job(&db, &owner, job.total_target).await?;
    Ok(())
}

async fn run_progress(db: Arc<Database>, _config: &Config, owner: &str, watch: bool) -> Result<()> {
    let Some(job) = db.get_latest_job(owner)? else {
        println!("No generation job found for {}.", owner);
        return Ok(());
    };

    if watch && !job.status.is_terminal() {
        watch_job(&db, owner, job.total_target).await?;
    } else {
        print_job(&job);
    }
    Ok(())
}

async fn watch_job(db: &Arc<Database>, owner: &str, total_target: i64) -> Result<()> {
    let bar = ProgressBar::new(total_target as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.green} {pos}/{len} {msg}")
            .context("invalid progress template")?,
    );

    loop {
        let Some(job) = db.get_latest_job(owner)? else {
            break;
        };

        bar.set_position(job.generated_count as u64);
        if let Some(category) = job.current_category {
            bar.set_message(category.display_name().to_string());
        }

        if job.status.is_terminal() {
            bar.finish_and_clear();
            print_job(&job);
            break;
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Ok(())
}

fn run_access(db: Arc<Database>, user: String, email: Option<String>) -> Result<()> {
    let gate = EntitlementGate::new(db);
    let mut actor = Actor::new(user);
    if let Some(email) = email {
        actor = actor.with_email(email);
    }

    match gate.evaluate(&actor)? {
        Some(AccessSource::Owner) => println!("Access granted (owner role)."),
        Some(AccessSource::AnnualSubscription) => println!("Access granted (Annual subscription)."),
        Some(AccessSource::Purchase) => println!("Access granted (generator purchase)."),
        None => println!("Access denied."),
    }
    Ok(())
}

fn print_job(job: &glutenconvert_core::GenerationJob) {
    println!(
        "Job {}: {} ({}/{} recipes)",
        job.id,
        job.status.as_str(),
        job.generated_count,
        job.total_target
    );
    if let Some(category) = job.current_category {
        println!("  current category: {}", category.display_name());
    }
    if let Some(completed_at) = job.completed_at {
        println!("  completed at: {}", completed_at.to_rfc3339());
    }
    if job.status == JobStatus::Failed {
        if let Some(message) = &job.error_message {
            println!("  error: {}", message);
        }
    }
}

fn print_message(message: &glutenconvert_core::Message) {
    let who = if message.is_from_user { "you" } else { "assistant" };
    println!("[{}] {}", who, message.text);
    if let Some(recipe) = &message.recipe_ref {
        println!();
        println!("{}", recipe);
    }
}
