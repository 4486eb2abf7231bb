mod config;

use clap::{Parser, Subcommand};
use config::{KogniaConfig, API_KEY_ENV};
use kognia_agent::{LlmClient, WebResearchTools};
use kognia_orchestrator::{
    Dispatcher, JobExecutor, JobLifecycle, JobOutcome, SpecialistRegistry,
};
use kognia_store::{JobStore, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "kognia", about = "Kognia: brand and market intelligence jobs")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "kognia.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a request as a pending job
    Submit {
        /// Submitting user
        #[arg(long)]
        user: Uuid,
        /// Session to attach the job to (a new one when omitted)
        #[arg(long)]
        session: Option<Uuid>,
        /// Build on the report of this job instead of the session's latest one
        #[arg(long)]
        grounding_job: Option<Uuid>,
        /// Free-text request
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Show a job's status, report or failure code
    Status {
        /// Job id
        job: Uuid,
    },
    /// Request cancellation of a job
    Cancel {
        /// Job id
        job: Uuid,
    },
    /// Print the newest report of a session
    Report {
        /// Session id
        session: Uuid,
    },
    /// Process pending jobs
    Work {
        /// Keep polling for new jobs until Ctrl-C
        #[arg(long)]
        watch: bool,
        /// Seconds between polls in watch mode
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
        /// Pending jobs listed per round
        #[arg(long, default_value_t = 16)]
        batch: usize,
    },
}

fn init_tracing(config: &KogniaConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (mut config, found) = KogniaConfig::load(&cli.config).await?;
    config.apply_env(std::env::var(API_KEY_ENV).ok());
    init_tracing(&config);
    if !found {
        warn!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    tokio::fs::create_dir_all(&config.data_dir).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to create data dir '{}': {e}",
            config.data_dir.display()
        )
    })?;
    let store: Arc<dyn JobStore> = Arc::new(SqliteStore::open(config.database_path()).await?);

    match cli.command {
        Commands::Submit {
            user,
            session,
            grounding_job,
            prompt,
        } => {
            let session = session.unwrap_or_else(Uuid::new_v4);
            let mut prompt = prompt.join(" ");
            if let Some(reference) = grounding_job {
                prompt.push_str(&format!(" job:{reference}"));
            }
            let lifecycle = JobLifecycle::new(store);
            let job = lifecycle.submit(user, session, &prompt).await?;
            println!("job:     {}", job.id);
            println!("session: {}", job.session_id);
            println!("status:  {}", job.status);
        }
        Commands::Status { job } => {
            let view = store.job_view(job).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Cancel { job } => {
            let lifecycle = JobLifecycle::new(store);
            if lifecycle.cancel(job).await? {
                println!("Cancellation requested for {job}");
            } else {
                println!("Job {job} already finished");
            }
        }
        Commands::Report { session } => match store.latest_report_for_session(session).await? {
            Some(report) => println!("{}", report.content),
            None => println!("No report for session {session}"),
        },
        Commands::Work {
            watch,
            interval_secs,
            batch,
        } => {
            if config.model.api_key.is_empty() {
                warn!("No model API key configured; set {API_KEY_ENV} or model.api_key");
            }
            if config.research.search_url.is_none() {
                info!("No research.search_url configured; Research reads only URLs named in prompts");
            }
            let client = LlmClient::new(config.model.clone());
            let registry = SpecialistRegistry::with_llm(client.clone())
                .with_research_tools(client, WebResearchTools::new(config.research.clone()));
            let executor = JobExecutor::new(store.clone(), registry, config.orchestrator)?;
            let dispatcher = Dispatcher::new(store, executor.clone(), batch);

            if watch {
                info!(interval_secs, "Watching for pending jobs");
                let processed = dispatcher
                    .watch(Duration::from_secs(interval_secs), async {
                        let _ = tokio::signal::ctrl_c().await;
                    })
                    .await?;
                println!("Processed {processed} job(s)");
            } else {
                let outcomes = dispatcher.drain().await?;
                for outcome in &outcomes {
                    print_outcome(outcome);
                }
                println!("Processed {} job(s)", outcomes.len());
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&executor.monitor().to_json().await)?
            );
        }
    }

    Ok(())
}

fn print_outcome(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed {
            job_id,
            report,
            turns,
        } => match report {
            Some(_) => println!("{job_id}  completed  (report)"),
            None => println!("{job_id}  completed  ({turns} dialogue turns)"),
        },
        JobOutcome::Failed { job_id, reason } => {
            println!("{job_id}  failed     {}", reason.code());
        }
        JobOutcome::NotClaimed { job_id } => println!("{job_id}  skipped    (claimed elsewhere)"),
    }
}
