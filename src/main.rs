use std::path::PathBuf;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use student_dashboard::api::{self, AppState};
use student_dashboard::database::Database;
use student_dashboard::model::{SplitParams, DEFAULT_SEED, DEFAULT_TEST_FRACTION};
use student_dashboard::pipeline;
use student_dashboard::remote::RemoteEndpoint;

#[derive(Parser)]
#[command(name = "student-dashboard")]
#[command(about = "Student performance prediction dashboard", long_about = None)]
struct Cli {
    /// SQLite connection string for accounts and saved records
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:student_performance.db", global = true)]
    database_url: String,

    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST, global = true)]
    bcrypt_cost: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web dashboard
    Serve {
        #[arg(long, env = "BIND_HOST", default_value = "127.0.0.1")]
        host: String,
        #[arg(long, env = "BIND_PORT", default_value_t = 8080)]
        port: u16,
        /// Optional model-serving URL for /api/predict/remote
        #[arg(long, env = "PREDICTION_ENDPOINT")]
        prediction_endpoint: Option<String>,
        /// Minutes a login stays valid
        #[arg(long, env = "SESSION_TTL_MINUTES", default_value_t = 480)]
        session_ttl_minutes: u64,
    },
    /// Create the tables and indexes
    InitDb,
    /// Run the prediction pipeline on a CSV file and print the log
    Predict {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = DEFAULT_TEST_FRACTION)]
        test_size: f64,
        #[arg(long, default_value_t = DEFAULT_SEED)]
        random_state: u64,
        #[arg(long, default_value = "cli")]
        user: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(
    database_url: &str,
    bcrypt_cost: u32,
    host: String,
    port: u16,
    prediction_endpoint: Option<String>,
    session_ttl: Duration,
) -> anyhow::Result<()> {
    let db = match Database::connect(database_url).await {
        Ok(db) => Some(db),
        Err(err) => {
            warn!(error = %err, "starting without a database; accounts and saved records are unavailable");
            None
        }
    };
    let remote = prediction_endpoint.map(RemoteEndpoint::new);
    if let Some(endpoint) = &remote {
        info!(url = endpoint.url(), "remote prediction endpoint configured");
    }

    let state = web::Data::new(AppState::new(db, bcrypt_cost, remote).with_session_ttl(session_ttl));

    info!("Starting Student Performance Dashboard on http://{host}:{port}");
    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind((host.as_str(), port))
        .with_context(|| format!("failed to bind {host}:{port}"))?
        .run()
        .await
        .context("server terminated with an error")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            prediction_endpoint,
            session_ttl_minutes,
        } => {
            serve(
                &cli.database_url,
                cli.bcrypt_cost,
                host,
                port,
                prediction_endpoint,
                Duration::from_secs(session_ttl_minutes.saturating_mul(60)),
            )
            .await?
        }
        Commands::InitDb => {
            let db = Database::connect(&cli.database_url)
                .await
                .context("failed to connect to the database")?;
            db.create_indexes().await.context("failed to create indexes")?;
            let stats = db.stats().await?;
            println!("Schema ready.");
            println!(
                "Users: {}, student records: {}, courses: {}",
                stats.users, stats.students, stats.courses
            );
        }
        Commands::Predict {
            csv,
            test_size,
            random_state,
            user,
        } => {
            let params = SplitParams {
                test_fraction: test_size,
                seed: random_state,
            };
            let log = pipeline::log_for_file(&csv, params, &user, Local::now().naive_local())
                .with_context(|| format!("failed to predict from {}", csv.display()))?;
            print!("{log}");
        }
    }

    Ok(())
}
