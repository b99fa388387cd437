use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use eventplanner_server::config::Config;
use eventplanner_server::jobs;
use eventplanner_server::mail;
use eventplanner_server::repository::Repositories;
use eventplanner_server::routes::create_routes;
use eventplanner_server::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "eventplanner-server", about = "Event planning API and batch jobs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Email attendees of events starting in two days
    SendReminders,
    /// Ask attendees of events that ended yesterday for a rating
    SendRatingRequests,
    /// Mark events whose auto-complete time has passed as completed
    AutoCompleteEvents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations run successfully");

    let repos = Repositories::postgres(pool);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(repos, &config).await,
        Command::SendReminders => {
            let mailer = mail::from_config(&config.mail)?;
            let report = jobs::send_event_reminders(&repos, mailer.as_ref(), Utc::now()).await?;
            println!(
                "Sent {} reminder(s), skipped {}, failed {}",
                report.sent, report.skipped, report.failed
            );
            Ok(())
        }
        Command::SendRatingRequests => {
            let mailer = mail::from_config(&config.mail)?;
            let report =
                jobs::send_rating_requests(&repos, mailer.as_ref(), &config.site_url, Utc::now())
                    .await?;
            println!(
                "Sent {} rating request(s), skipped {}, failed {}",
                report.sent, report.skipped, report.failed
            );
            Ok(())
        }
        Command::AutoCompleteEvents => {
            let completed = jobs::auto_complete_events(repos.events.as_ref(), Utc::now()).await?;
            println!("Successfully auto-completed {} event(s)", completed.len());
            Ok(())
        }
    }
}

async fn serve(repos: Repositories, config: &Config) -> anyhow::Result<()> {
    let state = AppState::build(repos, &config.media)
        .await
        .context("No usable media directory")?;
    let app = create_routes(state, config);

    tracing::info!("Server running at http://{}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind address")?;

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
