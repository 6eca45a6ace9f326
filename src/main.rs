//! Elidune Lending - overdue loan report
//!
//! Connects to the library database, applies migrations, and logs the loans
//! currently overdue together with the fines they have accrued.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use elidune_lending::{config::AppConfig, repository::Repository, store::PgStore, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("elidune_lending={}", config.logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Elidune Lending v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    let store = PgStore::new(pool);
    store.migrate().await.context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let repository = Repository::new(std::sync::Arc::new(store));
    let services = Services::new(repository, config.loans.clone());

    let now = chrono::Utc::now();
    let rate = config.loans.daily_fine;
    let overdue = services.loans.get_overdue_loans_at(now).await?;
    for loan in &overdue {
        tracing::info!(
            loan_id = ?loan.id(),
            member = %loan.member().full_name(),
            due = %loan.due_date().format("%Y-%m-%d"),
            "{} - {} day(s) overdue, fine ${:.2}",
            loan.book().title(),
            loan.days_overdue_at(now),
            loan.calculate_fine_at(rate, now)?
        );
    }

    let total = services.loans.calculate_total_fines_at(Some(rate), now).await?;
    tracing::info!(
        "{} overdue loan(s), total fines ${:.2} at {} per day",
        overdue.len(),
        total,
        config.loans.daily_fine
    );

    Ok(())
}
