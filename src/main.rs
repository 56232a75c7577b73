use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use addusers::config::AppConfig;
use addusers::db;
use addusers::users::{
    dto::NewUserInput,
    error::ProvisionError,
    password::CredentialHasher,
    services::{ProvisioningWorkflow, TracingObserver},
};

#[derive(Parser)]
#[command(name = "addusers", version, about = "Add a user to the accounts database")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,

    /// Database url, overrides the configuration file
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Run schema migrations before saving
    #[arg(long)]
    migrate: bool,

    /// Email
    #[arg(short, long)]
    mail: Option<String>,

    /// Password
    #[arg(short, long)]
    password: Option<String>,

    /// First name
    #[arg(short, long)]
    firstname: Option<String>,

    /// Surname
    #[arg(short, long)]
    surname: Option<String>,

    /// Group ID
    #[arg(short, long, allow_hyphen_values = true)]
    group: Option<String>,
}

impl Args {
    fn user_input(&self) -> NewUserInput {
        NewUserInput {
            email: self.mail.clone(),
            password: self.password.clone(),
            first_name: self.firstname.clone(),
            last_name: self.surname.clone(),
            group: self.group.clone(),
        }
    }
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("config", &self.config)
            .field("migrate", &self.migrate)
            .field("user", &self.user_input())
            .finish()
    }
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "addusers=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Logs the row that already holds `email`. Lookup failures only lose the detail.
async fn report_existing(db: &db::Database, email: &str) {
    match db.user_repository().find_by_email(email).await {
        Ok(Some(existing)) => tracing::warn!(
            existing_id = existing.id,
            group_id = ?existing.group_id,
            created_at = %existing.created_at,
            "user already exists"
        ),
        Ok(None) => {}
        Err(e) => tracing::debug!(error = %e, "could not look up existing user"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    tracing::debug!(?args, "parsed arguments");

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    }
    .with_overrides(args.database_url.clone(), args.migrate);

    // All arguments are required; fail before touching the database.
    let input = args.user_input();
    let missing = input.missing_fields();
    if !missing.is_empty() {
        return Err(ProvisionError::Validation(missing).into());
    }

    let hasher = CredentialHasher::new(&config.hashing)?;

    let db = db::connect(&config.database).await?;
    if config.database.migrate {
        db.migrate().await.context("migrate database")?;
        tracing::info!(dialect = %db.dialect(), "database migrated");
    }

    let workflow = ProvisioningWorkflow::new(
        hasher,
        db.user_repository(),
        config.provisioning.group_assignment,
    );
    let user = match workflow.provision(input, &TracingObserver).await {
        Ok(user) => user,
        Err(ProvisionError::DuplicateEmail { email }) => {
            report_existing(&db, &email).await;
            return Err(ProvisionError::DuplicateEmail { email }.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("created user {} {}", user.id, user.email);
    Ok(())
}
