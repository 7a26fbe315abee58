use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

mod campaign;
mod compose;
mod db;
mod error;
mod mailer;
mod models;
mod report;
mod schedule;

use compose::{ContentGenerator, OrgProfile};
use mailer::{LogMailer, Mailer, SmtpConfig, SmtpMailer};
use models::NewParticipant;
use schedule::{ScheduleArgs, ScheduleMode};

#[derive(Parser)]
#[command(name = "survey-campaign")]
#[command(about = "Schedule and send survey invitation campaigns", long_about = None)]
struct Cli {
    /// SQLite database holding the participant table
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite://survey_campaign.db?mode=rwc",
        global = true
    )]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo participants
    Seed,
    /// Add a single participant
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, value_parser = clap::value_parser!(i64).range(18..=100))]
        age: i64,
    },
    /// Append participants from a CSV file with name, email and age columns
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show every participant and their status
    List,
    /// Set a participant's status back to pending
    Reset {
        #[arg(long)]
        email: String,
    },
    /// Write a markdown overview of participants and statuses
    Report {
        #[arg(long, default_value = "campaign-report.md")]
        out: PathBuf,
    },
    /// Check that the configured SMTP server accepts connections
    CheckMail,
    /// Print the invitation a participant would receive
    Preview {
        #[arg(long)]
        email: String,
        #[command(flatten)]
        org: OrgProfile,
    },
    /// Send the campaign now or on a schedule
    Launch {
        #[command(flatten)]
        org: OrgProfile,
        #[command(flatten)]
        schedule: ScheduleArgs,
        /// Log messages instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
}

fn build_mailer(dry_run: bool) -> anyhow::Result<Box<dyn Mailer>> {
    if dry_run {
        return Ok(Box::new(LogMailer));
    }
    let config = SmtpConfig::from_env()
        .context("SMTP_HOST must be set to send email (or pass --dry-run)")?;
    let mailer = SmtpMailer::new(&config).context("invalid SMTP configuration")?;
    Ok(Box::new(mailer))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let pool = db::connect(&cli.database_url)
        .await
        .with_context(|| format!("failed to open database {}", cli.database_url))?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let count = db::seed(&pool).await?;
            println!("Seeded {count} participants.");
        }
        Commands::Add { name, email, age } => {
            let participant = db::add_participant(&pool, &NewParticipant { name, email, age })
                .await
                .context("failed to add participant")?;
            println!("Participant {} added.", participant.email);
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!("Added {inserted} participants from {}.", csv.display());
        }
        Commands::List => {
            let participants = db::list_participants(&pool).await?;
            if participants.is_empty() {
                println!("No participants added yet.");
                return Ok(());
            }
            for participant in &participants {
                println!("{}", report::overview_line(participant));
            }
        }
        Commands::Reset { email } => {
            db::reset_status(&pool, &email)
                .await
                .context("failed to reset status")?;
            println!("Status reset to 'pending' for {email}.");
        }
        Commands::Report { out } => {
            let participants = db::list_participants(&pool).await?;
            let counts = db::status_counts(&pool).await?;
            std::fs::write(&out, report::build_report(&participants, &counts))?;
            println!("Report written to {}.", out.display());
        }
        Commands::CheckMail => {
            let mailer = build_mailer(false)?;
            if mailer.check_connection().await? {
                println!("SMTP server accepted the connection.");
            } else {
                anyhow::bail!("SMTP server refused the connection");
            }
        }
        Commands::Preview { email, org } => {
            let participant = db::find_by_email(&pool, &email)
                .await?
                .with_context(|| format!("no participant with email {email}"))?;
            let generator = compose::generator_from_env()?;
            let body = generator.generate(&participant.name, &org).await?;
            println!("To: {}\nSubject: {}\n\n{}", participant.email, org.subject, body);
        }
        Commands::Launch {
            org,
            schedule,
            dry_run,
        } => {
            let mode = schedule.into_mode(db::now().date())?;
            let mailer = build_mailer(dry_run)?;
            let generator = compose::generator_from_env()?;

            if mode == ScheduleMode::Immediate {
                let summary =
                    campaign::launch_campaign(&pool, mailer.as_ref(), generator.as_ref(), &org)
                        .await?;
                if summary.total == 0 {
                    println!("No participants found!");
                    return Ok(());
                }
                for outcome in summary.outcomes.iter().filter(|o| o.error.is_some()) {
                    let status = outcome
                        .status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unchanged".to_string());
                    println!(
                        "Failed for {} (status {status}): {}",
                        outcome.email,
                        outcome.error.as_deref().unwrap_or_default()
                    );
                }
                println!("{}", summary.headline());
            } else {
                let (scheduler, marked) =
                    schedule::register_schedule(&pool, mode, db::now()).await?;
                println!("Scheduled {marked} participants.");
                let runs = schedule::run_scheduler(
                    &pool,
                    mailer.as_ref(),
                    generator.as_ref(),
                    &org,
                    scheduler,
                )
                .await?;
                println!("Scheduler finished after {runs} campaign runs.");
            }
        }
    }

    Ok(())
}
