use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use lms_server::config::AppConfig;
use lms_server::rbac::RoleSync;
use lms_server::{database, seed};

#[derive(Parser)]
#[command(name = "lms-admin", version, about = "Maintain LMS roles and capabilities")]
struct Cli {
    /// Database URL. Falls back to the server configuration.
    #[arg(long, global = true, env = "LMS__DATABASE__URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recreate the built-in roles and assign role capabilities to users.
    InitRoles {
        /// Re-assign every user, not only those without direct grants.
        #[arg(long)]
        force: bool,
    },
    /// Recreate the built-in roles and reconcile every user's role columns.
    SyncRoles,
    /// Seed the capability catalogue only.
    SeedCapabilities,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let url = match cli.database_url {
        Some(url) => url,
        None => {
            AppConfig::load()
                .context("Failed to load configuration")?
                .database
                .url
        }
    };
    let db = database::init_db(&url)
        .await
        .with_context(|| format!("Failed to open database {url}"))?;
    let inserted = seed::seed_capabilities(&db).await?;
    seed::ensure_indexes(&db).await?;

    let sync = RoleSync::new(&db);
    match cli.command {
        Command::InitRoles { force } => {
            let report = sync.init_roles(force).await?;
            println!("Roles and capabilities synchronized");
            for (role, count) in &report.roles {
                println!("- {}: {} ({} capabilities)", role.name, role.description, count);
            }
            println!(
                "Updated capabilities of {}/{} users",
                report.users_updated, report.users_total
            );
            if report.failures > 0 {
                println!("{} users could not be updated, see log", report.failures);
            }
        }
        Command::SyncRoles => {
            println!("Synchronizing roles...");
            let report = sync.sync_roles().await?;
            println!(
                "Processed {} users, updated {}",
                report.users_total, report.users_updated
            );

            println!("\nUsers per role:");
            for stats in sync.role_statistics().await? {
                println!(
                    "  - {}: {} by reference, {} by name",
                    stats.role, stats.by_reference, stats.by_name
                );
            }
            println!("\nDone.");
        }
        Command::SeedCapabilities => {
            println!("Catalogue up to date ({inserted} inserted)");
        }
    }

    Ok(())
}
