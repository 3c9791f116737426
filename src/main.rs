use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use family_budget::cli::{handle_cloud_command, CloudCommands};
use family_budget::config::{BudgetPaths, Settings};

#[derive(Parser)]
#[command(
    name = "family-budget",
    version,
    about = "Family budget tracker with cloud backup",
    long_about = "Family Budget keeps the household budget in a local datastore and \
                  backs it up weekly to cloud storage, with restore on any device \
                  signed in to the same account."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Cloud(CloudCommands),

    /// Show current configuration and paths
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("family_budget=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = BudgetPaths::new()?;

    match cli.command {
        Some(Commands::Cloud(cmd)) => handle_cloud_command(&paths, cmd).await?,
        Some(Commands::Config) => {
            let settings = Settings::load_or_create(&paths)?;
            println!("Family Budget Configuration");
            println!("===========================");
            println!("Base directory:   {}", paths.base_dir().display());
            println!("Datastore:        {}", paths.database_file().display());
            println!("Scratch space:    {}", paths.cache_dir().display());
            println!("Cloud storage:    {}", paths.remote_dir().display());
            println!("Audit log:        {}", paths.audit_log().display());
            println!();
            println!("Settings:");
            println!("  Cloud backup enabled: {}", settings.cloud_backup.enabled);
            println!(
                "  Remote call timeout:  {}s",
                settings.remote.attempt_timeout_secs
            );
            println!("  Remote call retries:  {}", settings.remote.max_retries);
        }
        None => {
            println!("Family Budget - household budgeting with cloud backup");
            println!();
            println!("Run 'family-budget --help' for usage information.");
            println!("Run 'family-budget status' to see the cloud backup status.");
        }
    }

    Ok(())
}
