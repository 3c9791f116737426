//! Cloud backup CLI commands
//!
//! Implements CLI commands for signing in, running backups and restores, and
//! keeping the recurring backup alive in the foreground.

use std::sync::Arc;

use clap::{Subcommand, ValueEnum};

use crate::adapters::{LocalBackend, StaticConditions};
use crate::backup::{
    BackupSettingsController, BackupSettingsStore, CloudBackupState, Identity, JobScheduler,
    OperationKind, TokioJobScheduler,
};
use crate::config::BudgetPaths;
use crate::error::BudgetResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

/// Cloud backup subcommands
#[derive(Subcommand)]
pub enum CloudCommands {
    /// Show the cloud backup status
    Status,

    /// Sign in to cloud backup
    Login {
        /// Account id
        #[arg(long)]
        id: String,

        /// Account email
        #[arg(long)]
        email: String,
    },

    /// Sign out and stop the recurring backup
    Logout,

    /// Turn the premium subscription on or off
    Premium {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Back up the budget now
    Backup,

    /// Replace the local budget with the cloud backup
    Restore {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Delete the cloud backup
    Delete {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Activate the weekly background backup
    Enable,

    /// Deactivate the weekly background backup
    Disable,

    /// Keep the weekly background backup running until interrupted
    Run,

    /// Show recent cloud operations
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

/// Handle a cloud backup command
pub async fn handle_cloud_command(paths: &BudgetPaths, cmd: CloudCommands) -> BudgetResult<()> {
    let backend = LocalBackend::open(paths)?;
    let jobs = Arc::new(TokioJobScheduler::new(Arc::new(
        StaticConditions::always_ready(),
    )));
    let controller = backend.controller(jobs.clone());

    match cmd {
        CloudCommands::Status => {
            let state = backend.monitor().refresh().await;
            let settings = backend.settings.snapshot();

            println!("Cloud Backup");
            println!("============");
            println!("Status:     {}", state);
            println!(
                "Activated:  {}",
                if settings.cloud_backup.enabled {
                    "Yes"
                } else {
                    "No"
                }
            );
            println!(
                "Premium:    {}",
                if settings.cloud_backup.premium {
                    "Yes"
                } else {
                    "No"
                }
            );

            if let CloudBackupState::Activated {
                restore_available, ..
            } = state
            {
                if restore_available {
                    if let Some(remote) = backend.service.query_remote_backup_descriptor().await? {
                        println!(
                            "Cloud copy: {} ({}, {})",
                            remote.path,
                            format_size(remote.size),
                            remote.last_modified.format("%Y-%m-%d %H:%M:%S UTC")
                        );
                    }
                } else {
                    println!("Cloud copy: none");
                }
            }
            if let Some(last) = backend.audit.last_outcome(OperationKind::Backup)? {
                println!("Last backup attempt: {}", last.format_human_readable());
            }
            if backend.settings.should_reset_init_date() {
                println!();
                println!("Note: the budget was restored; restart the app to reload it.");
                backend.settings.clear_reset_init_date()?;
            }
        }

        CloudCommands::Login { id, email } => {
            backend.auth.login(Identity::new(id, email.clone()))?;
            println!("Signed in as {}", email);
        }

        CloudCommands::Logout => {
            controller.logout()?;
            println!("Signed out. Background backup stopped.");
        }

        CloudCommands::Premium { state } => {
            backend.entitlement.set_premium(state == Toggle::On)?;
            match state {
                Toggle::On => println!("Premium enabled."),
                Toggle::Off => println!("Premium disabled."),
            }
        }

        CloudCommands::Backup => {
            println!("Backing up...");
            let report = controller.backup_now().await?;
            println!("Backup complete!");
            println!("Location: {}", report.remote_path);
            println!("Size: {}", format_size(report.archive_size));
        }

        CloudCommands::Restore { force } => {
            if !force {
                match backend.service.query_remote_backup_descriptor().await? {
                    Some(remote) => {
                        println!(
                            "Cloud backup from {} ({})",
                            remote.last_modified.format("%Y-%m-%d %H:%M:%S UTC"),
                            format_size(remote.size)
                        );
                        println!();
                        println!("WARNING: This will overwrite ALL current data!");
                        println!("To proceed, run again with --force flag:");
                        println!("  family-budget restore --force");
                    }
                    None => println!("No cloud backup found."),
                }
                return Ok(());
            }

            println!("Restoring from cloud backup...");
            let report = controller.restore().await?;
            println!("Restore complete! (archive version {})", report.version);
            println!("Restart the app to load the restored budget.");
        }

        CloudCommands::Delete { force } => {
            if !force {
                println!("WARNING: This will permanently delete your cloud backup!");
                println!("To proceed, run again with --force flag:");
                println!("  family-budget delete --force");
                return Ok(());
            }

            if controller.delete().await? {
                println!("Cloud backup deleted.");
            } else {
                println!("No cloud backup found.");
            }
        }

        CloudCommands::Enable => {
            let previous = controller.activate().await?;
            println!("Cloud backup activated.");
            if let Some(remote) = previous {
                println!();
                println!(
                    "A backup from {} already exists in the cloud.",
                    remote.last_modified.format("%Y-%m-%d %H:%M:%S UTC")
                );
                println!("Restore it with: family-budget restore --force");
            }
            println!("Run 'family-budget run' to keep weekly backups going.");
        }

        CloudCommands::Disable => {
            controller.deactivate()?;
            println!("Cloud backup deactivated.");
        }

        CloudCommands::Run => run_in_foreground(&backend, &controller, jobs.as_ref()).await?,

        CloudCommands::History { limit } => {
            let entries = backend.audit.read_recent(limit)?;
            if entries.is_empty() {
                println!("No cloud operations recorded.");
                return Ok(());
            }
            for entry in entries {
                println!("{}", entry.format_human_readable());
                if let Some(detail) = entry.detail {
                    println!("    {}", detail);
                }
            }
        }
    }

    Ok(())
}

async fn run_in_foreground(
    backend: &LocalBackend,
    controller: &BackupSettingsController,
    jobs: &dyn JobScheduler,
) -> BudgetResult<()> {
    if !backend.settings.is_backup_enabled()? {
        println!("Cloud backup is not activated.");
        println!("Activate it with: family-budget enable");
        return Ok(());
    }

    controller.resume()?;
    let policy = controller.scheduler().policy();
    println!(
        "Weekly backup scheduled (first run in {}h). Press Ctrl-C to stop.",
        policy.initial_delay.as_secs() / 3600
    );

    let monitor = backend.monitor();
    let mut status = jobs.observe_status_by_tag(&policy.tag);

    tokio::select! {
        _ = monitor.run() => {}
        _ = async {
            while status.changed().await.is_ok() {
                let current = status.borrow_and_update().clone();
                for job in current {
                    println!("Job {}: {} (attempt {})", job.id, job.state, job.run_attempt);
                }
            }
        } => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            println!("Stopping.");
        }
    }

    Ok(())
}

/// Format a size in bytes to human-readable format
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
