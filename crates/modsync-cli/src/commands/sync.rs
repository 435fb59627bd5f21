//! Sync command implementation

use std::sync::Arc;

use colored::Colorize;
use dialoguer::Confirm;
use modsync_core::{SyncOutcome, SyncPhase, SyncPlanSet, SyncSession};

use crate::context::{CLIENT_VERSION, Context};
use crate::error::{CliError, Result};
use crate::remote::HttpRemote;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub yes: bool,
    pub dry_run: bool,
    pub headless: bool,
}

/// Run the sync command
pub fn run_sync(ctx: Context, options: SyncOptions) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(sync(ctx, options))
}

async fn sync(mut ctx: Context, options: SyncOptions) -> Result<()> {
    if options.headless {
        ctx.settings.headless = true;
    }

    let remote = Arc::new(HttpRemote::new(
        &ctx.settings.server,
        CLIENT_VERSION,
        ctx.settings.identity.as_deref(),
    )?);
    println!("{} {}", "Checking".cyan().bold(), remote.base());

    let mut session = SyncSession::new(remote, ctx.root.clone(), ctx.settings.clone(), CLIENT_VERSION)
        .with_data_dir(ctx.layout.clone());

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling downloads");
            cancel.cancel();
        }
    });

    let check = session.check().await?;
    if session.phase() == SyncPhase::Idle {
        println!("{} Everything is up to date", "OK".green().bold());
        return Ok(());
    }

    print_plan(&check.plans);

    if options.dry_run {
        println!();
        println!("{}", "Dry run: nothing was changed".yellow());
        return Ok(());
    }

    let accepted = match session.phase() {
        SyncPhase::SilentApply => true,
        _ if options.yes => true,
        _ => confirm(&check.plans)?,
    };

    let outcome = if accepted {
        session.apply(&check.plans).await?
    } else {
        session.decline(&check.plans).await?
    };
    report(&ctx, outcome)
}

fn print_plan(plans: &SyncPlanSet) {
    println!();
    println!(
        "{} {} change(s): {} added, {} updated, {} removed",
        "Plan".bold(),
        plans.update_count(),
        plans.added_count().to_string().green(),
        plans.updated_count().to_string().yellow(),
        plans.removed_count().to_string().red(),
    );
    println!();
    println!("{}", plans.describe());
}

fn confirm(plans: &SyncPlanSet) -> Result<bool> {
    let prompt = if plans.has_optional_changes() && plans.has_enforced_changes() {
        "Apply all changes? Enforced changes are applied either way"
    } else {
        "Apply these changes?"
    };
    Ok(Confirm::new().with_prompt(prompt).default(true).interact()?)
}

fn report(ctx: &Context, outcome: SyncOutcome) -> Result<()> {
    match outcome {
        SyncOutcome::Applied {
            report,
            restart_required,
        } => {
            println!(
                "{} Downloaded {} file(s), created {} folder(s)",
                "OK".green().bold(),
                report.downloaded,
                report.directories_created,
            );
            if restart_required {
                println!(
                    "{} {} file(s) staged in {}; restart the game so the updater can apply them",
                    "Restart required".yellow().bold(),
                    report.staged,
                    ctx.layout.staging(),
                );
            }
            Ok(())
        }
        SyncOutcome::Declined => {
            println!("{}", "Optional changes skipped".dimmed());
            Ok(())
        }
        SyncOutcome::Cancelled {
            completed,
            in_place,
            failures,
        } => {
            for failure in &failures {
                eprintln!("  {} {}: {}", "x".red(), failure.path, failure.error);
            }
            Err(CliError::user(cancelled_message(completed, in_place, failures.len())))
        }
    }
}

fn cancelled_message(completed: usize, in_place: usize, failed: usize) -> String {
    let staged = completed.saturating_sub(in_place);
    format!(
        "sync stopped after {completed} download(s) with {failed} failure(s); \
         {in_place} file(s) already written in place, {staged} staged file(s) discarded"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_message_separates_live_writes_from_staging() {
        let message = cancelled_message(5, 3, 1);

        assert!(message.contains("3 file(s) already written in place"));
        assert!(message.contains("2 staged file(s) discarded"));
        assert!(message.contains("1 failure(s)"));
    }
}
