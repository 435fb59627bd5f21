//! Rollback command implementation

use colored::Colorize;
use modsync_core::SyncLock;

use crate::context::Context;
use crate::error::Result;

/// Run the rollback command
pub fn run_rollback(ctx: &Context) -> Result<()> {
    if !ctx.layout.path().exists() {
        println!("{}", "Nothing to roll back".dimmed());
        return Ok(());
    }

    let _lock = SyncLock::acquire(&ctx.layout)?;
    if ctx.state().rollback()? {
        println!("{} Discarded the pending update", "OK".green().bold());
    } else {
        println!("{}", "Nothing to roll back".dimmed());
    }
    Ok(())
}
