//! Status command implementation

use colored::Colorize;
use serde_json::json;

use crate::context::Context;
use crate::error::Result;

/// Run the status command
pub fn run_status(ctx: &Context, as_json: bool) -> Result<()> {
    let state = ctx.state();
    let previous = state.load_previous()?;
    let removals = state.removal_manifest()?;
    let staging = state.staging_exists();

    if as_json {
        let paths: serde_json::Map<String, serde_json::Value> = previous
            .iter()
            .map(|(path, catalog)| (path.to_string(), json!(catalog.file_count())))
            .collect();
        let status = json!({
            "root": ctx.root.as_str(),
            "dataDir": ctx.layout.path().as_str(),
            "server": ctx.settings.server,
            "identity": ctx.settings.identity,
            "headless": ctx.settings.headless,
            "syncedPaths": paths,
            "stagingPending": staging,
            "pendingRemovals": removals,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "ModSync Status".bold());
    println!();
    println!("{}:     {}", "Root".dimmed(), ctx.root);
    println!("{}:     {}", "Data".dimmed(), ctx.layout.path());
    println!("{}:   {}", "Server".dimmed(), ctx.settings.server.cyan());
    if let Some(identity) = &ctx.settings.identity {
        println!("{}: {}", "Identity".dimmed(), identity.cyan());
    }
    println!();

    println!("{}:", "Last Sync".bold());
    if previous.is_empty() {
        println!("  {} (use {} to sync)", "Never".dimmed(), "modsync sync".cyan());
    } else {
        for (path, catalog) in previous.iter() {
            println!("  {} {} ({} files)", "+".green(), path.cyan(), catalog.file_count());
        }
    }
    println!();

    println!("{}:", "Pending Update".bold());
    if !staging && removals.is_empty() {
        println!("  {}", "None".dimmed());
    } else {
        if staging {
            println!("  {} staged files in {}", "!".yellow(), ctx.layout.staging());
        }
        if !removals.is_empty() {
            println!("  {} {} file(s) queued for removal", "!".yellow(), removals.len());
        }
        println!("  (restart the game to apply, or {} to discard)", "modsync rollback".cyan());
    }

    Ok(())
}
