//! Status command - inspect the latest published run
//!
//! Reads the state index (the consumer-visible commit point) and the latest
//! delta from the output store. This is the same cheap poll a downstream
//! client performs, so it doubles as a connectivity check.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use crate::config::{load_settings, resolve_token};
use crate::models::{DeltaDoc, StateIndex};
use crate::store::{GithubStore, SnapshotStore};

pub fn run(config_path: &Path, token: Option<String>) -> Result<()> {
    let settings = load_settings(config_path)
        .with_context(|| format!("cannot load config from {}", config_path.display()))?;
    let token = resolve_token(token)?;

    let output = GithubStore::new(
        &token,
        &settings.output.owner,
        &settings.output.repo,
        &settings.output.branch,
    );

    println!("\nnetpulse status\n");
    println!(
        "  output: {}",
        style(format!(
            "{}/{} ({})",
            settings.output.owner, settings.output.repo, settings.output.branch
        ))
        .cyan()
    );

    let index_blob = output
        .read_optional(&settings.output.state_index)
        .with_context(|| format!("cannot read {}", settings.output.state_index))?;
    let Some(index_blob) = index_blob else {
        println!(
            "  {} no published runs yet. Run {}",
            style("[--]").dim(),
            style("netpulse run --commit").cyan()
        );
        return Ok(());
    };

    let index: StateIndex = serde_json::from_str(&index_blob.content)
        .with_context(|| format!("{} is not a valid state index", settings.output.state_index))?;

    println!("  {} latest run: {}", style("[OK]").green(), style(&index.latest_run_id).cyan());
    println!("      snapshot revision: {}", style(&index.latest_snapshot_id).dim());
    println!("      events: {}", style(index.latest_event_id).cyan());

    // The latest delta is optional detail; a missing or stale file is worth
    // surfacing but not fatal.
    match output.read_optional(&settings.output.changes_latest) {
        Ok(Some(blob)) => match serde_json::from_str::<DeltaDoc>(&blob.content) {
            Ok(delta) => {
                let crossings = delta
                    .changes
                    .iter()
                    .filter(|c| c.threshold_crossed)
                    .count();
                println!(
                    "      latest delta: {} changes, {} threshold crossings",
                    style(delta.changes.len()).cyan(),
                    style(crossings).yellow()
                );
                if delta.run_id != index.latest_run_id {
                    println!(
                        "  {} delta feed is from run {}, state index from run {}",
                        style("[!!]").red(),
                        delta.run_id,
                        index.latest_run_id
                    );
                }
            }
            Err(e) => println!("  {} latest delta unreadable: {e}", style("[!!]").red()),
        },
        Ok(None) => println!("  {} no delta feed published", style("[--]").dim()),
        Err(e) => println!("  {} latest delta unreadable: {e}", style("[!!]").red()),
    }

    Ok(())
}
