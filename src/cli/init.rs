//! Init command - write an example configuration

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

const EXAMPLE_CONFIG: &str = r#"# netpulse configuration
#
# The pipeline reads a raw topology snapshot from the source repository,
# recomputes threat scores, and publishes the scored snapshot plus a change
# feed to the output repository. Authentication comes from NETPULSE_TOKEN
# or GITHUB_TOKEN.

[source]
owner = "acme"
repo = "network-topology"
path = "Data/network_topology.json"
branch = "main"

[output]
owner = "acme"
repo = "topology-scored"
branch = "main"
snapshot_path = "Data/network_topology_scored.json"
changes_latest = "Data/changes/latest.json"
changes_history_dir = "Data/changes/history"
state_index = "Data/state/index.json"
sandbox_path = "Data/pipeline_write_test.json"

[thresholds]
# Score tiers: benign < suspicious <= malicious. suspicious must not
# exceed malicious.
suspicious = 0.5
malicious = 0.8

[diff]
# Score movement at or below this magnitude is ignored.
delta_min = 0.0
# Report nodes that disappeared from the snapshot as removed_node records.
emit_removals = false
# Duplicate node keys in one snapshot: "last-wins" or "reject".
duplicate_keys = "last-wins"
"#;

/// Run the init command
pub fn run(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!(
            "config file already exists at {}, not overwriting",
            config_path.display()
        );
    }

    std::fs::write(config_path, EXAMPLE_CONFIG)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    println!(
        "{} created {}",
        style("[OK]").green(),
        style(config_path.display()).cyan()
    );
    println!("  edit the repository coordinates, then set NETPULSE_TOKEN or GITHUB_TOKEN");
    println!("  try a dry run: {}", style("netpulse run").cyan());
    Ok(())
}
