//! Run command - execute one pipeline run
//!
//! Dry run by default: everything up to publication executes and the
//! computed delta is printed. `--commit` performs the writes; a publication
//! failure reports the failed artifact and the last one that landed, so an
//! operator can reconcile the output store by hand.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use crate::config::{load_settings, resolve_token};
use crate::pipeline::{Pipeline, PipelineError, PublishError, PublishMode, RunOutcome};
use crate::scoring::StubScorer;
use crate::store::GithubStore;

pub fn run(config_path: &Path, token: Option<String>, commit: bool, sandbox: bool) -> Result<()> {
    let settings = load_settings(config_path)
        .with_context(|| format!("cannot load config from {}", config_path.display()))?;
    let token = resolve_token(token)?;

    let source = GithubStore::new(
        &token,
        &settings.source.owner,
        &settings.source.repo,
        &settings.source.branch,
    );
    let output = GithubStore::new(
        &token,
        &settings.output.owner,
        &settings.output.repo,
        &settings.output.branch,
    );
    let scorer = StubScorer;

    let mode = match (commit, sandbox) {
        (true, true) => PublishMode::Sandbox,
        (true, false) => PublishMode::Commit,
        (false, _) => PublishMode::DryRun,
    };
    if sandbox {
        println!(
            "{} sandbox mode: only {} would be written",
            style("note:").yellow(),
            style(&settings.output.sandbox_path).cyan()
        );
    }

    let pipeline = Pipeline::new(&source, &output, &scorer, &settings);
    let outcome = match pipeline.run(mode) {
        Ok(outcome) => outcome,
        Err(PipelineError::Publish(err)) => {
            report_publish_failure(&err);
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    print_summary(&outcome);

    match &outcome.receipt {
        Some(receipt) => {
            println!("\n{} pipeline complete", style("[OK]").green());
            println!("  snapshot revision: {}", style(&receipt.snapshot_id).cyan());
            match &receipt.history_path {
                Some(history) => {
                    println!("  delta feed: {}", style(&settings.output.changes_latest).cyan());
                    println!("  history: {}", style(history).cyan());
                    println!("  state index: {}", style(&settings.output.state_index).cyan());
                }
                None => println!("  sandbox: {}", style(&settings.output.sandbox_path).cyan()),
            }
        }
        None => {
            println!("\n{} dry run only, nothing written", style("[--]").dim());
            println!("  next: {}", style("netpulse run --commit").cyan());
        }
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    println!(
        "\ndetected {} changed entities (run {})",
        style(outcome.delta.event_seq).cyan(),
        style(&outcome.run_id).dim()
    );

    let priority: Vec<_> = outcome
        .delta
        .changes
        .iter()
        .take(3)
        .filter(|c| c.threshold_crossed)
        .collect();
    if !priority.is_empty() {
        println!("  priority changes (threshold crossings):");
        for change in priority {
            let prev_status = change
                .prev
                .and_then(|p| p.status)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "new".to_string());
            let curr_status = change
                .curr
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unscored".to_string());
            println!(
                "    - {}: {} -> {} (score {:.2}, {})",
                style(&change.id).bold(),
                prev_status,
                style(curr_status).red(),
                change.curr.threat_score,
                change.reason
            );
        }
    } else if outcome.delta.event_seq == 0 {
        println!("  no significant changes detected");
    }

    let mut sample: Vec<_> = outcome.scores.iter().collect();
    sample.sort_by(|a, b| a.0.cmp(b.0));
    if !sample.is_empty() {
        let rendered: Vec<String> = sample
            .iter()
            .take(5)
            .map(|(key, score)| format!("{key}={score:.2}"))
            .collect();
        println!("  sample scores: {}", style(rendered.join(", ")).dim());
    }
}

fn report_publish_failure(err: &PublishError) {
    if let PublishError::Write {
        artifact,
        path,
        last_published,
        ..
    } = err
    {
        eprintln!(
            "{} publication failed at the {} ({})",
            style("[!!]").red(),
            style(artifact).bold(),
            path
        );
        match last_published {
            Some(previous) => {
                eprintln!("  last successfully published artifact: {previous}");
                eprintln!("  the output store is partially updated and needs reconciliation");
            }
            None => eprintln!("  nothing was published this run"),
        }
    }
}
