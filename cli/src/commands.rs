pub mod plan;
pub mod run;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use autoscan_common::cluster::{ClusterSnapshot, ScanJob};
use autoscan_common::config::AutoDiscoveryConfig;
use autoscan_common::error::ConfigValidationError;
use autoscan_core::Policy;
use autoscan_core::cluster::{Event, EventType};
use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use tracing::error;

use crate::terminal::{colors, print};

#[derive(Parser)]
#[command(name = "autoscan")]
#[command(about = "Keeps security scans in sync with what runs in a cluster.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// More output, repeat for more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Less output, repeat for less
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a policy file and show what it compiles to
    #[command(alias = "v")]
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the scan jobs a single pass would produce for a cluster snapshot
    #[command(alias = "p")]
    Plan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        snapshot: PathBuf,
    },
    /// Run the controller against a cluster snapshot until Ctrl-C
    #[command(alias = "r")]
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        snapshot: PathBuf,
        /// Overrides controller.workers
        #[arg(long)]
        workers: Option<usize>,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Loads, validates and compiles a policy file. Every problem is logged before failing.
pub fn load_policy(path: &Path, workers: Option<usize>) -> anyhow::Result<Arc<Policy>> {
    let mut config: AutoDiscoveryConfig = AutoDiscoveryConfig::load(path).map_err(|e| {
        log_problems(&e);
        e
    })?;

    if let Some(workers) = workers {
        config.controller.workers = workers;
    }

    let policy: Policy = Policy::from_config(config).map_err(|e| {
        log_problems(&e);
        e
    })?;
    Ok(Arc::new(policy))
}

pub fn load_snapshot(path: &Path) -> anyhow::Result<ClusterSnapshot> {
    let raw: String = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    ClusterSnapshot::from_yaml(&raw)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))
}

pub fn print_jobs(jobs: &[ScanJob]) {
    if jobs.is_empty() {
        print::nothing_found("No scan jobs");
        return;
    }

    for (idx, job) in jobs.iter().enumerate() {
        print::tree_head(idx, &format!("{}/{}", job.namespace, job.name));
        let mut lines: Vec<(String, ColoredString)> = vec![
            ("target".to_string(), job.target.to_string().normal()),
            ("scan type".to_string(), job.scan_type.color(colors::SCAN_TYPE)),
            ("parameters".to_string(), job.parameters.join(" ").normal()),
            (
                "repeat".to_string(),
                humantime::format_duration(job.repeat_interval).to_string().normal(),
            ),
            (
                "triggered".to_string(),
                job.last_triggered.to_rfc3339().normal(),
            ),
        ];
        for (key, value) in &job.labels {
            lines.push((format!("label {key}"), value.as_str().normal()));
        }
        for (key, value) in &job.annotations {
            lines.push((format!("annotation {key}"), value.as_str().normal()));
        }
        print::as_tree_one_level(lines);
    }
}

pub fn print_events(events: &[Event]) {
    if events.is_empty() {
        print::nothing_found("No events recorded");
        return;
    }

    for event in events {
        let kind: ColoredString = match event.event_type {
            EventType::Normal => event.event_type.to_string().green(),
            EventType::Warning => {
                event.event_type.to_string().color(colors::WARNING)
            }
        };
        print::print_status(format!(
            "{} {} {} {}",
            kind,
            event.reason.color(colors::ACCENT),
            event.owner.to_string().color(colors::PRIMARY),
            event.message
        ));
    }
}

fn log_problems(err: &ConfigValidationError) {
    for problem in err.problems() {
        error!(field = %problem.field, "{}", problem.reason);
    }
}
