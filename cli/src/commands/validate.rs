use std::path::Path;
use std::sync::Arc;

use autoscan_common::cluster::TargetKind;
use autoscan_core::Policy;
use autoscan_core::policy::DiscoveryPolicy;
use colored::*;
use tracing::info;

use crate::commands::load_policy;
use crate::mprint;
use crate::terminal::{colors, print};

pub fn validate(config: &Path, quiet: u8) -> anyhow::Result<()> {
    let policy: Arc<Policy> = load_policy(config, None)?;
    info!(path = %config.display(), "Policy is valid");

    if quiet > 0 {
        return Ok(());
    }

    print::header("policy", quiet);
    print::set_key_width(["cluster", "inclusion", "passive", "workers"]);
    print::aligned_line("cluster", policy.cluster_name());
    print::aligned_line("inclusion", format!("{:?}", policy.mode()));
    print::aligned_line(
        "passive",
        humantime::format_duration(policy.passive_reconcile_interval()).to_string(),
    );
    print::aligned_line("workers", policy.controller().workers.to_string());

    for (idx, kind) in [TargetKind::Service, TargetKind::Container].into_iter().enumerate() {
        mprint!();
        print_discovery(idx, kind, policy.discovery(kind));
    }

    print::end_of_program();
    Ok(())
}

fn print_discovery(idx: usize, kind: TargetKind, discovery: &DiscoveryPolicy) {
    print::tree_head(idx, &format!("{kind} discovery"));

    let enabled: ColoredString = match discovery.enabled {
        true => "enabled".green(),
        false => "disabled".color(colors::WARNING),
    };
    let parameters: Vec<&str> = discovery.scan.parameters.iter().map(|t| t.source()).collect();

    let mut lines: Vec<(String, ColoredString)> = vec![
        ("state".to_string(), enabled),
        (
            "scan type".to_string(),
            discovery.scan.scan_type.color(colors::SCAN_TYPE),
        ),
        (
            "repeat".to_string(),
            humantime::format_duration(discovery.scan.repeat_interval)
                .to_string()
                .normal(),
        ),
        ("parameters".to_string(), parameters.join(" ").normal()),
    ];
    for (key, template) in &discovery.scan.labels {
        lines.push((format!("label {key}"), template.source().normal()));
    }
    for (key, template) in &discovery.scan.annotations {
        lines.push((format!("annotation {key}"), template.source().normal()));
    }
    print::as_tree_one_level(lines);
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
