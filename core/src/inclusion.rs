//! # Inclusion Evaluator
//!
//! Decides whether a target takes part in auto-discovery.
//!
//! Two annotation markers are understood, on the target itself and on its namespace:
//!
//! | marker                                  | `"true"`  | `"false"` |
//! |-----------------------------------------|-----------|-----------|
//! | `auto-discovery.autoscan.dev/enabled`   | include   | exclude   |
//! | `auto-discovery.autoscan.dev/ignore`    | exclude   | include   |
//!
//! The target-level verdict wins over the namespace-level one; without any verdict the
//! cluster-wide [`InclusionMode`] decides. Malformed markers are errors, and errors exclude.

use std::collections::BTreeMap;

use autoscan_common::cluster::{ContainerTarget, Namespace, Target};
use autoscan_common::config::InclusionMode;
use autoscan_common::error::InclusionEvaluationError;
use tracing::warn;

pub const ENABLED_MARKER: &str = "auto-discovery.autoscan.dev/enabled";
pub const IGNORE_MARKER: &str = "auto-discovery.autoscan.dev/ignore";

/// Fallible evaluation of a target against the markers and the mode.
///
/// Container targets are included as soon as one of their pods is.
pub fn evaluate(
    target: &Target,
    namespace: Option<&Namespace>,
    mode: InclusionMode,
) -> Result<bool, InclusionEvaluationError> {
    let namespace_verdict: Option<bool> = match namespace {
        Some(ns) => verdict(&format!("namespace {}", ns.name()), &ns.metadata.annotations)?,
        None => None,
    };

    match target {
        Target::Service(svc) => {
            let scope: String = format!("service {}/{}", svc.namespace, svc.service_name);
            let target_verdict: Option<bool> = verdict(&scope, &svc.annotations)?;
            Ok(resolve(target_verdict, namespace_verdict, mode))
        }
        Target::Container(container) => {
            let mut first_error: Option<InclusionEvaluationError> = None;
            for pod in &container.pods {
                let scope: String = format!("pod {}/{}", container.namespace, pod.name);
                match verdict(&scope, &pod.annotations) {
                    Ok(target_verdict) => {
                        if resolve(target_verdict, namespace_verdict, mode) {
                            return Ok(true);
                        }
                    }
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(false),
            }
        }
    }
}

/// Infallible contract: any evaluation error counts as excluded.
pub fn is_included(target: &Target, namespace: Option<&Namespace>, mode: InclusionMode) -> bool {
    match evaluate(target, namespace, mode) {
        Ok(included) => included,
        Err(e) => {
            warn!(target_ref = %target.target_ref(), error = %e, "Invalid inclusion marker, excluding target");
            false
        }
    }
}

/// Keeps only the pods of a container target that are individually included.
///
/// Pods with malformed markers are dropped.
pub fn included_pods(
    target: &ContainerTarget,
    namespace: Option<&Namespace>,
    mode: InclusionMode,
) -> Vec<String> {
    let namespace_verdict: Option<bool> = namespace
        .and_then(|ns| verdict(ns.name(), &ns.metadata.annotations).ok())
        .flatten();

    target
        .pods
        .iter()
        .filter(|pod| match verdict(&pod.name, &pod.annotations) {
            Ok(target_verdict) => resolve(target_verdict, namespace_verdict, mode),
            Err(_) => false,
        })
        .map(|pod| pod.name.clone())
        .collect()
}

fn resolve(target: Option<bool>, namespace: Option<bool>, mode: InclusionMode) -> bool {
    target.or(namespace).unwrap_or(match mode {
        InclusionMode::EnabledPerResource => false,
        InclusionMode::All => true,
    })
}

/// Verdict of one annotation set: `Some(true)` include, `Some(false)` exclude, `None` silent.
fn verdict(
    scope: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<Option<bool>, InclusionEvaluationError> {
    let enabled: Option<bool> = marker(scope, annotations, ENABLED_MARKER)?;
    let ignore: Option<bool> = marker(scope, annotations, IGNORE_MARKER)?;

    match (enabled, ignore) {
        (Some(enabled), Some(ignore)) if enabled == ignore => {
            Err(InclusionEvaluationError::Contradictory {
                scope: scope.to_string(),
                enabled,
                ignore,
            })
        }
        (Some(enabled), _) => Ok(Some(enabled)),
        (None, Some(ignore)) => Ok(Some(!ignore)),
        (None, None) => Ok(None),
    }
}

fn marker(
    scope: &str,
    annotations: &BTreeMap<String, String>,
    key: &str,
) -> Result<Option<bool>, InclusionEvaluationError> {
    let Some(raw) = annotations.get(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(Some(true)),
        "false" => Ok(Some(false)),
        _ => Err(InclusionEvaluationError::InvalidValue {
            scope: scope.to_string(),
            key: key.to_string(),
            value: raw.clone(),
        }),
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
