//! Raw manifest delivery
//!
//! Applies each resource kind on its own, strictly in order, then waits for
//! the deployment rollout.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::env::constants::PROCESS_GRACE_SECS;
use crate::domain::deploy::{RolloutOutcome, StepOutcome};
use crate::domain::manifest::ManifestSet;
use crate::domain::workload::Workload;
use crate::error::DeployError;
use crate::infra::command::CommandError;
use crate::services::context::ClusterContext;
use crate::state::AppState;

use super::recorder::AttemptRecorder;

/// `kubectl apply -f -` per kind; a failed kind does not stop the next one
pub async fn apply_all(
    state: &AppState,
    context: &ClusterContext,
    manifests: &ManifestSet,
    run: &mut AttemptRecorder,
) {
    for (kind, document) in manifests.iter() {
        run.stdout(format!(">>> kubectl apply -f - ({})", kind));

        let outcome = match serde_yaml::to_string(document) {
            Ok(yaml) => {
                let spec = context
                    .kubectl(state, state.settings.timeouts.apply)
                    .args(["apply", "-f", "-"])
                    .stdin(yaml);
                match state.executor.run(&spec).await {
                    Ok(output) if output.success() => StepOutcome::ok(output.stdout.trim()),
                    Ok(output) => StepOutcome::failed(output.diagnostic()),
                    Err(e) => StepOutcome::failed(e.to_string()),
                }
            }
            Err(e) => StepOutcome::failed(e.to_string()),
        };

        if outcome.success {
            info!(workload = %run.attempt.workload, kind = %kind, "Applied");
            run.stdout(outcome.output.clone());
        } else {
            let err = DeployError::Apply {
                kind: kind.to_string(),
                diagnostic: outcome.output.clone(),
            };
            error!(workload = %run.attempt.workload, kind = %kind, error = %err, "Apply failed");
            run.stderr(err.to_string());
        }
        run.attempt.applied.insert(kind, outcome);
    }
}

/// Block until the deployment reaches its desired replica count.
///
/// Never retries and never rolls back. The process gets a grace period on
/// top of kubectl's own `--timeout`.
pub async fn wait_for_rollout(
    state: &AppState,
    context: &ClusterContext,
    workload: &Workload,
    timeout_secs: u64,
) -> RolloutOutcome {
    let target = format!("deployment/{}", workload.deployment_name());
    let spec = context
        .kubectl(state, Duration::from_secs(timeout_secs + PROCESS_GRACE_SECS))
        .args([
            "rollout".to_string(),
            "status".to_string(),
            target.clone(),
            "-n".to_string(),
            workload.namespace().to_string(),
            format!("--timeout={}s", timeout_secs),
        ]);

    match state.executor.run(&spec).await {
        Ok(output) if output.success() => {
            info!(deployment = %target, "Rollout complete");
            RolloutOutcome {
                success: true,
                timed_out: false,
                diagnostic: output.stdout.trim().to_string(),
            }
        }
        Ok(output) => {
            let diagnostic = output.diagnostic();
            let timed_out = diagnostic.contains("timed out");
            warn!(deployment = %target, timed_out, error = %diagnostic, "Rollout failed");
            RolloutOutcome {
                success: false,
                timed_out,
                diagnostic,
            }
        }
        Err(CommandError::Timeout(_)) => {
            let err = DeployError::RolloutTimeout { timeout_secs };
            warn!(deployment = %target, error = %err, "Rollout failed");
            RolloutOutcome {
                success: false,
                timed_out: true,
                diagnostic: err.to_string(),
            }
        }
        Err(e) => {
            warn!(deployment = %target, error = %e, "Rollout status unavailable");
            RolloutOutcome {
                success: false,
                timed_out: false,
                diagnostic: e.to_string(),
            }
        }
    }
}
