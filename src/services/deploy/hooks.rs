//! Post-deploy hooks
//!
//! Framework commands first, then the workload's own script, all inside the
//! same running replica.

use tracing::{info, warn};

use crate::domain::deploy::HookOutcome;
use crate::domain::workload::Workload;
use crate::services::context::ClusterContext;
use crate::services::monitor::ClusterMonitor;

/// Commands to run after a completed rollout, in order
pub fn hook_commands(workload: &Workload) -> Vec<String> {
    let mut commands: Vec<String> = workload
        .framework
        .post_deploy_commands()
        .iter()
        .map(|c| c.to_string())
        .collect();
    if let Some(script) = workload
        .post_deploy_script
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        commands.push(script.to_string());
    }
    commands
}

/// Run every hook; a failing hook does not stop the next one
pub async fn run(monitor: &ClusterMonitor, context: &ClusterContext, workload: &Workload) -> Vec<HookOutcome> {
    let commands = hook_commands(workload);
    if commands.is_empty() {
        return Vec::new();
    }

    let pod = match monitor.first_running_pod(context, workload).await {
        Ok(pod) => pod,
        Err(e) => {
            warn!(workload = %workload.slug, error = %e, "No pod available for hooks");
            return commands
                .into_iter()
                .map(|command| HookOutcome {
                    command,
                    pod: None,
                    success: false,
                    output: e.to_string(),
                })
                .collect();
        }
    };

    let mut outcomes = Vec::with_capacity(commands.len());
    for command in commands {
        let outcome = match monitor.exec_in_pod(context, workload, &command, Some(&pod)).await {
            Ok(result) => HookOutcome {
                command,
                pod: Some(pod.clone()),
                success: result.success,
                // exec output already carries stderr; spawn failures only have a diagnostic
                output: if result.payload.output.is_empty() {
                    result.diagnostic
                } else {
                    result.payload.output
                },
            },
            Err(e) => HookOutcome {
                command,
                pod: Some(pod.clone()),
                success: false,
                output: e.to_string(),
            },
        };

        if outcome.success {
            info!(workload = %workload.slug, hook = %outcome.command, "Hook completed");
        } else {
            warn!(workload = %workload.slug, hook = %outcome.command, error = %outcome.output, "Hook failed");
        }
        outcomes.push(outcome);
    }
    outcomes
}
