//! Chart delivery
//!
//! The chart directory and the values file are scoped temp guards; both are
//! gone when `install` returns, whatever helm did.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::env::constants::PROCESS_GRACE_SECS;
use crate::domain::deploy::StepOutcome;
use crate::domain::workload::Workload;
use crate::error::DeployResult;
use crate::infra::command::CommandError;
use crate::services::context::ClusterContext;
use crate::services::manifest::ChartPackage;
use crate::state::AppState;

/// Result of `helm upgrade --install`
#[derive(Clone, Debug)]
pub struct ReleaseOutcome {
    pub step: StepOutcome,
    pub timed_out: bool,
}

/// Write the chart and run `helm upgrade --install --wait`.
///
/// `Err` only when the chart cannot be written; helm failures come back as a
/// failed `ReleaseOutcome`.
pub async fn install(
    state: &AppState,
    context: &ClusterContext,
    workload: &Workload,
    package: &ChartPackage,
) -> DeployResult<ReleaseOutcome> {
    let chart_dir = state.scratch.dir("chart-")?;
    package.write_to(chart_dir.path())?;
    let values = state
        .scratch
        .write_file("values-", ".yaml", &package.values_yaml()?)?;

    let timeout_secs = state.settings.timeouts.chart.as_secs();
    let spec = context
        .helm(state, Duration::from_secs(timeout_secs + PROCESS_GRACE_SECS))
        .args([
            "upgrade".to_string(),
            "--install".to_string(),
            package.release.clone(),
            chart_dir.path().to_string_lossy().into_owned(),
            "--namespace".to_string(),
            workload.namespace().to_string(),
            "--create-namespace".to_string(),
            "-f".to_string(),
            values.to_string_lossy().into_owned(),
            "--wait".to_string(),
            "--timeout".to_string(),
            format!("{}s", timeout_secs),
        ]);

    let outcome = match state.executor.run(&spec).await {
        Ok(output) if output.success() => {
            info!(release = %package.release, "Helm release installed");
            ReleaseOutcome {
                step: StepOutcome::ok(output.stdout.trim()),
                timed_out: false,
            }
        }
        Ok(output) => {
            let diagnostic = output.diagnostic();
            warn!(release = %package.release, error = %diagnostic, "Helm release failed");
            ReleaseOutcome {
                timed_out: diagnostic.contains("timed out"),
                step: StepOutcome::failed(diagnostic),
            }
        }
        Err(e) => {
            warn!(release = %package.release, error = %e, "Helm release failed");
            ReleaseOutcome {
                timed_out: matches!(e, CommandError::Timeout(_)),
                step: StepOutcome::failed(e.to_string()),
            }
        }
    };

    if let Err(e) = values.close() {
        warn!(error = %e, "Failed to remove values file");
    }
    if let Err(e) = chart_dir.close() {
        warn!(error = %e, "Failed to remove chart directory");
    }
    Ok(outcome)
}
