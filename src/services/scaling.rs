//! Direct replica scaling, outside any re-apply

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::cluster::ScaleOutcome;
use crate::domain::workload::Workload;
use crate::error::OpResult;
use crate::state::AppState;

use super::context::ClusterContext;

#[derive(Clone)]
pub struct ScalingController {
    state: Arc<AppState>,
}

impl ScalingController {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// `kubectl scale`; returns the requested count without waiting for the
    /// deployment to converge
    pub async fn scale(&self, context: &ClusterContext, workload: &Workload, replicas: u32) -> OpResult<ScaleOutcome> {
        let target = format!("deployment/{}", workload.deployment_name());
        let spec = context
            .kubectl(&self.state, self.state.settings.timeouts.apply)
            .args([
                "scale".to_string(),
                target.clone(),
                format!("--replicas={}", replicas),
                "-n".to_string(),
                workload.namespace().to_string(),
            ]);

        match self.state.executor.run(&spec).await {
            Ok(output) if output.success() => {
                info!(deployment = %target, replicas, "Scaled");
                OpResult::ok(ScaleOutcome {
                    new_replicas: replicas,
                    output: output.stdout.trim().to_string(),
                })
            }
            Ok(output) => {
                warn!(deployment = %target, error = %output.diagnostic(), "Scale failed");
                OpResult::degraded(output.diagnostic())
            }
            Err(e) => {
                warn!(deployment = %target, error = %e, "Scale failed");
                OpResult::degraded(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workload::Cluster;
    use crate::infra::command::testing::ScriptedExecutor;
    use crate::infra::command::CommandOutput;
    use crate::services::context::ClusterContextManager;

    fn workload() -> Workload {
        let mut workload = Workload::new("blog");
        workload.cluster = Some(Cluster {
            id: "c".into(),
            name: "prod".into(),
            kubeconfig: "apiVersion: v1".into(),
        });
        workload
    }

    #[tokio::test]
    async fn test_scale_returns_requested_count() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("scale", CommandOutput::ok("deployment.apps/blog-deployment scaled\n")),
        );
        let state = Arc::new(AppState::with_executor(executor.clone()));
        let context = ClusterContextManager::new(state.clone()).for_workload(&workload()).await.unwrap();

        let result = ScalingController::new(state).scale(&context, &workload(), 5).await;

        assert!(result.success);
        assert_eq!(result.payload.new_replicas, 5);
        assert_eq!(result.payload.output, "deployment.apps/blog-deployment scaled");
        assert_eq!(executor.count("scale deployment/blog-deployment --replicas=5 -n blog"), 1);
        assert_eq!(executor.count("rollout"), 0);
    }

    #[tokio::test]
    async fn test_scale_failure_carries_diagnostic() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "scale",
            CommandOutput::failed(1, "Error from server (NotFound): deployments.apps \"blog-deployment\" not found"),
        ));
        let state = Arc::new(AppState::with_executor(executor));
        let context = ClusterContextManager::new(state.clone()).for_workload(&workload()).await.unwrap();

        let result = ScalingController::new(state).scale(&context, &workload(), 2).await;

        assert!(!result.success);
        assert_eq!(result.payload, ScaleOutcome::default());
        assert!(result.diagnostic.contains("NotFound"));
    }
}
