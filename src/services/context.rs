//! Cluster context setup
//!
//! Materializes a cluster's kubeconfig into a scoped temp file and probes the
//! API server before anything else talks to the cluster. The resulting
//! `ClusterContext` is passed explicitly to every cluster-facing call; the
//! process environment is never touched.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempPath;
use tracing::{info, warn};

use crate::domain::workload::{Cluster, Workload};
use crate::error::{DeployError, DeployResult};
use crate::infra::command::CommandSpec;
use crate::state::AppState;

/// A validated connection to one cluster, valid for the duration of a call.
///
/// Dropping it removes the kubeconfig file.
pub struct ClusterContext {
    pub cluster_id: String,
    pub cluster_name: String,
    kubeconfig: TempPath,
}

impl ClusterContext {
    pub fn kubeconfig_path(&self) -> &Path {
        &self.kubeconfig
    }

    /// `kubectl --kubeconfig <path>` with the given timeout
    pub fn kubectl(&self, state: &AppState, timeout: Duration) -> CommandSpec {
        self.bind(CommandSpec::new(&state.settings.kubectl_path, timeout))
    }

    /// `helm --kubeconfig <path>` with the given timeout
    pub fn helm(&self, state: &AppState, timeout: Duration) -> CommandSpec {
        self.bind(CommandSpec::new(&state.settings.helm_path, timeout))
    }

    fn bind(&self, spec: CommandSpec) -> CommandSpec {
        spec.arg("--kubeconfig")
            .arg(self.kubeconfig.to_string_lossy().into_owned())
    }
}

impl std::fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterContext")
            .field("cluster", &self.cluster_name)
            .field("kubeconfig", &self.kubeconfig_path())
            .finish()
    }
}

/// Creates cluster contexts
#[derive(Clone)]
pub struct ClusterContextManager {
    state: Arc<AppState>,
}

impl ClusterContextManager {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Set up the context for the cluster a workload is bound to
    pub async fn for_workload(&self, workload: &Workload) -> DeployResult<ClusterContext> {
        let cluster = workload
            .cluster
            .as_ref()
            .ok_or_else(|| DeployError::configuration("No Kubernetes cluster configured"))?;
        self.setup(cluster).await
    }

    /// Write the kubeconfig and probe the API server.
    ///
    /// Fails with `Connectivity` when the probe does not succeed; the temp file
    /// is removed on that path as well.
    pub async fn setup(&self, cluster: &Cluster) -> DeployResult<ClusterContext> {
        if cluster.kubeconfig.trim().is_empty() {
            return Err(DeployError::configuration(format!(
                "Cluster {} has no kubeconfig",
                cluster.name
            )));
        }

        let kubeconfig = self
            .state
            .scratch
            .write_file("kubeconfig-", ".yaml", &cluster.kubeconfig)?;

        let context = ClusterContext {
            cluster_id: cluster.id.clone(),
            cluster_name: cluster.name.clone(),
            kubeconfig,
        };

        let probe = context
            .kubectl(&self.state, self.state.settings.timeouts.probe)
            .arg("cluster-info");

        let diagnostic = match self.state.executor.run(&probe).await {
            Ok(output) if output.success() => {
                info!(cluster = %cluster.name, "Cluster reachable");
                return Ok(context);
            }
            Ok(output) => output.diagnostic(),
            Err(e) => e.to_string(),
        };

        warn!(cluster = %cluster.name, error = %diagnostic, "Cluster probe failed");
        Err(DeployError::connectivity(
            &cluster.name,
            format!("Failed to connect to Kubernetes cluster: {}", diagnostic),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::command::testing::ScriptedExecutor;
    use crate::infra::command::CommandOutput;

    fn cluster() -> Cluster {
        Cluster {
            id: "c-1".to_string(),
            name: "staging".to_string(),
            kubeconfig: "apiVersion: v1\nkind: Config\n".to_string(),
        }
    }

    #[tokio::test]
    async fn test_setup_binds_kubeconfig_explicitly() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("cluster-info", CommandOutput::ok("Kubernetes control plane is running")),
        );
        let manager = ClusterContextManager::new(Arc::new(AppState::with_executor(executor.clone())));

        let context = manager.setup(&cluster()).await.unwrap();
        let path = context.kubeconfig_path().to_path_buf();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), cluster().kubeconfig);
        assert_eq!(
            executor.calls(),
            vec![format!("kubectl --kubeconfig {} cluster-info", path.display())]
        );
        assert!(std::env::var("KUBECONFIG").map_or(true, |v| v != path.to_string_lossy()));

        drop(context);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_probe_failure_is_connectivity_error() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("cluster-info", CommandOutput::failed(1, "connection refused")),
        );
        let manager = ClusterContextManager::new(Arc::new(AppState::with_executor(executor)));

        let err = manager.setup(&cluster()).await.unwrap_err();
        match err {
            DeployError::Connectivity { target, diagnostic } => {
                assert_eq!(target, "staging");
                assert!(diagnostic.contains("Failed to connect to Kubernetes cluster"));
                assert!(diagnostic.contains("connection refused"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_timeout_is_connectivity_error() {
        let executor = Arc::new(ScriptedExecutor::new().timeout_on("cluster-info"));
        let manager = ClusterContextManager::new(Arc::new(AppState::with_executor(executor)));

        let err = manager.setup(&cluster()).await.unwrap_err();
        assert!(matches!(err, DeployError::Connectivity { .. }));
    }

    #[tokio::test]
    async fn test_unbound_workload() {
        let executor = Arc::new(ScriptedExecutor::new());
        let manager = ClusterContextManager::new(Arc::new(AppState::with_executor(executor.clone())));

        let err = manager.for_workload(&Workload::new("blog")).await.unwrap_err();
        assert_eq!(err.to_string(), "configuration error: No Kubernetes cluster configured");
        assert!(executor.calls().is_empty());
    }
}
