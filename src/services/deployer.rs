//! Facade over the deployment core
//!
//! Owns one instance of each component and performs its own context setup
//! per call. Read-only operations degrade to an empty result when the cluster
//! cannot be reached; mutating ones return the error.

use std::future::Future;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::config::env::constants::{DEFAULT_EVENT_LIMIT, DEFAULT_LOG_TAIL};
use crate::domain::cluster::{ClusterEvent, ExecOutput, PodInfo, PodUsage, ScaleOutcome};
use crate::domain::deploy::{DeployOptions, DeploymentAttempt};
use crate::domain::manifest::ManifestSet;
use crate::domain::registry::{CredentialInput, CredentialStatus, RegistryCredential};
use crate::domain::workload::Workload;
use crate::error::{DeployError, DeployResult, OpResult};
use crate::state::AppState;

use super::context::{ClusterContext, ClusterContextManager};
use super::deploy::DeploymentOrchestrator;
use super::manifest::{ChartBuilder, ChartPackage, ManifestGenerator};
use super::monitor::ClusterMonitor;
use super::registry::RegistryCredentialManager;
use super::scaling::ScalingController;

#[derive(Clone)]
pub struct KubeDeployer {
    state: Arc<AppState>,
    contexts: ClusterContextManager,
    registry: RegistryCredentialManager,
    generator: ManifestGenerator,
    charts: ChartBuilder,
    orchestrator: DeploymentOrchestrator,
    monitor: ClusterMonitor,
    scaling: ScalingController,
}

impl KubeDeployer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            contexts: ClusterContextManager::new(state.clone()),
            registry: RegistryCredentialManager::new(state.clone()),
            generator: ManifestGenerator::new(state.clone()),
            charts: ChartBuilder::new(state.clone()),
            orchestrator: DeploymentOrchestrator::new(state.clone()),
            monitor: ClusterMonitor::new(state.clone()),
            scaling: ScalingController::new(state.clone()),
            state,
        }
    }

    /// Settings from the environment, in-memory credential store
    pub fn from_env() -> Self {
        Self::new(Arc::new(AppState::from_env()))
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    // ---- delivery ----

    pub async fn deploy(&self, workload: &Workload, options: &DeployOptions) -> DeployResult<OpResult<DeploymentAttempt>> {
        self.orchestrator.deploy(workload, options).await
    }

    pub async fn deploy_via_chart(
        &self,
        workload: &Workload,
        options: &DeployOptions,
    ) -> DeployResult<OpResult<DeploymentAttempt>> {
        self.orchestrator.deploy_via_chart(workload, options).await
    }

    pub async fn teardown(&self, workload: &Workload) -> DeployResult<OpResult<String>> {
        self.orchestrator.teardown(workload).await
    }

    pub async fn scale(&self, workload: &Workload, replicas: u32) -> DeployResult<OpResult<ScaleOutcome>> {
        let context = self.contexts.for_workload(workload).await?;
        Ok(self.scaling.scale(&context, workload, replicas).await)
    }

    pub async fn exec_in_pod(
        &self,
        workload: &Workload,
        command: &str,
        pod: Option<&str>,
    ) -> DeployResult<OpResult<ExecOutput>> {
        let context = self.contexts.for_workload(workload).await?;
        self.monitor.exec_in_pod(&context, workload, command, pod).await
    }

    // ---- rendering ----

    /// Manifests as they would be applied, using the stored credentials
    pub async fn render_manifests(&self, workload: &Workload, options: &DeployOptions) -> DeployResult<ManifestSet> {
        let credentials = self.registry.active(workload).await?;
        self.generator.generate(workload, &credentials, options)
    }

    pub async fn build_chart(&self, workload: &Workload, options: &DeployOptions) -> DeployResult<ChartPackage> {
        let credentials = self.registry.active(workload).await?;
        self.charts.build(workload, &credentials, options)
    }

    // ---- observation ----

    async fn observe(&self, workload: &Workload) -> Result<ClusterContext, String> {
        self.contexts.for_workload(workload).await.map_err(|e| {
            warn!(workload = %workload.slug, error = %e, "Cluster unavailable for read");
            e.to_string()
        })
    }

    /// Run a read against the workload's cluster, degrading when it is unreachable
    async fn read<T, F, Fut>(&self, workload: &Workload, query: F) -> OpResult<T>
    where
        T: Default,
        F: FnOnce(ClusterContext) -> Fut,
        Fut: Future<Output = OpResult<T>>,
    {
        match self.observe(workload).await {
            Ok(context) => query(context).await,
            Err(diagnostic) => OpResult::degraded(diagnostic),
        }
    }

    pub async fn pods(&self, workload: &Workload) -> OpResult<Vec<PodInfo>> {
        self.read(workload, |ctx| async move { self.monitor.pods(&ctx, workload).await })
            .await
    }

    pub async fn service_endpoints(&self, workload: &Workload) -> OpResult<Vec<String>> {
        self.read(workload, |ctx| async move { self.monitor.service_endpoints(&ctx, workload).await })
            .await
    }

    pub async fn logs(&self, workload: &Workload, tail: Option<u32>) -> OpResult<String> {
        let tail = tail.unwrap_or(DEFAULT_LOG_TAIL);
        self.read(workload, |ctx| async move { self.monitor.logs(&ctx, workload, tail).await })
            .await
    }

    pub async fn pod_logs(&self, workload: &Workload, pod: &str, tail: Option<u32>) -> OpResult<String> {
        let tail = tail.unwrap_or(DEFAULT_LOG_TAIL);
        self.read(workload, |ctx| async move { self.monitor.pod_logs(&ctx, workload, pod, tail).await })
            .await
    }

    pub async fn resource_usage(&self, workload: &Workload) -> OpResult<Vec<PodUsage>> {
        self.read(workload, |ctx| async move { self.monitor.resource_usage(&ctx, workload).await })
            .await
    }

    pub async fn events(&self, workload: &Workload, limit: Option<usize>) -> OpResult<Vec<ClusterEvent>> {
        let limit = limit.unwrap_or(DEFAULT_EVENT_LIMIT);
        self.read(workload, |ctx| async move { self.monitor.events(&ctx, workload, limit).await })
            .await
    }

    // ---- registry credentials ----

    pub async fn store_credential(
        &self,
        workload: &Workload,
        input: &CredentialInput,
    ) -> DeployResult<OpResult<RegistryCredential>> {
        self.registry.store(workload, input).await
    }

    pub async fn update_credential(
        &self,
        id: Uuid,
        input: &CredentialInput,
    ) -> DeployResult<OpResult<RegistryCredential>> {
        self.registry.update(id, input).await
    }

    pub async fn list_credentials(&self, workload: &Workload) -> DeployResult<Vec<RegistryCredential>> {
        self.registry.list(workload).await
    }

    pub async fn test_connection(&self, id: Uuid) -> DeployResult<OpResult<CredentialStatus>> {
        self.registry.test_connection(id).await
    }

    /// Remove the credential; the cluster secret is removed too when the
    /// workload's cluster is reachable
    pub async fn delete_credential(&self, workload: &Workload, id: Uuid) -> DeployResult<OpResult<()>> {
        let credential = self
            .state
            .credentials
            .get(id)
            .await?
            .filter(|c| c.workload == workload.slug)
            .ok_or_else(|| DeployError::configuration(format!("Registry credential {} not found", id)))?;

        let context = match workload.cluster {
            Some(_) => self.observe(workload).await.ok(),
            None => None,
        };
        self.registry.delete(&credential, context.as_ref()).await
    }
}
