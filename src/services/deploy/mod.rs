//! Deployment orchestration
//!
//! One call drives one workload through
//! Generating → SecretsProvisioned → Applying → RolloutPending →
//! RolloutComplete | RolloutFailed → HooksRun → Done.
//! Calls are not resumable; a failed attempt is retried as a whole.

pub mod helm;
pub mod hooks;
pub mod manifests;
pub mod recorder;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::env::constants::PROCESS_GRACE_SECS;
use crate::domain::deploy::{DeployMethod, DeployOptions, DeploymentAttempt, DeploymentPhase, RolloutOutcome};
use crate::domain::registry::RegistryCredential;
use crate::domain::workload::Workload;
use crate::error::{DeployResult, OpResult};
use crate::state::AppState;

use super::context::{ClusterContext, ClusterContextManager};
use super::manifest::{ChartBuilder, ManifestGenerator};
use super::monitor::ClusterMonitor;
use super::registry::RegistryCredentialManager;

pub use recorder::AttemptRecorder;

const MANIFEST_STAGES: &[(&str, &str)] = &[
    ("context", "Cluster Context"),
    ("generate", "Generate Manifests"),
    ("credentials", "Registry Credentials"),
    ("apply", "Apply Manifests"),
    ("rollout", "Rollout"),
    ("hooks", "Post-deploy Hooks"),
    ("snapshot", "Endpoints & Pods"),
];

const CHART_STAGES: &[(&str, &str)] = &[
    ("context", "Cluster Context"),
    ("package", "Build Chart"),
    ("credentials", "Registry Credentials"),
    ("release", "Helm Release"),
    ("hooks", "Post-deploy Hooks"),
    ("snapshot", "Endpoints & Pods"),
];

/// Drives deploy, chart deploy and teardown
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    state: Arc<AppState>,
    contexts: ClusterContextManager,
    registry: RegistryCredentialManager,
    generator: ManifestGenerator,
    charts: ChartBuilder,
    monitor: ClusterMonitor,
}

impl DeploymentOrchestrator {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            contexts: ClusterContextManager::new(state.clone()),
            registry: RegistryCredentialManager::new(state.clone()),
            generator: ManifestGenerator::new(state.clone()),
            charts: ChartBuilder::new(state.clone()),
            monitor: ClusterMonitor::new(state.clone()),
            state,
        }
    }

    /// Context setup and the workload's active credentials; shared by both
    /// delivery paths.
    ///
    /// Errors here abort the call before anything is applied.
    async fn prelude(
        &self,
        run: &mut AttemptRecorder,
        workload: &Workload,
    ) -> DeployResult<(ClusterContext, Vec<RegistryCredential>)> {
        run.start("context");
        let context = match self.contexts.for_workload(workload).await {
            Ok(context) => context,
            Err(e) => return Err(run.abort("context", e)),
        };
        run.finish("context", true, Some(format!("Connected to cluster {}", context.cluster_name)));

        let credentials = match self.registry.active(workload).await {
            Ok(credentials) => credentials,
            Err(e) => return Err(run.abort("credentials", e)),
        };
        Ok((context, credentials))
    }

    /// Mirror pull secrets into the workload namespace
    async fn provision(
        &self,
        run: &mut AttemptRecorder,
        context: &ClusterContext,
        workload: &Workload,
        credentials: &[RegistryCredential],
    ) {
        if credentials.is_empty() {
            run.skip("credentials", "no active registry credentials");
        } else {
            run.start("credentials");
            let mirrored = self.registry.mirror_all(context, workload, credentials).await;
            let ok = mirrored.values().filter(|o| o.success).count();
            let total = mirrored.len();
            for (secret, outcome) in &mirrored {
                if !outcome.success {
                    run.stderr(format!("Pull secret {} failed: {}", secret, outcome.output));
                }
            }
            run.attempt.credentials = mirrored;
            run.finish(
                "credentials",
                ok == total,
                Some(format!("{}/{} pull secrets mirrored", ok, total)),
            );
        }
        run.phase(DeploymentPhase::SecretsProvisioned);
    }

    /// Hooks after a completed rollout, then the endpoint and pod snapshot
    async fn finish_rollout(&self, run: &mut AttemptRecorder, context: &ClusterContext, workload: &Workload, options: &DeployOptions) {
        if !run.attempt.rollout_succeeded() {
            run.skip("hooks", "rollout did not complete");
        } else if options.skip_hooks {
            run.skip("hooks", "disabled by options");
        } else if hooks::hook_commands(workload).is_empty() {
            run.skip("hooks", "no hooks for this workload");
        } else {
            run.start("hooks");
            let outcomes = hooks::run(&self.monitor, context, workload).await;
            let failed = outcomes.iter().filter(|h| !h.success).count();
            for hook in &outcomes {
                let line = format!("{} {}", if hook.success { "✓" } else { "✗" }, hook.command);
                run.stdout(line);
            }
            run.attempt.hooks = outcomes;
            run.finish(
                "hooks",
                failed == 0,
                (failed > 0).then(|| format!("{} hook(s) failed", failed)),
            );
        }
        run.phase(DeploymentPhase::HooksRun);

        run.start("snapshot");
        let endpoints = self.monitor.service_endpoints(context, workload).await;
        let pods = self.monitor.pods(context, workload).await;
        run.attempt.endpoints = endpoints.payload;
        run.attempt.pods = pods.payload;
        let message = format!(
            "{} endpoint(s), {} pod(s)",
            run.attempt.endpoints.len(),
            run.attempt.pods.len()
        );
        run.finish("snapshot", endpoints.success && pods.success, Some(message));
    }

    /// Raw manifest delivery: every kind is applied even when an earlier one
    /// fails, and the rollout is awaited regardless.
    pub async fn deploy(&self, workload: &Workload, options: &DeployOptions) -> DeployResult<OpResult<DeploymentAttempt>> {
        let mut run = AttemptRecorder::new(workload, DeployMethod::Manifests, MANIFEST_STAGES);
        info!(workload = %workload.slug, "Starting manifest deployment");

        let (context, credentials) = self.prelude(&mut run, workload).await?;

        run.phase(DeploymentPhase::Generating);
        run.start("generate");
        let manifests = match self.generator.generate(workload, &credentials, options) {
            Ok(manifests) => manifests,
            Err(e) => return Err(run.abort("generate", e)),
        };
        let kinds: Vec<String> = manifests.kinds().iter().map(ToString::to_string).collect();
        run.finish("generate", true, Some(format!("Generated {}", kinds.join(", "))));
        self.provision(&mut run, &context, workload, &credentials).await;

        run.phase(DeploymentPhase::Applying);
        run.start("apply");
        manifests::apply_all(&self.state, &context, &manifests, &mut run).await;
        let failed: Vec<String> = run
            .attempt
            .applied
            .iter()
            .filter(|(_, o)| !o.success)
            .map(|(k, _)| k.to_string())
            .collect();
        let message = (!failed.is_empty()).then(|| format!("Failed kinds: {}", failed.join(", ")));
        run.finish("apply", failed.is_empty(), message);

        run.phase(DeploymentPhase::RolloutPending);
        run.start("rollout");
        let timeout_secs = options
            .rollout_timeout_secs
            .unwrap_or_else(|| self.state.settings.timeouts.rollout.as_secs());
        let rollout = manifests::wait_for_rollout(&self.state, &context, workload, timeout_secs).await;
        run.phase(if rollout.success {
            DeploymentPhase::RolloutComplete
        } else {
            DeploymentPhase::RolloutFailed
        });
        run.finish("rollout", rollout.success, Some(rollout.diagnostic.clone()).filter(|d| !d.is_empty()));
        run.attempt.rollout = Some(rollout);

        self.finish_rollout(&mut run, &context, workload, options).await;
        Ok(run.into_result())
    }

    /// Chart delivery: `helm upgrade --install` of a release named after the
    /// workload; helm's `--wait` stands in for the rollout wait.
    pub async fn deploy_via_chart(
        &self,
        workload: &Workload,
        options: &DeployOptions,
    ) -> DeployResult<OpResult<DeploymentAttempt>> {
        let mut run = AttemptRecorder::new(workload, DeployMethod::Chart, CHART_STAGES);
        info!(workload = %workload.slug, "Starting chart deployment");

        let (context, credentials) = self.prelude(&mut run, workload).await?;

        run.phase(DeploymentPhase::Generating);
        run.start("package");
        let package = match self.charts.build(workload, &credentials, options) {
            Ok(package) => package,
            Err(e) => return Err(run.abort("package", e)),
        };
        run.finish(
            "package",
            true,
            Some(format!("Templates: {}", package.active_templates().join(", "))),
        );
        self.provision(&mut run, &context, workload, &credentials).await;

        run.phase(DeploymentPhase::Applying);
        run.start("release");
        run.stdout(format!(">>> helm upgrade --install {}", package.release));
        let release = match helm::install(&self.state, &context, workload, &package).await {
            Ok(release) => release,
            Err(e) => return Err(run.abort("release", e)),
        };
        run.phase(DeploymentPhase::RolloutPending);
        run.finish("release", release.step.success, Some(release.step.output.clone()).filter(|o| !o.is_empty()));

        run.attempt.rollout = Some(RolloutOutcome {
            success: release.step.success,
            timed_out: release.timed_out,
            diagnostic: release.step.output.clone(),
        });
        run.phase(if release.step.success {
            DeploymentPhase::RolloutComplete
        } else {
            DeploymentPhase::RolloutFailed
        });
        run.attempt.release = Some(release.step);

        self.finish_rollout(&mut run, &context, workload, options).await;
        Ok(run.into_result())
    }

    /// Delete the workload namespace and everything in it
    pub async fn teardown(&self, workload: &Workload) -> DeployResult<OpResult<String>> {
        let context = self.contexts.for_workload(workload).await?;
        let timeout = self.state.settings.timeouts.teardown;
        let spec = context
            .kubectl(&self.state, timeout + Duration::from_secs(PROCESS_GRACE_SECS))
            .args([
                "delete".to_string(),
                "namespace".to_string(),
                workload.namespace().to_string(),
                "--ignore-not-found=true".to_string(),
                format!("--timeout={}s", timeout.as_secs()),
            ]);

        let diagnostic = match self.state.executor.run(&spec).await {
            Ok(output) if output.success() => {
                info!(workload = %workload.slug, "Namespace deleted");
                return Ok(OpResult::ok(output.stdout.trim().to_string()));
            }
            Ok(output) => output.diagnostic(),
            Err(e) => e.to_string(),
        };
        warn!(workload = %workload.slug, error = %diagnostic, "Namespace deletion failed");
        Ok(OpResult::failed(String::new(), diagnostic))
    }
}
