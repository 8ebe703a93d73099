//! Registry credential management
//!
//! Stores and validates private registry credentials and mirrors each active
//! one into the workload namespace as a `kubernetes.io/dockerconfigjson`
//! secret. The secret is always deleted and recreated, never merged.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::env::constants::MANAGED_BY;
use crate::domain::deploy::StepOutcome;
use crate::domain::registry::{
    is_valid_registry_url, CredentialInput, CredentialStatus, ProviderCredentials, ProviderKind,
    RegistryCredential,
};
use crate::domain::workload::Workload;
use crate::error::{DeployError, DeployResult, OpResult};
use crate::infra::command::CommandSpec;
use crate::state::AppState;

use super::context::ClusterContext;

/// Trimmed, non-empty input field
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Manages registry credentials and their cluster pull secrets
#[derive(Clone)]
pub struct RegistryCredentialManager {
    state: Arc<AppState>,
}

impl RegistryCredentialManager {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Validate and persist a new credential
    pub async fn store(
        &self,
        workload: &Workload,
        input: &CredentialInput,
    ) -> DeployResult<OpResult<RegistryCredential>> {
        let kind = input.validate()?;
        let credentials = ProviderCredentials::extract(kind, input)?;

        let url = match present(&input.registry_url) {
            Some(url) => url.to_string(),
            None => kind
                .default_url()
                .map(str::to_string)
                .ok_or_else(|| {
                    DeployError::configuration(format!("registry_url is required for {}", kind))
                })?,
        };

        let now = Utc::now();
        let credential = RegistryCredential {
            id: Uuid::new_v4(),
            workload: workload.slug.clone(),
            name: present(&input.name).unwrap_or_default().to_string(),
            kind,
            url,
            username: present(&input.username).unwrap_or_default().to_string(),
            email: present(&input.email).map(str::to_string),
            credentials,
            is_default: input.is_default.unwrap_or(false),
            status: CredentialStatus::Active,
            last_tested_at: None,
            created_at: now,
            updated_at: now,
        };

        if credential.is_default {
            self.clear_default(&workload.slug, credential.id).await?;
        }
        self.state.credentials.insert(credential.clone()).await?;

        info!(
            workload = %workload.slug,
            credential = %credential.name,
            kind = %credential.kind,
            "Registry credential stored"
        );
        Ok(OpResult::ok(credential))
    }

    /// Partial update; the secret payload is re-extracted only when the input
    /// carries secret fields
    pub async fn update(
        &self,
        id: Uuid,
        input: &CredentialInput,
    ) -> DeployResult<OpResult<RegistryCredential>> {
        let mut credential = self
            .state
            .credentials
            .get(id)
            .await?
            .ok_or_else(|| DeployError::configuration(format!("Registry credential {} not found", id)))?;

        if let Some(kind) = present(&input.registry_type) {
            let kind: ProviderKind = kind.parse()?;
            if kind != credential.kind && !ProviderCredentials::any_present(input) {
                return Err(DeployError::configuration(format!(
                    "Changing registry type to {} requires new credentials",
                    kind
                )));
            }
            credential.kind = kind;
        }
        if let Some(name) = present(&input.name) {
            credential.name = name.to_string();
        }
        if let Some(url) = present(&input.registry_url) {
            if !is_valid_registry_url(url) {
                return Err(DeployError::configuration(format!("Invalid registry URL: {}", url)));
            }
            credential.url = url.to_string();
        }
        if let Some(username) = present(&input.username) {
            credential.username = username.to_string();
        }
        if input.email.is_some() {
            credential.email = present(&input.email).map(str::to_string);
        }
        if ProviderCredentials::any_present(input) {
            credential.credentials = ProviderCredentials::extract(credential.kind, input)?;
            // new secrets have not been tested yet
            credential.status = CredentialStatus::Active;
        }
        if let Some(is_default) = input.is_default {
            if is_default && !credential.is_default {
                self.clear_default(&credential.workload, credential.id).await?;
            }
            credential.is_default = is_default;
        }
        credential.updated_at = Utc::now();

        self.state.credentials.update(credential.clone()).await?;
        info!(credential = %credential.name, "Registry credential updated");
        Ok(OpResult::ok(credential))
    }

    pub async fn list(&self, workload: &Workload) -> DeployResult<Vec<RegistryCredential>> {
        self.state.credentials.list(&workload.slug).await
    }

    /// Active credentials; these become pull secrets
    pub async fn active(&self, workload: &Workload) -> DeployResult<Vec<RegistryCredential>> {
        Ok(self
            .list(workload)
            .await?
            .into_iter()
            .filter(RegistryCredential::is_active)
            .collect())
    }

    /// The default active credential, falling back to the oldest active one
    pub async fn default_for(&self, workload: &Workload) -> DeployResult<Option<RegistryCredential>> {
        let active = self.active(workload).await?;
        let default = active.iter().find(|c| c.is_default).cloned();
        Ok(default.or_else(|| active.into_iter().next()))
    }

    async fn clear_default(&self, workload: &str, keep: Uuid) -> DeployResult<()> {
        for mut other in self.state.credentials.list(workload).await? {
            if other.id != keep && other.is_default {
                other.is_default = false;
                other.updated_at = Utc::now();
                self.state.credentials.update(other).await?;
            }
        }
        Ok(())
    }

    /// Username used for `docker login` and the dockerconfigjson entry
    pub fn login_username(credential: &RegistryCredential) -> &str {
        match credential.credentials {
            ProviderCredentials::AwsKeys { .. } => "AWS",
            ProviderCredentials::ServiceAccount { .. } => "_json_key",
            ProviderCredentials::ServicePrincipal { ref client_id, .. } => client_id,
            _ => &credential.username,
        }
    }

    /// Resolve the registry password. ECR needs a short-lived token from the
    /// aws CLI; every other provider stores it directly.
    pub async fn login_password(&self, credential: &RegistryCredential) -> DeployResult<String> {
        match credential.credentials {
            ProviderCredentials::Password { ref password } => Ok(password.clone()),
            ProviderCredentials::AccessToken { ref token } => Ok(token.clone()),
            ProviderCredentials::ServiceAccount {
                ref service_account_json,
            } => Ok(service_account_json.clone()),
            ProviderCredentials::ServicePrincipal {
                ref password,
                ref client_secret,
                ..
            } => Ok(password.clone().unwrap_or_else(|| client_secret.clone())),
            ProviderCredentials::AwsKeys {
                ref access_key_id,
                ref secret_access_key,
                ref region,
            } => {
                let spec = CommandSpec::new(&self.state.settings.aws_path, self.state.settings.timeouts.registry)
                    .args(["ecr", "get-login-password", "--region", region.as_str()])
                    .env("AWS_ACCESS_KEY_ID", access_key_id)
                    .env("AWS_SECRET_ACCESS_KEY", secret_access_key)
                    .env("AWS_DEFAULT_REGION", region);
                let output = self.state.executor.run(&spec).await?;
                if output.success() {
                    Ok(output.stdout.trim().to_string())
                } else {
                    Err(DeployError::connectivity(&credential.url, output.diagnostic()))
                }
            }
        }
    }

    /// `{"auths": {server: {username, password, email, auth}}}`
    pub fn docker_config_json(credential: &RegistryCredential, password: &str) -> Value {
        let username = Self::login_username(credential);
        let mut entry = json!({
            "username": username,
            "password": password,
            "auth": STANDARD.encode(format!("{}:{}", username, password)),
        });
        if let Some(ref email) = credential.email {
            entry["email"] = json!(email);
        }

        let mut auths = serde_json::Map::new();
        auths.insert(credential.server().to_string(), entry);
        json!({ "auths": auths })
    }

    fn pull_secret(credential: &RegistryCredential, namespace: &str, password: &str) -> DeployResult<String> {
        let config = serde_json::to_string(&Self::docker_config_json(credential, password))?;
        let secret = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": credential.secret_name(),
                "namespace": namespace,
                "labels": {
                    "app": namespace,
                    "managed-by": MANAGED_BY,
                },
            },
            "type": "kubernetes.io/dockerconfigjson",
            "data": { ".dockerconfigjson": STANDARD.encode(config) },
        });
        Ok(serde_yaml::to_string(&secret)?)
    }

    /// Make sure the namespace exists before secrets are created in it
    async fn ensure_namespace(&self, context: &ClusterContext, workload: &Workload) -> StepOutcome {
        let namespace = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {
                "name": workload.namespace(),
                "labels": { "app": workload.slug, "managed-by": MANAGED_BY },
            },
        });
        let document = match serde_yaml::to_string(&namespace) {
            Ok(document) => document,
            Err(e) => return StepOutcome::failed(e.to_string()),
        };
        let spec = context
            .kubectl(&self.state, self.state.settings.timeouts.apply)
            .args(["apply", "-f", "-"])
            .stdin(document);
        match self.state.executor.run(&spec).await {
            Ok(output) if output.success() => StepOutcome::ok(output.stdout.trim()),
            Ok(output) => StepOutcome::failed(output.diagnostic()),
            Err(e) => StepOutcome::failed(e.to_string()),
        }
    }

    /// Delete then recreate the pull secret for one credential
    pub async fn mirror_to_cluster(
        &self,
        context: &ClusterContext,
        workload: &Workload,
        credential: &RegistryCredential,
    ) -> StepOutcome {
        let secret_name = credential.secret_name();
        let namespace = workload.namespace();

        let password = match self.login_password(credential).await {
            Ok(password) => password,
            Err(e) => {
                warn!(secret = %secret_name, error = %e, "Could not resolve registry password");
                return StepOutcome::failed(e.to_string());
            }
        };
        let document = match Self::pull_secret(credential, namespace, &password) {
            Ok(document) => document,
            Err(e) => return StepOutcome::failed(e.to_string()),
        };

        let timeout = self.state.settings.timeouts.apply;
        let delete = context
            .kubectl(&self.state, timeout)
            .args(["delete", "secret", secret_name.as_str(), "-n", namespace, "--ignore-not-found=true"]);
        match self.state.executor.run(&delete).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                warn!(secret = %secret_name, error = %output.diagnostic(), "Failed to delete previous pull secret")
            }
            Err(e) => warn!(secret = %secret_name, error = %e, "Failed to delete previous pull secret"),
        }

        let create = context
            .kubectl(&self.state, timeout)
            .args(["create", "-f", "-"])
            .stdin(document);
        match self.state.executor.run(&create).await {
            Ok(output) if output.success() => {
                info!(workload = %workload.slug, secret = %secret_name, "Pull secret mirrored");
                StepOutcome::ok(output.stdout.trim())
            }
            Ok(output) => {
                warn!(secret = %secret_name, error = %output.diagnostic(), "Failed to create pull secret");
                StepOutcome::failed(output.diagnostic())
            }
            Err(e) => StepOutcome::failed(e.to_string()),
        }
    }

    /// Mirror every active credential; one failure does not stop the rest
    pub async fn mirror_all(
        &self,
        context: &ClusterContext,
        workload: &Workload,
        credentials: &[RegistryCredential],
    ) -> BTreeMap<String, StepOutcome> {
        let mut results = BTreeMap::new();
        let active: Vec<&RegistryCredential> = credentials.iter().filter(|c| c.is_active()).collect();
        if active.is_empty() {
            return results;
        }

        let namespace = self.ensure_namespace(context, workload).await;
        if !namespace.success {
            warn!(workload = %workload.slug, error = %namespace.output, "Failed to ensure namespace");
        }

        for credential in active {
            let outcome = self.mirror_to_cluster(context, workload, credential).await;
            results.insert(credential.secret_name(), outcome);
        }
        results
    }

    /// `docker login` / `docker logout` round trip; records status and
    /// last-tested time on the stored credential
    pub async fn test_connection(&self, id: Uuid) -> DeployResult<OpResult<CredentialStatus>> {
        let mut credential = self
            .state
            .credentials
            .get(id)
            .await?
            .ok_or_else(|| DeployError::configuration(format!("Registry credential {} not found", id)))?;

        let result = self.docker_login(&credential).await;
        credential.status = if result.is_ok() {
            CredentialStatus::Active
        } else {
            CredentialStatus::Failed
        };
        credential.last_tested_at = Some(Utc::now());
        credential.updated_at = Utc::now();
        self.state.credentials.update(credential.clone()).await?;

        match result {
            Ok(message) => {
                info!(credential = %credential.name, "Registry connection successful");
                Ok(OpResult::ok(credential.status).with_diagnostic(message))
            }
            Err(diagnostic) => {
                warn!(credential = %credential.name, error = %diagnostic, "Registry connection failed");
                Ok(OpResult::failed(credential.status, diagnostic))
            }
        }
    }

    async fn docker_login(&self, credential: &RegistryCredential) -> Result<String, String> {
        let password = self.login_password(credential).await.map_err(|e| e.to_string())?;
        let docker = &self.state.settings.docker_path;
        let timeout = self.state.settings.timeouts.registry;
        let server = credential.server();

        let login = CommandSpec::new(docker, timeout)
            .args(["login", server, "--username", Self::login_username(credential), "--password-stdin"])
            .stdin(password);
        let output = self.state.executor.run(&login).await.map_err(|e| e.to_string())?;
        if !output.success() {
            return Err(output.diagnostic());
        }

        let logout = CommandSpec::new(docker, timeout).args(["logout", server]);
        if let Err(e) = self.state.executor.run(&logout).await {
            warn!(server = %server, error = %e, "docker logout failed");
        }
        Ok("Connection successful".to_string())
    }

    /// Best-effort removal of the cluster secret, then mandatory removal of
    /// the record
    pub async fn delete(
        &self,
        credential: &RegistryCredential,
        context: Option<&ClusterContext>,
    ) -> DeployResult<OpResult<()>> {
        if let Some(context) = context {
            let secret_name = credential.secret_name();
            let spec = context
                .kubectl(&self.state, self.state.settings.timeouts.apply)
                .args([
                    "delete",
                    "secret",
                    secret_name.as_str(),
                    "-n",
                    credential.workload.as_str(),
                    "--ignore-not-found=true",
                ]);
            match self.state.executor.run(&spec).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    warn!(secret = %secret_name, error = %output.diagnostic(), "Failed to delete pull secret")
                }
                Err(e) => warn!(secret = %secret_name, error = %e, "Failed to delete pull secret"),
            }
        }

        if self.state.credentials.delete(credential.id).await? {
            info!(credential = %credential.name, "Registry credential deleted");
            Ok(OpResult::ok(()))
        } else {
            Ok(OpResult::failed((), format!("Registry credential {} not found", credential.id)))
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

    fn hub_input() -> CredentialInput {
        CredentialInput {
            name: Some("Docker Hub".into()),
            registry_type: Some("docker_hub".into()),
            username: Some("acme".into()),
            email: Some("ops@acme.test".into()),
            password: Some("hub-pass".into()),
            is_default: Some(true),
            ..Default::default()
        }
    }

    fn ecr_input() -> CredentialInput {
        CredentialInput {
            name: Some("ECR".into()),
            registry_type: Some("aws_ecr".into()),
            registry_url: Some("123456789.dkr.ecr.eu-west-1.amazonaws.com".into()),
            username: Some("AWS".into()),
            aws_access_key_id: Some("AKIA".into()),
            aws_secret_access_key: Some("secret".into()),
            region: Some("eu-west-1".into()),
            ..Default::default()
        }
    }

    fn workload() -> Workload {
        let mut workload = Workload::new("blog");
        workload.cluster = Some(Cluster {
            id: "c".into(),
            name: "prod".into(),
            kubeconfig: "apiVersion: v1".into(),
        });
        workload
    }

    fn manager(executor: Arc<ScriptedExecutor>) -> (RegistryCredentialManager, Arc<AppState>) {
        let state = Arc::new(AppState::with_executor(executor));
        (RegistryCredentialManager::new(state.clone()), state)
    }

    #[tokio::test]
    async fn test_store_defaults_url_and_persists() {
        let (manager, state) = manager(Arc::new(ScriptedExecutor::new()));
        let stored = manager.store(&workload(), &hub_input()).await.unwrap().payload;

        assert_eq!(stored.url, "https://index.docker.io/v1/");
        assert_eq!(stored.status, CredentialStatus::Active);
        assert!(state.credentials.get(stored.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_input() {
        let (manager, _) = manager(Arc::new(ScriptedExecutor::new()));

        let bad_url = CredentialInput {
            registry_url: Some("not a url".into()),
            ..hub_input()
        };
        assert!(manager.store(&workload(), &bad_url).await.is_err());

        let no_url = CredentialInput {
            registry_type: Some("private".into()),
            ..hub_input()
        };
        let err = manager.store(&workload(), &no_url).await.unwrap_err();
        assert!(err.to_string().contains("registry_url is required"));
    }

    #[tokio::test]
    async fn test_single_default_per_workload() {
        let (manager, _) = manager(Arc::new(ScriptedExecutor::new()));
        let first = manager.store(&workload(), &hub_input()).await.unwrap().payload;
        let second = manager
            .store(&workload(), &CredentialInput { name: Some("Second".into()), ..hub_input() })
            .await
            .unwrap()
            .payload;

        let all = manager.list(&workload()).await.unwrap();
        let defaults: Vec<Uuid> = all.iter().filter(|c| c.is_default).map(|c| c.id).collect();
        assert_eq!(defaults, vec![second.id]);
        assert_ne!(first.id, second.id);
        assert_eq!(manager.default_for(&workload()).await.unwrap().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_update_reextracts_only_with_secret_fields() {
        let (manager, _) = manager(Arc::new(ScriptedExecutor::new()));
        let stored = manager.store(&workload(), &hub_input()).await.unwrap().payload;

        let renamed = manager
            .update(stored.id, &CredentialInput { name: Some("Hub".into()), ..Default::default() })
            .await
            .unwrap()
            .payload;
        assert_eq!(renamed.name, "Hub");
        assert_eq!(renamed.credentials, stored.credentials);

        let rotated = manager
            .update(stored.id, &CredentialInput { password: Some("rotated".into()), ..Default::default() })
            .await
            .unwrap()
            .payload;
        assert_eq!(rotated.credentials, ProviderCredentials::Password { password: "rotated".into() });

        let err = manager
            .update(stored.id, &CredentialInput { registry_type: Some("github".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }

    #[test]
    fn test_docker_config_json() {
        let now = Utc::now();
        let credential = RegistryCredential {
            id: Uuid::new_v4(),
            workload: "blog".into(),
            name: "ghcr".into(),
            kind: ProviderKind::Github,
            url: "https://ghcr.io/".into(),
            username: "octocat".into(),
            email: Some("octo@example.com".into()),
            credentials: ProviderCredentials::AccessToken { token: "ghp_x".into() },
            is_default: false,
            status: CredentialStatus::Active,
            last_tested_at: None,
            created_at: now,
            updated_at: now,
        };

        let config = RegistryCredentialManager::docker_config_json(&credential, "ghp_x");
        let entry = &config["auths"]["ghcr.io"];
        assert_eq!(entry["username"], "octocat");
        assert_eq!(entry["email"], "octo@example.com");
        assert_eq!(entry["auth"], STANDARD.encode("octocat:ghp_x"));
    }

    #[tokio::test]
    async fn test_mirror_replaces_secret_without_password_in_args() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("create -f -", CommandOutput::ok("secret/registry-docker-hub created")),
        );
        let (manager, state) = manager(executor.clone());
        let stored = manager.store(&workload(), &hub_input()).await.unwrap().payload;
        let context = ClusterContextManager::new(state).setup(workload().cluster.as_ref().unwrap()).await.unwrap();

        let results = manager.mirror_all(&context, &workload(), &[stored.clone()]).await;

        assert!(results[&stored.secret_name()].success);
        let calls = executor.calls();
        let delete = calls.iter().position(|c| c.contains("delete secret")).unwrap();
        let create = calls.iter().position(|c| c.contains("create -f -")).unwrap();
        assert!(delete < create);
        assert!(calls.iter().all(|c| !c.contains("hub-pass")));
        assert!(calls[delete].contains("--ignore-not-found=true"));

        let specs = executor.specs();
        let body = specs[create].stdin.clone().unwrap();
        assert!(body.contains("kubernetes.io/dockerconfigjson"));
        assert!(body.contains(&stored.secret_name()));
    }

    #[tokio::test]
    async fn test_mirror_continues_after_rejected_delete() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on("delete secret", CommandOutput::failed(1, "secrets is forbidden"))
                .on("create -f -", CommandOutput::failed(1, "secrets \"registry-docker-hub\" already exists")),
        );
        let (manager, state) = manager(executor.clone());
        let stored = manager.store(&workload(), &hub_input()).await.unwrap().payload;
        let context = ClusterContextManager::new(state).setup(workload().cluster.as_ref().unwrap()).await.unwrap();

        let outcome = manager.mirror_to_cluster(&context, &workload(), &stored).await;

        assert!(!outcome.success);
        assert!(outcome.output.contains("already exists"));
        assert_eq!(executor.count("delete secret"), 1);
        assert_eq!(executor.count("create -f -"), 1);
    }

    #[tokio::test]
    async fn test_mirror_ecr_fetches_token() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("ecr get-login-password", CommandOutput::ok("eyJ0b2tlbiI6\n")),
        );
        let (manager, state) = manager(executor.clone());
        let stored = manager.store(&workload(), &ecr_input()).await.unwrap().payload;
        let context = ClusterContextManager::new(state).setup(workload().cluster.as_ref().unwrap()).await.unwrap();

        let outcome = manager.mirror_to_cluster(&context, &workload(), &stored).await;
        assert!(outcome.success);

        let token_call = executor
            .specs()
            .into_iter()
            .find(|s| s.command_line().contains("get-login-password"))
            .unwrap();
        assert!(token_call.envs.contains(&("AWS_ACCESS_KEY_ID".to_string(), "AKIA".to_string())));
        assert!(token_call.args.contains(&"eu-west-1".to_string()));
    }

    #[tokio::test]
    async fn test_one_failed_mirror_does_not_stop_others() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on("ecr get-login-password", CommandOutput::failed(255, "InvalidSignatureException"))
                .on("create -f -", CommandOutput::ok("created")),
        );
        let (manager, state) = manager(executor);
        let ecr = manager.store(&workload(), &ecr_input()).await.unwrap().payload;
        let hub = manager.store(&workload(), &hub_input()).await.unwrap().payload;
        let context = ClusterContextManager::new(state).setup(workload().cluster.as_ref().unwrap()).await.unwrap();

        let results = manager.mirror_all(&context, &workload(), &[ecr.clone(), hub.clone()]).await;

        assert!(!results[&ecr.secret_name()].success);
        assert!(results[&ecr.secret_name()].output.contains("InvalidSignatureException"));
        assert!(results[&hub.secret_name()].success);
    }

    #[tokio::test]
    async fn test_connection_success_and_failure_update_status() {
        let executor = Arc::new(ScriptedExecutor::new().on("docker login", CommandOutput::ok("Login Succeeded")));
        let (manager, state) = manager(executor.clone());
        let stored = manager.store(&workload(), &hub_input()).await.unwrap().payload;

        let result = manager.test_connection(stored.id).await.unwrap();
        assert!(result.success);
        assert_eq!(result.payload, CredentialStatus::Active);
        assert_eq!(executor.count("docker logout index.docker.io/v1"), 1);
        let login = executor.specs().into_iter().find(|s| s.command_line().contains("login")).unwrap();
        assert_eq!(login.stdin.as_deref(), Some("hub-pass"));
        assert!(state.credentials.get(stored.id).await.unwrap().unwrap().last_tested_at.is_some());

        let executor = Arc::new(
            ScriptedExecutor::new().on("docker login", CommandOutput::failed(1, "unauthorized: incorrect username or password")),
        );
        let (failing, state) = self::manager(executor.clone());
        let stored = failing.store(&workload(), &hub_input()).await.unwrap().payload;

        let result = failing.test_connection(stored.id).await.unwrap();
        assert!(!result.success);
        assert!(result.diagnostic.contains("unauthorized"));
        assert_eq!(executor.count("logout"), 0);
        assert_eq!(
            state.credentials.get(stored.id).await.unwrap().unwrap().status,
            CredentialStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_delete_is_best_effort_on_cluster() {
        let executor = Arc::new(ScriptedExecutor::new().on("delete secret", CommandOutput::failed(1, "forbidden")));
        let (manager, state) = manager(executor.clone());
        let stored = manager.store(&workload(), &hub_input()).await.unwrap().payload;
        let context = ClusterContextManager::new(state.clone())
            .setup(workload().cluster.as_ref().unwrap())
            .await
            .unwrap();

        let result = manager.delete(&stored, Some(&context)).await.unwrap();

        assert!(result.success);
        assert_eq!(executor.count("delete secret"), 1);
        assert!(state.credentials.get(stored.id).await.unwrap().is_none());
    }
}
