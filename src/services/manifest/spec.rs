//! Resolved workload spec
//!
//! Every default and naming rule lives here. The raw manifest renderer and the
//! chart values renderer both consume a `WorkloadSpec`, so the two delivery
//! paths cannot drift apart.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::env::constants::MANAGED_BY;
use crate::domain::deploy::{DeployOptions, ServiceType};
use crate::domain::registry::RegistryCredential;
use crate::domain::workload::{is_sensitive_key, Framework, Workload};
use crate::error::DeployResult;
use crate::infra::cipher::SecretCipher;

pub const DEFAULT_REPLICAS: u32 = 3;
pub const DEFAULT_MIN_REPLICAS: u32 = 2;
pub const DEFAULT_MAX_REPLICAS: u32 = 10;
pub const DEFAULT_TARGET_CPU: u32 = 70;
pub const DEFAULT_TARGET_MEMORY: u32 = 80;
pub const DEFAULT_MEMORY_REQUEST: &str = "256Mi";
pub const DEFAULT_CPU_REQUEST: &str = "100m";
pub const DEFAULT_MEMORY_LIMIT: &str = "512Mi";
pub const DEFAULT_CPU_LIMIT: &str = "500m";
pub const DEFAULT_PDB_MIN_AVAILABLE: u32 = 1;
pub const SERVICE_PORT: u16 = 80;
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// `{registry}/{repository}:{tag}`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn reference(&self) -> String {
        let registry = self.registry.trim_end_matches('/');
        if registry.is_empty() {
            format!("{}:{}", self.repository, self.tag)
        } else {
            format!("{}/{}:{}", registry, self.repository, self.tag)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Quantities {
    pub memory: String,
    pub cpu: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resources {
    pub requests: Quantities,
    pub limits: Quantities,
}

/// HTTP probe settings
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Probe {
    pub path: &'static str,
    pub initial_delay_seconds: u32,
    pub period_seconds: u32,
    pub timeout_seconds: u32,
    pub failure_threshold: u32,
}

impl Probe {
    pub fn liveness() -> Self {
        Self {
            path: "/health",
            initial_delay_seconds: 30,
            period_seconds: 10,
            timeout_seconds: 5,
            failure_threshold: 3,
        }
    }

    pub fn readiness() -> Self {
        Self {
            path: "/ready",
            initial_delay_seconds: 5,
            period_seconds: 5,
            timeout_seconds: 3,
            failure_threshold: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TlsEntry {
    pub hosts: Vec<String>,
    pub secret_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IngressSpec {
    pub hosts: Vec<String>,
    pub tls: Vec<TlsEntry>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AutoscalingSpec {
    pub enabled: bool,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_cpu: u32,
    pub target_memory: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisruptionBudget {
    pub enabled: bool,
    pub min_available: u32,
}

/// Resolved resource names, all derived from the slug
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceNames {
    pub namespace: String,
    pub deployment: String,
    pub service: String,
    pub config_map: String,
    pub secret: String,
    pub ingress: String,
    pub hpa: String,
    pub storage_claim: String,
}

impl ResourceNames {
    fn for_workload(workload: &Workload) -> Self {
        Self {
            namespace: workload.namespace().to_string(),
            deployment: workload.deployment_name(),
            service: workload.service_name(),
            config_map: workload.config_map_name(),
            secret: workload.secret_name(),
            ingress: workload.ingress_name(),
            hpa: workload.hpa_name(),
            storage_claim: format!("{}-storage", workload.slug),
        }
    }
}

/// Everything both renderers need, with defaults applied
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkloadSpec {
    pub slug: String,
    pub display_name: String,
    pub framework: Framework,
    pub version: Option<String>,
    pub names: ResourceNames,
    pub labels: BTreeMap<String, String>,
    pub image: ImageRef,
    pub replicas: u32,
    pub container_port: u16,
    pub service_type: ServiceType,
    pub resources: Resources,
    pub liveness: Probe,
    pub readiness: Probe,
    pub config_data: BTreeMap<String, String>,
    /// Already passed through the secret cipher
    pub secret_data: BTreeMap<String, String>,
    pub ingress: Option<IngressSpec>,
    pub autoscaling: AutoscalingSpec,
    pub disruption_budget: DisruptionBudget,
    pub pull_secrets: Vec<String>,
}

impl WorkloadSpec {
    pub fn build(
        workload: &Workload,
        credentials: &[RegistryCredential],
        options: &DeployOptions,
        registry: &str,
        cipher: &dyn SecretCipher,
    ) -> DeployResult<Self> {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), workload.slug.clone());
        labels.insert("version".to_string(), workload.image_tag().to_string());

        let secret_data = workload
            .secrets
            .entries()
            .into_iter()
            .map(|(key, value)| Ok((key.to_string(), cipher.encrypt(value)?)))
            .collect::<DeployResult<BTreeMap<_, _>>>()?;

        let pull_secrets = credentials
            .iter()
            .filter(|c| c.workload == workload.slug && c.is_active())
            .map(RegistryCredential::secret_name)
            .collect();

        Ok(Self {
            slug: workload.slug.clone(),
            display_name: workload.display_name().to_string(),
            framework: workload.framework,
            version: workload.version.clone().filter(|v| !v.is_empty()),
            names: ResourceNames::for_workload(workload),
            labels,
            image: ImageRef {
                registry: registry.to_string(),
                repository: workload.slug.clone(),
                tag: workload.image_tag().to_string(),
            },
            replicas: options.replicas.unwrap_or(DEFAULT_REPLICAS),
            container_port: workload.container_port(),
            service_type: options.service_type,
            resources: Resources {
                requests: Quantities {
                    memory: quantity(&options.memory_request, DEFAULT_MEMORY_REQUEST),
                    cpu: quantity(&options.cpu_request, DEFAULT_CPU_REQUEST),
                },
                limits: Quantities {
                    memory: quantity(&options.memory_limit, DEFAULT_MEMORY_LIMIT),
                    cpu: quantity(&options.cpu_limit, DEFAULT_CPU_LIMIT),
                },
            },
            liveness: Probe::liveness(),
            readiness: Probe::readiness(),
            config_data: config_data(workload),
            secret_data,
            ingress: ingress(workload, options),
            autoscaling: AutoscalingSpec {
                enabled: options.enable_autoscaling,
                min_replicas: options.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS),
                max_replicas: options.max_replicas.unwrap_or(DEFAULT_MAX_REPLICAS),
                target_cpu: options.target_cpu_utilization.unwrap_or(DEFAULT_TARGET_CPU),
                target_memory: options.target_memory_utilization.unwrap_or(DEFAULT_TARGET_MEMORY),
            },
            disruption_budget: DisruptionBudget {
                enabled: options.enable_pdb.unwrap_or(true),
                min_available: options.pdb_min_available.unwrap_or(DEFAULT_PDB_MIN_AVAILABLE),
            },
            pull_secrets,
        })
    }

    /// Labels on the namespace object
    pub fn namespace_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), self.slug.clone());
        labels.insert("managed-by".to_string(), MANAGED_BY.to_string());
        labels
    }

    pub fn selector(&self) -> BTreeMap<String, String> {
        let mut selector = BTreeMap::new();
        selector.insert("app".to_string(), self.slug.clone());
        selector
    }
}

fn quantity(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Base entries, then framework defaults, then non-sensitive workload vars
fn config_data(workload: &Workload) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    data.insert("APP_NAME".to_string(), workload.display_name().to_string());
    data.insert("APP_ENV".to_string(), "production".to_string());
    data.insert("APP_DEBUG".to_string(), "false".to_string());
    data.insert("LOG_CHANNEL".to_string(), "stderr".to_string());
    data.insert("LOG_LEVEL".to_string(), "info".to_string());

    for (key, value) in workload.framework.config_defaults() {
        data.insert((*key).to_string(), (*value).to_string());
    }

    for (key, value) in &workload.env_vars {
        if !is_sensitive_key(key) {
            data.insert(key.clone(), value.clone());
        }
    }
    data
}

fn ingress(workload: &Workload, options: &DeployOptions) -> Option<IngressSpec> {
    let slug = &workload.slug;
    let explicit_host = options
        .host
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty());

    let domain_tls = || -> Vec<TlsEntry> {
        workload
            .domains
            .iter()
            .map(|domain| TlsEntry {
                hosts: vec![domain.clone()],
                secret_name: format!("{}-tls-{}", slug, domain.replace('.', "-")),
            })
            .collect()
    };

    let (hosts, tls) = match explicit_host {
        Some(host) if options.enable_tls => (
            vec![host.to_string()],
            vec![TlsEntry {
                hosts: vec![host.to_string()],
                secret_name: format!("{}-tls", slug),
            }],
        ),
        // Bound domains keep their certificates when the host has none
        Some(host) => (vec![host.to_string()], domain_tls()),
        None if !workload.domains.is_empty() => (workload.domains.clone(), domain_tls()),
        None => return None,
    };

    let mut annotations = BTreeMap::new();
    annotations.insert(INGRESS_CLASS_ANNOTATION.to_string(), "nginx".to_string());
    annotations.insert(
        "cert-manager.io/cluster-issuer".to_string(),
        "letsencrypt-prod".to_string(),
    );
    annotations.insert(
        "nginx.ingress.kubernetes.io/ssl-redirect".to_string(),
        "true".to_string(),
    );

    Some(IngressSpec {
        hosts,
        tls,
        annotations,
    })
}
