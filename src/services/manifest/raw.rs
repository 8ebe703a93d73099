//! Raw manifest rendering
//!
//! Pure transform from a workload to the resource documents applied with
//! `kubectl apply`.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::domain::deploy::DeployOptions;
use crate::domain::manifest::{ManifestSet, ResourceKind};
use crate::domain::registry::RegistryCredential;
use crate::domain::workload::Workload;
use crate::error::DeployResult;
use crate::state::AppState;

use super::spec::{IngressSpec, Probe, WorkloadSpec, SERVICE_PORT};

/// Generates the raw manifest set for a workload
#[derive(Clone)]
pub struct ManifestGenerator {
    state: Arc<AppState>,
}

impl ManifestGenerator {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Resolve the spec for a workload with the configured registry and cipher
    pub fn spec(
        &self,
        workload: &Workload,
        credentials: &[RegistryCredential],
        options: &DeployOptions,
    ) -> DeployResult<WorkloadSpec> {
        WorkloadSpec::build(
            workload,
            credentials,
            options,
            &self.state.settings.docker_registry,
            self.state.cipher.as_ref(),
        )
    }

    /// Namespace, configmap, secret, deployment and service are always present;
    /// ingress when a host or domain is bound; hpa when autoscaling is on.
    pub fn generate(
        &self,
        workload: &Workload,
        credentials: &[RegistryCredential],
        options: &DeployOptions,
    ) -> DeployResult<ManifestSet> {
        Ok(render(&self.spec(workload, credentials, options)?))
    }
}

/// Render a resolved spec into manifests
pub fn render(spec: &WorkloadSpec) -> ManifestSet {
    let mut set = ManifestSet::new();
    set.insert(ResourceKind::Namespace, namespace(spec));
    set.insert(ResourceKind::ConfigMap, config_map(spec));
    set.insert(ResourceKind::Secret, secret(spec));
    set.insert(ResourceKind::Deployment, deployment(spec));
    set.insert(ResourceKind::Service, service(spec));
    if let Some(ref ingress_spec) = spec.ingress {
        set.insert(ResourceKind::Ingress, ingress(spec, ingress_spec));
    }
    if spec.autoscaling.enabled {
        set.insert(ResourceKind::Hpa, hpa(spec));
    }
    set
}

fn namespace(spec: &WorkloadSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": spec.names.namespace,
            "labels": spec.namespace_labels(),
        },
    })
}

fn config_map(spec: &WorkloadSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": spec.names.config_map,
            "namespace": spec.names.namespace,
        },
        "data": spec.config_data,
    })
}

fn secret(spec: &WorkloadSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": spec.names.secret,
            "namespace": spec.names.namespace,
        },
        "type": "Opaque",
        "stringData": spec.secret_data,
    })
}

fn probe(probe: &Probe, port: u16) -> Value {
    json!({
        "httpGet": { "path": probe.path, "port": port },
        "initialDelaySeconds": probe.initial_delay_seconds,
        "periodSeconds": probe.period_seconds,
        "timeoutSeconds": probe.timeout_seconds,
        "failureThreshold": probe.failure_threshold,
    })
}

fn deployment(spec: &WorkloadSpec) -> Value {
    let pull_secrets: Vec<Value> = spec
        .pull_secrets
        .iter()
        .map(|name| json!({ "name": name }))
        .collect();

    let mut pod_spec = json!({
        "containers": [{
            "name": "app",
            "image": spec.image.reference(),
            "imagePullPolicy": "Always",
            "ports": [{ "containerPort": spec.container_port }],
            "envFrom": [
                { "configMapRef": { "name": spec.names.config_map } },
                { "secretRef": { "name": spec.names.secret } },
            ],
            "resources": {
                "requests": spec.resources.requests,
                "limits": spec.resources.limits,
            },
            "livenessProbe": probe(&spec.liveness, spec.container_port),
            "readinessProbe": probe(&spec.readiness, spec.container_port),
        }],
    });
    if !pull_secrets.is_empty() {
        pod_spec["imagePullSecrets"] = Value::Array(pull_secrets);
    }

    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": spec.names.deployment,
            "namespace": spec.names.namespace,
            "labels": spec.labels,
        },
        "spec": {
            "replicas": spec.replicas,
            "strategy": {
                "type": "RollingUpdate",
                "rollingUpdate": { "maxSurge": 1, "maxUnavailable": 0 },
            },
            "selector": { "matchLabels": spec.selector() },
            "template": {
                "metadata": { "labels": spec.labels },
                "spec": pod_spec,
            },
        },
    })
}

fn service(spec: &WorkloadSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": spec.names.service,
            "namespace": spec.names.namespace,
        },
        "spec": {
            "selector": spec.selector(),
            "ports": [{
                "protocol": "TCP",
                "port": SERVICE_PORT,
                "targetPort": spec.container_port,
            }],
            "type": spec.service_type.as_str(),
        },
    })
}

fn ingress(spec: &WorkloadSpec, ingress: &IngressSpec) -> Value {
    let rules: Vec<Value> = ingress
        .hosts
        .iter()
        .map(|host| {
            json!({
                "host": host,
                "http": {
                    "paths": [{
                        "path": "/",
                        "pathType": "Prefix",
                        "backend": {
                            "service": {
                                "name": spec.names.service,
                                "port": { "number": SERVICE_PORT },
                            },
                        },
                    }],
                },
            })
        })
        .collect();

    let mut body = json!({ "rules": rules });
    if !ingress.tls.is_empty() {
        body["tls"] = ingress
            .tls
            .iter()
            .map(|entry| json!({ "hosts": entry.hosts, "secretName": entry.secret_name }))
            .collect();
    }

    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": {
            "name": spec.names.ingress,
            "namespace": spec.names.namespace,
            "annotations": ingress.annotations,
        },
        "spec": body,
    })
}

fn hpa(spec: &WorkloadSpec) -> Value {
    let metric = |name: &str, target: u32| {
        json!({
            "type": "Resource",
            "resource": {
                "name": name,
                "target": { "type": "Utilization", "averageUtilization": target },
            },
        })
    };

    json!({
        "apiVersion": "autoscaling/v2",
        "kind": "HorizontalPodAutoscaler",
        "metadata": {
            "name": spec.names.hpa,
            "namespace": spec.names.namespace,
        },
        "spec": {
            "scaleTargetRef": {
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "name": spec.names.deployment,
            },
            "minReplicas": spec.autoscaling.min_replicas,
            "maxReplicas": spec.autoscaling.max_replicas,
            "metrics": [
                metric("cpu", spec.autoscaling.target_cpu),
                metric("memory", spec.autoscaling.target_memory),
            ],
        },
    })
}
