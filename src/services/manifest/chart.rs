//! Chart packaging
//!
//! Builds the values document, chart metadata and template set for
//! `helm upgrade --install`. Values come from the same `WorkloadSpec` as the
//! raw manifests.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::env::constants::MANAGED_BY;
use crate::domain::deploy::DeployOptions;
use crate::domain::registry::RegistryCredential;
use crate::domain::workload::Workload;
use crate::error::DeployResult;
use crate::state::AppState;

use super::raw::ManifestGenerator;
use super::spec::{Probe, WorkloadSpec, INGRESS_CLASS_ANNOTATION, SERVICE_PORT};
use super::templates;

pub const CHART_VERSION: &str = "1.0.0";

/// Chart.yaml
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub api_version: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub chart_type: String,
    pub version: String,
    pub app_version: String,
    pub keywords: Vec<String>,
    pub maintainers: Vec<Maintainer>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Maintainer {
    pub name: String,
}

/// One file under `templates/`
#[derive(Clone, Debug, PartialEq)]
pub struct ChartTemplate {
    pub file: &'static str,
    pub content: &'static str,
    /// JSON pointer into the values document that switches this template on
    pub gate: Option<&'static str>,
}

impl ChartTemplate {
    const fn always(file: &'static str, content: &'static str) -> Self {
        Self {
            file,
            content,
            gate: None,
        }
    }

    const fn gated(file: &'static str, content: &'static str, gate: &'static str) -> Self {
        Self {
            file,
            content,
            gate: Some(gate),
        }
    }
}

/// A complete chart ready to be written to disk
#[derive(Clone, Debug, PartialEq)]
pub struct ChartPackage {
    pub release: String,
    pub metadata: ChartMetadata,
    pub values: Value,
    pub templates: Vec<ChartTemplate>,
}

impl ChartPackage {
    /// Templates whose gate is on for the current values
    pub fn active_templates(&self) -> Vec<&'static str> {
        self.templates
            .iter()
            .filter(|t| match t.gate {
                Some(pointer) => self.values.pointer(pointer).and_then(Value::as_bool).unwrap_or(false),
                None => true,
            })
            .map(|t| t.file)
            .collect()
    }

    /// Values without secret material, shipped inside the chart directory
    pub fn public_values(&self) -> Value {
        let mut values = self.values.clone();
        values["secrets"] = json!({});
        values
    }

    pub fn values_yaml(&self) -> DeployResult<String> {
        Ok(serde_yaml::to_string(&self.values)?)
    }

    /// Write Chart.yaml, values.yaml and templates/ into `dir`.
    ///
    /// The in-chart values.yaml carries no secrets; pass `values_yaml()` with
    /// `-f` at install time.
    pub fn write_to(&self, dir: &Path) -> DeployResult<()> {
        let templates_dir = dir.join("templates");
        std::fs::create_dir_all(&templates_dir)?;
        std::fs::write(dir.join("Chart.yaml"), serde_yaml::to_string(&self.metadata)?)?;
        std::fs::write(dir.join("values.yaml"), serde_yaml::to_string(&self.public_values())?)?;
        for template in &self.templates {
            std::fs::write(templates_dir.join(template.file), template.content)?;
        }
        Ok(())
    }
}

/// Builds chart packages
#[derive(Clone)]
pub struct ChartBuilder {
    generator: ManifestGenerator,
}

impl ChartBuilder {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            generator: ManifestGenerator::new(state),
        }
    }

    pub fn build(
        &self,
        workload: &Workload,
        credentials: &[RegistryCredential],
        options: &DeployOptions,
    ) -> DeployResult<ChartPackage> {
        let spec = self.generator.spec(workload, credentials, options)?;
        Ok(package(&spec))
    }
}

/// Assemble the chart for a resolved spec
pub fn package(spec: &WorkloadSpec) -> ChartPackage {
    let mut chart_templates = vec![
        ChartTemplate::always("_helpers.tpl", templates::HELPERS),
        ChartTemplate::always("deployment.yaml", templates::DEPLOYMENT),
        ChartTemplate::always("service.yaml", templates::SERVICE),
        ChartTemplate::gated("ingress.yaml", templates::INGRESS, "/ingress/enabled"),
        ChartTemplate::always("configmap.yaml", templates::CONFIGMAP),
        ChartTemplate::always("secret.yaml", templates::SECRET),
        ChartTemplate::gated("hpa.yaml", templates::HPA, "/autoscaling/enabled"),
        ChartTemplate::gated("pdb.yaml", templates::PDB, "/podDisruptionBudget/enabled"),
        ChartTemplate::gated("serviceaccount.yaml", templates::SERVICE_ACCOUNT, "/serviceAccount/create"),
        ChartTemplate::always("NOTES.txt", templates::NOTES),
    ];
    if spec.framework.needs_storage() {
        chart_templates.push(ChartTemplate::gated("pvc.yaml", templates::PERSISTENT_VOLUME_CLAIM, "/persistence/enabled"));
        chart_templates.push(ChartTemplate::gated("role.yaml", templates::ROLE, "/rbac/create"));
        chart_templates.push(ChartTemplate::gated("rolebinding.yaml", templates::ROLE_BINDING, "/rbac/create"));
    }

    ChartPackage {
        release: spec.slug.clone(),
        metadata: metadata(spec),
        values: values(spec),
        templates: chart_templates,
    }
}

fn metadata(spec: &WorkloadSpec) -> ChartMetadata {
    ChartMetadata {
        api_version: "v2".to_string(),
        name: spec.slug.clone(),
        description: format!("Helm chart for {} ({})", spec.display_name, spec.framework),
        chart_type: "application".to_string(),
        version: CHART_VERSION.to_string(),
        app_version: spec.version.clone().unwrap_or_else(|| CHART_VERSION.to_string()),
        keywords: vec![
            spec.framework.to_string(),
            MANAGED_BY.to_string(),
            "kubernetes".to_string(),
        ],
        maintainers: vec![Maintainer {
            name: MANAGED_BY.to_string(),
        }],
    }
}

fn probe_values(probe: &Probe) -> Value {
    json!({
        "enabled": true,
        "path": probe.path,
        "initialDelaySeconds": probe.initial_delay_seconds,
        "periodSeconds": probe.period_seconds,
        "timeoutSeconds": probe.timeout_seconds,
        "failureThreshold": probe.failure_threshold,
    })
}

/// The flat values document consumed by the templates
pub fn values(spec: &WorkloadSpec) -> Value {
    let (ingress_enabled, ingress_hosts, ingress_tls, ingress_annotations) = match spec.ingress {
        Some(ref ingress) => {
            let mut annotations = ingress.annotations.clone();
            // the template sets ingressClassName; the API rejects both
            annotations.remove(INGRESS_CLASS_ANNOTATION);
            annotations.insert(
                "nginx.ingress.kubernetes.io/force-ssl-redirect".to_string(),
                "true".to_string(),
            );
            let hosts: Vec<Value> = ingress
                .hosts
                .iter()
                .map(|host| json!({ "host": host, "paths": [{ "path": "/", "pathType": "Prefix" }] }))
                .collect();
            let tls: Vec<Value> = ingress
                .tls
                .iter()
                .map(|entry| json!({ "secretName": entry.secret_name, "hosts": entry.hosts }))
                .collect();
            (true, hosts, tls, json!(annotations))
        }
        None => (false, Vec::new(), Vec::new(), json!({})),
    };

    let needs_storage = spec.framework.needs_storage();
    let (volumes, volume_mounts, init_containers) = if needs_storage {
        storage_values(spec)
    } else {
        (json!([]), json!([]), json!([]))
    };

    let pull_secrets: Vec<Value> = spec
        .pull_secrets
        .iter()
        .map(|name| json!({ "name": name }))
        .collect();

    json!({
        "nameOverride": "",
        "fullnameOverride": spec.slug,
        "replicaCount": spec.replicas,
        "image": {
            "registry": spec.image.registry,
            "repository": spec.image.repository,
            "tag": spec.image.tag,
            "pullPolicy": "Always",
        },
        "imagePullSecrets": pull_secrets,
        "serviceAccount": {
            "create": true,
            "annotations": {},
            "name": "",
        },
        "podAnnotations": {
            "prometheus.io/scrape": "true",
            "prometheus.io/port": spec.container_port.to_string(),
            "prometheus.io/path": "/metrics",
        },
        "podSecurityContext": {
            "fsGroup": 1000,
            "runAsUser": 1000,
            "runAsNonRoot": true,
        },
        "securityContext": {
            "allowPrivilegeEscalation": false,
            "capabilities": { "drop": ["ALL"] },
            "readOnlyRootFilesystem": false,
        },
        "service": {
            "type": spec.service_type.as_str(),
            "port": SERVICE_PORT,
            "targetPort": spec.container_port,
            "annotations": {},
        },
        "ingress": {
            "enabled": ingress_enabled,
            "className": "nginx",
            "annotations": ingress_annotations,
            "hosts": ingress_hosts,
            "tls": ingress_tls,
        },
        "resources": {
            "requests": spec.resources.requests,
            "limits": spec.resources.limits,
        },
        "livenessProbe": probe_values(&spec.liveness),
        "readinessProbe": probe_values(&spec.readiness),
        "autoscaling": {
            "enabled": spec.autoscaling.enabled,
            "minReplicas": spec.autoscaling.min_replicas,
            "maxReplicas": spec.autoscaling.max_replicas,
            "targetCPUUtilizationPercentage": spec.autoscaling.target_cpu,
            "targetMemoryUtilizationPercentage": spec.autoscaling.target_memory,
            "behavior": {
                "scaleDown": {
                    "stabilizationWindowSeconds": 300,
                    "policies": [{ "type": "Percent", "value": 50, "periodSeconds": 60 }],
                },
                "scaleUp": {
                    "stabilizationWindowSeconds": 60,
                    "policies": [{ "type": "Percent", "value": 100, "periodSeconds": 60 }],
                },
            },
        },
        "podDisruptionBudget": {
            "enabled": spec.disruption_budget.enabled,
            "minAvailable": spec.disruption_budget.min_available,
        },
        "nodeSelector": {},
        "tolerations": [],
        "affinity": {
            "podAntiAffinity": {
                "preferredDuringSchedulingIgnoredDuringExecution": [{
                    "weight": 100,
                    "podAffinityTerm": {
                        "labelSelector": {
                            "matchExpressions": [{
                                "key": "app",
                                "operator": "In",
                                "values": [spec.slug],
                            }],
                        },
                        "topologyKey": "kubernetes.io/hostname",
                    },
                }],
            },
        },
        "persistence": {
            "enabled": needs_storage,
            "size": "1Gi",
            "accessMode": "ReadWriteOnce",
        },
        "volumes": volumes,
        "volumeMounts": volume_mounts,
        "initContainers": init_containers,
        "config": spec.config_data,
        "secrets": spec.secret_data,
        "env": [],
        "rbac": { "create": needs_storage },
    })
}

/// Storage claim, in-memory cache and the permissions init container
fn storage_values(spec: &WorkloadSpec) -> (Value, Value, Value) {
    let volumes = json!([
        { "name": "storage", "persistentVolumeClaim": { "claimName": spec.names.storage_claim } },
        { "name": "cache", "emptyDir": { "medium": "Memory", "sizeLimit": "128Mi" } },
    ]);
    let mounts = json!([
        { "name": "storage", "mountPath": "/var/www/html/storage/app", "subPath": "app" },
        { "name": "storage", "mountPath": "/var/www/html/storage/logs", "subPath": "logs" },
        { "name": "cache", "mountPath": "/var/www/html/storage/framework/cache" },
    ]);
    let init = json!([{
        "name": "storage-permissions",
        "image": "busybox:1.36",
        "command": ["sh", "-c", "mkdir -p /storage/app /storage/logs && chown -R 1000:1000 /storage"],
        "securityContext": { "runAsUser": 0, "runAsNonRoot": false },
        "volumeMounts": [{ "name": "storage", "mountPath": "/storage" }],
    }]);
    (volumes, mounts, init)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::manifest::ResourceKind;
    use crate::domain::workload::Framework;
    use crate::infra::command::testing::ScriptedExecutor;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::with_executor(Arc::new(ScriptedExecutor::new())))
    }

    fn blog() -> Workload {
        let mut workload = Workload::new("blog");
        workload.domains = vec!["blog.example.com".to_string()];
        workload.version = Some("2.1.0".to_string());
        workload.env_vars.insert("MAIL_HOST".into(), "smtp".into());
        workload.env_vars.insert("MAIL_PASSWORD".into(), "x".into());
        workload
    }

    #[test]
    fn test_metadata() {
        let chart = ChartBuilder::new(state())
            .build(&blog(), &[], &DeployOptions::default())
            .unwrap();

        assert_eq!(chart.release, "blog");
        assert_eq!(chart.metadata.name, "blog");
        assert_eq!(chart.metadata.api_version, "v2");
        assert_eq!(chart.metadata.app_version, "2.1.0");
        assert!(chart.metadata.keywords.contains(&"kubernetes".to_string()));

        let yaml = serde_yaml::to_string(&chart.metadata).unwrap();
        assert!(yaml.contains("apiVersion: v2"));
        assert!(yaml.contains("type: application"));
    }

    #[test]
    fn test_chart_matches_raw_manifests() {
        let state = state();
        let options = DeployOptions {
            replicas: Some(4),
            cpu_limit: Some("1".into()),
            enable_autoscaling: true,
            ..Default::default()
        };
        let workload = blog();
        let raw = ManifestGenerator::new(state.clone())
            .generate(&workload, &[], &options)
            .unwrap();
        let values = ChartBuilder::new(state).build(&workload, &[], &options).unwrap().values;

        let deployment = raw.get(ResourceKind::Deployment).unwrap();
        let container = &deployment["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(values["replicaCount"], deployment["spec"]["replicas"]);
        assert_eq!(
            format!(
                "{}/{}:{}",
                values["image"]["registry"].as_str().unwrap(),
                values["image"]["repository"].as_str().unwrap(),
                values["image"]["tag"].as_str().unwrap()
            ),
            container["image"].as_str().unwrap()
        );
        assert_eq!(values["resources"], container["resources"]);
        assert_eq!(values["livenessProbe"]["path"], container["livenessProbe"]["httpGet"]["path"]);
        assert_eq!(
            values["readinessProbe"]["initialDelaySeconds"],
            container["readinessProbe"]["initialDelaySeconds"]
        );
        assert_eq!(values["config"], raw.get(ResourceKind::ConfigMap).unwrap()["data"]);
        assert_eq!(values["secrets"], raw.get(ResourceKind::Secret).unwrap()["stringData"]);
        assert_eq!(
            values["ingress"]["hosts"][0]["host"],
            raw.get(ResourceKind::Ingress).unwrap()["spec"]["rules"][0]["host"]
        );
        assert_eq!(
            values["ingress"]["tls"][0]["secretName"],
            raw.get(ResourceKind::Ingress).unwrap()["spec"]["tls"][0]["secretName"]
        );
        let hpa = raw.get(ResourceKind::Hpa).unwrap();
        assert_eq!(values["autoscaling"]["minReplicas"], hpa["spec"]["minReplicas"]);
        assert_eq!(values["autoscaling"]["maxReplicas"], hpa["spec"]["maxReplicas"]);
        assert_eq!(values["fullnameOverride"], "blog");

        let selector = chart_selector(&values);
        assert_eq!(deployment["spec"]["selector"]["matchLabels"], selector);
        assert_eq!(raw.get(ResourceKind::Service).unwrap()["spec"]["selector"], selector);
        for (key, value) in selector.as_object().unwrap() {
            assert_eq!(&deployment["spec"]["template"]["metadata"]["labels"][key], value);
        }
        assert_eq!(
            values["affinity"]["podAntiAffinity"]["preferredDuringSchedulingIgnoredDuringExecution"][0]
                ["podAffinityTerm"]["labelSelector"]["matchExpressions"][0]["key"],
            "app"
        );
    }

    /// Keys of the `app.selectorLabels` helper with the release name resolved
    fn chart_selector(values: &Value) -> Value {
        let block = templates::HELPERS
            .split("{{- define \"app.selectorLabels\" -}}")
            .nth(1)
            .and_then(|rest| rest.split("{{- end }}").next())
            .unwrap();
        let fullname = values["fullnameOverride"].as_str().unwrap();
        let mut selector = serde_json::Map::new();
        for line in block.lines().filter(|l| !l.trim().is_empty()) {
            let (key, value) = line.split_once(": ").unwrap();
            let value = value.replace("{{ include \"app.fullname\" . }}", fullname);
            selector.insert(key.trim().to_string(), Value::String(value));
        }
        Value::Object(selector)
    }

    #[test]
    fn test_ingress_class_set_once() {
        let state = state();
        let workload = blog();
        let values = ChartBuilder::new(state.clone())
            .build(&workload, &[], &DeployOptions::default())
            .unwrap()
            .values;
        assert_eq!(values["ingress"]["className"], "nginx");
        assert!(values["ingress"]["annotations"].get(INGRESS_CLASS_ANNOTATION).is_none());
        assert_eq!(values["ingress"]["annotations"]["cert-manager.io/cluster-issuer"], "letsencrypt-prod");

        let raw = ManifestGenerator::new(state)
            .generate(&workload, &[], &DeployOptions::default())
            .unwrap();
        let ingress = raw.get(ResourceKind::Ingress).unwrap();
        assert_eq!(ingress["metadata"]["annotations"][INGRESS_CLASS_ANNOTATION], "nginx");
        assert!(ingress["spec"].get("ingressClassName").is_none());
    }

    #[test]
    fn test_template_gates() {
        let chart = ChartBuilder::new(state())
            .build(&Workload::new("api"), &[], &DeployOptions::default())
            .unwrap();
        let active = chart.active_templates();

        assert!(active.contains(&"deployment.yaml"));
        assert!(active.contains(&"pdb.yaml"));
        assert!(active.contains(&"serviceaccount.yaml"));
        assert!(!active.contains(&"ingress.yaml"));
        assert!(!active.contains(&"hpa.yaml"));
        assert!(!chart.templates.iter().any(|t| t.file == "role.yaml"));

        let options = DeployOptions {
            enable_pdb: Some(false),
            enable_autoscaling: true,
            ..Default::default()
        };
        let chart = ChartBuilder::new(state()).build(&blog(), &[], &options).unwrap();
        let active = chart.active_templates();
        assert!(active.contains(&"ingress.yaml"));
        assert!(active.contains(&"hpa.yaml"));
        assert!(!active.contains(&"pdb.yaml"));
    }

    #[test]
    fn test_laravel_extras() {
        let mut workload = Workload::new("shop");
        workload.framework = Framework::Laravel;
        let chart = ChartBuilder::new(state())
            .build(&workload, &[], &DeployOptions::default())
            .unwrap();
        let active = chart.active_templates();

        assert!(active.contains(&"role.yaml"));
        assert!(active.contains(&"rolebinding.yaml"));
        assert!(active.contains(&"pvc.yaml"));
        assert_eq!(chart.values["rbac"]["create"], true);
        assert_eq!(chart.values["volumes"][0]["persistentVolumeClaim"]["claimName"], "shop-storage");
        assert_eq!(chart.values["initContainers"][0]["name"], "storage-permissions");
        assert_eq!(chart.values["config"]["QUEUE_CONNECTION"], "redis");
    }

    #[test]
    fn test_write_to_keeps_secrets_out_of_chart_dir() {
        let mut workload = blog();
        workload.secrets.app_key = Some("base64:topsecret".into());
        let chart = ChartBuilder::new(state())
            .build(&workload, &[], &DeployOptions::default())
            .unwrap();
        let dir = tempfile::tempdir().unwrap();

        chart.write_to(dir.path()).unwrap();

        let values = std::fs::read_to_string(dir.path().join("values.yaml")).unwrap();
        assert!(!values.contains("topsecret"));
        assert!(chart.values_yaml().unwrap().contains("topsecret"));
        assert!(dir.path().join("Chart.yaml").exists());
        assert!(dir.path().join("templates/_helpers.tpl").exists());
        assert!(dir.path().join("templates/NOTES.txt").exists());
    }
}
