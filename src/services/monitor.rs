//! Read-only cluster introspection
//!
//! Every lookup degrades to an empty payload with a diagnostic instead of
//! failing, so a broken metrics API or missing ingress never aborts the
//! caller. The one exception is `exec_in_pod`, which has nothing to run in
//! when the workload has no running pod.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::cluster::{ClusterEvent, ExecOutput, PodInfo, PodUsage};
use crate::domain::workload::Workload;
use crate::error::{DeployError, DeployResult, OpResult};
use crate::state::AppState;

use super::context::ClusterContext;

/// Queries pods, endpoints, logs, events and usage for one workload
#[derive(Clone)]
pub struct ClusterMonitor {
    state: Arc<AppState>,
}

impl ClusterMonitor {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Run a kubectl query; `Err` carries the diagnostic text
    async fn query<I, S>(&self, context: &ClusterContext, args: I) -> Result<String, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = context
            .kubectl(&self.state, self.state.settings.timeouts.query)
            .args(args);
        debug!(command = %spec.command_line(), "Cluster query");
        match self.state.executor.run(&spec).await {
            Ok(output) if output.success() => Ok(output.stdout),
            Ok(output) => Err(output.diagnostic()),
            Err(e) => Err(e.to_string()),
        }
    }

    pub async fn pods(&self, context: &ClusterContext, workload: &Workload) -> OpResult<Vec<PodInfo>> {
        let namespace = workload.namespace();
        let parsed = self
            .query(context, ["get", "pods", "-n", namespace, "-o", "json"])
            .await
            .and_then(|stdout| parse_pods(&stdout, Utc::now()));

        match parsed {
            Ok(pods) => OpResult::ok(pods),
            Err(diagnostic) => {
                warn!(namespace = %namespace, error = %diagnostic, "Failed to list pods");
                OpResult::degraded(diagnostic)
            }
        }
    }

    /// Load balancer addresses followed by `https://` ingress hosts
    pub async fn service_endpoints(
        &self,
        context: &ClusterContext,
        workload: &Workload,
    ) -> OpResult<Vec<String>> {
        let namespace = workload.namespace();
        let mut endpoints = Vec::new();
        let mut problems = Vec::new();

        let service = workload.service_name();
        match self
            .query(context, ["get", "service", service.as_str(), "-n", namespace, "-o", "json"])
            .await
            .and_then(|stdout| parse_json(&stdout))
        {
            Ok(doc) => endpoints.extend(load_balancer_addresses(&doc)),
            Err(diagnostic) => {
                debug!(service = %service, error = %diagnostic, "Service lookup failed");
                problems.push(diagnostic);
            }
        }

        let ingress = workload.ingress_name();
        match self
            .query(context, ["get", "ingress", ingress.as_str(), "-n", namespace, "-o", "json"])
            .await
            .and_then(|stdout| parse_json(&stdout))
        {
            Ok(doc) => {
                for host in ingress_hosts(&doc) {
                    let url = format!("https://{}", host);
                    if !endpoints.contains(&url) {
                        endpoints.push(url);
                    }
                }
            }
            Err(diagnostic) => {
                debug!(ingress = %ingress, error = %diagnostic, "Ingress lookup failed");
                problems.push(diagnostic);
            }
        }

        // a workload without ingress is normal; only report when both sources fail
        if endpoints.is_empty() && problems.len() == 2 {
            warn!(namespace = %namespace, "No endpoint source reachable");
            return OpResult::degraded(problems.join("; "));
        }
        OpResult::ok(endpoints)
    }

    /// Run `sh -c <command>` in the given pod, or in the first running pod
    pub async fn exec_in_pod(
        &self,
        context: &ClusterContext,
        workload: &Workload,
        command: &str,
        pod: Option<&str>,
    ) -> DeployResult<OpResult<ExecOutput>> {
        let namespace = workload.namespace();
        let pod = match pod {
            Some(pod) => pod.to_string(),
            None => self.first_running_pod(context, workload).await?,
        };

        let spec = context
            .kubectl(&self.state, self.state.settings.timeouts.exec)
            .args(["exec", pod.as_str(), "-n", namespace, "--", "sh", "-c", command]);
        let output = match self.state.executor.run(&spec).await {
            Ok(output) => output,
            Err(e) => {
                warn!(pod = %pod, error = %e, "Exec failed to run");
                return Ok(OpResult::failed(
                    ExecOutput { pod, output: String::new() },
                    e.to_string(),
                ));
            }
        };

        let combined = [output.stdout.trim(), output.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        if output.success() {
            Ok(OpResult::ok(ExecOutput { pod, output: combined }))
        } else {
            let diagnostic = output.diagnostic();
            warn!(pod = %pod, exit_code = ?output.exit_code, "Command exited with failure");
            Ok(OpResult::failed(ExecOutput { pod, output: combined }, diagnostic))
        }
    }

    /// First pod in the Running phase
    pub async fn first_running_pod(&self, context: &ClusterContext, workload: &Workload) -> DeployResult<String> {
        let pods = self.pods(context, workload).await;
        if !pods.success {
            return Err(DeployError::Query {
                what: "pods".to_string(),
                namespace: workload.namespace().to_string(),
                diagnostic: pods.diagnostic,
            });
        }
        pods.payload
            .into_iter()
            .find(|p| p.status == "Running")
            .map(|p| p.name)
            .ok_or_else(|| DeployError::NoRunningPod {
                namespace: workload.namespace().to_string(),
            })
    }

    /// Deployment logs, last `tail` lines
    pub async fn logs(&self, context: &ClusterContext, workload: &Workload, tail: u32) -> OpResult<String> {
        let target = format!("deployment/{}", workload.deployment_name());
        self.read_logs(context, workload, &target, tail).await
    }

    pub async fn pod_logs(
        &self,
        context: &ClusterContext,
        workload: &Workload,
        pod: &str,
        tail: u32,
    ) -> OpResult<String> {
        self.read_logs(context, workload, pod, tail).await
    }

    async fn read_logs(&self, context: &ClusterContext, workload: &Workload, target: &str, tail: u32) -> OpResult<String> {
        let tail = format!("--tail={}", tail);
        match self
            .query(context, ["logs", target, "-n", workload.namespace(), tail.as_str()])
            .await
        {
            Ok(stdout) => OpResult::ok(stdout),
            Err(diagnostic) => {
                warn!(source = %target, error = %diagnostic, "Failed to read logs");
                OpResult::degraded(diagnostic)
            }
        }
    }

    /// `kubectl top pods`; empty when the metrics API is not installed
    pub async fn resource_usage(&self, context: &ClusterContext, workload: &Workload) -> OpResult<Vec<PodUsage>> {
        match self
            .query(context, ["top", "pods", "-n", workload.namespace(), "--no-headers"])
            .await
        {
            Ok(stdout) => OpResult::ok(parse_usage(&stdout)),
            Err(diagnostic) if diagnostic.contains("Metrics API not available") => {
                debug!(error = %diagnostic, "Metrics API not installed");
                OpResult::ok(Vec::new()).with_diagnostic(diagnostic)
            }
            Err(diagnostic) => {
                warn!(error = %diagnostic, "Resource usage unavailable");
                OpResult::degraded(diagnostic)
            }
        }
    }

    /// Namespace events, most recent first
    pub async fn events(&self, context: &ClusterContext, workload: &Workload, limit: usize) -> OpResult<Vec<ClusterEvent>> {
        let namespace = workload.namespace();
        match self
            .query(context, ["get", "events", "-n", namespace, "-o", "json"])
            .await
            .and_then(|stdout| parse_events(&stdout, limit))
        {
            Ok(events) => OpResult::ok(events),
            Err(diagnostic) => {
                warn!(namespace = %namespace, error = %diagnostic, "Failed to list events");
                OpResult::degraded(diagnostic)
            }
        }
    }
}

fn parse_json(stdout: &str) -> Result<Value, String> {
    serde_json::from_str(stdout).map_err(|e| format!("Unexpected kubectl output: {}", e))
}

fn items(doc: &Value) -> &[Value] {
    doc["items"].as_array().map(Vec::as_slice).unwrap_or_default()
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

/// `2d`, `3h` or `10m`
pub fn format_age(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now - created;
    if age.num_days() > 0 {
        format!("{}d", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h", age.num_hours())
    } else {
        format!("{}m", age.num_minutes().max(0))
    }
}

/// Ready only when at least one `Ready` condition exists and all are `True`
fn is_ready(pod: &Value) -> bool {
    let conditions: Vec<&Value> = pod
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(|c| c.iter().filter(|c| c["type"] == "Ready").collect())
        .unwrap_or_default();
    !conditions.is_empty() && conditions.iter().all(|c| c["status"] == "True")
}

pub fn parse_pods(stdout: &str, now: DateTime<Utc>) -> Result<Vec<PodInfo>, String> {
    let doc = parse_json(stdout)?;
    Ok(items(&doc)
        .iter()
        .map(|pod| {
            let restarts = pod
                .pointer("/status/containerStatuses")
                .and_then(Value::as_array)
                .map(|statuses| {
                    statuses
                        .iter()
                        .map(|s| s["restartCount"].as_u64().unwrap_or(0) as u32)
                        .sum::<u32>()
                })
                .unwrap_or(0);
            let age = DateTime::parse_from_rfc3339(str_at(pod, "/metadata/creationTimestamp"))
                .map(|created| format_age(created.with_timezone(&Utc), now))
                .unwrap_or_else(|_| "unknown".to_string());
            let node = Some(str_at(pod, "/spec/nodeName"))
                .filter(|n| !n.is_empty())
                .map(str::to_string);

            PodInfo {
                name: str_at(pod, "/metadata/name").to_string(),
                status: str_at(pod, "/status/phase").to_string(),
                ready: is_ready(pod),
                restarts,
                age,
                node,
            }
        })
        .collect())
}

fn load_balancer_addresses(service: &Value) -> Vec<String> {
    service
        .pointer("/status/loadBalancer/ingress")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e["ip"].as_str().or_else(|| e["hostname"].as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn ingress_hosts(ingress: &Value) -> Vec<String> {
    ingress
        .pointer("/spec/rules")
        .and_then(Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .filter_map(|r| r["host"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `NAME CPU MEMORY` rows from `kubectl top pods --no-headers`
pub fn parse_usage(stdout: &str) -> Vec<PodUsage> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            match (columns.next(), columns.next(), columns.next()) {
                (Some(name), Some(cpu), Some(memory)) => Some(PodUsage {
                    name: name.to_string(),
                    cpu: cpu.to_string(),
                    memory: memory.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

pub fn parse_events(stdout: &str, limit: usize) -> Result<Vec<ClusterEvent>, String> {
    let doc = parse_json(stdout)?;
    let mut events: Vec<ClusterEvent> = items(&doc)
        .iter()
        .map(|event| {
            let last_seen = ["/lastTimestamp", "/eventTime", "/metadata/creationTimestamp"]
                .iter()
                .map(|p| str_at(event, p))
                .find(|t| !t.is_empty())
                .map(str::to_string);
            ClusterEvent {
                event_type: str_at(event, "/type").to_string(),
                reason: str_at(event, "/reason").to_string(),
                message: str_at(event, "/message").to_string(),
                object: format!(
                    "{}/{}",
                    str_at(event, "/involvedObject/kind").to_lowercase(),
                    str_at(event, "/involvedObject/name")
                ),
                count: event["count"].as_u64().unwrap_or(1) as u32,
                last_seen,
            }
        })
        .collect();

    // RFC 3339 in UTC sorts lexically
    events.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
    events.truncate(limit);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workload::Cluster;
    use crate::infra::command::testing::ScriptedExecutor;
    use crate::infra::command::CommandOutput;
    use crate::services::context::ClusterContextManager;
    use chrono::Duration;
    use serde_json::json;

    const PODS: &str = r#"{"items": [
        {"metadata": {"name": "blog-deployment-7d9f-abcde", "creationTimestamp": "2026-10-16T08:00:00Z"},
         "spec": {"nodeName": "node-a"},
         "status": {"phase": "Running",
                    "conditions": [{"type": "Initialized", "status": "True"}, {"type": "Ready", "status": "True"}],
                    "containerStatuses": [{"restartCount": 2}, {"restartCount": 1}]}},
        {"metadata": {"name": "blog-deployment-7d9f-fghij", "creationTimestamp": "2026-10-18T09:50:00Z"},
         "status": {"phase": "Pending", "conditions": [{"type": "Ready", "status": "False"}]}},
        {"metadata": {"name": "blog-deployment-7d9f-klmno", "creationTimestamp": "2026-10-18T07:00:00Z"},
         "status": {"phase": "Running"}}
    ]}"#;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T10:00:00Z").unwrap().with_timezone(&Utc)
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

    async fn monitor(executor: Arc<ScriptedExecutor>) -> (ClusterMonitor, ClusterContext) {
        let state = Arc::new(AppState::with_executor(executor));
        let context = ClusterContextManager::new(state.clone())
            .for_workload(&workload())
            .await
            .unwrap();
        (ClusterMonitor::new(state), context)
    }

    #[test]
    fn test_parse_pods() {
        let pods = parse_pods(PODS, now()).unwrap();
        assert_eq!(pods.len(), 3);

        assert_eq!(pods[0].status, "Running");
        assert!(pods[0].ready);
        assert_eq!(pods[0].restarts, 3);
        assert_eq!(pods[0].age, "2d");
        assert_eq!(pods[0].node.as_deref(), Some("node-a"));

        assert!(!pods[1].ready);
        assert_eq!(pods[1].age, "10m");
        assert_eq!(pods[1].node, None);

        // no Ready condition at all is not ready
        assert!(!pods[2].ready);
        assert_eq!(pods[2].age, "3h");
    }

    #[test]
    fn test_format_age_buckets() {
        assert_eq!(format_age(now() - Duration::minutes(59), now()), "59m");
        assert_eq!(format_age(now() - Duration::hours(23), now()), "23h");
        assert_eq!(format_age(now() - Duration::hours(49), now()), "2d");
    }

    #[test]
    fn test_parse_usage_skips_malformed_rows() {
        let usage = parse_usage("blog-deployment-a   12m   64Mi\n\nbroken\nblog-deployment-b 3m 80Mi\n");
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].cpu, "12m");
        assert_eq!(usage[1].memory, "80Mi");
    }

    #[test]
    fn test_parse_events_most_recent_first() {
        let doc = json!({"items": [
            {"type": "Normal", "reason": "Scheduled", "message": "assigned", "count": 1,
             "involvedObject": {"kind": "Pod", "name": "blog-a"}, "lastTimestamp": "2026-10-18T09:00:00Z"},
            {"type": "Warning", "reason": "BackOff", "message": "back-off restarting", "count": 7,
             "involvedObject": {"kind": "Pod", "name": "blog-a"}, "lastTimestamp": "2026-10-18T09:30:00Z"},
            {"type": "Normal", "reason": "Pulled", "message": "pulled",
             "involvedObject": {"kind": "Pod", "name": "blog-b"}, "eventTime": "2026-10-18T09:10:00Z"}
        ]});

        let events = parse_events(&doc.to_string(), 2).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, "BackOff");
        assert_eq!(events[0].count, 7);
        assert_eq!(events[0].object, "pod/blog-a");
        assert_eq!(events[1].reason, "Pulled");
        assert_eq!(events[1].count, 1);
    }

    #[tokio::test]
    async fn test_pods_degrade_on_failure() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("get pods", CommandOutput::failed(1, "error: You must be logged in")),
        );
        let (monitor, context) = monitor(executor).await;

        let result = monitor.pods(&context, &workload()).await;
        assert!(!result.success);
        assert!(result.payload.is_empty());
        assert!(result.diagnostic.contains("logged in"));
    }

    #[tokio::test]
    async fn test_endpoints_merge_sources() {
        let service = json!({"status": {"loadBalancer": {"ingress": [{"ip": "203.0.113.7"}, {"hostname": "lb.example.net"}]}}});
        let ingress = json!({"spec": {"rules": [{"host": "blog.example.com"}, {"host": "www.blog.example.com"}]}});
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on("get service blog-service", CommandOutput::ok(service.to_string()))
                .on("get ingress blog-ingress", CommandOutput::ok(ingress.to_string())),
        );
        let (monitor, context) = monitor(executor).await;

        let result = monitor.service_endpoints(&context, &workload()).await;
        assert!(result.success);
        assert_eq!(
            result.payload,
            vec![
                "203.0.113.7",
                "lb.example.net",
                "https://blog.example.com",
                "https://www.blog.example.com"
            ]
        );
    }

    #[tokio::test]
    async fn test_endpoints_without_ingress() {
        let service = json!({"status": {"loadBalancer": {"ingress": [{"ip": "203.0.113.7"}]}}});
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on("get service", CommandOutput::ok(service.to_string()))
                .on("get ingress", CommandOutput::failed(1, "NotFound")),
        );
        let (monitor, context) = monitor(executor).await;

        let result = monitor.service_endpoints(&context, &workload()).await;
        assert!(result.success);
        assert_eq!(result.payload, vec!["203.0.113.7"]);
    }

    #[tokio::test]
    async fn test_exec_uses_first_running_pod() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on("get pods", CommandOutput::ok(PODS))
                .on("exec", CommandOutput::ok("Migrated: 2024_01_01_create_posts\n")),
        );
        let (monitor, context) = monitor(executor.clone()).await;

        let result = monitor
            .exec_in_pod(&context, &workload(), "php artisan migrate --force", None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.payload.pod, "blog-deployment-7d9f-abcde");
        assert!(result.payload.output.contains("Migrated"));
        assert_eq!(
            executor.count("exec blog-deployment-7d9f-abcde -n blog -- sh -c php artisan migrate --force"),
            1
        );
    }

    #[tokio::test]
    async fn test_exec_without_running_pod() {
        let executor = Arc::new(ScriptedExecutor::new().on("get pods", CommandOutput::ok(r#"{"items": []}"#)));
        let (monitor, context) = monitor(executor.clone()).await;

        let err = monitor.exec_in_pod(&context, &workload(), "ls", None).await.unwrap_err();
        assert_eq!(err.to_string(), "No running pods found in namespace blog");
        assert_eq!(executor.count(" exec "), 0);
    }

    #[tokio::test]
    async fn test_exec_keeps_pod_listing_diagnostic() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("get pods", CommandOutput::failed(1, "pods is forbidden: User \"ci\" cannot list")),
        );
        let (monitor, context) = monitor(executor.clone()).await;

        let err = monitor.exec_in_pod(&context, &workload(), "ls", None).await.unwrap_err();
        assert!(matches!(err, DeployError::Query { .. }));
        assert!(err.to_string().contains("cannot list"));
        assert_eq!(executor.count(" exec "), 0);
    }

    #[tokio::test]
    async fn test_exec_nonzero_exit() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("exec", CommandOutput::failed(1, "sh: rake: not found")),
        );
        let (monitor, context) = monitor(executor).await;

        let result = monitor
            .exec_in_pod(&context, &workload(), "rake db:migrate", Some("blog-deployment-x"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.payload.pod, "blog-deployment-x");
        assert!(result.diagnostic.contains("not found"));
    }

    #[tokio::test]
    async fn test_logs_and_usage() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on("logs deployment/blog-deployment", CommandOutput::ok("GET / 200\n"))
                .on("top pods", CommandOutput::failed(1, "error: Metrics API not available")),
        );
        let (monitor, context) = monitor(executor.clone()).await;

        let logs = monitor.logs(&context, &workload(), 100).await;
        assert!(logs.success);
        assert_eq!(logs.payload, "GET / 200\n");
        assert_eq!(executor.count("--tail=100"), 1);

        let usage = monitor.resource_usage(&context, &workload()).await;
        assert!(usage.success);
        assert!(usage.payload.is_empty());
        assert!(usage.diagnostic.contains("Metrics API"));
    }

    #[tokio::test]
    async fn test_usage_degrades_on_other_failures() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("top pods", CommandOutput::failed(1, "pods.metrics.k8s.io is forbidden")),
        );
        let (monitor, context) = monitor(executor).await;

        let usage = monitor.resource_usage(&context, &workload()).await;
        assert!(!usage.success);
        assert!(usage.diagnostic.contains("forbidden"));
    }
}
