//! 部署相关领域模型

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cluster::PodInfo;
use super::manifest::ResourceKind;

/// 部署任务状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Running,
    Success,
    Failed,
}

impl DeployStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Running => "running",
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStatus::Success | DeployStatus::Failed)
    }
}

/// 编排状态机
///
/// Generating → SecretsProvisioned → Applying → RolloutPending →
/// RolloutComplete | RolloutFailed → HooksRun → Done。不可续跑，失败后整体重试。
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentPhase {
    Generating,
    SecretsProvisioned,
    Applying,
    RolloutPending,
    RolloutComplete,
    RolloutFailed,
    HooksRun,
    Done,
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    /// 日志摘要中使用的图标
    pub fn icon(&self) -> &'static str {
        match self {
            StageStatus::Success => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "⊘",
            StageStatus::Running => "⟳",
            StageStatus::Pending => "○",
        }
    }
}

/// 部署阶段信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployStage {
    /// 阶段标识 (e.g., "context", "apply", "rollout")
    pub name: String,
    /// 显示名称 (e.g., "Cluster Context", "Apply Manifests")
    pub display_name: String,
    /// 开始时间
    pub started_at: Option<DateTime<Utc>>,
    /// 结束时间
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    /// 阶段状态
    pub status: StageStatus,
    /// 附加信息
    pub message: Option<String>,
}

impl DeployStage {
    /// 创建新的待执行阶段
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过阶段
    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }
}

/// 日志行
#[derive(Clone, Debug, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: String, // stdout | stderr
    pub content: String,
}

impl LogLine {
    /// 创建新日志行
    pub fn new(stream: &str, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: stream.to_string(),
            content: content.into(),
        }
    }

    /// 创建 stdout 日志行
    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new("stdout", content)
    }

    /// 创建 stderr 日志行
    pub fn stderr(content: impl Into<String>) -> Self {
        Self::new("stderr", content)
    }
}

/// Service 类型
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

/// 部署选项，缺省字段使用默认值
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployOptions {
    pub replicas: Option<u32>,
    pub service_type: ServiceType,
    /// 显式主机名，优先于绑定域名
    pub host: Option<String>,
    pub enable_tls: bool,
    pub enable_autoscaling: bool,
    pub min_replicas: Option<u32>,
    pub max_replicas: Option<u32>,
    pub target_cpu_utilization: Option<u32>,
    pub target_memory_utilization: Option<u32>,
    pub memory_request: Option<String>,
    pub cpu_request: Option<String>,
    pub memory_limit: Option<String>,
    pub cpu_limit: Option<String>,
    /// 仅 chart 路径
    pub enable_pdb: Option<bool>,
    pub pdb_min_available: Option<u32>,
    /// 覆盖 rollout 等待超时
    pub rollout_timeout_secs: Option<u64>,
    /// 跳过部署后钩子
    pub skip_hooks: bool,
}

/// 交付方式
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployMethod {
    Manifests,
    Chart,
}

/// 单个外部步骤的结果（apply、helm、凭据同步）
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct StepOutcome {
    pub success: bool,
    pub output: String,
}

impl StepOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// rollout 等待结果
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RolloutOutcome {
    pub success: bool,
    pub timed_out: bool,
    pub diagnostic: String,
}

/// 部署后钩子结果
#[derive(Clone, Debug, Serialize)]
pub struct HookOutcome {
    pub command: String,
    pub pod: Option<String>,
    pub success: bool,
    pub output: String,
}

/// 一次部署调用的完整记录
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentAttempt {
    pub id: String,
    pub workload: String,
    pub method: DeployMethod,
    pub status: DeployStatus,
    pub phase: DeploymentPhase,
    /// 依次经过的状态
    pub phases: Vec<DeploymentPhase>,
    /// 按资源类型的 apply 结果（manifest 路径）
    pub applied: BTreeMap<ResourceKind, StepOutcome>,
    /// helm release 结果（chart 路径）
    pub release: Option<StepOutcome>,
    /// 按 secret 名称的凭据同步结果
    pub credentials: BTreeMap<String, StepOutcome>,
    pub rollout: Option<RolloutOutcome>,
    pub hooks: Vec<HookOutcome>,
    pub endpoints: Vec<String>,
    pub pods: Vec<PodInfo>,
    /// 部署阶段详情
    pub stages: Vec<DeployStage>,
    pub log: Vec<LogLine>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DeploymentAttempt {
    /// 创建新记录
    pub fn new(workload: &str, method: DeployMethod) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workload: workload.to_string(),
            method,
            status: DeployStatus::Running,
            phase: DeploymentPhase::Generating,
            phases: Vec::new(),
            applied: BTreeMap::new(),
            release: None,
            credentials: BTreeMap::new(),
            rollout: None,
            hooks: Vec::new(),
            endpoints: Vec::new(),
            pods: Vec::new(),
            stages: Vec::new(),
            log: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// 进入新状态并记录
    pub fn enter(&mut self, phase: DeploymentPhase) {
        self.phase = phase;
        self.phases.push(phase);
    }

    /// 按资源类型的成功标记
    pub fn applied_map(&self) -> BTreeMap<ResourceKind, bool> {
        self.applied.iter().map(|(k, v)| (*k, v.success)).collect()
    }

    pub fn all_applied(&self) -> bool {
        self.applied.values().all(|o| o.success) && self.release.as_ref().map_or(true, |r| r.success)
    }

    pub fn rollout_succeeded(&self) -> bool {
        self.rollout.as_ref().is_some_and(|r| r.success)
    }

    /// 设置记录完成：所有资源 apply 成功且 rollout 完成才算成功
    pub fn complete(&mut self) {
        self.status = if self.all_applied() && self.rollout_succeeded() {
            DeployStatus::Success
        } else {
            DeployStatus::Failed
        };
        self.enter(DeploymentPhase::Done);
        self.finished_at = Some(Utc::now());
    }

    pub fn success(&self) -> bool {
        self.status == DeployStatus::Success
    }

    pub fn log_stdout(&mut self, content: impl Into<String>) {
        self.log.push(LogLine::stdout(content));
    }

    pub fn log_stderr(&mut self, content: impl Into<String>) {
        self.log.push(LogLine::stderr(content));
    }
}
