//! 集群查询结果

use serde::{Deserialize, Serialize};

/// Pod 概要
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PodInfo {
    pub name: String,
    /// Pod phase (Running / Pending / ...)
    pub status: String,
    pub ready: bool,
    /// 所有容器重启次数之和
    pub restarts: u32,
    /// 2d / 3h / 10m
    pub age: String,
    pub node: Option<String>,
}

/// Pod 资源使用（kubectl top）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PodUsage {
    pub name: String,
    pub cpu: String,
    pub memory: String,
}

/// 命名空间事件
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClusterEvent {
    /// Normal / Warning
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub message: String,
    /// kind/name
    pub object: String,
    pub count: u32,
    pub last_seen: Option<String>,
}

/// pod 内命令输出
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecOutput {
    pub pod: String,
    pub output: String,
}

/// 扩缩容结果
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ScaleOutcome {
    pub new_replicas: u32,
    pub output: String,
}
