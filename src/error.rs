//! 统一错误处理
//!
//! `DeployError` 覆盖部署核心的所有失败类型；`OpResult` 是对外操作统一的
//! `{success, payload, diagnostic}` 结果结构。

use serde::Serialize;

use crate::infra::cipher::CipherError;
use crate::infra::command::CommandError;

/// 部署核心错误
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// 配置缺失或非法（未绑定集群、凭据格式错误、未知 provider 等），立即中止
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 集群或镜像仓库不可达，立即中止
    #[error("connectivity error for {target}: {diagnostic}")]
    Connectivity { target: String, diagnostic: String },

    /// 单个资源 apply 失败，不中止后续资源
    #[error("failed to apply {kind}: {diagnostic}")]
    Apply { kind: String, diagnostic: String },

    /// rollout 在限定时间内未完成
    #[error("rollout did not complete within {timeout_secs}s")]
    RolloutTimeout { timeout_secs: u64 },

    /// 命名空间中没有运行中的 pod
    #[error("No running pods found in namespace {namespace}")]
    NoRunningPod { namespace: String },

    /// 只读查询失败，保留 kubectl 诊断
    #[error("failed to list {what} in namespace {namespace}: {diagnostic}")]
    Query {
        what: String,
        namespace: String,
        diagnostic: String,
    },

    /// pod 内命令失败
    #[error("command failed in pod {pod}: {diagnostic}")]
    Execution { pod: String, diagnostic: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("credential store error: {0}")]
    Store(String),
}

impl DeployError {
    /// 创建配置错误
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// 创建连接错误
    pub fn connectivity(target: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::Connectivity {
            target: target.into(),
            diagnostic: diagnostic.into(),
        }
    }

    /// 是否在任何集群写操作之前中止整个调用
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Connectivity { .. })
    }
}

impl From<serde_yaml::Error> for DeployError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// 便捷类型别名
pub type DeployResult<T> = Result<T, DeployError>;

/// 操作结果
///
/// 软失败（超时、命令非零退出、只读查询失败）通过 `success = false` 表达，
/// 同时保留 CLI 的原始诊断文本。
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct OpResult<T> {
    pub success: bool,
    pub payload: T,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub diagnostic: String,
}

impl<T> OpResult<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload,
            diagnostic: String::new(),
        }
    }

    pub fn failed(payload: T, diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            payload,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = diagnostic.into();
        self
    }
}

impl<T: Default> OpResult<T> {
    /// 失败且 payload 为空
    pub fn degraded(diagnostic: impl Into<String>) -> Self {
        Self::failed(T::default(), diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_classification() {
        assert!(DeployError::configuration("No Kubernetes cluster configured").is_abort());
        assert!(DeployError::connectivity("prod", "refused").is_abort());
        assert!(!DeployError::RolloutTimeout { timeout_secs: 300 }.is_abort());
        assert!(!DeployError::NoRunningPod { namespace: "blog".into() }.is_abort());
    }

    #[test]
    fn test_op_result_degraded() {
        let result: OpResult<Vec<String>> = OpResult::degraded("metrics API not available");
        assert!(!result.success);
        assert!(result.payload.is_empty());
        assert_eq!(result.diagnostic, "metrics API not available");
    }

    #[test]
    fn test_op_result_with_diagnostic() {
        let result = OpResult::ok(3u32).with_diagnostic("deployment.apps/blog-deployment scaled");
        assert!(result.success);
        assert_eq!(result.payload, 3);
        assert!(result.diagnostic.contains("scaled"));
    }
}
