//! 领域模型模块
//!
//! 纯数据结构，不依赖 tokio 和外部命令

pub mod cluster;
pub mod deploy;
pub mod manifest;
pub mod registry;
pub mod workload;

// Re-exports for convenience
pub use cluster::{ClusterEvent, ExecOutput, PodInfo, PodUsage, ScaleOutcome};
pub use deploy::{
    DeployMethod, DeployOptions, DeployStage, DeployStatus, DeploymentAttempt, DeploymentPhase,
    HookOutcome, LogLine, RolloutOutcome, ServiceType, StageStatus, StepOutcome,
};
pub use manifest::{ManifestSet, ResourceKind};
pub use registry::{
    CredentialInput, CredentialStatus, ProviderCredentials, ProviderKind, RegistryCredential,
};
pub use workload::{is_sensitive_key, Cluster, Framework, Workload, WorkloadSecrets};
