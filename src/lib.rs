//! Kube Deploy Core - Kubernetes 部署核心
//!
//! 为工作负载生成 manifest 或 helm chart，同步镜像仓库凭据，
//! 驱动 apply / rollout / 部署后钩子，并提供集群查询和扩缩容。
//!
//! 所有集群操作都通过外部 CLI（kubectl、helm、docker、aws）完成，
//! 执行器、加密和凭据存储在构造时注入。

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod state;

pub use config::KubeSettings;
pub use error::{DeployError, DeployResult, OpResult};
pub use services::KubeDeployer;
pub use state::AppState;
