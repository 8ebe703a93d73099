//! 服务层模块
//!
//! 集群上下文、凭据、manifest/chart 生成、部署编排、监控与扩缩容

pub mod context;
pub mod deploy;
pub mod deployer;
pub mod manifest;
pub mod monitor;
pub mod registry;
pub mod scaling;

pub use context::{ClusterContext, ClusterContextManager};
pub use deploy::DeploymentOrchestrator;
pub use deployer::KubeDeployer;
pub use manifest::{ChartBuilder, ChartPackage, ManifestGenerator};
pub use monitor::ClusterMonitor;
pub use registry::RegistryCredentialManager;
pub use scaling::ScalingController;
