//! 环境变量配置加载

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use self::constants::*;

/// 部署核心配置
///
/// 构造组件时注入，CLI 路径和超时不使用全局常量
#[derive(Clone, Debug)]
pub struct KubeSettings {
    /// kubectl 路径
    pub kubectl_path: String,
    /// helm 路径
    pub helm_path: String,
    /// docker 路径（仓库连通性测试）
    pub docker_path: String,
    /// aws CLI 路径（ECR 登录令牌）
    pub aws_path: String,
    /// 镜像仓库前缀，如 registry.example.com/team
    pub docker_registry: String,
    /// 临时文件目录，为空时使用系统临时目录
    pub scratch_dir: Option<PathBuf>,
    /// 是否加密 Secret 清单中的值
    pub encrypt_secrets: bool,
    /// 加密口令
    pub secret_key: Option<String>,
    pub timeouts: Timeouts,
}

/// 各类外部命令的超时
#[derive(Clone, Debug)]
pub struct Timeouts {
    /// 集群连通性探测
    pub probe: Duration,
    /// 单个资源 apply
    pub apply: Duration,
    /// rollout 等待
    pub rollout: Duration,
    /// helm upgrade --install
    pub chart: Duration,
    /// 删除命名空间
    pub teardown: Duration,
    /// pod 内命令（迁移等）
    pub exec: Duration,
    /// 只读查询
    pub query: Duration,
    /// docker login / logout
    pub registry: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(PROBE_TIMEOUT_SECS),
            apply: Duration::from_secs(APPLY_TIMEOUT_SECS),
            rollout: Duration::from_secs(ROLLOUT_TIMEOUT_SECS),
            chart: Duration::from_secs(CHART_TIMEOUT_SECS),
            teardown: Duration::from_secs(TEARDOWN_TIMEOUT_SECS),
            exec: Duration::from_secs(EXEC_TIMEOUT_SECS),
            query: Duration::from_secs(QUERY_TIMEOUT_SECS),
            registry: Duration::from_secs(REGISTRY_TIMEOUT_SECS),
        }
    }
}

impl Default for KubeSettings {
    fn default() -> Self {
        Self {
            kubectl_path: "kubectl".to_string(),
            helm_path: "helm".to_string(),
            docker_path: "docker".to_string(),
            aws_path: "aws".to_string(),
            docker_registry: DEFAULT_REGISTRY.to_string(),
            scratch_dir: None,
            encrypt_secrets: false,
            secret_key: None,
            timeouts: Timeouts::default(),
        }
    }
}

impl KubeSettings {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let kubectl_path = load_with_fallback("KUBE_DEPLOY_KUBECTL", "KUBECTL_PATH")
            .unwrap_or(defaults.kubectl_path);
        let helm_path =
            load_with_fallback("KUBE_DEPLOY_HELM", "HELM_PATH").unwrap_or(defaults.helm_path);
        let docker_path = load_with_fallback("KUBE_DEPLOY_DOCKER", "DOCKER_PATH")
            .unwrap_or(defaults.docker_path);
        let aws_path =
            load_with_fallback("KUBE_DEPLOY_AWS", "AWS_CLI_PATH").unwrap_or(defaults.aws_path);

        // Registry - 支持旧名称兼容
        let docker_registry = load_with_fallback("KUBE_DEPLOY_REGISTRY", "DOCKER_REGISTRY")
            .unwrap_or(defaults.docker_registry);
        if env::var("KUBE_DEPLOY_REGISTRY").is_err() && env::var("DOCKER_REGISTRY").is_ok() {
            warn!("DOCKER_REGISTRY is deprecated, use KUBE_DEPLOY_REGISTRY");
        }

        let scratch_dir = env::var("KUBE_DEPLOY_SCRATCH_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let secret_key = env::var("KUBE_DEPLOY_SECRET_KEY").ok().filter(|s| !s.is_empty());
        let encrypt_secrets = env::var("KUBE_DEPLOY_ENCRYPT_SECRETS")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(secret_key.is_some());
        if encrypt_secrets && secret_key.is_none() {
            warn!("KUBE_DEPLOY_ENCRYPT_SECRETS is set but KUBE_DEPLOY_SECRET_KEY is empty, secrets will not be encrypted");
        }

        let timeouts = Timeouts {
            probe: secs_from_env("KUBE_DEPLOY_PROBE_TIMEOUT_SECS", PROBE_TIMEOUT_SECS),
            apply: secs_from_env("KUBE_DEPLOY_APPLY_TIMEOUT_SECS", APPLY_TIMEOUT_SECS),
            rollout: secs_from_env("KUBE_DEPLOY_ROLLOUT_TIMEOUT_SECS", ROLLOUT_TIMEOUT_SECS),
            chart: secs_from_env("KUBE_DEPLOY_CHART_TIMEOUT_SECS", CHART_TIMEOUT_SECS),
            teardown: secs_from_env("KUBE_DEPLOY_TEARDOWN_TIMEOUT_SECS", TEARDOWN_TIMEOUT_SECS),
            exec: secs_from_env("KUBE_DEPLOY_EXEC_TIMEOUT_SECS", EXEC_TIMEOUT_SECS),
            query: secs_from_env("KUBE_DEPLOY_QUERY_TIMEOUT_SECS", QUERY_TIMEOUT_SECS),
            registry: secs_from_env("KUBE_DEPLOY_REGISTRY_TIMEOUT_SECS", REGISTRY_TIMEOUT_SECS),
        };

        Self {
            kubectl_path,
            helm_path,
            docker_path,
            aws_path,
            docker_registry,
            scratch_dir,
            encrypt_secrets: encrypt_secrets && secret_key.is_some(),
            secret_key,
            timeouts,
        }
    }
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    let secs = env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    /// 默认镜像仓库
    pub const DEFAULT_REGISTRY: &str = "registry.local";

    /// 集群探测超时（秒）
    pub const PROBE_TIMEOUT_SECS: u64 = 30;

    /// 单个资源 apply 超时（秒）
    pub const APPLY_TIMEOUT_SECS: u64 = 60;

    /// rollout 等待超时（秒）
    pub const ROLLOUT_TIMEOUT_SECS: u64 = 300; // 5 分钟

    /// helm 安装超时（秒）
    pub const CHART_TIMEOUT_SECS: u64 = 600; // 10 分钟

    /// 删除命名空间超时（秒）
    pub const TEARDOWN_TIMEOUT_SECS: u64 = 120;

    /// pod 内命令超时（秒）
    pub const EXEC_TIMEOUT_SECS: u64 = 300;

    /// 只读查询超时（秒）
    pub const QUERY_TIMEOUT_SECS: u64 = 30;

    /// docker login 超时（秒）
    pub const REGISTRY_TIMEOUT_SECS: u64 = 60;

    /// CLI 自身超时之外再给进程的宽限时间（秒）
    pub const PROCESS_GRACE_SECS: u64 = 15;

    /// 默认日志行数
    pub const DEFAULT_LOG_TAIL: u32 = 100;

    /// 默认事件条数
    pub const DEFAULT_EVENT_LIMIT: usize = 50;

    /// 资源标签中的管理者
    pub const MANAGED_BY: &str = "kube-deploy";

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
