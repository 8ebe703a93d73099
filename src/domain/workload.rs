//! 工作负载领域模型
//!
//! Workload 由上层应用持有，部署核心只读

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 默认容器端口
pub const DEFAULT_CONTAINER_PORT: u16 = 8000;

/// 敏感变量名模式（大小写不敏感，子串匹配）
pub const SENSITIVE_PATTERNS: &[&str] = &[
    "PASSWORD",
    "SECRET",
    "KEY",
    "TOKEN",
    "CREDENTIAL",
    "API_",
    "AWS_",
    "GOOGLE_",
];

/// 检查变量名是否敏感
///
/// 敏感变量不会写入 ConfigMap
pub fn is_sensitive_key(key: &str) -> bool {
    let upper = key.to_uppercase();
    SENSITIVE_PATTERNS.iter().any(|p| upper.contains(p))
}

/// 应用框架
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Framework {
    Laravel,
    Django,
    Rails,
    Node,
    #[default]
    Generic,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Laravel => "laravel",
            Framework::Django => "django",
            Framework::Rails => "rails",
            Framework::Node => "node",
            Framework::Generic => "generic",
        }
    }

    /// 部署后在 pod 内执行的命令（迁移、清缓存）
    pub fn post_deploy_commands(&self) -> &'static [&'static str] {
        match self {
            Framework::Laravel => &["php artisan migrate --force", "php artisan cache:clear"],
            Framework::Django => &["python manage.py migrate --noinput"],
            Framework::Rails => &["bundle exec rails db:migrate", "bundle exec rails tmp:cache:clear"],
            Framework::Node | Framework::Generic => &[],
        }
    }

    /// 框架默认配置，位于通用配置之后、用户变量之前
    pub fn config_defaults(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Framework::Laravel => &[
                ("CACHE_DRIVER", "redis"),
                ("QUEUE_CONNECTION", "redis"),
                ("SESSION_DRIVER", "redis"),
                ("SESSION_LIFETIME", "120"),
                ("BROADCAST_DRIVER", "log"),
            ],
            _ => &[],
        }
    }

    /// 是否需要持久化 storage 卷、权限初始化容器和 RBAC
    pub fn needs_storage(&self) -> bool {
        matches!(self, Framework::Laravel)
    }
}

impl From<String> for Framework {
    fn from(value: String) -> Self {
        Framework::from(value.as_str())
    }
}

impl From<&str> for Framework {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "laravel" => Framework::Laravel,
            "django" => Framework::Django,
            "rails" | "ruby-on-rails" => Framework::Rails,
            "node" | "nodejs" | "express" | "nextjs" => Framework::Node,
            _ => Framework::Generic,
        }
    }
}

impl From<Framework> for String {
    fn from(value: Framework) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 集群连接
#[derive(Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    /// kubeconfig 原文
    pub kubeconfig: String,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kubeconfig", &"<redacted>")
            .finish()
    }
}

/// 固定的三个密钥
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WorkloadSecrets {
    #[serde(default)]
    pub db_password: Option<String>,
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
}

impl WorkloadSecrets {
    /// Secret 清单中的键值对，缺失值为空字符串
    pub fn entries(&self) -> [(&'static str, &str); 3] {
        [
            ("DB_PASSWORD", self.db_password.as_deref().unwrap_or_default()),
            ("APP_KEY", self.app_key.as_deref().unwrap_or_default()),
            ("API_SECRET", self.api_secret.as_deref().unwrap_or_default()),
        ]
    }
}

impl fmt::Debug for WorkloadSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("WorkloadSecrets")
            .field("db_password", &mark(&self.db_password))
            .field("app_key", &mark(&self.app_key))
            .field("api_secret", &mark(&self.api_secret))
            .finish()
    }
}

/// 工作负载
///
/// slug 全局唯一，同时作为命名空间和 helm release 名称
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workload {
    pub slug: String,
    /// 显示名称，默认等于 slug
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// 镜像 tag
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub framework: Framework,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// 绑定域名，按顺序生成 ingress 规则
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub post_deploy_script: Option<String>,
    #[serde(default)]
    pub secrets: WorkloadSecrets,
    /// 绑定的集群（最多一个）
    #[serde(default)]
    pub cluster: Option<Cluster>,
}

impl Workload {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: None,
            port: None,
            version: None,
            framework: Framework::Generic,
            env_vars: BTreeMap::new(),
            domains: Vec::new(),
            post_deploy_script: None,
            secrets: WorkloadSecrets::default(),
            cluster: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.slug)
    }

    pub fn container_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_CONTAINER_PORT)
    }

    pub fn image_tag(&self) -> &str {
        self.version.as_deref().filter(|v| !v.is_empty()).unwrap_or("latest")
    }

    pub fn namespace(&self) -> &str {
        &self.slug
    }

    pub fn deployment_name(&self) -> String {
        format!("{}-deployment", self.slug)
    }

    pub fn service_name(&self) -> String {
        format!("{}-service", self.slug)
    }

    pub fn config_map_name(&self) -> String {
        format!("{}-config", self.slug)
    }

    pub fn secret_name(&self) -> String {
        format!("{}-secret", self.slug)
    }

    pub fn ingress_name(&self) -> String {
        format!("{}-ingress", self.slug)
    }

    pub fn hpa_name(&self) -> String {
        format!("{}-hpa", self.slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_sensitive_key() {
        assert!(is_sensitive_key("DB_PASSWORD"));
        assert!(is_sensitive_key("stripe_secret"));
        assert!(is_sensitive_key("APP_KEY"));
        assert!(is_sensitive_key("GITHUB_TOKEN"));
        assert!(is_sensitive_key("api_url"));
        assert!(is_sensitive_key("AWS_REGION"));
        assert!(is_sensitive_key("google_project"));
        assert!(!is_sensitive_key("APP_ENV"));
        assert!(!is_sensitive_key("PORT"));
    }

    #[test]
    fn test_framework_from_str() {
        assert_eq!(Framework::from("Laravel"), Framework::Laravel);
        assert_eq!(Framework::from("nodejs"), Framework::Node);
        assert_eq!(Framework::from("phoenix"), Framework::Generic);

        let parsed: Framework = serde_json::from_str("\"django\"").unwrap();
        assert_eq!(parsed, Framework::Django);
        assert_eq!(serde_json::to_string(&Framework::Rails).unwrap(), "\"rails\"");
    }

    #[test]
    fn test_workload_defaults() {
        let workload: Workload = serde_json::from_str(r#"{"slug":"blog"}"#).unwrap();
        assert_eq!(workload.display_name(), "blog");
        assert_eq!(workload.container_port(), 8000);
        assert_eq!(workload.image_tag(), "latest");
        assert_eq!(workload.deployment_name(), "blog-deployment");
        assert!(workload.cluster.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cluster = Cluster {
            id: "c1".into(),
            name: "prod".into(),
            kubeconfig: "client-key-data: abc".into(),
        };
        let secrets = WorkloadSecrets {
            db_password: Some("hunter2".into()),
            ..Default::default()
        };

        assert!(!format!("{:?}", cluster).contains("client-key-data"));
        assert!(!format!("{:?}", secrets).contains("hunter2"));
    }
}
