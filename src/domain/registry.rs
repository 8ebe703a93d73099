//! 镜像仓库凭据领域模型
//!
//! 每种 provider 的凭据形状在编译期区分，提取时按 variant 校验必填字段

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DeployError;

/// ECR 默认区域
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Kubernetes 资源名最大长度
const MAX_NAME_LEN: usize = 63;

static HOST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}(:[0-9]{1,5})?(/[a-z0-9._/-]*)?$")
        .expect("registry host pattern is valid")
});

/// 仓库类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    DockerHub,
    Github,
    Gitlab,
    AwsEcr,
    GoogleGcr,
    AzureAcr,
    Private,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::DockerHub,
        ProviderKind::Github,
        ProviderKind::Gitlab,
        ProviderKind::AwsEcr,
        ProviderKind::GoogleGcr,
        ProviderKind::AzureAcr,
        ProviderKind::Private,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::DockerHub => "docker_hub",
            ProviderKind::Github => "github",
            ProviderKind::Gitlab => "gitlab",
            ProviderKind::AwsEcr => "aws_ecr",
            ProviderKind::GoogleGcr => "google_gcr",
            ProviderKind::AzureAcr => "azure_acr",
            ProviderKind::Private => "private",
        }
    }

    /// 未填写 URL 时使用的默认地址；账号相关的仓库没有默认值
    pub fn default_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::DockerHub => Some("https://index.docker.io/v1/"),
            ProviderKind::Github => Some("ghcr.io"),
            ProviderKind::Gitlab => Some("registry.gitlab.com"),
            ProviderKind::GoogleGcr => Some("gcr.io"),
            ProviderKind::AwsEcr | ProviderKind::AzureAcr | ProviderKind::Private => None,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DeployError::configuration(format!("Unknown registry type: {}", s)))
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// provider 专属的凭据
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ProviderCredentials {
    Password {
        password: String,
    },
    AccessToken {
        token: String,
    },
    AwsKeys {
        access_key_id: String,
        secret_access_key: String,
        region: String,
    },
    ServiceAccount {
        service_account_json: String,
    },
    ServicePrincipal {
        password: Option<String>,
        client_id: String,
        client_secret: String,
    },
}

impl ProviderCredentials {
    /// 按 provider 从表单数据中提取凭据
    pub fn extract(kind: ProviderKind, input: &CredentialInput) -> Result<Self, DeployError> {
        let missing = |field: &str| {
            DeployError::configuration(format!("{} credentials require {}", kind, field))
        };

        match kind {
            ProviderKind::DockerHub | ProviderKind::Private => Ok(Self::Password {
                password: present(&input.password).ok_or_else(|| missing("password"))?,
            }),
            ProviderKind::Github | ProviderKind::Gitlab => Ok(Self::AccessToken {
                token: present(&input.token)
                    .or_else(|| present(&input.password))
                    .ok_or_else(|| missing("token"))?,
            }),
            ProviderKind::AwsEcr => Ok(Self::AwsKeys {
                access_key_id: present(&input.aws_access_key_id)
                    .ok_or_else(|| missing("aws_access_key_id"))?,
                secret_access_key: present(&input.aws_secret_access_key)
                    .ok_or_else(|| missing("aws_secret_access_key"))?,
                region: present(&input.region).unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
            }),
            ProviderKind::GoogleGcr => {
                let document = present(&input.service_account_json)
                    .ok_or_else(|| missing("service_account_json"))?;
                serde_json::from_str::<serde_json::Value>(&document).map_err(|e| {
                    DeployError::configuration(format!("service_account_json is not valid JSON: {}", e))
                })?;
                Ok(Self::ServiceAccount {
                    service_account_json: document,
                })
            }
            ProviderKind::AzureAcr => Ok(Self::ServicePrincipal {
                password: present(&input.password),
                client_id: present(&input.client_id).ok_or_else(|| missing("client_id"))?,
                client_secret: present(&input.client_secret)
                    .ok_or_else(|| missing("client_secret"))?,
            }),
        }
    }

    /// 该凭据携带的字段名
    pub fn field_names(&self) -> Vec<&'static str> {
        match self {
            Self::Password { .. } => vec!["password"],
            Self::AccessToken { .. } => vec!["token"],
            Self::AwsKeys { .. } => vec!["access_key_id", "secret_access_key", "region"],
            Self::ServiceAccount { .. } => vec!["service_account_json"],
            Self::ServicePrincipal { .. } => vec!["password", "client_id", "client_secret"],
        }
    }

    /// 输入中是否包含任何凭据字段（更新时决定是否重新提取）
    pub fn any_present(input: &CredentialInput) -> bool {
        [
            &input.password,
            &input.token,
            &input.aws_access_key_id,
            &input.aws_secret_access_key,
            &input.service_account_json,
            &input.client_id,
            &input.client_secret,
        ]
        .into_iter()
        .any(|field| present(field).is_some())
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwsKeys { region, .. } => f
                .debug_struct("AwsKeys")
                .field("region", region)
                .finish_non_exhaustive(),
            Self::ServicePrincipal { client_id, .. } => f
                .debug_struct("ServicePrincipal")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            other => write!(f, "{:?}", other.field_names()),
        }
    }
}

fn present(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 凭据状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    #[default]
    Active,
    Failed,
}

/// 创建/更新凭据时的表单数据
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CredentialInput {
    pub name: Option<String>,
    pub registry_type: Option<String>,
    pub registry_url: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_default: Option<bool>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub region: Option<String>,
    pub service_account_json: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl CredentialInput {
    /// 校验必填字段并解析仓库类型
    pub fn validate(&self) -> Result<ProviderKind, DeployError> {
        let mut missing = Vec::new();
        if present(&self.name).is_none() {
            missing.push("name");
        }
        if present(&self.registry_type).is_none() {
            missing.push("registry_type");
        }
        if present(&self.username).is_none() {
            missing.push("username");
        }
        if !missing.is_empty() {
            return Err(DeployError::configuration(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let kind: ProviderKind = self.registry_type.as_deref().unwrap_or_default().trim().parse()?;

        if let Some(url) = present(&self.registry_url) {
            if !is_valid_registry_url(&url) {
                return Err(DeployError::configuration(format!("Invalid registry URL: {}", url)));
            }
        }

        Ok(kind)
    }
}

/// 完整 URL 或 `host[:port][/path]`
pub fn is_valid_registry_url(candidate: &str) -> bool {
    if candidate.contains("://") {
        return url::Url::parse(candidate)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
    }
    HOST_PATTERN.is_match(candidate)
}

/// 镜像仓库凭据
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryCredential {
    pub id: Uuid,
    /// 所属工作负载
    pub workload: String,
    pub name: String,
    pub kind: ProviderKind,
    pub url: String,
    pub username: String,
    pub email: Option<String>,
    pub credentials: ProviderCredentials,
    pub is_default: bool,
    pub status: CredentialStatus,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistryCredential {
    pub fn is_active(&self) -> bool {
        self.status == CredentialStatus::Active
    }

    /// 集群中对应的 docker-registry secret 名称，由凭据身份决定
    pub fn secret_name(&self) -> String {
        const PREFIX: &str = "registry-";
        let suffix = &self.id.simple().to_string()[..8];
        // 截断名称部分，id 后缀必须保留
        let mut label = sanitize(&self.name);
        label.truncate(MAX_NAME_LEN - PREFIX.len() - suffix.len() - 1);
        let label = label.trim_end_matches('-');
        if label.is_empty() {
            format!("{}{}", PREFIX, suffix)
        } else {
            format!("{}{}-{}", PREFIX, label, suffix)
        }
    }

    /// 用于 docker login / dockerconfigjson 的服务器地址（去掉协议）
    pub fn server(&self) -> &str {
        self.url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }
}

fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
