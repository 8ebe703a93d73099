//! 应用状态
//!
//! 组件共享的依赖：配置、命令执行器、加密、凭据存储

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::env::KubeSettings;
use crate::infra::cipher::{AesGcmCipher, PlainCipher, SecretCipher};
use crate::infra::command::{CommandExecutor, ProcessRunner};
use crate::infra::scratch::Scratch;

use super::credential_store::{CredentialStore, MemoryCredentialStore};

/// 应用状态
pub struct AppState {
    /// 部署核心配置
    pub settings: KubeSettings,
    /// 外部命令执行器
    pub executor: Arc<dyn CommandExecutor>,
    /// Secret 值加密
    pub cipher: Arc<dyn SecretCipher>,
    /// 凭据存储
    pub credentials: Arc<dyn CredentialStore>,
    /// 临时文件位置
    pub scratch: Scratch,
    /// 创建时间
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 注入全部依赖
    pub fn new(
        settings: KubeSettings,
        executor: Arc<dyn CommandExecutor>,
        cipher: Arc<dyn SecretCipher>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let scratch = Scratch::new(settings.scratch_dir.clone());
        Self {
            settings,
            executor,
            cipher,
            credentials,
            scratch,
            started_at: Utc::now(),
        }
    }

    /// 使用真实子进程和指定的凭据存储
    ///
    /// 配置了 `secret_key` 且开启加密时使用 AES-GCM，否则原样写入
    pub fn from_settings(settings: KubeSettings, credentials: Arc<dyn CredentialStore>) -> Self {
        let cipher: Arc<dyn SecretCipher> = match settings.secret_key {
            Some(ref key) if settings.encrypt_secrets => Arc::new(AesGcmCipher::from_passphrase(key)),
            _ => Arc::new(PlainCipher),
        };
        Self::new(settings, Arc::new(ProcessRunner), cipher, credentials)
    }

    /// 环境变量配置 + 内存凭据存储
    pub fn from_env() -> Self {
        Self::from_settings(KubeSettings::from_env(), Arc::new(MemoryCredentialStore::new()))
    }
}

#[cfg(test)]
impl AppState {
    /// 测试用：指定执行器，其余依赖使用默认值
    pub fn with_executor(executor: Arc<dyn CommandExecutor>) -> Self {
        let settings = KubeSettings {
            docker_registry: "registry.example.com".to_string(),
            ..KubeSettings::default()
        };
        Self::new(
            settings,
            executor,
            Arc::new(PlainCipher),
            Arc::new(MemoryCredentialStore::new()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_selection() {
        let mut settings = KubeSettings::default();
        settings.secret_key = Some("k".to_string());
        settings.encrypt_secrets = true;
        let state = AppState::from_settings(settings, Arc::new(MemoryCredentialStore::new()));
        assert_ne!(state.cipher.encrypt("value").unwrap(), "value");

        let state = AppState::from_settings(
            KubeSettings::default(),
            Arc::new(MemoryCredentialStore::new()),
        );
        assert_eq!(state.cipher.encrypt("value").unwrap(), "value");
    }
}
