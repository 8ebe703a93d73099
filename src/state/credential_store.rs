//! 凭据存储
//!
//! 持久化由上层应用负责，这里定义存储接口并提供内存实现

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::registry::RegistryCredential;
use crate::error::{DeployError, DeployResult};

/// 凭据持久化接口
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert(&self, credential: RegistryCredential) -> DeployResult<()>;
    async fn update(&self, credential: RegistryCredential) -> DeployResult<()>;
    async fn get(&self, id: Uuid) -> DeployResult<Option<RegistryCredential>>;
    /// 工作负载的全部凭据，按创建时间排序
    async fn list(&self, workload: &str) -> DeployResult<Vec<RegistryCredential>>;
    /// 返回是否确实删除了记录
    async fn delete(&self, id: Uuid) -> DeployResult<bool>;
}

/// 内存凭据存储
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<Uuid, RegistryCredential>>,
}

impl MemoryCredentialStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
        }
    }

    /// 使用已有凭据创建
    pub fn with_credentials(credentials: impl IntoIterator<Item = RegistryCredential>) -> Self {
        Self {
            credentials: RwLock::new(credentials.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    /// 凭据总数
    pub async fn count(&self) -> usize {
        self.credentials.read().await.len()
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, credential: RegistryCredential) -> DeployResult<()> {
        let mut credentials = self.credentials.write().await;
        if credentials.contains_key(&credential.id) {
            return Err(DeployError::Store(format!("credential {} already exists", credential.id)));
        }
        credentials.insert(credential.id, credential);
        Ok(())
    }

    async fn update(&self, credential: RegistryCredential) -> DeployResult<()> {
        let mut credentials = self.credentials.write().await;
        match credentials.get_mut(&credential.id) {
            Some(existing) => {
                *existing = credential;
                Ok(())
            }
            None => Err(DeployError::Store(format!("credential {} not found", credential.id))),
        }
    }

    async fn get(&self, id: Uuid) -> DeployResult<Option<RegistryCredential>> {
        let credentials = self.credentials.read().await;
        Ok(credentials.get(&id).cloned())
    }

    async fn list(&self, workload: &str) -> DeployResult<Vec<RegistryCredential>> {
        let credentials = self.credentials.read().await;
        let mut found: Vec<RegistryCredential> = credentials
            .values()
            .filter(|c| c.workload == workload)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(found)
    }

    async fn delete(&self, id: Uuid) -> DeployResult<bool> {
        let mut credentials = self.credentials.write().await;
        Ok(credentials.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registry::{CredentialStatus, ProviderCredentials, ProviderKind};
    use chrono::{Duration, Utc};

    fn credential(workload: &str, name: &str, age_minutes: i64) -> RegistryCredential {
        let created = Utc::now() - Duration::minutes(age_minutes);
        RegistryCredential {
            id: Uuid::new_v4(),
            workload: workload.to_string(),
            name: name.to_string(),
            kind: ProviderKind::DockerHub,
            url: "https://index.docker.io/v1/".to_string(),
            username: "ci".to_string(),
            email: None,
            credentials: ProviderCredentials::Password {
                password: "p".to_string(),
            },
            is_default: false,
            status: CredentialStatus::Active,
            last_tested_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn test_credential_lifecycle() {
        let store = MemoryCredentialStore::new();
        let cred = credential("blog", "hub", 0);
        let id = cred.id;

        store.insert(cred.clone()).await.unwrap();
        assert!(store.insert(cred.clone()).await.is_err());

        let mut updated = store.get(id).await.unwrap().unwrap();
        updated.status = CredentialStatus::Failed;
        store.update(updated).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().unwrap().status, CredentialStatus::Failed);

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let store = MemoryCredentialStore::with_credentials(vec![
            credential("blog", "newer", 1),
            credential("shop", "other", 5),
            credential("blog", "older", 10),
        ]);

        let names: Vec<String> = store
            .list("blog")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["older", "newer"]);
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let store = MemoryCredentialStore::new();
        let result = store.update(credential("blog", "ghost", 0)).await;
        assert!(matches!(result, Err(DeployError::Store(_))));
    }
}
