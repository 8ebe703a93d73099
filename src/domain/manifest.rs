//! 清单集合
//!
//! 每次编排调用现场生成，不持久化

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 资源类型，声明顺序即 apply 顺序
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Namespace,
    ConfigMap,
    Secret,
    Deployment,
    Service,
    Ingress,
    Hpa,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Secret => "secret",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
            ResourceKind::Ingress => "ingress",
            ResourceKind::Hpa => "hpa",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 资源类型 → 资源文档
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ManifestSet {
    documents: BTreeMap<ResourceKind, Value>,
}

impl ManifestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ResourceKind, document: Value) {
        self.documents.insert(kind, document);
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Value> {
        self.documents.get(&kind)
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.documents.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.documents.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// 按 apply 顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, &Value)> {
        self.documents.iter().map(|(k, v)| (*k, v))
    }

    /// 单个资源的 YAML
    pub fn to_yaml(&self, kind: ResourceKind) -> Result<Option<String>, serde_yaml::Error> {
        self.documents.get(&kind).map(serde_yaml::to_string).transpose()
    }

    /// 多文档 YAML，按 apply 顺序以 `---` 分隔
    pub fn to_multi_document_yaml(&self) -> Result<String, serde_yaml::Error> {
        let mut out = String::new();
        for document in self.documents.values() {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(document)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_iteration_follows_apply_order() {
        let mut set = ManifestSet::new();
        set.insert(ResourceKind::Service, json!({"kind": "Service"}));
        set.insert(ResourceKind::Namespace, json!({"kind": "Namespace"}));
        set.insert(ResourceKind::Deployment, json!({"kind": "Deployment"}));

        assert_eq!(
            set.kinds(),
            vec![ResourceKind::Namespace, ResourceKind::Deployment, ResourceKind::Service]
        );
    }

    #[test]
    fn test_multi_document_yaml() {
        let mut set = ManifestSet::new();
        set.insert(ResourceKind::Namespace, json!({"apiVersion": "v1", "kind": "Namespace"}));
        set.insert(ResourceKind::ConfigMap, json!({"apiVersion": "v1", "kind": "ConfigMap"}));

        let yaml = set.to_multi_document_yaml().unwrap();
        assert_eq!(yaml.matches("---\n").count(), 2);
        assert!(yaml.find("Namespace").unwrap() < yaml.find("ConfigMap").unwrap());
        assert!(set.to_yaml(ResourceKind::Hpa).unwrap().is_none());
    }
}
