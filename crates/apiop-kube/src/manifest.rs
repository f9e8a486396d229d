//! Manifest documents as cluster objects
//!
//! Parsing needs no cluster: every document of a bundle becomes a
//! [`ManifestObject`] up front, so a malformed bundle fails before the first
//! API call.

use std::collections::BTreeSet;

use kube::api::DynamicObject;
use kube::core::{GroupVersionKind, TypeMeta};

use apiop_core::ManifestBundle;

use crate::error::{KubeError, Result};

const CRD_KIND: &str = "CustomResourceDefinition";

/// One bundle document, parsed
#[derive(Debug, Clone)]
pub struct ManifestObject {
    pub obj: DynamicObject,
    pub gvk: GroupVersionKind,
    /// Position in the bundle
    pub index: usize,
}

impl ManifestObject {
    pub fn api_version(&self) -> &str {
        self.obj
            .types
            .as_ref()
            .map(|t| t.api_version.as_str())
            .unwrap_or("v1")
    }

    pub fn name(&self) -> &str {
        self.obj.metadata.name.as_deref().unwrap_or("unnamed")
    }

    pub fn is_crd(&self) -> bool {
        self.gvk.kind == CRD_KIND
    }

    /// `spec.group` of a CRD document
    pub fn defined_group(&self) -> Option<&str> {
        if !self.is_crd() {
            return None;
        }
        self.obj.data.get("spec")?.get("group")?.as_str()
    }

    /// Creation order: Namespaces, then CRDs, then everything else
    fn apply_rank(&self) -> u8 {
        match self.gvk.kind.as_str() {
            "Namespace" if self.gvk.group.is_empty() => 0,
            CRD_KIND => 1,
            _ => 2,
        }
    }
}

/// Parse every document of a bundle, in apply order
pub fn parse_bundle(bundle: &ManifestBundle) -> Result<Vec<ManifestObject>> {
    let mut objects = bundle
        .documents()
        .iter()
        .enumerate()
        .map(|(index, doc)| parse_document(index, doc))
        .collect::<Result<Vec<_>>>()?;

    // Stable: bundle order is kept within a rank
    objects.sort_by_key(ManifestObject::apply_rank);
    Ok(objects)
}

fn parse_document(index: usize, doc: &str) -> Result<ManifestObject> {
    let invalid = |message: String| KubeError::InvalidManifest { index, message };

    let obj: DynamicObject =
        serde_yaml::from_str(doc).map_err(|e| invalid(format!("YAML parse error: {}", e)))?;

    let type_meta = obj
        .types
        .as_ref()
        .filter(|t| !t.api_version.is_empty() && !t.kind.is_empty())
        .ok_or_else(|| invalid("resource missing apiVersion or kind".to_string()))?;
    let gvk = gvk_from_type_meta(type_meta);

    if obj.metadata.name.as_deref().is_none_or(str::is_empty) {
        return Err(invalid(format!("{} is missing metadata.name", gvk.kind)));
    }

    Ok(ManifestObject { obj, gvk, index })
}

/// API groups defined by the CRDs of a parsed bundle
pub fn defined_groups(objects: &[ManifestObject]) -> BTreeSet<String> {
    objects
        .iter()
        .filter_map(ManifestObject::defined_group)
        .map(String::from)
        .collect()
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
pub fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: api-operator
  namespace: wso2-system
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: securities.wso2.com
spec:
  group: wso2.com
---
apiVersion: v1
kind: Namespace
metadata:
  name: wso2-system
---
apiVersion: wso2.com/v1alpha1
kind: Security
metadata:
  name: default-security
"#;

    fn bundle(content: &str) -> ManifestBundle {
        ManifestBundle::from_bytes("test.yaml", content.as_bytes()).unwrap()
    }

    #[test]
    fn test_apply_order() {
        let objects = parse_bundle(&bundle(BUNDLE)).unwrap();
        let kinds: Vec<&str> = objects.iter().map(|o| o.gvk.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["Namespace", "CustomResourceDefinition", "Deployment", "Security"]
        );
        assert_eq!(objects[0].index, 2);
    }

    #[test]
    fn test_defined_groups() {
        let objects = parse_bundle(&bundle(BUNDLE)).unwrap();
        let groups = defined_groups(&objects);
        assert_eq!(groups.into_iter().collect::<Vec<_>>(), vec!["wso2.com"]);
    }

    #[test]
    fn test_names_and_api_versions() {
        let objects = parse_bundle(&bundle(BUNDLE)).unwrap();
        assert_eq!(objects[0].name(), "wso2-system");
        assert_eq!(objects[0].api_version(), "v1");
        assert_eq!(objects[2].name(), "api-operator");
        assert_eq!(objects[2].api_version(), "apps/v1");
    }

    #[test]
    fn test_missing_kind() {
        let err = parse_bundle(&bundle("apiVersion: v1\nmetadata:\n  name: x\n")).unwrap_err();
        assert!(matches!(err, KubeError::InvalidManifest { index: 0, .. }));
    }

    #[test]
    fn test_missing_name() {
        let content = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: ok\n---\napiVersion: v1\nkind: ConfigMap\nmetadata: {}\n";
        let err = parse_bundle(&bundle(content)).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"invalid manifest (document 1): ConfigMap is missing metadata.name"
        );
    }

    #[test]
    fn test_malformed_yaml() {
        let err = parse_bundle(&bundle("kind: [unclosed\n")).unwrap_err();
        assert!(matches!(err, KubeError::InvalidManifest { .. }));
    }

    #[test]
    fn test_gvk_from_type_meta() {
        let tm = TypeMeta {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
        };
        let gvk = gvk_from_type_meta(&tm);
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");

        let tm_core = TypeMeta {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        };
        let gvk_core = gvk_from_type_meta(&tm_core);
        assert_eq!(gvk_core.group, "");
        assert_eq!(gvk_core.version, "v1");
    }
}
