//! Controller manifest bundles
//!
//! A bundle is the set of YAML documents that install and configure the
//! operator. It can come from:
//! - a single YAML file (multi-document)
//! - a directory of `*.yaml` / `*.yml` files, read in path order
//! - a `.tar.gz` archive of such files, locally or downloaded
//!
//! The documents are kept verbatim; parsing into cluster objects happens
//! when the bundle is applied.

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tar::Archive;
use walkdir::WalkDir;

use crate::error::{CoreError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Parsed manifest bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestBundle {
    origin: String,
    documents: Vec<String>,
}

impl ManifestBundle {
    /// Load a bundle from a local file, directory or archive
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::BundleNotFound {
                path: path.display().to_string(),
            });
        }

        let origin = path.display().to_string();
        if path.is_dir() {
            let mut documents = Vec::new();
            for file in yaml_files(path)? {
                let content = std::fs::read_to_string(&file)?;
                documents.extend(split_documents(&content));
            }
            return Self::new(origin, documents);
        }

        let bytes = std::fs::read(path)?;
        Self::from_bytes(origin, &bytes)
    }

    /// Build a bundle from raw content (YAML text or gzip archive)
    pub fn from_bytes(origin: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let origin = origin.into();
        if bytes.starts_with(&GZIP_MAGIC) {
            let documents = documents_from_archive(bytes)?;
            return Self::new(origin, documents);
        }

        let text = std::str::from_utf8(bytes).map_err(|e| CoreError::InvalidBundle {
            message: format!("{origin} is not UTF-8 text: {e}"),
        })?;
        Self::new(origin, split_documents(text))
    }

    fn new(origin: String, documents: Vec<String>) -> Result<Self> {
        if documents.is_empty() {
            return Err(CoreError::InvalidBundle {
                message: format!("{origin} contains no manifests"),
            });
        }
        tracing::debug!(origin = %origin, documents = documents.len(), "loaded manifest bundle");
        Ok(Self { origin, documents })
    }

    /// Where the bundle was read from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// SHA-256 over all documents, in order
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for doc in &self.documents {
            hasher.update(doc.as_bytes());
            hasher.update(b"\n---\n");
        }
        hex::encode(hasher.finalize())
    }
}

/// Split a multi-document YAML string, dropping empty and comment-only documents
pub fn split_documents(content: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        if line.trim_end() == "---" || line.starts_with("--- ") {
            push_document(&mut documents, &current);
            current.clear();
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    push_document(&mut documents, &current);

    documents
}

fn push_document(documents: &mut Vec<String>, doc: &str) {
    let meaningful = doc
        .lines()
        .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));
    if meaningful {
        documents.push(doc.trim_end().to_string());
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn yaml_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| CoreError::InvalidBundle {
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() && is_yaml(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn documents_from_archive(bytes: &[u8]) -> Result<Vec<String>> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.to_path_buf();
        if !is_yaml(&path) {
            continue;
        }
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        files.push((path, content));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files
        .iter()
        .flat_map(|(_, content)| split_documents(content))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    const NAMESPACE: &str = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: wso2-system\n";
    const CONFIGMAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: controller-config\n";

    #[test]
    fn test_split_documents() {
        let content = format!("---\n{NAMESPACE}---\n# only a comment\n---\n{CONFIGMAP}\n");
        let docs = split_documents(&content);
        assert_eq!(docs.len(), 2);
        assert!(docs[0].contains("kind: Namespace"));
        assert!(docs[1].contains("kind: ConfigMap"));
    }

    #[test]
    fn test_split_keeps_dashes_inside_values() {
        let content = "apiVersion: v1\nkind: ConfigMap\ndata:\n  banner: \"---x---\"\n";
        assert_eq!(split_documents(content).len(), 1);
    }

    #[test]
    fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.yaml");
        std::fs::write(&path, format!("{NAMESPACE}---\n{CONFIGMAP}")).unwrap();

        let bundle = ManifestBundle::load(&path).unwrap();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.origin(), path.display().to_string());
    }

    #[test]
    fn test_load_directory_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b-config.yaml"), CONFIGMAP).unwrap();
        std::fs::write(dir.path().join("a-namespace.yml"), NAMESPACE).unwrap();
        std::fs::write(dir.path().join("nested").join("c.yaml"), CONFIGMAP).unwrap();
        std::fs::write(dir.path().join("README.md"), "# docs").unwrap();

        let bundle = ManifestBundle::load(dir.path()).unwrap();
        assert_eq!(bundle.len(), 3);
        assert!(bundle.documents()[0].contains("kind: Namespace"));
    }

    #[test]
    fn test_load_archive() {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, content) in [("configs/2.yaml", CONFIGMAP), ("configs/1.yaml", NAMESPACE)] {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let bundle = ManifestBundle::from_bytes("bundle.tgz", &bytes).unwrap();
        assert_eq!(bundle.len(), 2);
        assert!(bundle.documents()[0].contains("kind: Namespace"));
    }

    #[test]
    fn test_empty_bundle_rejected() {
        let err = ManifestBundle::from_bytes("empty.yaml", b"# nothing\n---\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidBundle { .. }));
    }

    #[test]
    fn test_missing_path() {
        let err = ManifestBundle::load(Path::new("/nonexistent/apiop/bundle.yaml")).unwrap_err();
        assert!(matches!(err, CoreError::BundleNotFound { .. }));
    }

    #[test]
    fn test_digest_is_stable() {
        let a = ManifestBundle::from_bytes("a", NAMESPACE.as_bytes()).unwrap();
        let b = ManifestBundle::from_bytes("b", NAMESPACE.as_bytes()).unwrap();
        let c = ManifestBundle::from_bytes("c", CONFIGMAP.as_bytes()).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
