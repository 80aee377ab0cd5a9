//! HC-012: Catalog files — load, save (atomic), path derivation.

use super::catalog::CatalogDocument;
use super::error::{CompileError, Result};
use std::path::{Path, PathBuf};

/// Derive the catalog file path for a node within the output directory.
pub fn catalog_path(out_dir: &Path, node: &str) -> PathBuf {
    out_dir.join(node).join("catalog.yaml")
}

/// Load a node's catalog. Returns None if the file doesn't exist.
pub fn load_catalog(out_dir: &Path, node: &str) -> Result<Option<CatalogDocument>> {
    let path = catalog_path(out_dir, node);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| CompileError::io(format!("cannot read {}", path.display()), e))?;
    let doc = serde_yaml_ng::from_str(&content)
        .map_err(|e| CompileError::Manifest(format!("invalid catalog {}: {}", path.display(), e)))?;
    Ok(Some(doc))
}

/// Save a catalog atomically (write to temp, then rename). Returns the path.
pub fn save_catalog(out_dir: &Path, doc: &CatalogDocument) -> Result<PathBuf> {
    let path = catalog_path(out_dir, &doc.name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CompileError::io(format!("cannot create dir {}", parent.display()), e))?;
    }

    let yaml = serde_yaml_ng::to_string(doc)
        .map_err(|e| CompileError::Manifest(format!("serialize error: {}", e)))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| CompileError::io(format!("cannot write {}", tmp_path.display()), e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        CompileError::io(
            format!("cannot rename {} → {}", tmp_path.display(), path.display()),
            e,
        )
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{Catalog, Resource};
    use crate::core::scope::ScopeId;
    use crate::core::types::Value;

    fn make_doc() -> CatalogDocument {
        let mut catalog = Catalog::new("web01");
        catalog.add_class("main");
        let mut r = Resource::new("file", "/etc/motd", ScopeId(0));
        r.set("content", Value::str("hello"));
        catalog.add_resource(r).unwrap();
        catalog.finalize();
        catalog.to_document()
    }

    #[test]
    fn test_hc012_catalog_path() {
        let p = catalog_path(Path::new("/out"), "web01");
        assert_eq!(p, PathBuf::from("/out/web01/catalog.yaml"));
    }

    #[test]
    fn test_hc012_load_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_catalog(dir.path(), "nope").unwrap().is_none());
    }

    #[test]
    fn test_hc012_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let doc = make_doc();
        let path = save_catalog(dir.path(), &doc).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("yaml.tmp").exists());

        let loaded = load_catalog(dir.path(), "web01").unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_hc012_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = make_doc();
        save_catalog(dir.path(), &doc).unwrap();
        doc.classes.push("ntp".to_string());
        save_catalog(dir.path(), &doc).unwrap();
        let loaded = load_catalog(dir.path(), "web01").unwrap().unwrap();
        assert_eq!(loaded.classes, vec!["main", "ntp"]);
    }

    #[test]
    fn test_hc012_load_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = catalog_path(dir.path(), "web01");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "resources: {{{").unwrap();
        assert!(load_catalog(dir.path(), "web01").is_err());
    }
}
