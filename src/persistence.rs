//! Compiled catalogue persistence
//!
//! Serializes a parsed catalogue as a self-contained JSON document and
//! reconstructs it later without re-reading the probe text format.
//! Compiled pattern engines are transient: they are skipped on export
//! and rebuilt from their source text on load.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::catalogue::Catalogue;
use crate::error::{Result, VscanError};

/// Trait for catalogue storage operations
#[async_trait]
pub trait CatalogueStore {
    /// Serialize a catalogue to the given path. Refuses to overwrite an
    /// existing file; missing parent directories are created.
    async fn export(&self, catalogue: &Catalogue, path: &Path) -> Result<()>;

    /// Reconstruct a catalogue from a previously exported document,
    /// recompiling every match pattern.
    async fn load(&self, path: &Path) -> Result<Catalogue>;
}

/// File-based implementation of the catalogue store
pub struct FileCatalogueStore;

#[async_trait]
impl CatalogueStore for FileCatalogueStore {
    async fn export(&self, catalogue: &Catalogue, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| VscanError::io("create catalogue directory", e.to_string()))?;
            }
        }

        if fs::try_exists(path)
            .await
            .map_err(|e| VscanError::io("stat catalogue file", e.to_string()))?
        {
            return Err(VscanError::FileExists {
                path: path.display().to_string(),
            });
        }

        let document = serde_json::to_string_pretty(catalogue)?;
        fs::write(path, document)
            .await
            .map_err(|e| VscanError::io(format!("write {}", path.display()), e.to_string()))?;

        info!(
            probes = catalogue.len(),
            "Exported catalogue to: {}",
            path.display()
        );
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Catalogue> {
        let document = fs::read_to_string(path)
            .await
            .map_err(|e| VscanError::io(format!("read {}", path.display()), e.to_string()))?;

        let mut catalogue: Catalogue = serde_json::from_str(&document)?;
        catalogue.rebuild();

        // engines are never serialized; an uncompilable pattern here
        // means the document was not produced by export
        for probe in catalogue.probes_mut() {
            for rule in &mut probe.matches {
                rule.pattern.recompile().map_err(|e| {
                    VscanError::format(format!(
                        "pattern {:?} failed to compile: {}",
                        rule.pattern.source, e
                    ))
                })?;
            }
        }

        info!(
            probes = catalogue.len(),
            "Loaded catalogue from: {}",
            path.display()
        );
        Ok(catalogue)
    }
}

/// Export a catalogue through the default file store.
pub async fn export_catalogue(catalogue: &Catalogue, path: impl AsRef<Path>) -> Result<()> {
    FileCatalogueStore.export(catalogue, path.as_ref()).await
}

/// Load a catalogue through the default file store.
pub async fn load_catalogue(path: impl AsRef<Path>) -> Result<Catalogue> {
    FileCatalogueStore.load(path.as_ref()).await
}
