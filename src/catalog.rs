//! Spawn catalog: display names mapped to template resource paths.
//!
//! Loaded from a TOML file of `[[interactable]]` tables and kept sorted by
//! display name, which is the order a picker UI shows them in.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    interactable: Vec<CatalogEntry>,
}

/// One spawnable template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub path: String,
    /// Prefab name; defaults to the last segment of `path`.
    #[serde(default)]
    pub prefab: Option<String>,
    /// `false` marks a template known to have no prefab.
    #[serde(default = "default_instantiable")]
    pub instantiable: bool,
}

fn default_instantiable() -> bool {
    true
}

impl CatalogEntry {
    pub fn prefab_name(&self) -> String {
        match &self.prefab {
            Some(prefab) => prefab.clone(),
            None => self
                .path
                .rsplit('/')
                .next()
                .unwrap_or(&self.path)
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Catalog(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Catalog(format!("bad catalog {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| Error::Catalog(e.to_string()))?;
        Self::from_entries(file.interactable)
    }

    pub fn from_entries(mut entries: Vec<CatalogEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.name.trim().is_empty() || entry.path.trim().is_empty() {
                return Err(Error::Catalog(format!(
                    "entry has an empty name or path: {entry:?}"
                )));
            }
            if !seen.insert(name_key(&entry.name)) {
                return Err(Error::Catalog(format!("duplicate name: {}", entry.name)));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by display name, ignoring case.
    pub fn find(&self, name: &str) -> Option<&CatalogEntry> {
        let key = name_key(name);
        self.entries.iter().find(|e| name_key(&e.name) == key)
    }
}

/// Case-folded form used for both uniqueness and lookup.
fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
