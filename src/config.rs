//! Project configuration (`specfold.toml`).
//!
//! The file is kept as an ordered [`toml::Table`] so that saving it back
//! preserves every key this tool does not own, in its original order.
//! Only two keys are interpreted here:
//!
//! ```toml
//! ai_tool = "claude-desktop"
//!
//! [[knowledge]]
//! name = "commons"
//! source = "github:acme/knowledge"
//! version = "main"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::error::SpecfoldError;
use crate::io::atomic_write;
use crate::project::Project;

const AI_TOOL_KEY: &str = "ai_tool";
const KNOWLEDGE_KEY: &str = "knowledge";

/// One declared knowledge package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub name: String,
    #[serde(default)]
    pub source: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "main".to_string()
}

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    path: PathBuf,
    table: Table,
}

impl ProjectConfig {
    /// A config with no keys that will be written to `path` on save.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Table::new(),
        }
    }

    pub fn load(project: &Project) -> Result<Self> {
        Self::load_from(&project.config_path())
    }

    /// Parse the file at `path`. A parse failure is fatal: an unreadable
    /// config must never be treated as empty and then overwritten.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SpecfoldError::MissingConfig(path.to_path_buf()).into());
        }
        let content = std::fs::read_to_string(path)?;
        let table: Table = toml::from_str(&content).map_err(|e| SpecfoldError::InvalidConfig {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ai_tool(&self) -> Option<&str> {
        self.table.get(AI_TOOL_KEY).and_then(Value::as_str)
    }

    pub fn set_ai_tool(&mut self, id: &str) {
        self.table
            .insert(AI_TOOL_KEY.to_string(), Value::String(id.to_string()));
    }

    /// Declared packages in file order. Entries without a `name` are skipped.
    pub fn knowledge(&self) -> Vec<KnowledgeEntry> {
        let Some(items) = self.table.get(KNOWLEDGE_KEY).and_then(Value::as_array) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| item.clone().try_into::<KnowledgeEntry>().ok())
            .filter(|entry| !entry.name.is_empty())
            .collect()
    }

    pub fn find_knowledge(&self, name: &str) -> Option<KnowledgeEntry> {
        self.knowledge().into_iter().find(|e| e.name == name)
    }

    /// Replace the entry with the same name in place, or append it.
    pub fn upsert_knowledge(&mut self, entry: KnowledgeEntry) {
        let mut entries = self.knowledge();
        match entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        self.set_knowledge(entries);
    }

    /// Drop the named entry. Returns `false` if it was not declared.
    pub fn remove_knowledge(&mut self, name: &str) -> bool {
        let mut entries = self.knowledge();
        let before = entries.len();
        entries.retain(|e| e.name != name);
        if entries.len() == before {
            return false;
        }
        self.set_knowledge(entries);
        true
    }

    fn set_knowledge(&mut self, entries: Vec<KnowledgeEntry>) {
        let items = entries
            .into_iter()
            .map(|e| {
                let mut t = Table::new();
                t.insert("name".into(), Value::String(e.name));
                t.insert("source".into(), Value::String(e.source));
                t.insert("version".into(), Value::String(e.version));
                Value::Table(t)
            })
            .collect();
        self.table
            .insert(KNOWLEDGE_KEY.to_string(), Value::Array(items));
    }

    /// Rewrite the whole document atomically.
    pub fn save(&self) -> Result<()> {
        let text = toml::to_string(&self.table)?;
        atomic_write(&self.path, text.as_bytes())
    }
}
