//! AI host integrations and their optional skill-linking capability.
//!
//! The active integration is named by `ai_tool` in `specfold.toml`. Hooks
//! are best-effort: the package manager logs a failing hook and moves on.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::SpecfoldError;

/// Links skills shipped in a knowledge package into a host's skill folder.
pub trait SkillLinker: Send + Sync {
    /// Returns the number of skills linked.
    fn link_knowledge_skills(&self, project_root: &Path, package_path: &Path) -> Result<usize>;

    /// Returns the number of links removed.
    fn unlink_knowledge_skills(&self, project_root: &Path, package_path: &Path) -> Result<usize>;
}

pub trait HostIntegration: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// The skill-linking capability, if this host has one.
    fn skill_linker(&self) -> Option<&dyn SkillLinker> {
        None
    }
}

pub struct CursorIntegration;

impl HostIntegration for CursorIntegration {
    fn id(&self) -> &str {
        "cursor"
    }

    fn description(&self) -> &str {
        "Cursor editor"
    }
}

/// Claude Desktop: each `<package>/skills/<skill>` directory is symlinked
/// as `.claude/skills/<skill>` in the project.
pub struct ClaudeDesktopIntegration;

impl ClaudeDesktopIntegration {
    fn skills_dir(project_root: &Path) -> PathBuf {
        project_root.join(".claude").join("skills")
    }

    fn package_skills(package_path: &Path) -> Result<Vec<PathBuf>> {
        let dir = package_path.join("skills");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut skills: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        skills.sort();
        Ok(skills)
    }
}

impl HostIntegration for ClaudeDesktopIntegration {
    fn id(&self) -> &str {
        "claude-desktop"
    }

    fn description(&self) -> &str {
        "Claude Desktop"
    }

    fn skill_linker(&self) -> Option<&dyn SkillLinker> {
        Some(self)
    }
}

impl SkillLinker for ClaudeDesktopIntegration {
    fn link_knowledge_skills(&self, project_root: &Path, package_path: &Path) -> Result<usize> {
        let skills = Self::package_skills(package_path)?;
        if skills.is_empty() {
            return Ok(0);
        }
        let target_dir = Self::skills_dir(project_root);
        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("Failed to create {}", target_dir.display()))?;

        let mut linked = 0;
        for skill in skills {
            let Some(name) = skill.file_name() else {
                continue;
            };
            let link = target_dir.join(name);
            if link.symlink_metadata().is_ok() {
                if std::fs::read_link(&link).ok().as_deref() == Some(skill.as_path()) {
                    continue;
                }
                remove_link(&link)?;
            }
            symlink_dir(&skill, &link)
                .with_context(|| format!("Failed to link skill {}", link.display()))?;
            debug!(skill = %link.display(), "linked skill");
            linked += 1;
        }
        Ok(linked)
    }

    fn unlink_knowledge_skills(&self, project_root: &Path, package_path: &Path) -> Result<usize> {
        let target_dir = Self::skills_dir(project_root);
        let mut removed = 0;
        for skill in Self::package_skills(package_path)? {
            let Some(name) = skill.file_name() else {
                continue;
            };
            let link = target_dir.join(name);
            let is_ours = std::fs::read_link(&link)
                .map(|dest| dest == skill)
                .unwrap_or(false);
            if is_ours {
                remove_link(&link)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(unix)]
fn symlink_dir(src: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, link)
}

#[cfg(windows)]
fn symlink_dir(src: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(src, link)
}

fn remove_link(link: &Path) -> Result<()> {
    std::fs::remove_file(link)
        .or_else(|_| std::fs::remove_dir(link))
        .with_context(|| format!("Failed to remove {}", link.display()))
}

/// Lookup table of known integrations, keyed by id.
pub struct IntegrationRegistry {
    integrations: Vec<Box<dyn HostIntegration>>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self {
            integrations: Vec::new(),
        }
    }

    /// Registry holding `cursor` and `claude-desktop`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CursorIntegration));
        registry.register(Box::new(ClaudeDesktopIntegration));
        registry
    }

    pub fn register(&mut self, integration: Box<dyn HostIntegration>) {
        self.integrations.retain(|i| i.id() != integration.id());
        self.integrations.push(integration);
    }

    pub fn get(&self, id: &str) -> Option<&dyn HostIntegration> {
        self.integrations
            .iter()
            .find(|i| i.id() == id)
            .map(|i| i.as_ref())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.integrations.iter().map(|i| i.id()).collect()
    }

    /// Like [`get`](Self::get) but an unknown id is a typed error.
    pub fn require(&self, id: &str) -> Result<&dyn HostIntegration> {
        self.get(id).ok_or_else(|| {
            SpecfoldError::UnknownIntegration {
                id: id.to_string(),
                known: self.ids().join(", "),
            }
            .into()
        })
    }
}

impl Default for IntegrationRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
