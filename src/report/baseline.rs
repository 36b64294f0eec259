//! Expected permission levels per tool.
//!
//! A baseline pins how much each known tool is allowed to do. A catalog edit
//! that quietly lowers a tool's level (say `mutating` to `read-only`, which
//! would skip the approval gate) shows up as a `permission-baseline` violation.
//!
//! ```toml
//! [tools]
//! github = "read-write"
//! stripe = "mutating"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::catalog::PermissionLevel;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    #[serde(default)]
    pub tools: BTreeMap<String, PermissionLevel>,
}

impl Baseline {
    /// Expected levels for the tools in the bundled catalog.
    pub fn builtin() -> Self {
        let tools = [
            ("alchemy", PermissionLevel::ReadOnly),
            ("context7", PermissionLevel::ReadOnly),
            ("expo", PermissionLevel::Mutating),
            ("firecrawl", PermissionLevel::ReadOnly),
            ("github", PermissionLevel::ReadWrite),
            ("playwright", PermissionLevel::ReadOnly),
            ("stripe", PermissionLevel::Mutating),
            ("supabase", PermissionLevel::ReadWrite),
            ("vercel", PermissionLevel::Mutating),
        ]
        .into_iter()
        .map(|(id, level)| (id.to_string(), level))
        .collect();
        Self { tools }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read baseline: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse baseline: {}", path.display()))
    }

    /// Load from `path` when given, otherwise the built-in baseline.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn expected(&self, tool: &str) -> Option<PermissionLevel> {
        self.tools.get(tool).copied()
    }
}
