//! Pipeline identities, built-in phase tables, and the allowed-directory table.
//!
//! Each factory writes only beneath its own top-level directory. The table in
//! [`allowed_directories`] is the sole isolation mechanism between concurrently
//! running pipelines, so no entry of one pipeline may be a prefix of another's.

use serde::{Deserialize, Serialize};

use crate::phase::Phase;

/// One independently configured build factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineId {
    /// Mobile app factory
    AppFactory,
    DappFactory,
    AgentFactory,
    PluginFactory,
    MiniappPipeline,
    WebsitePipeline,
}

impl PipelineId {
    pub const ALL: [PipelineId; 6] = [
        PipelineId::AppFactory,
        PipelineId::DappFactory,
        PipelineId::AgentFactory,
        PipelineId::PluginFactory,
        PipelineId::MiniappPipeline,
        PipelineId::WebsitePipeline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineId::AppFactory => "app-factory",
            PipelineId::DappFactory => "dapp-factory",
            PipelineId::AgentFactory => "agent-factory",
            PipelineId::PluginFactory => "plugin-factory",
            PipelineId::MiniappPipeline => "miniapp-pipeline",
            PipelineId::WebsitePipeline => "website-pipeline",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineId::AppFactory => "Mobile applications",
            PipelineId::DappFactory => "Decentralized applications",
            PipelineId::AgentFactory => "AI agents",
            PipelineId::PluginFactory => "Editor and tool plugins",
            PipelineId::MiniappPipeline => "Mini apps",
            PipelineId::WebsitePipeline => "Websites",
        }
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PipelineId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelineId::ALL
            .into_iter()
            .find(|p| p.as_str() == s.to_lowercase())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid pipeline '{}'. Valid values: {}",
                    s,
                    PipelineId::ALL.map(|p| p.as_str()).join(", ")
                )
            })
    }
}

/// Path prefixes, relative to the repository root, a pipeline may write beneath.
pub fn allowed_directories(pipeline: PipelineId) -> &'static [&'static str] {
    match pipeline {
        PipelineId::AppFactory => &[
            "app-factory/builds/",
            "app-factory/runs/",
            "app-factory/outputs/",
        ],
        PipelineId::DappFactory => &[
            "dapp-factory/builds/",
            "dapp-factory/runs/",
            "dapp-factory/dapp-builds/",
        ],
        PipelineId::AgentFactory => &[
            "agent-factory/builds/",
            "agent-factory/runs/",
            "agent-factory/outputs/",
        ],
        PipelineId::PluginFactory => &["plugin-factory/builds/", "plugin-factory/runs/"],
        PipelineId::MiniappPipeline => &["miniapp-pipeline/builds/", "miniapp-pipeline/runs/"],
        PipelineId::WebsitePipeline => &[
            "website-pipeline/builds/",
            "website-pipeline/runs/",
            "website-pipeline/generated/",
        ],
    }
}

/// The phase table every factory runs unless a custom table is supplied.
///
/// `ralph` is the optional polish loop; it may start once verification passes.
pub fn default_phases() -> Vec<Phase> {
    vec![
        Phase::new("research", "Research and requirements"),
        Phase::new("build", "Build").with_dependencies(&["research"]),
        Phase::new("verify", "Verify").with_dependencies(&["build"]),
        Phase::new("deploy", "Deploy").with_dependencies(&["verify"]),
        Phase::optional("ralph", "Ralph polish loop").with_dependencies(&["verify"]),
    ]
}

/// A pipeline definition, fixed at platform configuration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub phases: Vec<Phase>,
    pub allowed_directories: Vec<String>,
}

impl Pipeline {
    /// The built-in definition of a pipeline.
    pub fn builtin(id: PipelineId) -> Self {
        Self::with_phases(id, default_phases())
    }

    /// A pipeline with a custom phase table but the static directory table.
    pub fn with_phases(id: PipelineId, phases: Vec<Phase>) -> Self {
        Self {
            id,
            phases,
            allowed_directories: allowed_directories(id)
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}
