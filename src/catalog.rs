//! Capability catalog: the immutable, versioned declaration of every external
//! tool server a pipeline phase may call.
//!
//! The catalog is loaded once at startup and self-validated. Any issue is fatal:
//! a catalog that cannot be trusted must never reach the gate. Loading collects
//! every issue instead of stopping at the first one so an operator can fix the
//! document in a single pass.
//!
//! Parsing happens in two stages:
//! 1. a loose pass over the raw JSON that detects duplicate tool ids and missing
//!    required fields per tool
//! 2. typed deserialization of each tool and integration, followed by the
//!    cross-reference checks in [`CatalogDocument::validate`]

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::CatalogError;
use crate::phase::PhaseName;
use crate::pipeline::PipelineId;

/// Oldest catalog schema version this build accepts.
pub const MIN_CATALOG_VERSION: &str = "2.0.0";

/// The catalog shipped with the binary and written by `governor init`.
pub const BUNDLED_CATALOG: &str = include_str!("../catalog/mcp-catalog.json");

/// Fields every entry of `mcpServers` must carry.
pub const REQUIRED_TOOL_FIELDS: [&str; 7] = [
    "name",
    "allowedPipelines",
    "allowedPhases",
    "permissionLevel",
    "requiredEnvVars",
    "approvalRequired",
    "failureBehavior",
];

static ENV_VAR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").unwrap());

/// How much a tool can change outside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionLevel {
    ReadOnly,
    ReadWrite,
    /// Changes external state (payments, deployments); never auto-approved
    Mutating,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::ReadOnly => "read-only",
            PermissionLevel::ReadWrite => "read-write",
            PermissionLevel::Mutating => "mutating",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PermissionLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read-only" => Ok(PermissionLevel::ReadOnly),
            "read-write" => Ok(PermissionLevel::ReadWrite),
            "mutating" => Ok(PermissionLevel::Mutating),
            _ => anyhow::bail!(
                "Invalid permission level '{}'. Valid values: read-only, read-write, mutating",
                s
            ),
        }
    }
}

/// Class of failure a tool call can end in; keys of `failureBehavior`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorClass {
    #[serde(rename = "onAuthError")]
    Auth,
    #[serde(rename = "onTimeout")]
    Timeout,
    #[serde(rename = "onRateLimit")]
    RateLimit,
    #[serde(rename = "onNetworkError")]
    Network,
    #[serde(rename = "onValidationError")]
    Validation,
    #[serde(rename = "onUnknownError")]
    Unknown,
}

impl ErrorClass {
    pub const ALL: [ErrorClass; 6] = [
        ErrorClass::Auth,
        ErrorClass::Timeout,
        ErrorClass::RateLimit,
        ErrorClass::Network,
        ErrorClass::Validation,
        ErrorClass::Unknown,
    ];

    /// Classes every tool must route explicitly.
    pub const REQUIRED: [ErrorClass; 3] =
        [ErrorClass::Auth, ErrorClass::Timeout, ErrorClass::RateLimit];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Auth => "onAuthError",
            ErrorClass::Timeout => "onTimeout",
            ErrorClass::RateLimit => "onRateLimit",
            ErrorClass::Network => "onNetworkError",
            ErrorClass::Validation => "onValidationError",
            ErrorClass::Unknown => "onUnknownError",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ErrorClass {
    type Err = anyhow::Error;

    /// Accepts both the catalog key (`onTimeout`) and the short form (`timeout`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.to_lowercase().replace(['-', '_'], "");
        ErrorClass::ALL
            .into_iter()
            .find(|c| {
                let full = c.as_str().to_lowercase();
                full == key || full.trim_start_matches("on") == key
                    || full.trim_start_matches("on").trim_end_matches("error") == key
            })
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid error class '{}'. Valid values: {}",
                    s,
                    ErrorClass::ALL.map(|c| c.as_str()).join(", ")
                )
            })
    }
}

/// What the executor does when a tool call fails with a given class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureAction {
    Retry,
    Skip,
    Abort,
}

impl FailureAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureAction::Retry => "retry",
            FailureAction::Skip => "skip",
            FailureAction::Abort => "abort",
        }
    }
}

impl fmt::Display for FailureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeModeDefaults {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_calls_per_phase: Option<u32>,
}

/// One external tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub allowed_pipelines: Vec<PipelineId>,
    /// Per pipeline, the phases the tool may be called in
    pub allowed_phases: BTreeMap<PipelineId, Vec<PhaseName>>,
    pub permission_level: PermissionLevel,
    pub required_env_vars: Vec<String>,
    pub approval_required: bool,
    pub failure_behavior: BTreeMap<ErrorClass, FailureAction>,
    #[serde(default)]
    pub safe_mode_defaults: SafeModeDefaults,
}

impl ToolDescriptor {
    pub fn allows_pipeline(&self, pipeline: PipelineId) -> bool {
        self.allowed_pipelines.contains(&pipeline)
    }

    pub fn allows_phase(&self, pipeline: PipelineId, phase: PhaseName) -> bool {
        self.allowed_phases
            .get(&pipeline)
            .is_some_and(|phases| phases.contains(&phase))
    }

    pub fn phases_for(&self, pipeline: PipelineId) -> &[PhaseName] {
        self.allowed_phases
            .get(&pipeline)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Routed action for a failure class, falling back to `onUnknownError`.
    pub fn failure_action(&self, class: ErrorClass) -> Option<FailureAction> {
        self.failure_behavior
            .get(&class)
            .or_else(|| self.failure_behavior.get(&ErrorClass::Unknown))
            .copied()
    }
}

/// Which tools a pipeline uses and in which phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineIntegration {
    pub allowed_mcps: Vec<String>,
    pub phase_mapping: BTreeMap<PhaseName, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureLogging {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

/// Catalog-wide rules. Only the fields the governance checks read are typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_pipeline_isolation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_logging: Option<FailureLogging>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_required_for_mutating: Option<bool>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Distinguishes the protocol specification from the servers implementing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpGovernance {
    pub specification_url: String,
    #[serde(default)]
    pub clarification: String,
    pub governance_note: String,
}

/// The typed catalog document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_governance: Option<McpGovernance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_rules: Option<GlobalRules>,
    #[serde(deserialize_with = "deserialize_unique_tools")]
    pub mcp_servers: BTreeMap<String, ToolDescriptor>,
    pub pipeline_integrations: BTreeMap<PipelineId, PipelineIntegration>,
}

impl CatalogDocument {
    /// Cross-reference checks over a typed document. Returns every issue found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        match parse_version(&self.version) {
            None => issues.push(format!(
                "version '{}' is not a dotted numeric version",
                self.version
            )),
            Some(v) if !version_at_least(&v, MIN_CATALOG_VERSION) => issues.push(format!(
                "version {} is older than the minimum supported {}",
                self.version, MIN_CATALOG_VERSION
            )),
            Some(_) => {}
        }

        match &self.mcp_governance {
            None => issues.push("mcpGovernance block is missing".to_string()),
            Some(gov) => {
                if !(gov.specification_url.starts_with("https://")
                    || gov.specification_url.starts_with("http://"))
                {
                    issues.push(format!(
                        "mcpGovernance.specificationUrl '{}' is not an http(s) URL",
                        gov.specification_url
                    ));
                }
                let note = gov.governance_note.to_lowercase();
                if !(note.contains("specification") && note.contains("server")) {
                    issues.push(
                        "mcpGovernance.governanceNote must distinguish the specification from the servers implementing it"
                            .to_string(),
                    );
                }
            }
        }

        if self.mcp_servers.is_empty() {
            issues.push("mcpServers declares no tools".to_string());
        }

        for (id, tool) in &self.mcp_servers {
            issues.extend(validate_tool(id, tool));
            for pipeline in &tool.allowed_pipelines {
                if !self.pipeline_integrations.contains_key(pipeline) {
                    issues.push(format!(
                        "tool '{}' allows pipeline '{}' which has no pipelineIntegrations entry",
                        id, pipeline
                    ));
                }
            }
        }

        for (pipeline, integration) in &self.pipeline_integrations {
            issues.extend(self.validate_integration(*pipeline, integration));
        }

        issues
    }

    fn validate_integration(&self, pipeline: PipelineId, integration: &PipelineIntegration) -> Vec<String> {
        let mut issues = Vec::new();
        let at = format!("pipelineIntegrations.{}", pipeline);

        for tool_id in &integration.allowed_mcps {
            match self.mcp_servers.get(tool_id) {
                None => issues.push(format!("{}.allowedMcps references unknown tool '{}'", at, tool_id)),
                Some(tool) if !tool.allows_pipeline(pipeline) => issues.push(format!(
                    "{}.allowedMcps lists '{}' but the tool does not allow pipeline '{}'",
                    at, tool_id, pipeline
                )),
                Some(_) => {}
            }
        }

        for phase in PhaseName::ALL {
            if !integration.phase_mapping.contains_key(&phase) {
                issues.push(format!("{}.phaseMapping has no entry for phase '{}'", at, phase));
            }
        }

        for (phase, tool_ids) in &integration.phase_mapping {
            for tool_id in tool_ids {
                let Some(tool) = self.mcp_servers.get(tool_id) else {
                    issues.push(format!(
                        "{}.phaseMapping.{} references unknown tool '{}'",
                        at, phase, tool_id
                    ));
                    continue;
                };
                if !integration.allowed_mcps.contains(tool_id) {
                    issues.push(format!(
                        "{}.phaseMapping.{} maps '{}' which is not in allowedMcps",
                        at, phase, tool_id
                    ));
                }
                if !tool.allows_phase(pipeline, *phase) {
                    issues.push(format!(
                        "{}.phaseMapping.{} maps '{}' but the tool's allowedPhases for '{}' exclude '{}'",
                        at, phase, tool_id, pipeline, phase
                    ));
                }
            }
        }

        // Reverse direction: what a tool declares must show up in the integration.
        for (tool_id, tool) in &self.mcp_servers {
            if !tool.allows_pipeline(pipeline) {
                continue;
            }
            if !integration.allowed_mcps.contains(tool_id) {
                issues.push(format!(
                    "tool '{}' allows pipeline '{}' but {}.allowedMcps does not list it",
                    tool_id, pipeline, at
                ));
            }
            for phase in tool.phases_for(pipeline) {
                let mapped = integration
                    .phase_mapping
                    .get(phase)
                    .is_some_and(|ids| ids.contains(tool_id));
                if !mapped {
                    issues.push(format!(
                        "tool '{}' allows phase '{}' of '{}' but {}.phaseMapping.{} omits it",
                        tool_id, phase, pipeline, at, phase
                    ));
                }
            }
        }

        issues
    }
}

fn validate_tool(id: &str, tool: &ToolDescriptor) -> Vec<String> {
    let mut issues = Vec::new();
    let at = format!("mcpServers.{}", id);

    if id.trim().is_empty() {
        issues.push("mcpServers contains an empty tool id".to_string());
    }
    if tool.name.trim().is_empty() {
        issues.push(format!("{}.name is empty", at));
    }
    if tool.allowed_pipelines.is_empty() {
        issues.push(format!("{}.allowedPipelines is empty", at));
    }

    let mut seen = BTreeSet::new();
    for pipeline in &tool.allowed_pipelines {
        if !seen.insert(*pipeline) {
            issues.push(format!("{}.allowedPipelines lists '{}' twice", at, pipeline));
        }
        match tool.allowed_phases.get(pipeline) {
            None => issues.push(format!(
                "{}.allowedPhases has no entry for allowed pipeline '{}'",
                at, pipeline
            )),
            Some(phases) if phases.is_empty() => issues.push(format!(
                "{}.allowedPhases.{} is empty",
                at, pipeline
            )),
            Some(_) => {}
        }
    }
    for pipeline in tool.allowed_phases.keys() {
        if !tool.allows_pipeline(*pipeline) {
            issues.push(format!(
                "{}.allowedPhases names pipeline '{}' which is not in allowedPipelines",
                at, pipeline
            ));
        }
    }

    for var in &tool.required_env_vars {
        if !ENV_VAR_NAME.is_match(var) {
            issues.push(format!(
                "{}.requiredEnvVars contains invalid variable name '{}'",
                at, var
            ));
        }
    }

    issues
}

/// Parse `"2.1.0"` into `[2, 1, 0]`.
pub fn parse_version(version: &str) -> Option<Vec<u64>> {
    let trimmed = version.trim().trim_start_matches('v');
    if trimmed.is_empty() {
        return None;
    }
    trimmed.split('.').map(|part| part.parse().ok()).collect()
}

/// Component-wise numeric comparison; missing components count as zero.
pub fn version_at_least(version: &[u64], minimum: &str) -> bool {
    let Some(min) = parse_version(minimum) else {
        return false;
    };
    let len = version.len().max(min.len());
    for i in 0..len {
        let a = version.get(i).copied().unwrap_or(0);
        let b = min.get(i).copied().unwrap_or(0);
        if a != b {
            return a > b;
        }
    }
    true
}

/// Map entries in document order with duplicates preserved.
struct Entries<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map keyed by tool id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

fn deserialize_unique_tools<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, ToolDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    let Entries(entries) = Entries::<ToolDescriptor>::deserialize(deserializer)?;
    let mut tools = BTreeMap::new();
    for (id, tool) in entries {
        if tools.insert(id.clone(), tool).is_some() {
            return Err(serde::de::Error::custom(format!("duplicate tool id '{}'", id)));
        }
    }
    Ok(tools)
}

/// Top level of the loose first pass.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    mcp_governance: Option<Value>,
    #[serde(default)]
    global_rules: Option<Value>,
    #[serde(default)]
    mcp_servers: Option<Entries<Value>>,
    #[serde(default)]
    pipeline_integrations: Option<Entries<Value>>,
}

/// Outcome of reading a catalog without failing on the first problem.
#[derive(Debug)]
pub struct CatalogInspection {
    /// Everything that could be typed, even when issues were found
    pub document: Option<CatalogDocument>,
    pub issues: Vec<String>,
    /// SHA-256 of the source bytes, hex
    pub fingerprint: String,
    /// Set when the source is not JSON at all
    pub syntax_error: Option<serde_json::Error>,
}

impl CatalogInspection {
    pub fn is_clean(&self) -> bool {
        self.syntax_error.is_none() && self.issues.is_empty()
    }
}

/// Read a catalog source, collecting every structural and cross-reference issue.
pub fn inspect(source: &str) -> CatalogInspection {
    let fingerprint = fingerprint_of(source.as_bytes());

    let raw: RawDocument = match serde_json::from_str(source) {
        Ok(raw) => raw,
        Err(e) => {
            return CatalogInspection {
                document: None,
                issues: vec![format!("catalog is not a valid JSON document: {}", e)],
                fingerprint,
                syntax_error: Some(e),
            };
        }
    };

    let mut issues = Vec::new();
    let mut doc = CatalogDocument::default();

    match raw.version {
        Some(Value::String(v)) => doc.version = v,
        Some(other) => issues.push(format!("version must be a string, found {}", other)),
        None => issues.push("version is missing".to_string()),
    }

    if let Some(gov) = raw.mcp_governance {
        match serde_json::from_value::<McpGovernance>(gov) {
            Ok(g) => doc.mcp_governance = Some(g),
            Err(e) => issues.push(format!("mcpGovernance is malformed: {}", e)),
        }
    }

    if let Some(rules) = raw.global_rules {
        match serde_json::from_value::<GlobalRules>(rules) {
            Ok(r) => doc.global_rules = Some(r),
            Err(e) => issues.push(format!("globalRules is malformed: {}", e)),
        }
    }

    match raw.mcp_servers {
        None => issues.push("mcpServers is missing".to_string()),
        Some(Entries(entries)) => {
            for (id, value) in entries {
                if doc.mcp_servers.contains_key(&id) {
                    issues.push(format!("mcpServers declares tool id '{}' more than once", id));
                    continue;
                }
                let missing: Vec<&str> = REQUIRED_TOOL_FIELDS
                    .iter()
                    .copied()
                    .filter(|field| value.get(field).is_none())
                    .collect();
                if !missing.is_empty() {
                    issues.push(format!(
                        "mcpServers.{} is missing required field(s): {}",
                        id,
                        missing.join(", ")
                    ));
                    continue;
                }
                match serde_json::from_value::<ToolDescriptor>(value) {
                    Ok(tool) => {
                        doc.mcp_servers.insert(id, tool);
                    }
                    Err(e) => issues.push(format!("mcpServers.{} is malformed: {}", id, e)),
                }
            }
        }
    }

    match raw.pipeline_integrations {
        None => issues.push("pipelineIntegrations is missing".to_string()),
        Some(Entries(entries)) => {
            for (key, value) in entries {
                let pipeline: PipelineId = match key.parse() {
                    Ok(p) => p,
                    Err(e) => {
                        issues.push(format!("pipelineIntegrations: {}", e));
                        continue;
                    }
                };
                if doc.pipeline_integrations.contains_key(&pipeline) {
                    issues.push(format!(
                        "pipelineIntegrations declares pipeline '{}' more than once",
                        pipeline
                    ));
                    continue;
                }
                match serde_json::from_value::<PipelineIntegration>(value) {
                    Ok(integration) => {
                        doc.pipeline_integrations.insert(pipeline, integration);
                    }
                    Err(e) => issues.push(format!(
                        "pipelineIntegrations.{} is malformed: {}",
                        pipeline, e
                    )),
                }
            }
        }
    }

    let version_missing = doc.version.is_empty();
    for issue in doc.validate() {
        // Already reported above
        if version_missing && issue.starts_with("version") {
            continue;
        }
        if issue == "mcpServers declares no tools" && issues.iter().any(|i| i.starts_with("mcpServers")) {
            continue;
        }
        issues.push(issue);
    }

    CatalogInspection {
        document: Some(doc),
        issues,
        fingerprint,
        syntax_error: None,
    }
}

fn fingerprint_of(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// A validated, immutable capability catalog.
#[derive(Debug, Clone)]
pub struct CapabilityCatalog {
    document: CatalogDocument,
    fingerprint: String,
}

impl CapabilityCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::parse(&source)?;
        tracing::info!(
            path = %path.display(),
            version = %catalog.version(),
            tools = catalog.document.mcp_servers.len(),
            "Loaded capability catalog"
        );
        Ok(catalog)
    }

    pub fn parse(source: &str) -> Result<Self, CatalogError> {
        let inspection = inspect(source);
        if let Some(e) = inspection.syntax_error {
            return Err(CatalogError::Parse(e));
        }
        if !inspection.issues.is_empty() {
            return Err(CatalogError::Invalid {
                issues: inspection.issues,
            });
        }
        let document = inspection.document.unwrap_or_default();
        Ok(Self {
            document,
            fingerprint: inspection.fingerprint,
        })
    }

    /// Validate an already typed document.
    pub fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        let issues = document.validate();
        if !issues.is_empty() {
            return Err(CatalogError::Invalid { issues });
        }
        let bytes = serde_json::to_vec(&document).map_err(CatalogError::Parse)?;
        Ok(Self {
            fingerprint: fingerprint_of(&bytes),
            document,
        })
    }

    /// The catalog compiled into the binary.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::parse(BUNDLED_CATALOG)
    }

    /// Wrap a document without validating it; the report harness grades these.
    pub(crate) fn unchecked(document: CatalogDocument, fingerprint: String) -> Self {
        Self {
            document,
            fingerprint,
        }
    }

    pub fn document(&self) -> &CatalogDocument {
        &self.document
    }

    pub fn version(&self) -> &str {
        &self.document.version
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn tool(&self, id: &str) -> Option<&ToolDescriptor> {
        self.document.mcp_servers.get(id)
    }

    /// Tools sorted by id.
    pub fn tools(&self) -> impl Iterator<Item = (&str, &ToolDescriptor)> {
        self.document
            .mcp_servers
            .iter()
            .map(|(id, tool)| (id.as_str(), tool))
    }

    pub fn integration(&self, pipeline: PipelineId) -> Option<&PipelineIntegration> {
        self.document.pipeline_integrations.get(&pipeline)
    }

    pub fn global_rules(&self) -> Option<&GlobalRules> {
        self.document.global_rules.as_ref()
    }

    pub fn governance(&self) -> Option<&McpGovernance> {
        self.document.mcp_governance.as_ref()
    }
}
