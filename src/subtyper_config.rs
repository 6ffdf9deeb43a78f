//! `subtyper.toml` file model.
//!
//! Every section is optional; missing keys take the defaults below. Relative
//! paths are resolved later against the directory holding the file.
//!
//! # Configuration File Format
//!
//! ```toml
//! [reference]
//! dir = "reference"
//! panel = "reference_genomes.fa"
//! alignment = "reference_alignment.fa"
//! tree = "reference_tree.tree"
//! subtypes = "reference_subtypes.csv"
//!
//! [tools]
//! python = "python3"
//! dir = "scripts"
//!
//! [tools.tree]
//! program = "/opt/conda/envs/iqtree/bin/python"
//! script = "infer_new_ML_tree.py"
//!
//! [output]
//! workspace_dir = "."
//! dir_name = "output"
//! archive_name = "output.zip"
//! subdir = "iqtree"
//! markers = ["reoptimised", "updated"]
//!
//! [logging]
//! file = true
//! format = "json"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "subtyper.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSection {
    /// Directory the reference file names resolve against
    #[serde(default = "default_dot")]
    pub dir: PathBuf,
    #[serde(default = "default_panel")]
    pub panel: PathBuf,
    #[serde(default = "default_alignment")]
    pub alignment: PathBuf,
    #[serde(default = "default_tree")]
    pub tree: PathBuf,
    #[serde(default = "default_subtypes")]
    pub subtypes: PathBuf,
}

fn default_dot() -> PathBuf {
    PathBuf::from(".")
}

fn default_panel() -> PathBuf {
    PathBuf::from("reference_genomes.fa")
}

fn default_alignment() -> PathBuf {
    PathBuf::from("reference_alignment.fa")
}

fn default_tree() -> PathBuf {
    PathBuf::from("reference_tree.tree")
}

fn default_subtypes() -> PathBuf {
    PathBuf::from("reference_subtypes.csv")
}

impl Default for ReferenceSection {
    fn default() -> Self {
        Self {
            dir: default_dot(),
            panel: default_panel(),
            alignment: default_alignment(),
            tree: default_tree(),
            subtypes: default_subtypes(),
        }
    }
}

/// One external tool. Both keys are optional.
///
/// `program` defaults to `[tools] python`. `script` defaults to the tool's
/// stock script; set it to `""` to run `program` without a script argument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsSection {
    /// Interpreter used by every tool without its own `program`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,
    /// Directory the script names resolve against
    #[serde(default = "default_dot")]
    pub dir: PathBuf,
    #[serde(default)]
    pub distance: ToolSection,
    #[serde(default)]
    pub tree: ToolSection,
    #[serde(default)]
    pub subtype: ToolSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            python: None,
            dir: default_dot(),
            distance: ToolSection::default(),
            tree: ToolSection::default(),
            subtype: ToolSection::default(),
        }
    }
}

pub const DEFAULT_PYTHON: &str = "python3";
pub const DISTANCE_SCRIPT: &str = "p-distance-calc.py";
pub const TREE_SCRIPT: &str = "infer_new_ML_tree.py";
pub const SUBTYPE_SCRIPT: &str = "ML_patristic-dist_calc.py";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSection {
    /// Working directory of every tool; defaults to the current directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,
    #[serde(default = "default_dir_name")]
    pub dir_name: String,
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    #[serde(default = "default_subdir")]
    pub subdir: String,
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
    #[serde(default = "default_distance_artifact")]
    pub distance_artifact: String,
    #[serde(default = "default_tree_artifact")]
    pub tree_artifact: String,
    #[serde(default = "default_subtype_artifact")]
    pub subtype_artifact: String,
}

fn default_dir_name() -> String {
    "output".to_string()
}

fn default_archive_name() -> String {
    "output.zip".to_string()
}

fn default_subdir() -> String {
    "iqtree".to_string()
}

fn default_markers() -> Vec<String> {
    vec!["reoptimised".to_string(), "updated".to_string()]
}

fn default_distance_artifact() -> String {
    "p_distance_output.json".to_string()
}

fn default_tree_artifact() -> String {
    "ml_tree_output.json".to_string()
}

fn default_subtype_artifact() -> String {
    "subtype_output.json".to_string()
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            dir_name: default_dir_name(),
            archive_name: default_archive_name(),
            subdir: default_subdir(),
            markers: default_markers(),
            distance_artifact: default_distance_artifact(),
            tree_artifact: default_tree_artifact(),
            subtype_artifact: default_subtype_artifact(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Also write logs to `<state_dir>/logs/subtyper.log`
    #[serde(default)]
    pub file: bool,
    #[serde(default)]
    pub format: LogFormat,
}

/// The complete subtyper.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtyperToml {
    #[serde(default)]
    pub reference: ReferenceSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl SubtyperToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse subtyper.toml")
    }

    /// Find and load the config file.
    ///
    /// Order: `explicit` → `./subtyper.toml` → user config dir → defaults.
    /// Returns the file that was used, if any.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let candidates = [
            Some(cwd.join(CONFIG_FILE_NAME)),
            dirs::config_dir().map(|d| d.join("subtyper").join(CONFIG_FILE_NAME)),
        ];
        for candidate in candidates.into_iter().flatten() {
            if candidate.is_file() {
                return Ok((Self::load(&candidate)?, Some(candidate)));
            }
        }

        Ok((Self::default(), None))
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize subtyper.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration shape and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let output = &self.output;

        for (key, value) in [
            ("dir_name", &output.dir_name),
            ("subdir", &output.subdir),
            ("archive_name", &output.archive_name),
            ("distance_artifact", &output.distance_artifact),
            ("tree_artifact", &output.tree_artifact),
            ("subtype_artifact", &output.subtype_artifact),
        ] {
            if !is_plain_file_name(value) {
                warnings.push(format!(
                    "[output] {key} '{value}' must be a single file name"
                ));
            }
        }

        if output.markers.is_empty() {
            warnings.push(
                "[output] markers is empty: no tree working files will be moved".to_string(),
            );
        }
        if output.markers.iter().any(|m| m.is_empty()) {
            warnings.push("[output] markers contains an empty string".to_string());
        }

        if !output.archive_name.ends_with(".zip") {
            warnings.push(format!(
                "[output] archive_name '{}' does not end in .zip",
                output.archive_name
            ));
        }

        for (name, tool) in [
            ("distance", &self.tools.distance),
            ("tree", &self.tools.tree),
            ("subtype", &self.tools.subtype),
        ] {
            if tool.program.as_deref().is_some_and(|p| p.trim().is_empty()) {
                warnings.push(format!("[tools.{name}] program is empty"));
            }
        }

        warnings
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
