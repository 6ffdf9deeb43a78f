use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::artifacts::OutputLayout;
use crate::stage::ToolCommand;
use crate::subtyper_config::{
    DEFAULT_PYTHON, DISTANCE_SCRIPT, LoggingSection, SUBTYPE_SCRIPT, SubtyperToml, TREE_SCRIPT,
    ToolSection,
};

/// Values that override the config file: environment first, CLI on top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub python: Option<String>,
    pub reference_dir: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Read `SUBTYPER_PYTHON`, `SUBTYPER_REFERENCE_DIR` and
    /// `SUBTYPER_WORKSPACE_DIR`. Empty values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            python: get("SUBTYPER_PYTHON"),
            reference_dir: get("SUBTYPER_REFERENCE_DIR").map(PathBuf::from),
            workspace_dir: get("SUBTYPER_WORKSPACE_DIR").map(PathBuf::from),
        }
    }

    /// Layer `other` on top of `self`.
    pub fn merged_with(self, other: ConfigOverrides) -> Self {
        Self {
            python: other.python.or(self.python),
            reference_dir: other.reference_dir.or(self.reference_dir),
            workspace_dir: other.workspace_dir.or(self.workspace_dir),
        }
    }
}

/// Fixed, read-only reference dataset shared by every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSet {
    pub dir: PathBuf,
    pub panel: PathBuf,
    pub alignment: PathBuf,
    pub tree: PathBuf,
    pub subtypes: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
    pub distance: ToolCommand,
    pub tree: ToolCommand,
    pub subtype: ToolCommand,
}

/// Runtime configuration.
///
/// Built once from the config file, environment and CLI, and threaded into
/// the pipeline. Every path in it is absolute.
#[derive(Debug, Clone)]
pub struct Config {
    /// The file the settings came from, if any
    pub config_file: Option<PathBuf>,
    pub workspace_dir: PathBuf,
    /// `<workspace>/.subtyper`: audit history and logs
    pub state_dir: PathBuf,
    pub audit_dir: PathBuf,
    pub log_dir: PathBuf,
    pub python: String,
    pub reference: ReferenceSet,
    pub tools: ToolSet,
    pub layout: OutputLayout,
    pub logging: LoggingSection,
    pub verbose: bool,
    toml: SubtyperToml,
}

impl Config {
    /// Discover the config file and resolve it against `cwd`.
    pub fn load(
        explicit: Option<&Path>,
        cwd: &Path,
        overrides: ConfigOverrides,
        verbose: bool,
    ) -> Result<Self> {
        let (toml, config_file) = SubtyperToml::discover(explicit, cwd)?;
        let base_dir = match config_file.as_deref().and_then(Path::parent) {
            Some(parent) if !parent.as_os_str().is_empty() => absolute(parent, cwd)?,
            _ => absolute(cwd, cwd)?,
        };
        let mut config = Self::resolve(toml, &base_dir, cwd, overrides, verbose)?;
        config.config_file = config_file
            .map(|path| absolute(&path, cwd))
            .transpose()?;
        Ok(config)
    }

    /// Resolve a parsed file. File paths resolve against `base_dir`, override
    /// paths against `cwd`.
    pub fn resolve(
        toml: SubtyperToml,
        base_dir: &Path,
        cwd: &Path,
        overrides: ConfigOverrides,
        verbose: bool,
    ) -> Result<Self> {
        let workspace_dir = match (&overrides.workspace_dir, &toml.output.workspace_dir) {
            (Some(dir), _) => absolute(dir, cwd)?,
            (None, Some(dir)) => absolute(dir, base_dir)?,
            (None, None) => absolute(cwd, cwd)?,
        };

        let reference_dir = match &overrides.reference_dir {
            Some(dir) => absolute(dir, cwd)?,
            None => absolute(&toml.reference.dir, base_dir)?,
        };
        let reference = ReferenceSet {
            panel: reference_dir.join(&toml.reference.panel),
            alignment: reference_dir.join(&toml.reference.alignment),
            tree: reference_dir.join(&toml.reference.tree),
            subtypes: reference_dir.join(&toml.reference.subtypes),
            dir: reference_dir,
        };

        let python = overrides
            .python
            .clone()
            .or_else(|| toml.tools.python.clone())
            .unwrap_or_else(|| DEFAULT_PYTHON.to_string());

        let out = &toml.output;
        let output_dir = workspace_dir.join(&out.dir_name);
        let layout = OutputLayout {
            stale_artifacts: vec![
                output_dir.join(&out.distance_artifact),
                output_dir.join(&out.tree_artifact),
                output_dir.join(&out.subtype_artifact),
            ],
            subdir: out.subdir.clone(),
            markers: out.markers.clone(),
            archive_path: workspace_dir.join(&out.archive_name),
            output_dir: output_dir.clone(),
        };

        let scripts_dir = absolute(&toml.tools.dir, base_dir)?;
        let tool = |section: &ToolSection, default_script: &str, artifact: &str| ToolCommand {
            program: section.program.clone().unwrap_or_else(|| python.clone()),
            script: resolve_script(section, default_script, &scripts_dir),
            working_dir: workspace_dir.clone(),
            artifact: output_dir.join(artifact),
        };
        let tools = ToolSet {
            distance: tool(&toml.tools.distance, DISTANCE_SCRIPT, &out.distance_artifact),
            tree: tool(&toml.tools.tree, TREE_SCRIPT, &out.tree_artifact),
            subtype: tool(&toml.tools.subtype, SUBTYPE_SCRIPT, &out.subtype_artifact),
        };

        let state_dir = workspace_dir.join(".subtyper");

        Ok(Self {
            config_file: None,
            audit_dir: state_dir.clone(),
            log_dir: state_dir.join("logs"),
            state_dir,
            python,
            reference,
            tools,
            layout,
            logging: toml.logging.clone(),
            verbose,
            workspace_dir,
            toml,
        })
    }

    /// The parsed file (or defaults) this config was resolved from.
    pub fn toml(&self) -> &SubtyperToml {
        &self.toml
    }

    pub fn output_dir(&self) -> &Path {
        &self.layout.output_dir
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.workspace_dir)
            .context("Failed to create workspace directory")?;
        std::fs::create_dir_all(self.audit_dir.join("runs"))
            .context("Failed to create runs directory")?;
        if self.logging.file {
            std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        }
        Ok(())
    }

    /// Reference files and tool scripts that do not exist on disk.
    pub fn missing_inputs(&self) -> Vec<String> {
        let mut missing = Vec::new();
        let reference = &self.reference;
        for (label, path) in [
            ("reference panel", &reference.panel),
            ("reference alignment", &reference.alignment),
            ("reference tree", &reference.tree),
            ("reference subtype table", &reference.subtypes),
        ] {
            if !path.is_file() {
                missing.push(format!("{} not found: {}", label, path.display()));
            }
        }
        for (label, tool) in [
            ("distance", &self.tools.distance),
            ("tree", &self.tools.tree),
            ("subtype", &self.tools.subtype),
        ] {
            if let Some(script) = &tool.script
                && !script.is_file()
            {
                missing.push(format!("{} script not found: {}", label, script.display()));
            }
        }
        missing
    }
}

fn resolve_script(
    section: &ToolSection,
    default_script: &str,
    scripts_dir: &Path,
) -> Option<PathBuf> {
    match &section.script {
        Some(script) if script.as_os_str().is_empty() => None,
        Some(script) => Some(scripts_dir.join(script)),
        None => Some(scripts_dir.join(default_script)),
    }
}

/// `path` made absolute against `base`, without touching the filesystem.
fn absolute(path: &Path, base: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    std::path::absolute(&joined)
        .with_context(|| format!("Failed to resolve path {}", joined.display()))
}
