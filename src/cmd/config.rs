//! Configuration view and validation commands: `subtyper config`.

use anyhow::Result;
use std::path::Path;

use subtyper::config::{Config, ConfigOverrides};
use subtyper::subtyper_config::{CONFIG_FILE_NAME, SubtyperToml};

use super::super::ConfigCommands;

/// Returns `false` when `validate` found problems.
pub fn cmd_config(
    cwd: &Path,
    explicit: Option<&Path>,
    overrides: ConfigOverrides,
    command: Option<ConfigCommands>,
) -> Result<bool> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config = Config::load(explicit, cwd, overrides, false)?;

            println!();
            println!("Subtyper Configuration");
            println!("======================");
            println!();

            match &config.config_file {
                Some(path) => println!("Config file: {}", path.display()),
                None => {
                    println!("No {} found. Using default configuration.", CONFIG_FILE_NAME);
                }
            }
            println!();

            println!("[reference]");
            println!("  dir = \"{}\"", config.reference.dir.display());
            println!("  panel = \"{}\"", config.reference.panel.display());
            println!("  alignment = \"{}\"", config.reference.alignment.display());
            println!("  tree = \"{}\"", config.reference.tree.display());
            println!("  subtypes = \"{}\"", config.reference.subtypes.display());
            println!();

            println!("[tools]");
            println!("  python = \"{}\"", config.python);
            for (name, tool) in [
                ("distance", &config.tools.distance),
                ("tree", &config.tools.tree),
                ("subtype", &config.tools.subtype),
            ] {
                match &tool.script {
                    Some(script) => {
                        println!("  {} = \"{} {}\"", name, tool.program, script.display())
                    }
                    None => println!("  {} = \"{}\"", name, tool.program),
                }
            }
            println!();

            let output = &config.toml().output;
            println!("[output]");
            println!("  workspace_dir = \"{}\"", config.workspace_dir.display());
            println!("  output_dir = \"{}\"", config.output_dir().display());
            println!("  archive = \"{}\"", config.layout.archive_path.display());
            println!("  subdir = \"{}\"", output.subdir);
            println!("  markers = {:?}", output.markers);
            println!();

            println!("[logging]");
            println!("  file = {}", config.logging.file);
            println!("  format = \"{}\"", config.logging.format);
            println!();

            if config.config_file.is_none() {
                println!("Run 'subtyper config init' to create a {} file.", CONFIG_FILE_NAME);
                println!();
            }
            Ok(true)
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = Config::load(explicit, cwd, overrides, false)?;
            let mut warnings = config.toml().validate();
            warnings.extend(config.missing_inputs());

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
            Ok(warnings.is_empty())
        }
        Some(ConfigCommands::Init) => {
            let config_path = match explicit {
                Some(path) => path.to_path_buf(),
                None => cwd.join(CONFIG_FILE_NAME),
            };

            if config_path.exists() {
                println!("{} already exists", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(true);
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }

            SubtyperToml::default().save(&config_path)?;

            println!("Created {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [reference] dir and the four reference file names");
            println!("  - [tools] python, dir, and per-stage program/script");
            println!("  - [output] workspace_dir, archive_name, subdir, markers");
            println!();
            Ok(true)
        }
    }
}
