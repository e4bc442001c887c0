//! `tubepool config` subcommands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tubepool_config::{Config, PROJECT_CONFIG_FILE};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file locations that are searched
    Path,
    /// Write a default tubepool.toml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(command: ConfigCommands, config: &Config, explicit: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommands::Path => {
            match explicit {
                Some(path) => println!("Explicit: {}", path.display()),
                None => {
                    let global = Config::global_config_path()
                        .map(|p| describe(&p))
                        .unwrap_or_else(|| "(no home directory)".to_string());
                    println!("Global:  {}", global);
                    println!("Project: {}", describe(&Config::project_config_path()));
                }
            }
        }
        ConfigCommands::Init { force } => {
            let path = PathBuf::from(PROJECT_CONFIG_FILE);
            init(&path, force)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Write the default config to `path`; refuses to clobber unless `force`.
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn describe(path: &Path) -> String {
    if path.exists() {
        format!("{}", path.display())
    } else {
        format!("{} (not found)", path.display())
    }
}
