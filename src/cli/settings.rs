//! Code related to the CLI commands for the settings file.
use crate::settings::{Settings, get_settings_file_path};
use anyhow::{Context, Result};
use clap::Subcommand;
use std::fs;

/// The available subcommands for managing the settings file.
#[derive(Subcommand)]
pub enum SettingsSubcommands {
    /// Print the contents of the current settings file, if any.
    Show,
    /// Print the default settings file contents.
    ShowDefault,
    /// Print the path to where the settings file is read from.
    ShowPath,
}

impl SettingsSubcommands {
    /// Execute the supplied settings subcommand
    pub fn execute(self) -> Result<()> {
        match self {
            Self::Show => handle_show_command()?,
            Self::ShowDefault => print!("{}", Settings::default_file_contents()),
            Self::ShowPath => println!("{}", get_settings_file_path().display()),
        }

        Ok(())
    }
}

/// Handle the `settings show` command.
fn handle_show_command() -> Result<()> {
    let file_path = get_settings_file_path();
    if !file_path.is_file() {
        eprintln!(
            "No settings file found at {}; default settings are in use.",
            file_path.display()
        );
        return Ok(());
    }

    let contents = fs::read_to_string(&file_path)
        .with_context(|| format!("Could not read {}", file_path.display()))?;
    print!("{contents}");

    Ok(())
}
