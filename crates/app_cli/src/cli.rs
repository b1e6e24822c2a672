use std::path::PathBuf;

use clap::{Parser, Subcommand};
use config::{DEFAULT_USER, PreferencesPatch, Theme};
use core_types::UiLanguage;

/// Siivi chat assistant.
#[derive(Parser, Debug)]
#[command(name = "siivi", version, about = "Siivi chat assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Data directory override (config, credentials, logs).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive chat REPL.
    Chat {
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
    },
    /// Send a one-shot prompt and print the reply.
    Ask {
        prompt: String,
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
    },
    /// Generate an image URL for a prompt.
    Image { prompt: String },
    /// Manage API keys per provider tier.
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },
    /// Show or change per-user preferences.
    Prefs {
        #[command(subcommand)]
        action: PrefsCommand,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// `tier` is a provider name from the config, or `image`.
#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Append a key to the tier's rotation.
    Add { tier: String, key: String },
    /// List the tier's keys, masked.
    List { tier: String },
    /// Remove the key at a position shown by `list`.
    Remove { tier: String, index: usize },
    /// Remove every key of the tier.
    Clear { tier: String },
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    Show {
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
    },
    Set {
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
        /// helpful, creative, casual or technical.
        #[arg(long)]
        personality: Option<String>,
        #[arg(long, value_parser = parse_theme)]
        theme: Option<Theme>,
        #[arg(long, value_parser = parse_language)]
        language: Option<UiLanguage>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the config file location.
    Path,
}

impl PrefsCommand {
    pub fn into_patch(self) -> (String, PreferencesPatch) {
        match self {
            PrefsCommand::Show { user } => (user, PreferencesPatch::default()),
            PrefsCommand::Set {
                user,
                model,
                temperature,
                personality,
                theme,
                language,
            } => (
                user,
                PreferencesPatch {
                    ai_model: model,
                    ai_temperature: temperature,
                    ai_personality: personality,
                    theme,
                    language,
                },
            ),
        }
    }
}

fn parse_theme(value: &str) -> Result<Theme, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "dark" => Ok(Theme::Dark),
        "light" => Ok(Theme::Light),
        other => Err(format!("unknown theme `{other}`, expected dark or light")),
    }
}

fn parse_language(value: &str) -> Result<UiLanguage, String> {
    UiLanguage::from_code(value.trim())
        .ok_or_else(|| format!("unknown language `{value}`, expected en, es, fr, de or zh"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefs_set_into_patch() {
        let cli = Cli::try_parse_from([
            "siivi",
            "prefs",
            "set",
            "--temperature",
            "0.3",
            "--language",
            "fr",
            "--theme",
            "light",
        ])
        .expect("parse");
        let Command::Prefs { action } = cli.command else {
            panic!("expected prefs command");
        };
        let (user, patch) = action.into_patch();
        assert_eq!(user, DEFAULT_USER);
        assert_eq!(patch.ai_temperature, Some(0.3));
        assert_eq!(patch.language, Some(UiLanguage::Fr));
        assert_eq!(patch.theme, Some(Theme::Light));
        assert!(patch.ai_model.is_none());
    }

    #[test]
    fn rejects_unknown_language() {
        let err = Cli::try_parse_from(["siivi", "prefs", "set", "--language", "xx"])
            .expect_err("must fail");
        assert!(err.to_string().contains("unknown language"));
    }

    #[test]
    fn parses_keys_and_global_data_dir() {
        let cli = Cli::try_parse_from([
            "siivi",
            "keys",
            "add",
            "openrouter",
            "sk-1",
            "--data-dir",
            "/tmp/s",
        ])
        .expect("parse");
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/s")));
        assert!(matches!(
            cli.command,
            Command::Keys {
                action: KeysCommand::Add { ref tier, ref key }
            } if tier == "openrouter" && key == "sk-1"
        ));
    }
}
