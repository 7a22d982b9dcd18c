//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::Result;
use std::path::PathBuf;

/// Mask a secret, keeping the last four characters.
fn mask(value: &mut Option<String>) {
    if let Some(secret) = value.as_mut() {
        let tail: String = secret
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        *secret = format!("****{}", tail);
    }
}

/// Settings with secrets masked, for display.
fn redacted(mut settings: Settings) -> Settings {
    mask(&mut settings.media.pexels_api_key);
    mask(&mut settings.email.app_password);
    mask(&mut settings.tiktok.client_secret);
    settings
}

/// Run the config command.
pub fn run_config(action: &ConfigAction, config_path: Option<PathBuf>, settings: Settings) -> Result<()> {
    let config_path = config_path.unwrap_or_else(Settings::default_config_path);

    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&redacted(settings))
                .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", toml_str);
        }

        ConfigAction::Edit => {
            if !config_path.exists() {
                settings.save_to(&config_path)?;
                Output::info(&format!("Created default config at {:?}", config_path));
            }

            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vim".to_string());

            Output::info(&format!("Opening config in {}...", editor));

            let status = std::process::Command::new(&editor)
                .arg(&config_path)
                .status();

            match status {
                Ok(s) if s.success() => {
                    Output::success("Config saved.");
                }
                Ok(_) => {
                    Output::warning("Editor exited with non-zero status.");
                }
                Err(e) => {
                    Output::error(&format!("Failed to open editor: {}", e));
                    Output::info(&format!("Config file is at: {:?}", config_path));
                }
            }
        }

        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_are_masked() {
        let mut settings = Settings::default();
        settings.email.app_password = Some("abcd efgh ijkl".to_string());
        settings.tiktok.client_secret = Some("xyz".to_string());

        let shown = redacted(settings);
        assert_eq!(shown.email.app_password.as_deref(), Some("****ijkl"));
        assert_eq!(shown.tiktok.client_secret.as_deref(), Some("****xyz"));
        assert!(shown.media.pexels_api_key.is_none());
    }
}
