//! Pre-flight checks before a run.
//!
//! Validates that required tools and credentials are available before the
//! first iteration starts. The diffusion CLI is not required here because
//! image collection falls back to search when it is missing.

use crate::config::{Platform, Settings};
use crate::error::{PosterError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// A pipeline run needs the API key, ffmpeg and the selected channel.
    Run { platform: Platform },
    /// Validating a topic has no external requirements.
    Validate,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Run { platform } => {
            check_api_key()?;
            check_tool("ffmpeg")?;
            check_tool("ffprobe")?;
            check_channel(platform, settings)?;
        }
        Operation::Validate => {}
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(PosterError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(PosterError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check that the selected channel has credentials.
fn check_channel(platform: Platform, settings: &Settings) -> Result<()> {
    match platform {
        Platform::None => Ok(()),
        Platform::Email if settings.email.is_configured() => Ok(()),
        Platform::Email => Err(PosterError::Config(
            "Email distribution needs EMAIL_SENDER, EMAIL_RECEIVER and EMAIL_APP_PASSWORD".to_string(),
        )),
        Platform::TikTok => {
            if settings.tiktok.client_key.is_none() || settings.tiktok.client_secret.is_none() {
                return Err(PosterError::Config(
                    "TikTok distribution needs TIKTOK_CLIENT_KEY and TIKTOK_CLIENT_SECRET".to_string(),
                ));
            }
            if !settings.tiktok_token_path().exists() {
                return Err(PosterError::Config(
                    "No TikTok tokens found. Run 'posterbot tiktok-auth' first".to_string(),
                ));
            }
            Ok(())
        }
    }
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    // ffmpeg/ffprobe use -version (single dash), others use --version
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(PosterError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PosterError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(PosterError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_has_no_requirements() {
        assert!(check(Operation::Validate, &Settings::default()).is_ok());
    }

    #[test]
    fn test_skipped_distribution_needs_no_credentials() {
        assert!(check_channel(Platform::None, &Settings::default()).is_ok());
    }

    #[test]
    fn test_email_without_credentials_is_config_error() {
        let err = check_channel(Platform::Email, &Settings::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_tiktok_without_tokens_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.tiktok.client_key = Some("key".to_string());
        settings.tiktok.client_secret = Some("secret".to_string());
        settings.tiktok.token_path = dir.path().join("tokens.json").display().to_string();

        let err = check_channel(Platform::TikTok, &settings).unwrap_err();
        assert!(err.to_string().contains("tiktok-auth"));
    }

    #[test]
    fn test_missing_tool_reported() {
        let err = check_tool("posterbot-no-such-tool").unwrap_err();
        assert!(matches!(err, PosterError::ToolNotFound(_)));
    }
}
