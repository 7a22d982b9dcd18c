//! Doctor command - verify system requirements and configuration.

use crate::cli::Output;
use crate::config::{available_topics, Settings, TopicConfig};
use crate::distribution::TokenStore;
use chrono::Utc;
use console::style;
use std::path::Path;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    /// Downgrade an error to a warning for optional components.
    fn optional(mut self) -> Self {
        if self.status == CheckStatus::Error {
            self.status = CheckStatus::Warning;
        }
        self
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

fn print_section(title: &str, checks: &[CheckResult]) {
    println!("{}", style(title).bold());
    for check in checks {
        check.print();
    }
    println!();
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("PosterBot Doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let sections = [
        (
            "External Tools",
            vec![
                check_tool("ffmpeg", "-version", install_hint_ffmpeg()),
                check_tool("ffprobe", "-version", install_hint_ffmpeg()),
                check_tool(
                    &settings.diffusion.command,
                    "--version",
                    "Needed only for flux-schnell/flux-dev; install stable-diffusion.cpp",
                )
                .optional(),
            ],
        ),
        (
            "API Configuration",
            vec![check_openai_api_key(), check_pexels_key(settings)],
        ),
        ("Distribution", check_distribution(settings)),
        ("Directories", check_directories(settings)),
        ("Topics", check_topics(settings)),
        ("Configuration", vec![check_config_file()]),
    ];

    for (title, checks) in &sections {
        print_section(title, checks);
    }

    let checks: Vec<&CheckResult> = sections.iter().flat_map(|(_, c)| c.iter()).collect();
    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before running PosterBot.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! PosterBot is ready to use.");
    }

    Ok(())
}

/// Check if an external tool is available.
fn check_tool(name: &str, version_arg: &str, hint: &str) -> CheckResult {
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();

            let version_display = if version.chars().count() > 50 {
                format!("{}...", version.chars().take(50).collect::<String>())
            } else {
                version
            };

            CheckResult::ok(name, &version_display)
        }
        Ok(_) => CheckResult::error(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::error(name, "not found", hint)
        }
        Err(e) => CheckResult::error(name, &format!("error: {}", e), hint),
    }
}

/// Check if OpenAI API key is configured.
fn check_openai_api_key() -> CheckResult {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            let masked = format!("{}...{}", &key[..7], &key[key.len() - 4..]);
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", masked))
        }
        Ok(key) if key.is_empty() => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Ok(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        Err(_) => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

fn check_pexels_key(settings: &Settings) -> CheckResult {
    match &settings.media.pexels_api_key {
        Some(key) if !key.is_empty() => CheckResult::ok("PEXELS_API_KEY", "configured"),
        _ => CheckResult::warning(
            "PEXELS_API_KEY",
            "not set, stock photos disabled",
            "Image collection will fall back to web search",
        ),
    }
}

fn check_distribution(settings: &Settings) -> Vec<CheckResult> {
    let email = if settings.email.is_configured() {
        let receiver = settings.email.receiver.as_deref().unwrap_or_default();
        CheckResult::ok("Email", &format!("sending to {}", receiver))
    } else {
        CheckResult::warning(
            "Email",
            "credentials incomplete",
            "Set EMAIL_SENDER, EMAIL_RECEIVER and EMAIL_APP_PASSWORD",
        )
    };

    vec![email, check_tiktok(settings)]
}

fn check_tiktok(settings: &Settings) -> CheckResult {
    if settings.tiktok.client_key.is_none() || settings.tiktok.client_secret.is_none() {
        return CheckResult::warning(
            "TikTok",
            "client credentials not set",
            "Set TIKTOK_CLIENT_KEY and TIKTOK_CLIENT_SECRET",
        );
    }

    let store = TokenStore::new(settings.tiktok_token_path());
    match store.load() {
        Ok(Some(tokens)) => {
            let now = Utc::now();
            let refresh_expired = tokens.refresh_expires_at.is_some_and(|at| at <= now);
            if refresh_expired {
                CheckResult::warning(
                    "TikTok",
                    "refresh token expired",
                    "Re-authorize with: posterbot tiktok-auth",
                )
            } else if tokens.needs_refresh(now) {
                CheckResult::ok("TikTok", "authorized (access token will refresh on next post)")
            } else {
                CheckResult::ok("TikTok", "authorized")
            }
        }
        Ok(None) => CheckResult::warning(
            "TikTok",
            "not authorized",
            "Authorize with: posterbot tiktok-auth",
        ),
        Err(e) => CheckResult::error(
            "TikTok",
            &format!("unreadable token file: {}", e),
            &format!("Delete {} and run posterbot tiktok-auth", store.path().display()),
        ),
    }
}

fn check_directory(name: &str, path: &Path) -> CheckResult {
    if path.is_dir() {
        CheckResult::ok(name, &path.display().to_string())
    } else {
        CheckResult::warning(
            name,
            &format!("{} (will be created)", path.display()),
            "Directory will be created on first use",
        )
    }
}

/// Check output and state directories.
fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    let mut results = vec![
        check_directory("Output directory", &settings.output_dir()),
        check_directory("Logs directory", &settings.logs_dir()),
        check_directory("Data directory", &settings.data_dir()),
    ];

    let models_dir = settings.models_dir();
    let weights = std::fs::read_dir(&models_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("gguf"))
                .count()
        })
        .unwrap_or(0);
    if weights > 0 {
        results.push(CheckResult::ok(
            "Model weights",
            &format!("{} file(s) in {}", weights, models_dir.display()),
        ));
    } else {
        results.push(CheckResult::warning(
            "Model weights",
            "none downloaded",
            "Weights are downloaded on the first flux run",
        ));
    }

    results
}

/// Load every available topic so broken files surface here rather than mid-run.
fn check_topics(settings: &Settings) -> Vec<CheckResult> {
    let topics_dir = settings.topics_dir();
    available_topics(&topics_dir)
        .iter()
        .map(|name| match TopicConfig::load(name, &topics_dir) {
            Ok(topic) => CheckResult::ok(
                name,
                &format!("{}, {} shot(s)", topic.image.plan.mode_name(), topic.shot_count()),
            ),
            Err(e) => CheckResult::error(name, &e.to_string(), "Fix the file or run: posterbot validate <topic>"),
        })
        .collect()
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: posterbot init (or posterbot config edit)",
        )
    }
}

/// Platform-specific install hint for ffmpeg.
fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}
