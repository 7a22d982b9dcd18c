//! TikTok authorization command.

use crate::cli::Output;
use crate::config::Settings;
use crate::distribution::{authorization_url, exchange_code, TokenStore};
use anyhow::{anyhow, bail, Result};
use console::style;
use std::io::{self, Write};

/// Pull the `code` parameter out of a pasted redirect URL, or accept a bare code.
fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    match url::Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned()),
        Err(_) => Some(input.to_string()),
    }
}

/// Walk through the OAuth consent flow and store the resulting tokens.
pub async fn run_tiktok_auth(settings: &Settings) -> Result<()> {
    let tiktok = &settings.tiktok;
    let client_key = tiktok
        .client_key
        .as_deref()
        .ok_or_else(|| anyhow!("TIKTOK_CLIENT_KEY is not set"))?;
    let redirect_uri = tiktok
        .redirect_uri
        .as_deref()
        .ok_or_else(|| anyhow!("TIKTOK_REDIRECT_URI is not set"))?;

    let state = uuid::Uuid::new_v4().simple().to_string();
    let url = authorization_url(client_key, redirect_uri, &state)?;

    Output::header("TikTok Authorization");
    println!();
    println!("1. Open this URL and approve access:");
    println!("   {}", style(&url).underlined());
    println!("2. Paste the URL you were redirected to (or just the code).");
    println!();

    print!("{} ", style("?").cyan());
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let Some(code) = extract_code(&input) else {
        bail!("No authorization code provided");
    };

    let http = reqwest::Client::new();
    let tokens = exchange_code(&http, tiktok, &code).await?;

    let store = TokenStore::new(settings.tiktok_token_path());
    store.save(&tokens)?;

    Output::success(&format!("Tokens saved to {}", store.path().display()));
    Output::kv("Access token expires", &tokens.expires_at.to_rfc3339());
    if let Some(scope) = &tokens.scope {
        Output::kv("Scope", scope);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_from_redirect() {
        let code = extract_code("https://example.com/callback?code=abc%2A123&state=xyz\n");
        assert_eq!(code.as_deref(), Some("abc*123"));
    }

    #[test]
    fn test_extract_bare_code() {
        assert_eq!(extract_code("  abc123 \n").as_deref(), Some("abc123"));
        assert_eq!(extract_code("   "), None);
    }

    #[test]
    fn test_redirect_without_code() {
        assert_eq!(extract_code("https://example.com/callback?error=access_denied"), None);
    }
}
