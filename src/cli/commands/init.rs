//! Init command - first-run setup.

use crate::cli::Output;
use crate::config::{builtin_topics, Settings};
use console::style;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Write the bundled topics into `dir`, leaving existing files untouched.
///
/// Returns the files that were written.
fn write_bundled_topics(dir: &Path) -> io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for (name, content) in builtin_topics() {
        let path = dir.join(format!("{}.toml", name));
        if path.exists() {
            continue;
        }
        std::fs::write(&path, content)?;
        written.push(path);
    }
    Ok(written)
}

/// Run the init command for first-time setup.
pub fn run_init(settings: &Settings) -> anyhow::Result<()> {
    Output::header("PosterBot Setup");
    println!();

    // Step 1: directories
    println!("{}", style("Step 1: Setting up directories").bold().cyan());
    println!();

    for (label, dir) in [
        ("Output", settings.output_dir()),
        ("Logs", settings.logs_dir()),
        ("Data", settings.data_dir()),
    ] {
        if dir.exists() {
            Output::info(&format!("{} directory exists: {}", label, dir.display()));
        } else {
            std::fs::create_dir_all(&dir)?;
            Output::success(&format!("Created {} directory: {}", label.to_lowercase(), dir.display()));
        }
    }

    println!();

    // Step 2: topics
    println!("{}", style("Step 2: Topic configurations").bold().cyan());
    println!();

    let topics_dir = settings.topics_dir();
    let written = write_bundled_topics(&topics_dir)?;
    if written.is_empty() {
        Output::info(&format!("Bundled topics already present in {}", topics_dir.display()));
    }
    for path in &written {
        Output::success(&format!("Wrote {}", path.display()));
    }

    println!();

    // Step 3: settings file
    println!("{}", style("Step 3: Configuration file").bold().cyan());
    println!();

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        Output::info(&format!("Config file exists: {}", config_path.display()));
    } else if prompt_continue("Create default configuration file?")? {
        settings.save_to(&config_path)?;
        Output::success(&format!("Created config file: {}", config_path.display()));
        println!();
        println!("  Edit your config with: {}", style("posterbot config edit").green());
    } else {
        Output::info("Skipped config file creation. Using defaults.");
    }

    println!();
    println!("{}", style("Setup Complete!").bold().green());
    println!();
    println!("Next steps:");
    println!("  {} Check system status", style("posterbot doctor").cyan());
    println!("  {} See available topics", style("posterbot topics").cyan());
    println!(
        "  {} Make your first video",
        style("posterbot run --topic cars --no-distribute").cyan()
    );
    println!();

    Ok(())
}

/// Prompt user for yes/no confirmation.
fn prompt_continue(message: &str) -> io::Result<bool> {
    print!("{} {} ", style("?").cyan(), message);
    print!("{} ", style("[y/N]").dim());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let answer = input.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_topics_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let topics = dir.path().join("topics");

        let first = write_bundled_topics(&topics).unwrap();
        assert_eq!(first.len(), builtin_topics().len());

        std::fs::write(topics.join("cars.toml"), "# edited").unwrap();
        let second = write_bundled_topics(&topics).unwrap();
        assert!(second.is_empty());
        assert_eq!(std::fs::read_to_string(topics.join("cars.toml")).unwrap(), "# edited");
    }
}
