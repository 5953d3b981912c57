use anyhow::Result;
use colored::Colorize;
use llm_telemetry::config::{self, Config};
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration with secrets masked
pub fn show(path: Option<&Path>) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config(path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();
    println!("{}", toml::to_string_pretty(&sanitized)?);

    Ok(())
}

/// Execute the config validate command
pub fn validate(path: Option<&Path>) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());

    let cfg = config::load_config(path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  {}: {}", "Endpoint".cyan(), cfg.ingestion_url());
    println!(
        "  {}: {}",
        "Credentials".cyan(),
        if cfg.credentials().is_ok() {
            "present".green()
        } else {
            "missing".red()
        }
    );
    println!("  {}: {}", "Batch Size".cyan(), cfg.batch_size);
    println!("  {}: {}s", "Flush Interval".cyan(), cfg.flush_interval_secs);
    println!("  {}: {:?}", "Delivery Mode".cyan(), cfg.delivery_mode);

    info!("Configuration validation successful");
    Ok(())
}

/// Mask credentials for safe display
fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    sanitized.public_key = sanitized.public_key.as_deref().map(mask_key);
    sanitized.secret_key = sanitized.secret_key.as_deref().map(mask_key);
    sanitized
}

/// Shows first 7 and last 4 characters
///
/// Example: "sk-lf-1234567890abcdef" -> "sk-lf-1...cdef"
fn mask_key(key: &str) -> String {
    if key.len() <= 11 || !key.is_ascii() {
        return "***".to_string();
    }

    format!("{}...{}", &key[..7], &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-lf-1234567890abcdef"), "sk-lf-1...cdef");
        assert_eq!(mask_key("short"), "***");
    }

    #[test]
    fn test_sanitize_secrets() {
        let cfg = Config {
            public_key: Some("pk-lf-1234567890abcdef".to_string()),
            secret_key: None,
            ..Config::default()
        };

        let sanitized = sanitize_secrets(&cfg);
        assert_eq!(sanitized.public_key.as_deref(), Some("pk-lf-1...cdef"));
        assert_eq!(sanitized.secret_key, None);
    }
}
