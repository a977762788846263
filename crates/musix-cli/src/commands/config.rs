use anyhow::{Context, Result};
use musix_governor::{config, Config};
use toml_edit::DocumentMut;

const INTEGER_KEYS: &[&str] = &[
    "concurrency",
    "retries",
    "retry_delay_ms",
    "cache_time_ms",
    "rate_limit",
    "time_window_ms",
    "request_timeout_secs",
];

const STRING_KEYS: &[&str] = &["user_agent", "spotify_token", "genius_token", "log_level"];

fn valid_keys() -> String {
    INTEGER_KEYS
        .iter()
        .chain(STRING_KEYS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn redact(token: Option<&str>) -> String {
    match token {
        Some(token) if token.chars().count() > 4 => {
            format!("{}…", token.chars().take(4).collect::<String>())
        }
        Some(_) => "<set>".to_string(),
        None => "<not set>".to_string(),
    }
}

/// Show the current effective configuration.
pub fn show_config(config: &Config) {
    println!("Current Configuration");
    println!("=====================\n");

    let config_path = config::config_file_path();
    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!(
        "File exists: {}\n",
        if exists { "yes" } else { "no (using defaults)" }
    );

    println!("Governor:");
    println!("  concurrency: {}", config.concurrency);
    println!("  retries: {}", config.retries);
    println!("  retry_delay_ms: {}", config.retry_delay_ms);
    println!("  cache_time_ms: {}", config.cache_time_ms);
    println!("  rate_limit: {}", config.rate_limit);
    println!("  time_window_ms: {}", config.time_window_ms);

    println!("HTTP:");
    println!("  user_agent: {}", config.user_agent);
    println!("  request_timeout_secs: {}", config.request_timeout_secs);

    println!("Tokens:");
    println!("  spotify_token: {}", redact(config.spotify_token.as_deref()));
    println!("  genius_token: {}", redact(config.genius_token.as_deref()));

    println!("Logging:");
    println!("  log_level: {}", config.log_level);

    println!("\nPriority: CLI args > ENV vars (MUSIX_*) > Config file > Defaults");
}

/// Get a specific config value, or print the whole config file.
pub fn get_config(config: &Config, key: Option<&str>) -> Result<()> {
    let Some(key) = key else {
        let config_path = config::config_file_path();
        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            print!("{contents}");
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'musix config init' to create it.");
        }
        return Ok(());
    };

    if !INTEGER_KEYS.contains(&key) && !STRING_KEYS.contains(&key) {
        anyhow::bail!("Unknown config key: {}\n\nValid keys: {}", key, valid_keys());
    }

    let values = serde_json::to_value(config).context("Failed to serialize configuration")?;
    match values.get(key) {
        Some(serde_json::Value::String(s)) => println!("{s}"),
        Some(value) => println!("{value}"),
        None => println!("<not set>"),
    }

    Ok(())
}

/// Set `key` to `value` in config file contents, preserving comments and
/// layout.
pub fn set_value(contents: &str, key: &str, value: &str) -> Result<String> {
    let mut doc: DocumentMut = contents.parse().context("Failed to parse config file")?;

    if INTEGER_KEYS.contains(&key) {
        let number = value
            .parse::<u64>()
            .ok()
            .and_then(|n| i64::try_from(n).ok())
            .with_context(|| format!("{key} must be a non-negative integer, got `{value}`"))?;
        doc[key] = toml_edit::value(number);
    } else if STRING_KEYS.contains(&key) {
        doc[key] = toml_edit::value(value);
    } else {
        anyhow::bail!("Unknown config key: {}\n\nValid keys: {}", key, valid_keys());
    }

    Ok(doc.to_string())
}

/// Set a config value.
pub fn set_config(key: &str, value: &str) -> Result<()> {
    let config_path = config::config_file_path();

    config::ensure_config_file()?;

    let contents = std::fs::read_to_string(&config_path).context("Failed to read config file")?;
    let updated = set_value(&contents, key, value)?;

    std::fs::write(&config_path, updated).context("Failed to write config file")?;

    println!("✓ Updated {key} = {value}");
    println!("  in {}", config_path.display());

    Ok(())
}

/// Show the config file path.
pub fn show_path() {
    println!("{}", config::config_file_path().display());
}

/// Show example configuration.
pub fn show_example() {
    print!("{}", config::example_config());
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure musix.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
