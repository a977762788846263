use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use musix_governor::{Config, Provider};

mod commands;
mod logging;

#[derive(Debug, Parser)]
#[command(name = "musix", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Fetch a URL through the request governor
    ///
    /// The request passes the per-domain rate limiter, the response cache,
    /// the concurrency queue and the retry loop, exactly as application
    /// code would. Use --repeat to watch later calls come from the cache or
    /// be rejected by the rate limiter.
    ///
    /// Press Ctrl-C to abort an in-flight request.
    Fetch {
        /// Absolute URL to fetch
        url: String,

        /// Rate-limit bucket (default: the URL's host)
        #[arg(long)]
        domain: Option<String>,

        /// Retries after the first attempt
        #[arg(long)]
        retries: Option<u32>,

        /// Requests admitted per window
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Rate-limit window in milliseconds
        #[arg(long)]
        time_window_ms: Option<u64>,

        /// Cache lifetime in milliseconds
        #[arg(long)]
        cache_ms: Option<u64>,

        /// Number of times to issue the request
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Call a provider endpoint with its rate limits, throttles and auth
    Get {
        /// Provider: spotify, deezer or genius
        provider: Provider,

        /// Endpoint path, e.g. /search or /chart/0/tracks
        endpoint: String,

        /// Query parameter as key=value (repeatable)
        #[arg(long = "param", short = 'p', value_parser = commands::parse_param)]
        params: Vec<(String, String)>,

        /// Access token (overrides the configured token)
        #[arg(long)]
        token: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print one setting, or the whole config file
    Get {
        /// Setting name, e.g. retries
        key: Option<String>,
    },
    /// Change one setting in the config file
    Set { key: String, value: String },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    logging::init(level)?;

    match cli.command {
        Commands::Fetch {
            url,
            domain,
            retries,
            rate_limit,
            time_window_ms,
            cache_ms,
            repeat,
        } => {
            let mut controls = config.controls();
            if let Some(domain) = domain {
                controls = controls.with_domain(domain);
            }
            if let Some(retries) = retries {
                controls = controls.with_retries(retries);
            }
            if let Some(rate_limit) = rate_limit {
                controls.rate_limit = rate_limit;
            }
            if let Some(ms) = time_window_ms {
                controls.time_window = Duration::from_millis(ms);
            }
            if let Some(ms) = cache_ms {
                controls = controls.with_cache_time(Duration::from_millis(ms));
            }
            commands::run_fetch(&config, &url, &controls, repeat).await?;
        }
        Commands::Get {
            provider,
            endpoint,
            params,
            token,
        } => {
            commands::run_get(&config, provider, &endpoint, &params, token).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show_config(&config),
            ConfigAction::Get { key } => commands::config::get_config(&config, key.as_deref())?,
            ConfigAction::Set { key, value } => commands::config::set_config(&key, &value)?,
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Example => commands::config::show_example(),
            ConfigAction::Init => commands::config::init_config()?,
        },
    }

    Ok(())
}
