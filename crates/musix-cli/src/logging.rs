use std::io::Write;

use anyhow::{Context, Result};
use log::LevelFilter;

/// Initializes `env_logger` at `level`.
///
/// `RUST_LOG` is read first, so per-module directives such as
/// `RUST_LOG=musix_governor=debug` still apply.
pub fn init(level: &str) -> Result<()> {
    let level: LevelFilter = level
        .parse()
        .with_context(|| format!("Invalid log level: {level}"))?;

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.filter_module("reqwest", LevelFilter::Info);
    builder.filter_module("hyper", LevelFilter::Info);
    builder.filter_module("hyper_util", LevelFilter::Info);

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{:<5} {} {}",
            record.level(),
            record.target(),
            record.args()
        )
    });

    builder.try_init().context("Failed to initialize logger")?;

    Ok(())
}
