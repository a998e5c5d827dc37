//! `tracing` subscriber setup.
//!
//! Logs go to stderr. `RUST_LOG` wins when set; otherwise the crate is logged
//! at the requested level and everything else at `warn`.

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Picks the level from explicit flags, falling back to `SRCBUILD_LOG_LEVEL`.
pub fn level_from_flags(log_level: Option<&str>, verbose: bool, quiet: bool) -> Level {
    if let Some(level) = log_level {
        parse_level(level)
    } else if verbose {
        Level::DEBUG
    } else if quiet {
        Level::ERROR
    } else {
        let level = env::var("SRCBUILD_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
        parse_level(&level)
    }
}

pub fn init_logging(level: Level) {
    INIT.call_once(|| {
        let filter = if env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            let mut filter = EnvFilter::new("warn");
            if let Ok(directive) = format!("srcbuild={level}").parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
            filter
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}
