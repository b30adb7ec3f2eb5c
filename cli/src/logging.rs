//! Tracing / logging initialisation.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::settings::LogConfig;

/// Build the filter directive string: "info,opindex_core=debug" etc.
///
/// `--verbose` wins over everything, then `RUST_LOG`, then the settings file.
fn directives(config: &LogConfig, verbose: bool, env: Option<&str>) -> String {
    if verbose {
        return "debug".into();
    }
    if let Some(env) = env.filter(|e| !e.trim().is_empty()) {
        return env.to_string();
    }

    let mut components: Vec<_> = config.components.iter().collect();
    components.sort();
    let mut directives = config.level.clone();
    for (component, level) in components {
        directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
    }
    directives
}

/// Initialise tracing. Call once at startup; logs go to stderr.
pub fn init_tracing(config: &LogConfig, verbose: bool) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = EnvFilter::try_new(directives(config, verbose, env.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
