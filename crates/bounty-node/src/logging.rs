use crate::config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Display the boot banner
pub fn display_boot_banner(version: &str) {
    println!();
    println!("╔══════════════════════════════════════════╗");
    println!("║        BOUNTY ESCROW PAYOUT DAEMON       ║");
    println!("║{:^42}║", format!("v{}", version));
    println!("╚══════════════════════════════════════════╝");
    println!();
}

/// Resolve the effective level: each `-v` bumps past the configured one
fn effective_level(config: &LoggingConfig, cli_verbose: u8) -> &str {
    match cli_verbose {
        0 => &config.level,
        1 => "debug",
        _ => "trace",
    }
}

/// Build the filter. `RUST_LOG` wins over the configuration when set.
pub fn build_filter(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<EnvFilter> {
    let level = effective_level(config, cli_verbose);
    let mut filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!(
            "bounty_node={level},bountyd={level},bounty_core={level},bounty_ledger={level},bounty_security={level}",
            level = level
        )
    }));

    for (module, level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }
    Ok(filter)
}

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let filter = build_filter(config, cli_verbose)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    let file = match &config.file_output {
        Some(path) => Some(Mutex::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true);

            if let Some(file) = file {
                let file_layer = fmt::layer().json().with_writer(file).with_ansi(false);
                subscriber.with(json_layer).with(file_layer).try_init()?;
            } else {
                subscriber.with(json_layer).try_init()?;
            }
        }
        "compact" => {
            let compact_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_line_number(false)
                .with_file(false);

            if let Some(file) = file {
                let file_layer = fmt::layer().compact().with_writer(file).with_ansi(false);
                subscriber.with(compact_layer).with(file_layer).try_init()?;
            } else {
                subscriber.with(compact_layer).try_init()?;
            }
        }
        _ => {
            let show_location = matches!(effective_level(config, cli_verbose), "debug" | "trace");

            let pretty_layer = fmt::layer()
                .with_target(show_location)
                .with_line_number(show_location)
                .with_file(show_location);

            if let Some(file) = file {
                let file_layer = fmt::layer().with_writer(file).with_ansi(false);
                subscriber.with(pretty_layer).with(file_layer).try_init()?;
            } else {
                subscriber.with(pretty_layer).try_init()?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_overrides_level() {
        let config = LoggingConfig::default();
        assert_eq!(effective_level(&config, 0), "info");
        assert_eq!(effective_level(&config, 1), "debug");
        assert_eq!(effective_level(&config, 3), "trace");
    }

    #[test]
    fn test_module_filters_are_applied() {
        let mut config = LoggingConfig::default();
        config
            .module_filters
            .insert("bounty_ledger".to_string(), "warn".to_string());
        assert!(build_filter(&config, 0).is_ok());
    }
}
