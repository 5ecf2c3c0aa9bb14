// file: src/utils/logging.rs
// description: Tracing subscriber initialization and colored status lines for the cli
// reference: https://docs.rs/tracing-subscriber

use colored::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose debug output drowns the application logs.
const NOISY_TARGETS: &[&str] = &["hyper_util=warn", "reqwest=warn", "rustls=warn", "h2=warn"];

pub fn init_logger(colored_output: bool, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| build_filter(level));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .with_ansi(colored_output);

    colored::control::set_override(colored_output);

    // try_init: tests and embedding binaries may have installed a subscriber already
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn build_filter(level: &str) -> EnvFilter {
    NOISY_TARGETS
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::new(level), |filter, directive| {
            filter.add_directive(directive)
        })
}

pub fn format_success(msg: &str) -> String {
    format!("{} {}", "✓".green().bold(), msg.green())
}

pub fn format_error(msg: &str) -> String {
    format!("{} {}", "✗".red().bold(), msg.red())
}

pub fn format_warning(msg: &str) -> String {
    format!("{} {}", "⚠".yellow().bold(), msg.yellow())
}

pub fn format_info(msg: &str) -> String {
    format!("{} {}", "ℹ".blue().bold(), msg)
}

pub fn format_step(step: usize, total: usize, msg: &str) -> String {
    format!("{} {}", format!("[{}/{}]", step, total).cyan().bold(), msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_helpers_keep_message() {
        colored::control::set_override(false);
        assert_eq!(format_success("indexed"), "✓ indexed");
        assert_eq!(format_error("failed"), "✗ failed");
        assert_eq!(format_step(2, 5, "embedding"), "[2/5] embedding");
    }

    #[test]
    fn test_filter_accepts_noisy_targets() {
        let filter = build_filter("debug");
        assert!(filter.to_string().contains("reqwest=warn"));
    }
}
