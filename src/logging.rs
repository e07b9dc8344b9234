use std::io::Write;

use chrono::Local;
use log::LevelFilter;

/// Parses a config level name; unknown names fall back to `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

/// Initialises env_logger once. `RUST_LOG`, when set, overrides `level`.
pub fn init(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_level(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    // A second init (tests, embedding) keeps the first logger.
    if builder.try_init().is_ok() {
        log::info!("Logging initialized");
    }
}
