//! Logger configuration for the wrapper binary.

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Install the global logger: timestamped lines on stderr, Info by default,
/// RUST_LOG overrides. Repeated calls are ignored.
pub fn init_log() {
    let _ = Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
