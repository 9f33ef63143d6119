use std::io::Write;

use chrono::Local;
use env_logger::Builder;
use log::{LevelFilter, SetLoggerError};

/// Installs the process logger at `level`; `RUST_LOG` overrides it.
///
/// Fails only when a logger is already installed, so hosts that bring
/// their own logger can ignore the error.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()?;
    log::info!("Logging initialized at {}", level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected_not_fatal() {
        let _ = init(LevelFilter::Debug);
        assert!(init(LevelFilter::Info).is_err());
    }
}
