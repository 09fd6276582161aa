//! Observability hooks for the collection engine.
//!
//! The `log_metric!` macro emits structured key-value events (allocations,
//! chunk creation, combines) through the `log` facade at `trace` level. It is
//! compiled out of release builds entirely.
//!
//! `init_logging` installs an `env_logger` backend for binaries and tests that
//! want to see those events; library code only ever talks to the `log` facade.

use std::fs::OpenOptions;
use std::sync::Once;

use log::LevelFilter;

use crate::error::ColumnDataError;

/// Logs a structured key-value metric line, only in debug builds.
///
/// # Example
/// ```
/// use coldata::log_metric;
/// let rows = 2048;
/// log_metric!("event" = "append", "rows" = &rows);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            log::trace!("COLDATA_METRIC: {{ {} }}", parts.join(", "));
        }
    };
}

static INIT_LOGGER: Once = Once::new();

/// Installs a process-wide logger at `level`, optionally appending to `log_file`
/// instead of stderr. Only the first call has any effect.
pub fn init_logging(level: LevelFilter, log_file: Option<&str>) -> Result<(), ColumnDataError> {
    let target = match log_file {
        Some(path) => Some(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map_err(|e| {
                    ColumnDataError::InvalidConfig(format!("cannot open log file {}: {}", path, e))
                })?,
        ),
        None => None,
    };

    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.is_test(false);
        builder.filter_level(level);

        // Just the level and the message.
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())
        });

        if let Some(file) = target {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_to_file_is_idempotent() {
        let path = std::env::temp_dir().join(format!("coldata-log-{}.txt", std::process::id()));
        let path = path.to_string_lossy().into_owned();
        init_logging(LevelFilter::Trace, Some(&path)).unwrap();
        init_logging(LevelFilter::Off, None).unwrap();
        log_metric!("event" = "test", "value" = 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_init_logging_rejects_unopenable_file() {
        let dir = std::env::temp_dir();
        let result = init_logging(LevelFilter::Info, dir.to_str());
        assert!(matches!(result, Err(ColumnDataError::InvalidConfig(_))));
    }
}
