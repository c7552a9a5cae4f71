//! Logging setup for the command-line tool.
//!
//! camcal's own crates log at the requested level. The detector stack
//! (`calib_targets`, `chess_corners`, ...) is chatty at debug, so records
//! from other crates are capped at `warn` unless `trace` is requested.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const OWN_PREFIX: &str = "camcal";
const DEPENDENCY_CAP: LevelFilter = LevelFilter::Warn;

/// Effective level for records with `target`.
fn level_for(target: &str, level: LevelFilter) -> LevelFilter {
    if target.starts_with(OWN_PREFIX) || level == LevelFilter::Trace {
        level
    } else {
        level.min(DEPENDENCY_CAP)
    }
}

struct CamcalLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for CamcalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= level_for(metadata.target(), self.level)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let crate_name = record.target().split("::").next().unwrap_or_default();
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{:7.3}s {:>5} {}] {}",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            crate_name,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<CamcalLogger> = OnceLock::new();

/// Install the stderr logger; later calls keep the first level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| CamcalLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// `EnvFilter` directives equivalent to the stderr logger's filtering.
#[cfg(feature = "tracing")]
fn default_directives(level: LevelFilter) -> String {
    let own = level.as_str().to_ascii_lowercase();
    if level == LevelFilter::Trace {
        return own;
    }
    let deps = level.min(DEPENDENCY_CAP).as_str().to_ascii_lowercase();
    format!("{deps},camcal={own},camcal_core={own},camcal_capture={own},camcal_io={own}")
}

/// Install a `tracing` subscriber. `RUST_LOG` wins over `level` when set.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, level: LevelFilter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
