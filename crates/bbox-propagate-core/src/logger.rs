//! Stderr logger for the propagation tools.
//!
//! Lines look like `[  0.412s  WARN bbox_propagate] peer 3 skipped: ...`.
//! Install it once with [`init_with_level`], [`init_with_spec`] or
//! [`init_from_env`]; with the `tracing` feature, [`init_tracing`] installs a
//! `tracing-subscriber` instead.
//!
//! A [`LogSpec`] is written like `info,bbox_propagate_core=debug`: an
//! optional bare default level followed by `target=level` overrides. The
//! longest matching target prefix wins.

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable read by [`init_from_env`] and [`init_tracing`].
pub const LOG_ENV_VAR: &str = "BBOX_PROPAGATE_LOG";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid log directive '{0}'")]
pub struct LogSpecError(String);

/// Per-target level filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSpec {
    default: LevelFilter,
    targets: Vec<(String, LevelFilter)>,
}

impl LogSpec {
    pub fn new(default: LevelFilter) -> Self {
        Self {
            default,
            targets: Vec::new(),
        }
    }

    /// Override the level for `target` and everything below it (`a::b` covers `a::b::c`).
    pub fn with_target(mut self, target: impl Into<String>, level: LevelFilter) -> Self {
        let target = target.into();
        self.targets.retain(|(t, _)| *t != target);
        self.targets.push((target, level));
        self.targets.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn level_for(&self, target: &str) -> LevelFilter {
        self.targets
            .iter()
            .find(|(prefix, _)| {
                target
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
            })
            .map_or(self.default, |(_, level)| *level)
    }

    /// Most verbose level any target can reach.
    pub fn max_level(&self) -> LevelFilter {
        self.targets
            .iter()
            .map(|(_, level)| *level)
            .fold(self.default, Ord::max)
    }
}

impl FromStr for LogSpec {
    type Err = LogSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec = LogSpec::new(LevelFilter::Info);
        for directive in s.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let bad = || LogSpecError(directive.to_string());
            match directive.split_once('=') {
                Some((target, level)) => {
                    let level = LevelFilter::from_str(level.trim()).map_err(|_| bad())?;
                    let target = target.trim().replace('-', "_");
                    if target.is_empty() {
                        return Err(bad());
                    }
                    spec = spec.with_target(target, level);
                }
                None => spec.default = LevelFilter::from_str(directive).map_err(|_| bad())?,
            }
        }
        Ok(spec)
    }
}

struct StderrLogger {
    spec: LogSpec,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.spec.level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let crate_name = record.target().split("::").next().unwrap_or_default();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            crate_name,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger with per-target levels.
///
/// Only the first call installs anything; later calls are no-ops.
pub fn init_with_spec(spec: LogSpec) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let max = spec.max_level();
        let logger = LOGGER.get_or_init(|| StderrLogger {
            spec,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(max);
    }
    Ok(())
}

/// Install the stderr logger with one level for every target.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    init_with_spec(LogSpec::new(level))
}

/// Install the stderr logger from `BBOX_PROPAGATE_LOG`, falling back to
/// `default` when it is unset or does not parse.
pub fn init_from_env(default: LevelFilter) -> Result<(), log::SetLoggerError> {
    let spec = std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| LogSpec::new(default));
    init_with_spec(spec)
}

#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().flatten_event(true).finish().try_init();
    } else {
        let _ = builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_sets_the_default() {
        let spec: LogSpec = "debug".parse().unwrap();
        assert_eq!(spec, LogSpec::new(LevelFilter::Debug));
        assert_eq!(spec.level_for("anything::at::all"), LevelFilter::Debug);
    }

    #[test]
    fn longest_target_prefix_wins() {
        let spec: LogSpec = "warn, bbox_propagate=info, bbox-propagate-core=trace, bbox_propagate::stream=off"
            .parse()
            .unwrap();
        assert_eq!(spec.level_for("bbox_propagate"), LevelFilter::Info);
        assert_eq!(spec.level_for("bbox_propagate::propagate"), LevelFilter::Info);
        assert_eq!(spec.level_for("bbox_propagate::stream"), LevelFilter::Off);
        assert_eq!(spec.level_for("bbox_propagate_core::ransac"), LevelFilter::Trace);
        assert_eq!(spec.level_for("rayon_core"), LevelFilter::Warn);
        assert_eq!(spec.max_level(), LevelFilter::Trace);
    }

    #[test]
    fn prefix_must_end_at_a_path_boundary() {
        let spec = LogSpec::new(LevelFilter::Error).with_target("bbox_propagate", LevelFilter::Debug);
        assert_eq!(spec.level_for("bbox_propagate_core"), LevelFilter::Error);
    }

    #[test]
    fn bad_directives_are_rejected() {
        assert!("loud".parse::<LogSpec>().is_err());
        assert!("bbox_propagate=loud".parse::<LogSpec>().is_err());
        assert!("=debug".parse::<LogSpec>().is_err());
        assert_eq!("".parse::<LogSpec>(), Ok(LogSpec::new(LevelFilter::Info)));
    }
}
