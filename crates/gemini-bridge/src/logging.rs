//! Date-stamped log files for the hook.
//!
//! Stdout carries the decision document and stderr is shown to the user by
//! the calling assistant, so neither is usable for logs. [`FileLogLayer`]
//! appends each event to `<log_dir>/<YYYY-MM-DD>.log` instead:
//!
//! ```text
//! 14:02:11 INFO  task: delegate (multi-file task (5 files, 30720 bytes) ...)
//! 14:02:14 WARN  Failed to cache analysis: Permission denied {os_error=13}
//! ```
//!
//! The file is opened in append mode per event so concurrent hook processes
//! interleave whole lines. Write failures are dropped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use tracing::Subscriber;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::BridgeConfig;

/// Map the configured debug level to a filter.
pub fn level_filter(debug_level: u8) -> LevelFilter {
    match debug_level {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the file logger as the global subscriber. Calling it twice is
/// harmless; the second call is ignored.
pub fn init(config: &BridgeConfig) {
    let _ = tracing_subscriber::registry()
        .with(level_filter(config.debug_level))
        .with(FileLogLayer::new(config.log_dir()))
        .try_init();
}

/// A [`tracing_subscriber::Layer`] that appends formatted events to a daily
/// log file.
pub struct FileLogLayer {
    dir: PathBuf,
}

impl FileLogLayer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn append(&self, line: &str) {
        if fs::create_dir_all(&self.dir).is_err() {
            return;
        }
        let path = self
            .dir
            .join(format!("{}.log", Local::now().format("%Y-%m-%d")));
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for FileLogLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format_line(
            &Local::now().format("%H:%M:%S").to_string(),
            *event.metadata().level(),
            &visitor,
        );
        self.append(&line);
    }
}

/// `HH:MM:SS LEVEL message {k=v, ...}` plus a trailing newline.
fn format_line(time: &str, level: tracing::Level, visitor: &MessageVisitor) -> String {
    let mut message = visitor.message.clone();
    if !visitor.fields.is_empty() {
        let extras: Vec<String> = visitor
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if message.is_empty() {
            message = extras.join(" ");
        } else {
            message = format!("{message} {{{}}}", extras.join(", "));
        }
    }
    // Keep one event per line.
    let message = message.replace('\n', "\\n");
    format!("{time} {:<5} {message}\n", level.as_str())
}

/// Collects the message and extra fields of an event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.push((field.name().to_string(), rendered));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info, warn};

    #[test]
    fn levels_map_from_debug_setting() {
        assert_eq!(level_filter(0), LevelFilter::ERROR);
        assert_eq!(level_filter(1), LevelFilter::INFO);
        assert_eq!(level_filter(2), LevelFilter::DEBUG);
        assert_eq!(level_filter(3), LevelFilter::TRACE);
        assert_eq!(level_filter(9), LevelFilter::TRACE);
    }

    #[test]
    fn line_format_includes_fields() {
        let visitor = MessageVisitor {
            message: "cache miss".into(),
            fields: vec![("key".into(), "ab12".into()), ("files".into(), "3".into())],
        };
        assert_eq!(
            format_line("09:15:00", tracing::Level::INFO, &visitor),
            "09:15:00 INFO  cache miss {key=ab12, files=3}\n"
        );
    }

    #[test]
    fn multiline_messages_stay_on_one_line() {
        let visitor = MessageVisitor {
            message: "a\nb".into(),
            fields: Vec::new(),
        };
        assert_eq!(
            format_line("00:00:00", tracing::Level::WARN, &visitor),
            "00:00:00 WARN  a\\nb\n"
        );
    }

    #[test]
    fn events_land_in_dated_file_respecting_level() {
        let dir = tempfile::tempdir().unwrap();
        let subscriber = tracing_subscriber::registry()
            .with(LevelFilter::INFO)
            .with(FileLogLayer::new(dir.path().join("logs")));

        tracing::subscriber::with_default(subscriber, || {
            info!(files = 2, "delegating");
            debug!("hidden");
            warn!("careful");
        });

        let path = dir
            .path()
            .join("logs")
            .join(format!("{}.log", Local::now().format("%Y-%m-%d")));
        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO  delegating {files=2}"));
        assert!(lines[1].ends_with("WARN  careful"));
    }
}
