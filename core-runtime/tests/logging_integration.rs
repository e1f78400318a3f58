//! Integration tests for logging system

use core_runtime::logging::{
    init_logging, strip_path, LogEntry, LogFormat, LogLevel, LogSink, LoggingConfig,
};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl LogSink for CollectingSink {
    fn log(&self, entry: LogEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

#[test]
fn test_global_init_forwards_to_sink() {
    // Only one global subscriber per process, so everything lives in one test
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("logging_integration=debug")
        .with_log_sink(sink.clone());

    init_logging(config.clone()).unwrap();

    tracing::info!(samples = 4096u64, "decoded");
    tracing::debug!("below sink level");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "decoded");
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[0].fields.get("samples"), Some(&"4096".to_string()));
    }

    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
    assert!(config.log_sink.is_none());
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/var/music/album/01.flac"), "01.flac");
    assert_eq!(strip_path("D:\\rips\\02.flac"), "02.flac");
    assert_eq!(strip_path("/var/music/"), "");
    assert_eq!(strip_path(""), "");
}
