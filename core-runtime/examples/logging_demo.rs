//! Logging and event bus demonstration
//!
//! Run with:
//! ```bash
//! # Pretty format (default)
//! cargo run --example logging_demo
//!
//! # JSON format with a custom filter
//! cargo run --example logging_demo -- json "core_runtime=trace,logging_demo=trace"
//! ```

use core_runtime::events::{EventBus, EventSeverity, EventStream, StreamEvent};
use core_runtime::logging::{
    init_logging, strip_path, LogEntry, LogFormat, LogLevel, LogSink, LoggingConfig,
};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Host sink printing forwarded warnings and errors.
struct HostConsole;

impl LogSink for HostConsole {
    fn log(&self, entry: LogEntry) {
        println!("[host] {:?} {}: {}", entry.level, entry.target, entry.message);
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Warn
    }
}

#[tokio::main]
async fn main() -> core_runtime::Result<()> {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Debug)
        .with_log_sink(Arc::new(HostConsole))
        .with_spans(true);

    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    init_logging(config)?;
    info!(format = ?format, "Logging initialized");

    let bus = EventBus::default();
    let mut important =
        EventStream::new(bus.subscribe()).filter(|e| e.severity() >= EventSeverity::Warning);

    play(&bus, "/music/albums/demo.flac");

    while let Some(Ok(event)) = important.try_recv() {
        warn!(event = ?event, "{}", event.description());
    }

    Ok(())
}

#[instrument(skip(bus))]
fn play(bus: &EventBus, path: &str) {
    info!(file = strip_path(path), "Opening");

    bus.emit(StreamEvent::Started { start_position: 0.0 }).ok();
    for block in 0..3 {
        debug!(block, bytes = 2048, "Sample delivered");
    }
    bus.emit(StreamEvent::Ended).ok();
    bus.emit(StreamEvent::Completed).ok();
}
