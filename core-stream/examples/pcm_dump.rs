//! # PCM Dump Example
//!
//! Drives a [`SampleBridge`] the way a media pipeline would and writes every
//! delivered sample to a raw PCM file.
//!
//! Run with: `cargo run --example pcm_dump --package core-stream -- input.flac out.pcm`
//!
//! Play the result with e.g. `ffplay -f s16le -ar 44100 -ac 2 out.pcm`.

use anyhow::{bail, Context};
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_stream::{BridgeConfig, EndOfStreamPolicy, SampleBridge};
use tokio::io::AsyncWriteExt;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        bail!("usage: pcm_dump <input.flac> <output.pcm>");
    };

    let events = EventBus::default();
    let mut lifecycle = EventStream::new(events.subscribe());
    tokio::spawn(async move {
        while let Ok(event) = lifecycle.recv().await {
            info!("{}: {:?}", event.description(), event);
        }
    });

    let config = BridgeConfig {
        end_of_stream: EndOfStreamPolicy::Stop,
        ..BridgeConfig::gapless()
    };
    let bridge = SampleBridge::open_file(&input, config, events)
        .await
        .with_context(|| format!("opening {}", input))?;

    let descriptor = bridge.descriptor();
    info!(
        "{} Hz, {} channels, {} bits, {:.2}s",
        descriptor.encoding.sample_rate,
        descriptor.encoding.channels,
        descriptor.encoding.bits_per_sample,
        descriptor.duration.as_secs_f64()
    );

    let (handle, task) = bridge.spawn(4);
    let mut out = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("creating {}", output))?;

    let starting = handle.start().await?;
    starting.deferral.complete();

    let mut written = 0usize;
    while let Some(sample) = handle.request_sample().await? {
        out.write_all(sample.data()).await?;
        written += sample.len();
        sample.mark_processed();
    }
    out.flush().await?;

    handle.close().await?;
    task.await?;

    info!("Wrote {} bytes to {}", written, output);
    Ok(())
}
