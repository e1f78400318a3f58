//! # Demand-Pull Sample Bridge
//!
//! Serves a pull-based media pipeline ("give me the next sample") from a
//! [`PcmByteStream`].
//!
//! ## Architecture
//!
//! The bridge does not spawn anything by itself. Either call the `on_*`
//! handlers directly from the pipeline's callbacks, or hand the bridge to
//! [`SampleBridge::run`] and talk to it through a [`BridgeHandle`].
//!
//! ```text
//! ┌──────────────────────┐   SourceRequest    ┌──────────────────────┐
//! │ Media pipeline       ├───────────────────>│ SampleBridge::run    │
//! │ (BridgeHandle)       │<───────────────────┤  1. read PCM bytes   │
//! └──────────────────────┘  PcmSample/reply   │  2. timestamp        │
//!            │                                │  3. loop or stop     │
//!            │ drop / mark_processed          └──────────┬───────────┘
//!            ▼                                           │
//! ┌──────────────────────┐        acquire                │
//! │ BufferPool           │<──────────────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_runtime::events::EventBus;
//! use core_stream::bridge::SampleBridge;
//! use core_stream::config::BridgeConfig;
//!
//! # async fn example() -> core_stream::Result<()> {
//! let bridge = SampleBridge::open_file("track.flac", BridgeConfig::default(), EventBus::default()).await?;
//! let (handle, task) = bridge.spawn(8);
//!
//! let starting = handle.start().await?;
//! starting.deferral.complete();
//!
//! while let Some(sample) = handle.request_sample().await? {
//!     // hand sample.data() to the renderer
//!     sample.mark_processed();
//! #   break;
//! }
//!
//! handle.close().await?;
//! task.await.ok();
//! # Ok(())
//! # }
//! ```

use crate::config::{BridgeConfig, BridgeState, BridgeStats, EndOfStreamPolicy};
use crate::deferral::{Deferral, DeferralManager};
use crate::error::{Result, StreamError};
use crate::pool::{BufferPool, PooledBuffer};
use crate::stream::PcmByteStream;
use crate::traits::{PcmEncoding, StreamInfo};
use core_runtime::events::{EventBus, StreamEvent};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

#[cfg(feature = "decoder-flac")]
use crate::decoder::{DecoderFacade, SymphoniaFlacDecoder};
#[cfg(feature = "decoder-flac")]
use crate::traits::ByteSource;
#[cfg(feature = "decoder-flac")]
use core_runtime::logging::strip_path;
#[cfg(feature = "decoder-flac")]
use std::path::Path;

// ============================================================================
// Request / Response Types
// ============================================================================

/// What the media pipeline needs to know before it starts pulling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceDescriptor {
    /// PCM layout of every sample
    pub encoding: PcmEncoding,
    /// Stream duration
    pub duration: Duration,
    /// Pipeline-side buffering; always zero, samples are produced on demand
    pub buffer_time: Duration,
}

/// Answer to a start request.
#[derive(Debug)]
pub struct StartingResponse {
    /// Actual start position (the bridge's elapsed-time cursor)
    pub start_position: Duration,
    /// Complete once the pipeline has finished its own start-up. The bridge
    /// does not serve samples from [`SampleBridge::run`] before that.
    pub deferral: Deferral,
}

/// A timestamped PCM sample on loan from the bridge's pool.
///
/// Dropping it or calling [`PcmSample::mark_processed`] returns the buffer.
#[derive(Debug)]
pub struct PcmSample {
    buffer: PooledBuffer,
    timestamp: Duration,
    duration: Duration,
}

impl PcmSample {
    /// PCM bytes.
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of PCM bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if the sample holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Presentation time of the first byte.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Playback duration of the sample.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The pipeline is done with this sample.
    pub fn mark_processed(self) {
        self.buffer.mark_processed();
    }
}

/// Requests served by [`SampleBridge::run`].
#[derive(Debug)]
pub enum SourceRequest {
    /// The pipeline is starting.
    Starting {
        reply: oneshot::Sender<Result<StartingResponse>>,
    },
    /// The pipeline wants the next sample.
    SampleRequested {
        reply: oneshot::Sender<Result<Option<PcmSample>>>,
    },
    /// The pipeline is shutting the source down.
    Closed { reply: oneshot::Sender<Result<()>> },
}

// ============================================================================
// SampleBridge
// ============================================================================

/// Demand-pull driver over a [`PcmByteStream`].
///
/// Requests are served one at a time; every handler takes `&mut self`.
pub struct SampleBridge {
    stream: PcmByteStream,
    stream_info: StreamInfo,
    descriptor: SourceDescriptor,
    config: BridgeConfig,
    pool: Option<BufferPool>,
    events: EventBus,
    deferrals: DeferralManager,
    elapsed: Duration,
    state: BridgeState,
    stats: BridgeStats,
    ended_reported: bool,
    completed_reported: bool,
}

impl SampleBridge {
    /// Create a bridge over an opened stream.
    ///
    /// Reads the stream metadata right away.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Internal`] if `config` is invalid.
    /// - [`StreamError::EndOfStream`] if the stream has no metadata.
    /// - [`StreamError::InvalidFormat`] if the bit depth cannot be packed.
    /// - [`StreamError::InvalidState`] if the stream has no sample rate.
    pub fn new(mut stream: PcmByteStream, config: BridgeConfig, events: EventBus) -> Result<Self> {
        config
            .validate()
            .map_err(|e| StreamError::Internal(format!("Invalid bridge config: {}", e)))?;

        let stream_info = stream.get_stream_info()?;
        let descriptor = SourceDescriptor {
            encoding: stream_info.encoding(),
            duration: stream_info.try_duration()?,
            buffer_time: Duration::ZERO,
        };

        info!(
            "Sample bridge ready: {:?}, duration {:?}",
            descriptor.encoding, descriptor.duration
        );

        Ok(Self {
            stream,
            stream_info,
            descriptor,
            pool: Some(BufferPool::new(
                config.sample_buffer_size,
                config.max_pooled_buffers,
            )),
            config,
            events,
            deferrals: DeferralManager::new(),
            elapsed: Duration::ZERO,
            state: BridgeState::Idle,
            stats: BridgeStats::default(),
            ended_reported: false,
            completed_reported: false,
        })
    }

    /// Bind a FLAC byte source and create a bridge over it.
    #[cfg(feature = "decoder-flac")]
    pub fn from_source(
        source: Box<dyn ByteSource>,
        config: BridgeConfig,
        events: EventBus,
    ) -> Result<Self> {
        let facade = DecoderFacade::new(Box::new(SymphoniaFlacDecoder::new()))
            .with_seek_conversion(config.seek_conversion);
        let stream = PcmByteStream::open(facade, source)?;
        Self::new(stream, config, events)
    }

    /// Open a FLAC file and create a bridge over it.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Io`] if the file cannot be opened.
    /// - [`StreamError::InitializationFailed`] if it is not a FLAC stream.
    #[cfg(feature = "decoder-flac")]
    #[instrument(skip_all)]
    pub async fn open_file(
        path: impl AsRef<Path>,
        config: BridgeConfig,
        events: EventBus,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?.into_std().await;
        debug!("Opened {}", strip_path(&path.to_string_lossy()));
        Self::from_source(Box::new(file), config, events)
    }

    /// Stream properties for the media pipeline.
    pub fn descriptor(&self) -> SourceDescriptor {
        self.descriptor
    }

    /// Metadata of the underlying stream.
    pub fn stream_info(&self) -> StreamInfo {
        self.stream_info
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Session counters.
    pub fn stats(&self) -> BridgeStats {
        self.stats.clone()
    }

    /// Elapsed playback time, i.e. the timestamp of the next sample.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Free buffers in the pool.
    pub fn pooled_buffers(&self) -> usize {
        self.pool.as_ref().map_or(0, BufferPool::available)
    }

    /// Buffers allocated over the session.
    pub fn allocated_buffers(&self) -> usize {
        self.pool.as_ref().map_or(0, BufferPool::allocated)
    }

    // ========================================================================
    // Pipeline Events
    // ========================================================================

    /// The pipeline is starting.
    ///
    /// Reports the elapsed-time cursor as the actual start position.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidState`] once closed or disposed.
    #[instrument(skip(self))]
    pub fn on_starting(&mut self) -> Result<StartingResponse> {
        self.check_not_disposed()?;
        if self.state == BridgeState::Closed {
            return Err(StreamError::InvalidState("Sample bridge is closed.".to_string()));
        }

        self.state = BridgeState::Starting;
        let start_position = self.elapsed;
        self.emit(StreamEvent::Started {
            start_position: start_position.as_secs_f64(),
        });

        info!("Starting at {:?}", start_position);
        Ok(StartingResponse {
            start_position,
            deferral: self.deferrals.get_deferral(),
        })
    }

    /// Wait for every start deferral, then move to
    /// [`BridgeState::Streaming`].
    pub async fn finish_starting(&mut self) {
        self.deferrals.signal_and_wait().await;
        if self.state == BridgeState::Starting {
            self.state = BridgeState::Streaming;
            debug!("Streaming");
        }
    }

    /// The pipeline wants the next sample.
    ///
    /// Returns `Ok(None)` when no sample is produced: the stream ran dry (see
    /// [`EndOfStreamPolicy`]), the session has ended, failed or closed, or
    /// this request failed. Failures are reported through
    /// [`StreamEvent::Failed`] rather than returned.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidState`] after [`SampleBridge::dispose`].
    pub fn on_sample_requested(&mut self) -> Result<Option<PcmSample>> {
        self.check_not_disposed()?;

        if matches!(
            self.state,
            BridgeState::Ended | BridgeState::Failed | BridgeState::Closed
        ) {
            return Ok(None);
        }

        let Some(pool) = self.pool.as_ref() else {
            return Err(StreamError::InvalidState("Buffer pool released.".to_string()));
        };

        let mut buffer = pool.acquire();
        let read = self
            .stream
            .read_into(buffer.buffer_mut(), self.config.sample_buffer_size);

        match read {
            Ok(0) => {
                drop(buffer);
                self.on_exhausted();
                Ok(None)
            }
            Ok(n) => {
                let duration =
                    Duration::from_secs_f64(self.stream_info.duration_for_size(n as u64));
                let sample = PcmSample {
                    buffer,
                    timestamp: self.elapsed,
                    duration,
                };

                self.elapsed += duration;
                self.stats.samples_delivered += 1;
                self.stats.bytes_delivered += n as u64;

                Ok(Some(sample))
            }
            Err(e) => {
                drop(buffer);
                self.fail(e);
                Ok(None)
            }
        }
    }

    /// The pipeline closed the source.
    ///
    /// Resets the elapsed time, releases the decoder's source and reports
    /// [`StreamEvent::Completed`] (once).
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidState`] after [`SampleBridge::dispose`].
    #[instrument(skip(self))]
    pub fn on_closed(&mut self) -> Result<()> {
        self.check_not_disposed()?;

        self.elapsed = Duration::ZERO;
        self.stream.finish();
        self.state = BridgeState::Closed;

        if !self.completed_reported {
            self.completed_reported = true;
            self.emit(StreamEvent::Completed);
        }

        info!("Closed after {} samples", self.stats.samples_delivered);
        Ok(())
    }

    /// Release the stream and the buffer pool. Safe to call repeatedly.
    ///
    /// Samples still held by the pipeline are freed when dropped.
    pub fn dispose(&mut self) {
        if self.state == BridgeState::Disposed {
            return;
        }

        self.stream.dispose();
        self.pool = None;
        self.state = BridgeState::Disposed;
        debug!("Sample bridge disposed");
    }

    // ========================================================================
    // Async Driver
    // ========================================================================

    /// Serve requests until the pipeline closes the source or every handle
    /// is dropped, then dispose.
    pub async fn run(mut self, mut requests: mpsc::Receiver<SourceRequest>) {
        info!("Sample bridge running");

        while let Some(request) = requests.recv().await {
            match request {
                SourceRequest::Starting { reply } => match self.on_starting() {
                    Ok(response) => {
                        if reply.send(Ok(response)).is_err() {
                            warn!("Start requester went away");
                        }
                        self.finish_starting().await;
                    }
                    Err(e) => {
                        reply.send(Err(e)).ok();
                    }
                },
                SourceRequest::SampleRequested { reply } => {
                    if reply.is_closed() {
                        debug!("Sample request cancelled before it was served");
                        continue;
                    }
                    let sample = self.on_sample_requested();
                    if let Err(Ok(Some(sample))) = reply.send(sample) {
                        warn!("Sample requester went away, {} bytes dropped", sample.len());
                    }
                }
                SourceRequest::Closed { reply } => {
                    let result = self.on_closed();
                    reply.send(result).ok();
                    break;
                }
            }
        }

        self.dispose();
        info!("Sample bridge stopped");
    }

    /// Run the bridge on the tokio runtime.
    pub fn spawn(self, capacity: usize) -> (BridgeHandle, JoinHandle<()>) {
        let (handle, requests) = BridgeHandle::channel(capacity);
        let task = tokio::spawn(self.run(requests));
        (handle, task)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn on_exhausted(&mut self) {
        match self.config.end_of_stream {
            EndOfStreamPolicy::Loop => {
                debug!("End of stream, rewinding");
                self.elapsed = Duration::ZERO;
                self.stats.loops += 1;

                match self.stream.seek(0) {
                    Ok(()) => self.emit(StreamEvent::Looped),
                    Err(e) => self.fail(e),
                }
            }
            EndOfStreamPolicy::Stop => {
                self.state = BridgeState::Ended;
                if !self.ended_reported {
                    self.ended_reported = true;
                    info!("End of stream");
                    self.emit(StreamEvent::Ended);
                }
            }
        }
    }

    fn fail(&mut self, err: StreamError) {
        error!("Sample request failed: {}", err);
        self.stats.failures += 1;
        self.state = BridgeState::Failed;
        self.emit(StreamEvent::Failed {
            message: err.to_string(),
        });
    }

    fn emit(&self, event: StreamEvent) {
        // No subscribers is fine
        self.events.emit(event).ok();
    }

    fn check_not_disposed(&self) -> Result<()> {
        if self.state == BridgeState::Disposed {
            return Err(StreamError::InvalidState(
                "Sample bridge is disposed.".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for SampleBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ============================================================================
// BridgeHandle
// ============================================================================

/// Pipeline-side client of a running [`SampleBridge`].
#[derive(Clone, Debug)]
pub struct BridgeHandle {
    sender: mpsc::Sender<SourceRequest>,
}

impl BridgeHandle {
    /// Create a handle and the request receiver to pass to
    /// [`SampleBridge::run`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SourceRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Ask the bridge to start.
    pub async fn start(&self) -> Result<StartingResponse> {
        self.call(|reply| SourceRequest::Starting { reply }).await
    }

    /// Ask for the next sample.
    ///
    /// Dropping the returned future before it is served withdraws the
    /// request; no PCM is consumed for it.
    pub async fn request_sample(&self) -> Result<Option<PcmSample>> {
        self.call(|reply| SourceRequest::SampleRequested { reply })
            .await
    }

    /// Close the source. The bridge stops and disposes afterwards.
    pub async fn close(&self) -> Result<()> {
        self.call(|reply| SourceRequest::Closed { reply }).await
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<T>>) -> SourceRequest,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(request(reply))
            .await
            .map_err(|_| not_running())?;
        response.await.map_err(|_| not_running())?
    }
}

fn not_running() -> StreamError {
    StreamError::InvalidState("Sample bridge is not running.".to_string())
}
