//! # Bridge Configuration
//!
//! Configuration and state types for the demand-pull sample bridge.

use serde::{Deserialize, Serialize};

/// Sample bridge configuration.
///
/// Controls the size of each delivered sample, buffer pooling, what happens
/// when the stream runs dry, and how seek positions are translated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Capacity of each pooled sample buffer, in bytes.
    ///
    /// Every sample request reads up to this many PCM bytes.
    ///
    /// Default: 2048 bytes (~11.6ms of CD-quality audio).
    #[serde(default = "default_sample_buffer_size")]
    pub sample_buffer_size: usize,

    /// What to do when a read comes back empty.
    ///
    /// Default: [`EndOfStreamPolicy::Loop`].
    #[serde(default)]
    pub end_of_stream: EndOfStreamPolicy,

    /// Upper bound on free buffers kept in the pool.
    ///
    /// Buffers returned while the pool is full are freed.
    ///
    /// Default: unbounded.
    #[serde(default)]
    pub max_pooled_buffers: Option<usize>,

    /// Byte position to sample offset translation used by seeks.
    ///
    /// Default: [`SeekConversion::BitsPerSample`].
    #[serde(default)]
    pub seek_conversion: SeekConversion,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sample_buffer_size: default_sample_buffer_size(),
            end_of_stream: EndOfStreamPolicy::default(),
            max_pooled_buffers: None,
            seek_conversion: SeekConversion::default(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Small samples (512 bytes)
    /// - Small bounded pool
    pub fn low_latency() -> Self {
        Self {
            sample_buffer_size: 512,
            max_pooled_buffers: Some(8),
            ..Default::default()
        }
    }

    /// Create a configuration for uninterrupted looping playback.
    ///
    /// - Larger samples (8 KB)
    /// - Loops on end of stream
    pub fn gapless() -> Self {
        Self {
            sample_buffer_size: 8 * 1024,
            end_of_stream: EndOfStreamPolicy::Loop,
            max_pooled_buffers: Some(16),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_buffer_size == 0 {
            return Err("sample_buffer_size must be > 0".to_string());
        }

        if self.max_pooled_buffers == Some(0) {
            return Err("max_pooled_buffers must be > 0 when set".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_sample_buffer_size() -> usize {
    2048
}

// ============================================================================
// Policies
// ============================================================================

/// Response of the bridge to an exhausted stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfStreamPolicy {
    /// Rewind to the start and keep serving.
    #[default]
    Loop,
    /// Stop serving samples and report the end.
    Stop,
}

/// How a byte position is turned into a decoder sample offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekConversion {
    /// `position / bits_per_sample`.
    #[default]
    BitsPerSample,
    /// `position / (channels × bits_per_sample / 8)`.
    BlockAlign,
}

// ============================================================================
// Bridge State
// ============================================================================

/// Current state of a sample bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Opened, not started yet.
    Idle,
    /// Start requested, waiting for deferrals.
    Starting,
    /// Serving sample requests.
    Streaming,
    /// Stream exhausted under [`EndOfStreamPolicy::Stop`].
    Ended,
    /// A sample request failed.
    Failed,
    /// The consumer closed the session.
    Closed,
    /// Resources released.
    Disposed,
}

impl BridgeState {
    /// Returns `true` if sample requests can still be served.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Idle | Self::Starting | Self::Streaming)
    }

    /// Returns `true` if the session is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Disposed)
    }
}

/// Counters describing a bridge session.
#[derive(Debug, Clone, Default)]
pub struct BridgeStats {
    /// Samples handed to the consumer.
    pub samples_delivered: u64,
    /// PCM bytes handed to the consumer.
    pub bytes_delivered: u64,
    /// Times the stream was rewound after running dry.
    pub loops: u32,
    /// Failed sample requests.
    pub failures: u32,
}

impl BridgeStats {
    /// Average sample size in bytes.
    pub fn avg_sample_bytes(&self) -> f64 {
        if self.samples_delivered == 0 {
            return 0.0;
        }
        self.bytes_delivered as f64 / self.samples_delivered as f64
    }
}
