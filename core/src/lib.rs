//! Receive signal path for a two-tone (binary FSK) radio modem.
//!
//! Turns a continuous ADC sample stream into a discrete bit stream:
//! a driver-fed SPSC ring buffer decouples the sampling clock from
//! processing, a Goertzel filter measures energy at the two candidate tone
//! frequencies, and a per-symbol window-offset search plus threshold-gated
//! comparison turns sample windows into bits.

pub mod demodulator;
pub mod error;
pub mod goertzel;
pub mod ring;
pub mod sample_source;

pub use demodulator::{DemodConfig, Demodulator};
pub use error::{DemodError, Result};
pub use goertzel::tone_power;
pub use sample_source::{ReplayDriver, ReplayHandle, SampleSource, SamplingDriver};

// Buffer geometry
/// Ring capacity in chunks: enough slack that the consumer can lag several
/// symbol periods before the overwrite-oldest policy kicks in.
pub const RING_MULTIPLIER: usize = 8;
/// Working-buffer size in chunks: the current chunk plus one of history for
/// the window-offset search to slide over.
pub const BUFFER_MULTIPLIER: usize = 2;
/// The offset search covers the first `chunk_size / OFFSET_SEARCH_DIVISOR`
/// sample positions; a quarter symbol balances synchronization quality
/// against the per-symbol Goertzel budget.
pub const OFFSET_SEARCH_DIVISOR: usize = 4;

/// Midscale of a 12-bit ADC capture; WAV replays are re-biased to this.
pub const ADC_MIDSCALE: u16 = 2048;
