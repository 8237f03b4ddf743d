use crate::error::{DemodError, Result};
use crate::goertzel::tone_power;
use crate::sample_source::{SampleSource, SamplingDriver};
use crate::{BUFFER_MULTIPLIER, OFFSET_SEARCH_DIVISOR};
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Binary FSK receive parameters.
///
/// `chunk_size` (samples per symbol) is derived as `sample_rate / baud_rate`;
/// by convention the sample rate is an integer multiple of the baud rate.
/// Keeping `sample_rate >= 2 * max(freq0, freq1)` is the caller's
/// responsibility; rates below Nyquist are passed through unchecked.
#[derive(Debug, Clone)]
pub struct DemodConfig {
    /// Symbols (bits) per second.
    pub baud_rate: u32,
    /// ADC sampling rate in Hz.
    pub sample_rate: u32,
    /// Tone frequency decoded as bit 0, in Hz.
    pub freq0: f32,
    /// Tone frequency decoded as bit 1, in Hz.
    pub freq1: f32,
    /// Minimum tone power (raw sample-amplitude² units) for a symbol to
    /// count as signal rather than silence.
    pub power_threshold: f32,
}

impl DemodConfig {
    /// Samples per symbol period.
    pub fn chunk_size(&self) -> usize {
        (self.sample_rate / self.baud_rate) as usize
    }

    fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(DemodError::InvalidConfig("baud rate must be positive".into()));
        }
        if self.sample_rate == 0 {
            return Err(DemodError::InvalidConfig("sample rate must be positive".into()));
        }
        if self.freq0 <= 0.0 {
            return Err(DemodError::InvalidConfig(format!(
                "freq0 must be positive, got {}",
                self.freq0
            )));
        }
        if self.freq1 <= 0.0 {
            return Err(DemodError::InvalidConfig(format!(
                "freq1 must be positive, got {}",
                self.freq1
            )));
        }
        if self.freq0 == self.freq1 {
            return Err(DemodError::InvalidConfig(format!(
                "tone frequencies must be distinct, both are {}",
                self.freq0
            )));
        }
        if self.power_threshold <= 0.0 {
            return Err(DemodError::InvalidConfig(format!(
                "power threshold must be positive, got {}",
                self.power_threshold
            )));
        }
        if self.chunk_size() == 0 {
            return Err(DemodError::InvalidConfig(format!(
                "sample rate {} below baud rate {} leaves no samples per symbol",
                self.sample_rate, self.baud_rate
            )));
        }
        Ok(())
    }
}

/// FSK symbol synchronizer and bit slicer.
///
/// Pulls one chunk (symbol period) of samples from the [`SampleSource`] per
/// tick, re-aligns the analysis window to the incoming symbol edge with a
/// bounded offset search, and emits one bit per detected symbol to the
/// registered sink. Silence emits nothing: the absence of a callback is the
/// no-signal indication.
///
/// `process()` is a non-blocking poll meant to be called in a tight loop;
/// it returns immediately when no chunk has landed since the last tick.
pub struct Demodulator<D: SamplingDriver> {
    source: SampleSource<D>,
    config: Option<DemodConfig>,
    /// Sliding window over the `BUFFER_MULTIPLIER` most recent chunks.
    window: Vec<u16>,
    chunk_size: usize,
    /// Set from the completion context by the sample-source notify callback.
    chunk_ready: Arc<AtomicBool>,
    bit_sink: Option<Box<dyn FnMut(u8)>>,
    running: bool,
}

impl<D: SamplingDriver> Demodulator<D> {
    pub fn new(driver: D) -> Self {
        Self {
            source: SampleSource::new(driver),
            config: None,
            window: Vec::new(),
            chunk_size: 0,
            chunk_ready: Arc::new(AtomicBool::new(false)),
            bit_sink: None,
            running: false,
        }
    }

    /// Validate and install the receive parameters, wiring the chunk-ready
    /// flag into the sample source. Fails without side effects on any
    /// invalid field; fails with [`DemodError::Busy`] while running.
    pub fn configure(&mut self, config: DemodConfig) -> Result<()> {
        if self.running {
            warn!("cannot reconfigure demodulator while running");
            return Err(DemodError::Busy);
        }
        config.validate()?;

        // The notify callback runs in the completion context: flag set only.
        let flag = Arc::clone(&self.chunk_ready);
        self.source.set_notify(Arc::new(move |_available| {
            flag.store(true, Ordering::Release);
        }));

        debug!(
            "demodulator configured: {} baud at {} Hz, tones {}/{} Hz, threshold {}",
            config.baud_rate, config.sample_rate, config.freq0, config.freq1,
            config.power_threshold
        );
        self.config = Some(config);
        Ok(())
    }

    /// Register the downstream bit sink, invoked synchronously from
    /// `process()` with `0` or `1` at most once per symbol period.
    pub fn set_bit_sink(&mut self, sink: impl FnMut(u8) + 'static) {
        self.bit_sink = Some(Box::new(sink));
    }

    /// Configure the sample source for one chunk per symbol period and arm
    /// it. No-op with a warning when already running.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            warn!("demodulator already running");
            return Ok(());
        }
        let (sample_rate, chunk_size) = match &self.config {
            Some(config) => (config.sample_rate, config.chunk_size()),
            None => return Err(DemodError::NotConfigured),
        };

        self.source.configure(sample_rate, chunk_size)?;
        self.source.start()?;

        self.chunk_size = chunk_size;
        self.window = vec![0u16; BUFFER_MULTIPLIER * chunk_size];
        self.chunk_ready.store(false, Ordering::Release);
        self.running = true;
        Ok(())
    }

    /// Stop sampling. No-op with a warning when not running.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            warn!("demodulator not running");
            return Ok(());
        }
        self.source.stop()?;
        self.running = false;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// One polling tick. Returns immediately when no fresh chunk is flagged;
    /// otherwise slides the working buffer, runs the window-offset search
    /// and the threshold-gated bit decision, and pushes the decided bit to
    /// the sink.
    ///
    /// A short read aborts only this tick ([`DemodError::ShortRead`], fully
    /// recoverable next tick). Tone-power failures are logged for both tones
    /// and emit no bit; the tick itself still succeeds.
    pub fn process(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        if !self.chunk_ready.swap(false, Ordering::Acquire) {
            return Ok(());
        }

        let chunk_size = self.chunk_size;
        let (freq0, freq1, sample_rate, threshold) = match &self.config {
            Some(config) => (
                config.freq0,
                config.freq1,
                config.sample_rate as f32,
                config.power_threshold,
            ),
            None => return Err(DemodError::NotConfigured),
        };

        // Slide: drop the oldest chunk, fetch a fresh one into the tail.
        self.window.copy_within(chunk_size.., 0);
        let tail = self.window.len() - chunk_size;
        let got = self.source.fetch(&mut self.window[tail..]);
        if got < chunk_size {
            error!("short read from sample source: wanted {chunk_size}, got {got}");
            return Err(DemodError::ShortRead {
                wanted: chunk_size,
                got,
            });
        }

        let offset = best_window_offset(&self.window, chunk_size, freq0, freq1, sample_rate);
        let symbol = &self.window[offset..offset + chunk_size];

        match (
            tone_power(symbol, freq0, sample_rate),
            tone_power(symbol, freq1, sample_rate),
        ) {
            (Ok(power0), Ok(power1)) => {
                if power0 < threshold && power1 < threshold {
                    // No signal this symbol period; emitting nothing is the
                    // signal.
                    return Ok(());
                }
                let bit = if power0 > power1 { 0 } else { 1 };
                match &mut self.bit_sink {
                    Some(sink) => sink(bit),
                    None => error!("bit {bit} decided but no bit sink registered"),
                }
            }
            (result0, result1) => {
                if let Err(err) = result0 {
                    error!("tone power at {freq0} Hz failed: {err}");
                }
                if let Err(err) = result1 {
                    error!("tone power at {freq1} Hz failed: {err}");
                }
            }
        }
        Ok(())
    }
}

/// Symbol timing recovery: search window start offsets `0..chunk_size/4` and
/// pick the one maximizing the tone-power contrast `|p1 - p0|`. The largest
/// contrast occurs when the window sits on a stable stretch of the symbol,
/// clear of tone transitions. Greedy and per-symbol; no phase is tracked
/// across symbols. Offset 0 is the fallback when no offset shows a positive
/// contrast.
///
/// Cost is `2 * (chunk_size/4)` Goertzel passes per symbol, which is why the
/// search range stays a quarter of the symbol.
fn best_window_offset(
    window: &[u16],
    chunk_size: usize,
    freq0: f32,
    freq1: f32,
    sample_rate: f32,
) -> usize {
    let range = chunk_size / OFFSET_SEARCH_DIVISOR;
    let mut best_offset = 0;
    let mut best_contrast = 0.0f32;

    for offset in 0..range {
        let candidate = &window[offset..offset + chunk_size];
        let (Ok(power0), Ok(power1)) = (
            tone_power(candidate, freq0, sample_rate),
            tone_power(candidate, freq1, sample_rate),
        ) else {
            continue;
        };
        let contrast = (power1 - power0).abs();
        if contrast > best_contrast {
            best_contrast = contrast;
            best_offset = offset;
        }
    }
    best_offset
}
