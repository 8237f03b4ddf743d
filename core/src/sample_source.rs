use crate::error::{DemodError, Result};
use crate::ring::{self, ChunkConsumer, ChunkProducer, NotifyFn};
use crate::RING_MULTIPLIER;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

/// Boundary to the analog front end. The driver owns the producer handle
/// while sampling runs and delivers one `chunk_size` chunk per period from
/// its completion context by calling `ChunkProducer::push_chunk`.
pub trait SamplingDriver {
    fn start(&mut self, sample_rate: u32, chunk_size: usize, producer: ChunkProducer)
        -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Lifecycle of a configurable component. `Stopped -> Running` is re-entrant
/// via `start`; buffer resizing is only legal outside `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

/// Continuous sample acquisition: a driver-fed ring buffer that decouples
/// the hardware sampling clock from software processing.
///
/// The producer side lives inside the driver; this type keeps the consumer
/// side plus the configuration state machine around it.
pub struct SampleSource<D: SamplingDriver> {
    driver: D,
    state: State,
    sample_rate: u32,
    chunk_size: usize,
    notify: Option<Arc<NotifyFn>>,
    consumer: Option<ChunkConsumer>,
}

impl<D: SamplingDriver> SampleSource<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            state: State::Uninitialized,
            sample_rate: 0,
            chunk_size: 0,
            notify: None,
            consumer: None,
        }
    }

    /// Set sampling rate and chunk size, allocating the ring buffer at
    /// `chunk_size * RING_MULTIPLIER` capacity with both cursors reset.
    /// Fails while running; the previous configuration survives any failure.
    pub fn configure(&mut self, sample_rate: u32, chunk_size: usize) -> Result<()> {
        if self.state == State::Running {
            warn!("cannot reconfigure sample source while running");
            return Err(DemodError::Busy);
        }
        if sample_rate == 0 {
            return Err(DemodError::InvalidConfig("sample rate must be positive".into()));
        }
        if chunk_size == 0 {
            return Err(DemodError::InvalidConfig("chunk size must be positive".into()));
        }

        if self.state == State::Uninitialized {
            debug!("sample source auto-initializing on first configure");
        }

        self.sample_rate = sample_rate;
        self.chunk_size = chunk_size;
        self.rebuild_ring();
        self.state = State::Initialized;
        info!(
            "sample source configured: {} Hz, {} samples per chunk",
            sample_rate, chunk_size
        );
        Ok(())
    }

    /// Register the chunk-ready callback handed to the producer. Optional:
    /// without it, downstream has to poll `available()` directly.
    pub fn set_notify(&mut self, notify: Arc<NotifyFn>) {
        self.notify = Some(notify);
        if self.state != State::Running {
            // Producer handles are rebuilt on start; outside Running it is
            // enough to rebuild the ring so the new callback is wired in.
            if self.state != State::Uninitialized {
                self.rebuild_ring();
            }
        }
    }

    /// Arm the driver. No-op with a warning when already running.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            State::Running => {
                warn!("sample source already running");
                Ok(())
            }
            State::Uninitialized => Err(DemodError::NotConfigured),
            State::Initialized | State::Stopped => {
                // Fresh ring per start so a restart never replays stale
                // samples from before the stop.
                let producer = self.rebuild_ring();
                self.driver
                    .start(self.sample_rate, self.chunk_size, producer)?;
                self.state = State::Running;
                info!("sampling started ({} Hz)", self.sample_rate);
                Ok(())
            }
        }
    }

    /// Disarm the driver, leaving cursors consistent and restartable.
    /// No-op with a warning when not running.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != State::Running {
            warn!("sample source not running");
            return Ok(());
        }
        self.driver.stop()?;
        self.state = State::Stopped;
        info!("sampling stopped");
        Ok(())
    }

    /// Count of unread samples.
    pub fn available(&self) -> usize {
        self.consumer.as_ref().map_or(0, ChunkConsumer::available)
    }

    /// Copy up to `out.len()` unread samples into `out` in FIFO order.
    /// Returns the count actually copied; never blocks.
    pub fn fetch(&mut self, out: &mut [u16]) -> usize {
        match self.consumer.as_mut() {
            Some(consumer) => consumer.fetch(out),
            None => 0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    fn rebuild_ring(&mut self) -> ChunkProducer {
        let capacity = self.chunk_size * RING_MULTIPLIER;
        let (producer, consumer) = ring::split(capacity, self.notify.clone());
        self.consumer = Some(consumer);
        producer
    }
}

/// Stand-in for the hardware sampling path: replays a prerecorded capture.
///
/// `ReplayHandle::deliver_chunk` plays the role of the DMA completion
/// interrupt, pushing the next chunk into the ring. The CLI and the
/// integration tests drive it in lockstep with `Demodulator::process`.
pub struct ReplayDriver {
    inner: Arc<Mutex<ReplayInner>>,
}

#[derive(Clone)]
pub struct ReplayHandle {
    inner: Arc<Mutex<ReplayInner>>,
}

struct ReplayInner {
    samples: Vec<u16>,
    position: usize,
    chunk_size: usize,
    producer: Option<ChunkProducer>,
}

impl ReplayDriver {
    pub fn new(samples: Vec<u16>) -> (Self, ReplayHandle) {
        let inner = Arc::new(Mutex::new(ReplayInner {
            samples,
            position: 0,
            chunk_size: 0,
            producer: None,
        }));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            ReplayHandle { inner },
        )
    }
}

impl SamplingDriver for ReplayDriver {
    fn start(&mut self, _sample_rate: u32, chunk_size: usize, producer: ChunkProducer) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DemodError::Driver("replay state poisoned".into()))?;
        inner.chunk_size = chunk_size;
        inner.producer = Some(producer);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DemodError::Driver("replay state poisoned".into()))?;
        inner.producer = None;
        Ok(())
    }
}

impl ReplayHandle {
    /// Push the next full chunk of the capture into the ring, as the
    /// completion interrupt would. Returns false once the capture is
    /// exhausted (a trailing partial chunk is dropped, like a capture cut
    /// mid-period) or while sampling is stopped.
    pub fn deliver_chunk(&self) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return false,
        };
        let chunk_size = inner.chunk_size;
        if chunk_size == 0 || inner.producer.is_none() {
            return false;
        }
        if inner.position + chunk_size > inner.samples.len() {
            return false;
        }

        let start = inner.position;
        inner.position += chunk_size;
        let chunk: Vec<u16> = inner.samples[start..start + chunk_size].to_vec();
        if let Some(producer) = &inner.producer {
            producer.push_chunk(&chunk);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Driver that counts arming calls and exposes the producer for tests
    /// to feed by hand.
    #[derive(Default)]
    struct CountingDriver {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        producer: Arc<Mutex<Option<ChunkProducer>>>,
    }

    impl SamplingDriver for CountingDriver {
        fn start(
            &mut self,
            _sample_rate: u32,
            _chunk_size: usize,
            producer: ChunkProducer,
        ) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.producer.lock().unwrap() = Some(producer);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_configure_validates_inputs() {
        let mut source = SampleSource::new(CountingDriver::default());
        assert!(matches!(
            source.configure(0, 300),
            Err(DemodError::InvalidConfig(_))
        ));
        assert!(matches!(
            source.configure(9600, 0),
            Err(DemodError::InvalidConfig(_))
        ));
        assert!(source.configure(9600, 300).is_ok());
    }

    #[test]
    fn test_start_before_configure_fails() {
        let mut source = SampleSource::new(CountingDriver::default());
        assert!(matches!(source.start(), Err(DemodError::NotConfigured)));
    }

    #[test]
    fn test_reconfigure_while_running_fails() {
        let mut source = SampleSource::new(CountingDriver::default());
        source.configure(9600, 300).unwrap();
        source.start().unwrap();
        assert!(matches!(source.configure(4800, 150), Err(DemodError::Busy)));
        source.stop().unwrap();
        assert!(source.configure(4800, 150).is_ok());
    }

    #[test]
    fn test_double_start_is_noop() {
        let starts = Arc::new(AtomicUsize::new(0));
        let driver = CountingDriver {
            starts: Arc::clone(&starts),
            ..CountingDriver::default()
        };
        let mut source = SampleSource::new(driver);
        source.configure(9600, 300).unwrap();
        source.start().unwrap();
        source.start().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(source.is_running());
    }

    #[test]
    fn test_stop_when_not_running_is_noop() {
        let stops = Arc::new(AtomicUsize::new(0));
        let driver = CountingDriver {
            stops: Arc::clone(&stops),
            ..CountingDriver::default()
        };
        let mut source = SampleSource::new(driver);
        source.configure(9600, 300).unwrap();
        assert!(source.stop().is_ok());
        assert_eq!(stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fetch_roundtrip_through_driver() {
        let producer_slot: Arc<Mutex<Option<ChunkProducer>>> = Arc::new(Mutex::new(None));
        let driver = CountingDriver {
            producer: Arc::clone(&producer_slot),
            ..CountingDriver::default()
        };
        let mut source = SampleSource::new(driver);
        source.configure(9600, 4).unwrap();
        source.start().unwrap();

        let chunk = [10u16, 11, 12, 13];
        producer_slot
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .push_chunk(&chunk);

        assert_eq!(source.available(), 4);
        let mut out = [0u16; 4];
        assert_eq!(source.fetch(&mut out), 4);
        assert_eq!(out, chunk);
        assert_eq!(source.available(), 0);
    }

    #[test]
    fn test_notify_invoked_on_chunk_arrival() {
        let producer_slot: Arc<Mutex<Option<ChunkProducer>>> = Arc::new(Mutex::new(None));
        let driver = CountingDriver {
            producer: Arc::clone(&producer_slot),
            ..CountingDriver::default()
        };
        let mut source = SampleSource::new(driver);
        source.configure(9600, 4).unwrap();

        let reported = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&reported);
        source.set_notify(Arc::new(move |available| {
            seen.store(available, Ordering::SeqCst);
        }));
        source.start().unwrap();

        producer_slot
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .push_chunk(&[1, 2, 3, 4]);
        assert_eq!(reported.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_restart_discards_stale_samples() {
        let producer_slot: Arc<Mutex<Option<ChunkProducer>>> = Arc::new(Mutex::new(None));
        let driver = CountingDriver {
            producer: Arc::clone(&producer_slot),
            ..CountingDriver::default()
        };
        let mut source = SampleSource::new(driver);
        source.configure(9600, 4).unwrap();
        source.start().unwrap();
        producer_slot
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .push_chunk(&[1, 2, 3, 4]);
        source.stop().unwrap();
        source.start().unwrap();
        assert_eq!(source.available(), 0);
    }

    #[test]
    fn test_replay_driver_delivers_chunks() {
        let samples: Vec<u16> = (0..10).collect();
        let (driver, handle) = ReplayDriver::new(samples);
        let mut source = SampleSource::new(driver);
        source.configure(9600, 4).unwrap();
        source.start().unwrap();

        assert!(handle.deliver_chunk());
        assert!(handle.deliver_chunk());
        // Trailing partial chunk (2 samples) is dropped.
        assert!(!handle.deliver_chunk());

        let mut out = [0u16; 8];
        assert_eq!(source.fetch(&mut out), 8);
        assert_eq!(out, [0, 1, 2, 3, 4, 5, 6, 7]);
    }
}
