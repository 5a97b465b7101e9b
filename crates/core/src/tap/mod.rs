//! Lock-free capture of pre/post processing samples.
//!
//! The audio thread writes through [`SampleTap::push_samples`] once per block;
//! any other thread may read the latest window with
//! [`SampleTap::read_latest_into`]. Samples live in atomic cells with relaxed
//! ordering, so a reader racing the writer can see a window whose newest
//! samples come from different blocks. That tear is harmless for display.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::AudioConfig;

/// Ring length used by [`SampleTap::default`].
pub const DEFAULT_CAPACITY: usize = 8192;

const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

/// `f32` stored as raw bits in an [`AtomicU32`].
struct SampleCell(AtomicU32);

impl SampleCell {
    fn zeroed() -> Self {
        Self(AtomicU32::new(0.0_f32.to_bits()))
    }

    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Fixed-capacity pair of rings holding channel-averaged pre and post samples.
///
/// Both rings share one write cursor, so the samples at a given index were
/// captured from the same audio frame. The tap starts disabled.
pub struct SampleTap {
    pre: Box<[SampleCell]>,
    post: Box<[SampleCell]>,
    write_index: AtomicUsize,
    enabled: AtomicBool,
    sample_rate: AtomicU64,
}

impl SampleTap {
    /// Creates a tap with `capacity` zeroed slots per ring.
    pub fn new(capacity: usize) -> Self {
        tracing::debug!(capacity, "creating sample tap");
        Self {
            pre: (0..capacity).map(|_| SampleCell::zeroed()).collect(),
            post: (0..capacity).map(|_| SampleCell::zeroed()).collect(),
            write_index: AtomicUsize::new(0),
            enabled: AtomicBool::new(false),
            sample_rate: AtomicU64::new(DEFAULT_SAMPLE_RATE.to_bits()),
        }
    }

    /// Creates a tap sized and prepared from the audio configuration.
    pub fn from_config(config: &AudioConfig) -> Self {
        let tap = Self::new(config.tap_capacity);
        tap.prepare(config.sample_rate);
        tap
    }

    /// Records the sample rate of the processing chain. The rings keep their
    /// size.
    pub fn prepare(&self, sample_rate: f64) {
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    pub fn capacity(&self) -> usize {
        self.pre.len()
    }

    /// Slot the next sample will be written to.
    pub fn write_index(&self) -> usize {
        self.write_index.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Captures one block of channel-planar audio.
    ///
    /// Each frame is averaged across the channels of `pre` and of `post`
    /// independently. Only as many frames as the shortest channel holds are
    /// written. Real-time safe: no allocation, no locking, no logging.
    pub fn push_samples(&self, pre: &[&[f32]], post: &[&[f32]]) {
        if !self.is_enabled() || pre.is_empty() || post.is_empty() || self.capacity() == 0 {
            return;
        }

        let frames = pre
            .iter()
            .chain(post.iter())
            .map(|channel| channel.len())
            .min()
            .unwrap_or(0);
        let pre_scale = 1.0 / pre.len() as f32;
        let post_scale = 1.0 / post.len() as f32;

        for frame in 0..frames {
            let pre_sum: f32 = pre.iter().map(|channel| channel[frame]).sum();
            let post_sum: f32 = post.iter().map(|channel| channel[frame]).sum();
            self.write(pre_sum * pre_scale, post_sum * post_scale);
        }
    }

    /// Captures one block of interleaved audio with `channels` samples per
    /// frame. Trailing partial frames are ignored.
    pub fn push_interleaved(&self, pre: &[f32], post: &[f32], channels: usize) {
        if !self.is_enabled() || channels == 0 || self.capacity() == 0 {
            return;
        }

        let scale = 1.0 / channels as f32;
        for (pre_frame, post_frame) in pre.chunks_exact(channels).zip(post.chunks_exact(channels)) {
            let pre_sum: f32 = pre_frame.iter().sum();
            let post_sum: f32 = post_frame.iter().sum();
            self.write(pre_sum * scale, post_sum * scale);
        }
    }

    #[inline]
    fn write(&self, pre: f32, post: f32) {
        let capacity = self.capacity();
        let index = self.write_index.load(Ordering::Relaxed);
        self.pre[index].store(pre);
        self.post[index].store(post);
        self.write_index.store((index + 1) % capacity, Ordering::Relaxed);
    }

    /// Returns the most recent `num_samples` pre and post samples, oldest
    /// first. Requests beyond the capacity are clamped to it.
    pub fn read_latest(&self, num_samples: usize) -> (Vec<f32>, Vec<f32>) {
        let len = num_samples.min(self.capacity());
        let mut pre = vec![0.0; len];
        let mut post = vec![0.0; len];
        self.read_latest_into(&mut pre, &mut post);
        (pre, post)
    }

    /// Fills `pre_out` and `post_out` with the most recent samples, oldest
    /// first, ending at the newest sample. The window length is the shorter of
    /// the two slices; slots beyond the ring capacity are zeroed.
    pub fn read_latest_into(&self, pre_out: &mut [f32], post_out: &mut [f32]) {
        let requested = pre_out.len().min(post_out.len());
        let capacity = self.capacity();
        let available = requested.min(capacity);
        let padding = requested - available;

        pre_out[..padding].fill(0.0);
        post_out[..padding].fill(0.0);
        if available == 0 {
            return;
        }

        let end = self.write_index.load(Ordering::Relaxed) % capacity;
        let start = (end + capacity - available) % capacity;
        let targets = pre_out[padding..requested]
            .iter_mut()
            .zip(post_out[padding..requested].iter_mut());
        for (offset, (pre, post)) in targets.enumerate() {
            let index = (start + offset) % capacity;
            *pre = self.pre[index].load();
            *post = self.post[index].load();
        }
    }
}

impl Default for SampleTap {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for SampleTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleTap")
            .field("capacity", &self.capacity())
            .field("write_index", &self.write_index())
            .field("enabled", &self.is_enabled())
            .field("sample_rate", &self.sample_rate())
            .finish()
    }
}
