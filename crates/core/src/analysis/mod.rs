use std::{fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{
    metrics::{crest_change, low_high_balance, normalized_db, track_metrics, TrackMetrics},
    AnalysisConfig, DriveScopeError, Result, SampleTap, WindowKind,
};

pub const MIN_FFT_SIZE: usize = 1024;
pub const MAX_FFT_SIZE: usize = 4096;
pub const DEFAULT_FFT_SIZE: usize = 2048;

pub const MIN_SCOPE_SIZE: usize = 256;
pub const MAX_SCOPE_SIZE: usize = 2048;
pub const DEFAULT_SCOPE_SIZE: usize = 512;

/// Everything a renderer needs for one repaint.
///
/// The frame is owned by the caller and refilled in place by
/// [`AnalysisEngine::update_frame`]. When `has_data` is false the remaining
/// fields hold whatever the previous update left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizerFrame {
    pub pre_waveform: Vec<f32>,
    pub post_waveform: Vec<f32>,
    pub delta_waveform: Vec<f32>,
    /// Normalised magnitude per bin, `fft_size / 2` entries each.
    pub pre_spectrum: Vec<f32>,
    pub post_spectrum: Vec<f32>,
    pub delta_spectrum: Vec<f32>,
    pub pre: TrackMetrics,
    pub post: TrackMetrics,
    pub delta: TrackMetrics,
    pub crest_change: f32,
    /// Share of the post spectrum held by its lowest quarter of bins.
    pub low_high_balance: f32,
    pub has_data: bool,
}

impl VisualizerFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for VisualizerFrame {
    fn default() -> Self {
        Self {
            pre_waveform: Vec::new(),
            post_waveform: Vec::new(),
            delta_waveform: Vec::new(),
            pre_spectrum: Vec::new(),
            post_spectrum: Vec::new(),
            delta_spectrum: Vec::new(),
            pre: TrackMetrics::default(),
            post: TrackMetrics::default(),
            delta: TrackMetrics::default(),
            crest_change: 0.0,
            low_high_balance: 0.5,
            has_data: false,
        }
    }
}

/// Turns the latest window held by a [`SampleTap`] into a [`VisualizerFrame`].
///
/// Runs on the UI/timer thread. The engine shares the tap with the audio
/// chain and never writes to it. FFT plan, window table and track buffers are
/// rebuilt only when the window length or window kind changes.
pub struct AnalysisEngine {
    tap: Arc<SampleTap>,
    fft_size: usize,
    scope_size: usize,
    window: WindowKind,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
    pre: Vec<f32>,
    post: Vec<f32>,
    delta: Vec<f32>,
}

impl AnalysisEngine {
    /// Creates an engine with the default window and scope sizes.
    pub fn new(tap: Arc<SampleTap>) -> Self {
        Self::with_config(tap, &AnalysisConfig::default())
    }

    /// Creates an engine from the analysis configuration, clamping sizes into
    /// their supported ranges.
    pub fn with_config(tap: Arc<SampleTap>, config: &AnalysisConfig) -> Self {
        let fft_size = clamp_fft_size(config.fft_size);
        let mut engine = Self {
            tap,
            fft_size,
            scope_size: clamp_scope_size(config.scope_size).min(fft_size),
            window: config.window,
            fft_planner: RealFftPlanner::new(),
            fft: None,
            pre: Vec::new(),
            post: Vec::new(),
            delta: Vec::new(),
        };
        engine.ensure_buffers();
        engine
    }

    pub fn tap(&self) -> &Arc<SampleTap> {
        &self.tap
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn scope_size(&self) -> usize {
        self.scope_size
    }

    pub fn window(&self) -> WindowKind {
        self.window
    }

    /// Sets the analysis window length. Values are clamped to
    /// `[MIN_FFT_SIZE, MAX_FFT_SIZE]` and rounded down to a power of two.
    /// The scope size is lowered to fit the new window and stays lowered if
    /// the window grows again.
    pub fn set_fft_size(&mut self, size: usize) {
        let size = clamp_fft_size(size);
        if size != self.fft_size {
            tracing::debug!(from = self.fft_size, to = size, "changing fft size");
            self.fft_size = size;
            self.scope_size = self.scope_size.min(size);
            self.ensure_buffers();
        }
    }

    /// Sets the waveform length, clamped to `[MIN_SCOPE_SIZE, MAX_SCOPE_SIZE]`
    /// and to the current FFT size.
    pub fn set_scope_size(&mut self, size: usize) {
        self.scope_size = clamp_scope_size(size).min(self.fft_size);
    }

    pub fn set_window(&mut self, window: WindowKind) {
        if window != self.window {
            self.window = window;
            self.ensure_buffers();
        }
    }

    /// Centre frequency in Hz of spectrum bin `bin` at the tap's sample rate.
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.tap.sample_rate() / self.fft_size as f64
    }

    /// Refreshes `frame` from the latest window of captured audio.
    ///
    /// Sets `has_data` to false and leaves every other field alone when the
    /// tap is disabled.
    pub fn update_frame(&mut self, frame: &mut VisualizerFrame) {
        if !self.tap.is_enabled() {
            frame.has_data = false;
            return;
        }

        self.ensure_buffers();
        self.tap.read_latest_into(&mut self.pre, &mut self.post);

        for ((delta, pre), post) in self.delta.iter_mut().zip(&self.pre).zip(&self.post) {
            *delta = post - pre;
        }

        let scope = self.scope_size();
        copy_tail(&self.pre, scope, &mut frame.pre_waveform);
        copy_tail(&self.post, scope, &mut frame.post_waveform);
        copy_tail(&self.delta, scope, &mut frame.delta_waveform);

        frame.pre = track_metrics(&self.pre);
        frame.post = track_metrics(&self.post);
        frame.delta = track_metrics(&self.delta);
        frame.crest_change = crest_change(&frame.pre, &frame.post);

        match self.compute_spectra(frame) {
            Ok(()) => {
                frame.low_high_balance = low_high_balance(&frame.post_spectrum);
                frame.has_data = true;
            }
            Err(err) => {
                tracing::warn!(%err, "spectrum analysis failed");
                frame.has_data = false;
            }
        }
    }

    fn compute_spectra(&mut self, frame: &mut VisualizerFrame) -> Result<()> {
        let fft = self
            .fft
            .as_mut()
            .ok_or_else(|| DriveScopeError::msg("fft resources have not been prepared"))?;

        fft.spectrum_into(&self.pre, &mut frame.pre_spectrum)?;
        fft.spectrum_into(&self.post, &mut frame.post_spectrum)?;
        fft.spectrum_into(&self.delta, &mut frame.delta_spectrum)?;
        Ok(())
    }

    fn ensure_buffers(&mut self) {
        let size = self.fft_size;
        let rebuild = self
            .fft
            .as_ref()
            .map(|fft| fft.size != size)
            .unwrap_or(true);

        if rebuild {
            tracing::debug!(fft_size = size, window = ?self.window, "building fft plan");
            let plan = self.fft_planner.plan_fft_forward(size);
            let scratch = plan.make_scratch_vec();
            let spectrum = plan.make_output_vec();
            let input = plan.make_input_vec();
            let mut window_table = vec![0.0; size];
            self.window.fill(&mut window_table);
            self.fft = Some(FftResources {
                size,
                window: self.window,
                window_table,
                plan,
                scratch,
                spectrum,
                input,
            });
        } else if let Some(fft) = self.fft.as_mut() {
            if fft.window != self.window {
                tracing::debug!(window = ?self.window, "refilling window table");
                fft.window = self.window;
                self.window.fill(&mut fft.window_table);
            }
        }

        for track in [&mut self.pre, &mut self.post, &mut self.delta] {
            if track.len() != size {
                track.resize(size, 0.0);
            }
        }
    }
}

struct FftResources {
    size: usize,
    window: WindowKind,
    window_table: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    /// Windows `samples`, transforms them and writes `size / 2` normalised
    /// magnitudes into `out`.
    fn spectrum_into(&mut self, samples: &[f32], out: &mut Vec<f32>) -> Result<()> {
        self.input.fill(0.0);
        for ((slot, sample), coefficient) in self
            .input
            .iter_mut()
            .zip(samples)
            .zip(&self.window_table)
        {
            *slot = sample * coefficient;
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        let bins = self.size / 2;
        out.clear();
        out.extend(self.spectrum[..bins].iter().map(|bin| normalized_db(bin.norm())));
        Ok(())
    }
}

impl fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("tap", &self.tap)
            .field("fft_size", &self.fft_size)
            .field("scope_size", &self.scope_size())
            .field("window", &self.window)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .field("window", &self.window)
            .finish()
    }
}

fn clamp_fft_size(size: usize) -> usize {
    let size = size.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE);
    if size.is_power_of_two() {
        size
    } else {
        size.next_power_of_two() / 2
    }
}

fn clamp_scope_size(size: usize) -> usize {
    size.clamp(MIN_SCOPE_SIZE, MAX_SCOPE_SIZE)
}

/// Replaces `out` with the trailing `len` samples of `track`.
fn copy_tail(track: &[f32], len: usize, out: &mut Vec<f32>) {
    let start = track.len().saturating_sub(len);
    out.clear();
    out.extend_from_slice(&track[start..]);
}

#[cfg(test)]
mod tests {
    use std::{
        f32::consts::PI,
        sync::atomic::{AtomicBool, Ordering},
        thread,
    };

    use super::*;

    fn enabled_tap(capacity: usize, sample_rate: f64) -> Arc<SampleTap> {
        let tap = Arc::new(SampleTap::new(capacity));
        tap.prepare(sample_rate);
        tap.set_enabled(true);
        tap
    }

    fn sine(len: usize, frequency: f32, sample_rate: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate).sin())
            .collect()
    }

    fn peak_bin(spectrum: &[f32]) -> usize {
        spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
            .unwrap_or(0)
    }

    #[test]
    fn disabled_tap_never_reports_data() {
        let tap = Arc::new(SampleTap::new(8192));
        let mut engine = AnalysisEngine::new(tap.clone());
        let ones = [1.0_f32; 64];
        tap.push_samples(&[&ones[..]], &[&ones[..]]);

        let mut frame = VisualizerFrame {
            crest_change: 42.0,
            has_data: true,
            ..VisualizerFrame::default()
        };
        for _ in 0..3 {
            engine.update_frame(&mut frame);
            assert!(!frame.has_data);
        }
        assert_eq!(frame.crest_change, 42.0);
        assert!(frame.post_spectrum.is_empty());
        assert_eq!(tap.write_index(), 0);
    }

    #[test]
    fn identical_tracks_produce_silent_delta() {
        let tap = enabled_tap(8192, 48_000.0);
        let mut engine = AnalysisEngine::new(tap.clone());
        engine.set_fft_size(2048);

        let block = sine(1000, 440.0, 48_000.0);
        tap.push_samples(&[&block[..]], &[&block[..]]);

        let mut frame = VisualizerFrame::new();
        engine.update_frame(&mut frame);

        assert!(frame.has_data);
        assert!(frame.crest_change.abs() < 1e-6);
        assert!(frame.delta_waveform.iter().all(|v| v.abs() < 1e-6));
        assert_eq!(frame.delta.peak, 0.0);
        assert_eq!(frame.delta.crest, 0.0);
        assert!(frame.pre.crest >= 1.0);
        assert_eq!(frame.pre_waveform.len(), DEFAULT_SCOPE_SIZE);
        assert_eq!(frame.post_spectrum.len(), 1024);
        assert_eq!(frame.pre_waveform, frame.post_waveform);
        assert_eq!(frame.pre_waveform[DEFAULT_SCOPE_SIZE - 1], block[999]);
    }

    #[test]
    fn silent_post_track_has_neutral_balance() {
        let tap = enabled_tap(4096, 44_100.0);
        let mut engine = AnalysisEngine::new(tap);

        let mut frame = VisualizerFrame::new();
        frame.low_high_balance = 0.9;
        engine.update_frame(&mut frame);

        assert!(frame.has_data);
        assert_eq!(frame.low_high_balance, 0.5);
        assert_eq!(frame.post.crest, 0.0);
        assert!(frame.post_spectrum.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sine_peak_lands_on_expected_bin() {
        let sample_rate = 48_000.0;
        let frequency = 1_000.0;
        let tap = enabled_tap(8192, sample_rate as f64);
        let mut engine = AnalysisEngine::new(tap.clone());
        engine.set_fft_size(4096);

        let post = sine(8192, frequency, sample_rate);
        let pre = vec![0.0; 8192];
        for (pre_block, post_block) in pre.chunks(512).zip(post.chunks(512)) {
            tap.push_samples(&[pre_block], &[post_block]);
        }

        let mut frame = VisualizerFrame::new();
        engine.update_frame(&mut frame);

        assert!(frame.has_data);
        assert_eq!(frame.post_spectrum.len(), 2048);
        let expected = frequency as f64 * 4096.0 / sample_rate as f64;
        let found = peak_bin(&frame.post_spectrum);
        assert!(
            (found as f64 - expected).abs() <= 1.0,
            "expected bin near {expected}, got {found}"
        );
        assert!((engine.bin_frequency(found) - frequency as f64).abs() < 2.0 * 48_000.0 / 4096.0);
        assert!(frame.pre_spectrum.iter().all(|&v| v == 0.0));
        assert_eq!(peak_bin(&frame.delta_spectrum), found);
        assert!((0.0..=1.0).contains(&frame.low_high_balance));
        assert!(frame.crest_change > 1.0);
    }

    #[test]
    fn sizes_are_clamped() {
        let mut engine = AnalysisEngine::new(Arc::new(SampleTap::default()));
        assert_eq!(engine.fft_size(), DEFAULT_FFT_SIZE);
        assert_eq!(engine.scope_size(), DEFAULT_SCOPE_SIZE);

        engine.set_fft_size(100);
        assert_eq!(engine.fft_size(), 1024);
        engine.set_fft_size(100_000);
        assert_eq!(engine.fft_size(), 4096);
        engine.set_fft_size(3000);
        assert_eq!(engine.fft_size(), 2048);

        engine.set_scope_size(1);
        assert_eq!(engine.scope_size(), 256);
        engine.set_scope_size(100_000);
        assert_eq!(engine.scope_size(), 2048);
    }

    #[test]
    fn smaller_fft_lowers_scope_for_good() {
        let tap = enabled_tap(8192, 44_100.0);
        let mut engine = AnalysisEngine::new(tap);
        let mut frame = VisualizerFrame::new();

        engine.set_fft_size(1024);
        engine.set_scope_size(2048);
        engine.update_frame(&mut frame);
        assert_eq!(frame.post_waveform.len(), 1024);
        assert_eq!(frame.post_spectrum.len(), 512);

        engine.set_fft_size(4096);
        engine.update_frame(&mut frame);
        assert_eq!(engine.scope_size(), 1024);
        assert_eq!(frame.post_waveform.len(), 1024);
        assert_eq!(frame.delta_waveform.len(), 1024);
        assert_eq!(frame.pre_spectrum.len(), 2048);
        assert_eq!(frame.delta_spectrum.len(), 2048);

        engine.set_scope_size(2048);
        engine.update_frame(&mut frame);
        assert_eq!(frame.post_waveform.len(), 2048);
    }

    fn plan(engine: &AnalysisEngine) -> Arc<dyn RealToComplex<f32>> {
        engine.fft.as_ref().map(|fft| fft.plan.clone()).unwrap()
    }

    fn input(engine: &AnalysisEngine) -> *const f32 {
        engine.fft.as_ref().map(|fft| fft.input.as_ptr()).unwrap()
    }

    #[test]
    fn plan_and_scratch_are_reused_until_size_changes() {
        let tap = enabled_tap(8192, 44_100.0);
        let mut engine = AnalysisEngine::new(tap);
        let mut frame = VisualizerFrame::new();

        engine.update_frame(&mut frame);
        let first_plan = plan(&engine);
        let first_input = input(&engine);
        let first_pre = engine.pre.as_ptr();

        engine.update_frame(&mut frame);
        assert!(Arc::ptr_eq(&first_plan, &plan(&engine)));
        assert_eq!(input(&engine), first_input);
        assert_eq!(engine.pre.as_ptr(), first_pre);

        // 3000 clamps to the current 2048.
        engine.set_fft_size(3000);
        engine.update_frame(&mut frame);
        assert!(Arc::ptr_eq(&first_plan, &plan(&engine)));
        assert_eq!(input(&engine), first_input);
        assert_eq!(engine.pre.as_ptr(), first_pre);

        engine.set_fft_size(4096);
        let second_plan = plan(&engine);
        assert!(!Arc::ptr_eq(&first_plan, &second_plan));
        assert_eq!(second_plan.len(), 4096);
        assert_eq!(engine.pre.len(), 4096);
        assert_eq!(engine.fft.as_ref().map(|fft| fft.window_table.len()), Some(4096));

        engine.update_frame(&mut frame);
        assert!(Arc::ptr_eq(&second_plan, &plan(&engine)));
    }

    #[test]
    fn small_tap_is_zero_padded() {
        let tap = enabled_tap(256, 44_100.0);
        let mut engine = AnalysisEngine::new(tap.clone());
        let pre = [0.5_f32; 300];
        let post = [0.25_f32; 300];
        tap.push_samples(&[&pre[..]], &[&post[..]]);

        let mut frame = VisualizerFrame::new();
        engine.update_frame(&mut frame);

        assert!(frame.has_data);
        assert_eq!(frame.pre_waveform.len(), 512);
        assert!(frame.pre_waveform[..256].iter().all(|&v| v == 0.0));
        assert!(frame.pre_waveform[256..].iter().all(|&v| v == 0.5));
        assert_eq!(frame.pre.peak, 0.5);
    }

    #[test]
    fn window_change_keeps_output_shape() {
        let tap = enabled_tap(8192, 44_100.0);
        let config = AnalysisConfig {
            fft_size: 1024,
            scope_size: 300,
            window: WindowKind::Rectangular,
        };
        let mut engine = AnalysisEngine::with_config(tap.clone(), &config);
        let block = sine(2048, 1_000.0, 44_100.0);
        tap.push_samples(&[&block[..]], &[&block[..]]);

        let mut frame = VisualizerFrame::new();
        engine.update_frame(&mut frame);
        let rectangular = frame.post_spectrum.clone();

        engine.set_window(WindowKind::Blackman);
        assert_eq!(engine.window(), WindowKind::Blackman);
        engine.update_frame(&mut frame);

        assert_eq!(frame.post_waveform.len(), 300);
        assert_eq!(frame.post_spectrum.len(), 512);
        assert_ne!(rectangular, frame.post_spectrum);
    }

    #[test]
    fn concurrent_producer_and_reader() {
        let tap = enabled_tap(8192, 48_000.0);
        let running = Arc::new(AtomicBool::new(true));

        let producer = {
            let tap = tap.clone();
            let running = running.clone();
            thread::spawn(move || {
                let left = sine(256, 220.0, 48_000.0);
                let right = sine(256, 330.0, 48_000.0);
                let clipped: Vec<f32> = left.iter().map(|v| v.clamp(-0.5, 0.5)).collect();
                while running.load(Ordering::Relaxed) {
                    tap.push_samples(&[&left[..], &right[..]], &[&clipped[..], &right[..]]);
                }
            })
        };

        let mut engine = AnalysisEngine::new(tap.clone());
        let mut frame = VisualizerFrame::new();
        for tick in 0..40 {
            if tick == 20 {
                engine.set_fft_size(4096);
            }
            engine.update_frame(&mut frame);
            assert!(frame.has_data);
            assert_eq!(frame.post_spectrum.len(), engine.fft_size() / 2);
            assert_eq!(frame.pre_waveform.len(), engine.scope_size());
            assert!((0.0..=1.0).contains(&frame.low_high_balance));
            assert!(frame.post.crest >= 0.0 && frame.post.crest.is_finite());
        }

        running.store(false, Ordering::Relaxed);
        producer.join().unwrap();
    }
}
