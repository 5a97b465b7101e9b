//! Scalar statistics derived from sample and spectrum buffers.

/// Lower bound of the decibel scale used for spectra.
pub const DB_FLOOR: f32 = -80.0;

/// Upper bound of the normalised decibel range; maps to 1.0.
pub const DB_CEILING: f32 = 0.0;

/// Peak, RMS and crest factor of one track.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackMetrics {
    pub peak: f32,
    pub rms: f32,
    /// `peak / rms`, or 0.0 for a silent track.
    pub crest: f32,
}

/// Computes peak, RMS and crest factor. Sums of squares are accumulated in
/// `f64`.
pub fn track_metrics(samples: &[f32]) -> TrackMetrics {
    if samples.is_empty() {
        return TrackMetrics::default();
    }

    let mut peak = 0.0_f32;
    let mut sum_squares = 0.0_f64;
    for &sample in samples {
        peak = peak.max(sample.abs());
        sum_squares += f64::from(sample) * f64::from(sample);
    }

    let rms = (sum_squares / samples.len() as f64).sqrt() as f32;
    let crest = if rms > 0.0 { peak / rms } else { 0.0 };
    TrackMetrics { peak, rms, crest }
}

/// Change in crest factor introduced by processing. A non-positive pre crest
/// counts as zero.
pub fn crest_change(pre: &TrackMetrics, post: &TrackMetrics) -> f32 {
    post.crest - pre.crest.max(0.0)
}

/// Converts a linear magnitude to decibels floored at [`DB_FLOOR`], then maps
/// `[DB_FLOOR, DB_CEILING]` linearly onto `[0, 1]`.
///
/// The result is never negative. Magnitudes above 0 dB map above 1.0.
pub fn normalized_db(magnitude: f32) -> f32 {
    let db = if magnitude > 0.0 {
        (20.0 * magnitude.log10()).max(DB_FLOOR)
    } else {
        DB_FLOOR
    };
    (db - DB_FLOOR) / (DB_CEILING - DB_FLOOR)
}

/// Share of spectral magnitude held by the lowest quarter of bins.
///
/// Returns 0.5 when the spectrum carries no energy.
pub fn low_high_balance(spectrum: &[f32]) -> f32 {
    let low_bins = spectrum.len() / 4;
    let (low, high) = spectrum.split_at(low_bins);
    let low: f32 = low.iter().sum();
    let high: f32 = high.iter().sum();

    let total = low + high;
    if total > 0.0 {
        (low / total).clamp(0.0, 1.0)
    } else {
        0.5
    }
}
