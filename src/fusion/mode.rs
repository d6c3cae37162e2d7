use crate::sample::Sample;

const MAX_BINS: usize = 1 << 16;

/// Most frequent value of `data`, ignoring the lowest and highest bin.
///
/// Values are binned at unit width (wider when the range exceeds 65536
/// bins) and the histogram is box-filtered over `smoothing` bins on each
/// side before taking the peak. The edge bins usually hold background
/// zeros and saturated pixels, so they are skipped whenever at least three
/// bins exist. Returns 0 for empty input.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn histogram_mode<T: Sample>(data: &[T], smoothing: usize) -> f64 {
    let (min, max) = data
        .iter()
        .map(|v| v.to_f64())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if min > max {
        return 0.0;
    }
    let min = min.floor();
    let span = max.floor() - min + 1.0;
    let bin_width = (span / MAX_BINS as f64).ceil().max(1.0);
    let bins = ((span / bin_width).ceil() as usize).max(1);

    let mut histogram = vec![0u64; bins];
    for v in data.iter().map(|v| v.to_f64()).filter(|v| v.is_finite()) {
        let bin = (((v - min) / bin_width) as usize).min(bins - 1);
        histogram[bin] += 1;
    }

    let (lo, hi) = if bins >= 3 { (1, bins - 1) } else { (0, bins) };
    let smoothed: Vec<u64> = (lo..hi)
        .map(|b| {
            let from = b.saturating_sub(smoothing).max(lo);
            let to = (b + smoothing + 1).min(hi);
            histogram[from..to].iter().sum()
        })
        .collect();

    let peak = smoothed
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &count)| if count > best.1 { (i, count) } else { best })
        .0;
    min + ((lo + peak) as f64) * bin_width
}
