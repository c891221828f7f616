use crate::config::{GlitchConfig, GlitchMode};
use crate::diagnostics::Diagnostics;
use crate::utils::stats::{mean, std_dev};
use serde::Serialize;

/// Flags marking anomalous samples of a timestream; `true` is a glitch
pub type GlitchMask = Vec<bool>;

/// Outcome of glitch detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlitchDetection {
    /// Same length as the input series
    pub mask: GlitchMask,

    /// Detection threshold in units of the input series
    pub threshold: f64,
}

impl GlitchDetection {
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&b| b).count()
    }
}

/// Finds glitches common to all `series`, which must have equal lengths and are averaged
/// sample-wise first.
///
/// Nearby flags are merged into one event. An input that cannot be analysed (empty, unequal
/// lengths, or too short for the statistic) gives an all-clear mask with a warning.
pub fn find_glitch(
    series: &[&[f64]],
    config: &GlitchConfig,
    diag: &mut Diagnostics,
) -> GlitchDetection {
    let len = series.first().map_or(0, |s| s.len());
    if series.iter().any(|s| s.len() != len) {
        diag.warn("Glitch detection needs series of equal length; nothing flagged");
        return GlitchDetection {
            mask: vec![false; len],
            threshold: f64::NAN,
        };
    }
    let average: Vec<f64> = (0..len)
        .map(|j| series.iter().map(|s| s[j]).sum::<f64>() / series.len() as f64)
        .collect();

    match config.mode {
        GlitchMode::SecondDerivative => second_derivative_glitches(&average, config, diag),
        GlitchMode::RollingMean { smrange } => {
            rolling_mean_glitches(&average, smrange, config, diag)
        }
    }
}

fn second_derivative_glitches(
    y: &[f64],
    config: &GlitchConfig,
    diag: &mut Diagnostics,
) -> GlitchDetection {
    let len = y.len();
    if len < 3 {
        diag.warn(format!(
            "Timestream of {len} samples is too short for glitch detection"
        ));
        return GlitchDetection {
            mask: vec![false; len],
            threshold: f64::NAN,
        };
    }
    let diff2: Vec<f64> = y.windows(3).map(|w| w[2] + w[0] - 2.0 * w[1]).collect();
    let (_, sigma) = trimmed_stats(&diff2, config.baseline_thresh, false);
    let bad: Vec<bool> = diff2
        .iter()
        .map(|d| d.abs() >= config.glitch_thresh * sigma)
        .collect();

    let bad = clusterize(&bad, config.clusterize_thresh);
    let mut mask = Vec::with_capacity(len);
    mask.push(bad[0]);
    mask.extend_from_slice(&bad);
    mask.push(bad[bad.len() - 1]);

    GlitchDetection {
        mask: extend_forward(&mask, config.offset),
        threshold: config.glitch_thresh * sigma / 6.0_f64.sqrt(),
    }
}

fn rolling_mean_glitches(
    y: &[f64],
    smrange: usize,
    config: &GlitchConfig,
    diag: &mut Diagnostics,
) -> GlitchDetection {
    let len = y.len();
    if smrange == 0 || len <= smrange {
        diag.warn(format!(
            "Timestream of {len} samples is too short for a rolling mean of {smrange}"
        ));
        return GlitchDetection {
            mask: vec![false; len],
            threshold: f64::NAN,
        };
    }
    let smooth = boxcar(y, smrange);
    let residual: Vec<f64> = y.iter().zip(smooth.iter()).map(|(a, s)| a - s).collect();
    let (center, sigma) = trimmed_stats(&residual, config.baseline_thresh, true);
    let bad: Vec<bool> = residual
        .iter()
        .map(|r| (r - center).abs() >= config.glitch_thresh * sigma)
        .collect();

    GlitchDetection {
        mask: extend_forward(&clusterize(&bad, config.clusterize_thresh), config.offset),
        threshold: config.glitch_thresh * sigma,
    }
}

/// Mean and standard deviation of the values within `nsigma` standard deviations of the
/// center, after a single trimming round. Without `centered` the trimming center is zero.
/// Both are NaN when nothing lies within range, which flags nothing downstream.
fn trimmed_stats(values: &[f64], nsigma: f64, centered: bool) -> (f64, f64) {
    let center = if centered { mean(values) } else { 0.0 };
    let sigma = std_dev(values);
    let kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| (v - center).abs() < nsigma * sigma)
        .collect();
    if kept.is_empty() {
        // a constant series has no spread to measure glitches against
        return (f64::NAN, f64::NAN);
    }
    let center = if centered { mean(&kept) } else { 0.0 };
    (center, std_dev(&kept))
}

/// Moving average of `width` samples aligned like a centered `same` convolution. The first
/// `(width - 1) / 2` samples and the last `(width - 1) / 2 + 1` are replaced by the mean of the
/// data they cover.
fn boxcar(y: &[f64], width: usize) -> Vec<f64> {
    let len = y.len();
    let shift = (width - 1) / 2;
    let mut smooth: Vec<f64> = (0..len)
        .map(|k| {
            let hi = (k + shift).min(len - 1);
            let lo = (k + shift + 1).saturating_sub(width);
            y[lo..=hi].iter().sum::<f64>() / width as f64
        })
        .collect();

    if shift > 0 {
        let head = mean(&y[..shift]);
        smooth[..shift].iter_mut().for_each(|s| *s = head);
    }
    let tail = mean(&y[len - shift - 1..]);
    smooth[len - shift - 1..].iter_mut().for_each(|s| *s = tail);
    smooth
}

/// Merges flags separated by at most `threshold` clear samples: every gap between two flags
/// `threshold + 1` or fewer samples apart is filled.
pub fn clusterize(flags: &[bool], threshold: usize) -> Vec<bool> {
    let mut merged = flags.to_vec();
    let mut prev: Option<usize> = None;
    for (i, &flag) in flags.iter().enumerate() {
        if flag {
            if let Some(p) = prev {
                if i - p <= threshold + 1 {
                    merged[p..i].iter_mut().for_each(|m| *m = true);
                }
            }
            prev = Some(i);
        }
    }
    merged
}

/// Extends every flag forward by `offset` samples
fn extend_forward(mask: &[bool], offset: usize) -> Vec<bool> {
    let mut extended = mask.to_vec();
    if offset == 0 {
        return extended;
    }
    for (i, _) in mask.iter().enumerate().filter(|(_, &b)| b) {
        let end = (i + offset + 1).min(mask.len());
        extended[i..end].iter_mut().for_each(|m| *m = true);
    }
    extended
}
