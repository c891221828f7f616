use crate::config::PeakSearchConfig;
use crate::diagnostics::Diagnostics;
use crate::fitting::common::fitstruct::PeakCandidate;
use crate::fitting::peaks::lorentzian::{fit_lorentzian, LorentzianFit};
use crate::utils::constants::INFLECTION_TO_FWHM;
use crate::utils::savgol::{oddify, SavitzkyGolay};
use crate::utils::stats::{argmin_distance, std_dev};

const DEFAULT_SMOOTH: usize = 15;
const SMOOTH_ORDER: usize = 3;

/// Second-derivative values below this fraction of `max|ampl| / dfreq^2` are rounding noise
const ROUNDOFF_FLOOR: f64 = 1e-9;

/// Samples added to each side of the Lorentzian window when the first fit fails the depth cut
const REFIT_MARGIN: usize = 10;

/// Finds resonance dips in `ampl` (sampled at the uniformly spaced `freq`).
///
/// Candidates are local maxima of the smoothed second derivative above a threshold. Each one is
/// fitted with a Lorentzian and kept only if its Q and depth pass the cuts of `config`. When the
/// carrier lies inside the sweep, only the candidate nearest to it is returned.
pub fn locate_peaks(
    freq: &[f64],
    ampl: &[f64],
    carrier: f64,
    config: &PeakSearchConfig,
    diag: &mut Diagnostics,
) -> Vec<PeakCandidate> {
    let len = freq.len().min(ampl.len());
    if len < 2 {
        return vec![];
    }
    let (freq, ampl) = (&freq[..len], &ampl[..len]);
    let dfreq = freq[1] - freq[0];
    let window = oddify(config.smooth.unwrap_or(DEFAULT_SMOOTH));

    let deriv2 = SavitzkyGolay::new(window, SMOOTH_ORDER, 2, dfreq).apply(ampl);
    let ampl_s = SavitzkyGolay::new(window, SMOOTH_ORDER, 0, dfreq).apply(ampl);
    let (deriv2, ampl_s) = match (deriv2, ampl_s) {
        (Some(d), Some(a)) => (d, a),
        _ => {
            diag.debug(format!(
                "Sweep of {len} points is too short for a smoothing window of {window}"
            ));
            return vec![];
        }
    };

    let threshold = config.threshold.unwrap_or_else(|| {
        let scale = ampl.iter().fold(0.0_f64, |m, a| m.max(a.abs())) / (dfreq * dfreq);
        detection_threshold(&deriv2).max(ROUNDOFF_FLOOR * scale)
    });
    let centers: Vec<usize> = (1..len - 1)
        .filter(|&i| {
            deriv2[i] > threshold && deriv2[i - 1] <= deriv2[i] && deriv2[i] >= deriv2[i + 1]
        })
        .collect();
    if centers.is_empty() {
        return vec![];
    }

    let mut fits: Vec<LorentzianFit> = vec![];
    let mut bad_q = 0;
    let mut bad_depth = 0;
    for i in centers {
        let (l, r, fwhm) = inflection_window(&deriv2, i, dfreq);
        let q0 = freq[i] / fwhm;
        let mut fit = fit_lorentzian(&freq[l..r], &ampl[l..r], freq[i], q0, diag);
        if fit.depth_ratio() > config.max_ratio
            && l >= REFIT_MARGIN
            && r + REFIT_MARGIN < len
        {
            let (wl, wr) = (l - REFIT_MARGIN, r + REFIT_MARGIN);
            fit = fit_lorentzian(&freq[wl..wr], &ampl[wl..wr], freq[i], q0, diag);
            diag.debug("Rough refitting with Lorentzian");
        }
        if !(fit.q >= config.min_q) {
            bad_q += 1;
            continue;
        }
        if fit.depth_ratio() > config.max_ratio {
            bad_depth += 1;
            continue;
        }
        fits.push(fit);
    }
    if bad_q > 0 {
        diag.debug(format!("Removed {bad_q} peaks with bad Q"));
    }
    if bad_depth > 0 {
        diag.debug(format!("Removed {bad_depth} peaks with bad S21min"));
    }
    fits.sort_by(|a, b| a.center.total_cmp(&b.center));

    if !fits.is_empty() && carrier >= freq[0] && carrier <= freq[len - 1] {
        let centers: Vec<f64> = fits.iter().map(|f| f.center).collect();
        let nearest = fits.swap_remove(argmin_distance(&centers, carrier));
        fits = vec![nearest];
    }

    fits.into_iter()
        .map(|fit| candidate(fit, freq, &ampl_s, dfreq))
        .collect()
}

/// Picks the candidate nearest to the center of the sweep
pub fn select_peak<'a>(freq: &[f64], peaks: &'a [PeakCandidate]) -> Option<&'a PeakCandidate> {
    let (first, last) = (freq.first()?, freq.last()?);
    let center = (first + last) / 2.0;
    let mut best: Option<&PeakCandidate> = None;
    for peak in peaks {
        match best {
            Some(b) if (b.center_freq - center).abs() <= (peak.center_freq - center).abs() => {}
            _ => best = Some(peak),
        }
    }
    best
}

/// Three times the spread of `deriv2` after one round of dropping values beyond 2 sigma
fn detection_threshold(deriv2: &[f64]) -> f64 {
    let sigma = std_dev(deriv2);
    let kept: Vec<f64> = deriv2
        .iter()
        .copied()
        .filter(|d| d.abs() < 2.0 * sigma)
        .collect();
    3.0 * std_dev(&kept)
}

/// Window `[l, r)` of a dip centered on `i`: the positive lobe of the second derivative scaled
/// out to the FWHM, and the FWHM itself in frequency units.
fn inflection_window(deriv2: &[f64], i: usize, dfreq: f64) -> (usize, usize, f64) {
    let len = deriv2.len();
    let (mut l, mut r) = (i, i);
    while l > 0 && deriv2[l] > 0.0 {
        l -= 1;
    }
    while r < len && deriv2[r] > 0.0 {
        r += 1;
    }
    let fwhm = (r - l + 1) as f64 * dfreq * INFLECTION_TO_FWHM;

    // `as` truncates toward zero and saturates negative values at 0
    let l = ((l as f64 - i as f64) * INFLECTION_TO_FWHM + i as f64) as usize;
    let r = ((r as f64 - i as f64) * INFLECTION_TO_FWHM + i as f64) as usize;
    (l, r.min(len - 1), fwhm)
}

/// Seeds for the full fit. The off-resonance level is read `3` half-widths below the center,
/// clipped at the start of the sweep.
fn candidate(fit: LorentzianFit, freq: &[f64], ampl_s: &[f64], dfreq: f64) -> PeakCandidate {
    let f0ind = argmin_distance(freq, fit.center);
    let half_width = fit.center / fit.q / 2.0 / dfreq;
    // `as` truncates toward zero and saturates negative values at 0
    let off = ((f0ind as f64 - 3.0 * half_width) as usize).min(freq.len() - 1);
    PeakCandidate {
        center_index: f0ind,
        center_freq: fit.center,
        q_estimate: fit.q,
        depth: fit.depth,
        background: fit.background,
        half_width_left: half_width as usize,
        half_width_right: half_width as usize,
        off_resonance: ampl_s[off],
        on_resonance: ampl_s[f0ind],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dip_sweep(centers: &[f64], q: f64) -> (Vec<f64>, Vec<f64>) {
        let freq: Vec<f64> = (0..2001).map(|i| 0.99 + i as f64 * 1e-5).collect();
        let ampl = freq
            .iter()
            .map(|&f| {
                centers.iter().fold(1.0, |acc, &c| {
                    let u = (f - c) * 2.0 * q / c;
                    acc - 0.5 / (u * u + 1.0)
                })
            })
            .collect();
        (freq, ampl)
    }

    #[test]
    fn flat_sweep_has_no_peaks() {
        let freq: Vec<f64> = (0..500).map(|i| 1.0 + i as f64 * 1e-6).collect();
        let ampl = vec![0.7; 500];
        let mut diag = Diagnostics::new();
        let peaks = locate_peaks(&freq, &ampl, 1.0001, &PeakSearchConfig::default(), &mut diag);
        assert!(peaks.is_empty());
    }

    #[test]
    fn finds_single_dip() {
        let (freq, ampl) = dip_sweep(&[1.0], 5000.0);
        let mut diag = Diagnostics::new();
        let peaks = locate_peaks(&freq, &ampl, 1.0, &PeakSearchConfig::default(), &mut diag);
        assert_eq!(peaks.len(), 1);
        let peak = &peaks[0];
        assert!((peak.center_freq - 1.0).abs() < 1e-6);
        assert!((peak.q_estimate - 5000.0).abs() / 5000.0 < 0.05);
        assert_eq!(peak.center_index, 1000);
        assert!(peak.off_resonance > peak.on_resonance);
        assert!((9..=10).contains(&peak.half_width_left));
    }

    #[test]
    fn keeps_peak_nearest_carrier() {
        let (freq, ampl) = dip_sweep(&[0.995, 1.006], 5000.0);
        let mut diag = Diagnostics::new();
        let config = PeakSearchConfig::default();
        let peaks = locate_peaks(&freq, &ampl, 1.004, &config, &mut diag);
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].center_freq - 1.006).abs() < 1e-6);

        // carrier outside the sweep keeps both, sorted by frequency
        let peaks = locate_peaks(&freq, &ampl, 2.0, &config, &mut diag);
        assert_eq!(peaks.len(), 2);
        assert!(peaks[0].center_freq < peaks[1].center_freq);
        let chosen = select_peak(&freq, &peaks).unwrap();
        assert!((chosen.center_freq - 0.995).abs() < 1e-6);
    }

    #[test]
    fn off_resonance_reads_below_center() {
        let freq: Vec<f64> = (0..2001).map(|i| 0.99 + i as f64 * 1e-5).collect();
        let ramp: Vec<f64> = (0..2001).map(|i| i as f64).collect();
        let fit = |center: f64| LorentzianFit {
            center,
            q: 5000.0,
            depth: 0.5,
            background: 1.0,
        };

        // near the top of the sweep the level still comes from below the dip
        let peak = candidate(fit(freq[1990]), &freq, &ramp, 1e-5);
        assert_eq!(peak.center_index, 1990);
        assert_eq!(peak.half_width_left, 10);
        assert_eq!(peak.off_resonance, 1959.0);
        assert_eq!(peak.on_resonance, 1990.0);

        let peak = candidate(fit(freq[5]), &freq, &ramp, 1e-5);
        assert_eq!(peak.off_resonance, 0.0);
    }

    #[test]
    fn min_q_rejects() {
        let (freq, ampl) = dip_sweep(&[1.0], 5000.0);
        let mut diag = Diagnostics::new();
        let config = PeakSearchConfig {
            min_q: 1e6,
            ..Default::default()
        };
        assert!(locate_peaks(&freq, &ampl, 1.0, &config, &mut diag).is_empty());
        assert!(diag.mentions("bad Q"));
    }
}
