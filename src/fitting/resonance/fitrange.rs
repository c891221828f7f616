use crate::fitting::common::error::FittingError;
use crate::fitting::common::fitstruct::{FitWindow, PeakCandidate};
use crate::utils::constants::MIN_RESIDUAL_DOF;

/// Chooses the fit window around `peak`: `nfwhm` half-widths on each side, widened
/// proportionally when the peak is too narrow to constrain `nparams` parameters.
///
/// A window running off either end of the sweep is shifted back inside rather than truncated.
/// `factor` is the number of residuals per sample (2 for complex data).
pub fn adjust_fit_range(
    nfwhm: f64,
    ndata: usize,
    nparams: usize,
    peak: &PeakCandidate,
    factor: usize,
) -> Result<FitWindow, FittingError> {
    let c = peak.center_index as f64;
    let l = c - peak.half_width_left as f64;
    let r = c + peak.half_width_right as f64;
    let nsamples = r - l + 1.0;

    let widen = if nsamples * factor as f64 >= nparams as f64 {
        1.0
    } else {
        nparams as f64 / (nsamples * factor as f64)
    };
    let mut begin = (c - nfwhm * widen * (c - l)) as i64;
    let mut end = (c + nfwhm * widen * (r - c)) as i64;

    let n = ndata as i64;
    if begin < 0 {
        if end - begin >= n {
            begin = 0;
            end = n - 1;
        } else {
            end -= begin;
            begin = 0;
        }
    }
    if end >= n {
        begin = (begin - (end - n)).max(0);
        end = n - 1;
    }

    let begin = begin.max(0) as usize;
    let end = end.max(0) as usize;
    let points = end.saturating_sub(begin);
    if points * factor < nparams + MIN_RESIDUAL_DOF {
        Err(FittingError::WindowTooSmall {
            begin,
            end,
            points,
            required: MIN_RESIDUAL_DOF,
        })?
    }
    FitWindow::new(begin, end, ndata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{COMPLEX_FACTOR, NUM_MODEL_PARAMS};

    fn peak(center_index: usize, half_width: usize) -> PeakCandidate {
        PeakCandidate {
            center_index,
            center_freq: 1.0,
            q_estimate: 1e4,
            depth: 0.5,
            background: 1.0,
            half_width_left: half_width,
            half_width_right: half_width,
            off_resonance: 1.0,
            on_resonance: 0.5,
        }
    }

    fn window(center: usize, half_width: usize, ndata: usize) -> Result<FitWindow, FittingError> {
        adjust_fit_range(
            5.0,
            ndata,
            NUM_MODEL_PARAMS,
            &peak(center, half_width),
            COMPLEX_FACTOR,
        )
    }

    #[test]
    fn centered_window() {
        let w = window(500, 10, 1001).unwrap();
        assert_eq!((w.begin, w.end), (450, 550));
    }

    #[test]
    fn shifts_at_edges() {
        let w = window(20, 10, 1001).unwrap();
        assert_eq!((w.begin, w.end), (0, 100));
        let w = window(990, 10, 1001).unwrap();
        assert_eq!(w.end, 1000);
        assert_eq!(w.begin, 901);
    }

    #[test]
    fn narrow_peak_is_widened() {
        let w = window(500, 0, 1001);
        assert!(matches!(w, Err(FittingError::WindowTooSmall { .. })));

        // 3 samples * 2 < 8 parameters, so the half-widths are scaled by 8/6
        let w = window(500, 1, 1001).unwrap();
        assert_eq!((w.begin, w.end), (493, 506));
    }

    #[test]
    fn small_sweep_is_too_small() {
        let w = window(5, 10, 10);
        assert!(matches!(w, Err(FittingError::WindowTooSmall { .. })));
    }

    #[test]
    fn windows_are_in_bounds() {
        for ndata in [20, 57, 300] {
            for center in 0..ndata {
                for half_width in [1, 3, 10, 40] {
                    if let Ok(w) = window(center, half_width, ndata) {
                        assert!(w.begin < w.end && w.end <= ndata);
                        assert!(w.len() * COMPLEX_FACTOR >= NUM_MODEL_PARAMS);
                    }
                }
            }
        }
    }
}
