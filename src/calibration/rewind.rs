use crate::fitting::resonance::model::ModelParams;
use num_complex::Complex64;

/// Phases beyond this magnitude mark the first sample of a 2 pi wrap
const WRAP_THRESHOLD: f64 = 3.1;

/// Rewinds samples that each have their own frequency (a sweep)
pub fn rewind_sweep(params: &ModelParams, freq: &[f64], iq: &[Complex64]) -> Vec<Complex64> {
    freq.iter()
        .zip(iq.iter())
        .map(|(&x, &y)| params.rewind(x, y))
        .collect()
}

/// Rewinds samples of a single tone at frequency `freq` (a timestream)
pub fn rewind_tone(params: &ModelParams, freq: f64, iq: &[Complex64]) -> Vec<Complex64> {
    iq.iter().map(|&y| params.rewind(freq, y)).collect()
}

/// Amplitude `2|rw|` of rewound samples
pub fn rewound_amplitude(rewound: &[Complex64]) -> Vec<f64> {
    rewound.iter().map(|z| 2.0 * z.norm()).collect()
}

/// Phase `-arg(-rw)` of rewound samples: zero at the resonance, growing off resonance
pub fn rewound_phase(rewound: &[Complex64]) -> Vec<f64> {
    rewound.iter().map(|z| -(-z).arg()).collect()
}

/// Removes a single 2 pi wrap from a phase series.
///
/// The first sample with `|phase| > 3.1` sets the direction: if it is positive, every later
/// negative sample is raised by 2 pi; otherwise every later positive sample is lowered by 2 pi.
pub fn fix_phase_jump(phase: &mut [f64]) {
    let Some(first) = phase.iter().position(|p| p.abs() > WRAP_THRESHOLD) else {
        return;
    };
    let rising = phase[first] > 0.0;
    for p in phase[first + 1..].iter_mut() {
        if rising && *p < 0.0 {
            *p += 2.0 * std::f64::consts::PI;
        } else if !rising && *p > 0.0 {
            *p -= 2.0 * std::f64::consts::PI;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn sweep_rewinds_onto_reference_circle() {
        let p = ModelParams {
            arga: 1.1,
            absa: 0.8,
            tau: 12.0,
            fr: 1.0,
            qr: 1e4,
            qc: 3e4,
            phi0: -0.3,
            c: 0.5,
        };
        let freq: Vec<f64> = (0..101).map(|i| 0.9995 + i as f64 * 1e-5).collect();
        let iq: Vec<Complex64> = freq.iter().map(|&x| p.eval(x)).collect();
        let rw = rewind_sweep(&p, &freq, &iq);
        // the model rewinds onto the circle through -0.5 and +0.5 centered at 0
        for z in &rw {
            assert!((z.norm() - 0.5).abs() < 1e-9);
        }
        let amplitude = rewound_amplitude(&rw);
        let phase = rewound_phase(&rw);
        assert!((amplitude[50] - 1.0).abs() < 1e-9);
        assert!(phase[50].abs() < 1e-9);
        assert!(phase[40] * phase[60] < 0.0);
    }

    #[test]
    fn tone_uses_one_frequency() {
        let p = ModelParams {
            arga: 0.0,
            absa: 1.0,
            tau: 0.0,
            fr: 1.0,
            qr: 1e4,
            qc: 1e4,
            phi0: 0.0,
            c: 0.0,
        };
        let y = p.eval(1.0);
        let rw = rewind_tone(&p, 1.0, &[y, y]);
        assert!((rw[1] - Complex64::new(-0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn phase_jump_is_unwrapped() {
        let mut phase = vec![3.0, 3.12, -3.13, -3.0, 3.11];
        fix_phase_jump(&mut phase);
        assert_eq!(phase[0], 3.0);
        assert!((phase[2] - (2.0 * PI - 3.13)).abs() < 1e-12);
        assert!((phase[3] - (2.0 * PI - 3.0)).abs() < 1e-12);
        assert_eq!(phase[4], 3.11);

        let mut phase = vec![-0.5, -3.12, 3.13];
        fix_phase_jump(&mut phase);
        assert!((phase[2] - (3.13 - 2.0 * PI)).abs() < 1e-12);

        let mut calm = vec![0.1, -0.2, 0.3];
        fix_phase_jump(&mut calm);
        assert_eq!(calm, vec![0.1, -0.2, 0.3]);
    }
}
