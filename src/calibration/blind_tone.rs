use crate::calibration::CalibrationError;
use num_complex::Complex64;

/// A complex stream read out at a single tone frequency (GHz)
#[derive(Debug, Clone, PartialEq)]
pub struct Tone<'a> {
    pub frequency: f64,
    pub iq: &'a [Complex64],
}

impl<'a> Tone<'a> {
    pub fn new(frequency: f64, iq: &'a [Complex64]) -> Tone<'a> {
        Tone { frequency, iq }
    }

    /// The stream divided by its own mean
    fn normalized(&self) -> Result<Vec<Complex64>, CalibrationError> {
        let sum: Complex64 = self.iq.iter().sum();
        let mean = sum / self.iq.len() as f64;
        if mean.norm() == 0.0 || !mean.is_finite() {
            Err(CalibrationError::ZeroMean(self.frequency))?
        }
        Ok(self.iq.iter().map(|z| z / mean).collect())
    }
}

/// Removes common-mode gain and phase drift from `signal` using two reference tones.
///
/// Each reference is normalized by its mean and the two are linearly interpolated to the signal
/// frequency; the signal is divided by the result sample by sample. The references must bracket
/// the signal (`left < right`, `left <= signal <= right`) and all streams must be equally long.
pub fn calibrate_with_blind_tones(
    signal: &Tone,
    left: &Tone,
    right: &Tone,
) -> Result<Vec<Complex64>, CalibrationError> {
    if !(left.frequency < right.frequency
        && left.frequency <= signal.frequency
        && signal.frequency <= right.frequency)
    {
        Err(CalibrationError::Unbracketed {
            left: left.frequency,
            right: right.frequency,
            signal: signal.frequency,
        })?
    }
    let n = signal.iq.len();
    if left.iq.len() != n || right.iq.len() != n {
        Err(CalibrationError::LengthMismatch(format!(
            "signal {n}, left {}, right {}",
            left.iq.len(),
            right.iq.len()
        )))?
    }
    if n == 0 {
        return Ok(vec![]);
    }

    let calib_left = left.normalized()?;
    let calib_right = right.normalized()?;
    let weight = (signal.frequency - left.frequency) / (right.frequency - left.frequency);
    Ok(signal
        .iq
        .iter()
        .zip(calib_left.iter().zip(calib_right.iter()))
        .map(|(s, (l, r))| s / (l + (r - l) * weight))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn drifting(n: usize) -> Vec<Complex64> {
        (0..n)
            .map(|k| 1.0 + 0.1 * Complex64::from_polar(1.0, 2.0 * PI * k as f64 / n as f64))
            .collect()
    }

    #[test]
    fn identical_tones_calibrate_to_one() {
        let iq = drifting(64);
        let calibrated = calibrate_with_blind_tones(
            &Tone::new(1.0, &iq),
            &Tone::new(0.99, &iq),
            &Tone::new(1.01, &iq),
        )
        .unwrap();
        for z in calibrated {
            assert!((z - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn interpolates_between_references() {
        let left = vec![Complex64::new(1.0, 0.0); 4];
        let right = vec![Complex64::new(3.0, 0.0); 4];
        let signal = vec![Complex64::new(2.0, 2.0); 4];
        // both references normalize to one, so the signal is unchanged
        let calibrated = calibrate_with_blind_tones(
            &Tone::new(1.5, &signal),
            &Tone::new(1.0, &left),
            &Tone::new(2.0, &right),
        )
        .unwrap();
        assert_eq!(calibrated, signal);
    }

    #[test]
    fn rejects_bad_references() {
        let iq = drifting(8);
        let zeros = vec![Complex64::new(0.0, 0.0); 8];
        let short = drifting(4);
        let signal = Tone::new(1.0, &iq);
        assert!(matches!(
            calibrate_with_blind_tones(&signal, &Tone::new(1.01, &iq), &Tone::new(0.99, &iq)),
            Err(CalibrationError::Unbracketed { .. })
        ));
        assert!(matches!(
            calibrate_with_blind_tones(&signal, &Tone::new(1.0, &iq), &Tone::new(1.0, &iq)),
            Err(CalibrationError::Unbracketed { .. })
        ));
        assert!(matches!(
            calibrate_with_blind_tones(&signal, &Tone::new(0.99, &zeros), &Tone::new(1.01, &iq)),
            Err(CalibrationError::ZeroMean(_))
        ));
        assert!(matches!(
            calibrate_with_blind_tones(&signal, &Tone::new(0.99, &short), &Tone::new(1.01, &iq)),
            Err(CalibrationError::LengthMismatch(_))
        ));
    }
}
