use crate::config::{PsdConfig, Window};
use crate::diagnostics::Diagnostics;
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::Serialize;
use std::f64::consts::PI;

/// One-sided power spectral density
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Psd {
    /// Non-negative frequencies, in the inverse unit of `dt`
    pub frequency: Vec<f64>,
    pub power: Vec<f64>,
}

/// Averaged PSD of `data` sampled every `dt`.
///
/// The data is cut into `ndivide` chunks, or into `ndivide` chunks of twice the length
/// overlapping by half when `overlap_half` is set. Each chunk is windowed and contributes
/// `2 |FFT|^2 / size * dt / mean(w^2)`. Returns `None` when the data is too short for a single
/// chunk of two samples.
pub fn power_spectrum_density(
    data: &[f64],
    dt: f64,
    config: &PsdConfig,
    diag: &mut Diagnostics,
) -> Option<Psd> {
    let ndivide = config.ndivide.max(1);
    let (step, size) = if config.overlap_half {
        let step = data.len() / (ndivide + 1);
        (step, step * 2)
    } else {
        let step = data.len() / ndivide;
        (step, step)
    };
    if size < 2 {
        diag.warn(format!(
            "{} samples cannot be split into {ndivide} PSD chunks",
            data.len()
        ));
        return None;
    }
    if !size.is_power_of_two() {
        if config.overlap_half {
            diag.warn(format!(
                "((length of data)/(ndivide+1))*2 is not power of 2: {size}"
            ));
        } else {
            diag.warn(format!("(length of data)/ndivide is not power of 2: {size}"));
        }
    }

    let window = window_values(config.window, size);
    let correction = window.iter().map(|w| w * w).sum::<f64>() / size as f64;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(size);
    let mut power = vec![0.0; size];
    for i in 0..ndivide {
        let mut buffer: Vec<Complex64> = data[i * step..i * step + size]
            .iter()
            .zip(window.iter())
            .map(|(d, w)| Complex64::new(d * w, 0.0))
            .collect();
        fft.process(&mut buffer);
        for (p, z) in power.iter_mut().zip(buffer.iter()) {
            *p += 2.0 * z.norm_sqr() / size as f64 * dt / correction;
        }
    }

    let nonnegative = size.div_ceil(2);
    Some(Psd {
        frequency: (0..nonnegative)
            .map(|k| k as f64 / (size as f64 * dt))
            .collect(),
        power: power[..nonnegative]
            .iter()
            .map(|p| p / ndivide as f64)
            .collect(),
    })
}

/// Symmetric window of `size` samples
fn window_values(window: Window, size: usize) -> Vec<f64> {
    match window {
        Window::None => vec![1.0; size],
        Window::Hann if size == 1 => vec![1.0],
        Window::Hann => (0..size)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / (size - 1) as f64).cos())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn sine_peaks_at_its_frequency() {
        let dt = 0.01;
        let data: Vec<f64> = (0..1024)
            .map(|n| (2.0 * PI * 12.5 * n as f64 * dt).sin())
            .collect();
        let config = PsdConfig {
            ndivide: 4,
            ..Default::default()
        };
        let mut diag = Diagnostics::new();
        let psd = power_spectrum_density(&data, dt, &config, &mut diag).unwrap();
        assert_eq!(psd.frequency.len(), 128);
        assert_eq!(psd.power.len(), 128);
        let peak = (0..psd.power.len())
            .max_by(|&a, &b| psd.power[a].total_cmp(&psd.power[b]))
            .unwrap();
        assert!((psd.frequency[peak] - 12.5).abs() < 0.4);
        assert!(diag.is_empty());
    }

    #[test]
    fn dc_and_nyquist_levels_without_window() {
        let data: Vec<f64> = (0..64).map(|n| if n % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let config = PsdConfig {
            ndivide: 1,
            window: Window::None,
            overlap_half: false,
        };
        let mut diag = Diagnostics::new();
        let psd = power_spectrum_density(&data, 0.5, &config, &mut diag).unwrap();
        // all of the power sits at the Nyquist bin, which is not kept for even sizes
        assert!(psd.power.iter().all(|p| p.abs() < 1e-20));
        assert!(is_close!(psd.frequency[1], 1.0 / 32.0));

        let constant = vec![1.0; 64];
        let psd = power_spectrum_density(&constant, 0.5, &config, &mut diag).unwrap();
        assert!((psd.power[0] - 2.0 * 64.0 * 0.5).abs() < 1e-9);
    }

    #[test]
    fn warns_on_odd_chunks() {
        let data = vec![0.0; 100];
        let config = PsdConfig {
            ndivide: 3,
            overlap_half: true,
            ..Default::default()
        };
        let mut diag = Diagnostics::new();
        let psd = power_spectrum_density(&data, 1.0, &config, &mut diag).unwrap();
        assert_eq!(psd.frequency.len(), 25);
        assert!(diag.mentions("not power of 2: 50"));
        assert!(power_spectrum_density(&[1.0], 1.0, &config, &mut diag).is_none());
    }
}
