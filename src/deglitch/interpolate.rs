use crate::diagnostics::Diagnostics;
use crate::utils::interp::interp;

/// Replaces flagged samples of `values` in place by linear interpolation between the nearest
/// unflagged neighbours; flagged runs at either end take the nearest unflagged value.
///
/// A series with every sample flagged has nothing to interpolate from and is left unchanged.
pub fn interpolate_bad(values: &mut [f64], bad: &[bool], diag: &mut Diagnostics) {
    if values.len() != bad.len() {
        diag.warn(format!(
            "Glitch mask of length {} does not match series of length {}; series left unchanged",
            bad.len(),
            values.len()
        ));
        return;
    }
    if !bad.iter().any(|&b| b) {
        return;
    }
    let (xp, fp): (Vec<f64>, Vec<f64>) = values
        .iter()
        .zip(bad.iter())
        .enumerate()
        .filter(|(_, (_, &b))| !b)
        .map(|(i, (&v, _))| (i as f64, v))
        .unzip();
    if xp.is_empty() {
        diag.warn("Every sample is flagged as a glitch; series left unchanged");
        return;
    }
    for (i, v) in values.iter_mut().enumerate() {
        if bad[i] {
            *v = interp(i as f64, &xp, &fp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mask_is_identity() {
        let original = vec![1.0, -2.0, 3.5, f64::MAX, 0.0];
        let mut values = original.clone();
        let mut diag = Diagnostics::new();
        interpolate_bad(&mut values, &[false; 5], &mut diag);
        assert_eq!(values, original);
        assert!(diag.is_empty());
    }

    #[test]
    fn fills_interior_and_ends() {
        let mut values = vec![100.0, 1.0, 2.0, 100.0, 100.0, 5.0, 100.0];
        let bad = [true, false, false, true, true, false, true];
        let mut diag = Diagnostics::new();
        interpolate_bad(&mut values, &bad, &mut diag);
        assert_eq!(values, vec![1.0, 1.0, 2.0, 3.0, 4.0, 5.0, 5.0]);
    }

    #[test]
    fn all_flagged_is_unchanged() {
        let mut values = vec![1.0, 2.0];
        let mut diag = Diagnostics::new();
        interpolate_bad(&mut values, &[true, true], &mut diag);
        assert_eq!(values, vec![1.0, 2.0]);
        assert_eq!(diag.warnings().count(), 1);
    }
}
