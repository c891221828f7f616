use crate::fitting::common::error::FittingError;
use crate::fitting::common::fitstruct::ResonanceParameters;

/// Rejects fits whose parameters are not physical.
///
/// A fit fails if the error of `fr`, `Qr`, `Qc` or `Qi` is missing, if any of those errors has a
/// sign opposite to its value, if `fr`, `dfr`, `Qr` or `dQr` is NaN, or if `Qr` or `dQr` is
/// infinite.
pub fn validate(params: &ResonanceParameters) -> Result<(), FittingError> {
    let checked = [
        ("fr", params.fr),
        ("Qr", params.qr),
        ("Qc", params.qc),
        ("Qi", params.qi),
    ];
    let mut errors = Vec::with_capacity(checked.len());
    for (name, value) in checked {
        match value.stderr {
            Some(stderr) => errors.push((name, value.value, stderr)),
            None => Err(FittingError::InvalidParameter(format!(
                "no standard error for {name}"
            )))?,
        }
    }

    for (name, value, stderr) in &errors {
        if stderr / value < 0.0 {
            Err(FittingError::InvalidParameter(format!(
                "{name} = {value} with error {stderr}"
            )))?
        }
    }

    let (fr, dfr) = (params.fr.value, errors[0].2);
    let (qr, dqr) = (params.qr.value, errors[1].2);
    if fr.is_nan() || dfr.is_nan() || qr.is_nan() || dqr.is_nan() {
        Err(FittingError::InvalidParameter(format!(
            "NaN in fr = {fr} +/- {dfr} or Qr = {qr} +/- {dqr}"
        )))?
    }
    if qr.is_infinite() || dqr.is_infinite() {
        Err(FittingError::InvalidParameter(format!(
            "Qr = {qr} +/- {dqr} is infinite"
        )))?
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::common::fitstruct::FitValue;

    fn params() -> ResonanceParameters {
        let v = |value: f64, err: f64| FitValue::new(value, Some(err));
        ResonanceParameters {
            arga: v(0.1, 0.01),
            absa: v(1.0, 0.01),
            tau: v(30.0, 0.1),
            fr: v(1.0, 1e-8),
            qr: v(2e4, 10.0),
            qc: v(4e4, 20.0),
            phi0: v(0.0, 0.01),
            c: v(0.0, 0.01),
            qi: v(4e4, 30.0),
            chi_squared: 1.0,
            reduced_chi_squared: 1.0,
            iterations: 5,
        }
    }

    #[test]
    fn accepts_physical_fit() {
        assert_eq!(validate(&params()), Ok(()));
    }

    #[test]
    fn rejects_each_condition() {
        let mut p = params();
        p.qc.stderr = None;
        assert!(validate(&p).is_err());

        let mut p = params();
        p.qi = FitValue::new(-4e4, Some(30.0));
        assert!(validate(&p).is_err());

        let mut p = params();
        p.fr.stderr = Some(f64::NAN);
        assert!(validate(&p).is_err());

        let mut p = params();
        p.qr = FitValue::new(f64::INFINITY, Some(10.0));
        assert!(validate(&p).is_err());

        let mut p = params();
        p.qr.stderr = Some(f64::INFINITY);
        assert!(matches!(validate(&p), Err(FittingError::InvalidParameter(_))));
    }
}
