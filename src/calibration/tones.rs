use serde::Serialize;

/// A KID tone and the closest blind tone on each side of it, as readout bin numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlindTonePair {
    pub kid: i64,
    pub left: Option<i64>,
    pub right: Option<i64>,
}

/// For each KID tone (in ascending order), finds the nearest blind tone below and above it
/// among all tones.
pub fn find_nearest_blind_tones(kids: &[i64], blinds: &[i64]) -> Vec<BlindTonePair> {
    let mut sorted_blinds = blinds.to_vec();
    sorted_blinds.sort_unstable();
    let mut sorted_kids = kids.to_vec();
    sorted_kids.sort_unstable();

    sorted_kids
        .into_iter()
        .map(|kid| {
            let split = sorted_blinds.partition_point(|&b| b < kid);
            let left = split.checked_sub(1).map(|i| sorted_blinds[i]);
            let right = sorted_blinds[split..].iter().copied().find(|&b| b > kid);
            BlindTonePair { kid, left, right }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_on_each_side() {
        let kids = [-189634, -196483, 158692];
        let blinds = [-201203, -192949, -184695, 153170, 161962];
        let pairs = find_nearest_blind_tones(&kids, &blinds);
        assert_eq!(
            pairs,
            vec![
                BlindTonePair {
                    kid: -196483,
                    left: Some(-201203),
                    right: Some(-192949)
                },
                BlindTonePair {
                    kid: -189634,
                    left: Some(-192949),
                    right: Some(-184695)
                },
                BlindTonePair {
                    kid: 158692,
                    left: Some(153170),
                    right: Some(161962)
                },
            ]
        );
    }

    #[test]
    fn missing_side_is_none() {
        let pairs = find_nearest_blind_tones(&[5, 50], &[10]);
        assert_eq!(pairs[0].left, None);
        assert_eq!(pairs[0].right, Some(10));
        assert_eq!(pairs[1].left, Some(10));
        assert_eq!(pairs[1].right, None);
    }
}
