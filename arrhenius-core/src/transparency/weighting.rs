use serde::{Deserialize, Serialize};

/// How a value falling between two table keys is split between them
///
/// Every policy returns a `(lower_weight, upper_weight)` pair that sums to 1. When both
/// brackets are the same key all of the weight goes to the lower one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightingPolicy {
    /// All weight to whichever key is nearer; ties go to the lower key
    #[serde(alias = "close")]
    Closest,
    /// Always round down
    #[serde(alias = "low")]
    Lowest,
    /// Always round up
    #[serde(alias = "high")]
    Highest,
    /// Linear interpolation between the two keys
    #[serde(alias = "mean")]
    Proximity,
}

impl WeightingPolicy {
    pub fn weights(&self, lower: f64, upper: f64, actual: f64) -> (f64, f64) {
        if lower == upper {
            return (1.0, 0.0);
        }

        match self {
            WeightingPolicy::Closest => {
                if upper - actual < actual - lower {
                    (0.0, 1.0)
                } else {
                    (1.0, 0.0)
                }
            }
            WeightingPolicy::Lowest => (1.0, 0.0),
            WeightingPolicy::Highest => (0.0, 1.0),
            WeightingPolicy::Proximity => {
                let span = upper - lower;
                (1.0 - (actual - lower) / span, 1.0 - (upper - actual) / span)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn closest_picks_nearer_key() {
        assert_eq!(WeightingPolicy::Closest.weights(1.0, 2.0, 1.2), (1.0, 0.0));
        assert_eq!(WeightingPolicy::Closest.weights(1.0, 2.0, 1.8), (0.0, 1.0));
        assert_eq!(WeightingPolicy::Closest.weights(1.0, 2.0, 1.5), (1.0, 0.0));
    }

    #[test]
    fn one_sided_policies() {
        assert_eq!(WeightingPolicy::Lowest.weights(1.0, 2.0, 1.9), (1.0, 0.0));
        assert_eq!(WeightingPolicy::Highest.weights(1.0, 2.0, 1.1), (0.0, 1.0));
    }

    #[test]
    fn proximity_interpolates() {
        let (lower, upper) = WeightingPolicy::Proximity.weights(1.0, 2.0, 1.25);
        assert!(is_close!(lower, 0.75));
        assert!(is_close!(upper, 0.25));
    }

    #[test]
    fn degenerate_bracket_goes_low() {
        for policy in [
            WeightingPolicy::Closest,
            WeightingPolicy::Lowest,
            WeightingPolicy::Highest,
            WeightingPolicy::Proximity,
        ] {
            assert_eq!(policy.weights(40.0, 40.0, 55.0), (1.0, 0.0));
        }
    }

    #[test]
    fn historical_names_deserialize() {
        let parsed: Vec<WeightingPolicy> =
            serde_json::from_str(r#"["close", "low", "high", "mean", "closest", "highest"]"#)
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                WeightingPolicy::Closest,
                WeightingPolicy::Lowest,
                WeightingPolicy::Highest,
                WeightingPolicy::Proximity,
                WeightingPolicy::Closest,
                WeightingPolicy::Highest,
            ]
        );
    }
}
