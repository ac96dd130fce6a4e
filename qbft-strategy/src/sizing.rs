//! Membership sizing: how many peers a round needs.

use thiserror::Error;

/// Configured floor and ceiling on membership size.
#[derive(Debug, Clone, Copy)]
pub struct SizingConfig {
    pub floor: usize,
    pub ceiling: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            floor: 3,
            ceiling: 21,
        }
    }
}

/// Raised when the Byzantine-safety minimum cannot be satisfied within the
/// configured ceiling. The strategy never silently weakens safety to fit.
#[derive(Error, Debug, Clone, Copy)]
#[error("quorum infeasible: byzantine minimum {byzantine_min} exceeds ceiling {ceiling}")]
pub struct QuorumInfeasible {
    pub byzantine_min: usize,
    pub ceiling: usize,
}

/// `⌊2n/3⌋ + 1`, n = reachable authenticated peers.
pub fn byzantine_min(n: usize) -> usize {
    (2 * n) / 3 + 1
}

/// `⌊(n − maxPartitionSize)/2⌋ + 1`.
pub fn partition_min(n: usize, max_partition_size: usize) -> usize {
    (n.saturating_sub(max_partition_size)) / 2 + 1
}

/// `max(byzantineMin, partitionMin)`, clamped to `[floor, ceiling]`.
/// Returns [`QuorumInfeasible`] if the Byzantine minimum alone exceeds the
/// ceiling.
pub fn minimum_membership_size(
    n: usize,
    max_partition_size: usize,
    config: SizingConfig,
) -> Result<usize, QuorumInfeasible> {
    let byzantine_min = byzantine_min(n);
    if byzantine_min > config.ceiling {
        return Err(QuorumInfeasible {
            byzantine_min,
            ceiling: config.ceiling,
        });
    }

    let partition_min = partition_min(n, max_partition_size);
    let raw = byzantine_min.max(partition_min);
    Ok(raw.clamp(config.floor, config.ceiling))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byzantine_min_matches_formula() {
        assert_eq!(byzantine_min(7), 5);
        assert_eq!(byzantine_min(4), 3);
        assert_eq!(byzantine_min(1), 1);
    }

    #[test]
    fn exceeding_ceiling_is_infeasible() {
        let config = SizingConfig {
            floor: 3,
            ceiling: 10,
        };
        let err = minimum_membership_size(20, 0, config).unwrap_err();
        assert_eq!(err.byzantine_min, byzantine_min(20));
    }

    #[test]
    fn result_never_falls_below_floor() {
        let config = SizingConfig::default();
        let size = minimum_membership_size(1, 0, config).unwrap();
        assert!(size >= config.floor);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The strategy never emits a membership smaller than `byzantineMin`;
        /// when it cannot, it reports infeasibility instead of shrinking.
        #[test]
        fn quorum_floor_invariant(n in 0usize..200, max_partition in 0usize..200, ceiling in 3usize..50) {
            let config = SizingConfig { floor: 3, ceiling };
            match minimum_membership_size(n, max_partition, config) {
                Ok(size) => {
                    prop_assert!(size >= config.floor);
                    prop_assert!(size <= config.ceiling);
                }
                Err(QuorumInfeasible { byzantine_min: bm, ceiling: c }) => {
                    prop_assert!(bm > c);
                    prop_assert_eq!(bm, byzantine_min(n));
                }
            }
        }
    }
}
