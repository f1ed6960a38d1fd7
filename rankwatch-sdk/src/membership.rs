//! Participant identity within the distributed group.

use rankwatch_types::Rank;

use crate::error::MembershipError;

/// Environment variable holding this participant's zero-based rank.
pub const RANK_VAR: &str = "RANK";

/// Environment variable holding the number of participants.
pub const WORLD_SIZE_VAR: &str = "WORLD_SIZE";

/// This participant's rank and the size of its group.
///
/// Both values come from the launcher; nothing here derives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    rank: Rank,
    world_size: usize,
}

impl Membership {
    /// Create a membership, checking that `rank` falls inside the group.
    pub fn new(rank: Rank, world_size: usize) -> Result<Self, MembershipError> {
        if world_size == 0 {
            return Err(MembershipError::EmptyGroup);
        }
        if rank >= world_size {
            return Err(MembershipError::RankOutOfRange { rank, world_size });
        }
        Ok(Self { rank, world_size })
    }

    /// Membership of a single-participant run.
    pub fn single() -> Self {
        Self {
            rank: 0,
            world_size: 1,
        }
    }

    /// Read `RANK` and `WORLD_SIZE` from the environment.
    pub fn from_env() -> Result<Self, MembershipError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MembershipError> {
        let read = |name: &'static str| -> Result<usize, MembershipError> {
            let value = lookup(name).ok_or(MembershipError::Missing(name))?;
            value
                .trim()
                .parse()
                .map_err(|_| MembershipError::Invalid { name, value })
        };
        Self::new(read(RANK_VAR)?, read(WORLD_SIZE_VAR)?)
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Whether this participant performs aggregation (rank 0).
    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }

    /// Every rank in the group, in order.
    pub fn ranks(&self) -> std::ops::Range<Rank> {
        0..self.world_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn reads_rank_and_world_size() {
        let m = Membership::from_lookup(lookup(&[("RANK", "2"), ("WORLD_SIZE", "4")])).unwrap();
        assert_eq!(m.rank(), 2);
        assert_eq!(m.world_size(), 4);
        assert!(!m.is_coordinator());
        assert_eq!(m.ranks(), 0..4);
    }

    #[test]
    fn missing_variable() {
        let err = Membership::from_lookup(lookup(&[("WORLD_SIZE", "4")])).unwrap_err();
        assert_eq!(err, MembershipError::Missing("RANK"));
    }

    #[test]
    fn invalid_variable() {
        let err =
            Membership::from_lookup(lookup(&[("RANK", "zero"), ("WORLD_SIZE", "4")])).unwrap_err();
        assert!(matches!(err, MembershipError::Invalid { name: "RANK", .. }));
    }

    #[test]
    fn rank_must_fit_group() {
        assert_eq!(
            Membership::new(4, 4).unwrap_err(),
            MembershipError::RankOutOfRange {
                rank: 4,
                world_size: 4
            }
        );
        assert_eq!(Membership::new(0, 0).unwrap_err(), MembershipError::EmptyGroup);
    }

    #[test]
    fn single_is_coordinator() {
        let m = Membership::single();
        assert!(m.is_coordinator());
        assert_eq!(m.world_size(), 1);
    }
}
