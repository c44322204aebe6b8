//! Circ Types - the shared vocabulary of the circulation ledger.
#![deny(unsafe_code)]

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity of any caller: administrator, librarian, or participant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);
impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential catalog item identifier. Assigned monotonically, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);
impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The one role an identity may hold. An identity is the administrator,
/// a librarian, a participant, or nothing - never two at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    Librarian,
    Participant,
}

/// Tunable lending constants, fixed at ledger construction.
///
/// The overdue unit is one whole day; lateness below one full day
/// accrues nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingPolicy {
    /// Penalty accrued per full day past the due time.
    pub fine_per_day: u64,
    /// Length of one lease, also the extension granted per renewal.
    pub lease_days: i64,
    /// Identifier assigned to the first catalog item.
    pub first_item_id: u64,
}

impl LendingPolicy {
    /// The lease span as a duration.
    pub fn lease(&self) -> Duration {
        Duration::days(self.lease_days)
    }
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            fine_per_day: 50,
            lease_days: 14,
            first_item_id: 1,
        }
    }
}

/// Outward notification emitted whenever a penalty is assessed on a
/// late return.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyNotice {
    pub member: MemberId,
    pub item: ItemId,
    /// Incremental amount added by this assessment, not the running balance.
    pub amount: u64,
    pub assessed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_reference_values() {
        let policy = LendingPolicy::default();
        assert_eq!(policy.lease_days, 14);
        assert_eq!(policy.lease(), Duration::days(14));
        assert_eq!(policy.first_item_id, 1);
    }

    #[test]
    fn policy_round_trips_through_json() {
        let policy = LendingPolicy {
            fine_per_day: 25,
            lease_days: 7,
            first_item_id: 100,
        };
        let json = serde_json::to_string(&policy).unwrap();
        let back: LendingPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn member_ids_compare_by_value() {
        assert_eq!(MemberId::new("alice"), MemberId::new("alice"));
        assert_ne!(MemberId::new("alice"), MemberId::new("bob"));
    }
}
