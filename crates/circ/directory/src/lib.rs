//! Circ Directory - enrollment of librarians and participants.
//!
//! Role truth lives in the access layer's `RoleTable`; this crate owns the
//! per-participant lifecycle records and the enumerable roster. Records
//! outlive enrollment so that a re-enrolled participant keeps a clean
//! history row rather than a dangling one.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use circ_access::{AccessError, RoleTable};
use circ_types::{ItemId, MemberId, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

/// An active loan held by a participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub item: ItemId,
    pub started_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Lifecycle state for one participant identity.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// The single active loan, if any.
    pub loan: Option<Loan>,
    /// Block placed after a late return, lifted by paying the penalty
    /// (or forgiven on forced unenrollment).
    pub on_hold: bool,
    /// Outstanding penalty. A participant with a positive balance
    /// cannot borrow.
    pub penalty_balance: u64,
}

/// Enrollment records and the enumerable participant roster.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Directory {
    records: HashMap<MemberId, ParticipantRecord>,
    /// Duplicate-free list of enrolled participants. Removal swaps with
    /// the last entry, so enumeration order is unspecified.
    roster: Vec<MemberId>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an identity as a librarian. Administrator only. Rejected if
    /// the identity is an enrolled participant or the administrator;
    /// marking an existing librarian again is a silent no-op.
    pub fn enroll_librarian(
        &mut self,
        roles: &mut RoleTable,
        caller: &MemberId,
        id: MemberId,
    ) -> Result<(), DirectoryError> {
        roles.require_administrator(caller)?;
        match roles.role_of(&id) {
            Some(Role::Administrator) | Some(Role::Participant) => {
                return Err(DirectoryError::InvalidRole(id));
            }
            Some(Role::Librarian) => return Ok(()),
            None => {}
        }
        info!(member = %id, "librarian enrolled");
        roles.grant(id, Role::Librarian);
        Ok(())
    }

    /// Clear a librarian marker. Administrator only. Unconditional: an
    /// identity that was never a librarian is left untouched.
    pub fn unenroll_librarian(
        &mut self,
        roles: &mut RoleTable,
        caller: &MemberId,
        id: &MemberId,
    ) -> Result<(), DirectoryError> {
        roles.require_administrator(caller)?;
        if roles.role_of(id) == Some(Role::Librarian) {
            info!(member = %id, "librarian unenrolled");
            roles.revoke(id);
        }
        Ok(())
    }

    /// Enroll a participant. Staff only. Rejected if the identity is the
    /// administrator or a librarian. Re-enrolling an already-enrolled
    /// participant is a no-op; the roster stays duplicate-free.
    pub fn enroll_participant(
        &mut self,
        roles: &mut RoleTable,
        caller: &MemberId,
        id: MemberId,
    ) -> Result<(), DirectoryError> {
        roles.require_staff(caller)?;
        match roles.role_of(&id) {
            Some(Role::Administrator) | Some(Role::Librarian) => {
                return Err(DirectoryError::InvalidRole(id));
            }
            Some(Role::Participant) => return Ok(()),
            None => {}
        }

        info!(member = %id, "participant enrolled");
        self.records.entry(id.clone()).or_default();
        self.roster.push(id.clone());
        roles.grant(id, Role::Participant);
        Ok(())
    }

    /// Unenroll a participant. Staff only; the identity must be enrolled,
    /// hold no active loan, and be under no hold. Any outstanding penalty
    /// is forgiven as part of the exit.
    pub fn unenroll_participant(
        &mut self,
        roles: &mut RoleTable,
        caller: &MemberId,
        id: &MemberId,
    ) -> Result<(), DirectoryError> {
        roles.require_staff(caller)?;
        roles.require_participant(id)?;

        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| AccessError::NotEnrolled(id.clone()))?;
        if record.loan.is_some() {
            return Err(DirectoryError::HasActiveLoan(id.clone()));
        }
        if record.on_hold {
            return Err(DirectoryError::HasHold(id.clone()));
        }
        if record.penalty_balance > 0 {
            warn!(
                member = %id,
                forgiven = record.penalty_balance,
                "outstanding penalty forgiven on unenrollment"
            );
            record.penalty_balance = 0;
        }

        if let Some(index) = self.roster.iter().position(|entry| entry == id) {
            self.roster.swap_remove(index);
        }
        roles.revoke(id);
        info!(member = %id, "participant unenrolled");
        Ok(())
    }

    /// The enrolled participants, in unspecified order.
    pub fn participants(&self) -> &[MemberId] {
        &self.roster
    }

    /// Lifecycle record for an identity, if one was ever enrolled.
    pub fn record(&self, id: &MemberId) -> Option<&ParticipantRecord> {
        self.records.get(id)
    }

    /// Mutable lifecycle record, for the lending engine.
    pub fn record_mut(&mut self, id: &MemberId) -> Option<&mut ParticipantRecord> {
        self.records.get_mut(id)
    }
}

/// Directory operation failures.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("Identity already holds a conflicting role: {0}")]
    InvalidRole(MemberId),

    #[error("Participant has an active loan: {0}")]
    HasActiveLoan(MemberId),

    #[error("Participant is under a hold: {0}")]
    HasHold(MemberId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Directory, RoleTable, MemberId) {
        let admin = MemberId::new("admin");
        (Directory::new(), RoleTable::new(admin.clone()), admin)
    }

    #[test]
    fn roles_are_mutually_exclusive() {
        let (mut dir, mut roles, admin) = setup();
        let id = MemberId::new("alice");

        dir.enroll_participant(&mut roles, &admin, id.clone())
            .unwrap();
        assert!(matches!(
            dir.enroll_librarian(&mut roles, &admin, id.clone()),
            Err(DirectoryError::InvalidRole(_))
        ));

        let lib = MemberId::new("lib");
        dir.enroll_librarian(&mut roles, &admin, lib.clone())
            .unwrap();
        assert!(matches!(
            dir.enroll_participant(&mut roles, &admin, lib),
            Err(DirectoryError::InvalidRole(_))
        ));

        assert!(matches!(
            dir.enroll_participant(&mut roles, &admin, admin.clone()),
            Err(DirectoryError::InvalidRole(_))
        ));
        assert!(matches!(
            dir.enroll_librarian(&mut roles, &admin, admin.clone()),
            Err(DirectoryError::InvalidRole(_))
        ));
    }

    #[test]
    fn librarian_enrollment_is_admin_only_and_idempotent() {
        let (mut dir, mut roles, admin) = setup();
        let lib = MemberId::new("lib");

        dir.enroll_librarian(&mut roles, &admin, lib.clone())
            .unwrap();
        dir.enroll_librarian(&mut roles, &admin, lib.clone())
            .unwrap();
        assert_eq!(roles.role_of(&lib), Some(Role::Librarian));

        assert!(dir
            .enroll_librarian(&mut roles, &lib, MemberId::new("other"))
            .is_err());
    }

    #[test]
    fn librarian_unenrollment_is_unconditional() {
        let (mut dir, mut roles, admin) = setup();
        let never = MemberId::new("never-a-librarian");
        dir.unenroll_librarian(&mut roles, &admin, &never).unwrap();

        let lib = MemberId::new("lib");
        dir.enroll_librarian(&mut roles, &admin, lib.clone())
            .unwrap();
        dir.unenroll_librarian(&mut roles, &admin, &lib).unwrap();
        assert_eq!(roles.role_of(&lib), None);
    }

    #[test]
    fn librarians_may_enroll_participants() {
        let (mut dir, mut roles, admin) = setup();
        let lib = MemberId::new("lib");
        dir.enroll_librarian(&mut roles, &admin, lib.clone())
            .unwrap();

        dir.enroll_participant(&mut roles, &lib, MemberId::new("pat"))
            .unwrap();
        assert_eq!(dir.participants(), [MemberId::new("pat")]);
    }

    #[test]
    fn re_enrollment_keeps_the_roster_duplicate_free() {
        let (mut dir, mut roles, admin) = setup();
        let id = MemberId::new("alice");

        dir.enroll_participant(&mut roles, &admin, id.clone())
            .unwrap();
        dir.enroll_participant(&mut roles, &admin, id.clone())
            .unwrap();
        assert_eq!(dir.participants().len(), 1);
    }

    #[test]
    fn unenrollment_is_blocked_by_loans_and_holds() {
        let (mut dir, mut roles, admin) = setup();
        let id = MemberId::new("alice");
        dir.enroll_participant(&mut roles, &admin, id.clone())
            .unwrap();

        dir.record_mut(&id).unwrap().loan = Some(Loan {
            item: ItemId(1),
            started_at: Utc::now(),
            due_at: Utc::now(),
        });
        assert!(matches!(
            dir.unenroll_participant(&mut roles, &admin, &id),
            Err(DirectoryError::HasActiveLoan(_))
        ));

        dir.record_mut(&id).unwrap().loan = None;
        dir.record_mut(&id).unwrap().on_hold = true;
        assert!(matches!(
            dir.unenroll_participant(&mut roles, &admin, &id),
            Err(DirectoryError::HasHold(_))
        ));
    }

    #[test]
    fn unenrollment_forgives_outstanding_penalty() {
        let (mut dir, mut roles, admin) = setup();
        let id = MemberId::new("alice");
        dir.enroll_participant(&mut roles, &admin, id.clone())
            .unwrap();
        dir.record_mut(&id).unwrap().penalty_balance = 150;

        dir.unenroll_participant(&mut roles, &admin, &id).unwrap();
        assert_eq!(roles.role_of(&id), None);
        assert!(dir.participants().is_empty());
        assert_eq!(dir.record(&id).unwrap().penalty_balance, 0);
    }

    #[test]
    fn roster_removal_swaps_with_last() {
        let (mut dir, mut roles, admin) = setup();
        for name in ["a", "b", "c"] {
            dir.enroll_participant(&mut roles, &admin, MemberId::new(name))
                .unwrap();
        }

        dir.unenroll_participant(&mut roles, &admin, &MemberId::new("a"))
            .unwrap();
        // "c" moved into the vacated slot; order is unspecified but the
        // set of enrolled identities is exact.
        let mut names: Vec<_> = dir.participants().iter().map(|m| m.0.clone()).collect();
        names.sort();
        assert_eq!(names, ["b", "c"]);
    }

    #[test]
    fn unenrolling_a_stranger_reports_not_enrolled() {
        let (mut dir, mut roles, admin) = setup();
        assert!(matches!(
            dir.unenroll_participant(&mut roles, &admin, &MemberId::new("ghost")),
            Err(DirectoryError::Access(AccessError::NotEnrolled(_)))
        ));
    }
}
