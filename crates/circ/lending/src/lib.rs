//! Circ Lending - the borrow/return/renew engine and the ledger facade.
//!
//! `CirculationLedger` owns every registry (roles, catalog, directory)
//! behind a single lock. Each external operation acquires the lock once,
//! runs all of its guards, and only then mutates, so a rejected call
//! leaves no partial state behind. The current time is supplied by the
//! caller at entry and sampled exactly once per operation.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use circ_access::{AccessError, RoleTable};
use circ_catalog::{Catalog, CatalogError, Item};
use circ_directory::{Directory, DirectoryError, Loan, ParticipantRecord};
use circ_types::{ItemId, LendingPolicy, MemberId, PenaltyNotice};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Everything the ledger mutates, guarded as one unit.
#[derive(Debug)]
struct LedgerState {
    roles: RoleTable,
    catalog: Catalog,
    directory: Directory,
    /// Penalty notices queued for external delivery.
    notices: Vec<PenaltyNotice>,
}

/// The circulation ledger facade.
///
/// All operations take the implicit caller identity explicitly; the
/// time-dependent ones additionally take `now`.
pub struct CirculationLedger {
    policy: LendingPolicy,
    state: RwLock<LedgerState>,
}

impl CirculationLedger {
    /// Create a ledger with the reference policy and a fixed administrator.
    pub fn new(administrator: MemberId) -> Self {
        Self::with_policy(administrator, LendingPolicy::default())
    }

    /// Create a ledger with explicit policy constants. The policy is
    /// immutable for the ledger's lifetime.
    pub fn with_policy(administrator: MemberId, policy: LendingPolicy) -> Self {
        Self {
            policy,
            state: RwLock::new(LedgerState {
                roles: RoleTable::new(administrator),
                catalog: Catalog::new(policy.first_item_id),
                directory: Directory::new(),
                notices: Vec::new(),
            }),
        }
    }

    /// The policy constants this ledger was built with.
    pub fn policy(&self) -> LendingPolicy {
        self.policy
    }

    // ── Directory operations ────────────────────────────────────────

    /// Mark an identity as a librarian. Administrator only.
    pub fn enroll_librarian(&self, caller: &MemberId, id: MemberId) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState {
            roles, directory, ..
        } = &mut *state;
        directory.enroll_librarian(roles, caller, id)?;
        Ok(())
    }

    /// Clear a librarian marker. Administrator only.
    pub fn unenroll_librarian(&self, caller: &MemberId, id: &MemberId) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState {
            roles, directory, ..
        } = &mut *state;
        directory.unenroll_librarian(roles, caller, id)?;
        Ok(())
    }

    /// Enroll a participant. Administrator or librarian.
    pub fn enroll_participant(&self, caller: &MemberId, id: MemberId) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState {
            roles, directory, ..
        } = &mut *state;
        directory.enroll_participant(roles, caller, id)?;
        Ok(())
    }

    /// Unenroll a participant. Administrator or librarian; blocked while
    /// the participant holds a loan or a hold. Forgives any outstanding
    /// penalty.
    pub fn unenroll_participant(
        &self,
        caller: &MemberId,
        id: &MemberId,
    ) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState {
            roles, directory, ..
        } = &mut *state;
        directory.unenroll_participant(roles, caller, id)?;
        Ok(())
    }

    /// Snapshot of the enrolled participants, in unspecified order.
    pub fn participants(&self) -> Result<Vec<MemberId>, LendingError> {
        let state = self.read()?;
        Ok(state.directory.participants().to_vec())
    }

    // ── Catalog operations ──────────────────────────────────────────

    /// Add a catalog item. Administrator or librarian.
    pub fn add_item(
        &self,
        caller: &MemberId,
        title: impl Into<String>,
        creator: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<ItemId, LendingError> {
        let mut state = self.write()?;
        let LedgerState { roles, catalog, .. } = &mut *state;
        let id = catalog.add_item(roles, caller, title, creator, category, description)?;
        Ok(id)
    }

    /// Retire an unborrowed item. Administrator or librarian.
    pub fn retire_item(&self, caller: &MemberId, id: ItemId) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState { roles, catalog, .. } = &mut *state;
        catalog.retire_item(roles, caller, id)?;
        Ok(())
    }

    /// Overwrite an unborrowed item's title. Administrator or librarian.
    pub fn set_title(
        &self,
        caller: &MemberId,
        id: ItemId,
        value: impl Into<String>,
    ) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState { roles, catalog, .. } = &mut *state;
        catalog.set_title(roles, caller, id, value)?;
        Ok(())
    }

    /// Overwrite an unborrowed item's creator. Administrator or librarian.
    pub fn set_creator(
        &self,
        caller: &MemberId,
        id: ItemId,
        value: impl Into<String>,
    ) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState { roles, catalog, .. } = &mut *state;
        catalog.set_creator(roles, caller, id, value)?;
        Ok(())
    }

    /// Overwrite an unborrowed item's category. Administrator or librarian.
    pub fn set_category(
        &self,
        caller: &MemberId,
        id: ItemId,
        value: impl Into<String>,
    ) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState { roles, catalog, .. } = &mut *state;
        catalog.set_category(roles, caller, id, value)?;
        Ok(())
    }

    /// Overwrite an unborrowed item's description. Administrator or librarian.
    pub fn set_description(
        &self,
        caller: &MemberId,
        id: ItemId,
        value: impl Into<String>,
    ) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState { roles, catalog, .. } = &mut *state;
        catalog.set_description(roles, caller, id, value)?;
        Ok(())
    }

    /// Look up an item. Retired and never-created ids both come back as
    /// `None`.
    pub fn item(&self, id: ItemId) -> Result<Option<Item>, LendingError> {
        let state = self.read()?;
        Ok(state.catalog.item(id).cloned())
    }

    /// Look up a participant's lifecycle record, if one was ever enrolled.
    pub fn participant(&self, id: &MemberId) -> Result<Option<ParticipantRecord>, LendingError> {
        let state = self.read()?;
        Ok(state.directory.record(id).cloned())
    }

    // ── Lending operations ──────────────────────────────────────────

    /// Borrow an item. The caller must be an enrolled participant with no
    /// active loan, no hold, and a zero penalty balance; the item must
    /// exist and be on the shelf. The loan runs for one lease from `now`.
    pub fn borrow(
        &self,
        participant: &MemberId,
        item: ItemId,
        now: DateTime<Utc>,
    ) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState {
            roles,
            catalog,
            directory,
            ..
        } = &mut *state;
        roles.require_participant(participant)?;
        let entry = catalog.existing(item)?;

        let record = directory
            .record(participant)
            .ok_or_else(|| AccessError::NotEnrolled(participant.clone()))?;
        if record.loan.is_some() {
            return Err(LendingError::HasActiveLoan(participant.clone()));
        }
        if record.on_hold || record.penalty_balance > 0 {
            return Err(LendingError::OnHold(participant.clone()));
        }
        if entry.borrowed {
            return Err(LendingError::AlreadyBorrowed(item));
        }

        let due_at = now + self.policy.lease();
        catalog.set_borrowed(item, true)?;
        if let Some(record) = directory.record_mut(participant) {
            record.loan = Some(Loan {
                item,
                started_at: now,
                due_at,
            });
        }
        info!(member = %participant, item = %item, due = %due_at, "item borrowed");
        Ok(())
    }

    /// Renew the caller's active loan. Rejected once the loan is overdue.
    /// The extension is additive: renewing early keeps the unused time.
    pub fn renew(&self, participant: &MemberId, now: DateTime<Utc>) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState {
            roles, directory, ..
        } = &mut *state;
        roles.require_participant(participant)?;

        let record = directory
            .record_mut(participant)
            .ok_or_else(|| AccessError::NotEnrolled(participant.clone()))?;
        let loan = record
            .loan
            .as_mut()
            .ok_or_else(|| LendingError::NoActiveLoan(participant.clone()))?;
        if now > loan.due_at {
            return Err(LendingError::Overdue(participant.clone()));
        }

        loan.due_at += self.policy.lease();
        debug!(member = %participant, item = %loan.item, due = %loan.due_at, "loan renewed");
        Ok(())
    }

    /// Return the caller's active loan. A late return places a hold and
    /// accrues a penalty per full day of lateness; lateness below one
    /// full day sets the hold with no monetary penalty. The item goes
    /// back on the shelf either way.
    pub fn return_item(
        &self,
        participant: &MemberId,
        now: DateTime<Utc>,
    ) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState {
            roles,
            catalog,
            directory,
            notices,
        } = &mut *state;
        roles.require_participant(participant)?;

        let record = directory
            .record(participant)
            .ok_or_else(|| AccessError::NotEnrolled(participant.clone()))?;
        let loan = record
            .loan
            .clone()
            .ok_or_else(|| LendingError::NoActiveLoan(participant.clone()))?;

        catalog.set_borrowed(loan.item, false)?;
        if let Some(record) = directory.record_mut(participant) {
            record.loan = None;
            if now > loan.due_at {
                record.on_hold = true;
                let overdue_days = (now - loan.due_at).num_days();
                let amount = overdue_days as u64 * self.policy.fine_per_day;
                if amount > 0 {
                    record.penalty_balance += amount;
                    warn!(
                        member = %participant,
                        item = %loan.item,
                        days = overdue_days,
                        amount,
                        "late return, penalty assessed"
                    );
                    notices.push(PenaltyNotice {
                        member: participant.clone(),
                        item: loan.item,
                        amount,
                        assessed_at: now,
                    });
                } else {
                    warn!(member = %participant, item = %loan.item, "late return within one day, hold placed");
                }
            }
        }
        info!(member = %participant, item = %loan.item, "item returned");
        Ok(())
    }

    /// Clear the caller's penalty balance and lift the hold. This is the
    /// only path besides forced unenrollment that lifts a hold.
    pub fn pay_penalty(&self, participant: &MemberId) -> Result<(), LendingError> {
        let mut state = self.write()?;
        let LedgerState {
            roles, directory, ..
        } = &mut *state;
        roles.require_participant(participant)?;

        let record = directory
            .record_mut(participant)
            .ok_or_else(|| AccessError::NotEnrolled(participant.clone()))?;
        if record.penalty_balance == 0 {
            return Err(LendingError::NothingToPay(participant.clone()));
        }

        info!(member = %participant, amount = record.penalty_balance, "penalty paid");
        record.penalty_balance = 0;
        record.on_hold = false;
        Ok(())
    }

    /// Remove and return the penalty notices queued since the last drain.
    pub fn drain_notices(&self) -> Result<Vec<PenaltyNotice>, LendingError> {
        let mut state = self.write()?;
        Ok(std::mem::take(&mut state.notices))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, LedgerState>, LendingError> {
        self.state.read().map_err(|_| LendingError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, LedgerState>, LendingError> {
        self.state.write().map_err(|_| LendingError::LockPoisoned)
    }
}

/// Lending operation failures.
#[derive(Debug, Error)]
pub enum LendingError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("Item is already borrowed: {0}")]
    AlreadyBorrowed(ItemId),

    #[error("Participant is under a hold or owes a penalty: {0}")]
    OnHold(MemberId),

    #[error("Participant already has an active loan: {0}")]
    HasActiveLoan(MemberId),

    #[error("Participant has no active loan: {0}")]
    NoActiveLoan(MemberId),

    #[error("Loan is overdue: {0}")]
    Overdue(MemberId),

    #[error("No outstanding penalty to pay: {0}")]
    NothingToPay(MemberId),

    #[error("Ledger lock poisoned")]
    LockPoisoned,
}
