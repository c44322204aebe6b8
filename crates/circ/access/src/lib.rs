//! Circ Access - the authority layer.
//!
//! One identity maps to at most one role. The administrator is fixed at
//! construction; librarians and participants are granted and revoked by
//! the directory. Every predicate reads the table fresh - nothing is
//! cached between calls.

#![deny(unsafe_code)]

use circ_types::{MemberId, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Role assignments for every known identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleTable {
    administrator: MemberId,
    assignments: HashMap<MemberId, Role>,
}

impl RoleTable {
    /// Create a table with the single, immutable administrator identity.
    pub fn new(administrator: MemberId) -> Self {
        Self {
            administrator,
            assignments: HashMap::new(),
        }
    }

    /// The fixed administrator identity.
    pub fn administrator(&self) -> &MemberId {
        &self.administrator
    }

    /// Resolve the role an identity currently holds, if any.
    pub fn role_of(&self, id: &MemberId) -> Option<Role> {
        if *id == self.administrator {
            return Some(Role::Administrator);
        }
        self.assignments.get(id).copied()
    }

    /// Grant a role. The administrator identity cannot be reassigned.
    pub fn grant(&mut self, id: MemberId, role: Role) {
        if id == self.administrator {
            return;
        }
        self.assignments.insert(id, role);
    }

    /// Revoke whatever role an identity holds. A no-op for unknown
    /// identities and for the administrator.
    pub fn revoke(&mut self, id: &MemberId) {
        self.assignments.remove(id);
    }

    /// Fails unless the caller is the administrator.
    pub fn require_administrator(&self, caller: &MemberId) -> Result<(), AccessError> {
        if *caller == self.administrator {
            Ok(())
        } else {
            Err(AccessError::Unauthorized(caller.clone()))
        }
    }

    /// Fails unless the caller is marked as a librarian.
    pub fn require_librarian(&self, caller: &MemberId) -> Result<(), AccessError> {
        match self.role_of(caller) {
            Some(Role::Librarian) => Ok(()),
            _ => Err(AccessError::Unauthorized(caller.clone())),
        }
    }

    /// Fails unless the caller is the administrator or a librarian.
    pub fn require_staff(&self, caller: &MemberId) -> Result<(), AccessError> {
        match self.role_of(caller) {
            Some(Role::Administrator) | Some(Role::Librarian) => Ok(()),
            _ => Err(AccessError::Unauthorized(caller.clone())),
        }
    }

    /// Fails unless the identity is an enrolled participant.
    pub fn require_participant(&self, id: &MemberId) -> Result<(), AccessError> {
        match self.role_of(id) {
            Some(Role::Participant) => Ok(()),
            _ => Err(AccessError::NotEnrolled(id.clone())),
        }
    }
}

/// Authority check failures.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Unauthorized caller: {0}")]
    Unauthorized(MemberId),

    #[error("Not an enrolled participant: {0}")]
    NotEnrolled(MemberId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoleTable {
        RoleTable::new(MemberId::new("admin"))
    }

    #[test]
    fn administrator_role_is_implicit_and_fixed() {
        let roles = table();
        assert_eq!(
            roles.role_of(&MemberId::new("admin")),
            Some(Role::Administrator)
        );
        assert!(roles.require_administrator(&MemberId::new("admin")).is_ok());
        assert!(matches!(
            roles.require_administrator(&MemberId::new("alice")),
            Err(AccessError::Unauthorized(_))
        ));
    }

    #[test]
    fn grant_cannot_reassign_the_administrator() {
        let mut roles = table();
        roles.grant(MemberId::new("admin"), Role::Participant);
        assert_eq!(
            roles.role_of(&MemberId::new("admin")),
            Some(Role::Administrator)
        );
    }

    #[test]
    fn staff_predicate_accepts_admin_and_librarian_only() {
        let mut roles = table();
        roles.grant(MemberId::new("lib"), Role::Librarian);
        roles.grant(MemberId::new("pat"), Role::Participant);

        assert!(roles.require_staff(&MemberId::new("admin")).is_ok());
        assert!(roles.require_staff(&MemberId::new("lib")).is_ok());
        assert!(roles.require_staff(&MemberId::new("pat")).is_err());
        assert!(roles.require_staff(&MemberId::new("stranger")).is_err());
    }

    #[test]
    fn participant_predicate_reports_not_enrolled() {
        let mut roles = table();
        roles.grant(MemberId::new("lib"), Role::Librarian);

        assert!(matches!(
            roles.require_participant(&MemberId::new("lib")),
            Err(AccessError::NotEnrolled(_))
        ));

        roles.grant(MemberId::new("pat"), Role::Participant);
        assert!(roles.require_participant(&MemberId::new("pat")).is_ok());

        roles.revoke(&MemberId::new("pat"));
        assert!(roles.require_participant(&MemberId::new("pat")).is_err());
    }
}
