//! Authorization policy
//!
//! Every permission decision in the service goes through [`Access`], built
//! once per request from the caller's role assignments:
//!
//! - `SUPER_ADMIN` (global) manages every community.
//! - `COMMUNITY_ADMIN` manages the community it is scoped to and all of its
//!   descendant branches.
//! - Internal community data (member lists, minutes, donations) is visible to
//!   managers and to ACTIVE members of that community.
//!
//! Checks take a *lineage*: the community id followed by its ancestors, nearest
//! first, as returned by the service's recursive ancestor query.

use crate::db::models::{MembershipStatus, Role, RoleAssignment};
use crate::{Error, Result};
use std::collections::HashSet;
use uuid::Uuid;

/// Effective permissions of one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub member_id: Uuid,
    pub super_admin: bool,
    /// Communities with a direct COMMUNITY_ADMIN assignment
    pub admin_of: HashSet<Uuid>,
}

impl Access {
    /// Access with no elevated roles
    pub fn member(member_id: Uuid) -> Self {
        Self {
            member_id,
            super_admin: false,
            admin_of: HashSet::new(),
        }
    }

    /// Fold a member's role assignments into an `Access`
    ///
    /// Assignments belonging to other members are ignored.
    pub fn from_assignments(member_id: Uuid, assignments: &[RoleAssignment]) -> Self {
        let mut access = Self::member(member_id);
        for assignment in assignments.iter().filter(|a| a.member_id == member_id) {
            match (assignment.role, assignment.community_id) {
                (Role::SuperAdmin, _) => access.super_admin = true,
                (Role::CommunityAdmin, Some(community_id)) => {
                    access.admin_of.insert(community_id);
                }
                (Role::CommunityAdmin, None) => {}
            }
        }
        access
    }

    pub fn is_super_admin(&self) -> bool {
        self.super_admin
    }

    /// True when the member may administer the first community in `lineage`
    pub fn can_manage(&self, lineage: &[Uuid]) -> bool {
        self.super_admin || lineage.iter().any(|id| self.admin_of.contains(id))
    }

    /// True when the member holds a COMMUNITY_ADMIN role on exactly this community
    pub fn is_direct_admin(&self, community_id: Uuid) -> bool {
        self.admin_of.contains(&community_id)
    }

    /// Member lists, minutes and donations: managers and ACTIVE members
    pub fn can_view_internals(
        &self,
        lineage: &[Uuid],
        membership: Option<MembershipStatus>,
    ) -> bool {
        membership == Some(MembershipStatus::Active) || self.can_manage(lineage)
    }

    pub fn require_manage(&self, lineage: &[Uuid]) -> Result<()> {
        if self.can_manage(lineage) {
            Ok(())
        } else {
            Err(Error::Forbidden(
                "Community admin role required for this community".to_string(),
            ))
        }
    }

    pub fn require_super_admin(&self) -> Result<()> {
        if self.super_admin {
            Ok(())
        } else {
            Err(Error::Forbidden("Super admin role required".to_string()))
        }
    }

    pub fn require_view_internals(
        &self,
        lineage: &[Uuid],
        membership: Option<MembershipStatus>,
    ) -> Result<()> {
        if self.can_view_internals(lineage, membership) {
            Ok(())
        } else {
            Err(Error::Forbidden(
                "Active membership required to view this community's records".to_string(),
            ))
        }
    }

    /// Owner of a resource, or a super admin
    pub fn require_owner_or_super_admin(&self, owner_id: Uuid) -> Result<()> {
        if self.super_admin || self.member_id == owner_id {
            Ok(())
        } else {
            Err(Error::Forbidden("Only the owner may change this listing".to_string()))
        }
    }
}
