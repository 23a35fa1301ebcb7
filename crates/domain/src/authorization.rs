//! Request-time authorization decision procedure.
//!
//! Everything in this module is pure: the caller resolves the actor's
//! permissions beforehand and the functions never perform I/O.

use std::collections::BTreeSet;

use rolegate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::permission::PermissionName;
use crate::role::RoleName;
use crate::user::UserId;

/// How the named permissions of a requirement combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementMode {
    /// Every named permission is required.
    #[default]
    All,
    /// At least one named permission is required.
    Any,
}

impl RequirementMode {
    /// Returns a stable transport value for this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
        }
    }
}

/// Permission requirement attached to a protected operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequirement {
    permissions: Vec<PermissionName>,
    mode: RequirementMode,
    allow_admin: bool,
}

impl PermissionRequirement {
    /// Creates a requirement. Duplicate names are collapsed, order is kept.
    pub fn new(permissions: Vec<PermissionName>, mode: RequirementMode) -> AppResult<Self> {
        let mut unique = Vec::with_capacity(permissions.len());
        for permission in permissions {
            if !unique.contains(&permission) {
                unique.push(permission);
            }
        }

        if unique.is_empty() {
            return Err(AppError::Validation(
                "permission requirement must name at least one permission".to_owned(),
            ));
        }

        Ok(Self {
            permissions: unique,
            mode,
            allow_admin: true,
        })
    }

    /// Parses permission names and builds a requirement.
    pub fn parse<I, S>(permissions: I, mode: RequirementMode) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let permissions = permissions
            .into_iter()
            .map(PermissionName::new)
            .collect::<AppResult<Vec<_>>>()?;
        Self::new(permissions, mode)
    }

    /// Requirement satisfied by holding one specific permission.
    #[must_use]
    pub fn single(permission: PermissionName) -> Self {
        Self {
            permissions: vec![permission],
            mode: RequirementMode::All,
            allow_admin: true,
        }
    }

    /// Disables the administrator bypass for sensitive operations.
    #[must_use]
    pub fn without_admin_bypass(mut self) -> Self {
        self.allow_admin = false;
        self
    }

    /// Sets the administrator bypass flag.
    #[must_use]
    pub fn with_admin_bypass(mut self, allow_admin: bool) -> Self {
        self.allow_admin = allow_admin;
        self
    }

    /// Returns the named permissions.
    #[must_use]
    pub fn permissions(&self) -> &[PermissionName] {
        &self.permissions
    }

    /// Returns the combinator.
    #[must_use]
    pub fn mode(&self) -> RequirementMode {
        self.mode
    }

    /// Returns whether administrators pass unconditionally.
    #[must_use]
    pub fn allows_admin(&self) -> bool {
        self.allow_admin
    }
}

/// Permission set an actor currently holds through their bound role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPermissions {
    user_id: UserId,
    role_name: RoleName,
    permissions: BTreeSet<PermissionName>,
    is_admin: bool,
}

impl ResolvedPermissions {
    /// Creates a resolved permission set.
    #[must_use]
    pub fn new(
        user_id: UserId,
        role_name: RoleName,
        permissions: impl IntoIterator<Item = PermissionName>,
        is_admin: bool,
    ) -> Self {
        Self {
            user_id,
            role_name,
            permissions: permissions.into_iter().collect(),
            is_admin,
        }
    }

    /// Returns the actor id.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the role the permissions were resolved from.
    #[must_use]
    pub fn role_name(&self) -> &RoleName {
        &self.role_name
    }

    /// Returns the resolved permissions in name order.
    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<PermissionName> {
        &self.permissions
    }

    /// Returns whether the actor is bound to the administrator role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Returns whether the actor explicitly holds `permission`.
    #[must_use]
    pub fn holds(&self, permission: &PermissionName) -> bool {
        self.permissions.contains(permission)
    }
}

/// Why an authorization check passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowBasis {
    /// Administrator bypass applied.
    AdministratorBypass,
    /// The actor holds the required permissions.
    Granted,
}

/// Why an authorization check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Named permissions the actor lacks. For `ANY` every named permission.
    MissingPermissions(Vec<PermissionName>),
    /// The actor holds the permission but does not own the resource.
    NotOwner,
}

impl DenyReason {
    /// Returns the machine-readable reason, for example `missing:projects.view`.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::MissingPermissions(missing) => format!(
                "missing:{}",
                missing
                    .iter()
                    .map(PermissionName::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Self::NotOwner => "not-owner".to_owned(),
        }
    }
}

/// Outcome of one authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The operation may proceed.
    Allow(AllowBasis),
    /// The operation is refused.
    Deny(DenyReason),
}

impl Decision {
    /// Returns whether the decision allows the operation.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    /// Converts a deny into a `Forbidden` error carrying the reason code.
    pub fn into_result(self) -> AppResult<AllowBasis> {
        match self {
            Self::Allow(basis) => Ok(basis),
            Self::Deny(reason) => Err(AppError::Forbidden(reason.code())),
        }
    }
}

/// Evaluates `requirement` against the actor's resolved permissions.
#[must_use]
pub fn authorize(actor: &ResolvedPermissions, requirement: &PermissionRequirement) -> Decision {
    if requirement.allow_admin && actor.is_admin {
        return Decision::Allow(AllowBasis::AdministratorBypass);
    }

    match requirement.mode {
        RequirementMode::All => {
            let missing: Vec<PermissionName> = requirement
                .permissions
                .iter()
                .filter(|permission| !actor.holds(permission))
                .cloned()
                .collect();

            if missing.is_empty() {
                Decision::Allow(AllowBasis::Granted)
            } else {
                Decision::Deny(DenyReason::MissingPermissions(missing))
            }
        }
        RequirementMode::Any => {
            if requirement
                .permissions
                .iter()
                .any(|permission| actor.holds(permission))
            {
                Decision::Allow(AllowBasis::Granted)
            } else {
                Decision::Deny(DenyReason::MissingPermissions(
                    requirement.permissions.clone(),
                ))
            }
        }
    }
}

/// Evaluates `requirement` and then narrows it to resources the actor owns.
///
/// Ownership is only consulted after the permission check passed on its own
/// grants. An administrator bypass also skips the ownership predicate.
#[must_use]
pub fn authorize_with_ownership<F>(
    actor: &ResolvedPermissions,
    requirement: &PermissionRequirement,
    is_owner: F,
) -> Decision
where
    F: FnOnce(&UserId) -> bool,
{
    match authorize(actor, requirement) {
        Decision::Allow(AllowBasis::Granted) => {
            if is_owner(&actor.user_id) {
                Decision::Allow(AllowBasis::Granted)
            } else {
                Decision::Deny(DenyReason::NotOwner)
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        AllowBasis, Decision, DenyReason, PermissionRequirement, RequirementMode,
        ResolvedPermissions, authorize, authorize_with_ownership,
    };
    use crate::{PermissionName, RoleName, UserId};

    fn name(value: &str) -> PermissionName {
        match PermissionName::new(value) {
            Ok(name) => name,
            Err(error) => panic!("invalid test permission '{value}': {error}"),
        }
    }

    fn actor(permissions: &[&str], is_admin: bool) -> ResolvedPermissions {
        let role = if is_admin { "admin" } else { "user" };
        let Ok(role_name) = RoleName::new(role) else {
            panic!("valid role name rejected");
        };
        ResolvedPermissions::new(
            UserId::new(),
            role_name,
            permissions.iter().map(|value| name(value)),
            is_admin,
        )
    }

    fn requirement(permissions: &[&str], mode: RequirementMode) -> PermissionRequirement {
        match PermissionRequirement::parse(permissions.iter().copied(), mode) {
            Ok(requirement) => requirement,
            Err(error) => panic!("invalid test requirement: {error}"),
        }
    }

    #[test]
    fn all_mode_denies_citing_only_missing_permission() {
        let actor = actor(&["projects.view", "projects.create"], false);
        let decision = authorize(
            &actor,
            &requirement(&["projects.view", "projects.delete"], RequirementMode::All),
        );

        assert_eq!(
            decision,
            Decision::Deny(DenyReason::MissingPermissions(vec![name("projects.delete")]))
        );
        if let Decision::Deny(reason) = decision {
            assert_eq!(reason.code(), "missing:projects.delete");
        }
    }

    #[test]
    fn any_mode_allows_with_one_held_permission() {
        let actor = actor(&["projects.view", "projects.create"], false);
        let decision = authorize(
            &actor,
            &requirement(&["projects.view", "projects.delete"], RequirementMode::Any),
        );

        assert_eq!(decision, Decision::Allow(AllowBasis::Granted));
    }

    #[test]
    fn any_mode_deny_lists_every_named_permission() {
        let actor = actor(&[], false);
        let decision = authorize(
            &actor,
            &requirement(&["invoices.send", "invoices.export"], RequirementMode::Any),
        );

        let Decision::Deny(reason) = decision else {
            panic!("expected deny");
        };
        assert_eq!(reason.code(), "missing:invoices.send,invoices.export");
    }

    #[test]
    fn admin_bypass_can_be_disabled() {
        let admin = actor(&[], true);
        let sensitive = requirement(&["projects.delete"], RequirementMode::All);

        assert_eq!(
            authorize(&admin, &sensitive),
            Decision::Allow(AllowBasis::AdministratorBypass)
        );
        assert!(!authorize(&admin, &sensitive.without_admin_bypass()).is_allowed());
    }

    #[test]
    fn ownership_never_substitutes_for_missing_permission() {
        let actor = actor(&["lab_session.record.view"], false);
        let update = requirement(&["lab_session.record.update"], RequirementMode::All);

        let decision = authorize_with_ownership(&actor, &update, |_| true);
        assert!(matches!(
            decision,
            Decision::Deny(DenyReason::MissingPermissions(_))
        ));
    }

    #[test]
    fn ownership_narrows_granted_permission() {
        let actor = actor(&["lab_session.record.update"], false);
        let update = requirement(&["lab_session.record.update"], RequirementMode::All);
        let owner = actor.user_id();

        assert!(authorize_with_ownership(&actor, &update, |user_id| *user_id == owner).is_allowed());
        assert_eq!(
            authorize_with_ownership(&actor, &update, |user_id| *user_id != owner),
            Decision::Deny(DenyReason::NotOwner)
        );
    }

    #[test]
    fn empty_requirement_is_rejected() {
        let result = PermissionRequirement::parse(Vec::<String>::new(), RequirementMode::All);
        assert!(result.is_err());
    }

    #[test]
    fn deny_converts_to_forbidden_error() {
        let actor = actor(&[], false);
        let result = authorize(
            &actor,
            &requirement(&["billing.invoice.create"], RequirementMode::All),
        )
        .into_result();

        assert!(matches!(
            result,
            Err(rolegate_core::AppError::Forbidden(message)) if message == "missing:billing.invoice.create"
        ));
    }

    const POOL: [&str; 6] = [
        "projects.view",
        "projects.create",
        "invoices.send",
        "invoices.export",
        "reports.generate",
        "lab_session.record.update",
    ];

    proptest! {
        #[test]
        fn all_and_any_match_set_semantics(
            held in proptest::sample::subsequence(POOL.to_vec(), 0..=POOL.len()),
            required in proptest::sample::subsequence(POOL.to_vec(), 1..=POOL.len()),
        ) {
            let actor = actor(&held, false);
            let holds_all = required.iter().all(|value| held.contains(value));
            let holds_any = required.iter().any(|value| held.contains(value));

            prop_assert_eq!(
                authorize(&actor, &requirement(&required, RequirementMode::All)).is_allowed(),
                holds_all
            );
            prop_assert_eq!(
                authorize(&actor, &requirement(&required, RequirementMode::Any)).is_allowed(),
                holds_any
            );
        }

        #[test]
        fn admin_without_bypass_is_evaluated_like_anyone_else(
            held in proptest::sample::subsequence(POOL.to_vec(), 0..=POOL.len()),
            required in proptest::sample::subsequence(POOL.to_vec(), 1..=POOL.len()),
        ) {
            let admin = actor(&held, true);
            let regular = actor(&held, false);
            let strict = requirement(&required, RequirementMode::All).without_admin_bypass();

            prop_assert!(authorize(&admin, &requirement(&required, RequirementMode::All)).is_allowed());
            prop_assert_eq!(
                authorize(&admin, &strict).is_allowed(),
                authorize(&regular, &strict).is_allowed()
            );
        }
    }
}
