use std::collections::{BTreeSet, HashMap};

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};

use crate::entity::{capability, group_capability, role_capability, user, user_capability, user_group};

use super::capability::CapabilityRef;
use super::policy::{BuiltinRole, TEACHER_CAPABILITIES, USERS_MODULE};

/// The parts of a user record the checks look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub user_id: i32,
    pub role: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl From<&user::Model> for Subject {
    fn from(user: &user::Model) -> Self {
        Self {
            user_id: user.id,
            role: user.role.clone(),
            is_active: user.is_active,
            is_superuser: user.is_superuser,
        }
    }
}

impl Subject {
    fn is_privileged(&self) -> bool {
        self.is_superuser || self.role == BuiltinRole::Admin.as_str()
    }

    fn is_teacher(&self) -> bool {
        self.role == BuiltinRole::Teacher.as_str()
    }
}

/// `(module, codename)` pairs from one grant source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantSet(BTreeSet<(String, String)>);

impl GrantSet {
    pub fn contains(&self, cap: CapabilityRef<'_>) -> bool {
        self.0.iter().any(|(module, codename)| cap.matches(module, codename))
    }

    pub fn any_in_module(&self, module: &str) -> bool {
        self.0.iter().any(|(m, _)| m == module)
    }

    fn qualified(&self) -> impl Iterator<Item = String> + '_ {
        self.0.iter().map(|(m, c)| format!("{m}.{c}"))
    }
}

impl<M: Into<String>, C: Into<String>> FromIterator<(M, C)> for GrantSet {
    fn from_iter<I: IntoIterator<Item = (M, C)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(m, c)| (m.into(), c.into())).collect())
    }
}

/// Everything needed to answer capability questions for one request.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    subject: Option<Subject>,
    direct: GrantSet,
    group: GrantSet,
    role: GrantSet,
}

impl AccessContext {
    /// A caller with no account. Every check fails.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(subject: Subject, direct: GrantSet, group: GrantSet, role: GrantSet) -> Self {
        Self {
            subject: Some(subject),
            direct,
            group,
            role,
        }
    }

    /// Load the direct, group-derived and role-derived grants of `user`.
    pub async fn load<C: ConnectionTrait>(conn: &C, user: &user::Model) -> Result<Self, DbErr> {
        let direct_ids: Vec<i32> = user_capability::Entity::find()
            .filter(user_capability::Column::UserId.eq(user.id))
            .all(conn)
            .await?
            .into_iter()
            .map(|uc| uc.capability_id)
            .collect();

        let group_ids: Vec<i32> = user_group::Entity::find()
            .filter(user_group::Column::UserId.eq(user.id))
            .all(conn)
            .await?
            .into_iter()
            .map(|ug| ug.group_id)
            .collect();
        let group_cap_ids: Vec<i32> = if group_ids.is_empty() {
            Vec::new()
        } else {
            group_capability::Entity::find()
                .filter(group_capability::Column::GroupId.is_in(group_ids))
                .all(conn)
                .await?
                .into_iter()
                .map(|gc| gc.capability_id)
                .collect()
        };

        let role_cap_ids: Vec<i32> = match user.role_id {
            Some(role_id) => role_capability::Entity::find()
                .filter(role_capability::Column::RoleId.eq(role_id))
                .all(conn)
                .await?
                .into_iter()
                .map(|rc| rc.capability_id)
                .collect(),
            None => Vec::new(),
        };

        let wanted: BTreeSet<i32> = direct_ids
            .iter()
            .chain(&group_cap_ids)
            .chain(&role_cap_ids)
            .copied()
            .collect();
        let catalogue: HashMap<i32, capability::Model> = if wanted.is_empty() {
            HashMap::new()
        } else {
            capability::Entity::find()
                .filter(capability::Column::Id.is_in(wanted))
                .all(conn)
                .await?
                .into_iter()
                .map(|c| (c.id, c))
                .collect()
        };

        let collect = |ids: &[i32]| -> GrantSet {
            ids.iter()
                .filter_map(|id| catalogue.get(id))
                .map(|c| (c.module.clone(), c.codename.clone()))
                .collect()
        };

        Ok(Self::new(
            Subject::from(user),
            collect(&direct_ids),
            collect(&group_cap_ids),
            collect(&role_cap_ids),
        ))
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    /// Whether the caller holds `capability` (`module.codename` or a bare
    /// codename).
    pub fn has_capability(&self, capability: &str) -> bool {
        let Some(subject) = &self.subject else {
            return false;
        };
        if subject.is_privileged() {
            return true;
        }
        if !subject.is_active {
            return false;
        }

        let cap = CapabilityRef::parse(capability);
        self.direct.contains(cap)
            || self.group.contains(cap)
            || self.role.contains(cap)
            || (subject.is_teacher()
                && cap.module.is_none_or(|m| m == USERS_MODULE)
                && TEACHER_CAPABILITIES.contains(&cap.codename))
    }

    /// Whether the caller holds any capability scoped to `module`.
    pub fn has_module_access(&self, module: &str) -> bool {
        let Some(subject) = &self.subject else {
            return false;
        };
        if subject.is_privileged() {
            return true;
        }
        if !subject.is_active {
            return false;
        }
        if module == USERS_MODULE && subject.is_teacher() {
            return true;
        }

        self.direct.any_in_module(module)
            || self.group.any_in_module(module)
            || self.role.any_in_module(module)
    }

    /// Sorted `module.codename` list of everything the caller holds through
    /// stored grants and the teacher fallback table.
    pub fn effective_capabilities(&self) -> Vec<String> {
        let Some(subject) = &self.subject else {
            return Vec::new();
        };

        let mut all: BTreeSet<String> = self
            .direct
            .qualified()
            .chain(self.group.qualified())
            .chain(self.role.qualified())
            .collect();
        if subject.is_teacher() {
            all.extend(
                TEACHER_CAPABILITIES
                    .iter()
                    .map(|c| format!("{USERS_MODULE}.{c}")),
            );
        }
        all.into_iter().collect()
    }
}
