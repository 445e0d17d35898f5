//! Explicit role transitions.
//!
//! Each public method is one transaction. Users are pointed at roles via
//! [`PermissionEngine::attach_role`], which writes the name and reference
//! together, so nothing needs to observe the write afterwards.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionSession, TransactionTrait,
};
use tracing::{info, instrument, warn};

use crate::entity::{role, role_capability, user};

use super::capability;
use super::engine::{BuiltinRoles, PermissionEngine};
use super::error::RbacError;
use super::policy::{self, DEFAULT_ROLE};

/// Fields for a new account. `password_hash` is stored as given.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Defaults to `student`.
    pub role: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// A requested role change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleChange {
    Name(String),
    Reference(i32),
    /// Both columns were written, as in a full-record update. A changed name
    /// wins; otherwise a changed reference applies.
    Both { name: String, reference: i32 },
}

/// What a [`RoleChange`] resolves to against the stored row.
enum Resolution {
    /// Move the user to the named role.
    Move(String),
    /// Nothing requested differs; pin both columns to this pair.
    Keep(String, Option<role::Model>),
}

#[derive(Debug, Clone)]
pub struct RoleChangeOutcome {
    pub user: user::Model,
    /// `false` when the request matched the persisted role and both columns
    /// already agreed.
    pub changed: bool,
    /// Whether a built-in policy was applied.
    pub policy_applied: bool,
}

#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub role: role::Model,
    pub capability_ids: Vec<i32>,
    pub users_updated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleStatistics {
    pub role: String,
    /// Users whose `role_id` points at the role.
    pub by_reference: u64,
    /// Users whose `role` name equals the role's name.
    pub by_name: u64,
}

#[derive(Debug, Clone)]
pub struct InitRolesReport {
    pub roles: Vec<(role::Model, usize)>,
    pub users_updated: usize,
    pub users_total: usize,
    pub failures: usize,
}

#[derive(Debug, Clone)]
pub struct SyncRolesReport {
    pub roles: BuiltinRoles,
    pub users_updated: usize,
    pub users_total: usize,
}

pub struct RoleSync<'a, C: ConnectionTrait + TransactionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait + TransactionTrait> RoleSync<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Insert a user and grant the defaults for its initial role.
    #[instrument(skip(self, new_user), fields(username = %new_user.username))]
    pub async fn create_user(&self, new_user: NewUser) -> Result<user::Model, RbacError> {
        let txn = self.conn.begin().await?;

        let username = new_user.username.clone();
        let role_name = new_user
            .role
            .unwrap_or_else(|| DEFAULT_ROLE.as_str().to_string());

        let model = user::ActiveModel {
            username: Set(new_user.username),
            password: Set(new_user.password_hash),
            email: Set(new_user.email),
            first_name: Set(new_user.first_name),
            last_name: Set(new_user.last_name),
            is_active: Set(true),
            is_staff: Set(new_user.is_staff),
            is_superuser: Set(new_user.is_superuser),
            role: Set(role_name),
            role_id: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let mut user = model.insert(&txn).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => RbacError::UsernameTaken(username),
            _ => RbacError::from(e),
        })?;

        PermissionEngine::new(&txn)
            .assign_role_permissions(&mut user, None)
            .await?;

        txn.commit().await?;

        info!(user_id = user.id, role = %user.role, "Created user");
        Ok(user)
    }

    /// Move a user to another role and re-apply grants.
    ///
    /// An unknown custom name is accepted: the reference is cleared and the
    /// user's grants are left as they were.
    #[instrument(skip(self))]
    pub async fn change_user_role(
        &self,
        user_id: i32,
        change: RoleChange,
    ) -> Result<RoleChangeOutcome, RbacError> {
        let txn = self.conn.begin().await?;
        let engine = PermissionEngine::new(&txn);

        let mut user = user::Entity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or(RbacError::UserNotFound(user_id))?;

        let new_name = match resolve_change(&engine, &user, change).await? {
            Resolution::Move(name) => name,
            Resolution::Keep(name, role) => {
                let before = (user.role.clone(), user.role_id);
                engine.attach_role(&mut user, &name, role.as_ref()).await?;
                let repaired = before != (user.role.clone(), user.role_id);
                txn.commit().await?;

                if repaired {
                    info!(user_id, role = %user.role, role_id = ?user.role_id, "Repaired role columns");
                }
                return Ok(RoleChangeOutcome {
                    user,
                    changed: repaired,
                    policy_applied: false,
                });
            }
        };

        let previous = user.role.clone();
        let policy_applied = engine
            .assign_role_permissions(&mut user, Some(&new_name))
            .await?;

        txn.commit().await?;

        info!(user_id, from = %previous, to = %user.role, policy_applied, "Changed user role");
        Ok(RoleChangeOutcome {
            user,
            changed: true,
            policy_applied,
        })
    }

    /// Create a role and attach every user already carrying its name.
    #[instrument(skip(self, description, capability_ids))]
    pub async fn create_role(
        &self,
        name: &str,
        description: Option<String>,
        capability_ids: &[i32],
    ) -> Result<CascadeReport, RbacError> {
        let txn = self.conn.begin().await?;
        let engine = PermissionEngine::new(&txn);

        if engine.find_role_by_name(name).await?.is_some() {
            return Err(RbacError::DuplicateRole(name.to_string()));
        }
        capability::find_by_ids(&txn, capability_ids).await?;

        let role = role::ActiveModel {
            name: Set(name.to_string()),
            description: Set(description.unwrap_or_else(|| policy::describe(name))),
            policy_version: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => RbacError::DuplicateRole(name.to_string()),
            _ => RbacError::from(e),
        })?;

        engine.set_role_capabilities(role.id, capability_ids).await?;
        let report = cascade(&engine, &txn, role).await?;

        txn.commit().await?;
        Ok(report)
    }

    /// Replace a role's capability set and push it to every associated user,
    /// whether associated by reference or only by name.
    ///
    /// The role is marked as hand-edited (`policy_version = NULL`) so a later
    /// built-in resync reports that it overrode the edit.
    #[instrument(skip(self, capability_ids))]
    pub async fn update_role_capabilities(
        &self,
        role_id: i32,
        capability_ids: &[i32],
    ) -> Result<CascadeReport, RbacError> {
        let txn = self.conn.begin().await?;
        let engine = PermissionEngine::new(&txn);

        let mut role = engine
            .find_role(role_id)
            .await?
            .ok_or_else(|| RbacError::RoleNotFound(role_id.to_string()))?;
        capability::find_by_ids(&txn, capability_ids).await?;

        engine.set_role_capabilities(role.id, capability_ids).await?;
        if role.policy_version.is_some() {
            role = role::ActiveModel {
                id: Set(role.id),
                policy_version: Set(None),
                ..Default::default()
            }
            .update(&txn)
            .await?;
        }

        let report = cascade(&engine, &txn, role).await?;

        txn.commit().await?;
        Ok(report)
    }

    /// Delete a role. Referencing users keep their name but lose the
    /// reference; no user is deleted. Returns the number of users detached.
    #[instrument(skip(self))]
    pub async fn delete_role(&self, role_id: i32) -> Result<u64, RbacError> {
        let txn = self.conn.begin().await?;

        let role = role::Entity::find_by_id(role_id)
            .one(&txn)
            .await?
            .ok_or_else(|| RbacError::RoleNotFound(role_id.to_string()))?;

        let detached = user::Entity::update_many()
            .col_expr(user::Column::RoleId, Expr::value(Option::<i32>::None))
            .filter(user::Column::RoleId.eq(role.id))
            .exec(&txn)
            .await?
            .rows_affected;

        role_capability::Entity::delete_many()
            .filter(role_capability::Column::RoleId.eq(role.id))
            .exec(&txn)
            .await?;
        role::Entity::delete_by_id(role.id).exec(&txn).await?;

        txn.commit().await?;

        info!(role = %role.name, detached, "Deleted role");
        Ok(detached)
    }

    /// Repair one user's name/reference drift. Returns whether it changed.
    pub async fn repair_user(&self, user_id: i32) -> Result<bool, RbacError> {
        let txn = self.conn.begin().await?;
        let engine = PermissionEngine::new(&txn);

        let mut user = user::Entity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or(RbacError::UserNotFound(user_id))?;
        let index = RoleIndex::load(&txn).await?;

        let repaired = repair(&engine, &index, &mut user).await?;
        txn.commit().await?;
        Ok(repaired)
    }

    /// Repair every user. Returns the number of users changed.
    #[instrument(skip(self))]
    pub async fn sync_users_role_objects(&self) -> Result<usize, RbacError> {
        let txn = self.conn.begin().await?;
        let updated = reconcile_all(&PermissionEngine::new(&txn), &txn).await?.0;
        txn.commit().await?;

        info!(updated, "Reconciled user role references");
        Ok(updated)
    }

    /// Recreate the built-in roles, then reconcile every user.
    #[instrument(skip(self))]
    pub async fn sync_roles(&self) -> Result<SyncRolesReport, RbacError> {
        let txn = self.conn.begin().await?;
        let engine = PermissionEngine::new(&txn);

        let roles = engine.sync_role_permissions().await?;
        let (users_updated, users_total) = reconcile_all(&engine, &txn).await?;

        txn.commit().await?;

        info!(users_updated, users_total, "Synchronized roles");
        Ok(SyncRolesReport {
            roles,
            users_updated,
            users_total,
        })
    }

    /// Recreate the built-in roles and re-apply role grants to users.
    ///
    /// Without `force`, only users holding no direct grants are touched.
    /// A failing user is logged and skipped; the others still commit.
    #[instrument(skip(self))]
    pub async fn init_roles(&self, force: bool) -> Result<InitRolesReport, RbacError> {
        let txn = self.conn.begin().await?;
        let engine = PermissionEngine::new(&txn);

        let builtins = engine.sync_role_permissions().await?;
        let mut roles = Vec::with_capacity(3);
        for role in builtins.iter() {
            let count = engine.role_capability_ids(role.id).await?.len();
            roles.push((role.clone(), count));
        }

        let users = user::Entity::find()
            .order_by_asc(user::Column::Id)
            .all(&txn)
            .await?;
        let users_total = users.len();
        let mut users_updated = 0;
        let mut failures = 0;

        for mut user in users {
            if !force && !engine.user_capability_ids(user.id).await?.is_empty() {
                continue;
            }

            let savepoint = txn.begin().await?;
            match PermissionEngine::new(&savepoint)
                .assign_role_permissions(&mut user, None)
                .await
            {
                Ok(applied) => {
                    savepoint.commit().await?;
                    if applied {
                        users_updated += 1;
                    }
                }
                Err(e) => {
                    warn!(user_id = user.id, error = %e, "Failed to assign role capabilities");
                    savepoint.rollback().await?;
                    failures += 1;
                }
            }
        }

        txn.commit().await?;

        Ok(InitRolesReport {
            roles,
            users_updated,
            users_total,
            failures,
        })
    }

    /// Per-role counts of users linked by reference and by name.
    pub async fn role_statistics(&self) -> Result<Vec<RoleStatistics>, RbacError> {
        let roles = role::Entity::find()
            .order_by_asc(role::Column::Name)
            .all(self.conn)
            .await?;

        let mut stats = Vec::with_capacity(roles.len());
        for role in roles {
            let by_reference = user::Entity::find()
                .filter(user::Column::RoleId.eq(role.id))
                .count(self.conn)
                .await?;
            let by_name = user::Entity::find()
                .filter(user::Column::Role.eq(&role.name))
                .count(self.conn)
                .await?;
            stats.push(RoleStatistics {
                role: role.name,
                by_reference,
                by_name,
            });
        }
        Ok(stats)
    }
}

async fn resolve_change<T: ConnectionTrait>(
    engine: &PermissionEngine<'_, T>,
    user: &user::Model,
    change: RoleChange,
) -> Result<Resolution, RbacError> {
    match change {
        RoleChange::Name(name) => resolve_name(engine, user, name).await,
        RoleChange::Reference(role_id) => resolve_reference(engine, user, role_id).await,
        RoleChange::Both { name, reference } => {
            if name == user.role && user.role_id != Some(reference) {
                resolve_reference(engine, user, reference).await
            } else {
                resolve_name(engine, user, name).await
            }
        }
    }
}

async fn resolve_name<T: ConnectionTrait>(
    engine: &PermissionEngine<'_, T>,
    user: &user::Model,
    name: String,
) -> Result<Resolution, RbacError> {
    if name != user.role {
        return Ok(Resolution::Move(name));
    }
    let role = engine.find_role_by_name(&name).await?;
    Ok(Resolution::Keep(name, role))
}

async fn resolve_reference<T: ConnectionTrait>(
    engine: &PermissionEngine<'_, T>,
    user: &user::Model,
    role_id: i32,
) -> Result<Resolution, RbacError> {
    let role = engine
        .find_role(role_id)
        .await?
        .ok_or_else(|| RbacError::RoleNotFound(role_id.to_string()))?;
    if user.role_id != Some(role.id) {
        return Ok(Resolution::Move(role.name));
    }
    Ok(Resolution::Keep(role.name.clone(), Some(role)))
}

/// Point every user associated with `role` at it and materialize the role's
/// stored set as their direct grants.
async fn cascade<T: ConnectionTrait>(
    engine: &PermissionEngine<'_, T>,
    conn: &T,
    role: role::Model,
) -> Result<CascadeReport, RbacError> {
    let capability_ids = engine.role_capability_ids(role.id).await?;

    let users = user::Entity::find()
        .filter(
            Condition::any()
                .add(user::Column::Role.eq(&role.name))
                .add(user::Column::RoleId.eq(role.id)),
        )
        .all(conn)
        .await?;

    let users_updated = users.len();
    for mut user in users {
        engine.attach_role(&mut user, &role.name, Some(&role)).await?;
        engine.set_user_capabilities(user.id, &capability_ids).await?;
    }

    info!(role = %role.name, users_updated, "Propagated role capabilities");
    Ok(CascadeReport {
        role,
        capability_ids,
        users_updated,
    })
}

/// Returns `(updated, total)`.
async fn reconcile_all<T: ConnectionTrait>(
    engine: &PermissionEngine<'_, T>,
    conn: &T,
) -> Result<(usize, usize), RbacError> {
    let index = RoleIndex::load(conn).await?;
    let users = user::Entity::find()
        .order_by_asc(user::Column::Id)
        .all(conn)
        .await?;

    let total = users.len();
    let mut updated = 0;
    for mut user in users {
        if repair(engine, &index, &mut user).await? {
            updated += 1;
        }
    }
    Ok((updated, total))
}

/// Roles keyed both ways, loaded once per reconciliation pass.
struct RoleIndex {
    by_id: HashMap<i32, role::Model>,
    by_name: HashMap<String, i32>,
}

impl RoleIndex {
    async fn load<T: ConnectionTrait>(conn: &T) -> Result<Self, RbacError> {
        let roles = role::Entity::find().all(conn).await?;
        let by_name = roles.iter().map(|r| (r.name.clone(), r.id)).collect();
        let by_id = roles.into_iter().map(|r| (r.id, r)).collect();
        Ok(Self { by_id, by_name })
    }

    fn named(&self, name: &str) -> Option<&role::Model> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }
}

async fn repair<T: ConnectionTrait>(
    engine: &PermissionEngine<'_, T>,
    index: &RoleIndex,
    user: &mut user::Model,
) -> Result<bool, RbacError> {
    match user.role_id {
        None => {
            if user.role.is_empty() {
                return Ok(false);
            }
            let Some(role) = index.named(&user.role) else {
                return Ok(false);
            };
            engine.attach_role(user, &role.name, Some(role)).await?;
        }
        Some(role_id) => match index.by_id.get(&role_id) {
            Some(role) if role.name == user.role => return Ok(false),
            Some(role) => engine.attach_role(user, &role.name, Some(role)).await?,
            None => {
                let name = user.role.clone();
                engine.attach_role(user, &name, None).await?;
            }
        },
    }
    Ok(true)
}
