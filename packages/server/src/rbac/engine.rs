use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use tracing::{debug, info, instrument, warn};

use crate::entity::{role, role_capability, user, user_capability};

use super::capability;
use super::policy::{self, BuiltinRole, POLICY_VERSION};

/// The three built-in roles, as returned by
/// [`PermissionEngine::sync_role_permissions`].
#[derive(Debug, Clone)]
pub struct BuiltinRoles {
    pub admin: role::Model,
    pub teacher: role::Model,
    pub student: role::Model,
}

impl BuiltinRoles {
    pub fn iter(&self) -> impl Iterator<Item = &role::Model> {
        [&self.admin, &self.teacher, &self.student].into_iter()
    }
}

/// Computes and materializes capability sets.
///
/// All collection writes replace the whole set, so applying the same
/// assignment twice leaves the same rows behind.
pub struct PermissionEngine<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> PermissionEngine<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find_role(&self, id: i32) -> Result<Option<role::Model>, DbErr> {
        role::Entity::find_by_id(id).one(self.conn).await
    }

    pub async fn find_role_by_name(&self, name: &str) -> Result<Option<role::Model>, DbErr> {
        role::Entity::find()
            .filter(role::Column::Name.eq(name))
            .one(self.conn)
            .await
    }

    /// Capability ids stored on a role, sorted.
    pub async fn role_capability_ids(&self, role_id: i32) -> Result<Vec<i32>, DbErr> {
        let mut ids: Vec<i32> = role_capability::Entity::find()
            .filter(role_capability::Column::RoleId.eq(role_id))
            .all(self.conn)
            .await?
            .into_iter()
            .map(|rc| rc.capability_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Capability ids granted directly to a user, sorted.
    pub async fn user_capability_ids(&self, user_id: i32) -> Result<Vec<i32>, DbErr> {
        let mut ids: Vec<i32> = user_capability::Entity::find()
            .filter(user_capability::Column::UserId.eq(user_id))
            .all(self.conn)
            .await?
            .into_iter()
            .map(|uc| uc.capability_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Replace a role's capability set.
    pub async fn set_role_capabilities(&self, role_id: i32, ids: &[i32]) -> Result<(), DbErr> {
        role_capability::Entity::delete_many()
            .filter(role_capability::Column::RoleId.eq(role_id))
            .exec(self.conn)
            .await?;

        let rows: Vec<role_capability::ActiveModel> = normalize(ids)
            .into_iter()
            .map(|capability_id| role_capability::ActiveModel {
                role_id: Set(role_id),
                capability_id: Set(capability_id),
            })
            .collect();

        if !rows.is_empty() {
            role_capability::Entity::insert_many(rows)
                .exec_without_returning(self.conn)
                .await?;
        }
        Ok(())
    }

    /// Replace a user's direct grants.
    pub async fn set_user_capabilities(&self, user_id: i32, ids: &[i32]) -> Result<(), DbErr> {
        user_capability::Entity::delete_many()
            .filter(user_capability::Column::UserId.eq(user_id))
            .exec(self.conn)
            .await?;

        let rows: Vec<user_capability::ActiveModel> = normalize(ids)
            .into_iter()
            .map(|capability_id| user_capability::ActiveModel {
                user_id: Set(user_id),
                capability_id: Set(capability_id),
            })
            .collect();

        if !rows.is_empty() {
            user_capability::Entity::insert_many(rows)
                .exec_without_returning(self.conn)
                .await?;
        }
        Ok(())
    }

    /// Point `user` at `role_name`, writing the name and the reference in
    /// one update. With no matching role the reference is cleared so the two
    /// columns never disagree.
    pub async fn attach_role(
        &self,
        user: &mut user::Model,
        role_name: &str,
        role: Option<&role::Model>,
    ) -> Result<(), DbErr> {
        let role_id = role.map(|r| r.id);
        if user.role == role_name && user.role_id == role_id {
            return Ok(());
        }

        let update = user::ActiveModel {
            id: Set(user.id),
            role: Set(role_name.to_string()),
            role_id: Set(role_id),
            ..Default::default()
        };
        *user = update.update(self.conn).await?;

        debug!(user_id = user.id, role = role_name, ?role_id, "Attached user to role");
        Ok(())
    }

    /// Get or create the role called `name`.
    ///
    /// A newly created built-in role is seeded from the policy map; a custom
    /// role starts empty with a generated description.
    pub async fn create_default_role(&self, name: &str) -> Result<role::Model, DbErr> {
        if let Some(existing) = self.find_role_by_name(name).await? {
            return Ok(existing);
        }

        let builtin = BuiltinRole::from_name(name);
        let model = role::ActiveModel {
            name: Set(name.to_string()),
            description: Set(policy::describe(name)),
            policy_version: Set(builtin.map(|_| POLICY_VERSION)),
            ..Default::default()
        };

        let inserted = role::Entity::insert(model)
            .on_conflict(
                OnConflict::column(role::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;
        let created = self
            .find_role_by_name(name)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("role {name}")))?;
        if inserted == 0 {
            // Created concurrently; use theirs and leave its grants alone.
            return Ok(created);
        }

        if let Some(builtin) = builtin {
            let ids = capability::resolve_grant(self.conn, builtin.grant()).await?;
            self.set_role_capabilities(created.id, &ids).await?;
        }

        info!(role = name, "Created role");
        Ok(created)
    }

    /// Apply the built-in policy for `role_name` (default: the user's current
    /// role) to `user`.
    ///
    /// Returns `false` when the name has no built-in policy; the user is
    /// still pointed at a matching role row if one exists, but no grants
    /// change.
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn assign_role_permissions(
        &self,
        user: &mut user::Model,
        role_name: Option<&str>,
    ) -> Result<bool, DbErr> {
        let role_name = role_name.unwrap_or(&user.role).to_string();
        let builtin = BuiltinRole::from_name(&role_name);

        let role = match self.find_role_by_name(&role_name).await? {
            Some(role) => Some(role),
            None if builtin.is_some() => Some(self.create_default_role(&role_name).await?),
            None => None,
        };
        self.attach_role(user, &role_name, role.as_ref()).await?;

        let Some(builtin) = builtin else {
            debug!(role = %role_name, "No built-in policy, grants unchanged");
            return Ok(false);
        };

        let ids = capability::resolve_grant(self.conn, builtin.grant()).await?;
        self.set_user_capabilities(user.id, &ids).await?;

        if let Some(role) = &role {
            self.mirror_onto_role(role, &ids).await?;
        }

        info!(
            user_id = user.id,
            role = %builtin,
            capabilities = ids.len(),
            "Assigned role capabilities"
        );
        Ok(true)
    }

    /// Copy an assigned set onto the role row so the stored set reflects the
    /// last assignment.
    async fn mirror_onto_role(&self, role: &role::Model, ids: &[i32]) -> Result<(), DbErr> {
        let current = self.role_capability_ids(role.id).await?;
        if current == ids {
            return Ok(());
        }
        if role.policy_version.is_none() && !current.is_empty() {
            warn!(
                role = %role.name,
                "Assignment replaced a hand-edited capability set on a built-in role"
            );
        }
        self.set_role_capabilities(role.id, ids).await?;

        if role.policy_version != Some(POLICY_VERSION) {
            role::ActiveModel {
                id: Set(role.id),
                policy_version: Set(Some(POLICY_VERSION)),
                ..Default::default()
            }
            .update(self.conn)
            .await?;
        }
        Ok(())
    }

    /// Recreate the built-in roles with their canonical description and
    /// capability set. Custom roles are left alone.
    #[instrument(skip(self))]
    pub async fn sync_role_permissions(&self) -> Result<BuiltinRoles, DbErr> {
        Ok(BuiltinRoles {
            admin: self.sync_builtin(BuiltinRole::Admin).await?,
            teacher: self.sync_builtin(BuiltinRole::Teacher).await?,
            student: self.sync_builtin(BuiltinRole::Student).await?,
        })
    }

    async fn sync_builtin(&self, builtin: BuiltinRole) -> Result<role::Model, DbErr> {
        let mut role = self.create_default_role(builtin.as_str()).await?;

        let ids = capability::resolve_grant(self.conn, builtin.grant()).await?;
        let current = self.role_capability_ids(role.id).await?;
        if current != ids {
            if role.policy_version != Some(POLICY_VERSION) {
                warn!(
                    role = %builtin,
                    stored = current.len(),
                    canonical = ids.len(),
                    "Overriding hand-edited capability set with the built-in policy"
                );
            }
            self.set_role_capabilities(role.id, &ids).await?;
        }

        if role.description != builtin.description() || role.policy_version != Some(POLICY_VERSION)
        {
            let update = role::ActiveModel {
                id: Set(role.id),
                description: Set(builtin.description().to_string()),
                policy_version: Set(Some(POLICY_VERSION)),
                ..Default::default()
            };
            role = update.update(self.conn).await?;
        }

        Ok(role)
    }
}

fn normalize(ids: &[i32]) -> Vec<i32> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}
