use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};

use crate::entity::capability;

use super::policy::Grant;

/// A parsed capability identifier.
///
/// `users.manage_courses` pins the module; a bare `manage_courses` matches
/// the codename in any module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRef<'a> {
    pub module: Option<&'a str>,
    pub codename: &'a str,
}

impl<'a> CapabilityRef<'a> {
    pub fn parse(id: &'a str) -> Self {
        match id.split_once('.') {
            Some((module, codename)) => Self {
                module: Some(module),
                codename,
            },
            None => Self {
                module: None,
                codename: id,
            },
        }
    }

    pub fn matches(&self, module: &str, codename: &str) -> bool {
        self.codename == codename && self.module.is_none_or(|m| m == module)
    }
}

/// Every capability, ordered by module then codename.
pub async fn all<C: ConnectionTrait>(conn: &C) -> Result<Vec<capability::Model>, DbErr> {
    capability::Entity::find()
        .order_by_asc(capability::Column::Module)
        .order_by_asc(capability::Column::Codename)
        .all(conn)
        .await
}

/// Resolve a policy grant against the current catalogue.
pub async fn resolve_grant<C: ConnectionTrait>(conn: &C, grant: Grant) -> Result<Vec<i32>, DbErr> {
    let caps = match grant {
        Grant::All => capability::Entity::find().all(conn).await?,
        Grant::Codenames(codenames) => {
            capability::Entity::find()
                .filter(capability::Column::Codename.is_in(codenames.iter().copied()))
                .all(conn)
                .await?
        }
        Grant::Nothing => return Ok(Vec::new()),
    };

    let mut ids: Vec<i32> = caps.into_iter().map(|c| c.id).collect();
    ids.sort_unstable();
    Ok(ids)
}

/// Load the given ids, failing if any of them does not exist.
pub async fn find_by_ids<C: ConnectionTrait>(
    conn: &C,
    ids: &[i32],
) -> Result<Vec<capability::Model>, super::RbacError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let found = capability::Entity::find()
        .filter(capability::Column::Id.is_in(ids.iter().copied()))
        .all(conn)
        .await?;

    if let Some(missing) = ids.iter().find(|id| !found.iter().any(|c| c.id == **id)) {
        return Err(super::RbacError::UnknownCapability(*missing));
    }

    Ok(found)
}
