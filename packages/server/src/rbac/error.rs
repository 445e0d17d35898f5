use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RbacError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),

    #[error("User {0} not found")]
    UserNotFound(i32),

    #[error("Role {0} not found")]
    RoleNotFound(String),

    #[error("Capability {0} does not exist")]
    UnknownCapability(i32),

    #[error("Role '{0}' already exists")]
    DuplicateRole(String),

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),
}
