//! Role and capability management.
//!
//! A user's role is persisted twice: the legacy `user.role` name and the
//! `user.role_id` reference. Nothing here reacts to writes after the fact;
//! every code path that changes a role goes through [`sync::RoleSync`],
//! which writes both columns together and re-materializes grants in the
//! same transaction.

pub mod capability;
pub mod check;
pub mod engine;
pub mod error;
pub mod policy;
pub mod sync;

pub use check::AccessContext;
pub use engine::{BuiltinRoles, PermissionEngine};
pub use error::RbacError;
pub use policy::BuiltinRole;
pub use sync::{CascadeReport, NewUser, RoleChange, RoleChangeOutcome, RoleStatistics, RoleSync};
