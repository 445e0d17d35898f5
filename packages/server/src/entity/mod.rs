pub mod capability;
pub mod group;
pub mod group_capability;
pub mod role;
pub mod role_capability;
pub mod user;
pub mod user_capability;
pub mod user_group;
