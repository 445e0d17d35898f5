use utoipa_axum::{router::OpenApiRouter, routes};

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/roles", role_routes())
        .nest("/users", user_routes())
        .nest("/capabilities", capability_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
        .routes(routes!(handlers::auth::check))
}

fn role_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::role::list_roles,
            handlers::role::create_role
        ))
        .routes(routes!(handlers::role::sync_roles))
        .routes(routes!(
            handlers::role::get_role,
            handlers::role::delete_role
        ))
        .routes(routes!(handlers::role::update_role_capabilities))
}

fn user_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::user::list_users,
            handlers::user::create_user
        ))
        .routes(routes!(handlers::user::get_user))
        .routes(routes!(handlers::user::update_user_role))
}

fn capability_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::role::list_capabilities))
}
