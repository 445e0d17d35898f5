use sea_orm::sea_query::{Index, MysqlQueryBuilder, PostgresQueryBuilder, SqliteQueryBuilder};
use sea_orm::*;
use tracing::info;

use crate::entity::{capability, user};

/// Capability catalogue seeded on startup: `(module, codename, name)`.
pub const DEFAULT_CAPABILITIES: &[(&str, &str, &str)] = &[
    // Accounts and roles
    ("users", "add_user", "Can add user"),
    ("users", "change_user", "Can change user"),
    ("users", "delete_user", "Can delete user"),
    ("users", "view_user", "Can view user"),
    ("users", "add_role", "Can add role"),
    ("users", "change_role", "Can change role"),
    ("users", "delete_role", "Can delete role"),
    ("users", "view_role", "Can view role"),
    // Teaching
    ("users", "view_student_data", "Can view student data"),
    ("users", "manage_courses", "Can manage courses"),
    ("users", "generate_teaching_content", "Can generate teaching content"),
    // Course content
    ("courses", "add_course", "Can add course"),
    ("courses", "change_course", "Can change course"),
    ("courses", "delete_course", "Can delete course"),
    ("courses", "view_course", "Can view course"),
    ("courses", "add_knowledgepoint", "Can add knowledge point"),
    ("courses", "change_knowledgepoint", "Can change knowledge point"),
    ("courses", "delete_knowledgepoint", "Can delete knowledge point"),
    ("courses", "view_knowledgepoint", "Can view knowledge point"),
    ("courses", "add_exercise", "Can add exercise"),
    ("courses", "change_exercise", "Can change exercise"),
    ("courses", "delete_exercise", "Can delete exercise"),
    ("courses", "view_exercise", "Can view exercise"),
    ("courses", "add_learningrecord", "Can add learning record"),
    ("courses", "view_learningrecord", "Can view learning record"),
];

/// Seed the `capability` table with the default catalogue.
///
/// Existing rows are kept; returns the number of rows inserted.
pub async fn seed_capabilities<C: ConnectionTrait>(db: &C) -> Result<u32, DbErr> {
    let existing = capability::Entity::find().all(db).await?;

    let mut inserted = 0u32;
    for &(module, codename, name) in DEFAULT_CAPABILITIES {
        if existing
            .iter()
            .any(|c| c.module == module && c.codename == codename)
        {
            continue;
        }

        let model = capability::ActiveModel {
            module: Set(module.to_string()),
            codename: Set(codename.to_string()),
            name: Set(name.to_string()),
            ..Default::default()
        };
        model.insert(db).await?;
        inserted += 1;
    }

    if inserted > 0 {
        info!("Seeded {} new capabilities", inserted);
    }

    Ok(inserted)
}

/// Ensure required database indexes exist.
///
/// SeaORM's schema-sync doesn't support composite indexes, so we create
/// them manually on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // One capability per (module, codename).
    let capability_key = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_capability_module_codename")
        .table(capability::Entity)
        .col(capability::Column::Module)
        .col(capability::Column::Codename)
        .to_owned();

    // Role cascades look users up by name:
    // SELECT * FROM user WHERE role = ? OR role_id = ?
    let user_role = Index::create()
        .if_not_exists()
        .name("idx_user_role")
        .table(user::Entity)
        .col(user::Column::Role)
        .to_owned();

    for (name, stmt) in [
        ("idx_capability_module_codename", capability_key),
        ("idx_user_role", user_role),
    ] {
        let sql = match db.get_database_backend() {
            DbBackend::Postgres => stmt.to_string(PostgresQueryBuilder),
            DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
            _ => stmt.to_string(MysqlQueryBuilder),
        };

        match db.execute_unprepared(&sql).await {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => tracing::warn!("Failed to create index {}: {}", name, e),
        }
    }

    Ok(())
}
