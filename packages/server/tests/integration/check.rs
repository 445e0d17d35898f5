use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use lms_server::entity::{group, group_capability, user, user_group};
use lms_server::rbac::{AccessContext, NewUser, RoleSync};

use crate::common::*;

async fn add_to_group(db: &sea_orm::DatabaseConnection, user_id: i32, name: &str, caps: &[i32]) {
    let group = group::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    let rows = caps.iter().map(|&capability_id| group_capability::ActiveModel {
        group_id: Set(group.id),
        capability_id: Set(capability_id),
    });
    group_capability::Entity::insert_many(rows)
        .exec_without_returning(db)
        .await
        .unwrap();

    user_group::Entity::insert(user_group::ActiveModel {
        user_id: Set(user_id),
        group_id: Set(group.id),
    })
    .exec_without_returning(db)
    .await
    .unwrap();
}

#[tokio::test]
async fn group_grants_are_honored() {
    let db = test_db().await;
    let user = create_user(&db, "s1", None).await;
    let caps = capability_ids(&db, &["view_exercise"]).await;
    add_to_group(&db, user.id, "graders", &caps).await;

    let access = AccessContext::load(&db, &user).await.unwrap();

    assert!(access.has_capability("courses.view_exercise"));
    assert!(access.has_capability("view_exercise"));
    assert!(!access.has_capability("users.view_exercise"));
    assert!(access.has_module_access("courses"));
    assert!(!access.has_module_access("users"));
}

#[tokio::test]
async fn role_grants_count_without_direct_grants() {
    let db = test_db().await;
    let caps = capability_ids(&db, &["view_course"]).await;
    let ta = insert_raw_role(&db, "ta", &caps).await;
    let user = insert_raw_user(&db, "u1", "ta", Some(ta.id)).await;
    assert!(direct_ids(&db, user.id).await.is_empty());

    let access = AccessContext::load(&db, &user).await.unwrap();

    assert!(access.has_capability("courses.view_course"));
    assert!(!access.has_capability("courses.add_course"));
    assert_eq!(access.effective_capabilities(), vec!["courses.view_course"]);
}

#[tokio::test]
async fn superusers_pass_every_check_without_grants() {
    let db = test_db().await;
    let user = RoleSync::new(&db)
        .create_user(NewUser {
            username: "root".into(),
            is_superuser: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(direct_ids(&db, user.id).await.is_empty());

    let access = AccessContext::load(&db, &user).await.unwrap();

    assert!(access.has_capability("anything.at_all"));
    assert!(access.has_module_access("courses"));
}

#[tokio::test]
async fn inactive_users_hold_nothing() {
    let db = test_db().await;
    let user = create_user(&db, "t1", Some("teacher")).await;
    let user = user::ActiveModel {
        id: Set(user.id),
        is_active: Set(false),
        ..Default::default()
    }
    .update(&db)
    .await
    .unwrap();

    let access = AccessContext::load(&db, &user).await.unwrap();

    assert!(!access.has_capability("manage_courses"));
    assert!(!access.has_module_access("users"));
}

#[tokio::test]
async fn teacher_fallback_covers_accounts_without_grants() {
    let db = test_db().await;
    let user = insert_raw_user(&db, "t1", "teacher", None).await;

    let access = AccessContext::load(&db, &user).await.unwrap();

    assert!(access.has_capability("users.manage_courses"));
    assert!(access.has_capability("generate_teaching_content"));
    assert!(!access.has_capability("courses.manage_courses"));
    assert!(access.has_module_access("users"));
}
