use lms_server::rbac::{AccessContext, PermissionEngine, RbacError, RoleChange, RoleSync};

use crate::common::*;

const TEACHING: &[&str] = &["view_student_data", "manage_courses", "generate_teaching_content"];

#[tokio::test]
async fn create_user_defaults_to_student() {
    let db = test_db().await;

    let user = create_user(&db, "alice", None).await;

    let student = role_named(&db, "student").await.unwrap();
    assert_eq!(user.role, "student");
    assert_eq!(user.role_id, Some(student.id));
    assert!(direct_ids(&db, user.id).await.is_empty());
}

#[tokio::test]
async fn create_user_grants_the_initial_role() {
    let db = test_db().await;

    let user = create_user(&db, "bob", Some("teacher")).await;

    let teacher = role_named(&db, "teacher").await.unwrap();
    assert_eq!(user.role_id, Some(teacher.id));
    assert_eq!(direct_ids(&db, user.id).await, capability_ids(&db, TEACHING).await);
}

#[tokio::test]
async fn create_user_rejects_a_taken_username() {
    let db = test_db().await;
    create_user(&db, "alice", None).await;

    let err = RoleSync::new(&db)
        .create_user(lms_server::rbac::NewUser {
            username: "alice".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RbacError::UsernameTaken(name) if name == "alice"));
}

#[tokio::test]
async fn change_role_by_name_rewrites_both_columns_and_grants() {
    let db = test_db().await;
    let user = create_user(&db, "u1", None).await;

    let outcome = RoleSync::new(&db)
        .change_user_role(user.id, RoleChange::Name("teacher".into()))
        .await
        .unwrap();

    assert!(outcome.changed);
    assert!(outcome.policy_applied);
    let teacher = role_named(&db, "teacher").await.unwrap();
    assert_eq!(outcome.user.role, "teacher");
    assert_eq!(outcome.user.role_id, Some(teacher.id));
    assert_eq!(direct_ids(&db, user.id).await, capability_ids(&db, TEACHING).await);
    assert_role_columns_agree(&db, user.id).await;
}

#[tokio::test]
async fn change_role_by_reference_rewrites_the_name() {
    let db = test_db().await;
    let user = create_user(&db, "u1", None).await;
    let roles = PermissionEngine::new(&db).sync_role_permissions().await.unwrap();

    let outcome = RoleSync::new(&db)
        .change_user_role(user.id, RoleChange::Reference(roles.admin.id))
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.user.role, "admin");
    assert_eq!(outcome.user.role_id, Some(roles.admin.id));
    assert_eq!(direct_ids(&db, user.id).await, all_capability_ids(&db).await);
}

#[tokio::test]
async fn changing_to_the_current_role_is_a_no_op() {
    let db = test_db().await;
    let user = create_user(&db, "t1", Some("teacher")).await;

    let outcome = RoleSync::new(&db)
        .change_user_role(user.id, RoleChange::Name("teacher".into()))
        .await
        .unwrap();

    assert!(!outcome.changed);
    assert!(!outcome.policy_applied);
    assert_eq!(direct_ids(&db, user.id).await, capability_ids(&db, TEACHING).await);
}

#[tokio::test]
async fn both_fields_apply_a_changed_reference_when_the_name_is_unchanged() {
    let db = test_db().await;
    let user = create_user(&db, "u1", None).await;
    let roles = PermissionEngine::new(&db).sync_role_permissions().await.unwrap();

    let outcome = RoleSync::new(&db)
        .change_user_role(
            user.id,
            RoleChange::Both {
                name: "student".into(),
                reference: roles.teacher.id,
            },
        )
        .await
        .unwrap();

    assert!(outcome.changed);
    assert!(outcome.policy_applied);
    assert_eq!(outcome.user.role, "teacher");
    assert_eq!(outcome.user.role_id, Some(roles.teacher.id));
    assert_eq!(direct_ids(&db, user.id).await, capability_ids(&db, TEACHING).await);
}

#[tokio::test]
async fn both_fields_prefer_a_changed_name() {
    let db = test_db().await;
    let user = create_user(&db, "u1", None).await;
    let roles = PermissionEngine::new(&db).sync_role_permissions().await.unwrap();

    let outcome = RoleSync::new(&db)
        .change_user_role(
            user.id,
            RoleChange::Both {
                name: "admin".into(),
                reference: roles.teacher.id,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.user.role, "admin");
    assert_eq!(outcome.user.role_id, Some(roles.admin.id));
    assert_role_columns_agree(&db, user.id).await;
}

#[tokio::test]
async fn unchanged_name_still_pins_drifted_columns() {
    let db = test_db().await;
    let roles = PermissionEngine::new(&db).sync_role_permissions().await.unwrap();
    let legacy = insert_raw_user(&db, "legacy", "teacher", Some(roles.admin.id)).await;

    let outcome = RoleSync::new(&db)
        .change_user_role(legacy.id, RoleChange::Name("teacher".into()))
        .await
        .unwrap();

    assert!(outcome.changed);
    assert!(!outcome.policy_applied);
    assert_eq!(outcome.user.role, "teacher");
    assert_eq!(outcome.user.role_id, Some(roles.teacher.id));
    assert_role_columns_agree(&db, legacy.id).await;
    assert!(direct_ids(&db, legacy.id).await.is_empty());
}

#[tokio::test]
async fn unchanged_reference_still_pins_a_drifted_name() {
    let db = test_db().await;
    let roles = PermissionEngine::new(&db).sync_role_permissions().await.unwrap();
    let legacy = insert_raw_user(&db, "legacy", "student", Some(roles.teacher.id)).await;

    let outcome = RoleSync::new(&db)
        .change_user_role(legacy.id, RoleChange::Reference(roles.teacher.id))
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.user.role, "teacher");
    assert_role_columns_agree(&db, legacy.id).await;
}

#[tokio::test]
async fn changing_to_an_unknown_custom_name_clears_the_reference() {
    let db = test_db().await;
    let user = create_user(&db, "t1", Some("teacher")).await;

    let outcome = RoleSync::new(&db)
        .change_user_role(user.id, RoleChange::Name("mentor".into()))
        .await
        .unwrap();

    assert!(outcome.changed);
    assert!(!outcome.policy_applied);
    assert_eq!(outcome.user.role, "mentor");
    assert_eq!(outcome.user.role_id, None);
    assert_eq!(direct_ids(&db, user.id).await, capability_ids(&db, TEACHING).await);
}

#[tokio::test]
async fn changing_to_a_missing_reference_fails() {
    let db = test_db().await;
    let user = create_user(&db, "u1", None).await;

    let err = RoleSync::new(&db)
        .change_user_role(user.id, RoleChange::Reference(9999))
        .await
        .unwrap_err();

    assert!(matches!(err, RbacError::RoleNotFound(_)));
    assert_eq!(reload(&db, user.id).await.role, "student");
}

#[tokio::test]
async fn changing_a_missing_user_fails() {
    let db = test_db().await;

    let err = RoleSync::new(&db)
        .change_user_role(42, RoleChange::Name("teacher".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, RbacError::UserNotFound(42)));
}

#[tokio::test]
async fn role_update_reaches_users_linked_by_reference_and_by_name() {
    let db = test_db().await;
    let view_course = capability_ids(&db, &["view_course"]).await;
    let ta = insert_raw_role(&db, "ta", &view_course).await;
    let by_reference = insert_raw_user(&db, "u1", "ta", Some(ta.id)).await;
    let by_name = insert_raw_user(&db, "u2", "ta", None).await;
    let bystander = create_user(&db, "u3", None).await;

    let new_set = capability_ids(&db, &["view_course", "view_exercise"]).await;
    let report = RoleSync::new(&db)
        .update_role_capabilities(ta.id, &new_set)
        .await
        .unwrap();

    assert_eq!(report.users_updated, 2);
    assert_eq!(report.capability_ids, new_set);
    for user_id in [by_reference.id, by_name.id] {
        let user = reload(&db, user_id).await;
        assert_eq!(user.role, "ta");
        assert_eq!(user.role_id, Some(ta.id));
        assert_eq!(direct_ids(&db, user_id).await, new_set);
    }
    assert!(direct_ids(&db, bystander.id).await.is_empty());
}

#[tokio::test]
async fn role_update_with_unknown_capability_changes_nothing() {
    let db = test_db().await;
    let view_course = capability_ids(&db, &["view_course"]).await;
    let ta = insert_raw_role(&db, "ta", &view_course).await;

    let err = RoleSync::new(&db)
        .update_role_capabilities(ta.id, &[view_course[0], 9999])
        .await
        .unwrap_err();

    assert!(matches!(err, RbacError::UnknownCapability(9999)));
    assert_eq!(role_ids(&db, ta.id).await, view_course);
}

#[tokio::test]
async fn editing_a_built_in_role_marks_it_and_resync_restores_it() {
    let db = test_db().await;
    let sync = RoleSync::new(&db);
    let teacher_user = create_user(&db, "t1", Some("teacher")).await;
    let teacher = role_named(&db, "teacher").await.unwrap();

    let trimmed = capability_ids(&db, &["manage_courses"]).await;
    let report = sync.update_role_capabilities(teacher.id, &trimmed).await.unwrap();

    assert_eq!(report.role.policy_version, None);
    assert_eq!(direct_ids(&db, teacher_user.id).await, trimmed);

    let synced = sync.sync_roles().await.unwrap();
    assert_eq!(synced.roles.teacher.id, teacher.id);
    assert!(synced.roles.teacher.policy_version.is_some());
    assert_eq!(
        role_ids(&db, teacher.id).await,
        capability_ids(&db, TEACHING).await
    );
}

#[tokio::test]
async fn create_role_attaches_existing_name_holders() {
    let db = test_db().await;
    let holder = insert_raw_user(&db, "u1", "ta", None).await;
    let caps = capability_ids(&db, &["view_course", "view_learningrecord"]).await;

    let report = RoleSync::new(&db)
        .create_role("ta", None, &caps)
        .await
        .unwrap();

    assert_eq!(report.users_updated, 1);
    assert_eq!(report.role.description, "Custom role: ta");
    let holder = reload(&db, holder.id).await;
    assert_eq!(holder.role_id, Some(report.role.id));
    assert_eq!(direct_ids(&db, holder.id).await, caps);
}

#[tokio::test]
async fn create_role_rejects_a_duplicate_name() {
    let db = test_db().await;
    let sync = RoleSync::new(&db);
    sync.create_role("ta", None, &[]).await.unwrap();

    let err = sync.create_role("ta", None, &[]).await.unwrap_err();

    assert!(matches!(err, RbacError::DuplicateRole(name) if name == "ta"));
}

#[tokio::test]
async fn deleting_a_role_keeps_its_users() {
    let db = test_db().await;
    let sync = RoleSync::new(&db);
    let report = sync.create_role("ta", None, &[]).await.unwrap();
    let user = create_user(&db, "u1", Some("ta")).await;
    assert_eq!(user.role_id, Some(report.role.id));

    let detached = sync.delete_role(report.role.id).await.unwrap();

    assert_eq!(detached, 1);
    let user = reload(&db, user.id).await;
    assert_eq!(user.role, "ta");
    assert_eq!(user.role_id, None);
    assert!(role_named(&db, "ta").await.is_none());
}

#[tokio::test]
async fn deleting_a_missing_role_fails() {
    let db = test_db().await;

    let err = RoleSync::new(&db).delete_role(9999).await.unwrap_err();

    assert!(matches!(err, RbacError::RoleNotFound(_)));
}

#[tokio::test]
async fn reconciliation_links_legacy_teacher_accounts() {
    let db = test_db().await;
    let sync = RoleSync::new(&db);
    PermissionEngine::new(&db).sync_role_permissions().await.unwrap();
    let t1 = insert_raw_user(&db, "t1", "teacher", None).await;

    let updated = sync.sync_users_role_objects().await.unwrap();

    assert_eq!(updated, 1);
    let t1 = reload(&db, t1.id).await;
    let teacher = role_named(&db, "teacher").await.unwrap();
    assert_eq!(t1.role_id, Some(teacher.id));

    let access = AccessContext::load(&db, &t1).await.unwrap();
    assert!(access.has_capability("manage_courses"));
    assert!(access.has_capability("users.view_student_data"));
    assert!(!access.has_capability("some_other_perm"));
}

#[tokio::test]
async fn reconciliation_follows_the_reference_when_the_name_drifts() {
    let db = test_db().await;
    let roles = PermissionEngine::new(&db).sync_role_permissions().await.unwrap();
    let user = insert_raw_user(&db, "u1", "student", Some(roles.teacher.id)).await;

    assert!(RoleSync::new(&db).repair_user(user.id).await.unwrap());

    let user = reload(&db, user.id).await;
    assert_eq!(user.role, "teacher");
    assert_eq!(user.role_id, Some(roles.teacher.id));
    assert!(!RoleSync::new(&db).repair_user(user.id).await.unwrap());
}

#[tokio::test]
async fn reconciliation_leaves_unknown_names_alone() {
    let db = test_db().await;
    let user = insert_raw_user(&db, "u1", "ghost", None).await;

    assert_eq!(RoleSync::new(&db).sync_users_role_objects().await.unwrap(), 0);
    assert_eq!(reload(&db, user.id).await.role_id, None);
}

#[tokio::test]
async fn role_columns_agree_after_every_write() {
    let db = test_db().await;
    let sync = RoleSync::new(&db);
    let caps = capability_ids(&db, &["view_course"]).await;
    let user = create_user(&db, "u1", None).await;
    assert_role_columns_agree(&db, user.id).await;

    let ta = sync.create_role("ta", None, &caps).await.unwrap().role;
    let steps = [
        RoleChange::Name("teacher".into()),
        RoleChange::Reference(ta.id),
        RoleChange::Name("mentor".into()),
        RoleChange::Name("admin".into()),
        RoleChange::Name("ta".into()),
    ];
    for step in steps {
        sync.change_user_role(user.id, step).await.unwrap();
        assert_role_columns_agree(&db, user.id).await;
    }

    sync.update_role_capabilities(ta.id, &[]).await.unwrap();
    assert_role_columns_agree(&db, user.id).await;
    sync.delete_role(ta.id).await.unwrap();
    assert_role_columns_agree(&db, user.id).await;
    sync.sync_roles().await.unwrap();
    assert_role_columns_agree(&db, user.id).await;
}

#[tokio::test]
async fn sync_roles_is_idempotent() {
    let db = test_db().await;
    let sync = RoleSync::new(&db);
    insert_raw_user(&db, "t1", "teacher", None).await;
    insert_raw_user(&db, "s1", "student", None).await;

    let first = sync.sync_roles().await.unwrap();
    let second = sync.sync_roles().await.unwrap();

    assert_eq!(first.users_total, 2);
    assert_eq!(first.users_updated, 2);
    assert_eq!(second.users_updated, 0);
    assert_eq!(first.roles.teacher.id, second.roles.teacher.id);
}

#[tokio::test]
async fn init_roles_without_force_skips_users_holding_grants() {
    let db = test_db().await;
    let engine = PermissionEngine::new(&db);
    let bare = insert_raw_user(&db, "t1", "teacher", None).await;
    let granted = insert_raw_user(&db, "a1", "admin", None).await;
    let held = capability_ids(&db, &["view_course"]).await;
    engine.set_user_capabilities(granted.id, &held).await.unwrap();

    let report = RoleSync::new(&db).init_roles(false).await.unwrap();

    assert_eq!(report.users_total, 2);
    assert_eq!(report.users_updated, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(report.roles.len(), 3);
    assert_eq!(direct_ids(&db, bare.id).await, capability_ids(&db, TEACHING).await);
    assert_eq!(direct_ids(&db, granted.id).await, held);
}

#[tokio::test]
async fn init_roles_with_force_reapplies_every_user() {
    let db = test_db().await;
    let engine = PermissionEngine::new(&db);
    let bare = insert_raw_user(&db, "t1", "teacher", None).await;
    let granted = insert_raw_user(&db, "a1", "admin", None).await;
    let held = capability_ids(&db, &["view_course"]).await;
    engine.set_user_capabilities(granted.id, &held).await.unwrap();

    let report = RoleSync::new(&db).init_roles(true).await.unwrap();

    assert_eq!(report.users_updated, 2);
    assert_eq!(direct_ids(&db, bare.id).await, capability_ids(&db, TEACHING).await);
    assert_eq!(direct_ids(&db, granted.id).await, all_capability_ids(&db).await);

    let counts: Vec<(String, usize)> = report
        .roles
        .iter()
        .map(|(role, count)| (role.name.clone(), *count))
        .collect();
    assert_eq!(counts[1], ("teacher".to_string(), 3));
    assert_eq!(counts[2], ("student".to_string(), 0));
}

#[tokio::test]
async fn role_statistics_count_both_links() {
    let db = test_db().await;
    let sync = RoleSync::new(&db);
    create_user(&db, "t1", Some("teacher")).await;
    insert_raw_user(&db, "t2", "teacher", None).await;

    let stats = sync.role_statistics().await.unwrap();
    let teacher = stats.iter().find(|s| s.role == "teacher").unwrap();

    assert_eq!(teacher.by_reference, 1);
    assert_eq!(teacher.by_name, 2);
}
