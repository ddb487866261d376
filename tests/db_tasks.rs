//! Postgres repository behaviour. Run with `DATABASE_URL` set and `--ignored`.

use sqlx::PgPool;
use uuid::Uuid;

use taskflow::application::repos::{
    CreateTaskParams, RepoError, TasksRepo, TasksWriteRepo, UpdateTaskParams, UsersRepo,
};
use taskflow::domain::tasks::{NewTask, TaskChanges};
use taskflow::domain::types::{TaskStatus, UserRole};
use taskflow::infra::db::PostgresRepositories;

fn new_task(title: &str) -> NewTask {
    NewTask::new(title.to_string(), "body".to_string(), None, None, None).expect("valid task")
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn tasks_round_trip_through_postgres(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let first = repos
        .create_task(CreateTaskParams {
            id: Uuid::new_v4(),
            task: new_task("first"),
        })
        .await
        .expect("insert first");
    let second = repos
        .create_task(CreateTaskParams {
            id: Uuid::new_v4(),
            task: new_task("second"),
        })
        .await
        .expect("insert second");
    assert_eq!(first.status, TaskStatus::Pending);

    let listed = repos.list_tasks().await.expect("list");
    assert_eq!(listed, vec![first.clone(), second.clone()]);

    let changes = TaskChanges::new(
        None,
        None,
        Some(TaskStatus::InProgress),
        Some(Some("sam".to_string())),
        None,
    )
    .expect("valid changes");
    let updated = repos
        .update_task(UpdateTaskParams {
            id: first.id,
            changes,
        })
        .await
        .expect("update");
    assert_eq!(updated.status, TaskStatus::InProgress);
    assert_eq!(updated.assignee.as_deref(), Some("sam"));
    assert_eq!(updated.title, "first");

    let clear = TaskChanges::new(None, None, None, Some(None), None).expect("valid changes");
    let cleared = repos
        .update_task(UpdateTaskParams {
            id: first.id,
            changes: clear,
        })
        .await
        .expect("clear assignee");
    assert_eq!(cleared.assignee, None);
    assert_eq!(cleared.status, TaskStatus::InProgress);

    repos.delete_task(second.id).await.expect("delete");
    assert_eq!(repos.find_task(second.id).await.expect("find"), None);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn missing_rows_are_not_found(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let missing = Uuid::new_v4();

    let changes =
        TaskChanges::new(None, None, Some(TaskStatus::Completed), None, None).expect("valid");
    let update = repos
        .update_task(UpdateTaskParams {
            id: missing,
            changes,
        })
        .await
        .unwrap_err();
    assert!(matches!(update, RepoError::NotFound));

    let delete = repos.delete_task(missing).await.unwrap_err();
    assert!(matches!(delete, RepoError::NotFound));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn migrations_seed_the_admin_user(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let users = repos.list_users().await.expect("list users");
    let admin = users
        .iter()
        .find(|user| user.email == "admin@example.com")
        .expect("seeded admin");
    assert_eq!(admin.role, UserRole::Admin);

    let found = repos.find_user(admin.id).await.expect("find user");
    assert_eq!(found.as_ref(), Some(admin));
    repos.health_check().await.expect("database reachable");
}
