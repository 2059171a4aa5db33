//! Postgres repository checks. Needs `DATABASE_URL`; run with `cargo test -- --ignored`.

use std::collections::HashSet;

use itsm::application::repos::{
    NewService, NewUser, RepoError, ServiceChanges, ServiceFilter, ServicesRepo, UserChanges,
    UsersRepo,
};
use itsm::infra::db::PostgresRepositories;
use itsm_api_types::{ServiceCategory, ServiceStatus};
use sqlx::PgPool;

fn new_service(name: &str, category: ServiceCategory) -> NewService {
    NewService {
        name: name.to_string(),
        description: None,
        category,
        status: ServiceStatus::default(),
        owner: "Service Desk".to_string(),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres instance"]
async fn service_indexes_exist(pool: PgPool) {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT indexname FROM pg_indexes WHERE schemaname = 'public' AND tablename = 'services'",
    )
    .fetch_all(&pool)
    .await
    .expect("fetch service indexes");

    let indexes: HashSet<String> = rows.into_iter().collect();
    assert!(indexes.contains("services_created_at_idx"));
    assert!(indexes.contains("services_category_status_idx"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres instance"]
async fn duplicate_email_maps_to_duplicate(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    repos.health_check().await.expect("health check");

    let user = NewUser {
        name: "Ana".to_string(),
        email: "ana@example.com".to_string(),
        password_hash: "$2b$04$hash".to_string(),
    };
    repos.create_user(user.clone()).await.expect("first insert");

    let err = repos.create_user(user).await.expect_err("duplicate insert");
    assert!(
        matches!(err, RepoError::Duplicate { ref constraint } if constraint == "users_email_key"),
        "unexpected error: {err:?}"
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres instance"]
async fn user_update_keeps_untouched_columns(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let created = repos
        .create_user(NewUser {
            name: "Bruno".to_string(),
            email: "bruno@example.com".to_string(),
            password_hash: "$2b$04$hash".to_string(),
        })
        .await
        .expect("insert");

    let updated = repos
        .update_user(
            created.id,
            UserChanges {
                name: Some("Bruno Lima".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update");

    assert_eq!(updated.name, "Bruno Lima");
    assert_eq!(updated.email, "bruno@example.com");
    assert_eq!(updated.password_hash, created.password_hash);

    repos.delete_user(created.id).await.expect("delete");
    assert!(matches!(
        repos.delete_user(created.id).await,
        Err(RepoError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres instance"]
async fn services_filter_and_order_newest_first(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    repos
        .create_service(new_service("Helpdesk", ServiceCategory::Support))
        .await
        .expect("helpdesk");
    let database = repos
        .create_service(new_service("Database", ServiceCategory::Infrastructure))
        .await
        .expect("database");

    let all = repos
        .list_services(ServiceFilter::default())
        .await
        .expect("list");
    let names: Vec<&str> = all.iter().map(|service| service.name.as_str()).collect();
    assert_eq!(names, vec!["Database", "Helpdesk"]);

    let filtered = repos
        .list_services(ServiceFilter {
            category: Some(ServiceCategory::Infrastructure),
            status: None,
        })
        .await
        .expect("filtered");
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, database.id);

    let updated = repos
        .update_service(
            database.id,
            ServiceChanges {
                status: Some(ServiceStatus::Maintenance),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.status, ServiceStatus::Maintenance);
    assert_eq!(updated.category, ServiceCategory::Infrastructure);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres instance"]
async fn short_service_name_violates_check(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let err = repos
        .create_service(new_service("ab", ServiceCategory::General))
        .await
        .expect_err("check constraint");
    assert!(matches!(err, RepoError::InvalidInput { .. }), "unexpected error: {err:?}");
}
