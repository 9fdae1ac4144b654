//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test -p quill-db --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `quill_test`)
//!   `TEST_DB_PASSWORD` (default: `quill_test`)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use quill_common::{AppError, IdGenerator};
use quill_db::{
    entities::{comment, follow, group, post, user},
    repositories::{
        CommentRepository, FollowRepository, GroupRepository, PostRepository, PostScope,
        UserRepository,
    },
    test_utils::TestDatabase,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Set, Statement};

struct Repos {
    users: UserRepository,
    groups: GroupRepository,
    posts: PostRepository,
    comments: CommentRepository,
    follows: FollowRepository,
}

impl Repos {
    fn new(conn: &DatabaseConnection) -> Self {
        let db = Arc::new(conn.clone());
        Self {
            users: UserRepository::new(Arc::clone(&db)),
            groups: GroupRepository::new(Arc::clone(&db)),
            posts: PostRepository::new(Arc::clone(&db)),
            comments: CommentRepository::new(Arc::clone(&db)),
            follows: FollowRepository::new(db),
        }
    }
}

fn new_id() -> String {
    IdGenerator::new().generate()
}

fn new_user(username: &str) -> user::ActiveModel {
    user::ActiveModel {
        id: Set(new_id()),
        username: Set(username.to_string()),
        username_lower: Set(username.to_lowercase()),
        name: Set(None),
        email: Set(None),
        token: Set(Some(new_id())),
        created_at: Set(Utc::now().into()),
    }
}

async fn add_user(repos: &Repos, username: &str) -> user::Model {
    repos.users.create(new_user(username)).await.unwrap()
}

async fn add_post(
    repos: &Repos,
    author: &user::Model,
    group_id: Option<&str>,
    text: &str,
    age_minutes: i64,
) -> post::Model {
    repos
        .posts
        .create(post::ActiveModel {
            id: Set(new_id()),
            text: Set(text.to_string()),
            author_id: Set(author.id.clone()),
            group_id: Set(group_id.map(str::to_string)),
            image: Set(None),
            created_at: Set((Utc::now() - Duration::minutes(age_minutes)).into()),
            updated_at: Set(None),
        })
        .await
        .unwrap()
}

fn edge(follower: &user::Model, author: &user::Model) -> follow::ActiveModel {
    follow::ActiveModel {
        id: Set(new_id()),
        follower_id: Set(follower.id.clone()),
        author_id: Set(author.id.clone()),
        created_at: Set(Utc::now().into()),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_follow_unfollow_feed_scenario() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let repos = Repos::new(db.connection());

    let serg = add_user(&repos, "serg").await;
    let andr = add_user(&repos, "andr").await;
    let other = add_user(&repos, "other").await;

    let older = add_post(&repos, &serg, None, "first", 10).await;
    let newer = add_post(&repos, &serg, None, "second", 1).await;
    add_post(&repos, &other, None, "unrelated", 0).await;

    let feed = PostScope::FollowedBy(andr.id.clone());
    assert_eq!(repos.posts.count(&feed).await.unwrap(), 0);

    assert!(repos.follows.insert_if_absent(edge(&andr, &serg)).await.unwrap());
    assert!(!repos.follows.insert_if_absent(edge(&andr, &serg)).await.unwrap());
    assert_eq!(repos.follows.count_followers(&serg.id).await.unwrap(), 1);

    let page = repos.posts.find_page(&feed, 10, 0).await.unwrap();
    let ids: Vec<_> = page.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);

    assert!(repos.follows.delete_by_pair(&andr.id, &serg.id).await.unwrap());
    assert!(!repos.follows.delete_by_pair(&andr.id, &serg.id).await.unwrap());
    assert_eq!(repos.posts.count(&feed).await.unwrap(), 0);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_self_follow_rejected_by_check_constraint() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let repos = Repos::new(db.connection());

    let serg = add_user(&repos, "serg").await;
    let result = repos.follows.insert_if_absent(edge(&serg, &serg)).await;
    assert!(result.is_err());
    assert!(!repos.follows.is_following(&serg.id, &serg.id).await.unwrap());

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_group_delete_keeps_posts() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let repos = Repos::new(db.connection());

    let serg = add_user(&repos, "serg").await;
    let cats = repos
        .groups
        .create(group::ActiveModel {
            id: Set(new_id()),
            title: Set("Cats".to_string()),
            slug: Set("cats".to_string()),
            description: Set("All about cats".to_string()),
            created_at: Set(Utc::now().into()),
        })
        .await
        .unwrap();
    let filed = add_post(&repos, &serg, Some(&cats.id), "meow", 0).await;

    assert!(repos.groups.delete(&cats.id).await.unwrap());

    let survivor = repos.posts.get_by_id(&filed.id).await.unwrap();
    assert_eq!(survivor.group_id, None);
    assert_eq!(survivor.text, "meow");

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_user_delete_cascades() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let repos = Repos::new(db.connection());

    let serg = add_user(&repos, "serg").await;
    let andr = add_user(&repos, "andr").await;
    let andr_post = add_post(&repos, &andr, None, "andr's post", 0).await;
    let serg_post = add_post(&repos, &serg, None, "serg's post", 0).await;

    repos
        .comments
        .create(comment::ActiveModel {
            id: Set(new_id()),
            post_id: Set(andr_post.id.clone()),
            author_id: Set(serg.id.clone()),
            text: Set("nice".to_string()),
            created_at: Set(Utc::now().into()),
        })
        .await
        .unwrap();
    repos.follows.insert_if_absent(edge(&serg, &andr)).await.unwrap();

    assert!(repos.users.delete(&serg.id).await.unwrap());

    assert!(repos.posts.find_by_id(&serg_post.id).await.unwrap().is_none());
    assert_eq!(repos.comments.count_by_post(&andr_post.id).await.unwrap(), 0);
    assert_eq!(repos.follows.count_followers(&andr.id).await.unwrap(), 0);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_update_if_author_only_touches_own_post() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let repos = Repos::new(db.connection());

    let serg = add_user(&repos, "serg").await;
    let andr = add_user(&repos, "andr").await;
    let post = add_post(&repos, &serg, None, "original", 0).await;

    let changed = repos
        .posts
        .update_if_author(&post.id, &andr.id, "hijacked".to_string(), None, Utc::now().into())
        .await
        .unwrap();
    assert_eq!(changed, 0);
    assert_eq!(repos.posts.get_by_id(&post.id).await.unwrap().text, "original");

    let changed = repos
        .posts
        .update_if_author(&post.id, &serg.id, "edited".to_string(), None, Utc::now().into())
        .await
        .unwrap();
    assert_eq!(changed, 1);

    let edited = repos.posts.get_by_id(&post.id).await.unwrap();
    assert_eq!(edited.text, "edited");
    assert!(edited.updated_at.is_some());

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_cleanup_truncates_tables() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();

    let rows = db
        .connection()
        .query_all(Statement::from_string(
            DatabaseBackend::Postgres,
            "SELECT id FROM \"user\"".to_string(),
        ))
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_duplicate_username_is_conflict() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let repos = Repos::new(db.connection());

    add_user(&repos, "serg").await;
    // Same name in another case, as a racing signup would insert it
    let result = repos.users.create(new_user("SERG")).await;
    assert!(matches!(result, Err(AppError::Conflict(_))), "{result:?}");

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_duplicate_slug_is_conflict() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let repos = Repos::new(db.connection());

    let cats = || group::ActiveModel {
        id: Set(new_id()),
        title: Set("Cats".to_string()),
        slug: Set("cats".to_string()),
        description: Set(String::new()),
        created_at: Set(Utc::now().into()),
    };
    repos.groups.create(cats()).await.unwrap();

    let result = repos.groups.create(cats()).await;
    assert!(matches!(result, Err(AppError::Conflict(_))), "{result:?}");

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_comment_on_vanished_post_is_not_found() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let repos = Repos::new(db.connection());

    let serg = add_user(&repos, "serg").await;
    let result = repos
        .comments
        .create(comment::ActiveModel {
            id: Set(new_id()),
            post_id: Set("gone".to_string()),
            author_id: Set(serg.id.clone()),
            text: Set("late".to_string()),
            created_at: Set(Utc::now().into()),
        })
        .await;
    assert!(matches!(result, Err(AppError::PostNotFound(id)) if id == "gone"));

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_follow_vanished_author_is_not_found() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let repos = Repos::new(db.connection());

    let serg = add_user(&repos, "serg").await;
    let andr = add_user(&repos, "andr").await;
    assert!(repos.users.delete(&andr.id).await.unwrap());

    let result = repos.follows.insert_if_absent(edge(&serg, &andr)).await;
    assert!(matches!(result, Err(AppError::UserNotFound(id)) if id == andr.id));

    db.drop_database().await.unwrap();
}
