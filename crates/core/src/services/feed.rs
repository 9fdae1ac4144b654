//! Feed service: paginated, newest-first post listings.

use std::collections::HashMap;
use std::sync::Arc;

use quill_common::{AppError, AppResult, Page, PageRequest, StorageBackend};
use quill_db::{
    entities::{group, post, user},
    repositories::{FollowRepository, GroupRepository, PostRepository, PostScope, UserRepository},
};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::TimelineCache;
use crate::guard::require_actor;

/// Group a post is filed under, as shown next to the post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    pub id: String,
    pub slug: String,
    pub title: String,
}

/// A post with everything needed to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_username: String,
    pub group: Option<GroupRef>,
    pub image_url: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: Option<DateTimeWithTimeZone>,
}

/// A group with one page of its posts.
#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: group::Model,
    pub posts: Page<PostView>,
}

/// An author's profile with one page of their posts.
#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: user::Model,
    pub post_count: u64,
    pub followers_count: u64,
    pub following_count: u64,
    /// Whether the viewer follows this author. Always false for anonymous viewers.
    pub is_followed: bool,
    pub posts: Page<PostView>,
}

/// Turns post rows into [`PostView`]s, batching the author and group lookups.
#[derive(Clone)]
pub struct PostViewAssembler {
    user_repo: UserRepository,
    group_repo: GroupRepository,
    storage: Arc<dyn StorageBackend>,
}

impl PostViewAssembler {
    /// Create a new assembler.
    #[must_use]
    pub fn new(
        user_repo: UserRepository,
        group_repo: GroupRepository,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            user_repo,
            group_repo,
            storage,
        }
    }

    /// Build views for a batch of posts, keeping their order.
    pub async fn assemble(&self, posts: Vec<post::Model>) -> AppResult<Vec<PostView>> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let mut author_ids: Vec<String> = posts.iter().map(|p| p.author_id.clone()).collect();
        author_ids.sort_unstable();
        author_ids.dedup();

        let mut group_ids: Vec<String> = posts.iter().filter_map(|p| p.group_id.clone()).collect();
        group_ids.sort_unstable();
        group_ids.dedup();

        let authors: HashMap<String, String> = self
            .user_repo
            .find_by_ids(&author_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();

        let groups: HashMap<String, GroupRef> = self
            .group_repo
            .find_by_ids(&group_ids)
            .await?
            .into_iter()
            .map(|g| {
                (
                    g.id.clone(),
                    GroupRef {
                        id: g.id,
                        slug: g.slug,
                        title: g.title,
                    },
                )
            })
            .collect();

        posts
            .into_iter()
            .map(|post| {
                let author_username = authors
                    .get(&post.author_id)
                    .cloned()
                    .ok_or_else(|| AppError::UserNotFound(post.author_id.clone()))?;
                let group = post.group_id.as_ref().and_then(|id| groups.get(id).cloned());

                Ok(PostView {
                    image_url: post.image.as_deref().map(|key| self.storage.public_url(key)),
                    id: post.id,
                    text: post.text,
                    author_id: post.author_id,
                    author_username,
                    group,
                    created_at: post.created_at,
                    updated_at: post.updated_at,
                })
            })
            .collect()
    }

    /// Build the view of a single post.
    pub async fn assemble_one(&self, post: post::Model) -> AppResult<PostView> {
        let id = post.id.clone();
        self.assemble(vec![post])
            .await?
            .pop()
            .ok_or(AppError::PostNotFound(id))
    }
}

/// Feed service for business logic.
#[derive(Clone)]
pub struct FeedService {
    post_repo: PostRepository,
    user_repo: UserRepository,
    group_repo: GroupRepository,
    follow_repo: FollowRepository,
    views: PostViewAssembler,
    cache: Arc<dyn TimelineCache>,
    page_size: u64,
}

impl FeedService {
    /// Create a new feed service.
    #[must_use]
    pub fn new(
        post_repo: PostRepository,
        user_repo: UserRepository,
        group_repo: GroupRepository,
        follow_repo: FollowRepository,
        views: PostViewAssembler,
        cache: Arc<dyn TimelineCache>,
        page_size: u64,
    ) -> Self {
        Self {
            post_repo,
            user_repo,
            group_repo,
            follow_repo,
            views,
            cache,
            page_size,
        }
    }

    /// Page request for a raw `?page=` value at the configured page size.
    #[must_use]
    pub fn page_request(&self, raw: Option<&str>) -> PageRequest {
        PageRequest::from_param(raw, self.page_size)
    }

    /// The public timeline: every post, newest first.
    ///
    /// Pages are served from the timeline cache while it holds them.
    pub async fn list_timeline(&self, page: PageRequest) -> AppResult<Page<PostView>> {
        let key = timeline_key(page);

        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_str(&cached) {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!(error = %e, key = %key, "Discarding unreadable timeline cache entry");
                }
            }
        }

        let result = self.load_page(&PostScope::All, page).await?;

        match serde_json::to_string(&result) {
            Ok(json) => self.cache.put(&key, json).await,
            Err(e) => warn!(error = %e, "Failed to serialize timeline page"),
        }

        Ok(result)
    }

    /// Posts filed under the group with `slug`.
    pub async fn list_group(&self, slug: &str, page: PageRequest) -> AppResult<GroupFeed> {
        let group = self.group_repo.get_by_slug(slug).await?;
        let posts = self
            .load_page(&PostScope::Group(group.id.clone()), page)
            .await?;

        Ok(GroupFeed { group, posts })
    }

    /// An author's profile and posts, as seen by `viewer`.
    pub async fn list_profile(
        &self,
        viewer: Option<&user::Model>,
        username: &str,
        page: PageRequest,
    ) -> AppResult<ProfileFeed> {
        let author = self.user_repo.get_by_username(username).await?;
        let posts = self
            .load_page(&PostScope::Author(author.id.clone()), page)
            .await?;

        let is_followed = match viewer {
            Some(viewer) if viewer.id != author.id => {
                self.follow_repo.is_following(&viewer.id, &author.id).await?
            }
            _ => false,
        };

        let followers_count = self.follow_repo.count_followers(&author.id).await?;
        let following_count = self.follow_repo.count_following(&author.id).await?;

        Ok(ProfileFeed {
            post_count: posts.pagination.total_count,
            author,
            followers_count,
            following_count,
            is_followed,
            posts,
        })
    }

    /// Posts by every author the actor follows. Empty when following nobody.
    pub async fn list_following_feed(
        &self,
        actor: Option<&user::Model>,
        page: PageRequest,
    ) -> AppResult<Page<PostView>> {
        let actor = require_actor(actor)?;
        self.load_page(&PostScope::FollowedBy(actor.id.clone()), page)
            .await
    }

    async fn load_page(&self, scope: &PostScope, page: PageRequest) -> AppResult<Page<PostView>> {
        let total = self.post_repo.count(scope).await?;
        let info = page.resolve(total);

        if info.item_count() == 0 {
            return Ok(Page::new(Vec::new(), info));
        }

        let posts = self
            .post_repo
            .find_page(scope, info.per_page, info.offset())
            .await?;
        let views = self.views.assemble(posts).await?;

        Ok(Page::new(views, info))
    }
}

/// Cache key of a timeline page.
#[must_use]
pub fn timeline_key(page: PageRequest) -> String {
    format!("page:{}:{}", page.number, page.per_page)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::MemoryTimelineCache;
    use crate::fixtures;
    use quill_common::LocalStorage;
    use quill_db::entities::follow;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use std::time::Duration;

    fn count_row(n: i64) -> [std::collections::BTreeMap<&'static str, sea_orm::Value>; 1] {
        [maplit::btreemap! { "num_items" => sea_orm::Value::BigInt(Some(n)) }]
    }

    fn empty_db() -> Arc<DatabaseConnection> {
        Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection())
    }

    fn storage() -> Arc<dyn StorageBackend> {
        Arc::new(LocalStorage::new("./media".into(), "/media".to_string()))
    }

    struct Dbs {
        post: Arc<DatabaseConnection>,
        user: Arc<DatabaseConnection>,
        group: Arc<DatabaseConnection>,
        follow: Arc<DatabaseConnection>,
    }

    fn service(dbs: Dbs, cache: Arc<dyn TimelineCache>) -> FeedService {
        let user_repo = UserRepository::new(dbs.user);
        let group_repo = GroupRepository::new(dbs.group);
        let views = PostViewAssembler::new(user_repo.clone(), group_repo.clone(), storage());
        FeedService::new(
            PostRepository::new(dbs.post),
            user_repo,
            group_repo,
            FollowRepository::new(dbs.follow),
            views,
            cache,
            10,
        )
    }

    fn memory_cache() -> Arc<dyn TimelineCache> {
        Arc::new(MemoryTimelineCache::new(Duration::from_secs(20)))
    }

    #[tokio::test]
    async fn test_list_timeline_assembles_views() {
        let mut with_image = fixtures::post("p2", "u1", Some("g1"));
        with_image.image = Some("posts/2025/01/01/a.png".to_string());

        let dbs = Dbs {
            post: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([count_row(2)])
                    .append_query_results([[with_image, fixtures::post("p1", "u1", None)]])
                    .into_connection(),
            ),
            user: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[fixtures::user("u1", "serg")]])
                    .into_connection(),
            ),
            group: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[fixtures::group("g1", "cats")]])
                    .into_connection(),
            ),
            follow: empty_db(),
        };

        let service = service(dbs, memory_cache());
        let page = service
            .list_timeline(service.page_request(None))
            .await
            .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination.total_count, 2);
        assert_eq!(page.items[0].author_username, "serg");
        assert_eq!(page.items[0].group.as_ref().unwrap().slug, "cats");
        assert_eq!(
            page.items[0].image_url.as_deref(),
            Some("/media/posts/2025/01/01/a.png")
        );
        assert!(page.items[1].group.is_none());
    }

    #[tokio::test]
    async fn test_list_timeline_served_from_cache() {
        // Only one count and one page query are available; a second read
        // that reached the database would fail.
        let dbs = Dbs {
            post: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([count_row(1)])
                    .append_query_results([[fixtures::post("p1", "u1", None)]])
                    .into_connection(),
            ),
            user: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[fixtures::user("u1", "serg")]])
                    .into_connection(),
            ),
            group: empty_db(),
            follow: empty_db(),
        };

        let cache = memory_cache();
        let service = service(dbs, cache.clone());
        let page = service.page_request(Some("1"));

        let first = service.list_timeline(page).await.unwrap();
        let second = service.list_timeline(page).await.unwrap();
        assert_eq!(first, second);

        // Once cleared the next read goes back to the (now exhausted) database
        cache.clear().await;
        assert!(service.list_timeline(page).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_timeline_is_single_page() {
        let dbs = Dbs {
            post: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([count_row(0)])
                    .into_connection(),
            ),
            user: empty_db(),
            group: empty_db(),
            follow: empty_db(),
        };

        let service = service(dbs, memory_cache());
        let page = service
            .list_timeline(service.page_request(Some("7")))
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.pagination.number, 1);
        assert_eq!(page.pagination.total_pages, 1);
    }

    #[tokio::test]
    async fn test_page_beyond_last_is_clamped() {
        let posts: Vec<_> = (0..3)
            .map(|i| fixtures::post(&format!("p{i}"), "u1", None))
            .collect();

        let dbs = Dbs {
            post: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([count_row(13)])
                    .append_query_results([posts])
                    .into_connection(),
            ),
            user: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[fixtures::user("u1", "serg")]])
                    .into_connection(),
            ),
            group: empty_db(),
            follow: empty_db(),
        };

        let service = service(dbs, memory_cache());
        let feed = service
            .list_following_feed(
                Some(&fixtures::user("u2", "andr")),
                service.page_request(Some("99")),
            )
            .await
            .unwrap();

        assert_eq!(feed.pagination.number, 2);
        assert_eq!(feed.items.len(), 3);
        assert!(!feed.pagination.has_next);
    }

    #[tokio::test]
    async fn test_following_feed_requires_actor() {
        let dbs = Dbs {
            post: empty_db(),
            user: empty_db(),
            group: empty_db(),
            follow: empty_db(),
        };

        let service = service(dbs, memory_cache());
        let result = service
            .list_following_feed(None, service.page_request(None))
            .await;

        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_list_group_not_found() {
        let dbs = Dbs {
            post: empty_db(),
            user: empty_db(),
            group: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([Vec::<group::Model>::new()])
                    .into_connection(),
            ),
            follow: empty_db(),
        };

        let service = service(dbs, memory_cache());
        let result = service.list_group("nope", service.page_request(None)).await;

        assert!(matches!(result, Err(AppError::GroupNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_profile_followed_by_viewer() {
        let serg = fixtures::user("u1", "serg");
        let andr = fixtures::user("u2", "andr");

        let dbs = Dbs {
            post: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([count_row(0)])
                    .into_connection(),
            ),
            user: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[serg.clone()]])
                    .into_connection(),
            ),
            group: empty_db(),
            follow: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[follow::Model {
                        id: "f1".to_string(),
                        follower_id: "u2".to_string(),
                        author_id: "u1".to_string(),
                        created_at: chrono::Utc::now().into(),
                    }]])
                    .append_query_results([count_row(1)])
                    .append_query_results([count_row(0)])
                    .into_connection(),
            ),
        };

        let service = service(dbs, memory_cache());
        let profile = service
            .list_profile(Some(&andr), "Serg", service.page_request(None))
            .await
            .unwrap();

        assert!(profile.is_followed);
        assert_eq!(profile.author.username, "serg");
        assert_eq!(profile.post_count, 0);
        assert_eq!(profile.followers_count, 1);
    }

    #[tokio::test]
    async fn test_list_profile_anonymous_viewer() {
        let dbs = Dbs {
            post: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([count_row(0)])
                    .into_connection(),
            ),
            user: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[fixtures::user("u1", "serg")]])
                    .into_connection(),
            ),
            group: empty_db(),
            follow: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([count_row(4)])
                    .append_query_results([count_row(2)])
                    .into_connection(),
            ),
        };

        let service = service(dbs, memory_cache());
        let profile = service
            .list_profile(None, "serg", service.page_request(None))
            .await
            .unwrap();

        assert!(!profile.is_followed);
        assert_eq!(profile.followers_count, 4);
        assert_eq!(profile.following_count, 2);
    }

    /// Post rows for a first read holding p2 and p1, then a second read after
    /// p2 was deleted.
    fn timeline_before_and_after_delete() -> Dbs {
        Dbs {
            post: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([count_row(2)])
                    .append_query_results([[
                        fixtures::post("p2", "u1", None),
                        fixtures::post("p1", "u1", None),
                    ]])
                    .append_query_results([count_row(1)])
                    .append_query_results([[fixtures::post("p1", "u1", None)]])
                    .into_connection(),
            ),
            user: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[fixtures::user("u1", "serg")]])
                    .append_query_results([[fixtures::user("u1", "serg")]])
                    .into_connection(),
            ),
            group: empty_db(),
            follow: empty_db(),
        }
    }

    fn ids(page: &Page<PostView>) -> Vec<&str> {
        page.items.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_timeline_stale_until_invalidated() {
        let cache = memory_cache();
        let service = service(timeline_before_and_after_delete(), cache.clone());
        let page = service.page_request(None);

        let before = service.list_timeline(page).await.unwrap();
        assert_eq!(ids(&before), ["p2", "p1"]);

        // p2 is deleted behind the service's back: the cached page still has it
        let stale = service.list_timeline(page).await.unwrap();
        assert_eq!(ids(&stale), ["p2", "p1"]);

        cache.invalidate(&timeline_key(page)).await;

        let fresh = service.list_timeline(page).await.unwrap();
        assert_eq!(ids(&fresh), ["p1"]);
        assert_eq!(fresh.pagination.total_count, 1);
    }

    #[tokio::test]
    async fn test_delete_post_drops_it_from_cached_timeline() {
        use crate::services::{CommentService, PostService};
        use quill_db::repositories::CommentRepository;
        use sea_orm::MockExecResult;

        let cache = memory_cache();
        let feed = service(timeline_before_and_after_delete(), cache.clone());
        let page = feed.page_request(None);

        let before = feed.list_timeline(page).await.unwrap();
        assert_eq!(ids(&before), ["p2", "p1"]);

        let post_repo = PostRepository::new(Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[fixtures::post("p2", "u1", None)]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        ));
        let user_repo = UserRepository::new(empty_db());
        let group_repo = GroupRepository::new(empty_db());
        let posts = PostService::new(
            post_repo.clone(),
            group_repo.clone(),
            CommentService::new(
                CommentRepository::new(empty_db()),
                post_repo,
                user_repo.clone(),
            ),
            PostViewAssembler::new(user_repo, group_repo, storage()),
            storage(),
            cache.clone(),
        );

        let serg = fixtures::user("u1", "serg");
        posts.delete_post(Some(&serg), "p2").await.unwrap();

        let after = feed.list_timeline(page).await.unwrap();
        assert_eq!(ids(&after), ["p1"]);
    }
}
