//! Quill server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::StatusCode, middleware, routing::get};
use fred::prelude::*;
use quill_api::{AppState, auth_middleware, router as api_router};
use quill_common::{Config, LocalStorage, StorageBackend};
use quill_core::{
    CommentService, FeedService, FollowingService, GroupService, MemoryTimelineCache,
    PostService, PostViewAssembler, RedisTimelineCache, TimelineCache, UserService,
};
use quill_db::repositories::{
    CommentRepository, FollowRepository, GroupRepository, PostRepository, UserRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Pick the timeline cache: Redis when configured, process memory otherwise.
async fn timeline_cache(
    config: &Config,
) -> Result<Arc<dyn TimelineCache>, Box<dyn std::error::Error>> {
    let ttl = Duration::from_secs(config.feed.timeline_cache_ttl_secs);

    let Some(redis) = &config.redis else {
        info!("No Redis configured, caching the timeline in memory");
        return Ok(Arc::new(MemoryTimelineCache::new(ttl)));
    };

    info!("Connecting to Redis...");
    let redis_config = fred::types::config::Config::from_url(&redis.url)?;
    let client = fred::clients::Client::new(redis_config, None, None, None);
    client.connect();
    client.wait_for_connect().await?;
    info!("Connected to Redis for the timeline cache");

    Ok(Arc::new(RedisTimelineCache::new(
        Arc::new(client),
        &redis.prefix,
        ttl,
    )))
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting quill server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(quill_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    quill_db::migrate(&db).await?;
    info!("Migrations completed");

    let cache = timeline_cache(&config).await?;

    tokio::fs::create_dir_all(&config.storage.base_path).await?;
    let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(
        config.storage.base_path.clone(),
        config.storage.base_url.clone(),
    ));

    // Initialize repositories
    let user_repo = UserRepository::new(Arc::clone(&db));
    let group_repo = GroupRepository::new(Arc::clone(&db));
    let post_repo = PostRepository::new(Arc::clone(&db));
    let follow_repo = FollowRepository::new(Arc::clone(&db));
    let comment_repo = CommentRepository::new(Arc::clone(&db));

    // Initialize services
    let views = PostViewAssembler::new(user_repo.clone(), group_repo.clone(), storage.clone());
    let comment_service =
        CommentService::new(comment_repo, post_repo.clone(), user_repo.clone());

    let state = AppState {
        user_service: UserService::new(user_repo.clone(), cache.clone()),
        group_service: GroupService::new(group_repo.clone(), cache.clone()),
        post_service: PostService::new(
            post_repo.clone(),
            group_repo.clone(),
            comment_service.clone(),
            views.clone(),
            storage,
            cache.clone(),
        ),
        comment_service,
        following_service: FollowingService::new(follow_repo.clone(), user_repo.clone()),
        feed_service: FeedService::new(
            post_repo,
            user_repo,
            group_repo,
            follow_repo,
            views,
            cache,
            config.feed.page_size,
        ),
    };

    // Build router
    let mut app = Router::new()
        .route("/health", get(health))
        .nest("/api", api_router());

    // Images are served from here unless they live behind an external URL
    if config.storage.base_url.starts_with('/') {
        app = app.nest_service(
            config.storage.base_url.trim_end_matches('/'),
            ServeDir::new(&config.storage.base_path),
        );
    }

    let app = app
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
