//! HTTP API for Postify
//!
//! Public auth routes and session-protected post/account routes, all nested
//! under `/api`.

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use libpostify::config::{Config, SessionBackend};
use libpostify::image_gen::{ImageGenerator, StabilityClient};
use libpostify::{
    Database, IdentityService, MediaStore, MemorySessionStore, MultiPlatformPoster, SessionStore,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes::{accounts, auth, posts};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub config: Arc<Config>,
    pub db: Database,
    pub identity: IdentityService,
    pub poster: MultiPlatformPoster,
    pub media: MediaStore,
    pub images: Arc<dyn ImageGenerator>,
}

impl AppStateInner {
    /// Build the production state: HTTP adapters, Stability client and the
    /// session backend named in `[server]`
    pub fn from_config(config: Config, db: Database) -> libpostify::Result<AppState> {
        let sessions: Arc<dyn SessionStore> = match config.server.session_backend {
            SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
            SessionBackend::Database => Arc::new(db.clone()),
        };
        let poster = MultiPlatformPoster::from_config(&config, Arc::new(db.clone()))?;

        Ok(Arc::new(Self {
            identity: IdentityService::new(db.clone(), sessions),
            media: MediaStore::new(config.media_root()),
            images: Arc::new(StabilityClient::new(&config.image_generation)?),
            poster,
            db,
            config: Arc::new(config),
        }))
    }
}

pub fn app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/profile", get(auth::profile).put(auth::update_profile))
        .route("/auth/change-password", post(auth::change_password))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/generate-image", post(posts::generate_image))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .route(
            "/posts/{id}/image",
            put(posts::upload_image).layer(DefaultBodyLimit::max(posts::MAX_IMAGE_BYTES)),
        )
        .route("/posts/{id}/publish", post(posts::publish))
        .route("/posts/{id}/results", get(posts::results))
        .route(
            "/accounts",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/accounts/{id}",
            put(accounts::update_account).delete(accounts::delete_account),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
