// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempts, auth, health, sets, taxonomy},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public: health, auth, taxonomy and set browsing.
/// * Authenticated: attempts and the annotated unit listing.
/// * Admin: ingestion, question management, set regeneration.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let set_routes = Router::new()
        .route("/", get(sets::list_sets))
        .route("/{id}", get(sets::get_set));

    let attempt_routes = Router::new()
        .route(
            "/progress",
            post(attempts::submit_answer).get(attempts::get_progress),
        )
        .route("/history", get(attempts::get_history))
        .route("/reset", post(attempts::reset_progress))
        .route("/complete", post(attempts::complete_attempt))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let unit_routes = Router::new()
        .route("/{unit_id}", get(taxonomy::get_unit))
        // Progress annotation needs the caller
        .merge(
            Router::new()
                .route("/{unit_id}/sets", get(sets::unit_sets))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        );

    let subject_routes = Router::new()
        .route("/", get(taxonomy::list_subjects))
        .route("/{id}/units", get(taxonomy::subject_units));

    let admin_routes = Router::new()
        .route("/questions", post(admin::create_question))
        .route("/questions/bulk", post(admin::bulk_import))
        .route("/questions/{id}", delete(admin::delete_question))
        .route("/sets/chapters", post(admin::pack_all_chapters))
        .route("/sets/chapters/{id}", post(admin::pack_chapter))
        .route("/sets/titles/{id}", post(admin::rebuild_title))
        .route("/sets/title-chapters", post(admin::rebuild_title_chapters))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/auth", auth_routes)
        .nest("/api/sets", set_routes)
        .route("/api/chapters/{id}/sets", get(sets::chapter_sets))
        .route("/api/titles", get(taxonomy::list_titles))
        .route("/api/exams", get(taxonomy::list_exams))
        .nest("/api/subjects", subject_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/units", unit_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::{Config, StoreBackend},
        store::Store,
    };

    fn test_router() -> Router {
        let config = Config {
            store_backend: StoreBackend::Memory,
            database_url: None,
            jwt_secret: "router-test".to_string(),
            jwt_expiration: 60,
            rust_log: "error".to_string(),
            bind_addr: ([127, 0, 0, 1], 0).into(),
            cors_origins: vec!["not a header\n".to_string()],
            admin_username: None,
            admin_password: None,
        };
        create_router(AppState::new(Store::in_memory(), config))
    }

    #[tokio::test]
    async fn invalid_cors_origins_do_not_break_startup() {
        let resp = test_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_routes_need_a_bearer_token() {
        let resp = test_router()
            .oneshot(
                Request::post("/api/admin/sets/chapters")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unit_detail_is_public_but_its_sets_are_not() {
        let unit = crate::models::ids::UnitId::new();

        let detail = test_router()
            .oneshot(Request::get(format!("/api/units/{unit}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(detail.status(), StatusCode::NOT_FOUND);

        let sets = test_router()
            .oneshot(Request::get(format!("/api/units/{unit}/sets")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(sets.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bad_tokens_are_rejected() {
        let resp = test_router()
            .oneshot(
                Request::get("/api/attempts/history")
                    .header(header::AUTHORIZATION, "Bearer garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
