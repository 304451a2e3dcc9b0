use axum::routing::{get, post, put};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Groups and targets
        .route(
            "/groups",
            get(routes::groups::list_groups).post(routes::groups::create_group),
        )
        .route(
            "/groups/{id}",
            get(routes::groups::get_group).delete(routes::groups::delete_group),
        )
        .route(
            "/groups/{id}/targets",
            get(routes::groups::list_targets).post(routes::groups::create_target),
        )
        .route(
            "/targets/{id}",
            axum::routing::delete(routes::groups::delete_target),
        )
        // Baselines
        .route("/targets/{id}/baseline", post(routes::groups::capture_baseline))
        .route("/captures/{id}/promote", post(routes::groups::promote_capture))
        // Runs
        .route(
            "/groups/{id}/runs",
            get(routes::runs::list_runs).post(routes::runs::start_run),
        )
        .route("/runs/{id}", get(routes::runs::get_run))
        // Schedules
        .route("/schedules/active", get(routes::schedules::list_active))
        .route("/groups/{id}/schedule", put(routes::schedules::put_schedule))
        .route(
            "/schedules/{id}",
            axum::routing::delete(routes::schedules::delete_schedule),
        )
        .route("/schedules/{id}/trigger", post(routes::schedules::trigger))
        .route("/schedules/{id}/runs", get(routes::schedules::list_schedule_runs))
        // Notification settings
        .route(
            "/settings/notifications",
            get(routes::settings::get_notifications).put(routes::settings::put_notifications),
        )
        .route(
            "/settings/notifications/test",
            post(routes::settings::test_notifications),
        )
        // Logs
        .route("/logs/history", get(routes::logs::log_history))
        .route("/logs/stream", get(routes::logs::log_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .with_state(state)
}
