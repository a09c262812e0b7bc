use axum::{routing::get, Router};

use crate::{
    api::{derived, health, sources, users},
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::health_check))
        .route("/sources", get(sources::list_sources))
        .route(
            "/sources/:name",
            get(sources::get_source)
                .put(sources::put_source)
                .delete(sources::delete_source),
        )
        .route(
            "/sources/:name/readings",
            get(sources::list_readings)
                .post(sources::post_reading)
                .delete(sources::delete_readings),
        )
        .route("/sources/:name/descendants", get(derived::descendants))
        .route("/sources/:name/latest", get(derived::latest))
        .route("/sources/:name/power", get(derived::power))
        .route("/sources/:name/energy", get(derived::energy))
        .route("/sources/:name/carbon", get(derived::carbon))
        .route("/sources/:name/carbon/supported", get(derived::carbon_supported))
        .route("/users", get(users::list_users))
        .route(
            "/users/:username",
            get(users::get_user).put(users::put_user).delete(users::delete_user),
        )
        .with_state(state)
}
