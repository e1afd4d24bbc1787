//! Axum router wiring.
//!
//! Parameter endpoints and ops endpoints are fixed; one `/{route}/:name`
//! greeting endpoint is added per configured route.

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};

use crate::{
    api::{params, routes},
    app_state::AppState,
    ops,
};

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/update", axum::routing::post(params::update_json))
        .route("/params", get(params::list))
        .route("/params/:name", get(params::get_one))
        .route(
            "/params/:name/:value",
            axum::routing::put(params::update_path).post(params::update_path),
        )
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics));

    for route in &state.cfg().routes {
        let owned = route.clone();
        router = router.route(
            &format!("/{route}/:name"),
            get(move |State(app): State<AppState>, Path(name): Path<String>| {
                let route = owned.clone();
                async move { routes::route_call(app, route, name).await }
            }),
        );
    }

    router.with_state(state)
}
