//! Per-route greeting endpoints: `GET /{route}/:name`.
//!
//! Each hit is counted locally and through the sink as `{route}_api_call`.

use crate::app_state::AppState;
use crate::sink::RouteCall;

pub async fn route_call(app: AppState, route: String, name: String) -> String {
    app.metrics().route_calls.inc(&[("route", route.as_str())]);

    let service = route.to_uppercase();
    tracing::info!(%service, %name, "received request");

    let reply = format!("Hello from {service} service, {name}");
    app.sink().record_call(&RouteCall { route, name });
    reply
}
