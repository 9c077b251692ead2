use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod query;
pub mod status;

/// Assemble every route of the service (all root-level).
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(query::router())
        .merge(status::router())
}
