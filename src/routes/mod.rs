use axum::Router;
use std::sync::Arc;

use crate::AppState;

pub mod worker;

/// Build the complete route tree
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new().merge(worker::routes())
}
