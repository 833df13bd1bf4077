use axum::{
    routing::get,
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Element search (static segment takes precedence over :element)
        .route(
            "/orgs/:org/projects/:project/branches/:branch/elements/search",
            get(handlers::search_elements::<S>),
        )
        // Bulk element operations
        .route(
            "/orgs/:org/projects/:project/branches/:branch/elements",
            get(handlers::get_elements::<S>)
                .post(handlers::post_elements::<S>)
                .patch(handlers::patch_elements::<S>)
                .put(handlers::put_elements::<S>)
                .delete(handlers::delete_elements::<S>),
        )
        // Single element operations
        .route(
            "/orgs/:org/projects/:project/branches/:branch/elements/:element",
            get(handlers::get_element::<S>)
                .post(handlers::post_element::<S>)
                .patch(handlers::patch_element::<S>)
                .put(handlers::put_element::<S>)
                .delete(handlers::delete_element::<S>),
        )
}
