use axum::{
    routing::{get, MethodRouter},
    Router,
};

use crate::api::handlers::{self, SharedState};

/// Workspace routes; verbs are mounted only when enabled in
/// `processor.operations`, so disabled verbs answer 405.
pub fn create_router(state: SharedState) -> Router {
    let resource = resource_routes(&state);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Dependency graph listing
        .route("/operations", get(handlers::list_operations))
        // Operations, directory indexes and files
        .route("/", resource.clone())
        .route("/*path", resource)
        .with_state(state)
}

fn resource_routes(state: &SharedState) -> MethodRouter<SharedState> {
    let config = &state.config;
    let mut routes = MethodRouter::new();
    if config.allows("GET") {
        routes = routes.get(handlers::get_resource);
    }
    if config.allows("PUT") {
        routes = routes.put(handlers::put_resource);
    }
    if config.allows("POST") {
        routes = routes.post(handlers::put_resource);
    }
    if config.allows("DELETE") {
        routes = routes.delete(handlers::delete_resource);
    }
    routes
}
