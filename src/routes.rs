use axum::{extract::Path, response::Html, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::ws;

/// Browser client: asks for a username, then opens `/ws/{username}`
pub const CHAT_PAGE: &str = include_str!("../static/chat.html");

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{username}", get(ws::ws_handler))
        .route("/", get(chat_page))
        .route("/{client_id}", get(chat_page_for_client))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /
pub async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

/// GET /{client_id}. The identifier is not used by the page.
pub async fn chat_page_for_client(Path(client_id): Path<String>) -> Html<&'static str> {
    tracing::debug!(client_id = %client_id, "Serving chat page");
    Html(CHAT_PAGE)
}
