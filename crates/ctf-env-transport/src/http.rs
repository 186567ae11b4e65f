//! HTTP transport: one POST endpoint driving the session controller.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{
        Method,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, AUTHORIZATION, CONTENT_TYPE,
        },
    },
    response::IntoResponse,
    routing::post,
};
use ctf_env_core::ChainBackend;
use ctf_env_session::SessionController;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::protocol::ControlRequest;

/// Control request handler.
///
/// Every outcome, including undecodable bodies, is answered with 200 and a
/// plain-text body so clients parse one shape. Commands run on their own
/// task and complete even when the client disconnects mid-request.
pub async fn control_handler<B>(
    State(controller): State<Arc<SessionController<B>>>,
    body: Bytes,
) -> impl IntoResponse
where
    B: ChainBackend + 'static,
{
    let text = match serde_json::from_slice::<ControlRequest>(&body) {
        Ok(request) => {
            let method = request.method.clone();
            match request.into_command() {
                Ok(command) => {
                    tracing::info!(%method, "Control request");
                    controller.execute_detached(command).await
                }
                Err(e) => {
                    tracing::warn!(%method, "Rejected control request: {e}");
                    e.reply().to_string()
                }
            }
        }
        Err(e) => {
            tracing::warn!("Invalid control request: {e}");
            format!("Invalid request: {e}")
        }
    };

    (
        [
            (CONTENT_TYPE, "application/json"),
            (ACCESS_CONTROL_ALLOW_HEADERS, "Authorization, Content-Type"),
            (ACCESS_CONTROL_ALLOW_METHODS, "POST"),
        ],
        text,
    )
}

/// Create the control router.
///
/// # Example
/// ```ignore
/// let app = create_router(Arc::new(controller));
/// axum::serve(listener, app).await?;
/// ```
#[must_use]
pub fn create_router<B>(controller: Arc<SessionController<B>>) -> Router
where
    B: ChainBackend + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/", post(control_handler::<B>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}
