pub mod accounts;
pub mod health;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api/v1", accounts::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Accounts
        accounts::register,
        accounts::login,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::account::AccountProfile,
            crate::gateway::hub::HubStats,
            // Route request/response types
            health::HealthResponse,
            accounts::RegisterRequest,
            accounts::LoginRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Accounts", description = "Account registration and login"),
    )
)]
pub struct ApiDoc;
