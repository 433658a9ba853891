use axum::{extract::State, routing::get, Json, Router};

use crate::error::ApiError;
use crate::middleware::auth_context::AuthContext;
use crate::models::{role_to_string, AppState};

#[derive(serde::Serialize)]
pub struct HomeResponse {
    pub data: HomeData,
}

#[derive(serde::Serialize)]
pub struct HomeData {
    pub view: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/home", get(home))
}

/// Tells the frontend which landing view to render for the logged-in role.
pub async fn home(
    State(_state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<HomeResponse>, ApiError> {
    Ok(Json(HomeResponse {
        data: HomeData {
            view: role_to_string(auth.role),
        },
    }))
}
