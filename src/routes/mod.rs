use crate::models::AppState;
use axum::Router;

pub mod auth_routes;
pub mod booking_routes;
pub mod doctor_routes;
pub mod home_routes;
pub mod report_routes;
pub mod schedule_routes;
pub mod specialty_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/users", user_routes::router())
        .nest("/api/v1", specialty_routes::router())
        .nest("/api/v1", doctor_routes::router())
        .nest("/api/v1", schedule_routes::router())
        .nest("/api/v1", booking_routes::router())
        .nest("/api/v1", report_routes::router())
        .merge(home_routes::router())
        .with_state(state)
}
