use crate::state::AppState;
use axum::Router;

mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod hashing;
pub mod jwt;
pub mod repo;
pub mod verification;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
