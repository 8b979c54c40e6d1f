mod dto;
pub mod handlers;
pub mod repo;
mod repo_types;
mod services;

use crate::state::AppState;
use axum::Router;

pub use dto::{AnalyzeResponse, InputMode, MealDetail};
pub use repo_types::{StoredDish, StoredMeal};
pub use services::{analyze_and_record, MealInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
