use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use tracing::instrument;

use super::dto::{AnalyzeResponse, HistoryQuery, InputMode, MealDetail};
use super::repo;
use super::repo_types::{StoredDish, StoredMeal};
use super::services::{analyze_and_record, MealInput};
use crate::charts::{CurrentMealCharts, HistoryCharts};
use crate::error::AppError;
use crate::nutrition::ImageUpload;
use crate::state::AppState;

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/:id", get(get_meal))
        .route("/meals/:id/dishes", get(list_dishes))
        .route("/history", get(history))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/meals/analyze", post(analyze_meal))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

// --- handlers ---

/// POST /meals/analyze (multipart)
/// Parts: `image` (file), `text`, `mode` ("image" | "text"); all optional.
#[instrument(skip(state, mp))]
pub async fn analyze_meal(
    State(state): State<AppState>,
    WithRejection(mut mp, _): WithRejection<Multipart, AppError>,
) -> Result<(StatusCode, HeaderMap, Json<AnalyzeResponse>), AppError> {
    let input = read_meal_input(&mut mp).await?;
    let (meal_id, analysis) = analyze_and_record(&state, input).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/meals/{}", meal_id)) {
        headers.insert(header::LOCATION, location);
    }

    let charts = CurrentMealCharts::from_analysis(&analysis);
    Ok((
        StatusCode::CREATED,
        headers,
        Json(AnalyzeResponse {
            meal_id,
            analysis,
            charts,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_meals(State(state): State<AppState>) -> Result<Json<Vec<StoredMeal>>, AppError> {
    Ok(Json(repo::list_meals(&state.db).await?))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Json<MealDetail>, AppError> {
    let meal = repo::get_meal(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("meal {id} not found")))?;
    let dishes = repo::list_dishes_by_meal(&state.db, id).await?;
    Ok(Json(MealDetail { meal, dishes }))
}

#[instrument(skip(state))]
pub async fn list_dishes(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Json<Vec<StoredDish>>, AppError> {
    Ok(Json(repo::list_dishes_by_meal(&state.db, id).await?))
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<HistoryQuery>, AppError>,
) -> Result<Json<HistoryCharts>, AppError> {
    let meals = repo::list_meals(&state.db).await?;
    Ok(Json(HistoryCharts::build(&meals, q.view, state.history_offset)))
}

async fn read_meal_input(mp: &mut Multipart) -> Result<MealInput, AppError> {
    let mut input = MealInput::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::Input(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("image") => {
                // Checked in `MealInput::resolve`, once the mode is known.
                let content_type = field
                    .content_type()
                    .map(|s| s.to_ascii_lowercase())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Input(format!("could not read image: {e}")))?;
                if !body.is_empty() {
                    input.image = Some(ImageUpload { body, content_type });
                }
            }
            Some("text") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Input(format!("could not read text: {e}")))?;
                input.text = Some(text);
            }
            Some("mode") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Input(format!("could not read mode: {e}")))?;
                input.mode = Some(raw.parse::<InputMode>().map_err(AppError::Input)?);
            }
            _ => {}
        }
    }
    Ok(input)
}
