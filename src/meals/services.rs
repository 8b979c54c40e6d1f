use tracing::{info, warn};

use super::dto::InputMode;
use super::repo;
use crate::error::AppError;
use crate::nutrition::{ImageUpload, MealAnalysis, MealSummary};
use crate::state::AppState;

/// Relative gap above which the model's totals are logged as inconsistent.
const CONSISTENCY_TOLERANCE: f64 = 0.25;

pub const EMPTY_INPUT_MESSAGE: &str = "Please upload an image or enter a text description.";

/// Raw input collected from a request, before mode selection.
#[derive(Debug, Default)]
pub struct MealInput {
    pub mode: Option<InputMode>,
    pub image: Option<ImageUpload>,
    pub text: Option<String>,
}

impl MealInput {
    /// Applies the input mode and drops blank text. Fails when nothing usable is left
    /// or when the image that would be used has an unsupported type.
    pub fn resolve(self) -> Result<(Option<ImageUpload>, Option<String>), AppError> {
        let text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let (image, text) = match self.mode {
            Some(InputMode::Image) => (self.image, None),
            Some(InputMode::Text) => (None, text),
            None => (self.image, text),
        };
        if image.is_none() && text.is_none() {
            return Err(AppError::Input(EMPTY_INPUT_MESSAGE.into()));
        }
        let image = image.map(canonical_image).transpose()?;
        Ok((image, text))
    }
}

fn canonical_image(mut image: ImageUpload) -> Result<ImageUpload, AppError> {
    let content_type = canonical_image_type(&image.content_type).ok_or_else(|| {
        AppError::Input(format!(
            "unsupported image type {}; use jpeg, png, webp or heic",
            image.content_type
        ))
    })?;
    image.content_type = content_type.to_string();
    Ok(image)
}

/// Registered MIME type for a supported upload, or `None`.
pub fn canonical_image_type(content_type: &str) -> Option<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("image/jpeg"),
        "image/png" => Some("image/png"),
        "image/webp" => Some("image/webp"),
        "image/heic" => Some("image/heic"),
        _ => None,
    }
}

/// Estimate the meal and persist it. Nothing is stored when estimation fails.
pub async fn analyze_and_record(
    st: &AppState,
    input: MealInput,
) -> Result<(i64, MealAnalysis), AppError> {
    let (image, text) = input.resolve()?;

    let analysis = st.estimator.estimate(image, text.as_deref()).await?;
    check_consistency(&analysis);

    let meal_id = repo::record(&st.db, &analysis.meal_summary, &analysis.dishes).await?;
    info!(meal_id, dishes = analysis.dishes.len(), "meal recorded");
    Ok((meal_id, analysis))
}

/// Logs, but tolerates, totals that disagree with the macros or with the dishes.
/// Returns the names of the flagged quantities.
fn check_consistency(analysis: &MealAnalysis) -> Vec<&'static str> {
    let mut flagged = Vec::new();
    let s = &analysis.meal_summary;
    let atwater = s.atwater_calories();
    if relative_gap(s.total_calories, atwater) > CONSISTENCY_TOLERANCE {
        warn!(
            total_calories = s.total_calories,
            atwater_calories = atwater,
            "meal calories disagree with macro energy"
        );
        flagged.push("atwater_calories");
    }

    let sums = MealSummary::sum_of(&analysis.dishes);
    let pairs = [
        ("total_calories", s.total_calories, sums.total_calories),
        ("total_protein_g", s.total_protein_g, sums.total_protein_g),
        ("total_fat_g", s.total_fat_g, sums.total_fat_g),
        ("total_carbs_g", s.total_carbs_g, sums.total_carbs_g),
        ("total_fiber_g", s.total_fiber_g, sums.total_fiber_g),
    ];
    for (field, total, sum) in pairs {
        if relative_gap(total, sum) > CONSISTENCY_TOLERANCE {
            warn!(field, total, dish_sum = sum, "meal total disagrees with dish sum");
            flagged.push(field);
        }
    }
    flagged
}

fn relative_gap(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use time::UtcOffset;

    use super::*;
    use crate::db::test_pool;
    use crate::nutrition::test_support::analysis;
    use crate::nutrition::{EstimationError, NutritionEstimator};

    struct StubEstimator {
        result: Result<MealAnalysis, String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NutritionEstimator for StubEstimator {
        async fn estimate(
            &self,
            _image: Option<ImageUpload>,
            _text: Option<&str>,
        ) -> Result<MealAnalysis, EstimationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(EstimationError::Provider)
        }
    }

    async fn state_with(result: Result<MealAnalysis, String>) -> (AppState, Arc<StubEstimator>) {
        let stub = Arc::new(StubEstimator {
            result,
            calls: AtomicUsize::new(0),
        });
        let st = AppState::from_parts(test_pool().await, stub.clone(), UtcOffset::UTC);
        (st, stub)
    }

    fn image() -> ImageUpload {
        ImageUpload {
            body: Bytes::from_static(b"jpeg"),
            content_type: "image/jpeg".into(),
        }
    }

    #[test]
    fn resolve_applies_mode_and_blank_text() {
        let input = MealInput {
            mode: Some(InputMode::Text),
            image: Some(image()),
            text: Some("  two eggs ".into()),
        };
        let (img, text) = input.resolve().unwrap();
        assert!(img.is_none());
        assert_eq!(text.as_deref(), Some("two eggs"));

        let input = MealInput {
            mode: Some(InputMode::Image),
            image: None,
            text: Some("two eggs".into()),
        };
        assert!(matches!(input.resolve(), Err(AppError::Input(_))));

        let input = MealInput {
            text: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(input.resolve(), Err(AppError::Input(_))));

        let input = MealInput {
            image: Some(image()),
            text: Some("with gravy".into()),
            ..Default::default()
        };
        let (img, text) = input.resolve().unwrap();
        assert!(img.is_some() && text.is_some());
    }

    #[test]
    fn supported_images() {
        assert_eq!(canonical_image_type("image/jpeg"), Some("image/jpeg"));
        assert_eq!(canonical_image_type("image/jpg"), Some("image/jpeg"));
        assert_eq!(canonical_image_type("Image/PNG"), Some("image/png"));
        assert_eq!(canonical_image_type("image/webp"), Some("image/webp"));
        assert_eq!(canonical_image_type("image/gif"), None);
        assert_eq!(canonical_image_type("application/octet-stream"), None);
    }

    #[test]
    fn resolve_normalises_jpg() {
        let input = MealInput {
            image: Some(ImageUpload {
                body: Bytes::from_static(b"jpeg"),
                content_type: "image/jpg".into(),
            }),
            ..Default::default()
        };
        let (img, _) = input.resolve().unwrap();
        assert_eq!(img.unwrap().content_type, "image/jpeg");
    }

    #[test]
    fn resolve_checks_image_type_only_when_used() {
        let gif = || ImageUpload {
            body: Bytes::from_static(b"GIF89a"),
            content_type: "image/gif".into(),
        };

        let input = MealInput {
            mode: Some(InputMode::Text),
            image: Some(gif()),
            text: Some("toast".into()),
        };
        let (img, text) = input.resolve().unwrap();
        assert!(img.is_none());
        assert_eq!(text.as_deref(), Some("toast"));

        let input = MealInput {
            image: Some(gif()),
            ..Default::default()
        };
        let err = input.resolve().unwrap_err();
        assert!(err.to_string().contains("image/gif"));
    }

    #[test]
    fn relative_gap_handles_zero() {
        assert_eq!(relative_gap(0.0, 0.0), 0.0);
        assert_eq!(relative_gap(100.0, 50.0), 0.5);
        assert_eq!(relative_gap(0.0, 10.0), 1.0);
        assert_eq!(relative_gap(-4.0, 4.0), 2.0);
    }

    #[test]
    fn consistent_meal_is_not_flagged() {
        assert!(check_consistency(&analysis()).is_empty());
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        // Dishes sum to 45 g carbs; 60 g is a gap of exactly 25%.
        let mut a = analysis();
        a.meal_summary.total_carbs_g = 60.0;
        assert_eq!(relative_gap(60.0, 45.0), 0.25);
        assert!(!check_consistency(&a).contains(&"total_carbs_g"));

        a.meal_summary.total_carbs_g = 61.0;
        assert!(check_consistency(&a).contains(&"total_carbs_g"));
    }

    #[test]
    fn calories_far_from_macro_energy_are_flagged() {
        let mut a = analysis();
        // Atwater energy stays at 511.5 kcal.
        a.meal_summary.total_calories = 1200.0;
        a.dishes[0].calories = 995.0;
        let flagged = check_consistency(&a);
        assert_eq!(flagged, vec!["atwater_calories"]);
    }

    #[tokio::test]
    async fn successful_analysis_is_persisted() {
        let (st, stub) = state_with(Ok(analysis())).await;
        let input = MealInput {
            text: Some("chicken and rice".into()),
            ..Default::default()
        };
        let (meal_id, result) = analyze_and_record(&st, input).await.unwrap();
        assert_eq!(result, analysis());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        let meals = repo::list_meals(&st.db).await.unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].id, meal_id);
        assert_eq!(repo::list_dishes_by_meal(&st.db, meal_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_input_never_reaches_the_estimator() {
        let (st, stub) = state_with(Ok(analysis())).await;
        let err = analyze_and_record(&st, MealInput::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Input(_)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn estimation_failure_persists_nothing() {
        let (st, _stub) = state_with(Err("quota exhausted".into())).await;
        let input = MealInput {
            text: Some("salad".into()),
            ..Default::default()
        };
        let err = analyze_and_record(&st, input).await.unwrap_err();
        assert!(matches!(err, AppError::Estimation(_)));
        assert!(err.to_string().contains("quota exhausted"));
        assert!(repo::list_meals(&st.db).await.unwrap().is_empty());
    }
}
