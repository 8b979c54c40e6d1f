pub mod gemini;
mod schema;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gemini::GeminiClient;

/// One food item within a meal, as estimated by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DishEstimate {
    pub name: String,
    /// Grams.
    pub estimated_weight: f64,
    pub calories: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
    pub total_fiber_g: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MealSummary {
    pub total_calories: f64,
    pub total_protein_g: f64,
    pub total_fat_g: f64,
    pub total_carbs_g: f64,
    pub total_fiber_g: f64,
}

impl MealSummary {
    /// Energy implied by the macro grams (4/9/4 kcal per gram).
    pub fn atwater_calories(&self) -> f64 {
        4.0 * self.total_protein_g + 9.0 * self.total_fat_g + 4.0 * self.total_carbs_g
    }

    /// Field-wise sum over the dishes, for comparison with the model's totals.
    pub fn sum_of(dishes: &[DishEstimate]) -> Self {
        dishes.iter().fold(
            MealSummary {
                total_calories: 0.0,
                total_protein_g: 0.0,
                total_fat_g: 0.0,
                total_carbs_g: 0.0,
                total_fiber_g: 0.0,
            },
            |acc, d| MealSummary {
                total_calories: acc.total_calories + d.calories,
                total_protein_g: acc.total_protein_g + d.protein_g,
                total_fat_g: acc.total_fat_g + d.fat_g,
                total_carbs_g: acc.total_carbs_g + d.carbs_g,
                total_fiber_g: acc.total_fiber_g + d.total_fiber_g,
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MealAnalysis {
    pub dishes: Vec<DishEstimate>,
    pub meal_summary: MealSummary,
}

impl MealAnalysis {
    /// Rejects anything the response schema cannot express on its own:
    /// an empty dish list, blank names, negative or non-finite numbers.
    pub fn validate(&self) -> Result<(), EstimationError> {
        if self.dishes.is_empty() {
            return Err(EstimationError::Invalid("response contains no dishes".into()));
        }
        for (idx, dish) in self.dishes.iter().enumerate() {
            if dish.name.trim().is_empty() {
                return Err(EstimationError::Invalid(format!("dish #{} has an empty name", idx + 1)));
            }
            let fields = [
                ("estimated_weight", dish.estimated_weight),
                ("calories", dish.calories),
                ("protein_g", dish.protein_g),
                ("fat_g", dish.fat_g),
                ("carbs_g", dish.carbs_g),
                ("total_fiber_g", dish.total_fiber_g),
            ];
            check_quantities(&format!("dish {:?}", dish.name), &fields)?;
        }
        let s = &self.meal_summary;
        check_quantities(
            "meal_summary",
            &[
                ("total_calories", s.total_calories),
                ("total_protein_g", s.total_protein_g),
                ("total_fat_g", s.total_fat_g),
                ("total_carbs_g", s.total_carbs_g),
                ("total_fiber_g", s.total_fiber_g),
            ],
        )
    }
}

fn check_quantities(owner: &str, fields: &[(&str, f64)]) -> Result<(), EstimationError> {
    for (field, value) in fields {
        if !value.is_finite() || *value < 0.0 {
            return Err(EstimationError::Invalid(format!(
                "{owner}: {field} must be a non-negative number, got {value}"
            )));
        }
    }
    Ok(())
}

/// An image held in memory for the duration of one estimate call.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("image upload failed: {0}")]
    Upload(String),
    #[error("request to inference provider failed: {0}")]
    Transport(String),
    #[error("inference provider returned an error: {0}")]
    Provider(String),
    #[error("inference provider returned no usable answer: {0}")]
    EmptyResponse(String),
    #[error("response does not match the meal analysis schema: {0}")]
    Malformed(String),
    #[error("response failed validation: {0}")]
    Invalid(String),
}

/// Seam between the service and the external inference provider.
#[async_trait]
pub trait NutritionEstimator: Send + Sync {
    /// Either input may be absent; callers decide whether an empty request is allowed.
    async fn estimate(
        &self,
        image: Option<ImageUpload>,
        text: Option<&str>,
    ) -> Result<MealAnalysis, EstimationError>;
}

/// Parses the model's JSON answer into a validated analysis.
pub fn parse_analysis(raw: &str) -> Result<MealAnalysis, EstimationError> {
    let analysis: MealAnalysis =
        serde_json::from_str(raw).map_err(|e| EstimationError::Malformed(e.to_string()))?;
    analysis.validate()?;
    Ok(analysis)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn dish(name: &str, calories: f64, protein: f64, fat: f64, carbs: f64) -> DishEstimate {
        DishEstimate {
            name: name.into(),
            estimated_weight: 100.0,
            calories,
            protein_g: protein,
            fat_g: fat,
            carbs_g: carbs,
            total_fiber_g: 1.0,
        }
    }

    pub fn summary(calories: f64, protein: f64, fat: f64, carbs: f64) -> MealSummary {
        MealSummary {
            total_calories: calories,
            total_protein_g: protein,
            total_fat_g: fat,
            total_carbs_g: carbs,
            total_fiber_g: 2.0,
        }
    }

    pub fn analysis() -> MealAnalysis {
        MealAnalysis {
            dishes: vec![
                dish("grilled chicken breast", 330.0, 62.0, 7.0, 0.0),
                dish("steamed rice", 205.0, 4.0, 0.5, 45.0),
            ],
            meal_summary: summary(535.0, 66.0, 7.5, 45.0),
        }
    }
}
