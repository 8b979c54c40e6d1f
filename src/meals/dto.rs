use serde::{Deserialize, Serialize};

use crate::charts::{CurrentMealCharts, HistoryView};
use super::repo_types::{StoredDish, StoredMeal};
use crate::nutrition::MealAnalysis;

/// Which input the client chose; without one, whatever was sent is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Image,
    Text,
}

impl std::str::FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(InputMode::Image),
            "text" => Ok(InputMode::Text),
            other => Err(format!("unknown input mode {other:?}; expected \"image\" or \"text\"")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub meal_id: i64,
    pub analysis: MealAnalysis,
    pub charts: CurrentMealCharts,
}

#[derive(Debug, Serialize)]
pub struct MealDetail {
    pub meal: StoredMeal,
    pub dishes: Vec<StoredDish>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub view: HistoryView,
}
