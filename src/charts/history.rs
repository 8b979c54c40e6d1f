use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{Date, UtcOffset};

use crate::meals::StoredMeal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryView {
    #[default]
    Daily,
    PerMeal,
}

impl HistoryView {
    pub fn x_title(self) -> &'static str {
        match self {
            HistoryView::Daily => "Date",
            HistoryView::PerMeal => "Meal Number",
        }
    }
}

/// X-axis key: a `YYYY-MM-DD` date or a 1-based meal ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TrendKey {
    Date(String),
    Ordinal(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub x: TrendKey,
    pub total_calories: f64,
    pub total_protein_g: f64,
    pub total_fat_g: f64,
    pub total_carbs_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaloriePoint {
    pub x: TrendKey,
    pub total_calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroPoint {
    pub x: TrendKey,
    pub total_protein_g: f64,
    pub total_fat_g: f64,
    pub total_carbs_g: f64,
}

#[derive(Default)]
struct Totals {
    calories: f64,
    protein_g: f64,
    fat_g: f64,
    carbs_g: f64,
}

/// One point per calendar day (in `offset`), ascending by date.
pub fn daily_totals(meals: &[StoredMeal], offset: UtcOffset) -> Vec<TrendPoint> {
    let mut days: BTreeMap<Date, Totals> = BTreeMap::new();
    for meal in meals {
        let day = meal.recorded_at.assume_utc().to_offset(offset).date();
        let t = days.entry(day).or_default();
        t.calories += meal.summary.total_calories;
        t.protein_g += meal.summary.total_protein_g;
        t.fat_g += meal.summary.total_fat_g;
        t.carbs_g += meal.summary.total_carbs_g;
    }
    days.into_iter()
        .map(|(day, t)| TrendPoint {
            x: TrendKey::Date(day.to_string()),
            total_calories: t.calories,
            total_protein_g: t.protein_g,
            total_fat_g: t.fat_g,
            total_carbs_g: t.carbs_g,
        })
        .collect()
}

/// One point per meal, numbered 1..=N in storage order.
pub fn per_meal_totals(meals: &[StoredMeal]) -> Vec<TrendPoint> {
    meals
        .iter()
        .enumerate()
        .map(|(idx, meal)| TrendPoint {
            x: TrendKey::Ordinal(idx + 1),
            total_calories: meal.summary.total_calories,
            total_protein_g: meal.summary.total_protein_g,
            total_fat_g: meal.summary.total_fat_g,
            total_carbs_g: meal.summary.total_carbs_g,
        })
        .collect()
}

pub fn calorie_series(points: &[TrendPoint]) -> Vec<CaloriePoint> {
    points
        .iter()
        .map(|p| CaloriePoint {
            x: p.x.clone(),
            total_calories: p.total_calories,
        })
        .collect()
}

pub fn macro_series(points: &[TrendPoint]) -> Vec<MacroPoint> {
    points
        .iter()
        .map(|p| MacroPoint {
            x: p.x.clone(),
            total_protein_g: p.total_protein_g,
            total_fat_g: p.total_fat_g,
            total_carbs_g: p.total_carbs_g,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryCharts {
    pub view: HistoryView,
    pub x_title: &'static str,
    pub calories: Vec<CaloriePoint>,
    pub macros: Vec<MacroPoint>,
}

impl HistoryCharts {
    pub fn build(meals: &[StoredMeal], view: HistoryView, offset: UtcOffset) -> Self {
        let points = match view {
            HistoryView::Daily => daily_totals(meals, offset),
            HistoryView::PerMeal => per_meal_totals(meals),
        };
        Self {
            view,
            x_title: view.x_title(),
            calories: calorie_series(&points),
            macros: macro_series(&points),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calories.is_empty()
    }
}
