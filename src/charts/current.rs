use serde::Serialize;

use crate::nutrition::{DishEstimate, MealAnalysis, MealSummary};

/// Protein/fat/carbs as fractions of their combined grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroShares {
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl MacroShares {
    /// Whole percentages, truncated, for progress bars.
    pub fn percentages(&self) -> MacroPercentages {
        let pct = |share: f64| (share * 100.0).clamp(0.0, 100.0) as u8;
        MacroPercentages {
            protein: pct(self.protein),
            fat: pct(self.fat),
            carbs: pct(self.carbs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MacroPercentages {
    pub protein: u8,
    pub fat: u8,
    pub carbs: u8,
}

/// `None` when the meal has no macro grams at all.
pub fn macro_shares(summary: &MealSummary) -> Option<MacroShares> {
    let total = summary.total_protein_g + summary.total_fat_g + summary.total_carbs_g;
    if total <= 0.0 {
        return None;
    }
    Some(MacroShares {
        protein: summary.total_protein_g / total,
        fat: summary.total_fat_g / total,
        carbs: summary.total_carbs_g / total,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DishCalories {
    pub name: String,
    pub calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DishMacros {
    pub name: String,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
}

pub fn dish_calories(dishes: &[DishEstimate]) -> Vec<DishCalories> {
    dishes
        .iter()
        .map(|d| DishCalories {
            name: d.name.clone(),
            calories: d.calories,
        })
        .collect()
}

pub fn dish_macros(dishes: &[DishEstimate]) -> Vec<DishMacros> {
    dishes
        .iter()
        .map(|d| DishMacros {
            name: d.name.clone(),
            protein_g: d.protein_g,
            fat_g: d.fat_g,
            carbs_g: d.carbs_g,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentMealCharts {
    pub macro_shares: Option<MacroShares>,
    pub macro_percentages: Option<MacroPercentages>,
    pub dish_calories: Vec<DishCalories>,
    pub dish_macros: Vec<DishMacros>,
}

impl CurrentMealCharts {
    pub fn from_analysis(analysis: &MealAnalysis) -> Self {
        let shares = macro_shares(&analysis.meal_summary);
        Self {
            macro_shares: shares,
            macro_percentages: shares.map(|s| s.percentages()),
            dish_calories: dish_calories(&analysis.dishes),
            dish_macros: dish_macros(&analysis.dishes),
        }
    }
}
