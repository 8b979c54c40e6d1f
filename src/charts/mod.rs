//! Chart-ready shapes derived from analyses and stored meals. Nothing here
//! performs I/O or can fail; inputs are already validated.

mod current;
mod history;

pub use current::{
    dish_calories, dish_macros, macro_shares, CurrentMealCharts, DishCalories, DishMacros,
    MacroPercentages, MacroShares,
};
pub use history::{
    calorie_series, daily_totals, macro_series, per_meal_totals, CaloriePoint, HistoryCharts,
    HistoryView, MacroPoint, TrendKey, TrendPoint,
};
