use serde::Serialize;
use sqlx::FromRow;
use time::{format_description::StaticFormatDescription, macros::format_description, PrimitiveDateTime};

use crate::nutrition::{DishEstimate, MealSummary};

/// Matches the text produced by `strftime('%Y-%m-%d %H:%M:%f', 'now')`.
const STORED_TIMESTAMP: StaticFormatDescription =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");

time::serde::format_description!(stored_timestamp, PrimitiveDateTime, STORED_TIMESTAMP);

pub fn parse_stored_timestamp(raw: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(raw, STORED_TIMESTAMP)
}

#[derive(Debug, FromRow)]
pub struct MealRow {
    pub id: i64,
    pub date: String,
    pub total_calories: f64,
    pub total_protein_g: f64,
    pub total_fat_g: f64,
    pub total_carbs_g: f64,
    pub total_fiber_g: f64,
}

#[derive(Debug, FromRow)]
pub struct DishRow {
    pub id: i64,
    pub meal_id: i64,
    pub name: String,
    pub estimated_weight: f64,
    pub calories: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
    pub total_fiber_g: f64,
}

/// A persisted meal. `recorded_at` is UTC, assigned by the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMeal {
    pub id: i64,
    #[serde(rename = "date", with = "stored_timestamp")]
    pub recorded_at: PrimitiveDateTime,
    #[serde(flatten)]
    pub summary: MealSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDish {
    pub id: i64,
    pub meal_id: i64,
    #[serde(flatten)]
    pub dish: DishEstimate,
}

impl TryFrom<MealRow> for StoredMeal {
    type Error = anyhow::Error;

    fn try_from(r: MealRow) -> Result<Self, Self::Error> {
        let recorded_at = parse_stored_timestamp(&r.date)
            .map_err(|e| anyhow::anyhow!("meal {} has unreadable date {:?}: {e}", r.id, r.date))?;
        Ok(Self {
            id: r.id,
            recorded_at,
            summary: MealSummary {
                total_calories: r.total_calories,
                total_protein_g: r.total_protein_g,
                total_fat_g: r.total_fat_g,
                total_carbs_g: r.total_carbs_g,
                total_fiber_g: r.total_fiber_g,
            },
        })
    }
}

impl From<DishRow> for StoredDish {
    fn from(r: DishRow) -> Self {
        Self {
            id: r.id,
            meal_id: r.meal_id,
            dish: DishEstimate {
                name: r.name,
                estimated_weight: r.estimated_weight,
                calories: r.calories,
                protein_g: r.protein_g,
                fat_g: r.fat_g,
                carbs_g: r.carbs_g,
                total_fiber_g: r.total_fiber_g,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn stored_meal_serializes_date_in_storage_format() {
        let meal = StoredMeal {
            id: 7,
            recorded_at: datetime!(2026-03-01 12:30:05.250),
            summary: crate::nutrition::test_support::summary(500.0, 30.0, 20.0, 50.0),
        };
        let json = serde_json::to_value(&meal).unwrap();
        assert_eq!(json["date"], "2026-03-01 12:30:05.250");
        assert_eq!(json["total_calories"], 500.0);
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn stored_format_parses_what_it_formats() {
        let at = datetime!(2026-03-01 23:59:59.999);
        let text = at.format(STORED_TIMESTAMP).unwrap();
        assert_eq!(text, "2026-03-01 23:59:59.999");
        assert_eq!(parse_stored_timestamp(&text).unwrap(), at);
    }

    #[test]
    fn unreadable_date_is_an_error() {
        let row = MealRow {
            id: 1,
            date: "yesterday".into(),
            total_calories: 1.0,
            total_protein_g: 1.0,
            total_fat_g: 1.0,
            total_carbs_g: 1.0,
            total_fiber_g: 1.0,
        };
        let err = StoredMeal::try_from(row).unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }
}
