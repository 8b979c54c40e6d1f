use anyhow::Context;
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::repo_types::{DishRow, MealRow, StoredDish, StoredMeal};
use crate::nutrition::{DishEstimate, MealSummary};

/// Insert a meal and all of its dishes in one transaction. Returns the new meal id.
///
/// The timestamp is taken by SQLite at insert time. If any dish insert fails the
/// transaction is dropped uncommitted, so no meal row is left without its dishes.
pub async fn record(
    db: &SqlitePool,
    summary: &MealSummary,
    dishes: &[DishEstimate],
) -> anyhow::Result<i64> {
    let mut tx = db.begin().await.context("begin tx")?;

    let meal_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO meals (date, total_calories, total_protein_g, total_fat_g, total_carbs_g, total_fiber_g)
        VALUES (strftime('%Y-%m-%d %H:%M:%f', 'now'), ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(summary.total_calories)
    .bind(summary.total_protein_g)
    .bind(summary.total_fat_g)
    .bind(summary.total_carbs_g)
    .bind(summary.total_fiber_g)
    .fetch_one(&mut *tx)
    .await
    .context("insert meal")?;

    for (idx, dish) in dishes.iter().enumerate() {
        insert_dish_tx(&mut tx, meal_id, dish)
            .await
            .with_context(|| format!("insert dish #{} of meal {}", idx + 1, meal_id))?;
    }

    tx.commit().await.context("commit tx")?;
    Ok(meal_id)
}

async fn insert_dish_tx(
    tx: &mut Transaction<'_, Sqlite>,
    meal_id: i64,
    dish: &DishEstimate,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dishes (meal_id, name, estimated_weight, calories, protein_g, fat_g, carbs_g, total_fiber_g)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(meal_id)
    .bind(dish.name.as_str())
    .bind(dish.estimated_weight)
    .bind(dish.calories)
    .bind(dish.protein_g)
    .bind(dish.fat_g)
    .bind(dish.carbs_g)
    .bind(dish.total_fiber_g)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ---- Queries ----

/// Every meal in insertion order. Empty when nothing has been recorded.
pub async fn list_meals(db: &SqlitePool) -> anyhow::Result<Vec<StoredMeal>> {
    let rows = sqlx::query_as::<_, MealRow>(
        r#"
        SELECT id, date, total_calories, total_protein_g, total_fat_g, total_carbs_g, total_fiber_g
          FROM meals
         ORDER BY id ASC
        "#,
    )
    .fetch_all(db)
    .await
    .context("list meals")?;

    rows.into_iter().map(StoredMeal::try_from).collect()
}

pub async fn get_meal(db: &SqlitePool, meal_id: i64) -> anyhow::Result<Option<StoredMeal>> {
    let row = sqlx::query_as::<_, MealRow>(
        r#"
        SELECT id, date, total_calories, total_protein_g, total_fat_g, total_carbs_g, total_fiber_g
          FROM meals
         WHERE id = ?
        "#,
    )
    .bind(meal_id)
    .fetch_optional(db)
    .await
    .context("get meal")?;

    row.map(StoredMeal::try_from).transpose()
}

/// Dishes of one meal in the order they were recorded.
pub async fn list_dishes_by_meal(db: &SqlitePool, meal_id: i64) -> anyhow::Result<Vec<StoredDish>> {
    let rows = sqlx::query_as::<_, DishRow>(
        r#"
        SELECT id, meal_id, name, estimated_weight, calories, protein_g, fat_g, carbs_g, total_fiber_g
          FROM dishes
         WHERE meal_id = ?
         ORDER BY id ASC
        "#,
    )
    .bind(meal_id)
    .fetch_all(db)
    .await
    .context("list dishes by meal")?;

    Ok(rows.into_iter().map(StoredDish::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::nutrition::test_support::{analysis, dish, summary};

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let db = test_pool().await;
        assert!(list_meals(&db).await.unwrap().is_empty());
        assert!(list_dishes_by_meal(&db, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_round_trips_summary_and_dishes() {
        let db = test_pool().await;
        let a = analysis();

        let meal_id = record(&db, &a.meal_summary, &a.dishes).await.unwrap();

        let meals = list_meals(&db).await.unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].id, meal_id);
        assert_eq!(meals[0].summary, a.meal_summary);

        let dishes = list_dishes_by_meal(&db, meal_id).await.unwrap();
        let names: Vec<_> = dishes.iter().map(|d| d.dish.name.as_str()).collect();
        assert_eq!(names, vec!["grilled chicken breast", "steamed rice"]);
        assert!(dishes.iter().all(|d| d.meal_id == meal_id));
        assert_eq!(dishes[1].dish, a.dishes[1]);
    }

    #[tokio::test]
    async fn get_meal_finds_by_id() {
        let db = test_pool().await;
        let a = analysis();
        let meal_id = record(&db, &a.meal_summary, &a.dishes).await.unwrap();

        let meal = get_meal(&db, meal_id).await.unwrap().unwrap();
        assert_eq!(meal.id, meal_id);
        assert_eq!(meal.summary, a.meal_summary);
        assert!(get_meal(&db, meal_id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ids_and_timestamps_increase_in_insert_order() {
        let db = test_pool().await;
        let a = analysis();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(record(&db, &a.meal_summary, &a.dishes).await.unwrap());
        }

        let meals = list_meals(&db).await.unwrap();
        let listed: Vec<i64> = meals.iter().map(|m| m.id).collect();
        assert_eq!(listed, ids);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(meals.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
    }

    #[tokio::test]
    async fn failed_dish_insert_rolls_back_the_meal() {
        let db = test_pool().await;
        let a = analysis();
        record(&db, &a.meal_summary, &a.dishes).await.unwrap();
        let before = list_meals(&db).await.unwrap();

        // The second dish violates the non-empty name constraint.
        let dishes = vec![dish("bread", 80.0, 3.0, 1.0, 15.0), dish("", 10.0, 0.0, 0.0, 2.0)];
        let err = record(&db, &summary(90.0, 3.0, 1.0, 17.0), &dishes)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("insert dish #2"), "got: {err:#}");

        assert_eq!(list_meals(&db).await.unwrap(), before);
        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dishes WHERE name = 'bread'")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
