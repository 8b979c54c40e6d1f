use serde_json::{json, Value};

pub(crate) const ANALYSIS_PROMPT: &str = "Analyze the provided information (image and/or text description) and \
provide nutritional information for each dish, as well as a summary for the entire meal.";

const DISH_FIELDS: [&str; 7] = [
    "name",
    "estimated_weight",
    "calories",
    "protein_g",
    "fat_g",
    "carbs_g",
    "total_fiber_g",
];

const SUMMARY_FIELDS: [&str; 5] = [
    "total_calories",
    "total_protein_g",
    "total_fat_g",
    "total_carbs_g",
    "total_fiber_g",
];

fn object_of(fields: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = fields
        .iter()
        .map(|f| {
            let ty = if *f == "name" { "STRING" } else { "NUMBER" };
            (f.to_string(), json!({ "type": ty }))
        })
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": fields,
        "propertyOrdering": fields,
    })
}

/// `responseSchema` for `generateContent`, mirroring `MealAnalysis`.
pub(crate) fn meal_analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "dishes": { "type": "ARRAY", "items": object_of(&DISH_FIELDS) },
            "meal_summary": object_of(&SUMMARY_FIELDS),
        },
        "required": ["dishes", "meal_summary"],
        "propertyOrdering": ["dishes", "meal_summary"],
    })
}
