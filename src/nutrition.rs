//! USDA FoodData Central lookups.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::constants::MAX_NUTRIENTS;
use crate::error::NicError;
use crate::models::{Nutrient, NutritionEntry};

const SERVICE: &str = "nutrition lookup";

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<FoodRecord>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FoodRecord {
    #[serde(default)]
    food_nutrients: Vec<FoodNutrient>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FoodNutrient {
    nutrient_name: Option<String>,
    value: Option<f64>,
    unit_name: Option<String>,
}

#[derive(Clone)]
pub struct NutritionClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl NutritionClient {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Searches for `item` and keeps the first record's leading nutrients.
    ///
    /// `Ok(None)` means the database had no match.
    #[instrument(skip(self))]
    pub async fn search(&self, item: &str) -> Result<Option<NutritionEntry>, NicError> {
        let url = format!("{}/foods/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("query", item), ("api_key", self.api_key.as_str()), ("pageSize", "1")])
            .send()
            .await
            .map_err(|e| NicError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NicError::status(SERVICE, status, &body));
        }

        let search = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| NicError::transport(SERVICE, e))?;

        let entry = search
            .foods
            .into_iter()
            .next()
            .map(|food| to_entry(item, food));
        debug!(found = entry.is_some(), "Nutrition search finished");
        Ok(entry)
    }

    /// Looks items up one after another, dropping misses and failed lookups.
    pub async fn lookup_all(&self, items: &[String]) -> Vec<NutritionEntry> {
        let mut entries = Vec::new();
        for item in items {
            match self.search(item).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => info!(%item, "No nutrition match"),
                Err(e) => warn!(%item, "Nutrition lookup failed, skipping item: {}", e),
            }
        }
        entries
    }
}

fn to_entry(item: &str, food: FoodRecord) -> NutritionEntry {
    let nutrients = food
        .food_nutrients
        .into_iter()
        .take(MAX_NUTRIENTS)
        .map(|n| Nutrient {
            name: n.nutrient_name.unwrap_or_else(|| "Unknown".to_string()),
            value: n.value.unwrap_or(0.0),
            unit: n.unit_name.unwrap_or_default(),
        })
        .collect();
    NutritionEntry {
        item: item.to_string(),
        nutrients,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keeps_first_five_nutrients_of_first_food() {
        let body = json!({
            "totalHits": 2,
            "foods": [
                {
                    "description": "Bananas, raw",
                    "foodNutrients": [
                        {"nutrientName": "Protein", "value": 1.09, "unitName": "G"},
                        {"nutrientName": "Total lipid (fat)", "value": 0.33, "unitName": "G"},
                        {"nutrientName": "Carbohydrate, by difference", "value": 22.8, "unitName": "G"},
                        {"nutrientName": "Energy", "value": 89.0, "unitName": "KCAL"},
                        {"nutrientName": "Sugars, total", "value": 12.2, "unitName": "G"},
                        {"nutrientName": "Fiber", "value": 2.6, "unitName": "G"}
                    ]
                },
                {"description": "Banana chips", "foodNutrients": []}
            ]
        });
        let search: SearchResponse = serde_json::from_value(body).unwrap();
        let entry = to_entry("banana", search.foods.into_iter().next().unwrap());

        assert_eq!(entry.item, "banana");
        assert_eq!(entry.nutrients.len(), MAX_NUTRIENTS);
        assert_eq!(entry.nutrients[0].name, "Protein");
        assert_eq!(entry.nutrients[3].unit, "KCAL");
        assert!(entry.nutrients.iter().all(|n| n.name != "Fiber"));
    }

    #[test]
    fn test_tolerates_missing_nutrient_fields() {
        let body = json!({"foods": [{"foodNutrients": [{"nutrientName": "Water"}]}]});
        let search: SearchResponse = serde_json::from_value(body).unwrap();
        let entry = to_entry("cucumber", search.foods.into_iter().next().unwrap());
        assert_eq!(entry.nutrients[0].value, 0.0);
        assert_eq!(entry.nutrients[0].unit, "");
    }

    #[test]
    fn test_empty_search_response() {
        let search: SearchResponse = serde_json::from_value(json!({"totalHits": 0})).unwrap();
        assert!(search.foods.is_empty());
    }
}
