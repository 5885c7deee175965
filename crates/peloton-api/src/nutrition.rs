use peloton_client::{ApiRequest, Result, Strategy};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{Fetched, PelotonApi, decode_opt, fetched};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub calories: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_at: Option<String>,
}

/// Totals for one day (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: String,
    pub calories: u32,
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carbs_g: f64,
    #[serde(default)]
    pub fat_g: f64,
    #[serde(default)]
    pub meals: Vec<Meal>,
}

impl PelotonApi {
    pub async fn daily_summary(&self, date: &str) -> Result<Fetched<DailySummary>> {
        let resolved = self
            .client
            .query(
                &format!("nutrition:{date}"),
                ApiRequest::get("/nutrition/summary").param("date", date),
                &Strategy::READ,
            )
            .await?;
        fetched(resolved)
    }

    /// Log a meal. The cached summary for `date` shows it right away.
    pub async fn log_meal(&self, date: &str, meal: Meal) -> Result<Option<Meal>> {
        let key = format!("nutrition:{date}");
        let body = json!({
            "date": date,
            "name": meal.name,
            "calories": meal.calories,
        });

        let descriptor = self
            .client
            .mutation(ApiRequest::post("/nutrition/meals", body))
            .optimistic({
                let key = key.clone();
                move |w| {
                    w.update(&key, |prior| {
                        prior.map(|mut summary| {
                            if let Some(fields) = summary.as_object_mut() {
                                let calories = fields
                                    .get("calories")
                                    .and_then(|c| c.as_u64())
                                    .unwrap_or(0);
                                fields.insert(
                                    "calories".into(),
                                    json!(calories + u64::from(meal.calories)),
                                );
                                match fields.get_mut("meals").and_then(|m| m.as_array_mut()) {
                                    Some(meals) => meals.push(json!(meal)),
                                    None => {
                                        fields.insert("meals".into(), json!([meal]));
                                    }
                                }
                            }
                            summary
                        })
                    });
                }
            })
            .invalidates([key]);

        let data = self.client.mutate(descriptor).await?;
        decode_opt(data)
    }
}
