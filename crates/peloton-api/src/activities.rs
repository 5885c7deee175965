//! Recorded rides and runs
//!
//! `update_activity` is optimistic: the patch is merged into `activities:{id}`
//! and into the matching entry of the `activities` list before the request
//! goes out, and both keys are rolled back if it fails.

use peloton_client::{ApiRequest, Result, Strategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Fetched, PelotonApi, decode_opt, fetched};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub started_at: Option<String>,
}

/// Fields to change. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ActivityPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

impl PelotonApi {
    pub async fn list_activities(&self) -> Result<Fetched<Vec<Activity>>> {
        let resolved = self
            .client
            .query("activities", ApiRequest::get("/activities"), &Strategy::READ)
            .await?;
        fetched(resolved)
    }

    pub async fn get_activity(&self, id: u64) -> Result<Fetched<Activity>> {
        let resolved = self
            .client
            .query(
                &format!("activities:{id}"),
                ApiRequest::get(format!("/activities/{id}")),
                &Strategy::READ,
            )
            .await?;
        fetched(resolved)
    }

    /// Returns the server's copy, or `None` when it answers with no body.
    pub async fn update_activity(&self, id: u64, patch: ActivityPatch) -> Result<Option<Activity>> {
        let body = serde_json::to_value(&patch)
            .map_err(|e| peloton_client::Error::Decode(e.to_string()))?;
        let key = format!("activities:{id}");

        let descriptor = self
            .client
            .mutation(ApiRequest::patch(format!("/activities/{id}"), body.clone()))
            .optimistic({
                let key = key.clone();
                move |w| {
                    w.update(&key, |prior| {
                        prior.map(|mut activity| {
                            merge(&mut activity, &body);
                            activity
                        })
                    });
                    w.update("activities", |prior| {
                        prior.map(|mut list| {
                            if let Some(items) = list.as_array_mut() {
                                for item in items.iter_mut().filter(|a| a["id"] == id) {
                                    merge(item, &body);
                                }
                            }
                            list
                        })
                    });
                }
            })
            .invalidates([key, "activities".to_string()]);

        let data = self.client.mutate(descriptor).await?;
        decode_opt(data)
    }

    pub async fn delete_activity(&self, id: u64) -> Result<()> {
        let key = format!("activities:{id}");
        let descriptor = self
            .client
            .mutation(ApiRequest::delete(format!("/activities/{id}")))
            .optimistic({
                let key = key.clone();
                move |w| {
                    w.remove(&key);
                    w.update("activities", |prior| {
                        prior.map(|mut list| {
                            if let Some(items) = list.as_array_mut() {
                                items.retain(|a| a["id"] != id);
                            }
                            list
                        })
                    });
                }
            })
            .invalidates([key, "activities".to_string()]);

        self.client.mutate(descriptor).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_serializes_only_set_fields() {
        let body = serde_json::to_value(ActivityPatch::title("Col de la Madeleine")).unwrap();
        assert_eq!(body, json!({"title": "Col de la Madeleine"}));
    }

    #[test]
    fn merge_overwrites_patched_fields_only() {
        let mut activity = json!({"id": 3, "title": "Morning ride", "sport": "cycling"});
        merge(&mut activity, &json!({"title": "Alpe d'Huez"}));
        assert_eq!(activity, json!({"id": 3, "title": "Alpe d'Huez", "sport": "cycling"}));
    }
}
