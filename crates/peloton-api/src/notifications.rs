use peloton_client::{ApiRequest, Result, Strategy};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Fetched, PelotonApi, fetched};

/// In-app notification as served by the backend. Not to be confused with the
/// client's own `peloton_client::Notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppNotification {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl PelotonApi {
    pub async fn list_notifications(&self) -> Result<Fetched<Vec<AppNotification>>> {
        let resolved = self
            .client
            .query("notifications", ApiRequest::get("/notifications"), &Strategy::READ)
            .await?;
        fetched(resolved)
    }

    /// Mark one notification read; the cached list flips immediately.
    pub async fn mark_read(&self, id: u64) -> Result<()> {
        let descriptor = self
            .client
            .mutation(ApiRequest::post(format!("/notifications/{id}/read"), json!({})))
            .optimistic(move |w| {
                w.update("notifications", |prior| {
                    prior.map(|mut list| {
                        if let Some(items) = list.as_array_mut() {
                            for item in items.iter_mut().filter(|n| n["id"] == id) {
                                item["read"] = Value::Bool(true);
                            }
                        }
                        list
                    })
                });
            })
            .invalidates(["notifications"]);

        self.client.mutate(descriptor).await?;
        Ok(())
    }
}
