use peloton_client::{ApiRequest, Result, Strategy};
use serde::{Deserialize, Serialize};

use crate::{Fetched, PelotonApi, fetched};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSession {
    pub day: u32,
    pub kind: String,
    #[serde(default)]
    pub duration_min: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub goal: Option<String>,
    pub weeks: u32,
    #[serde(default)]
    pub sessions: Vec<TrainingSession>,
}

impl PelotonApi {
    pub async fn list_plans(&self) -> Result<Fetched<Vec<TrainingPlan>>> {
        let resolved = self
            .client
            .query("training:plans", ApiRequest::get("/training/plans"), &Strategy::READ)
            .await?;
        fetched(resolved)
    }

    pub async fn get_plan(&self, id: u64) -> Result<Fetched<TrainingPlan>> {
        let resolved = self
            .client
            .query(
                &format!("training:plans:{id}"),
                ApiRequest::get(format!("/training/plans/{id}")),
                &Strategy::READ,
            )
            .await?;
        fetched(resolved)
    }
}
