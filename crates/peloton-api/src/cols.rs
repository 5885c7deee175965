use peloton_client::{ApiRequest, Result, Strategy};
use serde::{Deserialize, Serialize};

use crate::{Fetched, PelotonApi, fetched};

/// A mountain pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Col {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub elevation_m: Option<u32>,
    #[serde(default)]
    pub length_km: Option<f64>,
    #[serde(default)]
    pub avg_gradient: Option<f64>,
}

impl PelotonApi {
    pub async fn get_all_cols(&self) -> Result<Fetched<Vec<Col>>> {
        let resolved = self
            .client
            .query("cols", ApiRequest::get("/cols"), &Strategy::READ)
            .await?;
        fetched(resolved)
    }

    pub async fn get_col(&self, id: u64) -> Result<Fetched<Col>> {
        let resolved = self
            .client
            .query(&format!("cols:{id}"), ApiRequest::get(format!("/cols/{id}")), &Strategy::READ)
            .await?;
        fetched(resolved)
    }
}
