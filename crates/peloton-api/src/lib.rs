//! Typed endpoint wrappers for the Peloton API
//!
//! `PelotonApi` owns a `ResilientClient` and exposes one method per endpoint,
//! grouped by area (cols, activities, nutrition, training, notifications,
//! chat). Each area lives in its own module as an `impl PelotonApi` block.
//!
//! Cache keys are shared with the optimistic updates:
//! - `cols`, `cols:{id}`
//! - `activities`, `activities:{id}`
//! - `nutrition:{date}`
//! - `training:plans`, `training:plans:{id}`
//! - `notifications`

pub mod activities;
pub mod chat;
pub mod cols;
pub mod notifications;
pub mod nutrition;
pub mod training;

pub use activities::{Activity, ActivityPatch};
pub use chat::{ChatMessage, ChatReply, ChatRole};
pub use cols::Col;
pub use notifications::AppNotification;
pub use nutrition::{DailySummary, Meal};
pub use training::{TrainingPlan, TrainingSession};

use peloton_client::{ClientContext, Error, ResilientClient, Result, Source};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decoded data plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub source: Source,
}

pub struct PelotonApi {
    client: ResilientClient,
}

impl PelotonApi {
    pub fn new(ctx: ClientContext) -> Self {
        Self {
            client: ResilientClient::new(ctx),
        }
    }

    pub fn from_client(client: ResilientClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
}

/// Like `decode`, but an empty (`null`) body is `None`.
pub(crate) fn decode_opt<T: DeserializeOwned>(value: Value) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    decode(value).map(Some)
}

pub(crate) fn fetched<T: DeserializeOwned>(resolved: peloton_client::Resolved) -> Result<Fetched<T>> {
    Ok(Fetched {
        data: decode(resolved.data)?,
        source: resolved.source,
    })
}
