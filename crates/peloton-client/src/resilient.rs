//! Facade tying the client, fallback engine and mutation controller together
//!
//! Reads go through `fetch`/`query` with a strategy list. `fetch` caches GETs
//! under the request signature; `query` caches under a domain key (e.g.
//! `activities:42`), the same key mutations snapshot and invalidate, and its
//! `Cache` strategy reads that key back. Writes go through `send` or `mutate`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::QueryCache;
use crate::client::ApiClient;
use crate::context::ClientContext;
use crate::error::Result;
use crate::fallback::{FallbackEngine, Resolved, Source, Strategy};
use crate::optimistic::{MutationController, MutationDescriptor};
use crate::request::{ApiRequest, Call, CallFuture};
use crate::session::SessionHandle;

pub struct ResilientClient {
    ctx: ClientContext,
    api: ApiClient,
    fallback: Arc<FallbackEngine>,
    mutations: MutationController,
}

impl ResilientClient {
    pub fn new(ctx: ClientContext) -> Self {
        let api = ApiClient::new(&ctx);
        Self::with_api(ctx, api)
    }

    /// Use a pre-configured `ApiClient` (extra interceptors, custom timeout).
    /// `api` must be built from `ctx` or a clone of it, so that both refresh
    /// through the same coordinator.
    pub fn with_api(ctx: ClientContext, api: ApiClient) -> Self {
        if !api.refresh().same_as(&ctx.refresh) {
            warn!("api client built from another context, token refreshes will not be coordinated");
        }
        let fallback = Arc::new(FallbackEngine::new(&ctx));
        let mutations = MutationController::new(&ctx, fallback.clone());
        Self {
            ctx,
            api,
            fallback,
            mutations,
        }
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.ctx.cache
    }

    pub fn session(&self) -> &SessionHandle {
        &self.ctx.session
    }

    /// A re-invocable call for `request`, as handed to retry and notify.
    pub fn call_for(&self, request: ApiRequest) -> Call {
        let api = self.api.clone();
        let request = Arc::new(request);
        Arc::new(move || -> CallFuture {
            let api = api.clone();
            let request = request.clone();
            Box::pin(async move { api.send(&request).await })
        })
    }

    /// Issue `request`; on failure walk `strategies`.
    pub async fn fetch(&self, request: ApiRequest, strategies: &[Strategy]) -> Result<Resolved> {
        let call = self.call_for(request.clone());
        let resolved = match call().await {
            Ok(data) => Resolved::network(data),
            Err(error) => {
                self.fallback
                    .handle(error, &request, strategies, call)
                    .await?
            }
        };

        if !request.is_mutation() && resolved.source != Source::Cache {
            self.ctx
                .cache
                .set(&request.signature(), resolved.data.clone());
        }
        Ok(resolved)
    }

    /// Read through the domain `key`. Fresh data is dropped if a mutation
    /// cancelled the fetch meanwhile, and a failure falls back to whatever
    /// `key` holds, optimistic writes included.
    pub async fn query(
        &self,
        key: &str,
        request: ApiRequest,
        strategies: &[Strategy],
    ) -> Result<Resolved> {
        let ticket = self.ctx.cache.begin_fetch(key);
        let call = self.call_for(request.clone());
        let resolved = match call().await {
            Ok(data) => Resolved::network(data),
            Err(error) => {
                self.fallback
                    .handle_keyed(error, &request, key, strategies, call)
                    .await?
            }
        };

        if resolved.source != Source::Cache
            && !self.ctx.cache.complete_fetch(ticket, resolved.data.clone())
        {
            debug!(key, "fetch superseded, keeping newer cache entry");
        }
        Ok(resolved)
    }

    /// Fire a write with the mutation fallback list and no optimistic step.
    pub async fn send(&self, request: ApiRequest) -> Result<Value> {
        self.fetch(request, &Strategy::MUTATION)
            .await
            .map(|resolved| resolved.data)
    }

    /// Build a descriptor whose `execute` dispatches `request`.
    pub fn mutation(&self, request: ApiRequest) -> MutationDescriptor {
        let execute = self.call_for(request.clone());
        MutationDescriptor::new(request, execute)
    }

    pub async fn mutate(&self, descriptor: MutationDescriptor) -> Result<Value> {
        self.mutations.run(descriptor).await
    }
}
