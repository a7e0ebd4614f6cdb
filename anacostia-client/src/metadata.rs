//! Metadata RPC endpoints
//!
//! Mirrors the in-process metadata store contract over HTTP for nodes whose
//! store lives on a remote pipeline.

use anacostia_core::domain::artifact::{ArtifactEntry, ArtifactState};
use anacostia_core::domain::run::Run;
use anacostia_core::dto::rpc::{
    CreateEntryRequest, CreateEntryResponse, EntryExistsResponse, LogMetricRequest,
    MetricsResponse, NumEntriesResponse,
};

use crate::error::Result;
use crate::ConnectorClient;

impl ConnectorClient {
    /// Count artifact entries in a state, optionally scoped to a run
    pub async fn get_num_entries(
        &self,
        state: ArtifactState,
        run_id: Option<i64>,
    ) -> Result<i64> {
        let url = format!("{}/rpc/metadata/num_entries", self.base_url());
        let mut query = vec![("state", state.as_str().to_string())];
        if let Some(run_id) = run_id {
            query.push(("run_id", run_id.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let body: NumEntriesResponse = self.handle_response(response).await?;
        Ok(body.count)
    }

    /// Check whether an entry exists for a location
    pub async fn entry_exists(&self, location: &str) -> Result<bool> {
        let url = format!("{}/rpc/metadata/entry_exists", self.base_url());
        let response = self
            .client
            .get(&url)
            .query(&[("location", location)])
            .send()
            .await?;
        let body: EntryExistsResponse = self.handle_response(response).await?;
        Ok(body.exists)
    }

    /// Create a new artifact entry for a location
    pub async fn create_entry(&self, location: &str) -> Result<i64> {
        let url = format!("{}/rpc/metadata/entries", self.base_url());
        let response = self
            .client
            .post(&url)
            .json(&CreateEntryRequest {
                location: location.to_string(),
            })
            .send()
            .await?;
        let body: CreateEntryResponse = self.handle_response(response).await?;
        Ok(body.entry_id)
    }

    /// List artifact entries, optionally filtered by state and run
    pub async fn list_entries(
        &self,
        state: Option<ArtifactState>,
        run_id: Option<i64>,
    ) -> Result<Vec<ArtifactEntry>> {
        let url = format!("{}/rpc/metadata/entries", self.base_url());
        let mut query = Vec::new();
        if let Some(state) = state {
            query.push(("state", state.as_str().to_string()));
        }
        if let Some(run_id) = run_id {
            query.push(("run_id", run_id.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        self.handle_response(response).await
    }

    /// Log a metric value against the remote store
    pub async fn log_metric(&self, name: &str, value: f64) -> Result<()> {
        let url = format!("{}/rpc/metadata/metrics", self.base_url());
        let response = self
            .client
            .post(&url)
            .json(&LogMetricRequest {
                name: name.to_string(),
                value,
            })
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    /// Fetch metric values by name, optionally scoped to a run
    ///
    /// `run_id = None` returns the values not yet promoted to any run.
    pub async fn get_metrics(&self, name: &str, run_id: Option<i64>) -> Result<Vec<f64>> {
        let url = format!("{}/rpc/metadata/metrics", self.base_url());
        let mut query = vec![("name", name.to_string())];
        if let Some(run_id) = run_id {
            query.push(("run_id", run_id.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let body: MetricsResponse = self.handle_response(response).await?;
        Ok(body.values)
    }

    /// List runs recorded by the remote store
    pub async fn list_runs(&self) -> Result<Vec<Run>> {
        let url = format!("{}/rpc/metadata/runs", self.base_url());
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }
}
