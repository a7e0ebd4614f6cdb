//! Resource RPC endpoints
//!
//! Artifact access for nodes on other pipelines. Artifact bytes stay owned
//! by the resource node's pipeline; everyone else reads through here.

use anacostia_core::dto::rpc::PutArtifactRequest;

use crate::error::Result;
use crate::ConnectorClient;

impl ConnectorClient {
    /// List artifact locations, optionally scoped to a run
    pub async fn list_artifacts(&self, run_id: Option<i64>) -> Result<Vec<String>> {
        let url = format!("{}/rpc/resource/artifacts", self.base_url());
        let mut query = Vec::new();
        if let Some(run_id) = run_id {
            query.push(("run_id", run_id.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        self.handle_response(response).await
    }

    /// Fetch an artifact's contents by path
    pub async fn fetch_artifact(&self, path: &str) -> Result<String> {
        let url = format!("{}/rpc/resource/fetch", self.base_url());
        let response = self
            .client
            .get(&url)
            .query(&[("path", path)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(crate::ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .text()
            .await
            .map_err(crate::ClientError::RequestFailed)
    }

    /// Upload an artifact into the remote resource directory
    pub async fn put_artifact(&self, path: &str, contents: &str) -> Result<()> {
        let url = format!("{}/rpc/resource/put", self.base_url());
        let response = self
            .client
            .post(&url)
            .json(&PutArtifactRequest {
                path: path.to_string(),
                contents: contents.to_string(),
            })
            .send()
            .await?;
        self.handle_empty_response(response).await
    }
}
