//! REST client for the document store.
//!
//! Every node is addressed as `{base}/{path}.json`, optionally with
//! `?auth={id token}`. Non-success replies carry `{"error": "message"}`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tarefas_proto::path::DataPath;
use tarefas_proto::task::PushReply;
use url::Url;

use super::StoreError;

/// Thin wrapper over `reqwest` speaking the store's REST conventions.
#[derive(Debug, Clone)]
pub struct DatabaseClient {
    http: reqwest::Client,
    base: Url,
}

impl DatabaseClient {
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    #[must_use]
    pub const fn with_client(http: reqwest::Client, base: Url) -> Self {
        Self { http, base }
    }

    /// URL of `path`, e.g. `{base}/users/u1/tasks.json?auth=…`.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidUrl`] when the base URL cannot carry a path.
    pub fn url(&self, path: &DataPath, auth: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                StoreError::InvalidUrl(format!("{} cannot be a base URL", self.base))
            })?;
            segments.pop_if_empty();
            match path.segments().split_last() {
                Some((last, parents)) => {
                    segments.extend(parents);
                    segments.push(&format!("{last}.json"));
                }
                None => {
                    segments.push(".json");
                }
            }
        }
        if let Some(token) = auth {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    /// Reads the value at `path`; absent nodes read as `null`.
    pub async fn get(&self, path: &DataPath, auth: Option<&str>) -> Result<Value, StoreError> {
        let url = self.url(path, auth)?;
        tracing::debug!(path = %path, "GET");
        let response = check(self.http.get(url).send().await?).await?;
        decode(response).await
    }

    /// Appends `body` under a store-generated key.
    pub async fn post<T: Serialize + Sync>(
        &self,
        path: &DataPath,
        auth: Option<&str>,
        body: &T,
    ) -> Result<PushReply, StoreError> {
        let url = self.url(path, auth)?;
        tracing::debug!(path = %path, "POST");
        let response = check(self.http.post(url).json(body).send().await?).await?;
        decode(response).await
    }

    /// Merges the children of `body` into the node at `path`.
    pub async fn patch<T: Serialize + Sync>(
        &self,
        path: &DataPath,
        auth: Option<&str>,
        body: &T,
    ) -> Result<(), StoreError> {
        let url = self.url(path, auth)?;
        tracing::debug!(path = %path, "PATCH");
        check(self.http.patch(url).json(body).send().await?).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &DataPath, auth: Option<&str>) -> Result<(), StoreError> {
        let url = self.url(path, auth)?;
        tracing::debug!(path = %path, "DELETE");
        check(self.http.delete(url).send().await?).await?;
        Ok(())
    }

    /// Opens a live event stream on `path`. The body is `text/event-stream`.
    pub async fn open_stream(
        &self,
        path: &DataPath,
        auth: Option<&str>,
    ) -> Result<reqwest::Response, StoreError> {
        let url = self.url(path, auth)?;
        tracing::debug!(path = %path, "opening event stream");
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        check(response).await
    }
}

#[derive(serde::Deserialize)]
struct ErrorReply {
    error: String,
}

/// Turns non-success replies into [`StoreError::Http`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorReply>(&body).map_or_else(
        |_| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.clone()
            }
        },
        |reply| reply.error,
    );
    Err(StoreError::Http {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| StoreError::Decode(e.to_string()))
}
