//! Climate data store client.
//!
//! [`ClimateDataStore`] and [`RemoteJob`] are the capability seam used by
//! acquisition: submit a retrieval, ask whether it is ready, download the
//! result. [`CdsClient`] implements them against the ECMWF data stores
//! retrieve API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt as _;
use heating_emissions_weather_models::RetrievalRequest;
use tokio::io::AsyncWriteExt as _;

use crate::{WeatherError, retry};

/// Per-request timeout for API calls (downloads are streamed and not
/// bounded by this).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A service that accepts asynchronous retrieval requests.
#[async_trait]
pub trait ClimateDataStore: Send + Sync {
    /// Submits a retrieval and returns a handle to the remote job.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError`] if the service rejects the request.
    async fn submit(
        &self,
        dataset: &str,
        request: &RetrievalRequest,
    ) -> Result<Box<dyn RemoteJob>, WeatherError>;
}

/// Handle to a submitted retrieval.
#[async_trait]
pub trait RemoteJob: Send + Sync {
    /// Whether the result can be downloaded.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError`] if the status cannot be fetched or the job
    /// failed remotely.
    async fn is_ready(&self) -> Result<bool, WeatherError>;

    /// Downloads the result to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError`] if the download or the file write fails.
    async fn download(&self, target: &Path) -> Result<(), WeatherError>;
}

/// Client for the ECMWF data stores retrieve API.
#[derive(Clone)]
pub struct CdsClient {
    client: reqwest::Client,
    url: String,
    key: String,
}

impl CdsClient {
    /// Creates a client for the API at `url` (e.g.
    /// `https://cds.climate.copernicus.eu/api`) with a personal access token.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Http`] if the HTTP client cannot be built.
    pub fn new(url: &str, key: &str) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .user_agent("heating-emissions/0.1")
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl ClimateDataStore for CdsClient {
    async fn submit(
        &self,
        dataset: &str,
        request: &RetrievalRequest,
    ) -> Result<Box<dyn RemoteJob>, WeatherError> {
        let endpoint = format!("{}/retrieve/v1/processes/{dataset}/execution", self.url);
        let body = serde_json::json!({ "inputs": request });

        let response = retry::send_json(|| {
            self.client
                .post(&endpoint)
                .header("PRIVATE-TOKEN", &self.key)
                .timeout(REQUEST_TIMEOUT)
                .json(&body)
        })
        .await?;

        let job_id = response
            .get("jobID")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| WeatherError::Api {
                message: format!("submission response has no jobID: {response}"),
            })?
            .to_string();

        log::debug!("Submitted {dataset} request for month {:?}: job {job_id}", request.month);

        Ok(Box::new(CdsJob {
            client: self.clone(),
            job_id,
        }))
    }
}

struct CdsJob {
    client: CdsClient,
    job_id: String,
}

impl CdsJob {
    fn job_url(&self) -> String {
        format!("{}/retrieve/v1/jobs/{}", self.client.url, self.job_id)
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, WeatherError> {
        retry::send_json(|| {
            self.client
                .client
                .get(url)
                .header("PRIVATE-TOKEN", &self.client.key)
                .timeout(REQUEST_TIMEOUT)
        })
        .await
    }
}

/// Interprets a job status document.
///
/// # Errors
///
/// Returns [`WeatherError::Api`] for failed, rejected or dismissed jobs.
pub fn parse_job_status(status: &serde_json::Value) -> Result<bool, WeatherError> {
    let state = status
        .get("status")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown");

    match state {
        "successful" => Ok(true),
        "accepted" | "running" => Ok(false),
        "failed" | "rejected" | "dismissed" => {
            let detail = status
                .pointer("/metadata/results/detail")
                .or_else(|| status.get("message"))
                .map(ToString::to_string)
                .unwrap_or_default();
            Err(WeatherError::Api {
                message: format!("job {state} {detail}").trim_end().to_string(),
            })
        }
        other => {
            log::warn!("Unexpected job status {other:?}, treating as not ready");
            Ok(false)
        }
    }
}

/// Extracts the download link from a job results document.
///
/// # Errors
///
/// Returns [`WeatherError::Api`] if the document has no asset link.
pub fn parse_asset_href(results: &serde_json::Value) -> Result<String, WeatherError> {
    results
        .pointer("/asset/value/href")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WeatherError::Api {
            message: format!("results have no asset link: {results}"),
        })
}

#[async_trait]
impl RemoteJob for CdsJob {
    async fn is_ready(&self) -> Result<bool, WeatherError> {
        let status = self.get_json(&self.job_url()).await?;
        parse_job_status(&status)
    }

    async fn download(&self, target: &Path) -> Result<(), WeatherError> {
        let results = self.get_json(&format!("{}/results", self.job_url())).await?;
        let href = parse_asset_href(&results)?;

        log::info!("Downloading {href}");
        log::info!("  -> {}", target.display());

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WeatherError::io(parent, e))?;
        }

        let response = retry::send(|| self.client.client.get(&href)).await?;

        // Written under a temporary name so an interrupted download is
        // never mistaken for a cached archive.
        let partial = target.with_extension("zip.part");
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| WeatherError::io(&partial, e))?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| WeatherError::io(&partial, e))?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| WeatherError::io(&partial, e))?;
        drop(file);

        tokio::fs::rename(&partial, target)
            .await
            .map_err(|e| WeatherError::io(target, e))?;

        #[allow(clippy::cast_precision_loss)]
        let mb = downloaded as f64 / 1_048_576.0;
        log::info!("  download complete: {mb:.1} MB");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn status_states() {
        assert!(parse_job_status(&json!({"status": "successful"})).unwrap());
        assert!(!parse_job_status(&json!({"status": "running"})).unwrap());
        assert!(!parse_job_status(&json!({"status": "accepted"})).unwrap());
        assert!(!parse_job_status(&json!({})).unwrap());
    }

    #[test]
    fn failed_job_is_an_error() {
        let err = parse_job_status(&json!({
            "status": "failed",
            "metadata": {"results": {"detail": "quota exceeded"}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("job failed"));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn asset_link() {
        let results = json!({"asset": {"value": {"href": "https://example.org/a.zip", "type": "application/zip"}}});
        assert_eq!(parse_asset_href(&results).unwrap(), "https://example.org/a.zip");
        assert!(parse_asset_href(&json!({"asset": {}})).is_err());
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = CdsClient::new("https://cds.example.org/api/", "key").unwrap();
        assert_eq!(client.url, "https://cds.example.org/api");
    }
}
