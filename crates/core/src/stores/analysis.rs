use crate::traits::DocumentAnalyzer;
use crate::{AccessDescriptor, AnalysisPage, AnalysisResult, ObjectError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION: &str = "operation-location";

/// Client for the document-analysis service. Analysis is submit-then-poll:
/// the submit call returns an operation handle in a header and the client
/// polls that handle until the service reports a terminal state. The
/// overall deadline is imposed by the caller; this client only paces the
/// polling.
pub struct AnalysisHttpClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    poll_interval: Duration,
}

impl AnalysisHttpClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            poll_interval,
        }
    }

    async fn submit(&self, descriptor: &AccessDescriptor) -> Result<String, ObjectError> {
        let response = self
            .client
            .post(format!(
                "{}/documentModels/{}:analyze",
                self.endpoint, self.model
            ))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({ "urlSource": descriptor.url().as_str() }))
            .send()
            .await?
            .error_for_status()?;

        response
            .headers()
            .get(OPERATION_LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ObjectError::MalformedResponse {
                details: "submit response carried no operation-location header".to_string(),
            })
    }

    async fn await_completion(&self, operation_url: &str) -> Result<AnalysisResult, ObjectError> {
        loop {
            let response = self
                .client
                .get(operation_url)
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await?
                .error_for_status()?;
            let body: Value = response
                .json()
                .await
                .map_err(|error| ObjectError::MalformedResponse {
                    details: error.to_string(),
                })?;

            let status = body
                .pointer("/status")
                .and_then(Value::as_str)
                .unwrap_or_default();
            match status {
                "succeeded" => return Ok(parse_result(&body)),
                "failed" => {
                    let message = body
                        .pointer("/error/message")
                        .and_then(Value::as_str)
                        .unwrap_or("analysis failed without a diagnostic message")
                        .to_string();
                    return Err(ObjectError::AnalysisFailed { message });
                }
                "notStarted" | "running" => sleep(self.poll_interval).await,
                other => {
                    return Err(ObjectError::MalformedResponse {
                        details: format!("unknown operation status {other:?}"),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for AnalysisHttpClient {
    async fn analyze(
        &self,
        descriptor: &AccessDescriptor,
    ) -> Result<AnalysisResult, ObjectError> {
        let operation_url = self.submit(descriptor).await?;
        self.await_completion(&operation_url).await
    }
}

fn parse_result(body: &Value) -> AnalysisResult {
    let raw_pages = body
        .pointer("/analyzeResult/pages")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut pages = Vec::new();
    for (index, raw_page) in raw_pages.iter().enumerate() {
        let number = raw_page
            .pointer("/pageNumber")
            .and_then(Value::as_u64)
            .unwrap_or(index as u64 + 1) as u32;

        let lines = raw_page
            .pointer("/lines")
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| line.pointer("/content").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        pages.push(AnalysisPage { number, lines });
    }

    AnalysisResult { pages }
}
