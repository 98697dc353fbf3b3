use crate::sas::hmac_base64;
use crate::traits::ObjectLister;
use crate::{ObjectRef, RunError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde_json::Value;

/// Object-storage client. Listing walks the container with marker
/// pagination and authenticates each request with a shared-key signature
/// over the request path.
pub struct BlobStore {
    client: Client,
    endpoint: String,
    account: String,
    key: Vec<u8>,
}

impl BlobStore {
    pub fn new(
        endpoint: impl Into<String>,
        account: impl Into<String>,
        account_key_base64: &str,
    ) -> Result<Self, RunError> {
        let key = STANDARD.decode(account_key_base64).map_err(|error| {
            RunError::Config(format!("account key is not valid base64: {error}"))
        })?;
        let endpoint: String = endpoint.into();

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            account: account.into(),
            key,
        })
    }

    fn authorization(&self, container: &str) -> Result<String, RunError> {
        let canonical = format!("GET\n/{}/{}\ncomp:list", self.account, container);
        let signature = hmac_base64(&self.key, &canonical)
            .map_err(|details| RunError::Config(format!("request signing failed: {details}")))?;
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }
}

#[async_trait]
impl ObjectLister for BlobStore {
    async fn list_objects(&self, container: &str) -> Result<Vec<ObjectRef>, RunError> {
        let listing_error = |details: String| RunError::Listing {
            container: container.to_string(),
            details,
        };

        let authorization = self.authorization(container)?;
        let mut objects = Vec::new();
        let mut marker = String::new();

        loop {
            let response = self
                .client
                .get(format!("{}/{}", self.endpoint, container))
                .header("Authorization", &authorization)
                .query(&[("comp", "list"), ("marker", marker.as_str())])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(listing_error(response.status().to_string()));
            }

            let body: Value = response.json().await?;
            let entries = body
                .pointer("/objects")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for entry in entries {
                let name = entry
                    .pointer("/name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if name.is_empty() {
                    return Err(listing_error("listing entry without a name".to_string()));
                }
                objects.push(ObjectRef::new(container, name));
            }

            let truncated = body
                .pointer("/truncated")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !truncated {
                break;
            }

            marker = body
                .pointer("/next_marker")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if marker.is_empty() {
                // A truncated page without a continuation marker would
                // silently drop the tail of the container.
                return Err(listing_error(
                    "listing reported truncation without a continuation marker".to_string(),
                ));
            }
        }

        Ok(objects)
    }
}
