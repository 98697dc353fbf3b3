use crate::{AccessDescriptor, ObjectError, ObjectRef, RunError};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(3600);

const SIGNED_VERSION: &str = "2023-11-03";
const READ_PERMISSION: &str = "r";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub(crate) fn hmac_base64(key: &[u8], message: &str) -> Result<String, String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|error| error.to_string())?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Issues read-only, single-object, time-boxed access URLs by signing
/// locally with the held account key. Pure computation: no network, no
/// shared state, deterministic for a given object and issuance time.
pub struct SharedKeyIssuer {
    endpoint: Url,
    account: String,
    key: Vec<u8>,
    validity: chrono::Duration,
}

impl SharedKeyIssuer {
    pub fn new(
        endpoint: &str,
        account: &str,
        account_key_base64: &str,
        validity: Duration,
    ) -> Result<Self, RunError> {
        let endpoint = Url::parse(endpoint)?;
        let host = endpoint
            .host_str()
            .ok_or_else(|| RunError::Config("storage endpoint has no host".to_string()))?;

        // The account key signs URLs under the account's own endpoint;
        // a mismatched pair would mint tokens the storage side rejects.
        let endpoint_account = host.split('.').next().unwrap_or_default();
        if endpoint_account != account {
            return Err(RunError::Config(format!(
                "storage endpoint host '{host}' does not belong to account '{account}'"
            )));
        }

        let key = STANDARD.decode(account_key_base64).map_err(|error| {
            RunError::Config(format!("account key is not valid base64: {error}"))
        })?;
        if key.is_empty() {
            return Err(RunError::Config("account key is empty".to_string()));
        }

        let validity = chrono::Duration::from_std(validity).map_err(|error| {
            RunError::Config(format!("token validity window out of range: {error}"))
        })?;

        Ok(Self {
            endpoint,
            account: account.to_string(),
            key,
            validity,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Builds the access descriptor for exactly one object, valid from
    /// `now` until `now + validity`, read permission only.
    pub fn issue(
        &self,
        object: &ObjectRef,
        now: DateTime<Utc>,
    ) -> Result<AccessDescriptor, ObjectError> {
        let expires_at = now + self.validity;
        let start = now.format(TIMESTAMP_FORMAT).to_string();
        let expiry = expires_at.format(TIMESTAMP_FORMAT).to_string();
        let resource = format!("/blob/{}/{}/{}", self.account, object.container, object.name);

        let string_to_sign = [
            READ_PERMISSION,
            start.as_str(),
            expiry.as_str(),
            resource.as_str(),
            SIGNED_VERSION,
            "b",
        ]
        .join("\n");
        let signature =
            hmac_base64(&self.key, &string_to_sign).map_err(ObjectError::Credential)?;

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ObjectError::Credential("storage endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push(&object.container)
            .push(&object.name);
        url.query_pairs_mut()
            .append_pair("sv", SIGNED_VERSION)
            .append_pair("sr", "b")
            .append_pair("sp", READ_PERMISSION)
            .append_pair("st", &start)
            .append_pair("se", &expiry)
            .append_pair("sig", &signature);

        Ok(AccessDescriptor::new(
            url,
            object,
            READ_PERMISSION,
            now,
            expires_at,
        ))
    }
}
