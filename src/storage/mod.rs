//! Blob storage adapter.
//!
//! Talks to the external blob store over HTTP for the server-proxied path and
//! issues HMAC-signed tokens for the direct client-to-storage upload flow.
//! The completion callback verifies those tokens before touching the database.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

/// How long a direct-upload token stays valid.
const UPLOAD_TOKEN_TTL_SECS: i64 = 15 * 60;

/// What a verified direct-upload token grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadGrant {
    pub site_id: String,
    pub filename: String,
    pub expires_at: i64,
}

/// Response body of the blob store's put endpoint.
#[derive(Debug, Deserialize)]
struct PutResponse {
    url: String,
}

/// Client for the external blob storage provider.
#[derive(Clone)]
pub struct BlobStore {
    http: reqwest::Client,
    base_url: String,
    token: String,
    signing_secret: String,
}

impl BlobStore {
    pub fn new(base_url: &str, token: &str, signing_secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            signing_secret: signing_secret.to_string(),
        }
    }

    /// Server-proxied upload: push bytes to the store, return the storage URL.
    pub async fn put(
        &self,
        site_id: &str,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, AppError> {
        let url = format!("{}/o/{}/{}", self.base_url, site_id, filename);
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .header("content-type", content_type.to_string())
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Blob store put failed ({}): {}",
                status, body
            )));
        }

        let put: PutResponse = response.json().await?;
        Ok(put.url)
    }

    /// Delete an object by its storage URL.
    pub async fn delete(&self, object_url: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(object_url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Blob store delete failed ({}): {}",
                status, body
            )));
        }
        Ok(())
    }

    /// The URL a browser should PUT to for a direct upload.
    pub fn direct_upload_url(&self, site_id: &str, filename: &str) -> String {
        format!("{}/o/{}/{}", self.base_url, site_id, filename)
    }

    /// Issue a signed token authorizing one direct upload.
    pub fn issue_upload_token(&self, site_id: &str, filename: &str) -> String {
        let expires_at = Utc::now().timestamp() + UPLOAD_TOKEN_TTL_SECS;
        let payload = format!("{}\n{}\n{}", site_id, filename, expires_at);
        let sig = self.sign(payload.as_bytes());
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(sig)
        )
    }

    /// Verify a direct-upload token and return what it grants.
    pub fn verify_upload_token(&self, token: &str) -> Result<UploadGrant, AppError> {
        let (payload_b64, sig_b64) = token
            .split_once('.')
            .ok_or_else(|| AppError::Validation("Malformed upload token".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AppError::Validation("Malformed upload token".to_string()))?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| AppError::Validation("Malformed upload token".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|e| AppError::Internal(format!("HMAC init failed: {}", e)))?;
        mac.update(&payload);
        mac.verify_slice(&sig)
            .map_err(|_| AppError::Unauthorized("Invalid upload token".to_string()))?;

        let payload = String::from_utf8(payload)
            .map_err(|_| AppError::Validation("Malformed upload token".to_string()))?;
        let mut parts = payload.split('\n');
        let (site_id, filename, expires_at) = match (parts.next(), parts.next(), parts.next()) {
            (Some(s), Some(f), Some(e)) => (s.to_string(), f.to_string(), e),
            _ => return Err(AppError::Validation("Malformed upload token".to_string())),
        };
        let expires_at: i64 = expires_at
            .parse()
            .map_err(|_| AppError::Validation("Malformed upload token".to_string()))?;

        if Utc::now().timestamp() > expires_at {
            return Err(AppError::Unauthorized("Upload token expired".to_string()));
        }

        Ok(UploadGrant {
            site_id,
            filename,
            expires_at,
        })
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> BlobStore {
        BlobStore::new("https://blob.example/", "token", "test-secret")
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let s = store();
        assert_eq!(
            s.direct_upload_url("site-1", "cover.png"),
            "https://blob.example/o/site-1/cover.png"
        );
    }

    #[test]
    fn test_upload_token_round_trip() {
        let s = store();
        let token = s.issue_upload_token("site-1", "cover.png");
        let grant = s.verify_upload_token(&token).unwrap();
        assert_eq!(grant.site_id, "site-1");
        assert_eq!(grant.filename, "cover.png");
        assert!(grant.expires_at > Utc::now().timestamp());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let s = store();
        let token = s.issue_upload_token("site-1", "cover.png");
        let mut tampered = token.clone();
        tampered.replace_range(0..1, if token.starts_with('A') { "B" } else { "A" });
        assert!(s.verify_upload_token(&tampered).is_err());
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let s = store();
        let other = BlobStore::new("https://blob.example", "token", "other-secret");
        let token = other.issue_upload_token("site-1", "cover.png");
        assert!(s.verify_upload_token(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(store().verify_upload_token("not-a-token").is_err());
        assert!(store().verify_upload_token("a.b").is_err());
    }
}
