//! Backblaze B2 storage backend: implements the core RemoteStorage contract
//! over the B2 native HTTP API.
//!
//! # B2 Storage Client
//!
//! [`B2Client`] talks to the B2 native API (v2) with `reqwest`:
//!
//! - `b2_authorize_account` with the application key id and key as basic
//!   auth. The session (account id, API URL, token) is cached until B2
//!   answers `401 expired_auth_token` or `bad_auth_token`; the client then
//!   authorizes again and repeats the call once.
//! - `b2_list_buckets` to turn a bucket name into its id, cached per name.
//! - `b2_list_file_names`, `b2_get_upload_url` + upload, and
//!   `b2_delete_file_version` for the three [`RemoteStorage`] operations.
//!
//! Apart from that re-authorization, every call makes exactly one attempt;
//! retrying is done by the core.
//!
//! ## Credentials
//!
//! [`B2Credentials::from_env`] reads `B2_APPLICATION_KEY_ID` and
//! `B2_APPLICATION_KEY`, plus an optional `B2_API_URL`.

use async_trait::async_trait;
use bucket_sync_core::contract::{ListPage, ObjectRecord, RemoteStorage, UploadRequest};
use bucket_sync_core::error::StorageError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

pub const DEFAULT_API_URL: &str = "https://api.backblazeb2.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Application key for a B2 account.
#[derive(Clone)]
pub struct B2Credentials {
    pub key_id: String,
    pub application_key: String,
    pub api_url: String,
}

impl fmt::Debug for B2Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("B2Credentials")
            .field("key_id", &self.key_id)
            .field("application_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl B2Credentials {
    pub fn new(key_id: impl Into<String>, application_key: impl Into<String>) -> Self {
        B2Credentials {
            key_id: key_id.into(),
            application_key: application_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Read the key from the environment. `B2_API_URL` wins over `fallback_api_url`.
    pub fn from_env(fallback_api_url: Option<&str>) -> anyhow::Result<Self> {
        let key_id = env::var("B2_APPLICATION_KEY_ID").map_err(|e| {
            tracing::error!(error = ?e, "B2_APPLICATION_KEY_ID missing in environment");
            anyhow::anyhow!("B2_APPLICATION_KEY_ID must be set: {e}")
        })?;
        let application_key = env::var("B2_APPLICATION_KEY").map_err(|e| {
            tracing::error!(error = ?e, "B2_APPLICATION_KEY missing in environment");
            anyhow::anyhow!("B2_APPLICATION_KEY must be set: {e}")
        })?;
        let api_url = env::var("B2_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| fallback_api_url.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        tracing::info!(
            key_id = %key_id,
            api_url = %api_url,
            "Loaded B2 credentials from environment"
        );
        Ok(B2Credentials {
            key_id,
            application_key,
            api_url,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    account_id: String,
    api_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketInfo {
    bucket_id: String,
    bucket_name: String,
}

#[derive(Debug, Deserialize)]
struct ListBucketsResponse {
    buckets: Vec<BucketInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsRequest<'a> {
    account_id: &'a str,
    bucket_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesRequest<'a> {
    bucket_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_file_name: Option<&'a str>,
    max_file_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesResponse {
    files: Vec<ObjectRecord>,
    #[serde(default)]
    next_file_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlRequest<'a> {
    bucket_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTarget {
    upload_url: String,
    authorization_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteFileVersionRequest<'a> {
    file_name: &'a str,
    file_id: &'a str,
}

/// Error body returned by every B2 endpoint on failure.
#[derive(Debug, Deserialize)]
struct B2ErrorBody {
    status: u16,
    code: String,
    #[serde(default)]
    message: String,
}

/// Map a non-2xx response to [`StorageError::Api`], keeping B2's error code when present.
pub fn api_error(status: u16, body: &str) -> StorageError {
    match serde_json::from_str::<B2ErrorBody>(body) {
        Ok(err) => StorageError::Api {
            status: err.status,
            code: err.code,
            message: err.message,
        },
        Err(_) => StorageError::Api {
            status,
            code: "unknown".to_string(),
            message: body.trim().to_string(),
        },
    }
}

/// Decode a successful response body, or report it as malformed.
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, StorageError> {
    serde_json::from_str(body).map_err(|e| StorageError::Malformed(e.to_string()))
}

/// Percent-encode an object name for `X-Bz-File-Name`, leaving `/` intact.
pub fn encode_file_name(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// True when B2 rejected the session token and a fresh authorization may succeed.
pub fn is_expired_token(err: &StorageError) -> bool {
    matches!(
        err,
        StorageError::Api { status: 401, code, .. }
            if code == "expired_auth_token" || code == "bad_auth_token"
    )
}

fn transport(e: reqwest::Error) -> StorageError {
    StorageError::Transport(e.to_string())
}

async fn read_response<T: DeserializeOwned>(resp: Response) -> Result<T, StorageError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport)?;
    if !status.is_success() {
        let err = api_error(status.as_u16(), &body);
        tracing::warn!(status = status.as_u16(), error = %err, "B2 API returned an error");
        return Err(err);
    }
    parse_body(&body)
}

/// [`RemoteStorage`] over the Backblaze B2 native API.
pub struct B2Client {
    http: Client,
    credentials: B2Credentials,
    session: RwLock<Option<Session>>,
    bucket_ids: Mutex<HashMap<String, String>>,
}

impl B2Client {
    pub fn new(credentials: B2Credentials) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("bucket-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(B2Client {
            http,
            credentials,
            session: RwLock::new(None),
            bucket_ids: Mutex::new(HashMap::new()),
        })
    }

    pub fn new_from_env() -> anyhow::Result<Self> {
        Self::new(B2Credentials::from_env(None)?)
    }

    async fn session(&self) -> Result<Session, StorageError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }
        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = self.authorize().await?;
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Forget the cached session, unless another task already replaced `stale_token`.
    async fn invalidate_session(&self, stale_token: &str) {
        let mut slot = self.session.write().await;
        if slot
            .as_ref()
            .is_some_and(|s| s.authorization_token == stale_token)
        {
            *slot = None;
        }
    }

    async fn authorize(&self) -> Result<Session, StorageError> {
        let url = format!(
            "{}/b2api/v2/b2_authorize_account",
            self.credentials.api_url.trim_end_matches('/')
        );
        tracing::info!(url = %url, key_id = %self.credentials.key_id, "Authorizing B2 account");
        let resp = self
            .http
            .get(&url)
            .basic_auth(
                &self.credentials.key_id,
                Some(&self.credentials.application_key),
            )
            .send()
            .await
            .map_err(transport)?;
        let session: Session = read_response(resp).await?;
        tracing::info!(
            account_id = %session.account_id,
            api_url = %session.api_url,
            "B2 account authorized"
        );
        Ok(session)
    }

    async fn call<B, T>(&self, endpoint: &str, body: &B) -> Result<T, StorageError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let session = self.session().await?;
        match self.post_json(&session, endpoint, body).await {
            Err(err) if is_expired_token(&err) => {
                tracing::warn!(endpoint, error = %err, "B2 session rejected, authorizing again");
                self.invalidate_session(&session.authorization_token).await;
                let session = self.session().await?;
                self.post_json(&session, endpoint, body).await
            }
            result => result,
        }
    }

    async fn post_json<B, T>(
        &self,
        session: &Session,
        endpoint: &str,
        body: &B,
    ) -> Result<T, StorageError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!(
            "{}/b2api/v2/{endpoint}",
            session.api_url.trim_end_matches('/')
        );
        tracing::debug!(endpoint, "Calling B2 API");
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, &session.authorization_token)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        read_response(resp).await
    }

    /// Bucket id for `bucket`, looked up once and cached.
    pub async fn resolve_bucket(&self, bucket: &str) -> Result<String, StorageError> {
        if let Some(id) = self.bucket_ids.lock().await.get(bucket) {
            return Ok(id.clone());
        }
        let session = self.session().await?;
        let request = ListBucketsRequest {
            account_id: &session.account_id,
            bucket_name: bucket,
        };
        let resp: ListBucketsResponse = self.call("b2_list_buckets", &request).await?;
        let id = resp
            .buckets
            .into_iter()
            .find(|b| b.bucket_name == bucket)
            .map(|b| b.bucket_id)
            .ok_or_else(|| StorageError::Api {
                status: 404,
                code: "bucket_not_found".to_string(),
                message: format!("bucket {bucket} does not exist or is not visible to this key"),
            })?;
        tracing::info!(bucket, bucket_id = %id, "Resolved B2 bucket");
        self.bucket_ids
            .lock()
            .await
            .insert(bucket.to_string(), id.clone());
        Ok(id)
    }
}

#[async_trait]
impl RemoteStorage for B2Client {
    async fn list_objects(
        &self,
        bucket: &str,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<ListPage, StorageError> {
        let bucket_id = self.resolve_bucket(bucket).await?;
        let request = ListFileNamesRequest {
            bucket_id: &bucket_id,
            start_file_name: cursor.as_deref(),
            max_file_count: page_size,
        };
        let resp: ListFileNamesResponse = self.call("b2_list_file_names", &request).await?;
        Ok(ListPage {
            records: resp.files,
            next_cursor: resp.next_file_name,
        })
    }

    async fn upload_object(&self, request: &UploadRequest) -> Result<(), StorageError> {
        let bucket_id = self.resolve_bucket(&request.bucket).await?;
        let target: UploadTarget = self
            .call(
                "b2_get_upload_url",
                &GetUploadUrlRequest {
                    bucket_id: &bucket_id,
                },
            )
            .await?;

        let body = tokio::fs::read(&request.source_path)
            .await
            .map_err(|source| StorageError::Io {
                path: request.source_path.clone(),
                source,
            })?;

        let resp = self
            .http
            .post(&target.upload_url)
            .header(AUTHORIZATION, &target.authorization_token)
            .header("X-Bz-File-Name", encode_file_name(&request.target_name))
            .header(CONTENT_TYPE, "b2/x-auto")
            .header("X-Bz-Content-Sha1", &request.content_hash)
            .header("X-Bz-Info-sha1", &request.content_hash)
            .body(body)
            .send()
            .await
            .map_err(transport)?;
        let stored: ObjectRecord = read_response(resp).await?;
        tracing::info!(
            file_name = %stored.file_name,
            file_id = %stored.file_id,
            "Stored object in B2"
        );
        Ok(())
    }

    async fn delete_object_version(
        &self,
        file_name: &str,
        version_id: &str,
    ) -> Result<(), StorageError> {
        let request = DeleteFileVersionRequest {
            file_name,
            file_id: version_id,
        };
        let _: serde_json::Value = self.call("b2_delete_file_version", &request).await?;
        Ok(())
    }
}
