//! An axum stand-in for the B2 HTTP API.
//!
//! The server runs on its own thread and runtime, so both `#[tokio::test]`
//! cases and blocking `assert_cmd` cases can talk to it.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

type Handler = dyn Fn(&str, &Recorded) -> (u16, String) + Send + Sync;

#[derive(Clone)]
struct FakeState {
    base: String,
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

pub struct FakeB2 {
    pub url: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeB2 {
    /// Start serving. `handler` gets the server's base URL and the request,
    /// and returns a status code and a JSON body.
    pub fn spawn<H>(handler: H) -> FakeB2
    where
        H: Fn(&str, &Recorded) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind fake server");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = FakeState {
            base: url.clone(),
            handler: Arc::new(handler),
            requests: Arc::clone(&requests),
        };
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("fake server runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                let app = Router::new().fallback(handle).with_state(state);
                axum::serve(listener, app).await.expect("fake server");
            });
        });

        FakeB2 { url, requests }
    }

    pub fn requests_to(&self, endpoint: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path.ends_with(endpoint))
            .cloned()
            .collect()
    }
}

async fn handle(
    State(state): State<FakeState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect(),
        body: body.to_vec(),
    };
    let (status, body) = (state.handler)(&state.base, &request);
    state.requests.lock().unwrap().push(request);
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
}

/// Handler for the authorize and list-buckets calls every run starts with.
pub fn session_response(base: &str, request: &Recorded, bucket: &str) -> Option<(u16, String)> {
    if request.path.ends_with("/b2_authorize_account") {
        return Some(authorize_response(base, "account-token"));
    }
    if request.path.ends_with("/b2_list_buckets") {
        let asked = request.json()["bucketName"].as_str().unwrap_or_default().to_string();
        let buckets = if asked == bucket {
            serde_json::json!([{"bucketId": "bucket-id-1", "bucketName": bucket}])
        } else {
            serde_json::json!([])
        };
        return Some((200, serde_json::json!({ "buckets": buckets }).to_string()));
    }
    None
}

pub fn authorize_response(base: &str, token: &str) -> (u16, String) {
    (
        200,
        serde_json::json!({
            "accountId": "acc-1",
            "apiUrl": base,
            "authorizationToken": token,
            "downloadUrl": base,
        })
        .to_string(),
    )
}

pub fn file_record(name: &str, sha1: &str) -> serde_json::Value {
    serde_json::json!({
        "accountId": "acc-1",
        "action": "upload",
        "bucketId": "bucket-id-1",
        "contentLength": 1,
        "contentSha1": sha1,
        "contentType": "text/plain",
        "fileId": format!("id-{name}"),
        "fileInfo": {"sha1": sha1},
        "fileName": name,
        "uploadTimestamp": 1700000000000i64
    })
}
