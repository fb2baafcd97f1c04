//! Shared helpers for the mock-server tests.

#![allow(dead_code)]

use std::sync::Arc;

use chirp_core::{ApiUrl, ClientConfig, Credentials, ManualClock};
use chirp_http::Client;
use futures_util::StreamExt;
use serde_json::Value;
use wiremock::MockServer;

/// Fixed start time for every test clock.
pub const NOW: i64 = 1_700_000_000;

pub fn mock_config(server: &MockServer) -> ClientConfig {
    ClientConfig::default().with_base_url(ApiUrl::new(server.uri()).unwrap())
}

pub async fn client_with(
    credentials: Credentials,
    config: ClientConfig,
) -> (Client, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_timestamp(NOW));
    let client = Client::with_clock(credentials, config, clock.clone())
        .await
        .unwrap();
    (client, clock)
}

/// An app-context client pointed at `server`.
pub async fn app_client(server: &MockServer) -> (Client, Arc<ManualClock>) {
    client_with(Credentials::bearer("test-bearer"), mock_config(server)).await
}

/// A user-context client pointed at `server`.
pub async fn user_client(server: &MockServer) -> (Client, Arc<ManualClock>) {
    client_with(Credentials::user("ck", "cs", "at", "ats"), mock_config(server)).await
}

/// Drain a stream, panicking on the first error.
pub async fn collect<S>(stream: S) -> Vec<Value>
where
    S: futures_util::Stream<Item = chirp_core::Result<Value>> + Unpin,
{
    stream
        .map(|item| item.unwrap())
        .collect::<Vec<_>>()
        .await
}

/// `id_str` of every record.
pub fn id_strs(records: &[Value]) -> Vec<&str> {
    records
        .iter()
        .map(|r| r["id_str"].as_str().unwrap())
        .collect()
}

/// The value of one query parameter of a received request.
pub fn query_value(request: &wiremock::Request, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
