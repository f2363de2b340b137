use crate::error::ServiceError;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

/// Timeout for auxiliary HTTP services
pub const SERVICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tip and client count reported by an Electrum indexer (Fulcrum, electrs)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndexerStats {
    pub tip_height: f64,
    pub clients: f64,
}

/// Extracts [`IndexerStats`] from a stats document.
///
/// `clients` may be a plain number or an object of per-kind counters, in
/// which case every numeric leaf is summed. Missing keys count as zero.
pub fn parse_indexer_stats(body: &Value) -> IndexerStats {
    IndexerStats {
        tip_height: body.get("tip_height").and_then(Value::as_f64).unwrap_or(0.0),
        clients: body.get("clients").map(sum_numeric_leaves).unwrap_or(0.0),
    }
}

fn sum_numeric_leaves(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Object(map) => map.values().map(sum_numeric_leaves).sum(),
        Value::Array(items) => items.iter().map(sum_numeric_leaves).sum(),
        _ => 0.0,
    }
}

/// Polls the indexer stats endpoint
#[derive(Debug, Clone)]
pub struct IndexerClient {
    url: Url,
    http_client: Client,
}

impl IndexerClient {
    pub fn new(url: Url) -> Result<Self, ServiceError> {
        let http_client = Client::builder()
            .timeout(SERVICE_TIMEOUT)
            .build()
            .map_err(|source| ServiceError::Transport {
                url: url.to_string(),
                source,
            })?;
        Ok(Self { url, http_client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn fetch(&self) -> Result<IndexerStats, ServiceError> {
        let body = get_json(&self.http_client, &self.url).await?;
        trace!(url = %self.url, "indexer stats fetched");
        Ok(parse_indexer_stats(&body))
    }
}

pub(crate) async fn get_json(client: &Client, url: &Url) -> Result<Value, ServiceError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|source| ServiceError::Transport {
            url: url.to_string(),
            source,
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let text = response
        .text()
        .await
        .map_err(|source| ServiceError::Transport {
            url: url.to_string(),
            source,
        })?;
    serde_json::from_str(&text).map_err(|err| ServiceError::InvalidBody {
        url: url.to_string(),
        message: err.to_string(),
    })
}
