use crate::error::ServiceError;
use crate::indexer_client::{get_json, SERVICE_TIMEOUT};
use reqwest::{Client, Url};
use serde_json::Value;
use std::collections::BTreeMap;

const RECOMMENDED_PATH: &str = "api/v1/fees/recommended";

/// Client for a mempool.space compatible fee API
#[derive(Debug, Clone)]
pub struct FeeApiClient {
    endpoint: Url,
    http_client: Client,
}

impl FeeApiClient {
    /// `api_base` is the server root, e.g. `http://127.0.0.1:3006`
    pub fn new(api_base: &str) -> Result<Self, ServiceError> {
        let endpoint = recommended_url(api_base)?;
        let http_client = Client::builder()
            .timeout(SERVICE_TIMEOUT)
            .build()
            .map_err(|source| ServiceError::Transport {
                url: endpoint.to_string(),
                source,
            })?;
        Ok(Self {
            endpoint,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Recommended fee levels, label to sat/vB; non-numeric entries are skipped
    pub async fn fetch_recommended(&self) -> Result<BTreeMap<String, f64>, ServiceError> {
        let body = get_json(&self.http_client, &self.endpoint).await?;
        numeric_entries(&body).ok_or_else(|| ServiceError::InvalidBody {
            url: self.endpoint.to_string(),
            message: "expected a JSON object".to_string(),
        })
    }
}

fn recommended_url(api_base: &str) -> Result<Url, ServiceError> {
    let base = format!("{}/", api_base.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|base| base.join(RECOMMENDED_PATH))
        .map_err(|err| ServiceError::InvalidBody {
            url: api_base.to_string(),
            message: err.to_string(),
        })
}

fn numeric_entries(body: &Value) -> Option<BTreeMap<String, f64>> {
    let map = body.as_object()?;
    Some(
        map.iter()
            .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_joins_base_with_or_without_slash() {
        for base in ["http://127.0.0.1:3006", "http://127.0.0.1:3006/"] {
            let client = FeeApiClient::new(base).expect("client");
            assert_eq!(
                client.endpoint().as_str(),
                "http://127.0.0.1:3006/api/v1/fees/recommended"
            );
        }
    }

    #[test]
    fn only_numeric_entries_are_kept() {
        let entries = numeric_entries(&json!({
            "fastestFee": 21,
            "halfHourFee": 14.5,
            "note": "cached",
            "nested": {"x": 1}
        }))
        .expect("object");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["fastestFee"], 21.0);
        assert_eq!(entries["halfHourFee"], 14.5);
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(numeric_entries(&json!([1, 2])).is_none());
    }
}
