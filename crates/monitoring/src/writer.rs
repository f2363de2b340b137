//! Batched line-protocol writer for an InfluxDB v2 compatible store

use crate::point::Point;
use async_trait::async_trait;
use btc_monitor_config::InfluxSection;
use reqwest::{header, Client, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why a batch could not be stored
#[derive(Error, Debug)]
pub enum WriteCause {
    #[error(transparent)]
    Transport(reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid store URL: {0}")]
    InvalidUrl(String),
}

/// A batch was rejected or the store was unreachable
#[derive(Error, Debug)]
#[error("failed to write {points} points to {url}: {cause}")]
pub struct WriteError {
    pub url: String,
    pub points: usize,
    #[source]
    pub cause: WriteCause,
}

impl WriteError {
    /// HTTP status returned by the store, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match &self.cause {
            WriteCause::Status { status, .. } => Some(*status),
            WriteCause::Transport(_) | WriteCause::InvalidUrl(_) => None,
        }
    }
}

/// Destination for the points built by a collection cycle
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Writes `points` as one batch, returning how many were sent
    async fn write_points(&self, points: Vec<Point>) -> Result<usize, WriteError>;
}

/// Connection settings for [`LineProtocolWriter`]
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub tls_verify: bool,
}

impl WriterOptions {
    /// Builds options from the `influx` section and an already resolved token
    pub fn from_config(section: &InfluxSection, token: String) -> Self {
        Self {
            url: section.url.clone(),
            org: section.org.clone(),
            bucket: section.bucket.clone(),
            token: Some(token).filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(section.timeout_secs.max(1)),
            tls_verify: section.tls_verify,
        }
    }
}

/// Relative to the configured base so a proxy path prefix is kept
const WRITE_PATH: &str = "api/v2/write";

/// Posts newline-joined line protocol to `/api/v2/write`
#[derive(Debug, Clone)]
pub struct LineProtocolWriter {
    endpoint: Url,
    token: Option<String>,
    http_client: Client,
}

impl LineProtocolWriter {
    pub fn new(options: WriterOptions) -> Result<Self, WriteError> {
        let build_error = |cause| WriteError {
            url: options.url.clone(),
            points: 0,
            cause,
        };

        let base = format!("{}/", options.url.trim_end_matches('/'));
        let mut endpoint = Url::parse(&base)
            .and_then(|base| base.join(WRITE_PATH))
            .map_err(|err| build_error(WriteCause::InvalidUrl(err.to_string())))?;
        endpoint
            .query_pairs_mut()
            .append_pair("org", &options.org)
            .append_pair("bucket", &options.bucket)
            .append_pair("precision", "s");

        let http_client = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(!options.tls_verify)
            .build()
            .map_err(|err| build_error(WriteCause::Transport(err)))?;

        Ok(Self {
            endpoint,
            token: options.token,
            http_client,
        })
    }

    /// Full write URL including the query string
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Newline-joined lines of every point that has at least one field
    pub fn encode_batch(points: &[Point]) -> (String, usize) {
        let lines: Vec<String> = points
            .iter()
            .filter(|point| point.has_fields())
            .map(Point::to_line)
            .collect();
        (lines.join("\n"), lines.len())
    }
}

#[async_trait]
impl PointSink for LineProtocolWriter {
    async fn write_points(&self, points: Vec<Point>) -> Result<usize, WriteError> {
        let (payload, count) = Self::encode_batch(&points);
        if payload.is_empty() {
            debug!("no points with fields, skipping write");
            return Ok(0);
        }

        let error = |cause| WriteError {
            url: self.endpoint.to_string(),
            points: count,
            cause,
        };

        let mut request = self
            .http_client
            .post(self.endpoint.clone())
            .header(header::CONTENT_TYPE, "text/plain")
            .body(payload);
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("Token {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|err| error(WriteCause::Transport(err)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error(WriteCause::Status {
                status: status.as_u16(),
                body,
            }));
        }

        debug!(points = count, "batch written");
        Ok(count)
    }
}
