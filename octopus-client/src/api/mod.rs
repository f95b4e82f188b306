//! Client for the Octopus Energy REST and GraphQL APIs.

mod graphql;
mod rest;

use std::fmt;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

pub const DEFAULT_REST_BASE_URL: &str = "https://api.octopus.energy/v1";
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.octopus.energy/v1/graphql/";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("HTTP request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GraphQL error: {0}")]
    GraphQl(String),
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// Non-2xx status or transport failure.
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Transport { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status(),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct OctopusClient {
    http: reqwest::Client,
    api_key: String,
    rest_base_url: String,
    graphql_url: String,
}

impl OctopusClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            rest_base_url: DEFAULT_REST_BASE_URL.to_string(),
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
        }
    }

    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_graphql_url(mut self, url: impl Into<String>) -> Self {
        self.graphql_url = url.into();
        self
    }
}

impl fmt::Debug for OctopusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OctopusClient")
            .field("api_key", &"*****")
            .field("rest_base_url", &self.rest_base_url)
            .field("graphql_url", &self.graphql_url)
            .finish()
    }
}

/// Check the status and decode a JSON body.
async fn read_json<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await.map_err(|source| ApiError::Transport {
        url: url.to_string(),
        source,
    })?;

    if !status.is_success() {
        return Err(ApiError::Status {
            url: url.to_string(),
            status,
            body,
        });
    }

    serde_json::from_str(&body).map_err(|source| ApiError::Decode {
        url: url.to_string(),
        source,
    })
}
