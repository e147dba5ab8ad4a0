//! PlannerApi / Assistant traits and the HTTP client implementing them

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{
    AssistantReply, ExplainRequest, ExplainResponse, NextStepRequest, PlanRequest, PlanResponse, ServiceError,
    TagsPayload,
};
use crate::config::ServiceConfig;
use crate::domain::{PreferenceSet, Stop};

/// Planning endpoints of the backend
#[async_trait]
pub trait PlannerApi: Send + Sync {
    /// `POST /plan`
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse, ServiceError>;

    /// `POST /llm/explain`
    async fn explain(&self, prefs: &PreferenceSet, stops: &[Stop]) -> Result<String, ServiceError>;

    /// `GET /tags`
    async fn tags(&self) -> Result<Vec<String>, ServiceError>;

    /// `POST /normalize_tags`
    async fn normalize_tags(&self, tags: &[String]) -> Result<Vec<String>, ServiceError>;
}

/// Conversational preference assistant
#[async_trait]
pub trait Assistant: Send + Sync {
    /// `POST /llm/next`: the next question, or the finished preference set
    async fn next_step(&self, request: &NextStepRequest) -> Result<AssistantReply, ServiceError>;
}

/// JSON-over-HTTP client for the planning service
pub struct HttpPlannerClient {
    base_url: String,
    http: Client,
    timeout: Duration,
}

impl HttpPlannerClient {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        debug!(base_url = %config.base_url, timeout_ms = config.timeout_ms, "HttpPlannerClient::from_config: called");
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(ServiceError::Network)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!(%path, "post_json: called");
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout))?;
        self.decode(path, response).await
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ServiceError> {
        debug!(%path, "get_json: called");
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout))?;
        self.decode(path, response).await
    }

    async fn decode<R: DeserializeOwned>(&self, path: &str, response: reqwest::Response) -> Result<R, ServiceError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout))?;
        if !status.is_success() {
            warn!(%path, status = status.as_u16(), "decode: service returned error status");
            return Err(ServiceError::ApiError {
                status: status.as_u16(),
                message: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| ServiceError::InvalidResponse(format!("{path}: {e}")))
    }
}

#[async_trait]
impl PlannerApi for HttpPlannerClient {
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse, ServiceError> {
        self.post_json("/plan", request).await
    }

    async fn explain(&self, prefs: &PreferenceSet, stops: &[Stop]) -> Result<String, ServiceError> {
        let body = ExplainRequest {
            prefs: prefs.clone(),
            stops: stops.iter().map(Into::into).collect(),
        };
        let response: ExplainResponse = self.post_json("/llm/explain", &body).await?;
        Ok(response.text)
    }

    async fn tags(&self) -> Result<Vec<String>, ServiceError> {
        let response: TagsPayload = self.get_json("/tags").await?;
        Ok(response.tags)
    }

    async fn normalize_tags(&self, tags: &[String]) -> Result<Vec<String>, ServiceError> {
        let body = TagsPayload { tags: tags.to_vec() };
        let response: TagsPayload = self.post_json("/normalize_tags", &body).await?;
        Ok(response.tags)
    }
}

#[async_trait]
impl Assistant for HttpPlannerClient {
    async fn next_step(&self, request: &NextStepRequest) -> Result<AssistantReply, ServiceError> {
        // Decode in two steps so an unknown `mode` is told apart from broken JSON
        let value: serde_json::Value = self.post_json("/llm/next", request).await?;
        serde_json::from_value(value).map_err(|e| ServiceError::Malformed(e.to_string()))
    }
}

/// Stand-in used when the service is switched off in config
pub struct DisabledPlanner;

#[async_trait]
impl PlannerApi for DisabledPlanner {
    async fn plan(&self, _request: &PlanRequest) -> Result<PlanResponse, ServiceError> {
        Err(ServiceError::Disabled)
    }

    async fn explain(&self, _prefs: &PreferenceSet, _stops: &[Stop]) -> Result<String, ServiceError> {
        Err(ServiceError::Disabled)
    }

    async fn tags(&self) -> Result<Vec<String>, ServiceError> {
        Err(ServiceError::Disabled)
    }

    async fn normalize_tags(&self, _tags: &[String]) -> Result<Vec<String>, ServiceError> {
        Err(ServiceError::Disabled)
    }
}
