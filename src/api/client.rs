use super::types::{Attribution, Reason, Student};
use crate::config::ApiConfig;
use crate::error::ApiError;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

mod endpoints {
    pub const STUDENTS: &str = "display";
    pub const REASONS: &str = "display_raison";
    pub const ATTRIBUTE: &str = "attribuer_point";
}

/// Client for the attendance REST backend
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ApiError::Client {
                details: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// `GET /display`
    pub async fn students(&self) -> Result<Vec<Student>, ApiError> {
        let students: Vec<Student> = self.get_json(endpoints::STUDENTS).await?;
        info!("Loaded {} students", students.len());
        Ok(students)
    }

    /// `GET /display_raison`
    pub async fn reasons(&self) -> Result<Vec<Reason>, ApiError> {
        let reasons: Vec<Reason> = self.get_json(endpoints::REASONS).await?;
        info!("Loaded {} reasons", reasons.len());
        Ok(reasons)
    }

    /// `POST /attribuer_point`, returning the server's acknowledgement as-is
    pub async fn attribute_points(
        &self,
        attribution: &Attribution,
    ) -> Result<serde_json::Value, ApiError> {
        let url = self.url(endpoints::ATTRIBUTE);
        debug!(
            student = attribution.id_etudiant,
            reason = attribution.id_raison,
            "POST {}",
            url
        );

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(attribution)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: endpoints::ATTRIBUTE.to_string(),
                source,
            })?;

        let response = Self::check_status(endpoints::ATTRIBUTE, response)?;
        let body = response.bytes().await.map_err(|source| ApiError::Request {
            endpoint: endpoints::ATTRIBUTE.to_string(),
            source,
        })?;

        if body.is_empty() {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidResponse {
            endpoint: endpoints::ATTRIBUTE.to_string(),
            details: e.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let url = self.url(endpoint);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let response = Self::check_status(endpoint, response)?;
        response.json().await.map_err(|e| ApiError::InvalidResponse {
            endpoint: endpoint.to_string(),
            details: e.to_string(),
        })
    }

    fn check_status(endpoint: &str, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            warn!("{} answered HTTP {}", endpoint, status);
            Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            })
        }
    }
}
