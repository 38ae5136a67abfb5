//! REST gateway for a PostgREST-style record store.
//!
//! Rows are selected with `?column=eq.value` filters and always come back as
//! JSON arrays; an empty array means the record does not exist.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use storypath_engine::{Gateway, GatewayError, Location, LocationId, Project, ProjectId};

use crate::config::GatewayConfig;

pub struct RestGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl RestGateway {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| GatewayError::Transport(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}/{path_and_query}", self.config.api_base())
    }

    fn project_query(&self, id: ProjectId) -> String {
        match self.config.username.as_deref() {
            Some(username) => format!(
                "project?id=eq.{id}&username=eq.{}",
                urlencoding::encode(username)
            ),
            None => format!("project?id=eq.{id}"),
        }
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<Vec<T>, GatewayError> {
        debug!("GET {path_and_query}");
        let mut request = self.client.get(self.url(path_and_query));
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("GET {path_and_query}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Transport(format!(
                "GET {path_and_query}: HTTP {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| GatewayError::Decode(format!("GET {path_and_query}: {e}")))
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn get_project(&self, id: ProjectId) -> Result<Project, GatewayError> {
        self.fetch_rows(&self.project_query(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::project_not_found(id))
    }

    async fn get_locations(&self, project_id: ProjectId) -> Result<Vec<Location>, GatewayError> {
        self.fetch_rows(&format!("location?project_id=eq.{project_id}"))
            .await
    }

    async fn get_location(&self, id: LocationId) -> Result<Location, GatewayError> {
        self.fetch_rows(&format!("location?id=eq.{id}"))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::location_not_found(id))
    }
}
