//! Home-automation REST client.
//!
//! Two operations against a Home Assistant-shaped REST API: listing entity
//! states and invoking a service. Grounded in the same free-function +
//! thin-struct-wrapper shape the teacher uses for its SOAP client, but over
//! plain JSON/HTTP rather than SOAP.

pub mod context;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

pub use context::{build_context_lines, EntityView};

/// Client for the two home-automation REST endpoints this gateway consumes.
///
/// Base URL and token are normalized once at construction (trailing slash
/// stripped from the URL, whitespace trimmed from the token) rather than on
/// every call.
#[derive(Debug, Clone)]
pub struct HomeAssistantClient {
    http: Client,
    base_url: String,
    token: String,
}

impl HomeAssistantClient {
    /// Builds a client for the given base URL and bearer token.
    #[must_use]
    pub fn new(http: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into().trim().to_string(),
        }
    }

    fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.token.is_empty()
    }

    /// Fetches the current entity state snapshot.
    ///
    /// On HTTP 401, logs a warning and returns an empty list rather than
    /// failing — the session still proceeds with an empty entity context.
    /// Any other non-200 status, or a response body that isn't a JSON
    /// array, is a hard failure raised to the caller. An unconfigured
    /// client (no base URL or token) is also a hard failure — it can never
    /// successfully list states, so it must surface as the fetch-failure
    /// placeholder rather than as a successful empty snapshot.
    pub async fn get_states(&self) -> GatewayResult<Vec<Value>> {
        if !self.is_configured() {
            return Err(GatewayError::HomeAssistant("not configured".to_string()));
        }

        let url = format!("{}/api/states", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| GatewayError::HomeAssistant(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            log::warn!("home assistant returned 401 fetching entity states");
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            return Err(GatewayError::HomeAssistant(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::HomeAssistant(e.to_string()))?;

        match body {
            Value::Array(states) => Ok(states),
            _ => Err(GatewayError::HomeAssistant(
                "expected a JSON array from /api/states".to_string(),
            )),
        }
    }

    /// Invokes a home-automation service call.
    ///
    /// Returns `(true, "ok")` on HTTP 200, `(false, "HTTP <status>: <first
    /// 500 chars of body>")` otherwise. Never returns an `Err` — every
    /// failure mode here is meant to be narrated back to the model as a
    /// tool response, not treated as a hard gateway failure.
    pub async fn call_service(&self, domain: &str, service: &str, data: Value) -> (bool, String) {
        if !self.is_configured() {
            return (false, "home assistant not configured".to_string());
        }

        let domain = domain.trim();
        let service = service.trim();
        if domain.is_empty() || service.is_empty() {
            return (false, "domain/service missing".to_string());
        }

        let url = format!("{}/api/services/{}/{}", self.base_url, domain, service);
        let response = match self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&data)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return (false, format!("HTTP request failed: {e}")),
        };

        if response.status().is_success() {
            return (true, "ok".to_string());
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let truncated: String = body.chars().take(500).collect();
        (false, format!("HTTP {status}: {truncated}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_client_reports_not_configured() {
        let client = HomeAssistantClient::new(Client::new(), "", "");
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn unconfigured_client_get_states_is_a_fetch_failure() {
        let client = HomeAssistantClient::new(Client::new(), "", "");
        assert!(client.get_states().await.is_err());
    }

    #[tokio::test]
    async fn unconfigured_client_call_service_reports_not_configured() {
        let client = HomeAssistantClient::new(Client::new(), "", "");
        let (ok, message) = client.call_service("light", "turn_on", serde_json::json!({})).await;
        assert!(!ok);
        assert!(message.contains("not configured"));
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client = HomeAssistantClient::new(Client::new(), "http://host:8123/", "tok");
        assert_eq!(client.base_url, "http://host:8123");
    }

    #[test]
    fn token_is_trimmed() {
        let client = HomeAssistantClient::new(Client::new(), "http://host", "  tok  ");
        assert_eq!(client.token, "tok");
    }
}
