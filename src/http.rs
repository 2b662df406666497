//! HTTP client for the handful of Discord REST endpoints the bot calls.
//!
//! All outbound HTTP goes through [`DiscordHttpClient::request`] so that
//! auth headers and error mapping live in one place. Rate limits are not
//! retried: a 429 comes back as [`HttpError::Api`] like any other failure.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use tracing::{debug, warn};

use crate::context::InteractionResponder;
use crate::error::HttpError;
use crate::publisher::CommandApi;
use crate::types::*;

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT_VALUE: &str = concat!(
    "DiscordBot (https://discord.com, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// A thin HTTP client for the Discord REST API.
///
/// Cheap to clone (`reqwest::Client` is reference counted).
#[derive(Clone)]
pub struct DiscordHttpClient {
    token: String,
    client: reqwest::Client,
    base_url: String,
}

impl DiscordHttpClient {
    /// Create a new client with the given bot token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Low-level: the single request method everything funnels through
    // ------------------------------------------------------------------

    /// Send a request to `{BASE_URL}/{path}`.
    ///
    /// `route_key` is a template like `PUT /applications/{id}/commands`,
    /// used in logs and errors. Returns the raw response body on success.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, HttpError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut req = self
            .client
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .header(USER_AGENT, USER_AGENT_VALUE);
        if let Some(json) = body {
            req = req.json(json);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        debug!(route = route_key, status = status.as_u16(), "REST call");

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(route = route_key, "rate-limited by Discord");
        }

        Err(HttpError::Api {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            route: route_key.to_string(),
        })
    }

    /// Like [`request`](Self::request) but deserialises the response body as JSON.
    pub async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, HttpError> {
        let bytes = self.request(method, path, route_key, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Slash command registration
// ---------------------------------------------------------------------------

#[async_trait]
impl CommandApi for DiscordHttpClient {
    async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let path = format!(
            "applications/{}/guilds/{}/commands",
            application_id, guild_id
        );
        let body = serde_json::to_value(commands)?;
        self.request_json(
            Method::PUT,
            &path,
            "PUT /applications/{application_id}/guilds/{guild_id}/commands",
            Some(&body),
        )
        .await
    }

    async fn bulk_overwrite_global_commands(
        &self,
        application_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let path = format!("applications/{}/commands", application_id);
        let body = serde_json::to_value(commands)?;
        self.request_json(
            Method::PUT,
            &path,
            "PUT /applications/{application_id}/commands",
            Some(&body),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Interactions
// ---------------------------------------------------------------------------

#[async_trait]
impl InteractionResponder for DiscordHttpClient {
    async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError> {
        let path = format!(
            "interactions/{}/{}/callback",
            interaction_id, interaction_token
        );
        let body = serde_json::to_value(response)?;
        // Discord returns 204 No Content on success, don't parse JSON.
        self.request(
            Method::POST,
            &path,
            "POST /interactions/{id}/{token}/callback",
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_followup_message(
        &self,
        application_id: &str,
        interaction_token: &str,
        data: &InteractionCallbackData,
    ) -> Result<(), HttpError> {
        let path = format!("webhooks/{}/{}", application_id, interaction_token);
        let body = serde_json::to_value(data)?;
        self.request(
            Method::POST,
            &path,
            "POST /webhooks/{application_id}/{token}",
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn edit_original_interaction_response(
        &self,
        application_id: &str,
        interaction_token: &str,
        data: &InteractionCallbackData,
    ) -> Result<(), HttpError> {
        let path = format!(
            "webhooks/{}/{}/messages/@original",
            application_id, interaction_token
        );
        let body = serde_json::to_value(data)?;
        self.request(
            Method::PATCH,
            &path,
            "PATCH /webhooks/{application_id}/{token}/messages/@original",
            Some(&body),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let http = DiscordHttpClient::new("very-secret");
        let debug = format!("{:?}", http);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let mut http = DiscordHttpClient::new("token");
        http.base_url = "http://127.0.0.1:9".to_string();

        let err = http
            .bulk_overwrite_global_commands("app", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
    }
}
