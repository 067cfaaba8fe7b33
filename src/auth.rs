use crate::config::Config;
use crate::error::Error;
use reqwest::Client;
use serde::Deserialize;

const TOKEN_PATH: &str = "computeMetadata/v1/instance/service-accounts/default/token";

#[async_trait::async_trait]
pub trait AccessTokenSource: Send + Sync + 'static {
    /// Returns a bearer token usable against Google Cloud APIs.
    async fn access_token(&self) -> Result<String, Error>;
}

/// Token handed to us through configuration, for runs outside of Google Cloud.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenSource {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String, Error> {
        Ok(self.token.clone())
    }
}

/// Asks the metadata server for the default service account's token.
pub struct MetadataTokenSource {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl MetadataTokenSource {
    pub fn new(client: Client, base_url: &str) -> Self {
        MetadataTokenSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String, Error> {
        let url = format!("{}/{}", self.base_url, TOKEN_PATH);

        let token = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json::<MetadataToken>()
            .await?;

        Ok(token.access_token)
    }
}

/// Picks the static token when one is configured, the metadata server otherwise.
pub fn token_source(config: &Config, client: &Client) -> Box<dyn AccessTokenSource> {
    match &config.cloud_access_token {
        Some(token) => Box::new(StaticTokenSource::new(token.as_str())),
        None => Box::new(MetadataTokenSource::new(
            client.clone(),
            &config.endpoints.metadata_url,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_metadata_token_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}", TOKEN_PATH)))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let source = MetadataTokenSource::new(Client::new(), &server.uri());
        assert_eq!(source.access_token().await.unwrap(), "ya29.token");
    }

    #[tokio::test]
    async fn test_metadata_token_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = MetadataTokenSource::new(Client::new(), &server.uri());
        assert!(matches!(
            source.access_token().await.unwrap_err(),
            Error::Http(_)
        ));
    }

    #[tokio::test]
    async fn test_static_token_preferred_when_configured() {
        let config =
            crate::config::tests::config_from(&["--cloud-access-token", "local-token"]);
        let source = token_source(&config, &Client::new());
        assert_eq!(source.access_token().await.unwrap(), "local-token");
    }
}
