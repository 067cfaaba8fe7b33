use crate::ads_client::CredentialBundle;
use crate::auth::AccessTokenSource;
use crate::config::SecretNames;
use crate::error::Error;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::debug;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync + 'static {
    /// Fetches the latest version of a secret.
    /// # Arguments
    /// * `name` - The secret id, e.g. `GOOGLE_ADS_CLIENT_ID`.
    /// * `scope` - The project the secret lives in.
    /// # Returns
    /// The secret payload as UTF-8 text, `Error::SecretNotFound` when there is no such secret
    /// and `Error::AccessDenied` when the caller may not read it.
    async fn fetch(&self, name: &str, scope: &str) -> Result<String, Error>;
}

pub struct SecretManagerClient {
    client: Client,
    base_url: String,
    tokens: Box<dyn AccessTokenSource>,
}

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    #[serde(default)]
    data: String,
}

impl SecretManagerClient {
    pub fn new(client: Client, base_url: &str, tokens: Box<dyn AccessTokenSource>) -> Self {
        SecretManagerClient {
            client,
            base_url: base_url.to_string(),
            tokens,
        }
    }

    fn version_url(&self, name: &str, scope: &str) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .pop_if_empty()
            .extend(&["v1", "projects", scope, "secrets", name, "versions", "latest:access"]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl SecretProvider for SecretManagerClient {
    async fn fetch(&self, name: &str, scope: &str) -> Result<String, Error> {
        let url = self.version_url(name, scope)?;
        let token = self.tokens.access_token().await?;

        debug!("Accessing secret {} in project {}", name, scope);

        let resp = self.client.get(url).bearer_auth(token).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(Error::SecretNotFound {
                name: name.to_string(),
                scope: scope.to_string(),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::AccessDenied {
                name: name.to_string(),
                scope: scope.to_string(),
            }),
            _ => {
                let version: AccessSecretVersionResponse =
                    resp.error_for_status()?.json().await?;
                decode_payload(name, &version.payload.data)
            }
        }
    }
}

fn decode_payload(name: &str, data: &str) -> Result<String, Error> {
    let invalid = || Error::InvalidSecretPayload {
        name: name.to_string(),
    };
    let bytes = BASE64.decode(data).map_err(|_| invalid())?;
    String::from_utf8(bytes).map_err(|_| invalid())
}

/// Fetches the five Google Ads credentials, in order, stopping at the first failure.
pub async fn fetch_credentials(
    provider: &dyn SecretProvider,
    names: &SecretNames,
    scope: &str,
) -> Result<CredentialBundle, Error> {
    // Each slot starts as the secret name and is replaced by its value.
    let mut values = names.in_fetch_order().map(String::from);
    for value in values.iter_mut() {
        let fetched = provider.fetch(value, scope).await?;
        *value = fetched;
    }
    let [developer_token, client_id, client_secret, refresh_token, login_customer_id] = values;

    Ok(CredentialBundle {
        developer_token,
        client_id,
        client_secret,
        refresh_token,
        login_customer_id,
    })
}
