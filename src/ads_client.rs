use crate::config::Config;
use crate::error::Error;
use log::{debug, error};
use reqwest::{header::HeaderMap, Client, Response, StatusCode, Url};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Credentials needed to talk to the Google Ads API. Lives for one run only.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    pub developer_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub login_customer_id: String,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("developer_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("login_customer_id", &self.login_customer_id)
            .finish()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AdsConnector: Send + Sync + 'static {
    /// Builds an authenticated Google Ads client from the credential bundle.
    /// # Returns
    /// The client, or `Error::Authentication` when the credentials are rejected.
    async fn connect(&self, credentials: &CredentialBundle) -> Result<Box<dyn AdsApi>, Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AdsApi: Send + Sync + 'static {
    /// Runs one page of a GAQL search.
    /// # Arguments
    /// * `customer_id` - The account to query, with or without dashes.
    /// * `query` - The GAQL query.
    /// * `page_size` - Maximum number of rows in the page.
    /// * `page_token` - Token of the page to fetch, `None` for the first one.
    /// # Returns
    /// The rows of the page and the token of the next page, if any.
    async fn search_page(
        &self,
        customer_id: &str,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<SearchPage, Error>;
}

/// One page of `googleAds:search` results.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub results: Vec<GoogleAdsRow>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAdsRow {
    #[serde(default)]
    pub campaign: CampaignFields,
    #[serde(default)]
    pub campaign_budget: CampaignBudgetFields,
    #[serde(default)]
    pub metrics: MetricsFields,
}

// The API leaves out fields holding their default value, so everything defaults.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CampaignFields {
    #[serde(default, deserialize_with = "int64")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "unspecified")]
    pub status: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default = "unspecified")]
    pub advertising_channel_type: String,
    #[serde(default = "unspecified")]
    pub advertising_channel_sub_type: String,
    #[serde(default = "unspecified")]
    pub bidding_strategy_type: String,
}

impl Default for CampaignFields {
    fn default() -> Self {
        CampaignFields {
            id: 0,
            name: String::new(),
            status: unspecified(),
            start_date: String::new(),
            end_date: String::new(),
            advertising_channel_type: unspecified(),
            advertising_channel_sub_type: unspecified(),
            bidding_strategy_type: unspecified(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CampaignBudgetFields {
    #[serde(default, deserialize_with = "int64")]
    pub amount_micros: i64,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MetricsFields {
    #[serde(default, deserialize_with = "int64")]
    pub impressions: i64,
    #[serde(default, deserialize_with = "int64")]
    pub clicks: i64,
    #[serde(default, deserialize_with = "int64")]
    pub cost_micros: i64,
    #[serde(default)]
    pub conversions: f64,
    #[serde(default)]
    pub conversions_value: f64,
}

fn unspecified() -> String {
    "UNSPECIFIED".to_string()
}

/// int64 values come back as JSON strings; accept plain numbers as well.
fn int64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ApiErrorBody,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<GoogleAdsFailure>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GoogleAdsFailure {
    #[serde(default)]
    errors: Vec<GoogleAdsErrorDetail>,
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct GoogleAdsErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Default)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Connects to the Google Ads REST API using an OAuth refresh token.
#[derive(Clone)]
pub struct GoogleAdsConnector {
    client: Client,
    base_url: String,
    token_url: String,
    api_version: String,
}

impl GoogleAdsConnector {
    pub fn new(client: Client, config: &Config) -> Self {
        GoogleAdsConnector {
            client,
            base_url: config.endpoints.google_ads_url.to_string(),
            token_url: config.endpoints.oauth_token_url.to_string(),
            api_version: config.google_ads_api_version.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AdsConnector for GoogleAdsConnector {
    async fn connect(&self, credentials: &CredentialBundle) -> Result<Box<dyn AdsApi>, Error> {
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status.is_client_error() {
            let body = resp.json::<TokenError>().await.unwrap_or_default();
            let message = match (body.error.is_empty(), body.error_description.is_empty()) {
                (true, _) => status.to_string(),
                (false, true) => body.error,
                (false, false) => format!("{}: {}", body.error, body.error_description),
            };
            return Err(Error::Authentication { message });
        }

        let token = resp.error_for_status()?.json::<TokenResponse>().await?;

        Ok(Box::new(GoogleAdsClient {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_version: self.api_version.clone(),
            access_token: token.access_token,
            developer_token: credentials.developer_token.clone(),
            login_customer_id: normalize_customer_id(&credentials.login_customer_id),
        }))
    }
}

pub struct GoogleAdsClient {
    client: Client,
    base_url: String,
    api_version: String,
    access_token: String,
    developer_token: String,
    login_customer_id: String,
}

impl GoogleAdsClient {
    fn search_url(&self, customer_id: &str) -> Result<Url, Error> {
        let customer = normalize_customer_id(customer_id);
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .pop_if_empty()
            .extend(&[
                self.api_version.as_str(),
                "customers",
                customer.as_str(),
                "googleAds:search",
            ]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl AdsApi for GoogleAdsClient {
    async fn search_page(
        &self,
        customer_id: &str,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<SearchPage, Error> {
        let url = self.search_url(customer_id)?;
        debug!("Searching {} (page token: {:?})", url, page_token);

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .header("developer-token", &self.developer_token)
            .header("login-customer-id", &self.login_customer_id)
            .json(&SearchRequest {
                query,
                page_size,
                page_token,
            })
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(resp.json::<SearchPage>().await?),
            _ => Err(query_error(resp).await),
        }
    }
}

/// Turns a failed search response into `Error::Query`.
async fn query_error(resp: Response) -> Error {
    let status = resp.status();
    let header_request_id = request_id_header(resp.headers());
    let envelope = resp.json::<ErrorEnvelope>().await.unwrap_or_default();
    let body = envelope.error;

    let failure = body.details.iter().find(|d| d.request_id.is_some());
    let request_id = failure
        .and_then(|d| d.request_id.clone())
        .or(header_request_id)
        .unwrap_or_else(|| "N/A".to_string());
    let message = failure
        .and_then(|d| d.errors.first())
        .map(|e| e.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or(body.message);
    let status = if body.status.is_empty() {
        status.as_u16().to_string()
    } else {
        body.status
    };

    error!(
        "Request with ID '{}' failed with status {}",
        request_id, status
    );
    error!("Error message: {}", message);

    Error::Query {
        request_id,
        status,
        message,
    }
}

fn request_id_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `123-456-7890` and `1234567890` name the same customer; the API wants the latter.
pub fn normalize_customer_id(customer_id: &str) -> String {
    customer_id
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .collect()
}
