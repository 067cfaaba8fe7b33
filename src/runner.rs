use crate::ads_client::AdsConnector;
use crate::config::Config;
use crate::error::Error;
use crate::query::fetch_campaigns;
use crate::secrets::{fetch_credentials, SecretProvider};
use crate::storage::{write_records, BlobStore};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::time::Instant;

pub const RESPONSE_FILE_NAME: &str = "google_ads_response.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The Google Ads API rejected the credentials or failed the query.
    GoogleAdsApi,
    Unexpected,
}

/// Outcome of one ingestion run, handed back to whoever triggered it.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionResult {
    Success {
        location: String,
        campaigns: usize,
        elapsed_secs: f64,
    },
    Failure {
        category: ErrorCategory,
        message: String,
        elapsed_secs: f64,
    },
}

impl IngestionResult {
    pub fn status_code(&self) -> u16 {
        match self {
            IngestionResult::Success { .. } => 200,
            IngestionResult::Failure { .. } => 500,
        }
    }

    pub fn message(&self) -> String {
        match self {
            IngestionResult::Success { location, .. } => format!("Uploaded to {}", location),
            IngestionResult::Failure { message, .. } => message.clone(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        match self {
            IngestionResult::Success { elapsed_secs, .. }
            | IngestionResult::Failure { elapsed_secs, .. } => *elapsed_secs,
        }
    }
}

/// Object path of a run's output: `{gcs_path}/{YYYY-MM-DD}/google_ads_response.json`.
pub fn destination_path(gcs_path: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}",
        gcs_path.trim_end_matches('/'),
        now.format("%Y-%m-%d"),
        RESPONSE_FILE_NAME
    )
}

fn secs_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}

/// Pulls the campaigns of the login customer and writes them to the raw data bucket.
pub struct Ingestion<'a> {
    config: &'a Config,
    secrets: &'a dyn SecretProvider,
    ads: &'a dyn AdsConnector,
    store: &'a dyn BlobStore,
}

impl<'a> Ingestion<'a> {
    pub fn new(
        config: &'a Config,
        secrets: &'a dyn SecretProvider,
        ads: &'a dyn AdsConnector,
        store: &'a dyn BlobStore,
    ) -> Self {
        Ingestion {
            config,
            secrets,
            ads,
            store,
        }
    }

    /// Runs one ingestion. Never fails: every error ends up in `IngestionResult::Failure`.
    pub async fn run(&self) -> IngestionResult {
        let started = Instant::now();
        info!("[{:.2}s] Starting Google Ads data ingestion", secs_since(started));

        match self.ingest(started).await {
            Ok((location, campaigns)) => {
                let elapsed_secs = secs_since(started);
                info!(
                    "[{:.2}s] Successfully uploaded data to {} in {:.2} seconds",
                    elapsed_secs, location, elapsed_secs
                );
                IngestionResult::Success {
                    location,
                    campaigns,
                    elapsed_secs,
                }
            }
            Err(err) => failure(err, secs_since(started)),
        }
    }

    async fn ingest(&self, started: Instant) -> Result<(String, usize), Error> {
        let source = self.config.google_ads();
        if !source.enabled {
            return Err(Error::SourceDisabled {
                source_name: source.name.to_string(),
            });
        }

        info!("[{:.2}s] Fetching secrets from Secret Manager", secs_since(started));
        let credentials = fetch_credentials(
            self.secrets,
            &self.config.secret_names,
            &self.config.project_id,
        )
        .await?;
        info!(
            "[{:.2}s] Successfully retrieved secrets from Secret Manager",
            secs_since(started)
        );

        info!("[{:.2}s] Initializing Google Ads client", secs_since(started));
        let client = self.ads.connect(&credentials).await?;
        info!(
            "[{:.2}s] Google Ads client initialized successfully",
            secs_since(started)
        );

        info!(
            "[{:.2}s] Fetching campaign data from Google Ads API",
            secs_since(started)
        );
        let campaigns = fetch_campaigns(client.as_ref(), &credentials.login_customer_id)
            .collect_all()
            .await?;
        if campaigns.is_empty() {
            warn!(
                "[{:.2}s] Retrieved 0 campaigns from Google Ads API - this may indicate an issue",
                secs_since(started)
            );
        } else {
            info!(
                "[{:.2}s] Retrieved {} campaigns from Google Ads API",
                secs_since(started),
                campaigns.len()
            );
        }

        info!("[{:.2}s] Saving data to Google Cloud Storage", secs_since(started));
        let path = destination_path(source.gcs_path, Utc::now());
        let location = write_records(
            self.store,
            &campaigns,
            &self.config.raw_data_bucket,
            &path,
        )
        .await?;

        Ok((location, campaigns.len()))
    }
}

fn failure(err: Error, elapsed_secs: f64) -> IngestionResult {
    let (category, message) = if err.is_ads_api() {
        (
            ErrorCategory::GoogleAdsApi,
            format!("Google Ads API error after {:.2}s: {}", elapsed_secs, err),
        )
    } else {
        (
            ErrorCategory::Unexpected,
            format!("Unexpected error after {:.2}s: {}", elapsed_secs, err),
        )
    };

    error!("[{:.2}s] {}", elapsed_secs, message);
    match &err {
        Error::Query {
            request_id, status, ..
        } => {
            error!("[{:.2}s] Request ID: {}", elapsed_secs, request_id);
            error!("[{:.2}s] Error code: {}", elapsed_secs, status);
        }
        Error::Authentication { .. } => {
            error!("[{:.2}s] Request ID: N/A", elapsed_secs);
            error!("[{:.2}s] Error code: AUTHENTICATION", elapsed_secs);
        }
        other => error!("[{:.2}s] Error type: {}", elapsed_secs, other.type_name()),
    }

    IngestionResult::Failure {
        category,
        message,
        elapsed_secs,
    }
}
