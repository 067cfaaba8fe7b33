use clap::{ArgAction, Args as ClapArgs};

const DEFAULT_PROJECT_ID: &str = "practical-brace-466015-b1";
const RAW_DATA_BUCKET: &str = "quench-prod-ga-raw-data-4bcf52b1";
const FUNCTION_LOGS_BUCKET: &str = "quench-prod-ga-function-logs-4bcf52b1";
const RAW_DATASET: &str = "raw";
const STAGING_DATASET: &str = "staging";
const ANALYTICS_DATASET: &str = "analytics";
const GOOGLE_ADS_API_VERSION: &str = "v16";
// Every Monday at 6 AM UTC
const WEEKLY_SCHEDULE: &str = "0 6 * * 1";

const GOOGLE_ADS_URL: &str = "https://googleads.googleapis.com";
const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com";
const STORAGE_URL: &str = "https://storage.googleapis.com";
const METADATA_URL: &str = "http://metadata.google.internal";
const BIGQUERY_URL: &str = "https://bigquery.googleapis.com";

#[derive(ClapArgs, Clone, Debug)]
pub struct Config {
    #[arg(long, default_value = DEFAULT_PROJECT_ID, env = "PROJECT_ID")]
    pub(crate) project_id: String,

    #[arg(long, default_value = RAW_DATA_BUCKET, env = "RAW_DATA_BUCKET")]
    pub(crate) raw_data_bucket: String,

    #[arg(long, default_value = FUNCTION_LOGS_BUCKET, env = "FUNCTION_LOGS_BUCKET")]
    pub(crate) function_logs_bucket: String,

    #[arg(long, default_value = RAW_DATASET, env = "RAW_DATASET")]
    pub(crate) raw_dataset: String,

    #[arg(long, default_value = STAGING_DATASET, env = "STAGING_DATASET")]
    pub(crate) staging_dataset: String,

    #[arg(long, default_value = ANALYTICS_DATASET, env = "ANALYTICS_DATASET")]
    pub(crate) analytics_dataset: String,

    #[arg(long, default_value = GOOGLE_ADS_API_VERSION, env = "GOOGLE_ADS_API_VERSION")]
    pub(crate) google_ads_api_version: String,

    #[command(flatten)]
    pub(crate) secret_names: SecretNames,

    #[command(flatten)]
    pub(crate) sources: SourceSettings,

    #[command(flatten)]
    pub(crate) endpoints: Endpoints,

    /// Write blobs under this directory instead of Cloud Storage
    #[arg(long, env = "LOCAL_BLOB_DIR")]
    pub(crate) local_dir: Option<String>,

    /// Pre-issued access token for Google Cloud APIs; the metadata server is used otherwise
    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    pub(crate) cloud_access_token: Option<String>,
}

/// Names of the Google Ads credentials in Secret Manager.
#[derive(ClapArgs, Clone, Debug)]
pub struct SecretNames {
    #[arg(long, default_value = "GOOGLE_ADS_DEVELOPER_TOKEN", env = "SECRET_DEVELOPER_TOKEN")]
    pub(crate) developer_token: String,

    #[arg(long, default_value = "GOOGLE_ADS_CLIENT_ID", env = "SECRET_CLIENT_ID")]
    pub(crate) client_id: String,

    #[arg(long, default_value = "GOOGLE_ADS_CLIENT_SECRET", env = "SECRET_CLIENT_SECRET")]
    pub(crate) client_secret: String,

    #[arg(long, default_value = "GOOGLE_ADS_REFRESH_TOKEN", env = "SECRET_REFRESH_TOKEN")]
    pub(crate) refresh_token: String,

    #[arg(
        long,
        default_value = "GOOGLE_ADS_LOGIN_CUSTOMER_ID",
        env = "SECRET_LOGIN_CUSTOMER_ID"
    )]
    pub(crate) login_customer_id: String,
}

impl SecretNames {
    /// The secret names in the order they are fetched.
    pub fn in_fetch_order(&self) -> [&str; 5] {
        [
            self.developer_token.as_str(),
            self.client_id.as_str(),
            self.client_secret.as_str(),
            self.refresh_token.as_str(),
            self.login_customer_id.as_str(),
        ]
    }
}

#[derive(ClapArgs, Clone, Debug)]
pub struct SourceSettings {
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "GOOGLE_ADS_ENABLED")]
    pub(crate) google_ads_enabled: bool,

    #[arg(long, default_value = WEEKLY_SCHEDULE, env = "GOOGLE_ADS_SCHEDULE")]
    pub(crate) google_ads_schedule: String,

    #[arg(long, default_value = "google_ads", env = "GOOGLE_ADS_GCS_PATH")]
    pub(crate) google_ads_gcs_path: String,

    #[arg(long, default_value_t = false, action = ArgAction::Set, env = "META_ADS_ENABLED")]
    pub(crate) meta_ads_enabled: bool,

    #[arg(long, default_value = WEEKLY_SCHEDULE, env = "META_ADS_SCHEDULE")]
    pub(crate) meta_ads_schedule: String,

    #[arg(long, default_value = "meta_ads", env = "META_ADS_GCS_PATH")]
    pub(crate) meta_ads_gcs_path: String,

    #[arg(long, default_value_t = false, action = ArgAction::Set, env = "TIKTOK_ADS_ENABLED")]
    pub(crate) tiktok_ads_enabled: bool,

    #[arg(long, default_value = WEEKLY_SCHEDULE, env = "TIKTOK_ADS_SCHEDULE")]
    pub(crate) tiktok_ads_schedule: String,

    #[arg(long, default_value = "tiktok_ads", env = "TIKTOK_ADS_GCS_PATH")]
    pub(crate) tiktok_ads_gcs_path: String,
}

/// Base URLs of the services we talk to. Overridable so tests can point at a mock server.
#[derive(ClapArgs, Clone, Debug)]
pub struct Endpoints {
    #[arg(long, default_value = GOOGLE_ADS_URL, env = "GOOGLE_ADS_URL")]
    pub(crate) google_ads_url: String,

    #[arg(long, default_value = OAUTH_TOKEN_URL, env = "OAUTH_TOKEN_URL")]
    pub(crate) oauth_token_url: String,

    #[arg(long, default_value = SECRET_MANAGER_URL, env = "SECRET_MANAGER_URL")]
    pub(crate) secret_manager_url: String,

    #[arg(long, default_value = STORAGE_URL, env = "STORAGE_URL")]
    pub(crate) storage_url: String,

    #[arg(long, default_value = METADATA_URL, env = "METADATA_URL")]
    pub(crate) metadata_url: String,

    #[arg(long, default_value = BIGQUERY_URL, env = "BIGQUERY_URL")]
    pub(crate) bigquery_url: String,
}

/// One configured ingestion source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSource<'a> {
    pub name: &'static str,
    pub enabled: bool,
    pub schedule: &'a str,
    pub gcs_path: &'a str,
}

impl Config {
    pub fn google_ads(&self) -> DataSource<'_> {
        DataSource {
            name: "google_ads",
            enabled: self.sources.google_ads_enabled,
            schedule: &self.sources.google_ads_schedule,
            gcs_path: &self.sources.google_ads_gcs_path,
        }
    }

    pub fn data_sources(&self) -> Vec<DataSource<'_>> {
        vec![
            self.google_ads(),
            DataSource {
                name: "meta_ads",
                enabled: self.sources.meta_ads_enabled,
                schedule: &self.sources.meta_ads_schedule,
                gcs_path: &self.sources.meta_ads_gcs_path,
            },
            DataSource {
                name: "tiktok_ads",
                enabled: self.sources.tiktok_ads_enabled,
                schedule: &self.sources.tiktok_ads_schedule,
                gcs_path: &self.sources.tiktok_ads_gcs_path,
            },
        ]
    }
}
