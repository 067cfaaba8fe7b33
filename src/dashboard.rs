use crate::auth::AccessTokenSource;
use crate::config::Config;
use crate::error::Error;
use log::{error, info};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_OUTPUT: &str = "dashboard/dashboard_config.json";

const LOOKER_STUDIO_URL: &str = "https://lookerstudio.google.com";

#[derive(Serialize, Debug)]
pub struct DashboardConfig {
    pub project_id: String,
    pub datasets: BTreeMap<&'static str, DatasetTables>,
    pub recommended_queries: BTreeMap<&'static str, String>,
}

#[derive(Serialize, Debug)]
pub struct DatasetTables {
    pub name: String,
    pub tables: Vec<&'static str>,
}

impl DashboardConfig {
    pub fn from_config(config: &Config) -> Self {
        let project = &config.project_id;
        let analytics = &config.analytics_dataset;
        let staging = &config.staging_dataset;

        let datasets = BTreeMap::from([
            (
                "raw",
                DatasetTables {
                    name: config.raw_dataset.clone(),
                    tables: vec!["google_ads_campaigns"],
                },
            ),
            (
                "staging",
                DatasetTables {
                    name: staging.clone(),
                    tables: vec!["stg_google_ads"],
                },
            ),
            (
                "analytics",
                DatasetTables {
                    name: analytics.clone(),
                    tables: vec!["campaign_summary"],
                },
            ),
        ]);

        let recommended_queries = BTreeMap::from([
            (
                "campaign_overview",
                format!(
                    "SELECT
    advertising_channel_type,
    COUNT(DISTINCT campaign_id) as campaign_count,
    SUM(cost) as total_spend,
    AVG(ctr) as avg_ctr,
    AVG(roas) as avg_roas
FROM `{project}.{analytics}.campaign_summary`
GROUP BY advertising_channel_type
ORDER BY total_spend DESC"
                ),
            ),
            (
                "weekly_performance",
                format!(
                    "SELECT
    week_start,
    SUM(total_spend) as weekly_spend,
    SUM(total_impressions) as weekly_impressions,
    SUM(total_clicks) as weekly_clicks,
    AVG(avg_ctr) as avg_ctr
FROM `{project}.{analytics}.campaign_summary`
WHERE week_start >= DATE_SUB(CURRENT_DATE(), INTERVAL 8 WEEK)
GROUP BY week_start
ORDER BY week_start DESC"
                ),
            ),
            (
                "top_campaigns",
                format!(
                    "SELECT
    campaign_name,
    cost,
    impressions,
    clicks,
    ctr,
    roas
FROM `{project}.{staging}.stg_google_ads`
WHERE cost > 0
ORDER BY cost DESC
LIMIT 10"
                ),
            ),
        ]);

        DashboardConfig {
            project_id: project.clone(),
            datasets,
            recommended_queries,
        }
    }
}

/// Lists tables through the BigQuery REST API.
pub struct BigQueryClient {
    client: Client,
    base_url: String,
    tokens: Box<dyn AccessTokenSource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableListEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListEntry {
    table_reference: TableReference,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

impl BigQueryClient {
    pub fn new(client: Client, base_url: &str, tokens: Box<dyn AccessTokenSource>) -> Self {
        BigQueryClient {
            client,
            base_url: base_url.to_string(),
            tokens,
        }
    }

    fn tables_url(&self, project: &str, dataset: &str) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .pop_if_empty()
            .extend(&["bigquery", "v2", "projects", project, "datasets", dataset, "tables"]);
        Ok(url)
    }

    /// Returns the ids of every table in `dataset`, following pagination.
    pub async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<String>, Error> {
        let url = self.tables_url(project, dataset)?;
        let token = self.tokens.access_token().await?;

        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(url.clone()).bearer_auth(&token);
            if let Some(page_token) = &page_token {
                request = request.query(&[("pageToken", page_token)]);
            }

            let page: TableList = request.send().await?.error_for_status()?.json().await?;
            tables.extend(page.tables.into_iter().map(|t| t.table_reference.table_id));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(tables)
    }
}

/// Logs the tables of the raw, staging and analytics datasets. A dataset that cannot be read
/// is logged and skipped; the others are still listed.
///
/// # Returns
/// The table ids of each dataset that could be read, keyed by dataset name
pub async fn list_dataset_tables(
    bigquery: &BigQueryClient,
    config: &Config,
) -> BTreeMap<String, Vec<String>> {
    let mut listed = BTreeMap::new();
    let datasets = [
        &config.raw_dataset,
        &config.staging_dataset,
        &config.analytics_dataset,
    ];

    info!("Available BigQuery tables:");
    for dataset in datasets {
        match bigquery.list_tables(&config.project_id, dataset).await {
            Ok(tables) => {
                info!("{} dataset:", dataset);
                for table in &tables {
                    info!("  - {}", table);
                }
                listed.insert(dataset.clone(), tables);
            }
            Err(err) => error!("Error accessing {}: {}", dataset, err),
        }
    }

    listed
}

/// Writes the dashboard configuration as pretty JSON to `output`, creating parent
/// directories as needed.
pub fn write_dashboard_config(config: &Config, output: &Path) -> Result<(), Error> {
    let dashboard = DashboardConfig::from_config(config);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, serde_json::to_string_pretty(&dashboard)?)?;

    info!("Dashboard configuration saved to {}", output.display());
    Ok(())
}

pub fn log_setup_instructions(config: &Config) {
    info!("Project: {}", config.project_id);
    info!(
        "Datasets: raw={}, staging={}, analytics={}",
        config.raw_dataset, config.staging_dataset, config.analytics_dataset
    );
    info!("Looker Studio setup:");
    info!("  1. Open Looker Studio ({})", LOOKER_STUDIO_URL);
    info!("  2. Click 'Create' > 'Data Source' and pick BigQuery");
    info!(
        "  3. Select project {}, dataset {}, table campaign_summary",
        config.project_id, config.analytics_dataset
    );
    info!("  4. Click 'Connect' and build the dashboard");
    info!("Recommended components: campaign performance table, weekly spend trend, channel performance bar chart, ROAS by campaign scatter plot, key metric scorecards");
}
