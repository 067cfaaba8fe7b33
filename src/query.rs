use crate::ads_client::{AdsApi, GoogleAdsRow};
use crate::error::Error;
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const CAMPAIGN_QUERY: &str = "
    SELECT
        campaign.id,
        campaign.name,
        campaign.status,
        campaign.start_date,
        campaign.end_date,
        campaign.advertising_channel_type,
        campaign.advertising_channel_sub_type,
        campaign.bidding_strategy_type,
        campaign_budget.amount_micros,
        metrics.impressions,
        metrics.clicks,
        metrics.cost_micros,
        metrics.conversions,
        metrics.conversions_value
    FROM campaign
    WHERE campaign.status != 'REMOVED'
    ORDER BY campaign.id
";

pub const PAGE_SIZE: u32 = 1000;

/// One campaign as written to the raw data bucket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CampaignRecord {
    pub campaign_id: i64,
    pub campaign_name: String,
    pub status: String,
    pub start_date: String,
    pub end_date: String,
    pub advertising_channel_type: String,
    pub advertising_channel_sub_type: String,
    pub bidding_strategy_type: String,
    pub budget_amount_micros: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub cost_micros: i64,
    pub conversions: f64,
    pub conversions_value: f64,
    pub ingestion_timestamp: DateTime<Utc>,
}

impl CampaignRecord {
    pub fn from_row(row: GoogleAdsRow, ingested_at: DateTime<Utc>) -> Self {
        let GoogleAdsRow {
            campaign,
            campaign_budget,
            metrics,
        } = row;

        CampaignRecord {
            campaign_id: campaign.id,
            campaign_name: campaign.name,
            status: campaign.status,
            start_date: campaign.start_date,
            end_date: campaign.end_date,
            advertising_channel_type: campaign.advertising_channel_type,
            advertising_channel_sub_type: campaign.advertising_channel_sub_type,
            bidding_strategy_type: campaign.bidding_strategy_type,
            budget_amount_micros: campaign_budget.amount_micros,
            impressions: metrics.impressions,
            clicks: metrics.clicks,
            cost_micros: metrics.cost_micros,
            conversions: metrics.conversions,
            conversions_value: metrics.conversions_value,
            ingestion_timestamp: ingested_at,
        }
    }
}

enum Cursor {
    Start,
    Next(String),
    Exhausted,
}

/// Lazily pages through the campaign query.
///
/// The stream walks the page token chain exactly once. After the last page, or after a
/// failed page, it yields nothing more; run [`fetch_campaigns`] again to re-issue the query.
pub struct CampaignStream<'a> {
    api: &'a dyn AdsApi,
    customer_id: String,
    cursor: Cursor,
    buffer: VecDeque<GoogleAdsRow>,
    pages: usize,
}

impl CampaignStream<'_> {
    /// Returns the next campaign, `Ok(None)` once the result set is exhausted.
    pub async fn next(&mut self) -> Result<Option<CampaignRecord>, Error> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(CampaignRecord::from_row(row, Utc::now())));
            }

            let page_token = match std::mem::replace(&mut self.cursor, Cursor::Exhausted) {
                Cursor::Exhausted => return Ok(None),
                Cursor::Start => None,
                Cursor::Next(token) => Some(token),
            };

            let page = self
                .api
                .search_page(&self.customer_id, CAMPAIGN_QUERY, PAGE_SIZE, page_token)
                .await?;
            self.pages += 1;
            debug!(
                "Fetched page {} with {} rows",
                self.pages,
                page.results.len()
            );

            self.cursor = match page.next_page_token {
                Some(token) if !token.is_empty() => Cursor::Next(token),
                _ => Cursor::Exhausted,
            };
            self.buffer.extend(page.results);
        }
    }

    /// Drains the stream. When a page fails, the records read so far are dropped and the
    /// error is returned; a partial result set is never handed out.
    pub async fn collect_all(mut self) -> Result<Vec<CampaignRecord>, Error> {
        let mut campaigns = Vec::new();
        loop {
            match self.next().await {
                Ok(Some(campaign)) => campaigns.push(campaign),
                Ok(None) => return Ok(campaigns),
                Err(err) => {
                    if !campaigns.is_empty() {
                        error!(
                            "Discarding {} campaigns read before the failure",
                            campaigns.len()
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Starts the campaign query for `customer_id`. Nothing is requested until the stream is
/// polled.
pub fn fetch_campaigns<'a>(api: &'a dyn AdsApi, customer_id: &str) -> CampaignStream<'a> {
    CampaignStream {
        api,
        customer_id: customer_id.to_string(),
        cursor: Cursor::Start,
        buffer: VecDeque::new(),
        pages: 0,
    }
}
