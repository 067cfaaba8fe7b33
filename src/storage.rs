use crate::auth::AccessTokenSource;
use crate::error::Error;
use crate::query::CampaignRecord;
use log::info;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use std::io::Write;
use std::path::PathBuf;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Stores `bytes` as a single object, replacing any object already at `path`.
    /// # Returns
    /// The location of the stored object, or `Error::StorageWrite`.
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, Error>;
}

/// Uploads objects through the Cloud Storage JSON API.
pub struct GcsBlobStore {
    client: Client,
    base_url: String,
    tokens: Box<dyn AccessTokenSource>,
}

impl GcsBlobStore {
    pub fn new(client: Client, base_url: &str, tokens: Box<dyn AccessTokenSource>) -> Self {
        GcsBlobStore {
            client,
            base_url: base_url.to_string(),
            tokens,
        }
    }

    fn upload_url(&self, bucket: &str, path: &str) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .pop_if_empty()
            .extend(&["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", path);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, Error> {
        let location = format!("gs://{}/{}", bucket, path);
        let storage_error = |message: String| Error::StorageWrite {
            location: location.clone(),
            message,
        };

        let url = self
            .upload_url(bucket, path)
            .map_err(|e| storage_error(e.to_string()))?;
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| storage_error(e.to_string()))?;

        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| storage_error(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(storage_error(format!("{}: {}", status, body.trim())));
        }

        Ok(location)
    }
}

/// Keeps objects under a local directory as `{root}/{bucket}/{path}`.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalBlobStore { root: root.into() }
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, Error> {
        let target = self.root.join(bucket).join(path);
        let location = target.display().to_string();
        let dir = target
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.root.clone());

        let written = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            // Written next to the target, then renamed over it.
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await;

        match written {
            Ok(Ok(())) => Ok(location),
            Ok(Err(e)) => Err(Error::StorageWrite {
                location,
                message: e.to_string(),
            }),
            Err(e) => Err(Error::StorageWrite {
                location,
                message: e.to_string(),
            }),
        }
    }
}

/// Serializes the campaigns as one pretty-printed JSON array and stores it.
///
/// # Arguments
/// * `store` - Where the object goes
/// * `records` - The campaigns, written in order
/// * `bucket` - Target bucket
/// * `path` - Object path inside the bucket
///
/// # Returns
/// The object's location
pub async fn write_records(
    store: &dyn BlobStore,
    records: &[CampaignRecord],
    bucket: &str,
    path: &str,
) -> Result<String, Error> {
    let payload = serde_json::to_vec_pretty(records)?;
    let size = payload.len();

    let location = store.put(bucket, path, payload, JSON_CONTENT_TYPE).await?;
    info!("Wrote {} campaigns ({} bytes) to {}", records.len(), size, location);

    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MetadataTokenSource, StaticTokenSource};
    use crate::query::tests::row;
    use chrono::Utc;
    use mockall::predicate::{always, eq};
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn records(costs: &[i64]) -> Vec<CampaignRecord> {
        costs
            .iter()
            .enumerate()
            .map(|(i, cost)| CampaignRecord::from_row(row(i as i64 + 1, *cost), Utc::now()))
            .collect()
    }

    #[tokio::test]
    async fn test_write_records_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());
        let written = records(&[1_000_000, 2_000_000, 0]);

        let location = write_records(
            &store,
            &written,
            "raw-bucket",
            "google_ads/2024-03-04/google_ads_response.json",
        )
        .await
        .unwrap();

        let text = std::fs::read_to_string(&location).unwrap();
        assert!(text.starts_with("[\n  {\n    \"campaign_id\": 1,"));

        let read_back: Vec<CampaignRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(read_back, written);

        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        let costs: Vec<i64> = raw
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["cost_micros"].as_i64().unwrap())
            .collect();
        assert_eq!(costs, vec![1_000_000, 2_000_000, 0]);
    }

    #[tokio::test]
    async fn test_local_store_overwrites_existing_object() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        store
            .put("b", "a/object.json", b"first".to_vec(), JSON_CONTENT_TYPE)
            .await
            .unwrap();
        let location = store
            .put("b", "a/object.json", b"second".to_vec(), JSON_CONTENT_TYPE)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(location).unwrap(), "second");
        let entries = std::fs::read_dir(temp_dir.path().join("b").join("a"))
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_write_empty_collection() {
        let mut store = MockBlobStore::new();
        store
            .expect_put()
            .with(eq("bucket"), eq("path.json"), eq(b"[]".to_vec()), eq(JSON_CONTENT_TYPE))
            .times(1)
            .returning(|bucket, path, _, _| Ok(format!("gs://{}/{}", bucket, path)));

        let location = write_records(&store, &[], "bucket", "path.json")
            .await
            .unwrap();
        assert_eq!(location, "gs://bucket/path.json");
    }

    #[tokio::test]
    async fn test_gcs_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/raw-bucket/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "google_ads/2024-03-04/google_ads_response.json"))
            .and(header("authorization", "Bearer token"))
            .and(header("content-type", JSON_CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "kind": "storage#object",
                "name": "google_ads/2024-03-04/google_ads_response.json"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = GcsBlobStore::new(
            Client::new(),
            &server.uri(),
            Box::new(StaticTokenSource::new("token")),
        );
        let location = store
            .put(
                "raw-bucket",
                "google_ads/2024-03-04/google_ads_response.json",
                b"[]".to_vec(),
                JSON_CONTENT_TYPE,
            )
            .await
            .unwrap();
        assert_eq!(
            location,
            "gs://raw-bucket/google_ads/2024-03-04/google_ads_response.json"
        );
    }

    #[tokio::test]
    async fn test_gcs_upload_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Access denied."))
            .mount(&server)
            .await;

        let store = GcsBlobStore::new(
            Client::new(),
            &server.uri(),
            Box::new(StaticTokenSource::new("token")),
        );
        let result = store
            .put("raw-bucket", "x.json", b"[]".to_vec(), JSON_CONTENT_TYPE)
            .await;

        match result {
            Err(Error::StorageWrite { location, message }) => {
                assert_eq!(location, "gs://raw-bucket/x.json");
                assert!(message.contains("403"));
                assert!(message.contains("Access denied."));
            }
            _ => panic!("Expected StorageWrite error"),
        }
    }

    #[tokio::test]
    async fn test_gcs_token_failure_is_a_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/instance/service-accounts/default/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let uri = server.uri();
        let store = GcsBlobStore::new(
            Client::new(),
            uri.as_str(),
            Box::new(MetadataTokenSource::new(Client::new(), uri.as_str())),
        );
        let result = store
            .put("raw-bucket", "x.json", b"[]".to_vec(), JSON_CONTENT_TYPE)
            .await;

        match result {
            Err(Error::StorageWrite { location, message }) => {
                assert_eq!(location, "gs://raw-bucket/x.json");
                assert!(message.contains("503"));
            }
            other => panic!("Expected StorageWrite error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_local_store_reports_unwritable_root() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = LocalBlobStore::new(&blocker);

        let result = store
            .put("b", "object.json", b"[]".to_vec(), JSON_CONTENT_TYPE)
            .await;

        match result {
            Err(Error::StorageWrite { location, .. }) => {
                assert!(location.ends_with("object.json"));
            }
            other => panic!("Expected StorageWrite error, got {:?}", other),
        }
        assert!(std::fs::metadata(&blocker).unwrap().is_file());
    }

    #[tokio::test]
    async fn test_write_records_propagates_store_failure() {
        let mut store = MockBlobStore::new();
        store
            .expect_put()
            .with(always(), always(), always(), always())
            .returning(|bucket, path, _, _| {
                Err(Error::StorageWrite {
                    location: format!("gs://{}/{}", bucket, path),
                    message: "connection reset".to_string(),
                })
            });

        let result = write_records(&store, &records(&[5]), "bucket", "p.json").await;
        assert!(matches!(result.unwrap_err(), Error::StorageWrite { .. }));
    }
}
