// =====================================================
// STORAGE SYNC
// Bucket copy between two projects over the Storage API
// =====================================================

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::VecDeque;
use thiserror::Error;

const LIST_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage configuration: {message}")]
    Config { message: String },

    #[error("bucket '{bucket}' does not exist on the source (available: {})", .available.join(", "))]
    BucketNotFound { bucket: String, available: Vec<String> },

    #[error("bucket operation failed: {message}")]
    Bucket { message: String },

    #[error("listing objects under '{prefix}' failed: {message}")]
    List { prefix: String, message: String },

    #[error("transport error: {message}")]
    Transport { message: String },
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Service-role key; object listing and bucket creation are blocked for
    /// anon keys.
    pub api_key: String,
}

/// Outcome of one bucket copy. Per-file failures are tallied here instead of
/// aborting the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub files_found: usize,
    pub copied: usize,
    pub failed: usize,
    pub failures: Vec<String>,
}

impl SyncReport {
    fn record_copied(&mut self) {
        self.copied += 1;
    }

    fn record_failure(&mut self, path: &str, message: &str) {
        self.failed += 1;
        self.failures.push(format!("{}: {}", path, message));
    }
}

pub struct StorageSync {
    source: StorageClient,
    target: StorageClient,
}

impl StorageSync {
    pub fn new(source: StorageConfig, target: StorageConfig) -> Result<Self, StorageError> {
        Ok(StorageSync {
            source: StorageClient::new(source)?,
            target: StorageClient::new(target)?,
        })
    }

    /// Copies every object of `bucket` from the source project to the target
    /// project. The bucket must exist on the source; on the target it is
    /// created with the source bucket's settings when missing. Individual
    /// objects that fail to transfer are recorded in the report and skipped.
    pub async fn sync_bucket(&self, bucket: &str) -> Result<SyncReport, StorageError> {
        let settings = self.source.find_bucket(bucket).await?;
        self.target.ensure_bucket(bucket, &settings).await?;

        let objects = self.source.list_all_objects(bucket).await?;
        log::info!("found {} objects in bucket {}", objects.len(), bucket);

        let mut report = SyncReport {
            files_found: objects.len(),
            ..SyncReport::default()
        };
        for object in &objects {
            match self.copy_object(bucket, object).await {
                Ok(()) => report.record_copied(),
                Err(message) => {
                    log::warn!("failed to copy {}: {}", object.path, message);
                    report.record_failure(&object.path, &message);
                }
            }
        }
        Ok(report)
    }

    async fn copy_object(&self, bucket: &str, object: &StoredObject) -> Result<(), String> {
        let data = self.source.download(bucket, &object.path).await?;
        self.target
            .upload(bucket, &object.path, data, object.mime_type.as_deref())
            .await
    }
}

struct StorageClient {
    client: reqwest::Client,
    base_url: String,
}

impl StorageClient {
    fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let base_url = config.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(StorageError::Config {
                message: "project url is empty".to_string(),
            });
        }
        reqwest::Url::parse(&base_url).map_err(|err| StorageError::Config {
            message: format!("invalid project url: {}", err),
        })?;
        if config.api_key.is_empty() {
            return Err(StorageError::Config {
                message: "api key is empty".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&config.api_key).map_err(|_| StorageError::Config {
            message: "api key contains invalid header characters".to_string(),
        })?;
        headers.insert("apikey", api_key);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(|_| {
            StorageError::Config {
                message: "api key contains invalid header characters".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| StorageError::Config {
                message: format!("failed to build http client: {}", err),
            })?;

        Ok(StorageClient { client, base_url })
    }

    fn bucket_url(&self) -> String {
        format!("{}/storage/v1/bucket", self.base_url)
    }

    fn object_list_url(&self, bucket: &str) -> String {
        format!("{}/storage/v1/object/list/{}", self.base_url, bucket)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path)
    }

    /// Returns the bucket's settings object from the bucket listing.
    async fn find_bucket(&self, bucket: &str) -> Result<Value, StorageError> {
        let response = self
            .client
            .get(self.bucket_url())
            .send()
            .await
            .map_err(|err| StorageError::Transport {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Bucket {
                message: format!("listing buckets failed: {}", failure_message(status, &body)),
            });
        }

        let buckets: Vec<Value> = response.json().await.map_err(|err| StorageError::Bucket {
            message: format!("invalid bucket listing: {}", err),
        })?;

        match buckets
            .iter()
            .find(|entry| entry.get("name").and_then(Value::as_str) == Some(bucket))
        {
            Some(found) => Ok(found.clone()),
            None => Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
                available: buckets
                    .iter()
                    .filter_map(|entry| entry.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect(),
            }),
        }
    }

    /// Creates the bucket with the source bucket's settings. A bucket that is
    /// already present is fine.
    async fn ensure_bucket(&self, bucket: &str, settings: &Value) -> Result<(), StorageError> {
        let body = json!({
            "id": bucket,
            "name": bucket,
            "public": settings.get("public").and_then(Value::as_bool).unwrap_or(false),
            "file_size_limit": settings.get("file_size_limit").cloned().unwrap_or(Value::Null),
            "allowed_mime_types": settings.get("allowed_mime_types").cloned().unwrap_or(Value::Null),
        });

        let response = self
            .client
            .post(self.bucket_url())
            .json(&body)
            .send()
            .await
            .map_err(|err| StorageError::Transport {
                message: err.to_string(),
            })?;

        if response.status().is_success() {
            log::info!("created bucket {} on the target", bucket);
            return Ok(());
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if text.contains("already exists") {
            log::info!("bucket {} already exists on the target", bucket);
            return Ok(());
        }
        Err(StorageError::Bucket {
            message: format!(
                "creating bucket '{}' failed: {}",
                bucket,
                failure_message(status, &text)
            ),
        })
    }

    /// Walks the bucket breadth-first. The list endpoint only returns one
    /// directory level, with folders showing up as entries whose `id` is
    /// null, so discovered folder prefixes go onto a worklist.
    async fn list_all_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, StorageError> {
        let mut objects = Vec::new();
        let mut prefixes = VecDeque::from([String::new()]);

        while let Some(prefix) = prefixes.pop_front() {
            for entry in self.list_prefix(bucket, &prefix).await? {
                let name = match entry.get("name").and_then(Value::as_str) {
                    Some(name) if !name.is_empty() => name,
                    _ => continue,
                };
                let path = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", prefix, name)
                };
                if is_folder_entry(&entry) {
                    prefixes.push_back(path);
                } else {
                    objects.push(StoredObject {
                        path,
                        mime_type: entry_mime_type(&entry),
                    });
                }
            }
        }

        Ok(objects)
    }

    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<Value>, StorageError> {
        let mut entries = Vec::new();
        let mut offset = 0usize;

        loop {
            let body = json!({
                "prefix": prefix,
                "limit": LIST_PAGE_LIMIT,
                "offset": offset,
                "sortBy": { "column": "name", "order": "asc" },
            });
            let response = self
                .client
                .post(self.object_list_url(bucket))
                .json(&body)
                .send()
                .await
                .map_err(|err| StorageError::Transport {
                    message: err.to_string(),
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(StorageError::List {
                    prefix: prefix.to_string(),
                    message: failure_message(status, &text),
                });
            }

            let page: Vec<Value> = response.json().await.map_err(|err| StorageError::List {
                prefix: prefix.to_string(),
                message: format!("invalid listing body: {}", err),
            })?;

            let page_len = page.len();
            entries.extend(page);
            if page_len < LIST_PAGE_LIMIT {
                break;
            }
            offset += page_len;
        }

        Ok(entries)
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(self.object_url(bucket, path))
            .send()
            .await
            .map_err(|err| format!("download failed: {}", err))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!(
                "download failed: {}",
                failure_message(status, &text)
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| format!("download failed: {}", err))?;
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        mime_type: Option<&str>,
    ) -> Result<(), String> {
        let mut request = self
            .client
            .post(self.object_url(bucket, path))
            .header("x-upsert", "true")
            .header(CACHE_CONTROL, "max-age=3600");
        if let Some(mime) = mime_type {
            request = request.header(CONTENT_TYPE, mime);
        }

        let response = request
            .body(data)
            .send()
            .await
            .map_err(|err| format!("upload failed: {}", err))?;

        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(format!("upload failed: {}", failure_message(status, &text)))
    }
}

struct StoredObject {
    path: String,
    mime_type: Option<String>,
}

/// The list endpoint models a folder as an entry with an explicit null `id`.
fn is_folder_entry(entry: &Value) -> bool {
    matches!(entry.get("id"), Some(Value::Null))
}

fn entry_mime_type(entry: &Value) -> Option<String> {
    entry
        .get("metadata")
        .and_then(|metadata| metadata.get("mimetype"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn failure_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string));
    match message {
        Some(message) if !message.is_empty() => message,
        _ => format!("HTTP {}: {}", status.as_u16(), body.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, key: &str) -> StorageConfig {
        StorageConfig {
            url: url.to_string(),
            api_key: key.to_string(),
        }
    }

    #[test]
    fn constructor_validates_both_projects() {
        assert!(StorageSync::new(
            config("https://abc.supabase.co", "key-a"),
            config("https://def.supabase.co", "key-b"),
        )
        .is_ok());
        assert!(StorageSync::new(
            config("", "key-a"),
            config("https://def.supabase.co", "key-b"),
        )
        .is_err());
        assert!(StorageSync::new(
            config("https://abc.supabase.co", "key-a"),
            config("https://def.supabase.co", ""),
        )
        .is_err());
        assert!(StorageSync::new(
            config("not a url", "key-a"),
            config("https://def.supabase.co", "key-b"),
        )
        .is_err());
    }

    #[test]
    fn folder_entries_have_explicit_null_ids() {
        assert!(is_folder_entry(&json!({ "name": "avatars", "id": null })));
        assert!(!is_folder_entry(&json!({
            "name": "logo.png",
            "id": "d4f0-11ee",
            "metadata": { "mimetype": "image/png" }
        })));
        // No id key at all still counts as a file.
        assert!(!is_folder_entry(&json!({ "name": "odd.bin" })));
    }

    #[test]
    fn mime_type_comes_from_listing_metadata() {
        let entry = json!({
            "name": "logo.png",
            "id": "d4f0-11ee",
            "metadata": { "mimetype": "image/png", "size": 1024 }
        });
        assert_eq!(entry_mime_type(&entry), Some("image/png".to_string()));
        assert_eq!(entry_mime_type(&json!({ "name": "bare" })), None);
        assert_eq!(
            entry_mime_type(&json!({ "name": "bare", "metadata": null })),
            None
        );
    }

    #[test]
    fn report_tallies_stay_consistent() {
        let mut report = SyncReport {
            files_found: 3,
            ..SyncReport::default()
        };
        report.record_copied();
        report.record_copied();
        report.record_failure("posts/1.png", "upload failed: boom");

        assert_eq!(report.copied, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures, vec!["posts/1.png: upload failed: boom"]);
        assert_eq!(report.copied + report.failed, report.files_found);
    }

    #[test]
    fn failure_messages_prefer_the_api_message() {
        let message = failure_message(
            StatusCode::NOT_FOUND,
            r#"{"statusCode":"404","error":"Not Found","message":"Bucket not found"}"#,
        );
        assert_eq!(message, "Bucket not found");

        let fallback = failure_message(StatusCode::BAD_GATEWAY, "upstream connect error");
        assert_eq!(fallback, "HTTP 502: upstream connect error");
    }

    #[test]
    fn missing_bucket_error_lists_what_exists() {
        let err = StorageError::BucketNotFound {
            bucket: "images".to_string(),
            available: vec!["avatars".to_string(), "docs".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "bucket 'images' does not exist on the source (available: avatars, docs)"
        );
    }
}
