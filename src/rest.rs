// =====================================================
// POSTGREST SOURCE
// Data access through a hosted Supabase-style REST API
// =====================================================

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RANGE};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};

use crate::source::{normalize_table_list, SourceError, TableSource};
use crate::types::RowRecord;

#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Service-role key. Row level security applies to anon keys, which makes
    /// backups silently incomplete.
    pub api_key: String,
    /// Postgres schema exposed through PostgREST; `None` means the server
    /// default (`public`).
    pub schema: Option<String>,
}

#[derive(Debug)]
pub struct RestSource {
    client: reqwest::Client,
    base_url: String,
    schema: Option<String>,
}

impl RestSource {
    pub fn new(config: RestConfig) -> Result<Self, SourceError> {
        let base_url = config.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SourceError::Config {
                message: "project url is empty".to_string(),
            });
        }
        reqwest::Url::parse(&base_url).map_err(|err| SourceError::Config {
            message: format!("invalid project url: {}", err),
        })?;
        if config.api_key.is_empty() {
            return Err(SourceError::Config {
                message: "api key is empty".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&config.api_key).map_err(|_| SourceError::Config {
            message: "api key contains invalid header characters".to_string(),
        })?;
        headers.insert("apikey", api_key);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(|_| {
            SourceError::Config {
                message: "api key contains invalid header characters".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| SourceError::Config {
                message: format!("failed to build http client: {}", err),
            })?;

        Ok(RestSource {
            client,
            base_url,
            schema: config.schema,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn rpc_url(&self, name: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, name)
    }

    /// Schema selection for reads goes through `Accept-Profile`, for RPC
    /// calls through `Content-Profile`.
    fn read_request(&self, url: String) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.schema {
            Some(schema) => request.header("Accept-Profile", schema),
            None => request,
        }
    }

    fn rpc_request(&self, name: &str, body: Value) -> RequestBuilder {
        let request = self.client.post(self.rpc_url(name)).json(&body);
        match &self.schema {
            Some(schema) => request.header("Content-Profile", schema),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl TableSource for RestSource {
    async fn list_tables(&self) -> Result<Vec<String>, SourceError> {
        let response = self
            .rpc_request("get_all_tables", json!({}))
            .send()
            .await
            .map_err(|err| SourceError::Transport { message: err.to_string() })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Rpc {
                name: "get_all_tables".to_string(),
                message: failure_message(status, &body),
            });
        }

        let value: Value = response.json().await.map_err(|err| SourceError::Rpc {
            name: "get_all_tables".to_string(),
            message: format!("invalid response body: {}", err),
        })?;
        Ok(normalize_table_list(&value))
    }

    async fn table_exists(&self, table: &str) -> Result<bool, SourceError> {
        let url = format!("{}?select=*&limit=0", self.table_url(table));
        let response = self
            .read_request(url)
            .send()
            .await
            .map_err(|err| SourceError::Transport { message: err.to_string() })?;

        if response.status().is_success() {
            return Ok(true);
        }

        // A reported error still means the table exists unless it is the
        // missing-table class.
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok(!classify_table_failure(table, status, &body).is_missing_table())
    }

    async fn fetch_rows(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RowRecord>, SourceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}?select=*", self.table_url(table));
        let range = format!("{}-{}", offset, offset + limit - 1);
        let response = self
            .read_request(url)
            .header(RANGE, range)
            .send()
            .await
            .map_err(|err| SourceError::Transport { message: err.to_string() })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_table_failure(table, status, &body));
        }

        response.json::<Vec<RowRecord>>().await.map_err(|err| SourceError::Query {
            message: format!("invalid response body: {}", err),
        })
    }

    async fn get_table_ddl(&self, table: &str) -> Result<String, SourceError> {
        let response = self
            .rpc_request("get_table_ddl", json!({ "table_name": table }))
            .send()
            .await
            .map_err(|err| SourceError::Transport { message: err.to_string() })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Rpc {
                name: "get_table_ddl".to_string(),
                message: failure_message(status, &body),
            });
        }

        let value: Value = response.json().await.map_err(|err| SourceError::Rpc {
            name: "get_table_ddl".to_string(),
            message: format!("invalid response body: {}", err),
        })?;
        Ok(match value {
            Value::String(ddl) => ddl,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

// --- Error Payload Classification ---

/// PostgREST failure payloads are `{ "code": …, "message": …, … }`. The
/// missing-table class is the PostgREST code `PGRST116`, the Postgres code
/// `42P01`, or a "does not exist" message.
fn classify_table_failure(table: &str, status: StatusCode, body: &str) -> SourceError {
    if let Some((code, message)) = parse_error_payload(body) {
        if code == "PGRST116" || code == "42P01" || message.contains("does not exist") {
            return SourceError::MissingTable { table: table.to_string() };
        }
        if !message.is_empty() {
            return SourceError::Query { message };
        }
    }
    SourceError::Query {
        message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
    }
}

fn failure_message(status: StatusCode, body: &str) -> String {
    match parse_error_payload(body) {
        Some((_, message)) if !message.is_empty() => message,
        _ => format!("HTTP {}: {}", status.as_u16(), body.trim()),
    }
}

fn parse_error_payload(body: &str) -> Option<(String, String)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let code = value
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((code, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, key: &str) -> RestConfig {
        RestConfig {
            url: url.to_string(),
            api_key: key.to_string(),
            schema: None,
        }
    }

    #[test]
    fn constructor_validates_inputs() {
        assert!(RestSource::new(config("https://abc.supabase.co", "key")).is_ok());
        assert!(RestSource::new(config("https://abc.supabase.co/", "key")).is_ok());

        let err = RestSource::new(config("", "key")).unwrap_err();
        assert!(matches!(err, SourceError::Config { .. }));
        let err = RestSource::new(config("not a url", "key")).unwrap_err();
        assert!(matches!(err, SourceError::Config { .. }));
        let err = RestSource::new(config("https://abc.supabase.co", "")).unwrap_err();
        assert!(matches!(err, SourceError::Config { .. }));
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let source = RestSource::new(config("https://abc.supabase.co/", "key")).unwrap();
        assert_eq!(source.table_url("posts"), "https://abc.supabase.co/rest/v1/posts");
        assert_eq!(
            source.rpc_url("get_all_tables"),
            "https://abc.supabase.co/rest/v1/rpc/get_all_tables"
        );
    }

    #[test]
    fn missing_table_codes_classify_as_missing() {
        let body = r#"{"code":"42P01","message":"relation \"public.ghost\" does not exist"}"#;
        let err = classify_table_failure("ghost", StatusCode::NOT_FOUND, body);
        assert!(err.is_missing_table());

        let body = r#"{"code":"PGRST116","message":"not found"}"#;
        let err = classify_table_failure("ghost", StatusCode::NOT_FOUND, body);
        assert!(err.is_missing_table());

        let body = r#"{"code":"","message":"table ghost does not exist"}"#;
        let err = classify_table_failure("ghost", StatusCode::BAD_REQUEST, body);
        assert!(err.is_missing_table());
    }

    #[test]
    fn other_codes_classify_as_query_errors() {
        let body = r#"{"code":"42501","message":"permission denied for table posts"}"#;
        let err = classify_table_failure("posts", StatusCode::FORBIDDEN, body);
        assert!(!err.is_missing_table());
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn unparseable_body_falls_back_to_status() {
        let err = classify_table_failure("posts", StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert!(!err.is_missing_table());
        assert!(err.to_string().contains("HTTP 502"));

        assert_eq!(
            failure_message(StatusCode::NOT_FOUND, "gone"),
            "HTTP 404: gone"
        );
    }
}
