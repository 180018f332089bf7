//! REST access to the hosted table API.

use crate::config::{SessionConfig, StoreConfig};
use crate::error::{GatewayError, GatewayResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskboard_core::EntityId;
use tracing::debug;

const PREFER_REPRESENTATION: &str = "return=representation";
const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";

/// Error code the store uses for row-level security violations.
const RLS_VIOLATION: &str = "42501";

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestClient {
    pub fn new(config: &StoreConfig, session: &SessionConfig) -> GatewayResult<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        let auth_header = build_auth_headers(&config.api_key, &session.access_token)?;
        Ok(Self {
            client,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    /// All visible rows of `table`, ascending by position.
    pub async fn select<T>(&self, table: &str) -> GatewayResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        debug!(table, "select");
        let response = self
            .client
            .get(self.table_url(table))
            .headers(self.auth_header.clone())
            .query(&[("select", "*"), ("order", "position.asc")])
            .send()
            .await?;
        parse_response(response).await
    }

    pub async fn insert<T, B>(&self, table: &str, body: &B) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(table, "insert");
        let response = self
            .client
            .post(self.table_url(table))
            .headers(self.auth_header.clone())
            .header("prefer", PREFER_REPRESENTATION)
            .json(body)
            .send()
            .await?;
        let rows: Vec<T> = parse_response(response).await?;
        rows.into_iter().next().ok_or_else(|| {
            GatewayError::InvalidResponse(format!("insert into {} returned no row", table))
        })
    }

    pub async fn update<T, B>(&self, table: &str, id: EntityId, body: &B) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(table, %id, "update");
        let response = self
            .client
            .patch(self.table_url(table))
            .headers(self.auth_header.clone())
            .header("prefer", PREFER_REPRESENTATION)
            .query(&[("id", format!("eq.{}", id))])
            .json(body)
            .send()
            .await?;
        let rows: Vec<T> = parse_response(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found(format!("{} row {} not found", table, id)))
    }

    pub async fn delete(&self, table: &str, id: EntityId) -> GatewayResult<()> {
        debug!(table, %id, "delete");
        let response = self
            .client
            .delete(self.table_url(table))
            .headers(self.auth_header.clone())
            .header("prefer", PREFER_REPRESENTATION)
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = parse_response(response).await?;
        if rows.is_empty() {
            return Err(GatewayError::not_found(format!(
                "{} row {} not found",
                table, id
            )));
        }
        Ok(())
    }

    /// Insert-or-update complete rows by id in a single request.
    pub async fn upsert<T, B>(&self, table: &str, rows: &[B]) -> GatewayResult<Vec<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        debug!(table, rows = rows.len(), "upsert");
        let response = self
            .client
            .post(self.table_url(table))
            .headers(self.auth_header.clone())
            .header("prefer", PREFER_UPSERT)
            .query(&[("on_conflict", "id")])
            .json(rows)
            .send()
            .await?;
        parse_response(response).await
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }
}

/// Error body returned by the table API.
#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> GatewayResult<T> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json::<T>().await?)
    } else {
        let text = response.text().await?;
        Err(classify_failure(status.as_u16(), &text))
    }
}

/// Map a failed response to a gateway error.
pub(crate) fn classify_failure(status: u16, text: &str) -> GatewayError {
    let body = serde_json::from_str::<StoreErrorBody>(text).ok();
    let message = match &body {
        Some(body) => body.message.clone(),
        None if text.trim().is_empty() => format!("HTTP {}", status),
        None => text.to_string(),
    };
    let rls = body
        .as_ref()
        .and_then(|b| b.code.as_deref())
        .is_some_and(|code| code == RLS_VIOLATION);
    if status == 401 || status == 403 || rls {
        return GatewayError::Unauthorized { message };
    }
    GatewayError::Rejected { status, message }
}

fn build_auth_headers(api_key: &str, access_token: &str) -> GatewayResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("apikey"),
        HeaderValue::from_str(api_key).map_err(|e| GatewayError::Config(e.to_string()))?,
    );
    let value = format!("Bearer {}", access_token);
    headers.insert(
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&value).map_err(|e| GatewayError::Config(e.to_string()))?,
    );
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_map_to_unauthorized() {
        assert!(classify_failure(401, "").is_authorization());
        assert!(classify_failure(403, r#"{"message":"forbidden"}"#).is_authorization());
    }

    #[test]
    fn row_level_security_violations_map_to_unauthorized() {
        let body = r#"{"code":"42501","details":null,"hint":null,
            "message":"new row violates row-level security policy for table \"tasks\""}"#;
        match classify_failure(400, body) {
            GatewayError::Unauthorized { message } => {
                assert!(message.contains("row-level security"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn other_failures_keep_status_and_message() {
        let body = r#"{"code":"23502","message":"null value in column \"title\""}"#;
        match classify_failure(400, body) {
            GatewayError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("title"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match classify_failure(503, "") {
            GatewayError::Rejected { message, .. } => assert_eq!(message, "HTTP 503"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn headers_carry_key_and_bearer_token() {
        let headers = build_auth_headers("anon", "jwt-token").unwrap();
        assert_eq!(headers["apikey"], "anon");
        assert_eq!(headers["authorization"], "Bearer jwt-token");
        assert!(build_auth_headers("bad\nkey", "t").is_err());
    }
}
