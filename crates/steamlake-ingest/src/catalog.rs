//! Dremio catalog registration
//!
//! Logs in with username/password, then registers two sources: a Nessie
//! catalog over the warehouse bucket and a plain S3 source over the datalake
//! bucket. Registering a source that already exists is not an error.

use crate::config::{BucketConfig, DremioConfig};
use crate::error::{IngestError, Result};
use crate::storage::StorageConfig;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const NESSIE_SOURCE_NAME: &str = "Nessie";
pub const OBJECT_STORE_SOURCE_NAME: &str = "Extract";

/// Body of `POST /api/v3/catalog`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    #[serde(rename = "entityType")]
    pub entity_type: String,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub config: Value,
}

fn property_list(s3_endpoint: &str, extra: &[(&str, &str)]) -> Value {
    let mut properties = vec![
        json!({"name": "fs.s3a.endpoint", "value": s3_endpoint}),
        json!({"name": "fs.s3a.path.style.access", "value": "true"}),
    ];
    properties.extend(
        extra
            .iter()
            .map(|(name, value)| json!({"name": name, "value": value})),
    );
    Value::Array(properties)
}

impl SourceDefinition {
    /// Nessie catalog rooted at the warehouse bucket
    pub fn nessie_source(dremio: &DremioConfig, storage: &StorageConfig, warehouse_bucket: &str) -> Self {
        Self {
            entity_type: "source".to_string(),
            name: NESSIE_SOURCE_NAME.to_string(),
            source_type: "NESSIE".to_string(),
            config: json!({
                "nessieEndpoint": dremio.nessie_endpoint,
                "nessieAuthType": "NONE",
                "credentialType": "ACCESS_KEY",
                "awsAccessKey": storage.access_key,
                "awsAccessSecret": storage.secret_key,
                "awsRootPath": format!("/{}", warehouse_bucket),
                "secure": "false",
                "propertyList": property_list(&dremio.s3_endpoint, &[("dremio.s3.compat", "true")]),
            }),
        }
    }

    /// S3 source rooted at the datalake bucket
    pub fn object_store_source(dremio: &DremioConfig, storage: &StorageConfig, datalake_bucket: &str) -> Self {
        Self {
            entity_type: "source".to_string(),
            name: OBJECT_STORE_SOURCE_NAME.to_string(),
            source_type: "S3".to_string(),
            config: json!({
                "accessKey": storage.access_key,
                "accessSecret": storage.secret_key,
                "rootPath": format!("/{}", datalake_bucket),
                "secure": "false",
                "compatibilityMode": "true",
                "propertyList": property_list(&dremio.s3_endpoint, &[]),
            }),
        }
    }

    /// Both sources this project registers
    pub fn defaults(dremio: &DremioConfig, storage: &StorageConfig, buckets: &BucketConfig) -> Vec<Self> {
        vec![
            Self::nessie_source(dremio, storage, &buckets.warehouse),
            Self::object_store_source(dremio, storage, &buckets.datalake),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Created,
    AlreadyExists,
}

#[derive(Debug)]
pub struct SourceOutcome {
    pub name: String,
    pub result: Result<SourceStatus>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "userName")]
    user_name: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Pull `errorMessage` out of a Dremio error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("errorMessage").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

pub struct DremioClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl DremioClient {
    pub fn new(config: &DremioConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    #[instrument(skip(self, password))]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let url = format!("{}/apiv2/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                user_name: username,
                password,
            })
            .send()
            .await
            .map_err(|e| IngestError::authentication("Dremio", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::authentication(
                "Dremio",
                format!("HTTP {}: {}", status.as_u16(), error_message(&body)),
            ));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| IngestError::authentication("Dremio", format!("unexpected login response: {}", e)))?;

        self.token = Some(login.token);
        info!("Logged in to Dremio");
        Ok(())
    }

    #[instrument(skip(self, source), fields(source = %source.name))]
    pub async fn create_source(&self, source: &SourceDefinition) -> Result<SourceStatus> {
        let token = self.token.as_deref().ok_or_else(|| {
            IngestError::authentication("Dremio", "create_source called before login")
        })?;

        let response = self
            .client
            .post(format!("{}/api/v3/catalog", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("_dremio{}", token))
            .json(source)
            .send()
            .await
            .map_err(|e| IngestError::catalog(&source.name, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!("Created source {}", source.name);
            return Ok(SourceStatus::Created);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            info!("Source {} already exists", source.name);
            return Ok(SourceStatus::AlreadyExists);
        }

        Err(IngestError::catalog(
            &source.name,
            format!("HTTP {}: {}", status.as_u16(), error_message(&body)),
        ))
    }

    /// Register each source; one failing does not stop the rest
    pub async fn register_all(&self, sources: &[SourceDefinition]) -> Vec<SourceOutcome> {
        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            let result = self.create_source(source).await;
            if let Err(err) = &result {
                warn!("{}", err);
            }
            outcomes.push(SourceOutcome {
                name: source.name.clone(),
                result,
            });
        }
        outcomes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_payload_shapes() {
        let dremio = DremioConfig::default();
        let storage = StorageConfig::default();
        let sources = SourceDefinition::defaults(&dremio, &storage, &BucketConfig::default());

        let nessie = serde_json::to_value(&sources[0]).unwrap();
        assert_eq!(nessie["entityType"], "source");
        assert_eq!(nessie["name"], "Nessie");
        assert_eq!(nessie["type"], "NESSIE");
        assert_eq!(nessie["config"]["nessieEndpoint"], "http://nessie:19120/api/v2");
        assert_eq!(nessie["config"]["awsRootPath"], "/warehouse");
        assert_eq!(nessie["config"]["propertyList"].as_array().unwrap().len(), 3);

        let s3 = serde_json::to_value(&sources[1]).unwrap();
        assert_eq!(s3["name"], "Extract");
        assert_eq!(s3["type"], "S3");
        assert_eq!(s3["config"]["rootPath"], "/datalake");
        assert_eq!(s3["config"]["accessKey"], "minio");
        assert_eq!(s3["config"]["propertyList"][0]["value"], "minio:9000");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"errorMessage":"Source already exists","moreInfo":""}"#),
            "Source already exists"
        );
        assert_eq!(error_message("  plain text  "), "plain text");
    }
}
