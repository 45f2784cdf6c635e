//! Snowflake Warehouse Gateway
//!
//! Talks to the Snowflake SQL REST API (v2).

use crate::config::SnowflakeConfig;
use crate::error::{CopilotError, Result};
use crate::warehouse::result::{PartitionSource, ResultColumn, ResultHandle, Row};
use crate::warehouse::WarehouseGateway;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// SQL API: POST /api/v2/statements with a JSON body carrying the statement and
// session context. 202 means "still running": poll GET /api/v2/statements/{handle}.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    statement_handle: Option<String>,
    code: Option<String>,
    sql_state: Option<String>,
    message: Option<String>,
    result_set_meta_data: Option<ResultSetMetaData>,
    data: Option<Vec<Row>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    num_rows: Option<u64>,
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<PartitionInfo>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
    scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionInfo {
    #[allow(dead_code)]
    row_count: Option<u64>,
}

/// HTTP plumbing shared by the gateway and its result handles
struct SnowflakeHttp {
    client: Client,
    base_url: String,
    config: SnowflakeConfig,
}

impl SnowflakeHttp {
    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.config.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.config.token_type)
            .header("Accept", "application/json")
            .header("User-Agent", "analytics-copilot/0.3")
    }

    async fn submit(&self, sql: &str) -> Result<StatementResponse> {
        let request_id = uuid::Uuid::new_v4();
        let url = format!(
            "{}/api/v2/statements?requestId={}",
            self.base_url, request_id
        );
        let body = serde_json::json!({
            "statement": sql,
            "timeout": self.config.statement_timeout_secs,
            "database": self.config.database,
            "schema": self.config.schema,
            "warehouse": self.config.warehouse,
            "role": self.config.role,
        });

        debug!("Submitting statement {} ({} chars)", request_id, sql.len());

        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CopilotError::Transport(format!("Failed to submit statement: {}", e)))?;

        let status = response.status();
        let parsed = Self::parse_body(response).await?;

        match status {
            StatusCode::OK => Ok(parsed),
            StatusCode::ACCEPTED => {
                let handle = parsed.statement_handle.ok_or_else(|| {
                    CopilotError::Warehouse("Accepted statement has no handle".to_string())
                })?;
                self.wait_for(&handle).await
            }
            _ => Err(Self::status_error(status, parsed)),
        }
    }

    /// Poll a running statement until it completes or the timeout elapses
    async fn wait_for(&self, handle: &str) -> Result<StatementResponse> {
        let url = format!("{}/api/v2/statements/{}", self.base_url, handle);
        let deadline = Instant::now() + Duration::from_secs(self.config.statement_timeout_secs);
        let mut retries = 3;

        loop {
            if Instant::now() > deadline {
                return Err(CopilotError::Warehouse(format!(
                    "Statement {} did not finish within {}s",
                    handle, self.config.statement_timeout_secs
                )));
            }

            let response = match self.request(self.client.get(&url)).send().await {
                Ok(r) => r,
                Err(e) => {
                    if retries > 0 && e.is_timeout() {
                        retries -= 1;
                        warn!("Statement poll timeout, retrying... ({} retries left)", retries);
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                    return Err(CopilotError::Transport(format!(
                        "Failed to poll statement {}: {}",
                        handle, e
                    )));
                }
            };

            let status = response.status();
            if status.is_server_error() && retries > 0 {
                retries -= 1;
                warn!("Warehouse server error {}, retrying... ({} retries left)", status, retries);
                tokio::time::sleep(Duration::from_millis(1000)).await;
                continue;
            }

            let parsed = Self::parse_body(response).await?;
            match status {
                StatusCode::OK => return Ok(parsed),
                StatusCode::ACCEPTED => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                _ => return Err(Self::status_error(status, parsed)),
            }
        }
    }

    async fn fetch_partition(&self, handle: &str, index: usize) -> Result<Vec<Row>> {
        let url = format!(
            "{}/api/v2/statements/{}?partition={}",
            self.base_url, handle, index
        );
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CopilotError::Transport(format!("Failed to fetch partition {}: {}", index, e)))?;

        let status = response.status();
        let parsed = Self::parse_body(response).await?;
        if status != StatusCode::OK {
            return Err(Self::status_error(status, parsed));
        }
        Ok(parsed.data.unwrap_or_default())
    }

    async fn parse_body(response: reqwest::Response) -> Result<StatementResponse> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CopilotError::Transport(format!("Failed to read warehouse response: {}", e)))?;

        serde_json::from_str(&text).map_err(|_| {
            CopilotError::Transport(format!(
                "Unexpected warehouse response ({}): {}",
                status,
                text.chars().take(200).collect::<String>()
            ))
        })
    }

    fn status_error(status: StatusCode, body: StatementResponse) -> CopilotError {
        let message = body
            .message
            .unwrap_or_else(|| format!("Statement failed with status {}", status));
        let detail = match (body.code, body.sql_state) {
            (Some(code), Some(state)) => format!("{}\n(code: {}, sqlState: {})", message, code, state),
            (Some(code), None) => format!("{}\n(code: {})", message, code),
            _ => message,
        };

        if status.is_server_error() {
            CopilotError::Transport(detail)
        } else {
            CopilotError::Warehouse(detail)
        }
    }
}

/// Lazily fetched partitions of one executed statement
struct StatementPartitions {
    http: Arc<SnowflakeHttp>,
    handle: String,
}

#[async_trait]
impl PartitionSource for StatementPartitions {
    async fn fetch_partition(&self, index: usize) -> Result<Vec<Row>> {
        self.http.fetch_partition(&self.handle, index).await
    }
}

/// Gateway backed by the Snowflake SQL API. One gateway per in-flight
/// question; the HTTP client is released when the gateway is dropped.
pub struct SnowflakeGateway {
    http: Arc<SnowflakeHttp>,
}

impl SnowflakeGateway {
    pub fn new(config: SnowflakeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.statement_timeout_secs + 30))
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .gzip(true)
            .build()
            .map_err(|e| CopilotError::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Warehouse gateway for account {} (warehouse {}, role {})",
            config.account, config.warehouse, config.role
        );

        Ok(Self {
            http: Arc::new(SnowflakeHttp {
                client,
                base_url: config.base_url(),
                config,
            }),
        })
    }
}

#[async_trait]
impl WarehouseGateway for SnowflakeGateway {
    async fn explain(&self, sql: &str) -> Result<()> {
        self.http.submit(&format!("EXPLAIN {}", sql)).await?;
        Ok(())
    }

    async fn run(&self, sql: &str) -> Result<ResultHandle> {
        let response = self.http.submit(sql).await?;
        let handle = response.statement_handle.clone().unwrap_or_default();

        let (columns, total_rows, partition_count) = match response.result_set_meta_data {
            Some(meta) => {
                let columns = meta
                    .row_type
                    .into_iter()
                    .map(|r| ResultColumn {
                        name: r.name,
                        data_type: r.column_type,
                        scale: r.scale,
                    })
                    .collect::<Vec<_>>();
                (columns, meta.num_rows, meta.partition_info.len())
            }
            None => (Vec::new(), None, 1),
        };

        debug!(
            "Statement {} returned {:?} rows in {} partition(s)",
            handle, total_rows, partition_count
        );

        Ok(ResultHandle::partitioned(
            handle.clone(),
            columns,
            total_rows,
            response.data.unwrap_or_default(),
            partition_count,
            Arc::new(StatementPartitions {
                http: Arc::clone(&self.http),
                handle,
            }),
        ))
    }
}
