//! Remote decision reporter
//!
//! Decisions are queued on a bounded channel and uploaded in batches by a
//! background task. A failed upload is logged and the batch dropped.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{Decision, DecisionLogger};
use crate::config::DecisionLogConfig;
use crate::error::{Error, Result};

const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 5;
const DEFAULT_BATCH_SIZE: usize = 64;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 1;
const DEFAULT_BUFFER_SIZE: usize = 1024;
/// Upper bounds for `batch_size` and `buffer_size`; larger values are clamped
pub const MAX_BATCH_SIZE: usize = 4096;
pub const MAX_BUFFER_SIZE: usize = 65536;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLoggerConfig {
    /// Upload endpoint, e.g. `https://decisions.internal:8443/api/v1/decisions`
    pub url: Url,
    pub api_key: Option<String>,
    pub tenant_id: Option<String>,
    pub dial_timeout: Duration,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub buffer_size: usize,
}

impl RemoteLoggerConfig {
    pub fn from_config(config: &DecisionLogConfig) -> Result<Self> {
        let raw = config
            .string("url")
            .or_else(|| config.string("address"))
            .ok_or_else(|| Error::configuration("self decision logger requires 'url'"))?;
        let url = Url::parse(&raw)
            .map_err(|e| Error::configuration(format!("invalid decision logger url '{}': {}", raw, e)))?;

        let or_default = |value: u64, default: u64| if value == 0 { default } else { value };
        let bounded = |key: &str, default: usize, max: usize| {
            let value = or_default(config.integer(key), default as u64);
            if value > max as u64 {
                warn!("[DecisionLog] {} {} exceeds {}, clamping", key, value, max);
                max
            } else {
                value as usize
            }
        };

        Ok(Self {
            url,
            api_key: config.string("api_key"),
            tenant_id: config.string("tenant_id"),
            dial_timeout: Duration::from_secs(or_default(
                config.integer("dial_timeout_seconds"),
                DEFAULT_DIAL_TIMEOUT_SECS,
            )),
            batch_size: bounded("batch_size", DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE),
            flush_interval: Duration::from_secs(or_default(
                config.integer("flush_interval_seconds"),
                DEFAULT_FLUSH_INTERVAL_SECS,
            )),
            buffer_size: bounded("buffer_size", DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE),
        })
    }
}

pub struct RemoteLogger {
    sender: Mutex<Option<mpsc::Sender<Decision>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteLogger {
    /// Dial the upload endpoint and start the uploader.
    ///
    /// Blocks until the dial completes, fails, times out or `cancel` fires.
    pub async fn connect(config: RemoteLoggerConfig, cancel: &CancellationToken) -> Result<Self> {
        let host = config
            .url
            .host_str()
            .ok_or_else(|| Error::configuration(format!("decision logger url '{}' has no host", config.url)))?
            .to_string();
        let port = config.url.port_or_known_default().ok_or_else(|| {
            Error::configuration(format!("decision logger url '{}' has no port", config.url))
        })?;

        debug!("[DecisionLog] Dialing {}:{}", host, port);
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::configuration("decision logger dial cancelled"));
            }
            dialed = tokio::time::timeout(config.dial_timeout, TcpStream::connect((host.as_str(), port))) => {
                match dialed {
                    Ok(Ok(_stream)) => {}
                    Ok(Err(e)) => {
                        return Err(Error::configuration(format!(
                            "failed to reach decision logger at {}:{}: {}", host, port, e
                        )));
                    }
                    Err(_) => {
                        return Err(Error::configuration(format!(
                            "timed out dialing decision logger at {}:{}", host, port
                        )));
                    }
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.dial_timeout.max(Duration::from_secs(10)))
            .build()
            .map_err(|e| Error::configuration(format!("failed to build http client: {}", e)))?;

        let (tx, rx) = mpsc::channel(config.buffer_size);
        info!("[DecisionLog] Reporting decisions to {}", config.url);
        let worker = tokio::spawn(upload_loop(client, config, rx));

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }
}

#[async_trait]
impl DecisionLogger for RemoteLogger {
    fn kind(&self) -> &'static str {
        "self"
    }

    async fn log(&self, decision: &Decision) -> anyhow::Result<()> {
        let sender = self.sender.lock().await;
        let Some(tx) = sender.as_ref() else {
            anyhow::bail!("decision logger is shut down");
        };
        match tx.try_send(decision.clone()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("[DecisionLog] Upload buffer full, dropping decision {}", decision.id);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                anyhow::bail!("decision uploader stopped")
            }
        }
    }

    async fn shutdown(&self) {
        // Closing the channel makes the worker flush and exit
        self.sender.lock().await.take();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                warn!("[DecisionLog] Uploader task failed: {}", e);
            }
        }
    }
}

#[derive(Serialize)]
struct UploadBatch<'a> {
    decisions: &'a [Decision],
}

async fn upload_loop(
    client: reqwest::Client,
    config: RemoteLoggerConfig,
    mut rx: mpsc::Receiver<Decision>,
) {
    let mut batch = Vec::with_capacity(config.batch_size);
    let mut ticker = tokio::time::interval(config.flush_interval);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(decision) => {
                    batch.push(decision);
                    if batch.len() >= config.batch_size {
                        flush(&client, &config, &mut batch).await;
                    }
                }
                None => {
                    flush(&client, &config, &mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                flush(&client, &config, &mut batch).await;
            }
        }
    }

    debug!("[DecisionLog] Uploader stopped");
}

async fn flush(client: &reqwest::Client, config: &RemoteLoggerConfig, batch: &mut Vec<Decision>) {
    if batch.is_empty() {
        return;
    }

    let mut request = client
        .post(config.url.clone())
        .json(&UploadBatch { decisions: batch });
    if let Some(key) = &config.api_key {
        request = request.header("authorization", format!("basic {}", key));
    }
    if let Some(tenant) = &config.tenant_id {
        request = request.header("x-tenant-id", tenant);
    }

    match request.send().await.and_then(|r| r.error_for_status()) {
        Ok(_) => debug!("[DecisionLog] Uploaded {} decision(s)", batch.len()),
        Err(e) => warn!(
            "[DecisionLog] Dropping {} decision(s), upload failed: {}",
            batch.len(),
            e
        ),
    }

    batch.clear();
}
