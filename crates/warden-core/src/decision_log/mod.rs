//! Decision logging
//!
//! Exactly one backend is selected per process from the `decision_logger`
//! config block and shared by every request path that records decisions.
//!
//! | `type`  | backend                                      |
//! |---------|----------------------------------------------|
//! | `self`  | batches decisions to a remote HTTP endpoint  |
//! | `file`  | size-rotated JSON-lines file                 |
//! | other   | no-op, records are discarded                 |

mod file;
mod nop;
mod remote;

pub use file::{FileLogger, FileLoggerConfig, DEFAULT_MAX_FILE_SIZE_MB};
pub use nop::NopLogger;
pub use remote::{RemoteLogger, RemoteLoggerConfig};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::collaborators::{DecisionRequest, DecisionResponse};
use crate::config::DecisionLogConfig;
use crate::error::Result;

/// Audit record of one authorization decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub policy_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default)]
    pub resource: Value,
    pub outcomes: BTreeMap<String, bool>,
}

impl Decision {
    pub fn new(request: &DecisionRequest, response: &DecisionResponse) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            policy_path: request.policy_path.clone(),
            identity: request.identity.clone(),
            resource: request.resource.clone(),
            outcomes: response.decisions.clone(),
        }
    }
}

/// Decision-log backend
#[async_trait]
pub trait DecisionLogger: Send + Sync {
    /// Backend discriminator (`self`, `file` or `nop`)
    fn kind(&self) -> &'static str;

    async fn log(&self, decision: &Decision) -> anyhow::Result<()>;

    /// Flush buffered records and release the backend
    async fn shutdown(&self);
}

/// Build the configured backend.
///
/// Construction failures are configuration errors and abort process start;
/// nothing is retried here.
pub async fn select_decision_logger(
    config: &DecisionLogConfig,
    cancel: &CancellationToken,
) -> Result<Arc<dyn DecisionLogger>> {
    let logger: Arc<dyn DecisionLogger> = match config.kind() {
        "self" => {
            let settings = RemoteLoggerConfig::from_config(config)?;
            Arc::new(RemoteLogger::connect(settings, cancel).await?)
        }
        "file" => {
            let settings = FileLoggerConfig::from_config(config)?;
            Arc::new(FileLogger::open(settings).await?)
        }
        _ => Arc::new(NopLogger::new()),
    };

    info!("[DecisionLog] Using '{}' decision logger", logger.kind());
    Ok(logger)
}
