use async_trait::async_trait;
use tracing::trace;

use super::{Decision, DecisionLogger};

/// Discards every decision
#[derive(Debug, Default)]
pub struct NopLogger;

impl NopLogger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecisionLogger for NopLogger {
    fn kind(&self) -> &'static str {
        "nop"
    }

    async fn log(&self, decision: &Decision) -> anyhow::Result<()> {
        trace!("[DecisionLog] Discarding decision {}", decision.id);
        Ok(())
    }

    async fn shutdown(&self) {}
}
