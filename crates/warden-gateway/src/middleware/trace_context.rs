//! Request correlation
//!
//! Every request gets a short trace id carried on its span and in the
//! request extensions so handlers can log against it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{info, info_span, Span};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 6 hex characters, unique enough to correlate lines of one request
pub fn generate_trace_id() -> String {
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let micros = chrono::Utc::now().timestamp_micros() as u64;
    format!("{:06x}", counter.wrapping_mul(0x9e37).wrapping_add(micros) & 0xFF_FFFF)
}

#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub method: String,
    pub path: String,
    pub started_at: Instant,
}

impl TraceContext {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            trace_id: generate_trace_id(),
            method: method.to_string(),
            path: path.to_string(),
            started_at: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

pub struct RequestSpan;

impl RequestSpan {
    pub fn enter(ctx: &TraceContext) -> Span {
        info_span!(
            "request",
            trace_id = %ctx.trace_id,
            method = %ctx.method,
            path = %ctx.path,
        )
    }

    pub fn log_entry(ctx: &TraceContext) {
        info!(
            trace_id = %ctx.trace_id,
            "→ {} {}",
            ctx.method,
            ctx.path
        );
    }

    pub fn log_exit(ctx: &TraceContext, status: u16) {
        info!(
            trace_id = %ctx.trace_id,
            "← {} ({}ms)",
            status,
            ctx.elapsed_ms()
        );
    }
}
