//! Observability sink for named CLI operations
//!
//! Each command runs as one observable unit of work: a start event, then a
//! success-or-failure event carrying the elapsed time and any attributes
//! attached along the way. Events are structured tracing records; the
//! wrapped error is always returned untouched.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, info};

use crate::Result;

/// Telemetry client scoped to one CLI invocation.
#[derive(Debug, Default)]
pub struct TelClient {
    attrs: Mutex<BTreeMap<String, String>>,
}

impl TelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an attribute reported with the operation's terminal event.
    pub fn attr(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut attrs) = self.attrs.lock() {
            attrs.insert(key.into(), value.into());
        }
    }

    fn attrs_string(&self) -> String {
        match self.attrs.lock() {
            Ok(attrs) => attrs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => String::new(),
        }
    }

    /// Run `f` as one observable operation, recording success or failure
    /// against `operation` regardless of which inner stage failed.
    pub async fn wrap<F, Fut>(&self, operation: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let start = Instant::now();
        debug!(operation, "operation started");

        match f().await {
            Ok(()) => {
                info!(
                    operation,
                    attrs = %self.attrs_string(),
                    elapsed = ?start.elapsed(),
                    "operation succeeded"
                );
                Ok(())
            }
            Err(e) => {
                info!(
                    operation,
                    attrs = %self.attrs_string(),
                    elapsed = ?start.elapsed(),
                    error = %e,
                    "operation failed"
                );
                Err(e)
            }
        }
    }
}
