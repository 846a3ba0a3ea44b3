//! Error sink for failures that are handled locally and not propagated further.

use std::error::Error as StdError;

use tracing::error;

pub trait ErrorReporter: Send + Sync {
    /// Records `error` that occurred while doing `context`.
    fn capture(&self, context: &str, error: &(dyn StdError + 'static));
}

/// Emits captured errors as `error!` events, which the log exporter forwards.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn capture(&self, context: &str, error: &(dyn StdError + 'static)) {
        let mut chain = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        error!(context, "{chain}");
    }
}
