//! Progress reporting
//!
//! Reporters observe the run; they never influence control flow.

/// Receiver of progress events
pub trait Reporter: Send + Sync {
    /// A step started
    fn start(&self, message: &str);
    /// A step succeeded
    fn succeed(&self, message: &str);
    /// A step failed
    fn fail(&self, message: &str);
    /// Informational message
    fn info(&self, message: &str);
}

/// Reporter writing every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn start(&self, message: &str) {
        tracing::info!(event = "start", "{message}");
    }

    fn succeed(&self, message: &str) {
        tracing::info!(event = "success", "{message}");
    }

    fn fail(&self, message: &str) {
        tracing::error!(event = "failure", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(event = "info", "{message}");
    }
}

/// Reporter that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn start(&self, _message: &str) {}
    fn succeed(&self, _message: &str) {}
    fn fail(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
}
