use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

/// How the following lines should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Severity {
    #[default]
    Info = 0,
    Notice = 1,
    Warning = 2,
    Error = 3,
}

impl Severity {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Notice,
            2 => Self::Warning,
            3 => Self::Error,
            _ => Self::Info,
        }
    }
}

/// The capabilities a host scheduler hands to a reconciliation run.
pub trait JobContext: Send + Sync {
    fn write_line(&self, text: &str);

    /// Applies to every following `write_line` until changed again.
    fn set_severity(&self, severity: Severity);

    fn report_progress(&self, percent: u8);

    fn is_cancelled(&self) -> bool;
}

/// Job context of the long-running runtime: lines go to `tracing`.
#[derive(Debug)]
pub struct TracingJobContext {
    job: String,
    severity: AtomicU8,
    cancel: CancellationToken,
}

impl TracingJobContext {
    pub fn new(job: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            job: job.into(),
            severity: AtomicU8::new(Severity::Info as u8),
            cancel,
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::from_u8(self.severity.load(Ordering::Relaxed))
    }
}

impl JobContext for TracingJobContext {
    fn write_line(&self, text: &str) {
        match self.severity() {
            Severity::Info | Severity::Notice => tracing::info!(job = %self.job, "{}", text),
            Severity::Warning => tracing::warn!(job = %self.job, "{}", text),
            Severity::Error => tracing::error!(job = %self.job, "{}", text),
        }
    }

    fn set_severity(&self, severity: Severity) {
        self.severity.store(severity as u8, Ordering::Relaxed);
    }

    fn report_progress(&self, percent: u8) {
        tracing::info!(job = %self.job, progress = percent, "progress {}%", percent);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
