use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The forester executable could not be started at all.
    Critical,
    Error,
    Info,
}

/// A user-visible message produced by the forester subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }
}

/// Where notices go. The host decides how to show them.
pub trait Reporter: Send + Sync {
    fn report(&self, notice: Notice);
}

/// Logs the notice and keeps it until the host drains it.
#[derive(Debug, Default)]
pub struct Notices {
    pending: Mutex<Vec<Notice>>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notice> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Reporter for Notices {
    fn report(&self, notice: Notice) {
        log_notice(&notice);
        match self.pending.lock() {
            Ok(mut pending) => pending.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}

pub fn log_notice(notice: &Notice) {
    match notice.severity {
        Severity::Critical => tracing::error!("{}", notice.message),
        Severity::Error => tracing::warn!("{}", notice.message),
        Severity::Info => tracing::info!("{}", notice.message),
    }
}
