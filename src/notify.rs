use log::{error, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn success(description: impl Into<String>) -> Self {
        Notification {
            title: String::from("Success!"),
            description: description.into(),
            severity: Severity::Default,
        }
    }

    pub fn failure(description: impl Into<String>) -> Self {
        Notification {
            title: String::from("Error"),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }

    pub fn engine_unavailable() -> Self {
        Notification::failure("Failed to load conversion tools. Please try again.")
    }
}

/// Where transient user-facing messages go.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Default => info!("{}: {}", notification.title, notification.description),
            Severity::Destructive => error!("{}: {}", notification.title, notification.description),
        }
    }
}
