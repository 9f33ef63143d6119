//! Host boundary
//! The narrow capability the session layer receives from the program host.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::core::bluetooth::DisconnectReason;
use crate::core::codec::DecodedReading;
use crate::error::ErrorCategory;

/// Events the host shows or reacts to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HostEvent {
    /// The peripheral became usable
    Connected { extension_id: &'static str },
    Disconnected {
        extension_id: &'static str,
        reason: DisconnectReason,
    },
    /// One per distinct failure category between successful connections
    ConnectionError {
        extension_id: &'static str,
        category: ErrorCategory,
        message: String,
    },
    Reading {
        extension_id: &'static str,
        reading: DecodedReading,
    },
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "peripheral-connected",
            Self::Disconnected { .. } => "peripheral-disconnected",
            Self::ConnectionError { .. } => "peripheral-error",
            Self::Reading { .. } => "peripheral-reading",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Work a peripheral wants done when the host stops every running program.
pub type StopAllHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Implemented by the host application and injected at construction.
pub trait HostBridge: Send + Sync {
    fn emit(&self, event: HostEvent);

    /// Hooks `handler` to the host's stop control. Hosts without one ignore it.
    fn register_stop_all(&self, handler: StopAllHandler) {
        let _ = handler;
    }
}

/// A host that only logs, for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHost;

impl HostBridge for LogHost {
    fn emit(&self, event: HostEvent) {
        match event.to_json() {
            Ok(json) => log::info!("[{}] {}", event.name(), json),
            Err(e) => log::error!("Failed to serialize {} event: {}", event.name(), e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_tag() {
        let event = HostEvent::Disconnected {
            extension_id: "doodlebot",
            reason: DisconnectReason::Lost,
        };
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"event":"disconnected","extension_id":"doodlebot","reason":"Lost"}"#
        );
        assert_eq!(event.name(), "peripheral-disconnected");
    }
}
