//! Error types shared by the codec and session layers.

use thiserror::Error;
use uuid::Uuid;

use crate::core::codec::SensorKind;

/// Rejected before any transport call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("step count must not be negative, got {0}")]
    NegativeSteps(i64),

    #[error("pixel {index} color {value} exceeds 0xFFFFFF")]
    PixelOutOfRange { index: usize, value: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("no frame layout known for characteristic {0}")]
    UnknownCharacteristic(Uuid),

    #[error("frame of {len} bytes is not a multiple of the {width}-byte element width")]
    Misaligned { len: usize, width: usize },

    #[error("expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("unrecognized discriminator {0:?}")]
    UnknownDiscriminator(String),

    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Everything the session layer can surface to its caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PeripheralError {
    #[error("Bluetooth adapter not available")]
    AdapterUnavailable,

    #[error("device selection was cancelled")]
    UserCancelled,

    #[error("no device matching {0:?} was found")]
    DeviceNotFound(String),

    #[error("service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("characteristic {name} does not support {operation}")]
    MissingCapability {
        name: &'static str,
        operation: &'static str,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("peripheral is not connected")]
    NotConnected,

    #[error("a connection attempt is already in progress")]
    Busy,

    #[error("peripheral is already connected")]
    AlreadyConnected,

    #[error("connection attempt was cancelled")]
    Cancelled,

    #[error("no data received yet for {0:?}")]
    NoData(SensorKind),

    #[error("no peripheral registered as {0:?}")]
    UnknownExtension(String),
}

/// Coarse grouping used for host notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorCategory {
    AdapterUnavailable,
    UserCancelled,
    DeviceNotFound,
    ProfileMismatch,
    Protocol,
    Transport,
    State,
    Cancelled,
}

impl ErrorCategory {
    /// Silent categories never reach the user.
    pub fn is_silent(self) -> bool {
        matches!(self, Self::UserCancelled | Self::Cancelled)
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::AdapterUnavailable => "Your device does not support BLE connections.",
            Self::DeviceNotFound => "No matching device was found nearby, please make sure it is switched on.",
            Self::ProfileMismatch => "The selected device is not the expected peripheral.",
            Self::Protocol => "The peripheral sent or was sent malformed data.",
            Self::Transport | Self::State => {
                "There was a problem connecting your device, please try again or request assistance."
            }
            Self::UserCancelled | Self::Cancelled => "",
        }
    }
}

impl PeripheralError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AdapterUnavailable => ErrorCategory::AdapterUnavailable,
            Self::UserCancelled => ErrorCategory::UserCancelled,
            Self::DeviceNotFound(_) => ErrorCategory::DeviceNotFound,
            Self::ServiceNotFound(_)
            | Self::CharacteristicNotFound(_)
            | Self::UnknownAttribute(_)
            | Self::MissingCapability { .. } => ErrorCategory::ProfileMismatch,
            Self::Encode(_) | Self::Decode(_) => ErrorCategory::Protocol,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::NotConnected
            | Self::Busy
            | Self::AlreadyConnected
            | Self::NoData(_)
            | Self::UnknownExtension(_) => {
                ErrorCategory::State
            }
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellations_are_silent() {
        assert!(PeripheralError::UserCancelled.category().is_silent());
        assert!(PeripheralError::Cancelled.category().is_silent());
        assert!(!PeripheralError::AdapterUnavailable.category().is_silent());
    }

    #[test]
    fn missing_attributes_are_profile_mismatches() {
        let err = PeripheralError::ServiceNotFound(Uuid::nil());
        assert_eq!(err.category(), ErrorCategory::ProfileMismatch);
        let err = PeripheralError::CharacteristicNotFound(Uuid::nil());
        assert_eq!(err.category(), ErrorCategory::ProfileMismatch);
    }

    #[test]
    fn codec_errors_convert_into_peripheral_errors() {
        let err: PeripheralError = EncodeError::NegativeSteps(-3).into();
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert_eq!(err.to_string(), "step count must not be negative, got -3");
    }
}
