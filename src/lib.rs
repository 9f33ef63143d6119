//! Peripheral link library
//! Session layer that lets a block-based program host drive and observe small
//! BLE peripherals: a drawing robot over a UART service and a sensor ball.

pub mod config;
pub mod core;
pub mod error;
pub mod host;
pub mod logging;
pub mod state;

pub use crate::config::ExtensionConfig;
pub use crate::core::bluetooth::{PeripheralDescriptor, PeripheralManager, PeripheralSession};
pub use crate::error::{DecodeError, EncodeError, ErrorCategory, PeripheralError};
pub use crate::host::{HostBridge, HostEvent, LogHost, StopAllHandler};
pub use crate::state::PeripheralRegistry;
