//! Core functionality: the wire codec and the Bluetooth session layer.

pub mod bluetooth;
pub mod codec;

pub use bluetooth::{PeripheralManager, PeripheralSession};
