//! Robot command facade
//! Host-level verbs turned into `CommandMessage`s and handed to a sender.

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::core::bluetooth::connection::PeripheralSession;
use crate::core::codec::{CommandMessage, Direction, Face, PenPosition, PIXEL_COUNT};
use crate::error::PeripheralError;

/// Anything that can deliver a command to the peripheral
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send_command(&self, command: CommandMessage) -> Result<(), PeripheralError>;
}

#[async_trait]
impl CommandSender for PeripheralSession {
    async fn send_command(&self, command: CommandMessage) -> Result<(), PeripheralError> {
        self.send(&command).await
    }
}

/// Parses `#rrggbb` (or `rrggbb`) into a 24-bit color; anything else is 0.
pub fn color_from_hex(text: &str) -> u32 {
    let digits = text.trim().trim_start_matches('#');
    if digits.len() != 6 {
        return 0;
    }
    u32::from_str_radix(digits, 16).unwrap_or(0)
}

/// Verbs exposed to the host for the drawing robot.
///
/// Unknown names fall back to a default (neutral face, forward, pen up) so
/// every verb produces a command. Numeric arguments are not clamped; the
/// codec rejects values it cannot encode.
pub struct CommandFacade<T: CommandSender> {
    command_sender: T,
}

impl<T: CommandSender> CommandFacade<T> {
    pub fn new(command_sender: T) -> Self {
        Self { command_sender }
    }

    pub fn sender(&self) -> &T {
        &self.command_sender
    }

    async fn send(&self, command: CommandMessage) -> Result<CommandMessage, PeripheralError> {
        debug!("Facade sending {:?}", command);
        self.command_sender.send_command(command.clone()).await?;
        Ok(command)
    }

    pub async fn display_face(&self, name: &str) -> Result<CommandMessage, PeripheralError> {
        let face = Face::from_name(name).unwrap_or_else(|| {
            warn!("Unknown face {:?}, showing {}", name, Face::Neutral.name());
            Face::Neutral
        });
        self.send(CommandMessage::SetFace(face)).await
    }

    pub async fn clear_display(&self) -> Result<CommandMessage, PeripheralError> {
        self.send(CommandMessage::ClearDisplay).await
    }

    /// Paints all pixels with one host color string.
    pub async fn set_pixel_color(&self, color: &str) -> Result<CommandMessage, PeripheralError> {
        let value = color_from_hex(color);
        self.send(CommandMessage::SetPixels([value; PIXEL_COUNT])).await
    }

    pub async fn pixels_off(&self) -> Result<CommandMessage, PeripheralError> {
        self.send(CommandMessage::pixels_off()).await
    }

    pub async fn drive(&self, direction: &str, steps: i64) -> Result<CommandMessage, PeripheralError> {
        let direction = Direction::from_name(direction).unwrap_or_else(|| {
            warn!("Unknown direction {:?}, driving forward", direction);
            Direction::Forward
        });
        self.send(CommandMessage::Drive { direction, steps }).await
    }

    pub async fn stop_motors(&self) -> Result<CommandMessage, PeripheralError> {
        self.send(CommandMessage::Stop).await
    }

    pub async fn move_pen(&self, position: &str) -> Result<CommandMessage, PeripheralError> {
        let position = PenPosition::from_name(position).unwrap_or(PenPosition::Up);
        self.send(CommandMessage::MovePen(position)).await
    }

    /// Writes `text` as-is. Nothing is validated.
    pub async fn send_raw(&self, text: &str) -> Result<CommandMessage, PeripheralError> {
        self.send(CommandMessage::RawText(text.to_string())).await
    }

    /// Neutral face, motors stopped, pixels off. Every step is attempted
    /// even when an earlier one fails.
    pub async fn reset(&self) -> Vec<CommandMessage> {
        info!("Resetting robot to its idle state");
        let sequence = [
            CommandMessage::SetFace(Face::Neutral),
            CommandMessage::Stop,
            CommandMessage::pixels_off(),
        ];
        for command in &sequence {
            if let Err(e) = self.command_sender.send_command(command.clone()).await {
                warn!("Reset step {:?} failed: {}", command, e);
            }
        }
        sequence.to_vec()
    }
}
