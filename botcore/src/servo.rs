// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

use crate::serial;
use core::fmt;
use std::error::Error;

/// Interface to a positional servo on the bus.
#[derive(Debug)]
pub struct Controller {
    /// Address of the servo on the bus.
    addr: u8,

    /// Set position of the servo.
    position: f32,
}

impl Controller {
    /// Position of the servo at one end of its throw.
    pub const MIN_POSITION: f32 = 0f32;

    /// Position of the servo at the other end of its throw.
    pub const MAX_POSITION: f32 = 1f32;

    /// Creates a new servo controller for a servo at the given bus address.
    #[must_use]
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            position: Self::MIN_POSITION,
        }
    }

    /// Sets the desired servo position, clamped into the servo's throw.
    /// Returns an error if `position` is infinite or `NaN`.
    pub fn set(
        &mut self,
        position: f32,
    ) -> Result<serial::Packet<ServoHeader, f32>, InvalidPositionError> {
        if !position.is_finite() {
            return Err(InvalidPositionError);
        }

        self.position = position.clamp(Self::MIN_POSITION, Self::MAX_POSITION);

        Ok(serial::Packet::new(
            ServoHeader {
                addr: self.addr,
                cmd: ServoCmd::SetPosition,
            },
            self.position,
        ))
    }

    /// Gets the servo's set position.
    #[inline]
    #[must_use]
    pub fn position(&self) -> f32 {
        self.position
    }
}

/// Packet header for a servo device.
#[derive(Clone, Copy, Debug)]
pub struct ServoHeader {
    pub(crate) addr: u8,
    pub(crate) cmd: ServoCmd,
}

impl serial::Header for ServoHeader {
    fn extract<H, D>(packet: &serial::Packet<H, D>) -> serial::ExtractionResult<Self>
    where
        H: serial::Header,
        D: serial::Data,
    {
        match packet.head.get() {
            (addr, c) if c == ServoCmd::SetPosition as u8 => Ok(Self {
                addr,
                cmd: ServoCmd::SetPosition,
            }),

            _ => Err(serial::ExtractionError),
        }
    }

    fn get(&self) -> (u8, u8) {
        (self.addr, self.cmd as u8)
    }
}

/// Command byte of a packet to a servo device.
#[repr(u8)]
#[derive(Clone, Copy, Debug)]
pub enum ServoCmd {
    /// Set the position of the servo.
    SetPosition = 1u8,
}

/// An invalid position was given to the servo.
#[derive(Debug, Clone)]
pub struct InvalidPositionError;

impl fmt::Display for InvalidPositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid position, must be a real decimal")
    }
}

impl Error for InvalidPositionError {}
