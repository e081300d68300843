// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

use crate::serial::{self, Data, Header};
use core::fmt;
use std::error::Error;

/// Interface to a single motor controller on the bus. Holds the last
/// commanded speed, direction, and run mode, and the last encoder position
/// reported back by the device.
#[derive(Debug)]
pub struct Controller {
    /// Address of the motor on the bus.
    addr: u8,

    /// Set speed of the motor.
    speed: f32,

    /// Spin direction the device applies to positive speeds.
    direction: Direction,

    /// How the device runs the motor.
    mode: RunMode,

    /// Encoder position from the most recent update, in ticks.
    position: Option<i32>,
}

impl Controller {
    /// Maximum speed the motor can be set to, finite values beyond this are
    /// clamped into range.
    pub const MAX_SPEED: f32 = 1f32;

    /// Minimum speed the motor can be set to, finite values beyond this are
    /// clamped into range.
    pub const MIN_SPEED: f32 = -Self::MAX_SPEED;

    /// Creates a new motor controller for a motor at the given bus address.
    #[must_use]
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            speed: 0f32,
            direction: Direction::Forward,
            mode: RunMode::RunWithoutEncoder,
            position: None,
        }
    }

    /// Sets the desired motor speed. Returns an error if `speed` is infinite
    /// or `NaN` (as checked by `f32::is_finite()`).
    pub fn set(
        &mut self,
        speed: f32,
    ) -> Result<serial::Packet<MotorHeader, MotorData>, InvalidSpeedError> {
        if !speed.is_finite() {
            return Err(InvalidSpeedError);
        }

        self.speed = speed.clamp(Self::MIN_SPEED, Self::MAX_SPEED);

        Ok(serial::Packet::new(
            MotorHeader {
                addr: self.addr,
                cmd: MotorCmd::SetSpeed,
            },
            MotorData::Speed(self.speed),
        ))
    }

    /// Sets the motor's direction. Returns `None` if the given direction is
    /// the same as current.
    #[must_use]
    pub fn set_direction(
        &mut self,
        direction: Direction,
    ) -> Option<serial::Packet<MotorHeader, MotorData>> {
        if self.direction == direction {
            return None;
        }

        self.direction = direction;

        Some(serial::Packet::new(
            MotorHeader {
                addr: self.addr,
                cmd: MotorCmd::SetDirection,
            },
            MotorData::Direction(direction as u32),
        ))
    }

    /// Sets the motor's run mode. [`RunMode::StopAndResetEncoder`] commands
    /// the device to halt the motor and zero its encoder count; callers
    /// should poll [`Controller::position`] to learn when the reset has
    /// landed.
    #[must_use]
    pub fn set_mode(&mut self, mode: RunMode) -> serial::Packet<MotorHeader, MotorData> {
        self.mode = mode;

        serial::Packet::new(
            MotorHeader {
                addr: self.addr,
                cmd: MotorCmd::SetMode,
            },
            MotorData::Mode(mode as u32),
        )
    }

    /// Caps the speed the device will spin the motor at when running with its
    /// encoder, in encoder ticks per second.
    #[must_use]
    pub fn set_max_speed(&mut self, ticks_per_sec: u32) -> serial::Packet<MotorHeader, MotorData> {
        serial::Packet::new(
            MotorHeader {
                addr: self.addr,
                cmd: MotorCmd::SetMaxSpeed,
            },
            MotorData::MaxSpeed(ticks_per_sec),
        )
    }

    /// Produces a packet asking the device to report its encoder position.
    /// The answer lands in this struct on a later [`Controller::update`].
    #[inline]
    #[must_use]
    pub fn request_position(&self) -> serial::Packet<MotorHeader, MotorData> {
        serial::Packet::new(
            MotorHeader {
                addr: self.addr,
                cmd: MotorCmd::Position,
            },
            MotorData::Position(0i32),
        )
    }

    /// Updates this struct's encoder position from packets received off the
    /// bus, taking the last relevant packet in the slice.
    pub fn update<H, D>(&mut self, packets: &[serial::Packet<H, D>]) -> &Self
    where
        H: serial::Header,
        D: serial::Data,
    {
        for p in packets {
            if let Ok(h) = MotorHeader::extract(p) {
                if h.addr != self.addr {
                    continue;
                }

                if let (MotorCmd::Position, Ok(MotorData::Position(ticks))) =
                    (h.cmd, MotorData::extract(p))
                {
                    self.position = Some(ticks);
                }
            }
        }

        self
    }

    /// Gets the motor's set speed.
    #[inline]
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Gets the motor's set direction.
    #[inline]
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Gets the motor's set run mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Gets the encoder position from the most recent update, `None` before
    /// any position has been reported.
    #[inline]
    #[must_use]
    pub fn position(&self) -> Option<i32> {
        self.position
    }
}

/// Spin direction a device applies to positive speed commands.
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Forward = 1u32,
    Reverse = 2u32,
}

/// How a motor controller device runs its motor.
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunMode {
    /// Closed speed control against the encoder.
    RunUsingEncoder = 1u32,

    /// Raw power, the encoder is ignored.
    RunWithoutEncoder = 2u32,

    /// Halt the motor and zero the encoder count.
    StopAndResetEncoder = 3u32,
}

/// Packet header for a motor controller device.
#[derive(Clone, Copy, Debug)]
pub struct MotorHeader {
    pub(crate) addr: u8,
    pub(crate) cmd: MotorCmd,
}

impl serial::Header for MotorHeader {
    fn extract<H, D>(packet: &serial::Packet<H, D>) -> serial::ExtractionResult<Self>
    where
        H: serial::Header,
        D: serial::Data,
    {
        let (addr, cmd) = packet.head.get();

        let cmd = match cmd {
            c if c == MotorCmd::SetSpeed as u8 => MotorCmd::SetSpeed,
            c if c == MotorCmd::SetDirection as u8 => MotorCmd::SetDirection,
            c if c == MotorCmd::SetMode as u8 => MotorCmd::SetMode,
            c if c == MotorCmd::SetMaxSpeed as u8 => MotorCmd::SetMaxSpeed,
            c if c == MotorCmd::Position as u8 => MotorCmd::Position,
            _ => return Err(serial::ExtractionError),
        };

        Ok(Self { addr, cmd })
    }

    fn get(&self) -> (u8, u8) {
        (self.addr, self.cmd as u8)
    }
}

/// Payload of a packet to or from a motor controller, its form depends on
/// the command in flight.
#[derive(Clone, Copy, Debug)]
pub enum MotorData {
    Speed(f32),
    Direction(u32),
    Mode(u32),
    MaxSpeed(u32),
    Position(i32),
}

impl serial::Data for MotorData {
    fn extract<H, D>(packet: &serial::Packet<H, D>) -> serial::ExtractionResult<Self>
    where
        H: serial::Header,
        D: serial::Data,
    {
        let head = MotorHeader::extract(packet)?;

        Ok(match head.cmd {
            MotorCmd::SetSpeed => Self::Speed(f32::from_bits(packet.data.get())),
            MotorCmd::SetDirection => Self::Direction(packet.data.get()),
            MotorCmd::SetMode => Self::Mode(packet.data.get()),
            MotorCmd::SetMaxSpeed => Self::MaxSpeed(packet.data.get()),
            MotorCmd::Position => Self::Position(packet.data.get() as i32),
        })
    }

    fn get(&self) -> u32 {
        match self {
            Self::Speed(v) => v.to_bits(),
            Self::Direction(v) => *v,
            Self::Mode(v) => *v,
            Self::MaxSpeed(v) => *v,
            Self::Position(v) => *v as u32,
        }
    }
}

/// Command byte of a packet to or from a motor controller.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MotorCmd {
    /// Set the speed of the motor.
    SetSpeed = 1u8,

    /// Set the direction of the motor.
    SetDirection = 2u8,

    /// Set the run mode of the motor.
    SetMode = 3u8,

    /// Cap the encoder-governed speed of the motor.
    SetMaxSpeed = 4u8,

    /// Request, or report, the motor's encoder position.
    Position = 5u8,
}

/// An invalid speed was given to the motor.
#[derive(Debug, Clone)]
pub struct InvalidSpeedError;

impl fmt::Display for InvalidSpeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid speed, must be a real decimal")
    }
}

impl Error for InvalidSpeedError {}

#[cfg(test)]
mod tests {
    use super::{Controller, Direction, MotorCmd, RunMode};
    use crate::serial::{self, Data, Header};

    #[test]
    fn speed_clamped_and_validated() {
        let mut motor = Controller::new(1u8);

        assert!(motor.set(f32::NAN).is_err());
        assert!(motor.set(f32::INFINITY).is_err());

        motor.set(2f32).unwrap();
        assert_eq!(motor.speed(), Controller::MAX_SPEED);

        motor.set(-2f32).unwrap();
        assert_eq!(motor.speed(), Controller::MIN_SPEED);

        let packet = motor.set(0.25f32).unwrap();
        assert_eq!(packet.head.get(), (1u8, MotorCmd::SetSpeed as u8));
        assert_eq!(packet.data.get(), 0.25f32.to_bits());
    }

    #[test]
    fn direction_only_sent_on_change() {
        let mut motor = Controller::new(2u8);

        // Forward is the construction state.
        assert!(motor.set_direction(Direction::Forward).is_none());
        assert!(motor.set_direction(Direction::Reverse).is_some());
        assert!(motor.set_direction(Direction::Reverse).is_none());
        assert_eq!(motor.direction(), Direction::Reverse);
    }

    #[test]
    fn position_update() {
        let mut motor = Controller::new(3u8);
        assert_eq!(motor.position(), None);

        let report = serial::Packet::new((3u8, MotorCmd::Position as u8), -240i32 as u32);
        let other = serial::Packet::new((4u8, MotorCmd::Position as u8), 99u32);

        motor.update(&[other, report]);
        assert_eq!(motor.position(), Some(-240i32));
    }

    #[test]
    fn mode_packets() {
        let mut motor = Controller::new(5u8);

        let packet = motor.set_mode(RunMode::StopAndResetEncoder);
        assert_eq!(packet.head.get(), (5u8, MotorCmd::SetMode as u8));
        assert_eq!(packet.data.get(), RunMode::StopAndResetEncoder as u32);
        assert_eq!(motor.mode(), RunMode::StopAndResetEncoder);
    }
}
