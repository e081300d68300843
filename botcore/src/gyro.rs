// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

use crate::{angle::Angle, serial};

/// Interface to the gyro on the bus. The gyro reports a clockwise heading in
/// degrees; the controller tracks the latest reading, a settable zero point,
/// and the device's calibration state.
pub struct Controller {
    /// Address of the gyro on the bus.
    addr: u8,

    /// Heading from the most recent update.
    heading: Option<Angle>,

    /// Value to be considered zero for the heading.
    heading_zero: Option<Angle>,

    /// Whether the device reported itself calibrating on the most recent
    /// update.
    calibrating: Option<bool>,
}

impl Controller {
    /// Creates a new gyro controller for a gyro at the given bus address.
    #[must_use]
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            heading: None,
            heading_zero: None,
            calibrating: None,
        }
    }

    /// Produces a packet asking the device to report its heading.
    #[inline]
    #[must_use]
    pub fn request_heading(&self) -> serial::Packet<GyroHeader, f32> {
        serial::Packet::new(
            GyroHeader {
                addr: self.addr,
                cmd: GyroCmd::Heading,
            },
            0f32,
        )
    }

    /// Produces a packet asking the device whether it is still calibrating.
    #[inline]
    #[must_use]
    pub fn request_calibrating(&self) -> serial::Packet<GyroHeader, f32> {
        serial::Packet::new(
            GyroHeader {
                addr: self.addr,
                cmd: GyroCmd::Calibrating,
            },
            0f32,
        )
    }

    /// Produces a packet commanding the device to recalibrate. The device
    /// reports calibrating until it settles; poll with
    /// [`Controller::request_calibrating`] and [`Controller::is_calibrating`].
    #[inline]
    #[must_use]
    pub fn calibrate(&mut self) -> serial::Packet<GyroHeader, f32> {
        self.calibrating = None;

        serial::Packet::new(
            GyroHeader {
                addr: self.addr,
                cmd: GyroCmd::Calibrate,
            },
            0f32,
        )
    }

    /// Updates this struct's values from packets received off the bus, taking
    /// the last relevant packet in the slice for each value.
    pub fn update<H, D>(&mut self, packets: &[serial::Packet<H, D>]) -> &Self
    where
        H: serial::Header,
        D: serial::Data,
    {
        for p in packets {
            let h = match <GyroHeader as serial::Header>::extract(p) {
                Ok(h) if h.addr == self.addr => h,
                _ => continue,
            };

            let Ok(data) = <f32 as serial::Data>::extract(p) else {
                continue;
            };

            match h.cmd {
                GyroCmd::Heading => self.heading = Some(Angle::from_degrees(data as f64)),
                GyroCmd::Calibrating => self.calibrating = Some(data != 0f32),
                GyroCmd::Calibrate => (),
            }
        }

        self
    }

    /// Sets the "zero" heading of the gyro, headings gotten after this are
    /// relative to this zero point.
    pub fn zero(&mut self) {
        self.heading_zero = self.heading;
    }

    /// Gets the gyro's heading relative to the set zero, `None` before any
    /// heading has been reported.
    #[must_use]
    pub fn heading(&self) -> Option<Angle> {
        self.heading
            .map(|a| a - self.heading_zero.unwrap_or_default())
    }

    /// Whether the device reported itself calibrating on the most recent
    /// update, `None` if it has not reported since the last calibrate
    /// command.
    #[inline]
    #[must_use]
    pub fn is_calibrating(&self) -> Option<bool> {
        self.calibrating
    }
}

/// Packet header for the gyro device.
#[derive(Clone, Copy, Debug)]
pub struct GyroHeader {
    pub(crate) addr: u8,
    pub(crate) cmd: GyroCmd,
}

impl serial::Header for GyroHeader {
    fn extract<H, D>(packet: &serial::Packet<H, D>) -> serial::ExtractionResult<Self>
    where
        H: serial::Header,
        D: serial::Data,
    {
        let (addr, cmd) = packet.head.get();

        let cmd = match cmd {
            c if c == GyroCmd::Heading as u8 => GyroCmd::Heading,
            c if c == GyroCmd::Calibrating as u8 => GyroCmd::Calibrating,
            c if c == GyroCmd::Calibrate as u8 => GyroCmd::Calibrate,
            _ => return Err(serial::ExtractionError),
        };

        Ok(Self { addr, cmd })
    }

    fn get(&self) -> (u8, u8) {
        (self.addr, self.cmd as u8)
    }
}

/// Command byte of a packet to or from the gyro.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GyroCmd {
    /// Request, or report, the heading in degrees.
    Heading = 1u8,

    /// Request, or report, whether the device is calibrating.
    Calibrating = 2u8,

    /// Command the device to recalibrate.
    Calibrate = 3u8,
}
