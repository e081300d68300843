// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

use crate::serial;

/// Interface to an analog optical distance sensor on the bus. The device
/// reports the fraction of emitted light detected, between zero and one, and
/// the controller keeps an ambient baseline captured at init so readings can
/// be judged against the room rather than absolute darkness.
pub struct Controller {
    /// Address of the sensor on the bus.
    addr: u8,

    /// Light level from the most recent update.
    light: Option<f32>,

    /// Ambient light level captured by `set_ambient`.
    ambient: Option<f32>,
}

impl Controller {
    /// Creates a new optical distance sensor controller for a sensor at the
    /// given bus address.
    #[must_use]
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            light: None,
            ambient: None,
        }
    }

    /// Produces a packet asking the device to report its light level.
    #[inline]
    #[must_use]
    pub fn request_light(&self) -> serial::Packet<OdsHeader, f32> {
        serial::Packet::new(
            OdsHeader {
                addr: self.addr,
                cmd: OdsCmd::LightLevel,
            },
            0f32,
        )
    }

    /// Updates this struct's light level from packets received off the bus,
    /// taking the last relevant packet in the slice.
    pub fn update<H, D>(&mut self, packets: &[serial::Packet<H, D>]) -> &Self
    where
        H: serial::Header,
        D: serial::Data,
    {
        for p in packets {
            if let Ok(h) = <OdsHeader as serial::Header>::extract(p) {
                if h.addr != self.addr {
                    continue;
                }

                if let Ok(level) = <f32 as serial::Data>::extract(p) {
                    self.light = Some(level.clamp(0f32, 1f32));
                }
            }
        }

        self
    }

    /// Records the current light level as the ambient baseline. Call once at
    /// init, before anything bright is in front of the sensor.
    pub fn set_ambient(&mut self) {
        self.ambient = self.light;
    }

    /// Gets the light level from the most recent update, `None` before any
    /// reading has been reported.
    #[inline]
    #[must_use]
    pub fn light_detected(&self) -> Option<f32> {
        self.light
    }

    /// Gets the light level relative to the ambient baseline. `None` until
    /// both a reading and a baseline exist.
    #[must_use]
    pub fn above_ambient(&self) -> Option<f32> {
        match (self.light, self.ambient) {
            (Some(light), Some(ambient)) => Some(light - ambient),
            _ => None,
        }
    }
}

/// Packet header for an optical distance sensor device.
#[derive(Clone, Copy, Debug)]
pub struct OdsHeader {
    pub(crate) addr: u8,
    pub(crate) cmd: OdsCmd,
}

impl serial::Header for OdsHeader {
    fn extract<H, D>(packet: &serial::Packet<H, D>) -> serial::ExtractionResult<Self>
    where
        H: serial::Header,
        D: serial::Data,
    {
        match packet.head.get() {
            (addr, c) if c == OdsCmd::LightLevel as u8 => Ok(Self {
                addr,
                cmd: OdsCmd::LightLevel,
            }),

            _ => Err(serial::ExtractionError),
        }
    }

    fn get(&self) -> (u8, u8) {
        (self.addr, self.cmd as u8)
    }
}

/// Command byte of a packet to or from an optical distance sensor.
#[repr(u8)]
#[derive(Clone, Copy, Debug)]
pub enum OdsCmd {
    /// Request, or report, the detected light level.
    LightLevel = 1u8,
}

#[cfg(test)]
mod tests {
    use super::{Controller, OdsCmd};
    use crate::serial;
    use aprox_eq::assert_aprox_eq;

    #[test]
    fn reading_and_baseline() {
        let mut ods = Controller::new(8u8);
        assert!(ods.light_detected().is_none());
        assert!(ods.above_ambient().is_none());

        ods.update(&[serial::Packet::new(
            (8u8, OdsCmd::LightLevel as u8),
            0.1f32,
        )]);
        ods.set_ambient();

        ods.update(&[serial::Packet::new(
            (8u8, OdsCmd::LightLevel as u8),
            0.35f32,
        )]);

        assert_aprox_eq!(ods.light_detected().unwrap(), 0.35f32);
        assert_aprox_eq!(ods.above_ambient().unwrap(), 0.25f32);
    }

    #[test]
    fn reading_clamped() {
        let mut ods = Controller::new(8u8);

        ods.update(&[serial::Packet::new(
            (8u8, OdsCmd::LightLevel as u8),
            1.5f32,
        )]);
        assert_aprox_eq!(ods.light_detected().unwrap(), 1f32);
    }
}
