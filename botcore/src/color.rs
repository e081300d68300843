// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

use crate::serial::{self, Header};

/// Interface to an RGB color sensor on the bus, used to read the lit color of
/// a beacon. The device reports channel values and takes an LED command; the
/// LED stays off for beacon work since the beacon emits its own light.
pub struct Controller {
    /// Address of the sensor on the bus.
    addr: u8,

    /// Channel values from the most recent update.
    rgb: Option<RgbValue>,

    /// Whether the device's LED is commanded on.
    led: bool,
}

impl Controller {
    /// Least channel value that counts as actually seeing a color rather
    /// than sensor noise.
    pub const MIN_COLOR_VALUE: u8 = 2u8;

    /// Creates a new color sensor controller for a sensor at the given bus
    /// address. The device powers up with its LED on.
    #[must_use]
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            rgb: None,
            led: true,
        }
    }

    /// Produces a packet asking the device to report its channel values.
    #[inline]
    #[must_use]
    pub fn request_rgb(&self) -> serial::Packet<ColorHeader, u32> {
        serial::Packet::new(
            ColorHeader {
                addr: self.addr,
                cmd: ColorCmd::ReadRgb,
            },
            0u32,
        )
    }

    /// Turns the device's LED on or off. Returns `None` if the LED is
    /// already in the given state.
    #[must_use]
    pub fn set_led(&mut self, on: bool) -> Option<serial::Packet<ColorHeader, u32>> {
        if self.led == on {
            return None;
        }

        self.led = on;

        Some(serial::Packet::new(
            ColorHeader {
                addr: self.addr,
                cmd: ColorCmd::SetLed,
            },
            on as u32,
        ))
    }

    /// Updates this struct's channel values from packets received off the
    /// bus, taking the last relevant packet in the slice.
    pub fn update<H, D>(&mut self, packets: &[serial::Packet<H, D>]) -> &Self
    where
        H: serial::Header,
        D: serial::Data,
    {
        for p in packets {
            if let Ok(h) = ColorHeader::extract(p) {
                if h.addr != self.addr || h.cmd != ColorCmd::ReadRgb {
                    continue;
                }

                self.rgb = Some(RgbValue::from(p.data.get()));
            }
        }

        self
    }

    /// Gets the channel values from the most recent update, `None` before
    /// any reading has been reported.
    #[inline]
    #[must_use]
    pub fn rgb(&self) -> Option<RgbValue> {
        self.rgb
    }

    /// Whether the device's LED is commanded on.
    #[inline]
    #[must_use]
    pub fn led(&self) -> bool {
        self.led
    }

    /// Classifies the most recent reading as a beacon color. A side must
    /// reach [`Controller::MIN_COLOR_VALUE`] and beat the opposing channel to
    /// count; anything else is [`Beacon::Unknown`].
    #[must_use]
    pub fn beacon(&self) -> Option<Beacon> {
        self.rgb.map(|rgb| {
            if rgb.r >= Self::MIN_COLOR_VALUE && rgb.r > rgb.b {
                Beacon::Red
            } else if rgb.b >= Self::MIN_COLOR_VALUE && rgb.b > rgb.r {
                Beacon::Blue
            } else {
                Beacon::Unknown
            }
        })
    }
}

/// The lit color of a beacon side as judged by the color sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Beacon {
    Red,
    Blue,

    /// Neither channel was convincingly lit.
    Unknown,
}

/// An RGB reading as reported by the sensor, one byte per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgbValue {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbValue {
    /// Creates a new `RgbValue` from the given channel values.
    #[must_use]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<u32> for RgbValue {
    fn from(value: u32) -> Self {
        Self {
            r: (value >> (u8::BITS * 2)) as u8,
            g: (value >> u8::BITS) as u8,
            b: value as u8,
        }
    }
}

impl From<RgbValue> for u32 {
    fn from(value: RgbValue) -> Self {
        ((value.r as u32) << (u8::BITS * 2)) | ((value.g as u32) << u8::BITS) | value.b as u32
    }
}

/// Packet header for a color sensor device.
#[derive(Clone, Copy, Debug)]
pub struct ColorHeader {
    pub(crate) addr: u8,
    pub(crate) cmd: ColorCmd,
}

impl serial::Header for ColorHeader {
    fn extract<H, D>(packet: &serial::Packet<H, D>) -> serial::ExtractionResult<Self>
    where
        H: serial::Header,
        D: serial::Data,
    {
        let (addr, cmd) = packet.head.get();

        let cmd = match cmd {
            c if c == ColorCmd::ReadRgb as u8 => ColorCmd::ReadRgb,
            c if c == ColorCmd::SetLed as u8 => ColorCmd::SetLed,
            _ => return Err(serial::ExtractionError),
        };

        Ok(Self { addr, cmd })
    }

    fn get(&self) -> (u8, u8) {
        (self.addr, self.cmd as u8)
    }
}

/// Command byte of a packet to or from a color sensor.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ColorCmd {
    /// Request, or report, the RGB channel values.
    ReadRgb = 1u8,

    /// Turn the device's LED on or off.
    SetLed = 2u8,
}

#[cfg(test)]
mod tests {
    use super::{Beacon, ColorCmd, Controller, RgbValue};
    use crate::serial;

    #[test]
    fn rgb_wire_form() {
        let rgb = RgbValue::new(12u8, 34u8, 56u8);
        assert_eq!(RgbValue::from(u32::from(rgb)), rgb);
    }

    #[test]
    fn led_only_sent_on_change() {
        let mut color = Controller::new(10u8);

        // The LED is on at power up.
        assert!(color.set_led(true).is_none());

        let packet = color.set_led(false).unwrap();
        assert_eq!(packet.data, 0u32);
        assert_eq!(packet.head.addr, 10u8);
        assert!(!color.led());
        assert!(color.set_led(false).is_none());
    }

    #[test]
    fn beacon_classification() {
        let mut color = Controller::new(10u8);
        assert!(color.beacon().is_none());

        let cases = [
            (RgbValue::new(6u8, 0u8, 1u8), Beacon::Red),
            (RgbValue::new(1u8, 0u8, 5u8), Beacon::Blue),
            // Noise floor, both channels under the threshold.
            (RgbValue::new(1u8, 0u8, 1u8), Beacon::Unknown),
            // Lit but ambiguous.
            (RgbValue::new(4u8, 0u8, 4u8), Beacon::Unknown),
        ];

        for (rgb, expected) in cases {
            color.update(&[serial::Packet::new(
                (10u8, ColorCmd::ReadRgb as u8),
                u32::from(rgb),
            )]);

            assert_eq!(color.beacon(), Some(expected));
        }
    }
}
