// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

use crate::angle::Angle;
use aprox_eq::AproxEq;
use serde::{Deserialize, Serialize};
use std::f64;

/// The roller angle of the left front wheel.
const LF_ANG: Angle = Angle { degrees: 45f64 };

/// The roller angle of the right front wheel.
const RF_ANG: Angle = Angle { degrees: 315f64 };

/// The roller angle of the left rear wheel.
const LR_ANG: Angle = Angle { degrees: 135f64 };

/// The roller angle of the right rear wheel.
const RR_ANG: Angle = Angle { degrees: 225f64 };

/// Fraction of the commanded spin power that is actually applied to the
/// wheels. Spin commands of lesser magnitude than this are ignored entirely.
pub const MAX_SPIN_RATE: f64 = 0.6;

/// Translation powers of lesser magnitude than this are treated as zero so
/// that a sloppy stick center can never creep the robot.
pub const TRANSLATION_DEADBAND: f64 = 0.1;

/// A single frame of drive train output, one power per wheel, each within
/// `[-1, 1]`.
#[derive(AproxEq, Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct WheelSpeeds {
    pub lf: f64,
    pub rf: f64,
    pub lr: f64,
    pub rr: f64,
}

impl WheelSpeeds {
    /// Gets the wheel speeds as an array ordered left front, right front,
    /// left rear, right rear.
    #[inline]
    #[must_use]
    pub fn to_array(self) -> [f64; 4] {
        [self.lf, self.rf, self.lr, self.rr]
    }
}

/// Resolves a motion command into four wheel powers.
///
/// The translation component is projected onto each wheel's roller angle,
/// rotated by `heading` so that the commanded direction stays fixed relative
/// to the heading's frame of reference rather than the robot's. Translation
/// below [`TRANSLATION_DEADBAND`] is zeroed per axis, spin is scaled by
/// [`MAX_SPIN_RATE`] and ignored below it, and the final powers are
/// normalized by the largest power magnitude (floored at one) so that no
/// wheel is ever commanded past full power.
///
/// # Arguments
///
/// * `x` - The translation power along the x axis, between -1 and 1.
/// * `y` - The translation power along the y axis, between -1 and 1.
/// * `spin` - Rotation power, between -1 and 1, positive is clockwise.
/// * `heading` - Angle to rotate the translation by, usually a gyro reading
///   plus any caller supplied offset.
#[must_use]
pub fn calc_drive(x: f64, y: f64, spin: f64, heading: Angle) -> WheelSpeeds {
    let x = match x.abs() < TRANSLATION_DEADBAND {
        true => 0f64,
        false => x,
    };

    let y = match y.abs() < TRANSLATION_DEADBAND {
        true => 0f64,
        false => y,
    };

    let reduced_spin = match spin.abs() < MAX_SPIN_RATE {
        true => 0f64,
        false => spin * MAX_SPIN_RATE,
    };

    let wheel_power = |roller: Angle| -> f64 {
        let a = (roller + heading).radians();
        (x * a.cos() + y * a.sin()) / f64::consts::SQRT_2 + reduced_spin
    };

    let mut speeds = WheelSpeeds {
        lf: wheel_power(LF_ANG),
        rf: wheel_power(RF_ANG),
        lr: wheel_power(LR_ANG),
        rr: wheel_power(RR_ANG),
    };

    let max_power = speeds
        .to_array()
        .iter()
        .fold(1f64, |m, s| m.max(s.abs()));

    speeds.lf /= max_power;
    speeds.rf /= max_power;
    speeds.lr /= max_power;
    speeds.rr /= max_power;

    speeds
}

#[cfg(test)]
mod tests {
    use super::{calc_drive, MAX_SPIN_RATE, TRANSLATION_DEADBAND};
    use crate::angle::Angle;
    use aprox_eq::assert_aprox_eq;

    #[test]
    fn forward_drive() {
        let mut y = TRANSLATION_DEADBAND;

        while y <= 1f64 {
            let speeds = calc_drive(0f64, y, 0f64, Angle::default());

            // Wheels on the same side agree, sides oppose, and no power is
            // lost to normalization below saturation.
            assert_aprox_eq!(speeds.lf, speeds.lr);
            assert_aprox_eq!(speeds.rf, speeds.rr);
            assert_aprox_eq!(speeds.lf, -speeds.rf);
            assert_aprox_eq!(speeds.lf, y / 2f64);

            y += 0.1f64;
        }
    }

    #[test]
    fn heading_rotates_translation() {
        // Driving x with a 270 degree heading is the same motion as driving y
        // with none.
        let rotated = calc_drive(1f64, 0f64, 0f64, Angle::from_degrees(270f64));
        let forward = calc_drive(0f64, 1f64, 0f64, Angle::default());

        assert_aprox_eq!(rotated, forward);
    }

    #[test]
    fn heading_does_not_rotate_spin() {
        let a = calc_drive(0f64, 0f64, 1f64, Angle::default());
        let b = calc_drive(0f64, 0f64, 1f64, Angle::from_degrees(120f64));

        assert_aprox_eq!(a, b);
        assert_aprox_eq!(a.lf, MAX_SPIN_RATE);
    }

    #[test]
    fn translation_deadband() {
        let speeds = calc_drive(0.09f64, -0.09f64, 0f64, Angle::default());

        assert_aprox_eq!(speeds.lf, 0f64);
        assert_aprox_eq!(speeds.rf, 0f64);
        assert_aprox_eq!(speeds.lr, 0f64);
        assert_aprox_eq!(speeds.rr, 0f64);
    }

    #[test]
    fn spin_gate() {
        // Below the spin gate the spin contributes nothing at all.
        let gated = calc_drive(0f64, 0f64, MAX_SPIN_RATE - 0.01f64, Angle::default());
        assert_aprox_eq!(gated.lf, 0f64);
        assert_aprox_eq!(gated.rr, 0f64);

        // At and above it the reduced spin applies to every wheel equally.
        let spinning = calc_drive(0f64, 0f64, 0.8f64, Angle::default());
        assert_aprox_eq!(spinning.lf, 0.8f64 * MAX_SPIN_RATE);
        assert_aprox_eq!(spinning.lf, spinning.rf);
        assert_aprox_eq!(spinning.lr, spinning.rr);
        assert_aprox_eq!(spinning.lf, spinning.rr);
    }

    #[test]
    fn normalization_saturates_at_one() {
        let speeds = calc_drive(0f64, 1f64, 1f64, Angle::default());

        // The strongest wheel hits exactly full power, all others scale with
        // it.
        assert_aprox_eq!(speeds.lf, 1f64);
        assert_aprox_eq!(speeds.lr, 1f64);
        assert_aprox_eq!(speeds.rf, 0.1f64 / 1.1f64);
    }

    #[test]
    fn never_exceeds_one() {
        let mut x = -1f64;

        while x <= 1f64 {
            let mut y = -1f64;

            while y <= 1f64 {
                let mut spin = -1f64;

                while spin <= 1f64 {
                    let mut heading = 0f64;

                    while heading < 360f64 {
                        let speeds =
                            calc_drive(x, y, spin, Angle::from_degrees(heading));

                        for s in speeds.to_array() {
                            assert!(s <= 1f64);
                            assert!(s >= -1f64);
                        }

                        heading += 45f64;
                    }

                    spin += 0.25f64;
                }

                y += 0.125f64;
            }

            x += 0.125f64;
        }
    }

    #[test]
    fn zero_command_is_zero_output() {
        let speeds = calc_drive(0f64, 0f64, 0f64, Angle::from_degrees(77f64));

        for s in speeds.to_array() {
            assert_aprox_eq!(s, 0f64);
        }
    }
}
