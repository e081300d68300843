// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

use aprox_eq::AproxEq;
use serde::{Deserialize, Serialize};
use std::{
    f64,
    fmt::{self, Display, Formatter},
    ops::{Add, Neg, Sub},
};

/// An angle that can be constructed from and read back as either degrees or
/// radians. Angles do not preserve full turns, a 365 degree angle becomes a 5
/// degree angle, but they do preserve direction, so -90 degrees and 270
/// degrees remain distinct values.
#[derive(AproxEq, Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Angle {
    /// Signed degree measure of the angle, kept within one turn of zero.
    pub degrees: f64,
}

impl Angle {
    /// Creates a new angle from a degree measure.
    #[must_use]
    pub fn from_degrees(degrees: f64) -> Self {
        Self {
            degrees: degrees % 360f64,
        }
    }

    /// Creates a new angle from a radian measure.
    #[must_use]
    pub fn from_radians(radians: f64) -> Self {
        Self::from_degrees(radians.to_degrees())
    }

    /// Gets the degree measure of the angle.
    #[inline]
    #[must_use]
    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    /// Gets the radian measure of the angle.
    #[inline]
    #[must_use]
    pub fn radians(&self) -> f64 {
        self.degrees.to_radians()
    }
}

impl Add<Angle> for Angle {
    type Output = Self;

    fn add(self, other: Angle) -> Self {
        Self::from_degrees(self.degrees + other.degrees)
    }
}

impl Sub<Angle> for Angle {
    type Output = Self;

    fn sub(self, other: Angle) -> Self {
        Self::from_degrees(self.degrees - other.degrees)
    }
}

impl Neg for Angle {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            degrees: -self.degrees,
        }
    }
}

impl Display for Angle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees)
    }
}
