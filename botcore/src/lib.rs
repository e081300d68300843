// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

pub mod angle;
pub mod bot;
pub mod color;
pub mod gyro;
pub mod mecanum;
pub mod motor;
pub mod ods;
pub mod serial;
pub mod servo;
