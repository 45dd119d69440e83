//! Tow-behind follower variant. Replaces the speed/steer pipeline with a
//! closed tracking loop: the primary channel carries a measured distance to
//! the towed target, the secondary a measured angle, and the loop drives the
//! platform to hold a set distance. Has its own emergency behaviors (stop
//! when the error collapses, power off when the target runs away) and is
//! driven by an external ranging sensor through the same channel interface.

use crate::config::follower;
use crate::fmt::*;
use crate::safety::Chirp;

/// Raw ranging span expected on the primary channel
const DISTANCE_RAW_MAX: i32 = 4095;
/// Offset of the ranging sensor zero point
const DISTANCE_RAW_OFFSET: i32 = 180;
/// Angle midpoint of the secondary channel
const ANGLE_RAW_MID: f32 = 2048.0;

/// Output of one follower step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowerOutput {
    pub cmd_left: i16,
    pub cmd_right: i16,
    pub enable: bool,
    pub power_off: bool,
    pub chirp: Option<Chirp>,
}

/// Closed-loop follower state.
#[derive(Debug)]
pub struct FollowerLoop {
    /// Commanded set distance [m]
    set_distance_m: f32,
    cmd_left: f32,
    cmd_right: f32,
    last_distance: i32,
    enabled: bool,
}

impl FollowerLoop {
    pub fn new(set_distance_m: f32) -> Self {
        Self {
            set_distance_m,
            cmd_left: 0.0,
            cmd_right: 0.0,
            last_distance: 0,
            enabled: false,
        }
    }

    /// Run one tracking step.
    ///
    /// # Arguments
    /// * `distance_raw` - Primary channel command (ranging distance)
    /// * `angle_raw` - Secondary channel command (target bearing)
    /// * `general_timeout` - Ranging transport silent
    pub fn step(&mut self, distance_raw: i16, angle_raw: i16, general_timeout: bool) -> FollowerOutput {
        if general_timeout {
            // Sensor silent: freeze in place and wait for reacquisition
            self.cmd_left = 0.0;
            self.cmd_right = 0.0;
            self.enabled = false;
            return FollowerOutput {
                cmd_left: 0,
                cmd_right: 0,
                enable: false,
                power_off: false,
                chirp: None,
            };
        }

        let distance = (distance_raw as i32 - DISTANCE_RAW_OFFSET).clamp(0, DISTANCE_RAW_MAX);
        let steering = (angle_raw as f32 - ANGLE_RAW_MID) / ANGLE_RAW_MID;
        let distance_err = (distance as f32 - self.set_distance_m * follower::COUNTS_PER_M) as i32;

        // Steering authority grows with the distance error but never drops
        // below a floor, so the platform can still turn in place
        let turn = steering * (distance_err.abs().max(50) as f32) * follower::ROT_P;

        let correction_l =
            (distance_err as f32 + turn).clamp(-follower::CORRECTION_LIMIT, follower::CORRECTION_LIMIT);
        let correction_r =
            (distance_err as f32 - turn).clamp(-follower::CORRECTION_LIMIT, follower::CORRECTION_LIMIT);

        self.cmd_left = self.cmd_left * follower::KEEP + correction_l * -follower::GAIN;
        self.cmd_right = self.cmd_right * follower::KEEP + correction_r * -follower::GAIN;

        if distance_err > 0 {
            self.enabled = true;
        }
        if distance_err <= follower::STOP_ERR {
            // Target close enough: stop driving entirely
            self.enabled = false;
        }

        // Target out of range on two consecutive measurements: emergency off
        let out_of_range = |d: i32| {
            d as f32 / follower::COUNTS_PER_M - self.set_distance_m > follower::OUT_OF_RANGE_M
        };
        let runaway = out_of_range(distance) && out_of_range(self.last_distance);
        self.last_distance = distance;

        if runaway {
            error!("follower target out of range, emergency off");
            self.enabled = false;
            return FollowerOutput {
                cmd_left: 0,
                cmd_right: 0,
                enable: false,
                power_off: true,
                chirp: Some(Chirp::LongBeep),
            };
        }

        FollowerOutput {
            cmd_left: self.cmd_left as i16,
            cmd_right: self.cmd_right as i16,
            enable: self.enabled,
            power_off: false,
            chirp: None,
        }
    }
}
