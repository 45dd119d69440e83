//! Power-on gate. The stock firmware busy-waits on the power button during
//! boot; here the same sequence is a state machine polled at a fixed period
//! before the periodic control loop starts, so timing is uniform and the
//! whole gate is testable without hardware delays.
//!
//! Calibration entry (keylock): hold the throttle at maximum, toggle the
//! power button twice within the check window, then hold it past the long
//! hold time. The gate only guards entry/exit and the idle timeout; the
//! calibration procedure itself is performed by the input acquisition layer.

use crate::config::gate;
use crate::fmt::*;

/// Event emitted by one gate poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GateEvent {
    /// Still working through the sequence
    Pending,
    /// Hand over to the periodic control loop
    NormalRun,
    /// Start the (external) input calibration procedure
    EnterCalibration,
    /// Short press inside the calibration window: power down
    PowerOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    /// Button still held from switch-on
    BootButtonHeld { held: u16 },
    /// Released after a short press; waiting for press `n + 1`
    TapWait { taps: u8, idle: u16 },
    /// Button held during tap counting
    TapHeld { taps: u8, held: u16 },
    /// Two short taps seen: waiting for the long hold
    CalibWindow { idle: u16 },
    /// Button held inside the calibration window
    CalibHeld { held: u16 },
    /// Long hold complete: waiting for the throttle to be released
    ThrottleRelease,
}

/// Polled power-on sequencer.
#[derive(Debug)]
pub struct PowerOnGate {
    state: GateState,
}

impl PowerOnGate {
    pub const fn new() -> Self {
        Self {
            state: GateState::BootButtonHeld { held: 0 },
        }
    }

    /// Advance the gate by one poll period.
    ///
    /// # Arguments
    /// * `button` - Power button currently pressed
    /// * `throttle_max` - Throttle held at its calibrated maximum
    /// * `throttle_min` - Throttle released to its calibrated minimum
    pub fn poll(&mut self, button: bool, throttle_max: bool, throttle_min: bool) -> GateEvent {
        match self.state {
            GateState::BootButtonHeld { held } => {
                if button {
                    self.state = GateState::BootButtonHeld {
                        held: held.saturating_add(1),
                    };
                } else if throttle_max && held < gate::KEYLOCK_CHECK_POLLS {
                    // First short press counted toward the keylock sequence
                    self.state = GateState::TapWait { taps: 1, idle: 0 };
                } else {
                    return GateEvent::NormalRun;
                }
                GateEvent::Pending
            }
            GateState::TapWait { taps, idle } => {
                if button {
                    self.state = GateState::TapHeld { taps, held: 0 };
                } else if idle >= gate::KEYLOCK_CHECK_POLLS {
                    return GateEvent::NormalRun;
                } else {
                    self.state = GateState::TapWait {
                        taps,
                        idle: idle + 1,
                    };
                }
                GateEvent::Pending
            }
            GateState::TapHeld { taps, held } => {
                if button {
                    if held >= gate::KEYLOCK_CHECK_POLLS {
                        return GateEvent::NormalRun;
                    }
                    self.state = GateState::TapHeld {
                        taps,
                        held: held + 1,
                    };
                } else if !throttle_max {
                    return GateEvent::NormalRun;
                } else if taps + 1 >= 2 {
                    info!("keylock sequence complete, calibration window open");
                    self.state = GateState::CalibWindow { idle: 0 };
                } else {
                    self.state = GateState::TapWait {
                        taps: taps + 1,
                        idle: 0,
                    };
                }
                GateEvent::Pending
            }
            GateState::CalibWindow { idle } => {
                if button {
                    self.state = GateState::CalibHeld { held: 0 };
                } else if idle >= gate::CALIBRATE_IDLE_TIMEOUT_POLLS {
                    info!("calibration window timed out");
                    return GateEvent::NormalRun;
                } else {
                    self.state = GateState::CalibWindow { idle: idle + 1 };
                }
                GateEvent::Pending
            }
            GateState::CalibHeld { held } => {
                if button {
                    self.state = GateState::CalibHeld {
                        held: held.saturating_add(1),
                    };
                } else if held >= gate::CALIBRATE_HOLD_POLLS {
                    self.state = GateState::ThrottleRelease;
                } else if held > gate::PWR_BTN_DEBOUNCE_POLLS {
                    // A debounced short press inside the window powers off
                    return GateEvent::PowerOff;
                } else {
                    self.state = GateState::CalibWindow { idle: 0 };
                }
                GateEvent::Pending
            }
            GateState::ThrottleRelease => {
                if throttle_min {
                    return GateEvent::EnterCalibration;
                }
                GateEvent::Pending
            }
        }
    }
}

/// Debounced power-button check used during normal run: returns true once
/// the button has been held past the debounce window and released again.
#[derive(Debug, Default)]
pub struct PowerButton {
    held: u16,
}

impl PowerButton {
    pub const fn new() -> Self {
        Self { held: 0 }
    }

    pub fn poll(&mut self, pressed: bool) -> bool {
        if pressed {
            self.held = self.held.saturating_add(1);
            false
        } else {
            let was_held = self.held > gate::PWR_BTN_DEBOUNCE_POLLS;
            self.held = 0;
            was_held
        }
    }
}
