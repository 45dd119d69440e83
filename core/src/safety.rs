//! Safety arbitration: fault codes, communication timeouts, temperature and
//! battery limits are evaluated once per tick in fixed priority order. The
//! first matching rule decides the audible alert and any override; later
//! rules are not consulted.

use crate::config::{interlock, temperature, BEEPS_BACKWARD};
use crate::input::TimeoutFlags;
use crate::monitor::BatteryLevel;

/// One audible alert request for the buzzer collaborator:
/// `count` tones of `on_time` duration every `period` (in buzzer ticks).
/// `count == 0` with a nonzero `on_time` selects a continuous pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BeepPattern {
    pub count: u8,
    pub on_time: u8,
    pub period: u8,
}

impl BeepPattern {
    pub const SILENCE: Self = Self::new(0, 0, 0);
    /// 1 beep, low pitch: motor fault, motors disabled
    pub const MOTOR_FAULT: Self = Self::new(1, 24, 1);
    /// 2 beeps, low pitch: ADC timeout
    pub const ADC_TIMEOUT: Self = Self::new(2, 24, 1);
    /// 3 beeps, low pitch: serial link timeout
    pub const SERIAL_TIMEOUT: Self = Self::new(3, 24, 1);
    /// 4 beeps, low pitch: general input timeout (PPM, PWM, accessory)
    pub const GENERAL_TIMEOUT: Self = Self::new(4, 24, 1);
    /// 5 beeps, low pitch: board temperature warning
    pub const TEMP_WARNING: Self = Self::new(5, 24, 1);
    /// fast beep, medium pitch: battery warning level 1
    pub const BAT_LVL1: Self = Self::new(0, 10, 6);
    /// slow beep, medium pitch: battery warning level 2
    pub const BAT_LVL2: Self = Self::new(0, 10, 30);
    /// fast beep, high pitch: driving backward
    pub const BACKWARD: Self = Self::new(0, 5, 1);

    pub const fn new(count: u8, on_time: u8, period: u8) -> Self {
        Self {
            count,
            on_time,
            period,
        }
    }

    pub const fn is_silence(&self) -> bool {
        self.count == 0 && self.on_time == 0
    }
}

/// Short transition chirp, distinct from the alert patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Chirp {
    MotorsEnabled,
    MotorsDisabled,
    PowerOn,
    PowerOff,
    LongBeep,
}

/// Per-tick snapshot fed into the arbitration.
#[derive(Debug, Clone, Copy)]
pub struct SafetyInputs {
    pub fault_left: u8,
    pub fault_right: u8,
    pub timeouts: TimeoutFlags,
    /// Filtered board temperature [0.1°C]
    pub temp_deci_c: i16,
    /// Battery warning ladder classification
    pub battery: BatteryLevel,
    /// Average measured speed, signed [rpm]
    pub speed_avg: i16,
    /// Average measured speed magnitude [rpm]
    pub speed_avg_abs: i16,
    /// Shaped speed command after derating
    pub shaped_speed: i16,
    /// Reverse intent latch of the active drive variant
    pub reverse_latched: bool,
}

/// Outcome of one arbitration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SafetyVerdict {
    pub beep: Option<BeepPattern>,
    /// Emergency power-off this tick (only issued near standstill)
    pub power_off: bool,
    /// Decrement the derating coefficient instead of stopping abruptly
    pub slow_down: bool,
    /// Force both motors off until the condition clears
    pub disable_motors: bool,
    /// Externally observable backward-driving flag
    pub backward_drive: bool,
}

/// Evaluate the priority table. First true condition wins. The verdict is
/// derived fresh every tick; nothing in here is persisted.
pub fn evaluate(s: &SafetyInputs) -> SafetyVerdict {
    let mut v = SafetyVerdict::default();

    let stop_or_derate = |v: &mut SafetyVerdict| {
        if s.speed_avg_abs < interlock::POWEROFF_SPEED_THRESHOLD {
            v.power_off = true;
        } else {
            v.slow_down = true;
        }
    };

    if temperature::POWEROFF_ENABLE && s.temp_deci_c >= temperature::POWEROFF_DECI_C {
        // 1. Over-temperature: power off before the board burns, but
        // never with the vehicle still moving
        stop_or_derate(&mut v);
    } else if s.battery == BatteryLevel::Dead {
        // 2. Battery below the operating limit: same policy
        stop_or_derate(&mut v);
    } else if s.fault_left != 0 || s.fault_right != 0 {
        // 3. Motor fault: force-disable, recoverable if it clears
        v.disable_motors = true;
        v.beep = Some(BeepPattern::MOTOR_FAULT);
    } else if s.timeouts.adc {
        v.beep = Some(BeepPattern::ADC_TIMEOUT);
    } else if s.timeouts.serial {
        v.beep = Some(BeepPattern::SERIAL_TIMEOUT);
    } else if s.timeouts.general {
        v.beep = Some(BeepPattern::GENERAL_TIMEOUT);
    } else if temperature::WARNING_ENABLE && s.temp_deci_c >= temperature::WARNING_DECI_C {
        v.beep = Some(BeepPattern::TEMP_WARNING);
    } else if s.battery == BatteryLevel::Warn1 {
        v.beep = Some(BeepPattern::BAT_LVL1);
    } else if s.battery == BatteryLevel::Warn2 {
        v.beep = Some(BeepPattern::BAT_LVL2);
    } else if BEEPS_BACKWARD
        && ((s.shaped_speed < -interlock::COMMAND_DEADBAND && s.speed_avg < 0)
            || s.reverse_latched)
    {
        v.beep = Some(BeepPattern::BACKWARD);
        v.backward_drive = true;
    } else {
        v.beep = Some(BeepPattern::SILENCE);
    }

    v
}

/// Enable/disable interlock: transitions in either direction are permitted
/// only with both fault codes clear and both commands inside the deadband,
/// so no torque step can occur on the transition.
pub fn transition_permitted(fault_left: u8, fault_right: u8, cmd1: i16, cmd2: i16) -> bool {
    fault_left == 0
        && fault_right == 0
        && cmd1.abs() < interlock::COMMAND_DEADBAND
        && cmd2.abs() < interlock::COMMAND_DEADBAND
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nominal() -> SafetyInputs {
        SafetyInputs {
            fault_left: 0,
            fault_right: 0,
            timeouts: TimeoutFlags::default(),
            temp_deci_c: 300,
            battery: BatteryLevel::Ok,
            speed_avg: 0,
            speed_avg_abs: 0,
            shaped_speed: 0,
            reverse_latched: false,
        }
    }

    #[test]
    fn test_nominal_is_silent() {
        let v = evaluate(&nominal());
        assert_eq!(v.beep, Some(BeepPattern::SILENCE));
        assert!(!v.power_off && !v.slow_down && !v.disable_motors && !v.backward_drive);
    }

    #[test]
    fn test_overtemp_powers_off_only_at_standstill() {
        let mut s = nominal();
        s.temp_deci_c = temperature::POWEROFF_DECI_C;

        s.speed_avg_abs = 0;
        let v = evaluate(&s);
        assert!(v.power_off);
        assert!(!v.slow_down);

        s.speed_avg_abs = 100;
        let v = evaluate(&s);
        assert!(!v.power_off);
        assert!(v.slow_down);
    }

    #[test]
    fn test_dead_battery_powers_off_regardless_of_other_flags() {
        let mut s = nominal();
        s.battery = BatteryLevel::Dead;
        s.speed_avg_abs = 0;
        // Other flags set at the same time must not shadow the power-off
        s.fault_left = 3;
        s.timeouts.serial = true;
        let v = evaluate(&s);
        assert!(v.power_off);
        assert!(!v.disable_motors);
    }

    #[test]
    fn test_temperature_outranks_motor_fault() {
        // Moving + over-temperature + fault: the temperature rule fires
        // first, so the action is slow-down, not fault-disable
        let mut s = nominal();
        s.temp_deci_c = temperature::POWEROFF_DECI_C;
        s.speed_avg_abs = 100;
        s.fault_left = 1;
        let v = evaluate(&s);
        assert!(v.slow_down);
        assert!(!v.disable_motors);
        assert_eq!(v.beep, None);
    }

    #[test]
    fn test_fault_disables_motors() {
        let mut s = nominal();
        s.fault_right = 4;
        let v = evaluate(&s);
        assert!(v.disable_motors);
        assert_eq!(v.beep, Some(BeepPattern::MOTOR_FAULT));
    }

    #[test]
    fn test_priority_order_of_every_alert_pair() {
        // Build the conditions in priority order; for each adjacent pair,
        // asserting both yields the higher-priority beep
        type Setter = fn(&mut SafetyInputs);
        let ladder: [(Setter, BeepPattern); 7] = [
            (|s| s.fault_left = 1, BeepPattern::MOTOR_FAULT),
            (|s| s.timeouts.adc = true, BeepPattern::ADC_TIMEOUT),
            (|s| s.timeouts.serial = true, BeepPattern::SERIAL_TIMEOUT),
            (|s| s.timeouts.general = true, BeepPattern::GENERAL_TIMEOUT),
            (
                |s| s.temp_deci_c = temperature::WARNING_DECI_C,
                BeepPattern::TEMP_WARNING,
            ),
            (|s| s.battery = BatteryLevel::Warn1, BeepPattern::BAT_LVL1),
            (|s| s.battery = BatteryLevel::Warn2, BeepPattern::BAT_LVL2),
        ];

        for hi in 0..ladder.len() {
            for lo in hi + 1..ladder.len() {
                let mut s = nominal();
                (ladder[lo].0)(&mut s);
                (ladder[hi].0)(&mut s);
                let v = evaluate(&s);
                assert_eq!(
                    v.beep,
                    Some(ladder[hi].1),
                    "priority {} vs {} mismatch",
                    hi,
                    lo
                );
            }
        }
    }

    #[test]
    fn test_backward_drive_flag() {
        let mut s = nominal();
        s.shaped_speed = -200;
        s.speed_avg = -20;
        let v = evaluate(&s);
        assert!(v.backward_drive);
        assert_eq!(v.beep, Some(BeepPattern::BACKWARD));

        // Latch alone is enough, even before the vehicle moves
        let mut s = nominal();
        s.reverse_latched = true;
        let v = evaluate(&s);
        assert!(v.backward_drive);

        // Cleared again on a quiet tick
        let v = evaluate(&nominal());
        assert!(!v.backward_drive);
    }

    #[test]
    fn test_transition_interlock() {
        assert!(transition_permitted(0, 0, 0, 0));
        assert!(transition_permitted(0, 0, 49, -49));
        assert!(!transition_permitted(0, 0, 50, 0));
        assert!(!transition_permitted(0, 0, 0, -50));
        assert!(!transition_permitted(1, 0, 0, 0));
        assert!(!transition_permitted(0, 2, 0, 0));
    }
}
