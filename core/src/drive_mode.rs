// Drive-mode variant logic. Exactly one variant is active in a deployment
// (selected once at startup from `config::DRIVE_VARIANT`); it reinterprets
// the two normalized channels before shaping and may recombine them after
// filtering. The tow-behind follower replaces this pipeline entirely, see
// `follower`.

use crate::config::{multiple_tap, two_pedal};
use crate::filter::apply_blend;
use crate::fmt::*;
use crate::input::{ChannelSample, ChannelType};

/// Build-time drive variant selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VariantKind {
    /// Primary = steer, secondary = speed, passed through unchanged
    Differential,
    /// Brake + throttle pedals, steering disabled (hovercar)
    TwoPedal,
    /// Single throttle with regen braking on negative input (board)
    SingleThrottle,
    /// Tow-behind follower; runs its own closed loop instead of the
    /// shaping pipeline (`follower::FollowerLoop`)
    Follower,
}

impl VariantKind {
    /// Whether the variant runs the standard shaping pipeline.
    pub fn uses_pipeline(&self) -> bool {
        !matches!(self, VariantKind::Follower)
    }
}

/// Per-tick context shared with the variant logic.
#[derive(Debug, Clone, Copy)]
pub struct DriveContext {
    /// Average measured speed, signed [rpm]
    pub speed_avg: i16,
    /// Average measured speed magnitude [rpm]
    pub speed_avg_abs: i16,
    /// Speed blend factor, fixdt(0,16,15)
    pub blend: u16,
    /// Monotonic timestamp for tap windows [ms]
    pub now_ms: u32,
}

/// Repeated-brief-activation detector used to toggle the forward/reverse
/// intent on the brake pedal.
#[derive(Debug, Default)]
pub struct MultipleTap {
    hysteresis: bool,
    tap_count: u8,
    last_edge_ms: u32,
    /// Reverse intent latch, toggled on every completed tap sequence
    pub latched: bool,
}

impl MultipleTap {
    pub const fn new() -> Self {
        Self {
            hysteresis: false,
            tap_count: 0,
            last_edge_ms: 0,
            latched: false,
        }
    }

    /// Feed this tick's command value; edges above HI count as taps, the
    /// count resets when the window elapses without completing.
    pub fn update(&mut self, cmd: i16, now_ms: u32) {
        // An expired window discards the partial sequence before the next
        // edge can count toward it
        if self.tap_count > 0 && now_ms.wrapping_sub(self.last_edge_ms) > multiple_tap::TIMEOUT_MS {
            self.tap_count = 0;
        }

        if cmd > multiple_tap::HI && !self.hysteresis {
            self.hysteresis = true;
            self.tap_count += 1;
            self.last_edge_ms = now_ms;
        } else if cmd < multiple_tap::LO && self.hysteresis {
            self.hysteresis = false;
        }

        if self.tap_count >= multiple_tap::NR {
            self.latched = !self.latched;
            self.tap_count = 0;
            info!("direction latch toggled: reverse={}", self.latched);
        }
    }
}

/// State of the two-pedal variant.
#[derive(Debug, Default)]
pub struct TwoPedalState {
    pub tap: MultipleTap,
    reverse_hold_ticks: u16,
    forward_hold_ticks: u16,
}

impl TwoPedalState {
    pub const fn new() -> Self {
        Self {
            tap: MultipleTap::new(),
            reverse_hold_ticks: 0,
            forward_hold_ticks: 0,
        }
    }

    fn reinterpret(&mut self, primary: &mut ChannelSample, secondary: &mut ChannelSample, ctx: &DriveContext) {
        // Low-speed-only features: brake-kills-throttle, tap detection and
        // the held direction switch.
        if ctx.speed_avg_abs < two_pedal::STANDSTILL_SPEED_THRESHOLD
            && primary.typ == ChannelType::Analog
        {
            self.tap.update(primary.cmd, ctx.now_ms);

            if primary.cmd > two_pedal::BRAKE_THRESHOLD {
                // Brake pressed: kill the throttle pedal to rule out
                // double-pedal driving, fading out as the vehicle moves
                secondary.cmd = apply_blend(secondary.cmd, ctx.blend);
            }

            self.poll_direction_switch(primary.raw);
        }

        // The brake must oppose the direction of motion and reach 0 at
        // standstill, otherwise the brake pedal could drive in reverse.
        primary.cmd = if ctx.speed_avg > 0 {
            apply_blend(-primary.cmd, ctx.blend)
        } else {
            apply_blend(primary.cmd, ctx.blend)
        };
    }

    fn poll_direction_switch(&mut self, raw: i16) {
        let near = |level: i16| (raw - level).abs() < two_pedal::SWITCH_LEVEL_MARGIN;

        if near(two_pedal::REVERSE_ADC_LEVEL) {
            if self.reverse_hold_ticks >= two_pedal::SWITCH_HOLD_TICKS {
                self.tap.latched = true;
            } else {
                self.reverse_hold_ticks += 1;
            }
        } else {
            self.reverse_hold_ticks = 0;
        }

        if near(two_pedal::FORWARD_ADC_LEVEL) {
            if self.forward_hold_ticks >= two_pedal::SWITCH_HOLD_TICKS {
                self.tap.latched = false;
            } else {
                self.forward_hold_ticks += 1;
            }
        } else {
            self.forward_hold_ticks = 0;
        }
    }

    fn recombine(&self, steer: &mut i16, speed: &mut i16) {
        // Here steer carries the (sign-corrected) brake and speed the
        // throttle; mix them into one longitudinal command.
        if !self.tap.latched {
            *speed = steer.saturating_add(*speed);
        } else {
            *speed = (*steer as i32 - *speed as i32).clamp(
                -(two_pedal::REVERSE_SPEED_LIMIT as i32),
                two_pedal::REVERSE_SPEED_LIMIT as i32,
            ) as i16;
        }
        // Steering stays disabled in this mode
        *steer = 0;
    }
}

/// Active drive variant with its per-variant state.
#[derive(Debug)]
pub enum DriveMode {
    Differential,
    TwoPedal(TwoPedalState),
    SingleThrottle,
}

impl DriveMode {
    pub fn new(kind: VariantKind) -> Self {
        match kind {
            VariantKind::TwoPedal => DriveMode::TwoPedal(TwoPedalState::new()),
            VariantKind::SingleThrottle => DriveMode::SingleThrottle,
            // The follower never reaches the pipeline; keep pass-through
            // semantics if it does get constructed.
            VariantKind::Differential | VariantKind::Follower => DriveMode::Differential,
        }
    }

    /// Reassign channel meaning before the shaping filters run.
    pub fn reinterpret(
        &mut self,
        primary: &mut ChannelSample,
        secondary: &mut ChannelSample,
        ctx: &DriveContext,
    ) {
        match self {
            DriveMode::Differential => {}
            DriveMode::TwoPedal(state) => state.reinterpret(primary, secondary, ctx),
            DriveMode::SingleThrottle => {
                // Negative throttle acts as a brake: oppose the direction of
                // motion and fade to zero at standstill
                if secondary.cmd < 0 {
                    secondary.cmd = if ctx.speed_avg > 0 {
                        apply_blend(secondary.cmd, ctx.blend)
                    } else {
                        apply_blend(-secondary.cmd, ctx.blend)
                    };
                }
            }
        }
    }

    /// Recombine the shaped channels after filtering (two-pedal only).
    pub fn recombine(&self, steer: &mut i16, speed: &mut i16) {
        if let DriveMode::TwoPedal(state) = self {
            state.recombine(steer, speed);
        }
    }

    /// Reverse intent latch, if the variant has one.
    pub fn reverse_latched(&self) -> bool {
        match self {
            DriveMode::TwoPedal(state) => state.tap.latched,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analog(raw: i16, cmd: i16) -> ChannelSample {
        ChannelSample {
            raw,
            cmd,
            typ: ChannelType::Analog,
        }
    }

    fn ctx(speed_avg: i16, blend: u16) -> DriveContext {
        DriveContext {
            speed_avg,
            speed_avg_abs: speed_avg.abs(),
            blend,
            now_ms: 0,
        }
    }

    #[test]
    fn test_differential_passes_through() {
        let mut mode = DriveMode::new(VariantKind::Differential);
        let mut primary = analog(3000, 400);
        let mut secondary = analog(3000, -250);
        mode.reinterpret(&mut primary, &mut secondary, &ctx(20, 0));
        assert_eq!(primary.cmd, 400);
        assert_eq!(secondary.cmd, -250);
    }

    #[test]
    fn test_two_pedal_brake_kills_throttle_at_standstill() {
        let mut mode = DriveMode::new(VariantKind::TwoPedal);
        // Brake just past the threshold while stopped: blend = 0, full kill
        let mut brake = analog(2000, two_pedal::BRAKE_THRESHOLD + 1);
        let mut throttle = analog(3000, 800);
        mode.reinterpret(&mut brake, &mut throttle, &ctx(0, 0));
        assert_eq!(throttle.cmd, 0);
    }

    #[test]
    fn test_two_pedal_override_fades_out_when_moving() {
        let mut mode = DriveMode::new(VariantKind::TwoPedal);
        // Above the standstill threshold the low-speed block is skipped
        // entirely: throttle passes through untouched (blend = 1 behavior)
        let mut brake = analog(2000, two_pedal::BRAKE_THRESHOLD + 1);
        let mut throttle = analog(3000, 800);
        mode.reinterpret(
            &mut brake,
            &mut throttle,
            &ctx(two_pedal::STANDSTILL_SPEED_THRESHOLD, 32768),
        );
        assert_eq!(throttle.cmd, 800);
    }

    #[test]
    fn test_two_pedal_brake_opposes_motion() {
        let mut mode = DriveMode::new(VariantKind::TwoPedal);
        // Moving forward with full blend: brake command flips sign
        let mut brake = analog(2000, 500);
        let mut throttle = analog(100, 0);
        mode.reinterpret(&mut brake, &mut throttle, &ctx(100, 32768));
        assert_eq!(brake.cmd, -500);
        // At standstill the blend is 0: no reverse driving from the brake
        let mut brake = analog(2000, 500);
        mode.reinterpret(&mut brake, &mut throttle, &ctx(0, 0));
        assert_eq!(brake.cmd, 0);
    }

    #[test]
    fn test_two_pedal_recombine_forward_and_reverse() {
        let mut mode = DriveMode::new(VariantKind::TwoPedal);

        let (mut steer, mut speed) = (-100i16, 600i16);
        mode.recombine(&mut steer, &mut speed);
        assert_eq!(speed, 500);
        assert_eq!(steer, 0);

        if let DriveMode::TwoPedal(state) = &mut mode {
            state.tap.latched = true;
        }
        let (mut steer, mut speed) = (0i16, 600i16);
        mode.recombine(&mut steer, &mut speed);
        // Reverse is clamped to the reverse speed limit
        assert_eq!(speed, -two_pedal::REVERSE_SPEED_LIMIT);
        assert_eq!(steer, 0);
    }

    #[test]
    fn test_double_tap_toggles_latch() {
        let mut tap = MultipleTap::new();
        assert!(!tap.latched);
        tap.update(700, 0); // first tap
        tap.update(100, 10); // release
        tap.update(700, 20); // second tap
        assert!(tap.latched);
        tap.update(100, 30);
        tap.update(700, 40);
        tap.update(100, 50);
        tap.update(700, 60);
        assert!(!tap.latched);
    }

    #[test]
    fn test_tap_window_expires() {
        let mut tap = MultipleTap::new();
        tap.update(700, 0);
        tap.update(100, 10);
        // Second tap arrives after the window: sequence restarts
        tap.update(700, multiple_tap::TIMEOUT_MS + 100);
        assert!(!tap.latched);
        tap.update(100, multiple_tap::TIMEOUT_MS + 110);
        tap.update(700, multiple_tap::TIMEOUT_MS + 120);
        assert!(tap.latched);
    }

    #[test]
    fn test_held_switch_flips_latch_after_delay() {
        let mut mode = DriveMode::new(VariantKind::TwoPedal);
        let mut throttle = analog(100, 0);
        for _ in 0..=two_pedal::SWITCH_HOLD_TICKS {
            let mut brake = analog(two_pedal::REVERSE_ADC_LEVEL, 0);
            mode.reinterpret(&mut brake, &mut throttle, &ctx(0, 0));
        }
        assert!(mode.reverse_latched());
        for _ in 0..=two_pedal::SWITCH_HOLD_TICKS {
            let mut brake = analog(two_pedal::FORWARD_ADC_LEVEL, 0);
            mode.reinterpret(&mut brake, &mut throttle, &ctx(0, 0));
        }
        assert!(!mode.reverse_latched());
    }

    #[test]
    fn test_single_throttle_regen_brake() {
        let mut mode = DriveMode::new(VariantKind::SingleThrottle);

        // Braking while rolling forward: scaled, still negative
        let mut primary = analog(2048, 0);
        let mut throttle = analog(1000, -600);
        mode.reinterpret(&mut primary, &mut throttle, &ctx(40, 16384));
        assert_eq!(throttle.cmd, -300);

        // Braking while rolling backward: opposes motion (positive)
        let mut throttle = analog(1000, -600);
        mode.reinterpret(&mut primary, &mut throttle, &ctx(-40, 16384));
        assert_eq!(throttle.cmd, 300);

        // At standstill the brake fades to zero: no reverse takeoff
        let mut throttle = analog(1000, -600);
        mode.reinterpret(&mut primary, &mut throttle, &ctx(0, 0));
        assert_eq!(throttle.cmd, 0);

        // Positive throttle untouched
        let mut throttle = analog(3000, 500);
        mode.reinterpret(&mut primary, &mut throttle, &ctx(0, 0));
        assert_eq!(throttle.cmd, 500);
    }
}
