// Fixed-point filter primitives for the per-tick command shaping pipeline.
// Integer arithmetic only: the target MCU has no FPU and the control loop
// must stay deterministic.

/// Rate limiter on a fixdt(1,16,4) accumulator.
///
/// Moves `state` toward `target << 4` by at most `rate` per call and never
/// overshoots. The accumulator keeps 4 fractional bits so rates below one
/// command unit per tick are representable.
///
/// # Arguments
/// * `target` - Commanded value in the normalized -1000..1000 range
/// * `rate` - Maximum step per call, fixdt(1,16,4) (480 = 30 units/tick)
/// * `state` - Caller-owned accumulator, fixdt(1,16,4)
///
/// # Returns
/// The updated accumulator value (fixdt(1,16,4))
pub fn rate_limiter(target: i16, rate: i16, state: &mut i16) -> i16 {
    let delta = ((target as i32) << 4) - (*state as i32);
    let step = delta.clamp(-(rate as i32), rate as i32);
    *state = (*state as i32 + step) as i16;
    *state
}

/// Single-pole IIR low-pass filter on a Q16 accumulator.
///
/// `acc += ((input << 16) - acc) * coef >> 16`, evaluated with 64-bit
/// intermediates so the multiply cannot overflow for any coefficient in
/// fixdt(0,16,16). A coefficient closer to 0 gives a slower response;
/// 65535 passes the input through almost unfiltered.
///
/// # Arguments
/// * `input` - Input sample (integer part; the accumulator carries Q16)
/// * `coef` - Filter coefficient, fixdt(0,16,16)
/// * `acc` - Caller-owned accumulator, input range shifted left by 16
pub fn low_pass(input: i32, coef: u16, acc: &mut i32) {
    let delta = ((input as i64) << 16) - (*acc as i64);
    *acc = (*acc as i64 + ((delta * coef as i64) >> 16)) as i32;
}

/// Speed blend factor in fixdt(0,16,15): 0 at standstill, 1.0 (32768) once
/// the average measured speed reaches the high ramp threshold.
///
/// Used to fade out features that only make sense near standstill (brake
/// pedal override, regen braking) as the vehicle picks up speed.
pub fn speed_blend(speed_avg_abs: i16) -> u16 {
    use crate::config::blend::{HIGH_RPM, LOW_RPM};
    let clamped = speed_avg_abs.clamp(LOW_RPM, HIGH_RPM) as i32;
    (((clamped - LOW_RPM as i32) << 15) / (HIGH_RPM - LOW_RPM) as i32) as u16
}

/// Scale a command by a fixdt(0,16,15) blend factor.
#[inline]
pub fn apply_blend(cmd: i16, blend: u16) -> i16 {
    ((cmd as i32 * blend as i32) >> 15) as i16
}
