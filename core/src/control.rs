//! 周期制御ループ本体
//!
//! tickごとに固定順序でパイプラインを1回だけ実行します:
//! 入力正規化済みサンプル → 駆動モード再解釈 → レートリミッタ/ローパス →
//! モード再合成 → 減速係数 → ミキサー → 極性 → 安全調停 → フィードバック。
//! tick間で持ち越す状態はすべてこの構造体が所有し、ステージへは排他借用で
//! 渡されます（グローバル状態なし）。

use crate::brake;
use crate::config::{self, interlock, timeout, FEEDBACK_DIVIDER, RATE};
use crate::drive_mode::{DriveContext, DriveMode};
use crate::filter::{low_pass, rate_limiter, speed_blend};
use crate::fmt::*;
use crate::input::{ChannelSample, TimeoutFlags};
use crate::mixer::{self, MotorCommandPair};
use crate::monitor::{BatteryMonitor, BoardTempMonitor};
use crate::protocol::FeedbackFrame;
use crate::safety::{self, BeepPattern, Chirp, SafetyInputs};

/// 外部コラボレータから毎tick供給される値のスナップショット。
/// タイムアウトフラグとフォルトコードは取得側が非同期に更新するため、
/// tickの先頭で一度だけ読み取った値を渡すこと。
#[derive(Debug, Clone, Copy)]
pub struct TickInputs {
    /// 一次チャネル（操舵/ブレーキ）
    pub primary: ChannelSample,
    /// 二次チャネル（速度/スロットル）
    pub secondary: ChannelSample,
    /// 入力トランスポートのタイムアウトフラグ
    pub timeouts: TimeoutFlags,
    /// 左モーターのフォルトコード（0 = 正常）
    pub fault_left: u8,
    /// 右モーターのフォルトコード（0 = 正常）
    pub fault_right: u8,
    /// 左モーターの実測速度 [rpm]
    pub speed_left: i16,
    /// 右モーターの実測速度 [rpm]
    pub speed_right: i16,
    /// バッテリー電圧のADC生値
    pub bat_adc: u16,
    /// 基板温度のADC生値
    pub temp_adc: u16,
    /// 単調増加タイムスタンプ [ms]
    pub now_ms: u32,
    /// フィードバックに載せるLED/ステータスバイト
    pub status_led: u8,
}

/// 1 tickの出力。MotorCommandPairはこのtick限りで消費されます。
#[derive(Debug)]
pub struct TickOutputs {
    /// 極性適用済みの最終モーターコマンド
    pub command: MotorCommandPair,
    /// モーター有効フラグ（転流コンポーネントへ渡す）
    pub enable: bool,
    /// 警報パターン（Noneは前回パターン維持）
    pub beep: Option<BeepPattern>,
    /// 有効/無効遷移などの短いチャープ
    pub chirp: Option<Chirp>,
    /// 自律電源断の要求
    pub power_off: bool,
    /// 後退走行フラグ（外部から観測可能）
    pub backward_drive: bool,
    /// このtickで送信すべきフィードバックフレーム
    pub feedback: Option<FeedbackFrame>,
}

/// 制御ループの持ち越し状態。
pub struct ControlLoop {
    mode: DriveMode,
    /// 操舵チャネルのレートリミッタ状態 fixdt(1,16,4)
    steer_rate: i16,
    /// 速度チャネルのレートリミッタ状態 fixdt(1,16,4)
    speed_rate: i16,
    /// 操舵チャネルのローパス蓄積値 (Q16)
    steer_acc: i32,
    /// 速度チャネルのローパス蓄積値 (Q16)
    speed_acc: i32,
    /// 減速係数 [%]、高温/低電圧時に減少するのみ
    slow_down_coeff: u8,
    enable: bool,
    battery: BatteryMonitor,
    temp: BoardTempMonitor,
    inactivity_ticks: u32,
    tick_count: u32,
}

impl ControlLoop {
    /// 起動時のADC変換値でモニタのフィルタを初期化して生成。
    pub fn new(bat_adc: u16, temp_adc: u16) -> Self {
        Self {
            mode: DriveMode::new(config::DRIVE_VARIANT),
            steer_rate: 0,
            speed_rate: 0,
            steer_acc: 0,
            speed_acc: 0,
            slow_down_coeff: 100,
            enable: false,
            battery: BatteryMonitor::new(bat_adc),
            temp: BoardTempMonitor::new(temp_adc),
            inactivity_ticks: 0,
            tick_count: 0,
        }
    }

    /// 現在の減速係数 [%]
    pub fn slow_down_coeff(&self) -> u8 {
        self.slow_down_coeff
    }

    pub fn is_enabled(&self) -> bool {
        self.enable
    }

    /// 減速要求: 係数を1ずつ0まで下げる。復帰は再起動のみ。
    fn slow_down(&mut self) {
        self.slow_down_coeff = self.slow_down_coeff.saturating_sub(1);
    }

    /// 有効化インターロック: フォルトなし・両コマンドがデッドバンド内の
    /// ときのみ許可。成功時はフィルタ蓄積値をクリアします。
    fn try_enable(&mut self, inputs: &TickInputs) -> Option<Chirp> {
        if self.enable {
            return None;
        }
        if !safety::transition_permitted(
            inputs.fault_left,
            inputs.fault_right,
            inputs.primary.cmd,
            inputs.secondary.cmd,
        ) {
            return None;
        }
        self.steer_rate = 0;
        self.speed_rate = 0;
        self.steer_acc = 0;
        self.speed_acc = 0;
        self.enable = true;
        info!("motors enabled");
        Some(Chirp::MotorsEnabled)
    }

    /// 無効化インターロック（操作起因の遷移用）。フォルト起因の強制無効化は
    /// 安全調停が担当します。
    pub fn try_disable(&mut self, inputs: &TickInputs) -> Option<Chirp> {
        if !self.enable {
            return None;
        }
        if !safety::transition_permitted(
            inputs.fault_left,
            inputs.fault_right,
            inputs.primary.cmd,
            inputs.secondary.cmd,
        ) {
            return None;
        }
        self.enable = false;
        info!("motors disabled");
        Some(Chirp::MotorsDisabled)
    }

    /// 1 tickぶんのパイプラインを実行。
    pub fn tick(&mut self, inputs: &TickInputs) -> TickOutputs {
        self.tick_count = self.tick_count.wrapping_add(1);

        let mut primary = inputs.primary;
        let mut secondary = inputs.secondary;

        // 平均実測速度（右モーターは鏡映なので差をとる）
        let speed_avg = ((inputs.speed_left as i32 - inputs.speed_right as i32) / 2) as i16;
        let speed_avg_abs = speed_avg.abs();
        let blend = speed_blend(speed_avg_abs);

        // 監視系の更新（蓄積値はこの呼び出しでのみ変化する）
        let temp_deci_c = self.temp.update(inputs.temp_adc);
        let bat_voltage = self.battery.update(inputs.bat_adc);

        // 自動有効化（入力がほぼゼロのときだけ成立する）
        let chirp = self.try_enable(inputs);

        // 駆動モードによるチャネル再解釈
        let ctx = DriveContext {
            speed_avg,
            speed_avg_abs,
            blend,
            now_ms: inputs.now_ms,
        };
        self.mode.reinterpret(&mut primary, &mut secondary, &ctx);

        // 整形: レートリミッタ → ローパス → 整数へ変換
        rate_limiter(primary.cmd, RATE, &mut self.steer_rate);
        rate_limiter(secondary.cmd, RATE, &mut self.speed_rate);
        low_pass((self.steer_rate >> 4) as i32, config::FILTER, &mut self.steer_acc);
        low_pass((self.speed_rate >> 4) as i32, config::FILTER, &mut self.speed_acc);
        let mut steer = (self.steer_acc >> 16) as i16;
        let mut speed = (self.speed_acc >> 16) as i16;

        // モードによる再合成（ツーペダルの前後進ミキシング）
        self.mode.recombine(&mut steer, &mut speed);

        // 高温/低電圧による減速係数
        speed = ((speed as i32) * self.slow_down_coeff as i32 / 100) as i16;

        // 電動ブレーキ段（フィルタ後の速度コマンドに適用）
        if config::ELECTRIC_BRAKE_ENABLE {
            brake::electric_brake(&mut speed, blend, speed_avg, self.mode.reverse_latched());
        }

        // ミキサーと出力極性
        let command = mixer::mix(speed, steer);
        let output = mixer::apply_polarity(command);

        // 安全調停（優先順位表）
        let verdict = safety::evaluate(&SafetyInputs {
            fault_left: inputs.fault_left,
            fault_right: inputs.fault_right,
            timeouts: inputs.timeouts,
            temp_deci_c,
            battery: self.battery.level(),
            speed_avg,
            speed_avg_abs,
            shaped_speed: speed,
            reverse_latched: self.mode.reverse_latched(),
        });
        if verdict.slow_down {
            self.slow_down();
        }
        if verdict.disable_motors {
            self.enable = false;
        }
        let mut power_off = verdict.power_off;

        // 無操作タイムアウト
        if command.left.abs() > interlock::INACTIVITY_DEADBAND
            || command.right.abs() > interlock::INACTIVITY_DEADBAND
        {
            self.inactivity_ticks = 0;
        } else {
            self.inactivity_ticks += 1;
        }
        if self.inactivity_ticks > timeout::INACTIVITY_TICKS {
            info!("inactivity timeout, powering off");
            power_off = true;
        }

        // フィードバックフレーム（分周したtickのみ）
        let feedback = if self.tick_count % FEEDBACK_DIVIDER == 0 {
            Some(FeedbackFrame {
                cmd1: primary.cmd,
                cmd2: secondary.cmd,
                speed_r_meas: inputs.speed_right,
                speed_l_meas: inputs.speed_left,
                bat_voltage,
                board_temp: temp_deci_c,
                cmd_led: inputs.status_led as u16,
            })
        } else {
            None
        };

        TickOutputs {
            command: output,
            enable: self.enable,
            beep: verdict.beep,
            chirp,
            power_off,
            backward_drive: verdict.backward_drive,
            feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ChannelType;

    const BAT_NOMINAL_ADC: u16 = 1492; // ~39.7V pack
    const TEMP_NOMINAL_ADC: u16 = 1700; // ~27°C board

    fn analog(cmd: i16) -> ChannelSample {
        ChannelSample {
            raw: 2048,
            cmd,
            typ: ChannelType::Analog,
        }
    }

    fn idle_inputs() -> TickInputs {
        TickInputs {
            primary: analog(0),
            secondary: analog(0),
            timeouts: TimeoutFlags::default(),
            fault_left: 0,
            fault_right: 0,
            speed_left: 0,
            speed_right: 0,
            bat_adc: BAT_NOMINAL_ADC,
            temp_adc: TEMP_NOMINAL_ADC,
            now_ms: 0,
            status_led: 0,
        }
    }

    fn nominal_loop() -> ControlLoop {
        ControlLoop::new(BAT_NOMINAL_ADC, TEMP_NOMINAL_ADC)
    }

    #[test]
    fn test_enables_on_first_idle_tick() {
        let mut cl = nominal_loop();
        let out = cl.tick(&idle_inputs());
        assert!(out.enable);
        assert_eq!(out.chirp, Some(Chirp::MotorsEnabled));
        // Second tick: no repeated chirp
        let out = cl.tick(&idle_inputs());
        assert_eq!(out.chirp, None);
    }

    #[test]
    fn test_enable_blocked_while_command_applied() {
        let mut cl = nominal_loop();
        let mut inputs = idle_inputs();
        inputs.secondary = analog(400);
        let out = cl.tick(&inputs);
        assert!(!out.enable);
        // Once the throttle is released the interlock opens
        let out = cl.tick(&idle_inputs());
        assert!(out.enable);
    }

    #[test]
    fn test_enable_blocked_by_fault() {
        let mut cl = nominal_loop();
        let mut inputs = idle_inputs();
        inputs.fault_right = 2;
        let out = cl.tick(&inputs);
        assert!(!out.enable);
    }

    #[test]
    fn test_straight_drive_converges_to_equal_commands() {
        let mut cl = nominal_loop();
        cl.tick(&idle_inputs());

        let mut inputs = idle_inputs();
        inputs.secondary = analog(600);
        let mut out = cl.tick(&inputs);
        for _ in 0..400 {
            out = cl.tick(&inputs);
        }
        // Ks = 1.0: both motors get the same nonzero command (to within the
        // low-pass truncation), mirrored by the output polarity
        assert!((598..=600).contains(&out.command.left), "left = {}", out.command.left);
        assert_eq!(out.command.right, -out.command.left);
        assert!(out.enable);
    }

    #[test]
    fn test_shaping_limits_step_change() {
        let mut cl = nominal_loop();
        cl.tick(&idle_inputs());

        let mut inputs = idle_inputs();
        inputs.secondary = analog(1000);
        let out = cl.tick(&inputs);
        // One tick after a full-scale step the command is still tiny:
        // rate limit allows 30/tick and the low-pass trails behind
        assert!(out.command.left.abs() < 30);
    }

    #[test]
    fn test_filters_reset_on_reenable() {
        let mut cl = nominal_loop();
        cl.tick(&idle_inputs());
        let mut inputs = idle_inputs();
        inputs.secondary = analog(600);
        for _ in 0..400 {
            cl.tick(&inputs);
        }

        // Fault forces the motors off
        let mut faulted = inputs;
        faulted.fault_left = 1;
        let out = cl.tick(&faulted);
        assert!(!out.enable);
        assert_eq!(out.beep, Some(BeepPattern::MOTOR_FAULT));

        // Fault cleared and sticks released: re-enable resets the filters
        let out = cl.tick(&idle_inputs());
        assert!(out.enable);
        assert_eq!(out.chirp, Some(Chirp::MotorsEnabled));
        assert!(out.command.left.abs() < 30);
    }

    #[test]
    fn test_dead_battery_at_standstill_powers_off_immediately() {
        // Filter is seeded with the dead-battery reading, so the very next
        // tick must power off no matter what else is flagged
        let mut cl = ControlLoop::new(1200, TEMP_NOMINAL_ADC);
        let mut inputs = idle_inputs();
        inputs.bat_adc = 1200;
        inputs.fault_left = 1;
        inputs.timeouts.serial = true;
        let out = cl.tick(&inputs);
        assert!(out.power_off);
    }

    #[test]
    fn test_overtemp_derates_while_moving() {
        let mut cl = nominal_loop();
        cl.tick(&idle_inputs());

        let mut inputs = idle_inputs();
        inputs.secondary = analog(600);
        for _ in 0..400 {
            cl.tick(&inputs);
        }

        // Board overheats while the vehicle is rolling
        let mut hot = inputs;
        hot.temp_adc = 1500; // past the power-off calibration point
        hot.speed_left = 100;
        hot.speed_right = -100;
        let mut out = cl.tick(&hot);
        // Let the temperature filter settle past the threshold
        for _ in 0..600 {
            out = cl.tick(&hot);
        }
        assert!(!out.power_off);
        assert!(cl.slow_down_coeff() < 100);
        // Derating scales the command down
        assert!(out.command.left < 600);

        // The coefficient keeps falling to its floor and never recovers
        for _ in 0..200 {
            cl.tick(&hot);
        }
        assert_eq!(cl.slow_down_coeff(), 0);
        let out = cl.tick(&hot);
        assert_eq!(out.command.left, 0);
    }

    #[test]
    fn test_overtemp_at_standstill_powers_off() {
        let mut cl = ControlLoop::new(BAT_NOMINAL_ADC, 1500);
        let mut inputs = idle_inputs();
        inputs.temp_adc = 1500;
        let out = cl.tick(&inputs);
        assert!(out.power_off);
    }

    #[test]
    fn test_inactivity_poweroff_at_exactly_n_plus_one() {
        let mut cl = nominal_loop();
        let inputs = idle_inputs();
        // The counter tolerates N quiet ticks...
        for _ in 0..timeout::INACTIVITY_TICKS {
            let out = cl.tick(&inputs);
            assert!(!out.power_off);
        }
        // ...and fires on tick N + 1
        let out = cl.tick(&inputs);
        assert!(out.power_off);
    }

    #[test]
    fn test_activity_resets_inactivity_counter() {
        let mut cl = nominal_loop();
        cl.tick(&idle_inputs());
        for _ in 0..timeout::INACTIVITY_TICKS - 100 {
            cl.tick(&idle_inputs());
        }
        // Drive for long enough that the shaped command leaves the deadband
        let mut driving = idle_inputs();
        driving.secondary = analog(600);
        for _ in 0..100 {
            cl.tick(&driving);
        }
        // The quiet counter starts over
        let out = cl.tick(&idle_inputs());
        assert!(!out.power_off);
    }

    #[test]
    fn test_feedback_emitted_every_other_tick() {
        let mut cl = nominal_loop();
        let out1 = cl.tick(&idle_inputs());
        let out2 = cl.tick(&idle_inputs());
        let out3 = cl.tick(&idle_inputs());
        assert!(out1.feedback.is_none());
        assert!(out2.feedback.is_some());
        assert!(out3.feedback.is_none());
    }

    #[test]
    fn test_feedback_echoes_measurements() {
        let mut cl = nominal_loop();
        cl.tick(&idle_inputs());
        let mut inputs = idle_inputs();
        inputs.speed_left = 123;
        inputs.speed_right = -121;
        inputs.status_led = 0x05;
        let out = cl.tick(&inputs);
        let frame = out.feedback.expect("divider tick");
        assert_eq!(frame.speed_l_meas, 123);
        assert_eq!(frame.speed_r_meas, -121);
        assert_eq!(frame.cmd_led, 0x05);
        // Battery voltage is reported calibrated (about 39.7V here)
        assert!((3900..4050).contains(&(frame.bat_voltage as i32)));
    }

    #[test]
    fn test_serial_timeout_beeps_but_keeps_running() {
        let mut cl = nominal_loop();
        cl.tick(&idle_inputs());
        let mut inputs = idle_inputs();
        inputs.timeouts.serial = true;
        let out = cl.tick(&inputs);
        assert_eq!(out.beep, Some(BeepPattern::SERIAL_TIMEOUT));
        assert!(out.enable);
        assert!(!out.power_off);
    }

    #[test]
    fn test_try_disable_interlock() {
        let mut cl = nominal_loop();
        cl.tick(&idle_inputs());
        assert!(cl.is_enabled());

        // Disable refused while a command is applied
        let mut inputs = idle_inputs();
        inputs.secondary = analog(400);
        assert_eq!(cl.try_disable(&inputs), None);
        assert!(cl.is_enabled());

        // Permitted at idle
        assert_eq!(cl.try_disable(&idle_inputs()), Some(Chirp::MotorsDisabled));
        assert!(!cl.is_enabled());
    }
}
