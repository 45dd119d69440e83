//! 制御ループタスク
//!
//! 固定5msのtickで制御コアのパイプラインを1回ずつ実行します。
//! tickの先頭で入力・フォルト・実測値のスナップショットを取り、
//! 出力（モーターコマンド、警報、フィードバック）を各コラボレータへ
//! 配布します。送信系はすべて非ブロッキングで、混雑時は破棄します。

use core::sync::atomic::Ordering;

use embassy_stm32::adc::{Adc, AnyAdcChannel};
use embassy_stm32::gpio::{Input, Output};
use embassy_stm32::peripherals::ADC1;
use embassy_time::{Duration, Instant, Ticker, Timer};

use mainboard_core::config::{timeout, TICK_PERIOD_MS};
use mainboard_core::control::{ControlLoop, TickInputs};
use mainboard_core::input::TimeoutFlags;
use mainboard_core::power::PowerButton;
use mainboard_core::safety::Chirp;

#[cfg(feature = "control-adc")]
use mainboard_core::input::{AdcProtection, ChannelType, InputCalibration};

use crate::fmt::*;
use crate::motor;
use crate::state::{
    BACKWARD_DRIVE, BEEP_PATTERN, CHIRP, FEEDBACK_FRAMES, SERIAL_FRAME_AGE, STATUS_LED,
};

/// 制御ループが読むADCチャネル一式
pub struct AdcInputs {
    #[cfg(feature = "control-adc")]
    pub steer: AnyAdcChannel<ADC1>,
    #[cfg(feature = "control-adc")]
    pub speed: AnyAdcChannel<ADC1>,
    pub battery: AnyAdcChannel<ADC1>,
    pub temp: AnyAdcChannel<ADC1>,
}

/// 一次チャネル（操舵/ブレーキ）のキャリブレーション
#[cfg(feature = "control-adc")]
const STEER_INPUT: InputCalibration = InputCalibration {
    min: 100,
    mid: 2048,
    max: 4000,
    deadband: 20,
    typ: ChannelType::Analog,
};

/// 二次チャネル（速度/スロットル）のキャリブレーション
#[cfg(feature = "control-adc")]
const SPEED_INPUT: InputCalibration = InputCalibration {
    min: 100,
    mid: 2048,
    max: 4000,
    deadband: 20,
    typ: ChannelType::Analog,
};

/// スロットルが最大位置に保持されているか（電源投入ゲート用）
#[cfg(feature = "control-adc")]
pub fn is_throttle_max(raw: i16) -> bool {
    use mainboard_core::config::gate::THROTTLE_MARGIN;
    (raw - SPEED_INPUT.max).abs() < THROTTLE_MARGIN
}

/// スロットルが最小位置まで戻されているか（電源投入ゲート用）
#[cfg(feature = "control-adc")]
pub fn is_throttle_min(raw: i16) -> bool {
    use mainboard_core::config::gate::THROTTLE_MARGIN;
    (raw - SPEED_INPUT.min).abs() < THROTTLE_MARGIN
}

/// 電源断: チャープを鳴らしてから自己保持ラッチを切る
pub async fn power_off(latch: &mut Output<'static>) -> ! {
    info!("powering off");
    CHIRP.signal(Chirp::PowerOff);
    Timer::after(Duration::from_millis(500)).await;
    latch.set_low();
    // ラッチが切れるまでの残り時間を消化する
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

/// 制御ループタスク（5ms固定tick）
#[embassy_executor::task]
pub async fn control_task(
    mut adc: Adc<'static, ADC1>,
    mut channels: AdcInputs,
    initial_bat: u16,
    initial_temp: u16,
    mut latch: Output<'static>,
    button: Input<'static>,
) {
    info!("control task started ({}ms tick)", TICK_PERIOD_MS);

    let mut control = ControlLoop::new(initial_bat, initial_temp);
    let mut power_button = PowerButton::new();
    #[cfg(feature = "control-adc")]
    let mut adc_protection = AdcProtection::new();

    let mut ticker = Ticker::every(Duration::from_millis(TICK_PERIOD_MS as u64));

    loop {
        ticker.next().await;

        // 入力チャネルのサンプリング（トランスポートはビルド時選択）
        #[cfg(feature = "control-adc")]
        let (primary, secondary, adc_timeout) = {
            let raw1 = adc.blocking_read(&mut channels.steer) as i16;
            let raw2 = adc.blocking_read(&mut channels.speed) as i16;
            let flag = adc_protection.update(
                STEER_INPUT.in_protection_window(raw1),
                SPEED_INPUT.in_protection_window(raw2),
            );
            (STEER_INPUT.sample(raw1), SPEED_INPUT.sample(raw2), flag)
        };
        #[cfg(not(feature = "control-adc"))]
        let (primary, secondary, adc_timeout) = {
            use mainboard_core::input::{ChannelSample, ChannelType};
            let cmd = *crate::state::REMOTE_COMMAND.lock().await;
            let primary = ChannelSample {
                raw: cmd.steer,
                cmd: cmd.steer.clamp(-1000, 1000),
                typ: ChannelType::Analog,
            };
            let secondary = ChannelSample {
                raw: cmd.speed,
                cmd: cmd.speed.clamp(-1000, 1000),
                typ: ChannelType::Analog,
            };
            (primary, secondary, false)
        };

        // リモコンリンクの鮮度。受信タスクが有効フレームごとに0へ戻す
        let serial_age = SERIAL_FRAME_AGE.fetch_add(1, Ordering::Relaxed);
        let serial_timeout =
            cfg!(feature = "control-serial") && serial_age >= timeout::SERIAL_TIMEOUT_TICKS;

        let (fault_left, fault_right) = motor::fault_codes();
        let (speed_left, speed_right) = motor::measured_speeds();

        let inputs = TickInputs {
            primary,
            secondary,
            timeouts: TimeoutFlags {
                // PPM/PWM/外部機器トランスポートはこの構成では未使用
                general: false,
                adc: adc_timeout,
                serial: serial_timeout,
            },
            fault_left,
            fault_right,
            speed_left,
            speed_right,
            bat_adc: adc.blocking_read(&mut channels.battery),
            temp_adc: adc.blocking_read(&mut channels.temp),
            now_ms: Instant::now().as_millis() as u32,
            status_led: STATUS_LED.load(Ordering::Relaxed),
        };

        let out = control.tick(&inputs);

        // 転流コンポーネントへ出力
        motor::set_targets(out.command, out.enable);

        // 警報とチャープ（そのtickの最新要求が勝つ）
        if let Some(beep) = out.beep {
            *BEEP_PATTERN.lock().await = beep;
        }
        if let Some(chirp) = out.chirp {
            CHIRP.signal(chirp);
        }
        BACKWARD_DRIVE.store(out.backward_drive, Ordering::Relaxed);

        // フィードバック送信。前回送信が終わっていなければ破棄
        if let Some(frame) = out.feedback {
            if FEEDBACK_FRAMES.try_send(frame).is_err() {
                trace!("feedback frame dropped, tx busy");
            }
        }

        // 電源ボタンと自律電源断
        if power_button.poll(button.is_high()) || out.power_off {
            power_off(&mut latch).await;
        }
    }
}
