//! ブザータスク
//!
//! 安全調停が選んだ警報パターンと遷移チャープを音に変換します。
//! 要求はtickごとに上書きされる「最新が勝つ」方式で、ここでの再生が
//! 制御ループを待たせることはありません。

use embassy_futures::select::{select, Either};
use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Timer};

use mainboard_core::safety::Chirp;

use crate::fmt::*;
use crate::state::{BEEP_PATTERN, CHIRP};

/// トーン番号1あたりの半周期 [µs]（番号が大きいほど低い音）
const HALF_PERIOD_US: u64 = 125;

/// 指定トーンで一定時間の矩形波を出す
async fn tone(pin: &mut Output<'static>, pitch: u8, duration_ms: u64) {
    let half_period = HALF_PERIOD_US * pitch.max(1) as u64;
    let cycles = duration_ms * 1000 / (2 * half_period);
    for _ in 0..cycles {
        pin.set_high();
        Timer::after(Duration::from_micros(half_period)).await;
        pin.set_low();
        Timer::after(Duration::from_micros(half_period)).await;
    }
}

/// 遷移チャープの再生
async fn play_chirp(pin: &mut Output<'static>, chirp: Chirp) {
    match chirp {
        Chirp::MotorsEnabled => {
            // 上がる2音
            tone(pin, 6, 100).await;
            tone(pin, 4, 100).await;
        }
        Chirp::MotorsDisabled => {
            // 下がる2音
            tone(pin, 4, 100).await;
            tone(pin, 6, 100).await;
        }
        Chirp::PowerOn => {
            tone(pin, 6, 80).await;
            tone(pin, 5, 80).await;
            tone(pin, 4, 80).await;
            tone(pin, 3, 120).await;
        }
        Chirp::PowerOff => {
            tone(pin, 3, 80).await;
            tone(pin, 4, 80).await;
            tone(pin, 5, 80).await;
            tone(pin, 6, 120).await;
        }
        Chirp::LongBeep => {
            tone(pin, 5, 500).await;
        }
    }
}

/// ブザータスク
#[embassy_executor::task]
pub async fn buzzer_task(mut pin: Output<'static>) {
    info!("buzzer task started");

    loop {
        // チャープは警報パターンに割り込んで鳴る
        if let Some(chirp) = CHIRP.try_take() {
            play_chirp(&mut pin, chirp).await;
            continue;
        }

        let pattern = *BEEP_PATTERN.lock().await;
        if pattern.is_silence() {
            pin.set_low();
            // 静音中はチャープ要求かパターン再確認タイマーを待つ
            match select(CHIRP.wait(), Timer::after(Duration::from_millis(20))).await {
                Either::First(chirp) => play_chirp(&mut pin, chirp).await,
                Either::Second(_) => {}
            }
            continue;
        }

        if pattern.count > 0 {
            // N回グループのビープ、グループ間に休止
            for _ in 0..pattern.count {
                tone(&mut pin, pattern.on_time, 100).await;
                Timer::after(Duration::from_millis(100)).await;
            }
            Timer::after(Duration::from_millis(600)).await;
        } else {
            // 連続パターン: on_timeがピッチ、periodが休止の長さ
            tone(&mut pin, pattern.on_time, 80).await;
            Timer::after(Duration::from_millis(20 * pattern.period.max(1) as u64)).await;
        }
    }
}
