#![no_std]
#![no_main]

mod fmt;
mod hardware;
mod motor;
mod state;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use core::sync::atomic::Ordering;

use embassy_executor::Spawner;
use embassy_stm32::{
    adc::{Adc, AdcChannel, SampleTime},
    gpio::{Input, Level, Output, Pull, Speed},
    usart::{self, Uart},
};
use embassy_time::{Duration, Timer};

use mainboard_core::config::gate;
use mainboard_core::power::{GateEvent, PowerOnGate};
use mainboard_core::safety::Chirp;

use fmt::*;
use hardware::Irqs;
use tasks::control::AdcInputs;
use tasks::{buzzer_task, command_rx_task, control_task, feedback_tx_task, led_task};

// ピン割り当て（ストックメインボード）
// PA1  電源ボタン        PA4  ブザー
// PA5  電源自己保持ラッチ PB2  ボードLED
// PA2  一次入力 (ADC1_IN2)  PA3  二次入力 (ADC1_IN3)
// PC2  バッテリー電圧 (ADC1_IN12)
// PB10/PB11  シリアルリンク (USART3)

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let config = hardware::create_clock_config();
    let p = embassy_stm32::init(config);

    info!("mainboard firmware starting (STM32F103 @ 64MHz)");

    // 電源自己保持ラッチをオン（ボタンを離しても給電を維持）
    let mut latch = Output::new(p.PA5, Level::High, Speed::Low);
    let button = Input::new(p.PA1, Pull::Down);

    // ブザーとLEDは電源投入ゲートの前から動かす
    let buzzer = Output::new(p.PA4, Level::Low, Speed::Low);
    spawner.spawn(buzzer_task(buzzer)).unwrap();
    let led = Output::new(p.PB2, Level::High, Speed::Low);
    spawner.spawn(led_task(led)).unwrap();
    state::CHIRP.signal(Chirp::PowerOn);

    // ADC初期化
    let mut adc = Adc::new(p.ADC1);
    adc.set_sample_time(SampleTime::CYCLES239_5);
    let mut channels = AdcInputs {
        #[cfg(feature = "control-adc")]
        steer: p.PA2.degrade_adc(),
        #[cfg(feature = "control-adc")]
        speed: p.PA3.degrade_adc(),
        battery: p.PC2.degrade_adc(),
        temp: adc.enable_temperature().degrade_adc(),
    };

    // 電源投入ゲート: ボタン解放を待ち、キーロック操作があれば
    // キャリブレーション入口へ分岐する
    let mut gate_machine = PowerOnGate::new();
    loop {
        #[cfg(feature = "control-adc")]
        let (throttle_max, throttle_min) = {
            let raw = adc.blocking_read(&mut channels.speed) as i16;
            (
                tasks::control::is_throttle_max(raw),
                tasks::control::is_throttle_min(raw),
            )
        };
        // シリアル入力構成ではキーロック操作は成立しない
        #[cfg(not(feature = "control-adc"))]
        let (throttle_max, throttle_min) = (false, true);

        match gate_machine.poll(button.is_high(), throttle_max, throttle_min) {
            GateEvent::Pending => {
                Timer::after(Duration::from_millis(gate::POLL_PERIOD_MS as u64)).await;
            }
            GateEvent::NormalRun => break,
            GateEvent::EnterCalibration => {
                // 手順自体は入力取得側が担い、完了後に電源を切る
                info!("entering input calibration");
                state::INPUT_CALIBRATION_REQUEST.store(true, Ordering::Relaxed);
                state::CHIRP.signal(Chirp::LongBeep);
                Timer::after(Duration::from_secs(1)).await;
                tasks::control::power_off(&mut latch).await;
            }
            GateEvent::PowerOff => {
                tasks::control::power_off(&mut latch).await;
            }
        }
    }

    // 起動時のADC変換値で監視フィルタを初期化（誤検出防止）
    let initial_bat = adc.blocking_read(&mut channels.battery);
    let initial_temp = adc.blocking_read(&mut channels.temp);
    info!(
        "initial readings: bat_adc={}, temp_adc={}",
        initial_bat, initial_temp
    );

    // シリアルリンク初期化（フィードバック送信 + リモコン受信）
    let mut usart_config = usart::Config::default();
    usart_config.baudrate = 115_200;
    let uart = Uart::new(
        p.USART3,
        p.PB11,
        p.PB10,
        Irqs,
        p.DMA1_CH2,
        p.DMA1_CH3,
        usart_config,
    )
    .unwrap();
    let (tx, rx) = uart.split();
    spawner.spawn(feedback_tx_task(tx)).unwrap();
    spawner.spawn(command_rx_task(rx)).unwrap();

    info!("starting control loop");

    // 制御ループタスクを起動
    spawner
        .spawn(control_task(
            adc,
            channels,
            initial_bat,
            initial_temp,
            latch,
            button,
        ))
        .unwrap();

    // メインループ（将来の拡張用）
    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
