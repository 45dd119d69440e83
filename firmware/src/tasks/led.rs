//! LED制御タスク
//!
//! ボードLEDとフィードバックフレームに載せるステータスバイトを
//! 更新します。

use core::sync::atomic::Ordering;

use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Timer};

use crate::fmt::*;
use crate::state::{BACKWARD_DRIVE, STATUS_LED};

/// ステータスバイトのビット割り当て
const LED_GREEN: u8 = 0x01;
const LED_RED: u8 = 0x02;

/// LED制御タスク
///
/// 通常走行は点灯、後退中は速い点滅。
#[embassy_executor::task]
pub async fn led_task(mut led: Output<'static>) {
    info!("LED task started");

    loop {
        let backward = BACKWARD_DRIVE.load(Ordering::Relaxed);

        let mut status = LED_GREEN;
        if backward {
            status = LED_RED;
            led.toggle();
            Timer::after(Duration::from_millis(100)).await;
        } else {
            led.set_high();
            Timer::after(Duration::from_millis(500)).await;
        }
        STATUS_LED.store(status, Ordering::Relaxed);
    }
}
