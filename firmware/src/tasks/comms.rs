//! シリアルリンクタスク
//!
//! フィードバックフレームの送信とリモコンコマンドの受信を行います。
//! 送信はDMA完了待ちのみ（フレームは制御タスク側で破棄判断済み）、
//! 受信はバイトストリームをスタートマーカーで再同期しながら
//! フレーム単位に切り出します。

use core::sync::atomic::Ordering;

use embassy_stm32::mode::Async;
use embassy_stm32::usart::{UartRx, UartTx};

use mainboard_core::protocol::{self, RemoteCommand, COMMAND_FRAME_SIZE};

use crate::fmt::*;
use crate::state::{FEEDBACK_FRAMES, REMOTE_COMMAND, SERIAL_FRAME_AGE};

/// フィードバック送信タスク
///
/// チャネル容量が1なので、送信中に届いたフレームは制御タスク側の
/// try_sendで破棄される（キューイングしない）。
#[embassy_executor::task]
pub async fn feedback_tx_task(mut tx: UartTx<'static, Async>) {
    info!("feedback tx task started");

    loop {
        let frame = FEEDBACK_FRAMES.receive().await;
        if let Err(e) = tx.write(&frame.to_bytes()).await {
            warn!("feedback tx error: {:?}", e);
        }
    }
}

/// リモコンコマンド受信タスク
///
/// 有効なフレームを受けるたびに共有コマンドを更新し、リンク鮮度
/// カウンタを0に戻します。チェックサム不一致のフレームは捨てて
/// 前回のコマンドを維持します（タイムアウト側で顕在化する）。
#[embassy_executor::task]
pub async fn command_rx_task(mut rx: UartRx<'static, Async>) {
    info!("command rx task started");

    let mut window = [0u8; 4 * COMMAND_FRAME_SIZE];
    let mut fill = 0usize;

    loop {
        let read = match rx.read_until_idle(&mut window[fill..]).await {
            Ok(n) => n,
            Err(e) => {
                warn!("serial rx error: {:?}", e);
                fill = 0;
                continue;
            }
        };
        fill += read;

        // スタートマーカーへ再同期してからフレームを切り出す
        loop {
            let consumed = match protocol::find_frame_start(&window[..fill]) {
                Some(0) if fill >= COMMAND_FRAME_SIZE => {
                    let mut frame = [0u8; COMMAND_FRAME_SIZE];
                    frame.copy_from_slice(&window[..COMMAND_FRAME_SIZE]);
                    match RemoteCommand::parse(&frame) {
                        Ok(cmd) => {
                            *REMOTE_COMMAND.lock().await = cmd;
                            SERIAL_FRAME_AGE.store(0, Ordering::Relaxed);
                            COMMAND_FRAME_SIZE
                        }
                        // マーカーに見えたがフレームではない: 2バイト進める
                        Err(_) => 2,
                    }
                }
                // マーカーは見えているがフレームがまだ揃っていない
                Some(0) => break,
                // マーカー前のゴミを捨てる
                Some(offset) => offset,
                // マーカーなし。直近1バイトだけ残す（マーカー前半の可能性）
                None => fill.saturating_sub(1),
            };

            if consumed == 0 {
                break;
            }
            window.copy_within(consumed..fill, 0);
            fill -= consumed;
        }

        // ウィンドウが満杯のまま進めない場合は仕切り直す
        if fill == window.len() {
            warn!("serial rx window overflow, resyncing");
            fill = 0;
        }
    }
}
