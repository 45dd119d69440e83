//! グローバル共有状態管理
//!
//! タスク間で共有される状態をMutex/アトミックで保護して管理します。
//! 転流コンポーネントとの共有値は `motor` モジュール側にあります。

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8};

use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;

use mainboard_core::protocol::RemoteCommand;
use mainboard_core::safety::{BeepPattern, Chirp};
use mainboard_core::FeedbackFrame;

/// シリアルリモコンから受信した最新コマンド
pub static REMOTE_COMMAND: Mutex<ThreadModeRawMutex, RemoteCommand> =
    Mutex::new(RemoteCommand { steer: 0, speed: 0 });

/// 最後に有効なリモコンフレームを受けてからのtick数
/// （受信タスクが0に戻し、制御タスクが毎tick加算する）
pub static SERIAL_FRAME_AGE: AtomicU32 = AtomicU32::new(0);

/// 安全調停が選択した警報パターン（ブザータスクが再生）
pub static BEEP_PATTERN: Mutex<ThreadModeRawMutex, BeepPattern> = Mutex::new(BeepPattern::SILENCE);

/// 遷移チャープ要求（最新のものが勝つ）
pub static CHIRP: Signal<ThreadModeRawMutex, Chirp> = Signal::new();

/// 送信待ちフィードバックフレーム
/// 容量1: 前回送信が終わっていなければtry_sendが失敗し、そのtickの
/// フレームは破棄される（制御ループへの背圧を避ける）
pub static FEEDBACK_FRAMES: Channel<ThreadModeRawMutex, FeedbackFrame, 1> = Channel::new();

/// フィードバックに載せるLED/ステータスバイト
pub static STATUS_LED: AtomicU8 = AtomicU8::new(0);

/// 後退走行フラグ（外部から観測可能）
pub static BACKWARD_DRIVE: AtomicBool = AtomicBool::new(false);

/// 入力キャリブレーション手順の実行要求
/// （手順自体は入力取得側コンポーネントが担当する）
pub static INPUT_CALIBRATION_REQUEST: AtomicBool = AtomicBool::new(false);
