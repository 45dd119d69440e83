//! タスクモジュール
//!
//! 各タスクの実装を分離して管理します。

pub mod buzzer;
pub mod comms;
pub mod control;
pub mod led;

// タスク関数を再エクスポート
pub use buzzer::buzzer_task;
pub use comms::{command_rx_task, feedback_tx_task};
pub use control::control_task;
pub use led::led_task;
