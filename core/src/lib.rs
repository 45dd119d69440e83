//! メインボード制御コア
//!
//! 自己バランス車両メインボードのリアルタイム制御ロジックを
//! ハードウェア非依存で実装します。ペリフェラル入出力は
//! ファームウェア側のタスクが担当し、本クレートは1 tickごとの
//! 制御パイプライン（入力正規化 → 駆動モード → 整形フィルタ →
//! ミキサー → 安全調停 → フィードバック符号化）のみを扱います。
#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod brake;
pub mod config;
pub mod control;
pub mod drive_mode;
pub mod filter;
pub mod follower;
pub mod input;
pub mod mixer;
pub mod monitor;
pub mod power;
pub mod protocol;
pub mod safety;

pub use control::{ControlLoop, TickInputs, TickOutputs};
pub use mixer::MotorCommandPair;
pub use protocol::FeedbackFrame;
