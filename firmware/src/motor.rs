//! 転流コンポーネント境界
//!
//! トルク/速度閉ループの転流アルゴリズム本体は外部コンポーネント
//! （モーター制御割り込みで動作）であり、本モジュールはその共有変数
//! だけを提供します。制御ループは毎tick目標コマンドを書き込み、
//! フォルトコードと実測速度を読み取ります。値は割り込み側から
//! 非同期に更新されるため、tick内で安定とは仮定しないこと。

use core::sync::atomic::{AtomicBool, AtomicI16, AtomicU8, Ordering};

use mainboard_core::MotorCommandPair;

/// 左モーターの目標コマンド [-1000, 1000]
static TARGET_LEFT: AtomicI16 = AtomicI16::new(0);

/// 右モーターの目標コマンド [-1000, 1000]
static TARGET_RIGHT: AtomicI16 = AtomicI16::new(0);

/// モーター有効フラグ
static ENABLE: AtomicBool = AtomicBool::new(false);

/// 左モーターのフォルトコード（転流側が更新、0 = 正常）
static FAULT_LEFT: AtomicU8 = AtomicU8::new(0);

/// 右モーターのフォルトコード（転流側が更新、0 = 正常）
static FAULT_RIGHT: AtomicU8 = AtomicU8::new(0);

/// 左モーターの実測速度 [rpm]（転流側が更新）
static SPEED_LEFT: AtomicI16 = AtomicI16::new(0);

/// 右モーターの実測速度 [rpm]（転流側が更新）
static SPEED_RIGHT: AtomicI16 = AtomicI16::new(0);

/// 極性適用済みの最終コマンドと有効フラグを転流側へ渡す
pub fn set_targets(cmd: MotorCommandPair, enable: bool) {
    TARGET_LEFT.store(cmd.left, Ordering::Relaxed);
    TARGET_RIGHT.store(cmd.right, Ordering::Relaxed);
    ENABLE.store(enable, Ordering::Relaxed);
}

/// 両モーターのフォルトコード (左, 右)
pub fn fault_codes() -> (u8, u8) {
    (
        FAULT_LEFT.load(Ordering::Relaxed),
        FAULT_RIGHT.load(Ordering::Relaxed),
    )
}

/// 両モーターの実測速度 (左, 右) [rpm]
pub fn measured_speeds() -> (i16, i16) {
    (
        SPEED_LEFT.load(Ordering::Relaxed),
        SPEED_RIGHT.load(Ordering::Relaxed),
    )
}
