//! 制御コアの設定パラメータ
//!
//! すべてコンパイル時定数です。実機で経験的に調整された値を
//! そのまま名前付き定数として保持しています（フィールドでの
//! 動的再設定は行わない）。

use crate::drive_mode::VariantKind;

/// 制御ループのtick周期 [ms]
pub const TICK_PERIOD_MS: u32 = 5;

/// フィードバックフレーム送信周期（tick数、2 = 10msごと）
pub const FEEDBACK_DIVIDER: u32 = 2;

/// 正規化済みコマンドの下限
pub const INPUT_MIN: i16 = -1000;

/// 正規化済みコマンドの上限
pub const INPUT_MAX: i16 = 1000;

/// レートリミッタの1 tickあたり最大変化量 fixdt(1,16,4)（480 = 30/tick）
pub const RATE: i16 = 480;

/// ローパスフィルタ係数 fixdt(0,16,16)（小さいほど応答が遅い）
pub const FILTER: u16 = 6553;

/// ミキサーの速度係数 fixdt(1,16,14)（16384 = 1.0）
pub const SPEED_COEFFICIENT: i16 = 16384;

/// ミキサーの操舵係数 fixdt(1,16,14)（8192 = 0.5）
pub const STEER_COEFFICIENT: i16 = 8192;

/// 右モーターの出力極性反転（配線に依存）
pub const INVERT_R_DIRECTION: bool = false;

/// 左モーターの出力極性反転（配線に依存）
pub const INVERT_L_DIRECTION: bool = false;

/// 有効な駆動モード（起動時に一度だけ選択される）
pub const DRIVE_VARIANT: VariantKind = VariantKind::Differential;

/// 電動ブレーキ段を有効化（トルクモード時のみ意味を持つ）
pub const ELECTRIC_BRAKE_ENABLE: bool = false;

/// 電動ブレーキの最大ブレーキ量
pub const ELECTRIC_BRAKE_MAX: i16 = 100;

/// 後退中のビープを有効化
pub const BEEPS_BACKWARD: bool = true;

/// バッテリー監視
pub mod battery {
    /// セル直列数
    pub const NUMBER_OF_CELLS: i32 = 10;

    /// 校正基準電圧 [10mV]（39.70V実測時）
    pub const CALIB_REAL_VOLTAGE: i32 = 3970;

    /// 校正基準電圧に対応するADC生値
    pub const CALIB_ADC: i32 = 1492;

    /// バッテリー電圧ローパスフィルタ係数 fixdt(0,16,16)
    pub const FILT_COEF: u16 = 655;

    /// 警告レベル1のセル電圧 [10mV]（速いビープ）
    pub const CELL_LVL1: i32 = 360;

    /// 警告レベル2のセル電圧 [10mV]（遅いビープ）
    pub const CELL_LVL2: i32 = 350;

    /// 動作限界のセル電圧 [10mV]（減速ののち電源断）
    pub const CELL_DEAD: i32 = 337;

    /// レベル1警告の有効化
    pub const LVL1_ENABLE: bool = true;

    /// レベル2警告の有効化
    pub const LVL2_ENABLE: bool = true;

    /// パック電圧での警告レベル1 [10mV]
    pub const LVL1: i16 = (CELL_LVL1 * NUMBER_OF_CELLS) as i16;

    /// パック電圧での警告レベル2 [10mV]
    pub const LVL2: i16 = (CELL_LVL2 * NUMBER_OF_CELLS) as i16;

    /// パック電圧での動作限界 [10mV]
    pub const DEAD: i16 = (CELL_DEAD * NUMBER_OF_CELLS) as i16;
}

/// 基板温度監視
pub mod temperature {
    /// 温度ローパスフィルタ係数 fixdt(0,16,16)
    pub const FILT_COEF: u16 = 655;

    /// 2点校正: 低温側ADC生値
    pub const CAL_LOW_ADC: i16 = 1655;

    /// 2点校正: 低温側温度 [0.1°C]
    pub const CAL_LOW_DECI_C: i16 = 358;

    /// 2点校正: 高温側ADC生値
    pub const CAL_HIGH_ADC: i16 = 1588;

    /// 2点校正: 高温側温度 [0.1°C]
    pub const CAL_HIGH_DECI_C: i16 = 489;

    /// 温度警告の有効化
    pub const WARNING_ENABLE: bool = true;

    /// 警告しきい値 [0.1°C]
    pub const WARNING_DECI_C: i16 = 600;

    /// 電源断の有効化
    pub const POWEROFF_ENABLE: bool = true;

    /// 電源断しきい値 [0.1°C]（減速ののち停止時に電源断）
    pub const POWEROFF_DECI_C: i16 = 650;
}

/// タイムアウト・保護
pub mod timeout {
    /// ADC配線保護: 許容範囲外が連続するtick数
    pub const ADC_PROTECT_TICKS: u16 = 100;

    /// ADC配線保護: キャリブレーション範囲からの許容余裕 [ADC生値]
    pub const ADC_PROTECT_THRESH: i16 = 300;

    /// シリアル受信タイムアウト [tick]
    pub const SERIAL_TIMEOUT_TICKS: u32 = 160;

    /// 汎用入力（PPM/PWM/外部機器）タイムアウト [tick]
    pub const GENERAL_TIMEOUT_TICKS: u32 = 400;

    /// 無操作タイムアウト [分]
    pub const INACTIVITY_TIMEOUT_MIN: u32 = 8;

    /// 無操作タイムアウトのtick数（ループ自体の所要時間ぶん約1ms補正）
    pub const INACTIVITY_TICKS: u32 =
        INACTIVITY_TIMEOUT_MIN * 60 * 1000 / (super::TICK_PERIOD_MS + 1);
}

/// 安全インターロック
pub mod interlock {
    /// 有効化/無効化を許すコマンドのデッドバンド
    pub const COMMAND_DEADBAND: i16 = 50;

    /// 無操作判定に使うモーターコマンドのデッドバンド
    pub const INACTIVITY_DEADBAND: i16 = 50;

    /// 電源断を許す平均速度の上限 [rpm]
    pub const POWEROFF_SPEED_THRESHOLD: i16 = 5;
}

/// スピードブレンド（低速限定機能のフェードアウト）
pub mod blend {
    /// ブレンド0となる平均速度 [rpm]
    pub const LOW_RPM: i16 = 10;

    /// ブレンド1となる平均速度 [rpm]
    pub const HIGH_RPM: i16 = 60;
}

/// ツーペダル（ブレーキ+スロットル）モード
pub mod two_pedal {
    /// 低速限定機能を許す平均速度の上限 [rpm]
    pub const STANDSTILL_SPEED_THRESHOLD: i16 = 30;

    /// ブレーキ踏み込み判定しきい値（正規化コマンド）
    pub const BRAKE_THRESHOLD: i16 = 120;

    /// 後退時の速度制限（対称クランプ）
    pub const REVERSE_SPEED_LIMIT: i16 = 300;

    /// 前後進スイッチの判定ADCレベル（後退側）
    pub const REVERSE_ADC_LEVEL: i16 = 2500;

    /// 前後進スイッチの判定ADCレベル（前進側）
    pub const FORWARD_ADC_LEVEL: i16 = 1500;

    /// 前後進スイッチのレベル判定余裕 [ADC生値]
    pub const SWITCH_LEVEL_MARGIN: i16 = 250;

    /// 前後進スイッチの保持時間 [tick]
    pub const SWITCH_HOLD_TICKS: u16 = 50;
}

/// ブレーキペダルのダブルタップ検出
pub mod multiple_tap {
    /// タップ判定の上側ヒステリシス（正規化コマンド）
    pub const HI: i16 = 600;

    /// タップ判定の下側ヒステリシス（正規化コマンド）
    pub const LO: i16 = 200;

    /// ラッチ反転に必要なタップ数
    pub const NR: u8 = 2;

    /// 検出ウィンドウ [ms]
    pub const TIMEOUT_MS: u32 = 2000;
}

/// 電源投入ゲート（キーロック/キャリブレーション入口）
pub mod gate {
    /// ゲートのポーリング周期 [ms]
    pub const POLL_PERIOD_MS: u32 = 10;

    /// 短押し判定ウィンドウ [poll]（1秒）
    pub const KEYLOCK_CHECK_POLLS: u16 = 100;

    /// キャリブレーション入りの長押し時間 [poll]（5秒）
    pub const CALIBRATE_HOLD_POLLS: u16 = 500;

    /// 電源ボタンのデバウンス [poll]（80ms）
    pub const PWR_BTN_DEBOUNCE_POLLS: u16 = 8;

    /// キャリブレーション入口の放置タイムアウト [poll]
    pub const CALIBRATE_IDLE_TIMEOUT_POLLS: u16 = 1000;

    /// スロットル最大/最小判定の許容余裕 [ADC生値]
    pub const THROTTLE_MARGIN: i16 = 250;
}

/// 追従（牽引）モード
pub mod follower {
    /// 操舵補正の比例ゲイン
    pub const ROT_P: f32 = 1.2;

    /// 距離1mあたりのセンサーカウント
    pub const COUNTS_PER_M: f32 = 1345.0;

    /// 追従対象ロスト判定の距離超過 [m]
    pub const OUT_OF_RANGE_M: f32 = 0.5;

    /// これ以下の距離誤差で駆動を止める [カウント]
    pub const STOP_ERR: i32 = -300;

    /// 出力ブレンド: 前回値の保持率
    pub const KEEP: f32 = 0.8;

    /// 出力ブレンド: 新規補正の寄与率
    pub const GAIN: f32 = 0.2;

    /// 補正項のクランプ [カウント]
    pub const CORRECTION_LIMIT: f32 = 850.0;
}
