// Serial link protocol: remote command frames in, feedback frames out.
// Both directions use the same start marker and an XOR checksum over every
// preceding field; all fields are little-endian on the wire.

use crate::fmt::*;

/// Start marker of both frame directions
pub const SERIAL_START_FRAME: u16 = 0xABCD;

/// Wire size of a remote command frame
pub const COMMAND_FRAME_SIZE: usize = 8;

/// Wire size of a feedback frame
pub const FEEDBACK_FRAME_SIZE: usize = 18;

/// Frame decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Start marker missing
    BadStart,
    /// Checksum mismatch
    BadChecksum,
}

/// Remote control command received over the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteCommand {
    pub steer: i16,
    pub speed: i16,
}

impl RemoteCommand {
    fn checksum(&self) -> u16 {
        SERIAL_START_FRAME ^ self.steer as u16 ^ self.speed as u16
    }

    /// Encode for transmission (master side; also exercises the decode path
    /// in tests).
    pub fn to_bytes(&self) -> [u8; COMMAND_FRAME_SIZE] {
        let mut buf = [0u8; COMMAND_FRAME_SIZE];
        buf[0..2].copy_from_slice(&SERIAL_START_FRAME.to_le_bytes());
        buf[2..4].copy_from_slice(&self.steer.to_le_bytes());
        buf[4..6].copy_from_slice(&self.speed.to_le_bytes());
        buf[6..8].copy_from_slice(&self.checksum().to_le_bytes());
        buf
    }

    /// Decode a frame-aligned buffer. Integrity failures are reported, never
    /// acted on: the caller keeps the previous command and lets the link
    /// timeout escalate.
    pub fn parse(buf: &[u8; COMMAND_FRAME_SIZE]) -> Result<Self, FrameError> {
        let start = u16::from_le_bytes([buf[0], buf[1]]);
        if start != SERIAL_START_FRAME {
            return Err(FrameError::BadStart);
        }

        let cmd = Self {
            steer: i16::from_le_bytes([buf[2], buf[3]]),
            speed: i16::from_le_bytes([buf[4], buf[5]]),
        };
        let checksum = u16::from_le_bytes([buf[6], buf[7]]);
        if checksum != cmd.checksum() {
            warn!("serial command checksum mismatch");
            return Err(FrameError::BadChecksum);
        }
        Ok(cmd)
    }
}

/// Status frame sent back over the serial link at a fixed sub-multiple of
/// the tick rate. Constructed fresh on each emission tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeedbackFrame {
    /// Echoed primary input command
    pub cmd1: i16,
    /// Echoed secondary input command
    pub cmd2: i16,
    /// Measured right motor speed [rpm]
    pub speed_r_meas: i16,
    /// Measured left motor speed [rpm]
    pub speed_l_meas: i16,
    /// Calibrated battery voltage [10mV]
    pub bat_voltage: i16,
    /// Filtered board temperature [0.1°C]
    pub board_temp: i16,
    /// Auxiliary LED/status byte
    pub cmd_led: u16,
}

impl FeedbackFrame {
    /// XOR of the start marker and every payload field, in wire order.
    pub fn checksum(&self) -> u16 {
        SERIAL_START_FRAME
            ^ self.cmd1 as u16
            ^ self.cmd2 as u16
            ^ self.speed_r_meas as u16
            ^ self.speed_l_meas as u16
            ^ self.bat_voltage as u16
            ^ self.board_temp as u16
            ^ self.cmd_led
    }

    /// Serialize to the exact transmitted byte sequence (checksum last).
    pub fn to_bytes(&self) -> [u8; FEEDBACK_FRAME_SIZE] {
        let mut buf = [0u8; FEEDBACK_FRAME_SIZE];
        buf[0..2].copy_from_slice(&SERIAL_START_FRAME.to_le_bytes());
        buf[2..4].copy_from_slice(&self.cmd1.to_le_bytes());
        buf[4..6].copy_from_slice(&self.cmd2.to_le_bytes());
        buf[6..8].copy_from_slice(&self.speed_r_meas.to_le_bytes());
        buf[8..10].copy_from_slice(&self.speed_l_meas.to_le_bytes());
        buf[10..12].copy_from_slice(&self.bat_voltage.to_le_bytes());
        buf[12..14].copy_from_slice(&self.board_temp.to_le_bytes());
        buf[14..16].copy_from_slice(&self.cmd_led.to_le_bytes());
        buf[16..18].copy_from_slice(&self.checksum().to_le_bytes());
        buf
    }

    /// Receiver-side decode, used by the tests and by master-mode tooling.
    pub fn parse(buf: &[u8; FEEDBACK_FRAME_SIZE]) -> Result<Self, FrameError> {
        let start = u16::from_le_bytes([buf[0], buf[1]]);
        if start != SERIAL_START_FRAME {
            return Err(FrameError::BadStart);
        }

        let frame = Self {
            cmd1: i16::from_le_bytes([buf[2], buf[3]]),
            cmd2: i16::from_le_bytes([buf[4], buf[5]]),
            speed_r_meas: i16::from_le_bytes([buf[6], buf[7]]),
            speed_l_meas: i16::from_le_bytes([buf[8], buf[9]]),
            bat_voltage: i16::from_le_bytes([buf[10], buf[11]]),
            board_temp: i16::from_le_bytes([buf[12], buf[13]]),
            cmd_led: u16::from_le_bytes([buf[14], buf[15]]),
        };
        let checksum = u16::from_le_bytes([buf[16], buf[17]]);
        if checksum != frame.checksum() {
            return Err(FrameError::BadChecksum);
        }
        Ok(frame)
    }
}

/// Scan a byte window for the little-endian start marker; returns the offset
/// of the first match so the RX task can realign a drifted stream.
pub fn find_frame_start(window: &[u8]) -> Option<usize> {
    let marker = SERIAL_START_FRAME.to_le_bytes();
    window
        .windows(2)
        .position(|pair| pair == marker)
}
