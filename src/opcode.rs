//! HCI opcodes, event codes and status values.
//!
//! An opcode packs a 6-bit Opcode Group Field and a 10-bit Opcode Command
//! Field into two little-endian wire bytes.

/// Opcode group fields.
pub mod ogf {
    pub const LINK_CTRL: u8 = 0x01;
    pub const BASEBAND: u8 = 0x03;
    pub const INFO: u8 = 0x04;
    pub const LE: u8 = 0x08;
    /// Vendor-specific commands.
    pub const VS: u8 = 0x3f;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Opcode(u16);

impl Opcode {
    pub const fn new(ogf: u8, ocf: u16) -> Self {
        Self(((ogf as u16) << 10) | (ocf & 0x03ff))
    }

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn ogf(self) -> u8 {
        (self.0 >> 10) as u8
    }

    pub const fn ocf(self) -> u16 {
        self.0 & 0x03ff
    }
}

pub const DISCONNECT: Opcode = Opcode::new(ogf::LINK_CTRL, 0x0006);

pub const SET_EVENT_MASK: Opcode = Opcode::new(ogf::BASEBAND, 0x0001);
pub const RESET: Opcode = Opcode::new(ogf::BASEBAND, 0x0003);
pub const SET_CTL_TO_HOST_FLOW: Opcode = Opcode::new(ogf::BASEBAND, 0x0031);
pub const HOST_BUFFER_SIZE: Opcode = Opcode::new(ogf::BASEBAND, 0x0033);
pub const HOST_NUM_COMPLETED_PACKETS: Opcode = Opcode::new(ogf::BASEBAND, 0x0035);

pub const READ_LOCAL_VERSION_INFO: Opcode = Opcode::new(ogf::INFO, 0x0001);
pub const READ_LOCAL_FEATURES: Opcode = Opcode::new(ogf::INFO, 0x0003);
pub const READ_BUFFER_SIZE: Opcode = Opcode::new(ogf::INFO, 0x0005);
pub const READ_BD_ADDR: Opcode = Opcode::new(ogf::INFO, 0x0009);

pub const LE_READ_BUFFER_SIZE: Opcode = Opcode::new(ogf::LE, 0x0002);
pub const LE_SET_ADV_ENABLE: Opcode = Opcode::new(ogf::LE, 0x000a);
pub const LE_SET_SCAN_ENABLE: Opcode = Opcode::new(ogf::LE, 0x000c);
pub const LE_CREATE_CONN: Opcode = Opcode::new(ogf::LE, 0x000d);

/// Event codes.
pub mod event {
    pub const DISCONN_COMPLETE: u8 = 0x05;
    pub const ENCRYPT_CHANGE: u8 = 0x08;
    pub const REMOTE_VERSION_INFO: u8 = 0x0c;
    pub const CMD_COMPLETE: u8 = 0x0e;
    pub const CMD_STATUS: u8 = 0x0f;
    pub const NUM_COMPLETED_PACKETS: u8 = 0x13;
    pub const LE_META: u8 = 0x3e;
}

/// LE meta-event sub-event codes.
pub mod le_event {
    pub const CONN_COMPLETE: u8 = 0x01;
    pub const ADV_REPORT: u8 = 0x02;
    pub const CONN_UPDATE_COMPLETE: u8 = 0x03;
    pub const REMOTE_FEAT_COMPLETE: u8 = 0x04;
    pub const DATA_LEN_CHANGE: u8 = 0x07;
    pub const PHY_UPDATE_COMPLETE: u8 = 0x0c;
    pub const EXT_ADV_REPORT: u8 = 0x0d;
    pub const SCAN_REQ_RECEIVED: u8 = 0x13;
}

/// HCI status codes.
pub mod status {
    pub const SUCCESS: u8 = 0x00;
    pub const UNKNOWN_CMD: u8 = 0x01;
    pub const CMD_DISALLOWED: u8 = 0x0c;
    pub const INVALID_PARAMS: u8 = 0x12;
    pub const REMOTE_USER_TERMINATED: u8 = 0x13;
    pub const UNSPECIFIED: u8 = 0x1f;
}
