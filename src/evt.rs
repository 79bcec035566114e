//! Wire-format encoding of receive records and command responses.
//!
//! Every function here consumes its record: after framing, the record's
//! memory is released by value, and a failed framing drops both the record
//! and the claimed buffer. LE-specific subtypes are wrapped in the meta-event
//! envelope (outer code [`event::LE_META`], inner sub-event byte first in the
//! parameters).

use crate::buf::{BufPool, WireBuffer, BUF_CAP};
use crate::class::{classify, HciClass};
use crate::opcode::{event, le_event, Opcode};
use crate::rx::{PacketBoundary, PduKind, RxRecord};

pub const EVT_HDR_LEN: usize = 2;
pub const ACL_HDR_LEN: usize = 4;
pub const EVT_PARAMS_MAX: usize = 255;

/// Number Of HCI Command Packets reported in completion events. The
/// dispatcher is synchronous, so the host may always pipeline one command.
const NUM_HCI_CMD_PKTS: u8 = 1;

/// Result of encoding one receive record.
#[derive(Debug)]
pub enum EvtOutcome {
    /// Packet framed and ready for the transport.
    Ready(WireBuffer),
    /// Record consumed without a packet: nothing to report, a discardable
    /// event dropped under pool pressure, or malformed parameters.
    Consumed,
    /// Pool exhausted for a must-deliver class. The record is handed back;
    /// the caller retries via Link-Layer backpressure.
    Retry(RxRecord),
}

impl EvtOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Write the 2-byte event header.
pub(crate) fn evt_create(buf: &mut WireBuffer, code: u8, plen: u8) {
    unwrap!(buf.push(code));
    unwrap!(buf.push(plen));
}

/// Outer event code and optional meta-event sub-code for a subtype.
fn event_code(kind: PduKind) -> (u8, Option<u8>) {
    match kind {
        PduKind::Disconnection => (event::DISCONN_COMPLETE, None),
        PduKind::EncryptionChange => (event::ENCRYPT_CHANGE, None),
        PduKind::RemoteVersion => (event::REMOTE_VERSION_INFO, None),
        PduKind::ConnComplete => (event::LE_META, Some(le_event::CONN_COMPLETE)),
        PduKind::AdvReport => (event::LE_META, Some(le_event::ADV_REPORT)),
        PduKind::ExtAdvReport => (event::LE_META, Some(le_event::EXT_ADV_REPORT)),
        PduKind::ScanReqReceived => (event::LE_META, Some(le_event::SCAN_REQ_RECEIVED)),
        PduKind::ConnUpdate => (event::LE_META, Some(le_event::CONN_UPDATE_COMPLETE)),
        PduKind::RemoteFeatures => (event::LE_META, Some(le_event::REMOTE_FEAT_COMPLETE)),
        PduKind::DataLenChange => (event::LE_META, Some(le_event::DATA_LEN_CHANGE)),
        PduKind::PhyUpdate => (event::LE_META, Some(le_event::PHY_UPDATE_COMPLETE)),
        PduKind::AclData | PduKind::Release => unreachable!(),
    }
}

/// Serialize one receive record into an event or ACL packet, applying the
/// class-based drop policy under pool pressure.
pub fn encode(pool: &'static BufPool, record: RxRecord) -> EvtOutcome {
    match classify(record.kind()) {
        HciClass::None => {
            trace!("rx record released without host event");
            EvtOutcome::Consumed
        }
        HciClass::AclData => encode_acl(pool, record),
        class => encode_evt(pool, record, class),
    }
}

fn encode_evt(pool: &'static BufPool, record: RxRecord, class: HciClass) -> EvtOutcome {
    let Some(mut buf) = pool.alloc() else {
        if class == HciClass::Discardable {
            trace!("pool exhausted, dropping discardable event");
            return EvtOutcome::Consumed;
        }
        return EvtOutcome::Retry(record);
    };

    let (code, sub) = event_code(record.kind());
    let plen = record.payload().len() + sub.is_some() as usize;
    if plen > EVT_PARAMS_MAX {
        warn!("event parameters exceed packet capacity, record dropped");
        return EvtOutcome::Consumed;
    }

    evt_create(&mut buf, code, plen as u8);
    if let Some(sub) = sub {
        unwrap!(buf.push(sub));
    }
    unwrap!(buf.extend_from_slice(record.payload()));
    EvtOutcome::Ready(buf)
}

/// Frame an ACL data record: handle+flags, length, payload. The caller gates
/// actual transmission through [`crate::flow::FlowControl::try_send`].
pub fn encode_acl(pool: &'static BufPool, record: RxRecord) -> EvtOutcome {
    let Some(handle) = record.handle() else {
        warn!("acl record without a connection handle, dropped");
        return EvtOutcome::Consumed;
    };
    let Some(mut buf) = pool.alloc() else {
        return EvtOutcome::Retry(record);
    };

    let payload = record.payload();
    if ACL_HDR_LEN + payload.len() > BUF_CAP {
        warn!("acl payload exceeds packet capacity, record dropped");
        return EvtOutcome::Consumed;
    }

    unwrap!(buf.push_u16_le(pack_acl_handle(handle, record.boundary())));
    unwrap!(buf.push_u16_le(payload.len() as u16));
    unwrap!(buf.extend_from_slice(payload));
    EvtOutcome::Ready(buf)
}

/// Number Of Completed Packets event returning `count` credits per handle.
pub fn encode_num_completed(pool: &'static BufPool, entries: &[(u16, u16)]) -> Option<WireBuffer> {
    let plen = 1 + entries.len() * 4;
    if plen > EVT_PARAMS_MAX {
        warn!("too many handles for one completed-packets event");
        return None;
    }
    let mut buf = pool.alloc()?;
    evt_create(&mut buf, event::NUM_COMPLETED_PACKETS, plen as u8);
    unwrap!(buf.push(entries.len() as u8));
    for &(handle, count) in entries {
        unwrap!(buf.push_u16_le(handle));
        unwrap!(buf.push_u16_le(count));
    }
    Some(buf)
}

/// Command Complete carrying `ret` as return parameters (status first).
pub fn cmd_complete(pool: &'static BufPool, opcode: Opcode, ret: &[u8]) -> Option<WireBuffer> {
    let plen = 3 + ret.len();
    if plen > EVT_PARAMS_MAX {
        warn!("command-complete return parameters too long");
        return None;
    }
    let mut buf = pool.alloc()?;
    evt_create(&mut buf, event::CMD_COMPLETE, plen as u8);
    unwrap!(buf.push(NUM_HCI_CMD_PKTS));
    unwrap!(buf.push_u16_le(opcode.raw()));
    unwrap!(buf.extend_from_slice(ret));
    Some(buf)
}

/// Command Status for asynchronous completion (or command-level errors).
pub fn cmd_status(pool: &'static BufPool, opcode: Opcode, status: u8) -> Option<WireBuffer> {
    let mut buf = pool.alloc()?;
    evt_create(&mut buf, event::CMD_STATUS, 4);
    unwrap!(buf.push(status));
    unwrap!(buf.push(NUM_HCI_CMD_PKTS));
    unwrap!(buf.push_u16_le(opcode.raw()));
    Some(buf)
}

pub(crate) fn pack_acl_handle(handle: u16, boundary: PacketBoundary) -> u16 {
    (handle & 0x0fff) | ((boundary as u16) << 12)
}

pub(crate) fn unpack_acl_handle(field: u16) -> (u16, PacketBoundary) {
    (field & 0x0fff, PacketBoundary::from_bits((field >> 12) as u8))
}
