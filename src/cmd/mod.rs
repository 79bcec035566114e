//! Inbound HCI command and ACL dispatch.
//!
//! Commands carry a fixed 3-byte header: 2-byte opcode, 1-byte parameter
//! length. Dispatch goes through a static opcode table with an explicit
//! unknown default; unknown opcodes and length mismatches answer with a
//! status event and change no controller state.

use crate::buf::{BufPool, WireBuffer};
use crate::evt::{self, EvtOutcome};
use crate::flow::FlowControl;
use crate::ll::{ConnectParams, LinkLayer};
use crate::opcode::{self, ogf, status, Opcode};
use crate::rx::RxRecord;
use crate::vendor::{self, VendorCommands};

pub const CMD_HDR_LEN: usize = 3;

/// Default event mask after power-up or Reset (Core spec volume 4 default).
const EVENT_MASK_DEFAULT: u64 = 0x0000_1fff_ffff_ffff;

const EVENT_MASK_DISCONN: u64 = 1 << 4;
const EVENT_MASK_ENC_CHANGE: u64 = 1 << 7;
const EVENT_MASK_REMOTE_VERSION: u64 = 1 << 11;
const EVENT_MASK_LE_META: u64 = 1 << 61;

/// Built-in handler capabilities. One variant per supported opcode; lookup
/// misses map to the unknown-command response instead of a fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Disconnect,
    SetEventMask,
    Reset,
    SetCtlToHostFlow,
    HostBufferSize,
    HostNumCompleted,
    ReadLocalVersion,
    ReadLocalFeatures,
    ReadBufferSize,
    ReadBdAddr,
    LeReadBufferSize,
    LeSetAdvEnable,
    LeSetScanEnable,
    LeCreateConn,
}

static OPCODE_TABLE: &[(Opcode, Builtin)] = &[
    (opcode::DISCONNECT, Builtin::Disconnect),
    (opcode::SET_EVENT_MASK, Builtin::SetEventMask),
    (opcode::RESET, Builtin::Reset),
    (opcode::SET_CTL_TO_HOST_FLOW, Builtin::SetCtlToHostFlow),
    (opcode::HOST_BUFFER_SIZE, Builtin::HostBufferSize),
    (opcode::HOST_NUM_COMPLETED_PACKETS, Builtin::HostNumCompleted),
    (opcode::READ_LOCAL_VERSION_INFO, Builtin::ReadLocalVersion),
    (opcode::READ_LOCAL_FEATURES, Builtin::ReadLocalFeatures),
    (opcode::READ_BUFFER_SIZE, Builtin::ReadBufferSize),
    (opcode::READ_BD_ADDR, Builtin::ReadBdAddr),
    (opcode::LE_READ_BUFFER_SIZE, Builtin::LeReadBufferSize),
    (opcode::LE_SET_ADV_ENABLE, Builtin::LeSetAdvEnable),
    (opcode::LE_SET_SCAN_ENABLE, Builtin::LeSetScanEnable),
    (opcode::LE_CREATE_CONN, Builtin::LeCreateConn),
];

fn lookup(op: Opcode) -> Option<Builtin> {
    OPCODE_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == op)
        .map(|&(_, builtin)| builtin)
}

/// Return parameters of a synchronous command, status byte first.
type ReturnParams = heapless::Vec<u8, 64>;

/// A handler's declared completion mode, carried in its result.
enum CmdResult {
    /// Synchronous: Command Complete with return parameters.
    Complete(ReturnParams),
    /// Asynchronous operation pending: Command Status only.
    Status(u8),
    /// Commands that elicit no completion event.
    None,
}

fn status_only(status: u8) -> CmdResult {
    let mut ret = ReturnParams::new();
    unwrap!(ret.push(status));
    CmdResult::Complete(ret)
}

fn u16le(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// Result of handling one inbound ACL packet.
#[derive(Debug)]
pub enum AclOutcome {
    /// Payload accepted; the host's credit event is ready for the transport.
    Credit(WireBuffer),
    /// Payload accepted but no pool buffer was free for the credit event.
    /// The caller owes the host one credit for `handle` and re-issues it
    /// via [`HciBridge::encode_num_completed`] once the pool drains.
    CreditPending(u16),
    /// Malformed packet or Link-Layer refusal; no credit is owed.
    Rejected,
}

/// The controller side of the Host-Controller Interface.
///
/// Owns the Link-Layer and vendor seams, and shares the buffer pool and
/// flow-control counters with the radio producer context.
pub struct HciBridge<L: LinkLayer, V: VendorCommands> {
    ll: L,
    vendor: V,
    pool: &'static BufPool,
    flow: &'static FlowControl,
    event_mask: u64,
}

impl<L: LinkLayer, V: VendorCommands> HciBridge<L, V> {
    /// Wire the bridge. `flow` carries the host-buffer notification the
    /// consumer side waits on ([`FlowControl::host_buf_wait`]).
    pub fn new(ll: L, vendor: V, pool: &'static BufPool, flow: &'static FlowControl) -> Self {
        Self {
            ll,
            vendor,
            pool,
            flow,
            event_mask: EVENT_MASK_DEFAULT,
        }
    }

    pub fn flow(&self) -> &'static FlowControl {
        self.flow
    }

    pub fn pool(&self) -> &'static BufPool {
        self.pool
    }

    pub fn link_layer(&self) -> &L {
        &self.ll
    }

    pub fn link_layer_mut(&mut self) -> &mut L {
        &mut self.ll
    }

    pub fn event_mask(&self) -> u64 {
        self.event_mask
    }

    /// Decode one inbound command packet and run its handler. Returns the
    /// completion event, or `None` for commands that elicit none (or when
    /// the response buffer could not be claimed).
    pub fn handle_command(&mut self, cmd: &[u8]) -> Option<WireBuffer> {
        if cmd.len() < CMD_HDR_LEN {
            warn!("command packet shorter than its header");
            return evt::cmd_status(self.pool, Opcode::from_raw(0), status::INVALID_PARAMS);
        }

        let op = Opcode::from_raw(u16le(cmd, 0));
        let plen = cmd[2] as usize;
        let params = &cmd[CMD_HDR_LEN..];
        if params.len() != plen {
            warn!(
                "opcode 0x{:04x}: declared {} parameter bytes, got {}",
                op.raw(),
                plen,
                params.len()
            );
            return evt::cmd_status(self.pool, op, status::INVALID_PARAMS);
        }

        if op.ogf() == ogf::VS {
            return vendor::cmd_handle(&mut self.vendor, self.pool, op, params);
        }

        let Some(builtin) = lookup(op) else {
            debug!("unknown opcode 0x{:04x}", op.raw());
            return evt::cmd_status(self.pool, op, status::UNKNOWN_CMD);
        };

        match self.run_builtin(builtin, params) {
            CmdResult::Complete(ret) => evt::cmd_complete(self.pool, op, &ret),
            CmdResult::Status(st) => evt::cmd_status(self.pool, op, st),
            CmdResult::None => None,
        }
    }

    fn run_builtin(&mut self, builtin: Builtin, params: &[u8]) -> CmdResult {
        match builtin {
            Builtin::Disconnect => {
                if params.len() != 3 {
                    return CmdResult::Status(status::INVALID_PARAMS);
                }
                let handle = u16le(params, 0);
                CmdResult::Status(self.ll.disconnect(handle, params[2]))
            }
            Builtin::SetEventMask => {
                if params.len() != 8 {
                    return status_only(status::INVALID_PARAMS);
                }
                self.event_mask = u64::from_le_bytes(unwrap!(params.try_into()));
                status_only(status::SUCCESS)
            }
            Builtin::Reset => {
                if !params.is_empty() {
                    return status_only(status::INVALID_PARAMS);
                }
                self.flow.reset();
                self.ll.reset();
                self.event_mask = EVENT_MASK_DEFAULT;
                status_only(status::SUCCESS)
            }
            Builtin::SetCtlToHostFlow => {
                // Only ACL flow control (0x00 off / 0x01 on) is supported;
                // synchronous variants are rejected.
                if params.len() != 1 || params[0] > 0x01 {
                    return status_only(status::INVALID_PARAMS);
                }
                status_only(self.flow.set_host_flow_enabled(params[0] == 0x01))
            }
            Builtin::HostBufferSize => {
                if params.len() != 7 {
                    return status_only(status::INVALID_PARAMS);
                }
                let acl_pkts = u16le(params, 3);
                status_only(self.flow.host_buffer_size(acl_pkts))
            }
            Builtin::HostNumCompleted => {
                let Some(&num_handles) = params.first() else {
                    return status_only(status::INVALID_PARAMS);
                };
                if params.len() != 1 + num_handles as usize * 4 {
                    return status_only(status::INVALID_PARAMS);
                }
                let mut returned = 0u32;
                for i in 0..num_handles as usize {
                    returned += u16le(params, 1 + i * 4 + 2) as u32;
                }
                self.flow.on_acked(returned.min(u16::MAX as u32) as u16);
                // No completion event while the host is merely returning
                // credits.
                CmdResult::None
            }
            Builtin::ReadLocalVersion => {
                if !params.is_empty() {
                    return status_only(status::INVALID_PARAMS);
                }
                let v = self.ll.version();
                let mut ret = ReturnParams::new();
                unwrap!(ret.push(status::SUCCESS));
                unwrap!(ret.push(v.hci_version));
                unwrap!(ret.extend_from_slice(&v.hci_revision.to_le_bytes()));
                unwrap!(ret.push(v.lmp_version));
                unwrap!(ret.extend_from_slice(&v.manufacturer.to_le_bytes()));
                unwrap!(ret.extend_from_slice(&v.lmp_subversion.to_le_bytes()));
                CmdResult::Complete(ret)
            }
            Builtin::ReadLocalFeatures => {
                if !params.is_empty() {
                    return status_only(status::INVALID_PARAMS);
                }
                let mut ret = ReturnParams::new();
                unwrap!(ret.push(status::SUCCESS));
                unwrap!(ret.extend_from_slice(&self.ll.supported_features()));
                CmdResult::Complete(ret)
            }
            Builtin::ReadBufferSize => {
                if !params.is_empty() {
                    return status_only(status::INVALID_PARAMS);
                }
                let info = self.ll.buffer_info();
                let mut ret = ReturnParams::new();
                unwrap!(ret.push(status::SUCCESS));
                unwrap!(ret.extend_from_slice(&info.acl_data_len.to_le_bytes()));
                unwrap!(ret.push(0)); // no synchronous data buffers
                unwrap!(ret.extend_from_slice(&info.acl_pkts.to_le_bytes()));
                unwrap!(ret.extend_from_slice(&0u16.to_le_bytes()));
                CmdResult::Complete(ret)
            }
            Builtin::ReadBdAddr => {
                if !params.is_empty() {
                    return status_only(status::INVALID_PARAMS);
                }
                let mut ret = ReturnParams::new();
                unwrap!(ret.push(status::SUCCESS));
                unwrap!(ret.extend_from_slice(&self.ll.bd_addr()));
                CmdResult::Complete(ret)
            }
            Builtin::LeReadBufferSize => {
                if !params.is_empty() {
                    return status_only(status::INVALID_PARAMS);
                }
                let info = self.ll.buffer_info();
                let mut ret = ReturnParams::new();
                unwrap!(ret.push(status::SUCCESS));
                unwrap!(ret.extend_from_slice(&info.acl_data_len.to_le_bytes()));
                unwrap!(ret.push(info.acl_pkts.min(u8::MAX as u16) as u8));
                CmdResult::Complete(ret)
            }
            Builtin::LeSetAdvEnable => {
                if params.len() != 1 {
                    return status_only(status::INVALID_PARAMS);
                }
                status_only(self.ll.set_adv_enable(params[0] == 0x01))
            }
            Builtin::LeSetScanEnable => {
                if params.len() != 1 {
                    return status_only(status::INVALID_PARAMS);
                }
                status_only(self.ll.set_scan_enable(params[0] == 0x01))
            }
            Builtin::LeCreateConn => {
                if params.len() != 25 {
                    return CmdResult::Status(status::INVALID_PARAMS);
                }
                let p = ConnectParams {
                    scan_interval: u16le(params, 0),
                    scan_window: u16le(params, 2),
                    filter_policy: params[4],
                    peer_addr_kind: params[5],
                    peer_addr: unwrap!(params[6..12].try_into()),
                    own_addr_kind: params[12],
                    interval_min: u16le(params, 13),
                    interval_max: u16le(params, 15),
                    latency: u16le(params, 17),
                    timeout: u16le(params, 19),
                    min_ce_len: u16le(params, 21),
                    max_ce_len: u16le(params, 23),
                };
                CmdResult::Status(self.ll.connect(&p))
            }
        }
    }

    /// Decode one inbound ACL packet, hand the payload to the Link Layer and
    /// return the host's credit back as a Number Of Completed Packets event.
    /// An accepted payload always carries its credit in the outcome, even
    /// when the pool cannot frame the event right now.
    pub fn handle_acl(&mut self, acl: &[u8]) -> AclOutcome {
        if acl.len() < evt::ACL_HDR_LEN {
            warn!("acl packet shorter than its header");
            return AclOutcome::Rejected;
        }
        let (handle, _boundary) = evt::unpack_acl_handle(u16le(acl, 0));
        let dlen = u16le(acl, 2) as usize;
        let payload = &acl[evt::ACL_HDR_LEN..];
        if payload.len() != dlen {
            warn!(
                "acl handle 0x{:03x}: declared {} payload bytes, got {}",
                handle,
                dlen,
                payload.len()
            );
            return AclOutcome::Rejected;
        }

        let st = self.ll.acl_write(handle, payload);
        if st != status::SUCCESS {
            warn!("link layer refused acl write: status 0x{:02x}", st);
            return AclOutcome::Rejected;
        }
        match evt::encode_num_completed(self.pool, &[(handle, 1)]) {
            Some(buf) => AclOutcome::Credit(buf),
            None => {
                warn!("pool exhausted, credit for handle 0x{:03x} deferred", handle);
                AclOutcome::CreditPending(handle)
            }
        }
    }

    /// Serialize a receive record, honoring the host's event mask and the
    /// class-based drop policy.
    pub fn encode_evt(&self, record: RxRecord) -> EvtOutcome {
        if !self.event_enabled(&record) {
            trace!("event masked by host, record released");
            return EvtOutcome::Consumed;
        }
        evt::encode(self.pool, record)
    }

    /// Frame an ACL record for the host. Transmission is additionally gated
    /// by [`FlowControl::try_send`] on this bridge's `flow`.
    pub fn encode_acl(&self, record: RxRecord) -> EvtOutcome {
        evt::encode_acl(self.pool, record)
    }

    /// Credits-returned event advancing the host's `acked` view.
    pub fn encode_num_completed(&self, entries: &[(u16, u16)]) -> Option<WireBuffer> {
        evt::encode_num_completed(self.pool, entries)
    }

    fn event_enabled(&self, record: &RxRecord) -> bool {
        use crate::rx::PduKind;
        let bit = match record.kind() {
            PduKind::Disconnection => EVENT_MASK_DISCONN,
            PduKind::EncryptionChange => EVENT_MASK_ENC_CHANGE,
            PduKind::RemoteVersion => EVENT_MASK_REMOTE_VERSION,
            PduKind::AclData | PduKind::Release => return true,
            _ => EVENT_MASK_LE_META,
        };
        self.event_mask & bit != 0
    }
}
