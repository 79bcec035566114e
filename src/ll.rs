//! The external Link-Layer seam.
//!
//! Built-in command handlers mutate controller state only through this
//! trait; the actual Link-Layer state machine lives upstream and feeds
//! [`crate::rx::RxRecord`]s back when asynchronous operations complete.
//! Methods returning `u8` return an HCI status code
//! ([`crate::opcode::status`]).

/// Parameters of LE Create Connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectParams {
    pub scan_interval: u16,
    pub scan_window: u16,
    pub filter_policy: u8,
    pub peer_addr_kind: u8,
    pub peer_addr: [u8; 6],
    pub own_addr_kind: u8,
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub timeout: u16,
    pub min_ce_len: u16,
    pub max_ce_len: u16,
}

/// Local version identity reported by Read Local Version Information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VersionInfo {
    pub hci_version: u8,
    pub hci_revision: u16,
    pub lmp_version: u8,
    pub manufacturer: u16,
    pub lmp_subversion: u16,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            hci_version: 0x0d, // Core 5.4
            hci_revision: 0,
            lmp_version: 0x0d,
            manufacturer: 0xffff,
            lmp_subversion: 0,
        }
    }
}

/// Controller receive-buffer geometry reported by (LE) Read Buffer Size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferInfo {
    pub acl_data_len: u16,
    pub acl_pkts: u16,
}

impl Default for BufferInfo {
    fn default() -> Self {
        Self {
            acl_data_len: 27,
            acl_pkts: 4,
        }
    }
}

/// Controller actions the command dispatcher may invoke.
pub trait LinkLayer {
    /// Discard queued work and return to the idle state. A reset command has
    /// already zeroed the flow-control counters when this is called; the
    /// radio context signals drain completion separately via
    /// [`crate::flow::FlowControl::drain_complete`].
    fn reset(&mut self);

    fn bd_addr(&self) -> [u8; 6];

    fn buffer_info(&self) -> BufferInfo;

    fn version(&self) -> VersionInfo {
        VersionInfo::default()
    }

    /// LMP feature page 0.
    fn supported_features(&self) -> [u8; 8] {
        [0x60, 0, 0, 0, 0, 0, 0, 0] // LE + BR/EDR-not-supported
    }

    fn set_adv_enable(&mut self, enable: bool) -> u8;

    fn set_scan_enable(&mut self, enable: bool) -> u8;

    /// Start connection establishment; completion is reported later through
    /// a [`crate::rx::PduKind::ConnComplete`] record.
    fn connect(&mut self, params: &ConnectParams) -> u8;

    /// Start disconnection; completion arrives as a
    /// [`crate::rx::PduKind::Disconnection`] record.
    fn disconnect(&mut self, handle: u16, reason: u8) -> u8;

    /// Outbound (host to controller) ACL payload for `handle`.
    fn acl_write(&mut self, handle: u16, payload: &[u8]) -> u8;
}
