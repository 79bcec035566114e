//! Link-Layer receive records awaiting host notification.
//!
//! A [`RxRecord`] is one decoded Link-Layer PDU on its way to the host: a
//! subtype tag, the associated connection handle where one exists, and the
//! little-endian parameter block the event encoder frames. Records are
//! consumed exactly once, by [`crate::evt::encode`] or
//! [`crate::evt::encode_acl`].

use heapless::Vec;

/// Parameter block capacity. Matches the HCI event parameter space.
pub const RX_PAYLOAD_MAX: usize = 255;

/// Largest ACL payload a record may carry (LE Data Length maximum).
pub const ACL_DATA_MAX: usize = 251;

/// Legacy advertising report data limit.
pub const ADV_DATA_MAX: usize = 31;

/// Extended advertising report data limit for a single event.
pub const EXT_ADV_DATA_MAX: usize = 229;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    PayloadTooLong,
}

/// Decoded Link-Layer PDU subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PduKind {
    /// Legacy advertising report.
    AdvReport,
    /// Extended advertising report.
    ExtAdvReport,
    /// Scan request received while advertising.
    ScanReqReceived,
    /// Connection established.
    ConnComplete,
    /// Connection terminated.
    Disconnection,
    /// Connection parameter update completed.
    ConnUpdate,
    /// Link encryption state changed.
    EncryptionChange,
    /// PHY update procedure completed.
    PhyUpdate,
    /// Data length update completed.
    DataLenChange,
    /// Remote feature exchange completed.
    RemoteFeatures,
    /// Remote version exchange completed.
    RemoteVersion,
    /// Inbound ACL data.
    AclData,
    /// Internal bookkeeping only; nothing to report to the host.
    Release,
}

/// ACL packet-boundary flag (bits 12..13 of the handle field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketBoundary {
    FirstNonFlushable = 0b00,
    Continuation = 0b01,
    FirstFlushable = 0b10,
}

impl PacketBoundary {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => Self::Continuation,
            0b10 => Self::FirstFlushable,
            _ => Self::FirstNonFlushable,
        }
    }
}

/// One controller-internal receive record.
pub struct RxRecord {
    kind: PduKind,
    handle: Option<u16>,
    boundary: PacketBoundary,
    payload: Vec<u8, RX_PAYLOAD_MAX>,
}

impl RxRecord {
    /// Build a record from a raw parameter block. The typed constructors
    /// below are preferred; this is the escape hatch for Link-Layer glue.
    pub fn new(kind: PduKind, handle: Option<u16>, payload: &[u8]) -> Result<Self, Error> {
        let mut p = Vec::new();
        p.extend_from_slice(payload).map_err(|_| Error::PayloadTooLong)?;
        Ok(Self {
            kind,
            handle,
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        })
    }

    pub fn kind(&self) -> PduKind {
        self.kind
    }

    pub fn handle(&self) -> Option<u16> {
        self.handle
    }

    pub fn boundary(&self) -> PacketBoundary {
        self.boundary
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Record that only asks the Link Layer to release node memory.
    pub fn release() -> Self {
        Self {
            kind: PduKind::Release,
            handle: None,
            boundary: PacketBoundary::FirstFlushable,
            payload: Vec::new(),
        }
    }

    /// Inbound ACL data for `handle`.
    pub fn acl_data(handle: u16, boundary: PacketBoundary, data: &[u8]) -> Result<Self, Error> {
        if data.len() > ACL_DATA_MAX {
            return Err(Error::PayloadTooLong);
        }
        let mut r = Self::new(PduKind::AclData, Some(handle), data)?;
        r.boundary = boundary;
        Ok(r)
    }

    /// Disconnection Complete parameters.
    pub fn disconnection(handle: u16, reason: u8) -> Self {
        let mut p = Vec::new();
        unwrap!(p.push(0x00)); // status
        unwrap!(p.extend_from_slice(&handle.to_le_bytes()));
        unwrap!(p.push(reason));
        Self {
            kind: PduKind::Disconnection,
            handle: Some(handle),
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        }
    }

    /// LE Connection Complete parameters (without the sub-event code, which
    /// the encoder's meta-event envelope supplies).
    #[allow(clippy::too_many_arguments)]
    pub fn conn_complete(
        status: u8,
        handle: u16,
        role: u8,
        peer_addr_kind: u8,
        peer_addr: [u8; 6],
        interval: u16,
        latency: u16,
        timeout: u16,
        clock_accuracy: u8,
    ) -> Self {
        let mut p = Vec::new();
        unwrap!(p.push(status));
        unwrap!(p.extend_from_slice(&handle.to_le_bytes()));
        unwrap!(p.push(role));
        unwrap!(p.push(peer_addr_kind));
        unwrap!(p.extend_from_slice(&peer_addr));
        unwrap!(p.extend_from_slice(&interval.to_le_bytes()));
        unwrap!(p.extend_from_slice(&latency.to_le_bytes()));
        unwrap!(p.extend_from_slice(&timeout.to_le_bytes()));
        unwrap!(p.push(clock_accuracy));
        Self {
            kind: PduKind::ConnComplete,
            handle: Some(handle),
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        }
    }

    /// Single legacy advertising report.
    pub fn adv_report(
        event_kind: u8,
        addr_kind: u8,
        addr: [u8; 6],
        data: &[u8],
        rssi: i8,
    ) -> Result<Self, Error> {
        if data.len() > ADV_DATA_MAX {
            return Err(Error::PayloadTooLong);
        }
        let mut p = Vec::new();
        unwrap!(p.push(1)); // num_reports
        unwrap!(p.push(event_kind));
        unwrap!(p.push(addr_kind));
        unwrap!(p.extend_from_slice(&addr));
        unwrap!(p.push(data.len() as u8));
        unwrap!(p.extend_from_slice(data));
        unwrap!(p.push(rssi as u8));
        Ok(Self {
            kind: PduKind::AdvReport,
            handle: None,
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        })
    }

    /// Single extended advertising report.
    #[allow(clippy::too_many_arguments)]
    pub fn ext_adv_report(
        event_kind: u16,
        addr_kind: u8,
        addr: [u8; 6],
        primary_phy: u8,
        secondary_phy: u8,
        sid: u8,
        tx_power: i8,
        rssi: i8,
        data: &[u8],
    ) -> Result<Self, Error> {
        if data.len() > EXT_ADV_DATA_MAX {
            return Err(Error::PayloadTooLong);
        }
        let mut p = Vec::new();
        unwrap!(p.push(1)); // num_reports
        unwrap!(p.extend_from_slice(&event_kind.to_le_bytes()));
        unwrap!(p.push(addr_kind));
        unwrap!(p.extend_from_slice(&addr));
        unwrap!(p.push(primary_phy));
        unwrap!(p.push(secondary_phy));
        unwrap!(p.push(sid));
        unwrap!(p.push(tx_power as u8));
        unwrap!(p.push(rssi as u8));
        unwrap!(p.extend_from_slice(&0u16.to_le_bytes())); // periodic adv interval
        unwrap!(p.push(0xff)); // direct addr kind: none
        unwrap!(p.extend_from_slice(&[0; 6]));
        unwrap!(p.push(data.len() as u8));
        unwrap!(p.extend_from_slice(data));
        Ok(Self {
            kind: PduKind::ExtAdvReport,
            handle: None,
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        })
    }

    /// Scan request received while advertising.
    pub fn scan_req_received(adv_handle: u8, scanner_addr_kind: u8, scanner_addr: [u8; 6]) -> Self {
        let mut p = Vec::new();
        unwrap!(p.push(adv_handle));
        unwrap!(p.push(scanner_addr_kind));
        unwrap!(p.extend_from_slice(&scanner_addr));
        Self {
            kind: PduKind::ScanReqReceived,
            handle: None,
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        }
    }

    /// LE Connection Update Complete parameters.
    pub fn conn_update(status: u8, handle: u16, interval: u16, latency: u16, timeout: u16) -> Self {
        let mut p = Vec::new();
        unwrap!(p.push(status));
        unwrap!(p.extend_from_slice(&handle.to_le_bytes()));
        unwrap!(p.extend_from_slice(&interval.to_le_bytes()));
        unwrap!(p.extend_from_slice(&latency.to_le_bytes()));
        unwrap!(p.extend_from_slice(&timeout.to_le_bytes()));
        Self {
            kind: PduKind::ConnUpdate,
            handle: Some(handle),
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        }
    }

    /// Encryption Change parameters.
    pub fn encryption_change(status: u8, handle: u16, enabled: bool) -> Self {
        let mut p = Vec::new();
        unwrap!(p.push(status));
        unwrap!(p.extend_from_slice(&handle.to_le_bytes()));
        unwrap!(p.push(enabled as u8));
        Self {
            kind: PduKind::EncryptionChange,
            handle: Some(handle),
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        }
    }

    /// LE PHY Update Complete parameters.
    pub fn phy_update(status: u8, handle: u16, tx_phy: u8, rx_phy: u8) -> Self {
        let mut p = Vec::new();
        unwrap!(p.push(status));
        unwrap!(p.extend_from_slice(&handle.to_le_bytes()));
        unwrap!(p.push(tx_phy));
        unwrap!(p.push(rx_phy));
        Self {
            kind: PduKind::PhyUpdate,
            handle: Some(handle),
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        }
    }

    /// LE Data Length Change parameters.
    pub fn data_len_change(
        handle: u16,
        max_tx_octets: u16,
        max_tx_time: u16,
        max_rx_octets: u16,
        max_rx_time: u16,
    ) -> Self {
        let mut p = Vec::new();
        unwrap!(p.extend_from_slice(&handle.to_le_bytes()));
        unwrap!(p.extend_from_slice(&max_tx_octets.to_le_bytes()));
        unwrap!(p.extend_from_slice(&max_tx_time.to_le_bytes()));
        unwrap!(p.extend_from_slice(&max_rx_octets.to_le_bytes()));
        unwrap!(p.extend_from_slice(&max_rx_time.to_le_bytes()));
        Self {
            kind: PduKind::DataLenChange,
            handle: Some(handle),
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        }
    }

    /// LE Read Remote Features Complete parameters.
    pub fn remote_features(status: u8, handle: u16, features: [u8; 8]) -> Self {
        let mut p = Vec::new();
        unwrap!(p.push(status));
        unwrap!(p.extend_from_slice(&handle.to_le_bytes()));
        unwrap!(p.extend_from_slice(&features));
        Self {
            kind: PduKind::RemoteFeatures,
            handle: Some(handle),
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        }
    }

    /// Read Remote Version Information Complete parameters.
    pub fn remote_version(
        status: u8,
        handle: u16,
        version: u8,
        manufacturer: u16,
        subversion: u16,
    ) -> Self {
        let mut p = Vec::new();
        unwrap!(p.push(status));
        unwrap!(p.extend_from_slice(&handle.to_le_bytes()));
        unwrap!(p.push(version));
        unwrap!(p.extend_from_slice(&manufacturer.to_le_bytes()));
        unwrap!(p.extend_from_slice(&subversion.to_le_bytes()));
        Self {
            kind: PduKind::RemoteVersion,
            handle: Some(handle),
            boundary: PacketBoundary::FirstFlushable,
            payload: p,
        }
    }
}

impl core::fmt::Debug for RxRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RxRecord")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("len", &self.payload.len())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RxRecord {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "RxRecord {{ kind: {}, handle: {}, len: {} }}",
            self.kind,
            self.handle,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnection_parameter_block() {
        let r = RxRecord::disconnection(0x0123, 0x13);
        assert_eq!(r.kind(), PduKind::Disconnection);
        assert_eq!(r.handle(), Some(0x0123));
        assert_eq!(r.payload(), &[0x00, 0x23, 0x01, 0x13]);
    }

    #[test]
    fn conn_complete_parameter_block_is_little_endian() {
        let r = RxRecord::conn_complete(
            0x00,
            0x0002,
            0x01,
            0x00,
            [1, 2, 3, 4, 5, 6],
            0x0028,
            0x0000,
            0x01f4,
            0x05,
        );
        assert_eq!(
            r.payload(),
            &[
                0x00, 0x02, 0x00, 0x01, 0x00, 1, 2, 3, 4, 5, 6, 0x28, 0x00, 0x00, 0x00, 0xf4,
                0x01, 0x05
            ]
        );
    }

    #[test]
    fn adv_report_data_limit() {
        let data = [0u8; ADV_DATA_MAX + 1];
        assert_eq!(
            RxRecord::adv_report(0, 0, [0; 6], &data, -40).unwrap_err(),
            Error::PayloadTooLong
        );

        let r = RxRecord::adv_report(0x00, 0x01, [9; 6], &[0xde, 0xad], -40).unwrap();
        assert_eq!(
            r.payload(),
            &[1, 0x00, 0x01, 9, 9, 9, 9, 9, 9, 2, 0xde, 0xad, (-40i8) as u8]
        );
    }

    #[test]
    fn acl_data_keeps_boundary_flag() {
        let r = RxRecord::acl_data(0x0040, PacketBoundary::Continuation, &[1, 2, 3]).unwrap();
        assert_eq!(r.boundary(), PacketBoundary::Continuation);
        assert_eq!(r.payload(), &[1, 2, 3]);

        let too_long = [0u8; ACL_DATA_MAX + 1];
        assert!(RxRecord::acl_data(0, PacketBoundary::FirstFlushable, &too_long).is_err());
    }
}
