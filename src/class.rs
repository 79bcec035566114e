//! Receive-record priority classification.
//!
//! Classes drive the drop/keep decision under buffer pressure: discardable
//! events may be dropped in place, everything else must eventually reach the
//! host. Classification is a pure function of the PDU subtype; it never
//! consults queue occupancy or flow-control state.

use crate::rx::PduKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HciClass {
    /// No host-visible packet; the record is only released.
    None,
    /// Must be delivered: connection established / terminated.
    Required,
    /// Best-effort reporting, droppable over HCI on overflow.
    Discardable,
    /// Connection management: update, encryption, data length, PHY.
    Connection,
    /// Link-Layer control procedure results.
    Llcp,
    /// ACL data, additionally gated by the flow controller.
    AclData,
}

impl HciClass {
    /// Whether the class must eventually reach the host (retry, never drop).
    pub fn must_deliver(self) -> bool {
        matches!(self, Self::Required | Self::Connection | Self::Llcp)
    }
}

/// Map a PDU subtype to its priority class.
pub const fn classify(kind: PduKind) -> HciClass {
    match kind {
        PduKind::AdvReport | PduKind::ExtAdvReport | PduKind::ScanReqReceived => {
            HciClass::Discardable
        }
        PduKind::ConnComplete | PduKind::Disconnection => HciClass::Required,
        PduKind::ConnUpdate
        | PduKind::EncryptionChange
        | PduKind::PhyUpdate
        | PduKind::DataLenChange => HciClass::Connection,
        PduKind::RemoteFeatures | PduKind::RemoteVersion => HciClass::Llcp,
        PduKind::AclData => HciClass::AclData,
        PduKind::Release => HciClass::None,
    }
}
