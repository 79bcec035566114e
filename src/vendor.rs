//! Vendor-specific command surface.
//!
//! The dispatcher forwards every opcode in the vendor group here. Two OCFs
//! have a fixed meaning across products and are handled by
//! [`cmd_handle`] itself against the [`VendorCommands`] capability trait;
//! anything else falls through to [`VendorCommands::handle`] and finally to
//! an unknown-command status.

use crate::buf::{BufPool, WireBuffer};
use crate::evt;
use crate::opcode::{status, Opcode};

pub const OCF_READ_STATIC_ADDRS: u16 = 0x0009;
pub const OCF_READ_KEY_HIERARCHY_ROOTS: u16 = 0x000a;

/// Static addresses fitting one Command Complete event:
/// 3 completion bytes + status + count + n * (6-byte address + 16-byte IR).
pub const STATIC_ADDRS_MAX: usize = (evt::EVT_PARAMS_MAX - 5) / 22;

const STATIC_ADDRS_RET_MAX: usize = 2 + STATIC_ADDRS_MAX * 22;

/// One static device address with its identity-resolving key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StaticAddr {
    pub bdaddr: [u8; 6],
    pub ir: [u8; 16],
}

impl StaticAddr {
    pub const EMPTY: Self = Self {
        bdaddr: [0; 6],
        ir: [0; 16],
    };
}

/// Result of filling a static-address slice: truncation is distinct from
/// success, and the caller decides whether to treat it as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddrFill {
    /// All known addresses fit; `0..n` of the output slice are valid.
    Complete(usize),
    /// More addresses exist than the slice can hold.
    Truncated(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum KeyRootsError {
    /// Secure storage could not produce the roots.
    Unavailable,
}

/// The two 16-byte key hierarchy roots.
#[derive(Clone, Copy)]
pub struct KeyRoots {
    pub identity_root: [u8; 16],
    pub encryption_root: [u8; 16],
}

/// Manufacturer-specific extension point.
pub trait VendorCommands {
    /// Fill `out` with known static device addresses.
    fn read_static_addrs(&self, out: &mut [StaticAddr]) -> AddrFill;

    /// Retrieve the identity and encryption roots from secure storage.
    /// On error the initiating command fails whole; no partial keys leave
    /// this call.
    fn read_key_hierarchy_roots(&self) -> Result<KeyRoots, KeyRootsError>;

    /// Product-specific OCFs outside the common set. Return `None` to fall
    /// through to an unknown-command response.
    fn handle(&mut self, ocf: u16, params: &[u8], pool: &'static BufPool) -> Option<WireBuffer> {
        let _ = (ocf, params, pool);
        None
    }
}

pub(crate) fn cmd_handle<V: VendorCommands>(
    vendor: &mut V,
    pool: &'static BufPool,
    opcode: Opcode,
    params: &[u8],
) -> Option<WireBuffer> {
    match opcode.ocf() {
        OCF_READ_STATIC_ADDRS => read_static_addrs_evt(vendor, pool, opcode, params),
        OCF_READ_KEY_HIERARCHY_ROOTS => read_key_roots_evt(vendor, pool, opcode, params),
        ocf => vendor
            .handle(ocf, params, pool)
            .or_else(|| evt::cmd_status(pool, opcode, status::UNKNOWN_CMD)),
    }
}

fn read_static_addrs_evt<V: VendorCommands>(
    vendor: &V,
    pool: &'static BufPool,
    opcode: Opcode,
    params: &[u8],
) -> Option<WireBuffer> {
    if !params.is_empty() {
        return evt::cmd_status(pool, opcode, status::INVALID_PARAMS);
    }

    let mut addrs = [StaticAddr::EMPTY; STATIC_ADDRS_MAX];
    let count = match vendor.read_static_addrs(&mut addrs) {
        AddrFill::Complete(n) => n,
        AddrFill::Truncated(n) => {
            warn!("static address list truncated to {}", n);
            n
        }
    };
    let count = count.min(STATIC_ADDRS_MAX);

    let mut ret = heapless::Vec::<u8, STATIC_ADDRS_RET_MAX>::new();
    unwrap!(ret.push(status::SUCCESS));
    unwrap!(ret.push(count as u8));
    for addr in &addrs[..count] {
        unwrap!(ret.extend_from_slice(&addr.bdaddr));
        unwrap!(ret.extend_from_slice(&addr.ir));
    }
    evt::cmd_complete(pool, opcode, &ret)
}

fn read_key_roots_evt<V: VendorCommands>(
    vendor: &V,
    pool: &'static BufPool,
    opcode: Opcode,
    params: &[u8],
) -> Option<WireBuffer> {
    if !params.is_empty() {
        return evt::cmd_status(pool, opcode, status::INVALID_PARAMS);
    }

    match vendor.read_key_hierarchy_roots() {
        Ok(roots) => {
            let mut ret = heapless::Vec::<u8, 33>::new();
            unwrap!(ret.push(status::SUCCESS));
            unwrap!(ret.extend_from_slice(&roots.identity_root));
            unwrap!(ret.extend_from_slice(&roots.encryption_root));
            evt::cmd_complete(pool, opcode, &ret)
        }
        Err(e) => {
            warn!("key hierarchy roots unavailable: {:?}", e);
            evt::cmd_complete(pool, opcode, &[status::UNSPECIFIED])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::ogf;

    struct TestVendor {
        addrs: heapless::Vec<StaticAddr, 16>,
        roots: Option<KeyRoots>,
    }

    impl VendorCommands for TestVendor {
        fn read_static_addrs(&self, out: &mut [StaticAddr]) -> AddrFill {
            let n = self.addrs.len().min(out.len());
            out[..n].copy_from_slice(&self.addrs[..n]);
            if n < self.addrs.len() {
                AddrFill::Truncated(n)
            } else {
                AddrFill::Complete(n)
            }
        }

        fn read_key_hierarchy_roots(&self) -> Result<KeyRoots, KeyRootsError> {
            self.roots.ok_or(KeyRootsError::Unavailable)
        }
    }

    fn sample_addr(seed: u8) -> StaticAddr {
        StaticAddr {
            bdaddr: [seed; 6],
            ir: [seed.wrapping_add(1); 16],
        }
    }

    #[test]
    fn static_addrs_complete() {
        static POOL: BufPool = BufPool::new();

        let mut v = TestVendor {
            addrs: heapless::Vec::new(),
            roots: None,
        };
        v.addrs.push(sample_addr(0xc0)).unwrap();

        let op = Opcode::new(ogf::VS, OCF_READ_STATIC_ADDRS);
        let buf = cmd_handle(&mut v, &POOL, op, &[]).unwrap();
        let bytes = buf.as_slice();
        // Command Complete, ncmd, opcode, status, count, then the entry.
        assert_eq!(bytes[0], 0x0e);
        assert_eq!(&bytes[2..5], &[1, op.raw() as u8, (op.raw() >> 8) as u8]);
        assert_eq!(bytes[5], status::SUCCESS);
        assert_eq!(bytes[6], 1);
        assert_eq!(&bytes[7..13], &[0xc0; 6]);
        assert_eq!(&bytes[13..29], &[0xc1; 16]);
    }

    #[test]
    fn static_addrs_truncated_still_reports_what_fits() {
        static POOL: BufPool = BufPool::new();

        let mut v = TestVendor {
            addrs: heapless::Vec::new(),
            roots: None,
        };
        for i in 0..16 {
            v.addrs.push(sample_addr(i)).unwrap();
        }

        let op = Opcode::new(ogf::VS, OCF_READ_STATIC_ADDRS);
        let buf = cmd_handle(&mut v, &POOL, op, &[]).unwrap();
        assert_eq!(buf.as_slice()[6] as usize, STATIC_ADDRS_MAX);
    }

    #[test]
    fn key_roots_success_layout() {
        static POOL: BufPool = BufPool::new();

        let mut v = TestVendor {
            addrs: heapless::Vec::new(),
            roots: Some(KeyRoots {
                identity_root: [0x11; 16],
                encryption_root: [0x22; 16],
            }),
        };

        let op = Opcode::new(ogf::VS, OCF_READ_KEY_HIERARCHY_ROOTS);
        let buf = cmd_handle(&mut v, &POOL, op, &[]).unwrap();
        let bytes = buf.as_slice();
        assert_eq!(bytes[5], status::SUCCESS);
        assert_eq!(&bytes[6..22], &[0x11; 16]);
        assert_eq!(&bytes[22..38], &[0x22; 16]);
    }

    #[test]
    fn key_roots_failure_returns_no_partial_material() {
        static POOL: BufPool = BufPool::new();

        let mut v = TestVendor {
            addrs: heapless::Vec::new(),
            roots: None,
        };

        let op = Opcode::new(ogf::VS, OCF_READ_KEY_HIERARCHY_ROOTS);
        let buf = cmd_handle(&mut v, &POOL, op, &[]).unwrap();
        let bytes = buf.as_slice();
        assert_eq!(bytes[1], 4); // ncmd + opcode + status only
        assert_eq!(bytes[5], status::UNSPECIFIED);
    }

    #[test]
    fn unknown_vendor_ocf_falls_through_to_status() {
        static POOL: BufPool = BufPool::new();

        let mut v = TestVendor {
            addrs: heapless::Vec::new(),
            roots: None,
        };

        let op = Opcode::new(ogf::VS, 0x03aa);
        let buf = cmd_handle(&mut v, &POOL, op, &[1, 2, 3]).unwrap();
        let bytes = buf.as_slice();
        assert_eq!(bytes[0], 0x0f);
        assert_eq!(bytes[2], status::UNKNOWN_CMD);
        assert_eq!(&bytes[4..6], &op.raw().to_le_bytes());
    }
}
