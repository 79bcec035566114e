#![no_std]
#![doc = include_str!("../README.md")]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod buf;
pub mod class;
pub mod cmd;
pub mod evt;
pub mod flow;
pub mod ll;
pub mod opcode;
pub mod rx;
pub mod vendor;

pub use buf::{BufPool, WireBuffer};
pub use class::{classify, HciClass};
pub use cmd::{AclOutcome, HciBridge};
pub use evt::EvtOutcome;
pub use flow::FlowControl;
pub use ll::LinkLayer;
pub use rx::{PacketBoundary, PduKind, RxRecord};
pub use vendor::VendorCommands;
