//! Host ACL flow control and cross-context control state.
//!
//! The host grants a credit window via Host Buffer Size and returns credits
//! with Host Number Of Completed Packets; the controller may keep at most
//! `total` unacknowledged ACL packets in flight. All counters are plain
//! atomics so the radio context never waits on a lock held by the host
//! command context.
//!
//! `total` encoding: negative means controller-to-host flow control is
//! disabled (the magnitude remembers the host-configured count, if any, so
//! Set Controller To Host Flow Control can re-enable it); non-negative means
//! enabled with that many credits.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicI32, AtomicU32, Ordering};

use crate::opcode::status;

/// Reset-in-progress bit in the control state mask.
const STATE_BIT_RESET: u8 = 0;

/// Atomic bit-set for conditions shared between the radio and host-command
/// contexts.
struct ControlState {
    flags: AtomicU32,
}

impl ControlState {
    const fn new() -> Self {
        Self {
            flags: AtomicU32::new(0),
        }
    }

    fn set_bit(&self, idx: u8) {
        self.flags.fetch_or(1 << idx, Ordering::SeqCst);
    }

    fn clear_bit(&self, idx: u8) {
        self.flags.fetch_and(!(1 << idx), Ordering::SeqCst);
    }

    fn is_bit_set(&self, idx: u8) -> bool {
        (self.flags.load(Ordering::SeqCst) & (1 << idx)) != 0
    }
}

/// ACL credit window shared between the radio producer and the host command
/// context.
pub struct FlowControl {
    total: AtomicI32,
    sent: AtomicU32,
    acked: AtomicU32,
    state: ControlState,
    host_buf: Signal<CriticalSectionRawMutex, ()>,
}

impl FlowControl {
    /// Flow control starts disabled; the host must configure and enable it.
    pub const fn new() -> Self {
        Self {
            total: AtomicI32::new(-1),
            sent: AtomicU32::new(0),
            acked: AtomicU32::new(0),
            state: ControlState::new(),
            host_buf: Signal::new(),
        }
    }

    pub fn total(&self) -> i32 {
        self.total.load(Ordering::Acquire)
    }

    pub fn sent(&self) -> u32 {
        self.sent.load(Ordering::Acquire)
    }

    pub fn acked(&self) -> u32 {
        self.acked.load(Ordering::Acquire)
    }

    /// Overwrite the credit window. Bring-up hook; normal operation goes
    /// through [`host_buffer_size`](Self::host_buffer_size) and
    /// [`set_host_flow_enabled`](Self::set_host_flow_enabled).
    pub fn set_total(&self, total: i32) {
        self.total.store(total, Ordering::Release);
        self.host_buf.signal(());
    }

    /// Host Buffer Size: remember the host's ACL buffer count. Keeps the
    /// current enabled/disabled polarity.
    pub fn host_buffer_size(&self, acl_pkts: u16) -> u8 {
        let mut cur = self.total.load(Ordering::Acquire);
        loop {
            let new = if acl_pkts == 0 {
                -1
            } else if cur >= 0 {
                acl_pkts as i32
            } else {
                -(acl_pkts as i32)
            };
            match self
                .total
                .compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }
        self.host_buf.signal(());
        status::SUCCESS
    }

    /// Set Controller To Host Flow Control: flip the window polarity.
    /// Enabling before the host configured its buffers is disallowed.
    pub fn set_host_flow_enabled(&self, enable: bool) -> u8 {
        let mut cur = self.total.load(Ordering::Acquire);
        loop {
            let new = match (enable, cur) {
                (true, -1) => return status::CMD_DISALLOWED,
                (true, t) if t < 0 => -t,
                (true, t) => t,
                (false, 0) => -1,
                (false, t) if t > 0 => -t,
                (false, t) => t,
            };
            match self
                .total
                .compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }
        self.host_buf.signal(());
        status::SUCCESS
    }

    /// Whether a further ACL packet may be handed to the transport. Always
    /// false while a reset is draining.
    pub fn may_send(&self) -> bool {
        if self.state.is_bit_set(STATE_BIT_RESET) {
            return false;
        }
        let total = self.total.load(Ordering::Acquire);
        if total < 0 {
            return true;
        }
        let sent = self.sent.load(Ordering::Acquire);
        let acked = self.acked.load(Ordering::Acquire);
        sent.wrapping_sub(acked) < total as u32
    }

    /// Record one packet handed to the transport. The caller must have just
    /// confirmed [`may_send`](Self::may_send) under single-producer
    /// discipline; multi-producer callers use [`try_send`](Self::try_send).
    pub fn on_sent(&self) {
        // Never advance the counter mid-reset, even on a caller slip.
        if self.state.is_bit_set(STATE_BIT_RESET) {
            warn!("acl send recorded while reset in progress, ignored");
            return;
        }
        self.sent.fetch_add(1, Ordering::AcqRel);
    }

    /// Atomic check-then-act: claim one credit if the window allows and no
    /// reset is in progress.
    pub fn try_send(&self) -> bool {
        loop {
            if self.state.is_bit_set(STATE_BIT_RESET) {
                return false;
            }
            let total = self.total.load(Ordering::Acquire);
            let sent = self.sent.load(Ordering::Acquire);
            if total >= 0 {
                let acked = self.acked.load(Ordering::Acquire);
                if sent.wrapping_sub(acked) >= total as u32 {
                    return false;
                }
            }
            if self
                .sent
                .compare_exchange_weak(sent, sent.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Host returned `count` credits. Clamped so `acked` never passes `sent`.
    pub fn on_acked(&self, count: u16) {
        loop {
            let sent = self.sent.load(Ordering::Acquire);
            let acked = self.acked.load(Ordering::Acquire);
            let room = sent.wrapping_sub(acked);
            let add = (count as u32).min(room);
            if add < count as u32 {
                warn!("host returned {} credits, only {} in flight", count, room);
            }
            if add == 0 {
                break;
            }
            if self
                .acked
                .compare_exchange_weak(acked, acked + add, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        self.host_buf.signal(());
    }

    /// Begin a reset: raise the reset-in-progress bit and zero the window
    /// counters. `total` is host-configured and survives. The bit stays up
    /// until [`drain_complete`](Self::drain_complete); no ACL send advances
    /// `sent` in between.
    pub fn reset(&self) {
        critical_section::with(|_| {
            self.state.set_bit(STATE_BIT_RESET);
            self.sent.store(0, Ordering::Release);
            self.acked.store(0, Ordering::Release);
        });
    }

    /// Radio context confirms all in-flight activity referencing pre-reset
    /// state has drained.
    pub fn drain_complete(&self) {
        self.state.clear_bit(STATE_BIT_RESET);
    }

    pub fn is_resetting(&self) -> bool {
        self.state.is_bit_set(STATE_BIT_RESET)
    }

    /// Wait for the host to grant or return buffers (Host Buffer Size, Set
    /// Controller To Host Flow Control, Host Number Of Completed Packets).
    pub async fn host_buf_wait(&self) {
        self.host_buf.wait().await
    }

    /// Non-blocking probe of the host-buffer notification.
    pub fn host_buf_signaled(&self) -> bool {
        self.host_buf.signaled()
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        let flow = FlowControl::new();
        assert!(flow.total() < 0);
        assert!(flow.may_send());
        for _ in 0..100 {
            assert!(flow.try_send());
        }
    }

    #[test]
    fn window_boundary_flips_exactly_at_total() {
        let flow = FlowControl::new();
        flow.set_total(4);

        // Fill to one below the window: may_send stays true throughout.
        for sent in 0..4u32 {
            assert!(flow.may_send(), "window closed early at sent={}", sent);
            assert!(flow.try_send());
        }
        assert_eq!(flow.sent(), 4);
        assert!(!flow.may_send());
        assert!(!flow.try_send());

        // One ack reopens the window immediately.
        flow.on_acked(1);
        assert!(flow.may_send());
        assert!(flow.try_send());
        assert_eq!(flow.sent() - flow.acked(), 4);
        assert!(!flow.may_send());
    }

    #[test]
    fn partial_acks_keep_window_open() {
        let flow = FlowControl::new();
        flow.set_total(4);

        for _ in 0..3 {
            assert!(flow.try_send());
        }
        assert_eq!(flow.sent(), 3);
        assert!(flow.may_send());

        flow.on_acked(2);
        assert_eq!(flow.acked(), 2);
        assert!(flow.may_send());

        assert!(flow.try_send());
        assert_eq!(flow.sent(), 4);
        // 4 - 2 = 2 < 4: still open.
        assert!(flow.may_send());
    }

    #[test]
    fn invariants_hold_across_interleavings() {
        let flow = FlowControl::new();
        flow.set_total(3);

        let check = |flow: &FlowControl| {
            let (sent, acked, total) = (flow.sent(), flow.acked(), flow.total());
            assert!(acked <= sent);
            if total >= 0 {
                assert!(sent - acked <= total as u32);
            }
        };

        for step in 0..50u32 {
            if step % 3 == 0 {
                flow.on_acked(1 + (step % 2) as u16);
            } else {
                flow.try_send();
            }
            check(&flow);
        }
    }

    #[test]
    fn acked_clamps_to_sent() {
        let flow = FlowControl::new();
        flow.set_total(8);
        assert!(flow.try_send());
        flow.on_acked(5);
        assert_eq!(flow.acked(), 1);
        assert_eq!(flow.sent(), 1);
    }

    #[test]
    fn on_sent_single_producer_path() {
        let flow = FlowControl::new();
        flow.set_total(2);
        assert!(flow.may_send());
        flow.on_sent();
        assert!(flow.may_send());
        flow.on_sent();
        assert!(!flow.may_send());
    }

    #[test]
    fn reset_state_machine() {
        let flow = FlowControl::new();
        flow.set_total(4);
        assert!(flow.try_send());
        assert!(flow.try_send());
        flow.on_acked(1);

        flow.reset();
        assert!(flow.is_resetting());
        assert_eq!(flow.sent(), 0);
        assert_eq!(flow.acked(), 0);
        // Host-configured window survives a reset.
        assert_eq!(flow.total(), 4);
        // No send advances the counter while resetting.
        assert!(!flow.try_send());
        assert_eq!(flow.sent(), 0);

        flow.drain_complete();
        assert!(!flow.is_resetting());
        assert!(flow.try_send());
        assert_eq!(flow.sent(), 1);
    }

    #[test]
    fn single_producer_gate_closes_during_reset() {
        let flow = FlowControl::new();
        flow.set_total(4);
        assert!(flow.may_send());
        flow.on_sent();
        assert_eq!(flow.sent(), 1);

        flow.reset();
        // The documented may_send/on_sent pair must go quiet mid-reset.
        assert!(!flow.may_send());
        flow.on_sent();
        assert_eq!(flow.sent(), 0);

        flow.drain_complete();
        assert!(flow.may_send());
        flow.on_sent();
        assert_eq!(flow.sent(), 1);
    }

    #[test]
    fn host_buffer_size_and_enable_polarity() {
        let flow = FlowControl::new();

        // Enable before the host configured buffers: disallowed.
        assert_eq!(
            flow.set_host_flow_enabled(true),
            crate::opcode::status::CMD_DISALLOWED
        );

        assert_eq!(flow.host_buffer_size(6), crate::opcode::status::SUCCESS);
        assert_eq!(flow.total(), -6);
        assert!(flow.may_send()); // still disabled

        assert_eq!(
            flow.set_host_flow_enabled(true),
            crate::opcode::status::SUCCESS
        );
        assert_eq!(flow.total(), 6);

        assert_eq!(
            flow.set_host_flow_enabled(false),
            crate::opcode::status::SUCCESS
        );
        assert_eq!(flow.total(), -6);

        // Zero buffers behaves like unconfigured.
        flow.host_buffer_size(0);
        assert_eq!(flow.total(), -1);
    }

    #[test]
    fn host_buf_notification_raised_on_grants_and_acks() {
        let flow = FlowControl::new();
        assert!(!flow.host_buf_signaled());

        flow.host_buffer_size(4);
        assert!(flow.host_buf_signaled());

        let flow2 = FlowControl::new();
        flow2.set_total(4);
        assert!(flow2.try_send());
        flow2.on_acked(1);
        assert!(flow2.host_buf_signaled());
    }
}
