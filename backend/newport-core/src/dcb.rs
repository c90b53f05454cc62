//! Device control bus (DCB) multiplexer
//!
//! REX3 talks to every other chip on the board through the DCB. The DCB mode register selects
//! the slave, the register select within that slave, and the transfer width. Data moves through
//! the REX3 DCB data registers, left-justified in the most significant word.

use crate::cmap::Cmap;
use crate::ramdac::Ramdac;
use crate::vc2::Vc2;
use crate::xmap9::Xmap9;
use bincode::{Decode, Encode};
use newport_common::num::GetBit;
use newport_config::NewportBoard;
use std::time::Duration;

/// One-shot timer owned by the surrounding system, used to abandon accesses to slaves that never
/// acknowledge. At most one timeout is outstanding at a time.
pub trait DcbTimeoutScheduler {
    /// Request a call to [`crate::Newport::dcb_timeout_expired`] after `delay`, replacing
    /// any pending request.
    fn schedule(&mut self, delay: Duration);

    fn cancel(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum DcbSlave {
    Vc2 = 0,
    Cmap01 = 1,
    Cmap0 = 2,
    Cmap1 = 3,
    Xmap01 = 4,
    Xmap0 = 5,
    Xmap1 = 6,
    Ramdac = 7,
    Cc1 = 8,
    Ab1 = 9,
}

impl DcbSlave {
    /// Returns `None` for slave addresses that nothing on the board answers, including the
    /// presence-detect address 12.
    fn from_address(address: u32) -> Option<Self> {
        match address {
            0 => Some(Self::Vc2),
            1 => Some(Self::Cmap01),
            2 => Some(Self::Cmap0),
            3 => Some(Self::Cmap1),
            4 => Some(Self::Xmap01),
            5 => Some(Self::Xmap0),
            6 => Some(Self::Xmap1),
            7 => Some(Self::Ramdac),
            8 => Some(Self::Cc1),
            9 => Some(Self::Ab1),
            _ => None,
        }
    }
}

/// Decoded DCB mode register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct DcbMode {
    /// Transfer width in bytes, 1-4
    pub width: u32,
    pub data_packing: bool,
    pub register_select_increment: bool,
    pub register_select: u32,
    pub slave_address: u32,
}

impl DcbMode {
    #[must_use]
    pub fn from_word(value: u32) -> Self {
        let width = match value.bits(0..=1) {
            0 => 4,
            width => width,
        };

        Self {
            width,
            data_packing: value.bit(2),
            register_select_increment: value.bit(3),
            register_select: value.bits(4..=6),
            slave_address: value.bits(7..=10),
        }
    }

    #[must_use]
    pub fn slave(self) -> Option<DcbSlave> {
        DcbSlave::from_address(self.slave_address)
    }

    fn unused_bits(self) -> u32 {
        32 - 8 * self.width
    }

    /// Convert a left-justified data register value into the value the slave sees.
    #[must_use]
    pub fn right_justify(self, msw: u32) -> u32 {
        if self.width == 4 { msw } else { msw >> self.unused_bits() }
    }

    #[must_use]
    pub fn left_justify(self, value: u32) -> u32 {
        if self.width == 4 { value } else { value << self.unused_bits() }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Dcb {
    vc2: Vc2,
    cmap0: Cmap,
    cmap1: Cmap,
    xmap0: Xmap9,
    xmap1: Xmap9,
    ramdac: Ramdac,
    cc1: [u32; 8],
    ab1: [u32; 8],
    timeout_us: u32,
    busy: bool,
    timed_out: bool,
}

impl Dcb {
    #[must_use]
    pub fn new(board: NewportBoard, timeout_us: u32) -> Self {
        Self {
            vc2: Vc2::new(),
            cmap0: Cmap::new(board.cmap_revision()),
            cmap1: Cmap::new(board.cmap_revision()),
            xmap0: Xmap9::new(board.xmap9_revision()),
            xmap1: Xmap9::new(board.xmap9_revision()),
            ramdac: Ramdac::new(),
            cc1: [0; 8],
            ab1: [0; 8],
            timeout_us,
            busy: false,
            timed_out: false,
        }
    }

    /// Soft reset. Palettes and mode tables survive; the RAMDAC LUTs are not touched by REX3
    /// reset.
    pub fn reset<S: DcbTimeoutScheduler>(&mut self, scheduler: &mut S) {
        self.vc2.reset();
        self.cmap0.reset();
        self.cmap1.reset();
        self.xmap0.reset();
        self.xmap1.reset();
        self.cc1 = [0; 8];
        self.ab1 = [0; 8];
        self.abort(scheduler);
    }

    fn begin_access<S: DcbTimeoutScheduler>(
        &mut self,
        mode: DcbMode,
        scheduler: &mut S,
    ) -> Option<DcbSlave> {
        self.timed_out = false;

        match mode.slave() {
            Some(slave) => {
                if self.busy {
                    scheduler.cancel();
                    self.busy = false;
                }
                Some(slave)
            }
            None => {
                log::debug!(
                    "DCB access to non-responding slave {}, starting {}us timeout",
                    mode.slave_address,
                    self.timeout_us
                );
                self.busy = true;
                scheduler.schedule(Duration::from_micros(self.timeout_us.into()));
                None
            }
        }
    }

    /// Write the (left-justified) data register to the slave selected by `mode`.
    pub fn write<S: DcbTimeoutScheduler>(&mut self, mode: DcbMode, msw: u32, scheduler: &mut S) {
        let Some(slave) = self.begin_access(mode, scheduler) else { return };

        let value = mode.right_justify(msw);
        let register = mode.register_select;

        log::trace!("DCB write: {slave:?} register {register} = {value:08X}");

        match slave {
            DcbSlave::Vc2 => self.vc2.write(register, value, mode.width),
            DcbSlave::Cmap01 => {
                self.cmap0.write(register, value);
                self.cmap1.write(register, value);
            }
            DcbSlave::Cmap0 => self.cmap0.write(register, value),
            DcbSlave::Cmap1 => self.cmap1.write(register, value),
            DcbSlave::Xmap01 => {
                self.xmap0.write(register, value);
                self.xmap1.write(register, value);
            }
            DcbSlave::Xmap0 => self.xmap0.write(register, value),
            DcbSlave::Xmap1 => self.xmap1.write(register, value),
            DcbSlave::Ramdac => self.ramdac.write(register, value),
            DcbSlave::Cc1 => self.cc1[register as usize] = value,
            DcbSlave::Ab1 => self.ab1[register as usize] = value,
        }
    }

    /// Read from the slave selected by `mode`. Returns the new left-justified data register
    /// value, which is `current_msw` unchanged if nothing responds.
    pub fn read<S: DcbTimeoutScheduler>(
        &mut self,
        mode: DcbMode,
        current_msw: u32,
        scheduler: &mut S,
    ) -> u32 {
        let Some(slave) = self.begin_access(mode, scheduler) else { return current_msw };

        let register = mode.register_select;
        let value = match slave {
            DcbSlave::Vc2 => self.vc2.read(register),
            DcbSlave::Cmap01 | DcbSlave::Cmap0 => self.cmap0.read(register),
            DcbSlave::Cmap1 => self.cmap1.read(register),
            DcbSlave::Xmap01 | DcbSlave::Xmap0 => self.xmap0.read(register),
            DcbSlave::Xmap1 => self.xmap1.read(register),
            DcbSlave::Ramdac => self.ramdac.read(register),
            DcbSlave::Cc1 => self.cc1[register as usize],
            DcbSlave::Ab1 => self.ab1[register as usize],
        };

        log::trace!("DCB read: {slave:?} register {register} = {value:08X}");

        mode.left_justify(value)
    }

    /// The scheduled timeout fired without any slave responding.
    pub fn timeout_expired(&mut self) {
        if !self.busy {
            return;
        }

        log::debug!("DCB access timed out");
        self.busy = false;
        self.timed_out = true;
    }

    /// DCB reset: abandon any transfer in flight without touching the slaves.
    pub fn abort<S: DcbTimeoutScheduler>(&mut self, scheduler: &mut S) {
        if self.busy {
            scheduler.cancel();
        }
        self.busy = false;
        self.timed_out = false;
    }

    #[must_use]
    pub fn busy(&self) -> bool {
        self.busy
    }

    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    #[must_use]
    pub fn vc2(&self) -> &Vc2 {
        &self.vc2
    }

    pub fn vc2_mut(&mut self) -> &mut Vc2 {
        &mut self.vc2
    }

    #[must_use]
    pub fn cmap0(&self) -> &Cmap {
        &self.cmap0
    }

    #[must_use]
    pub fn cmap1(&self) -> &Cmap {
        &self.cmap1
    }

    #[must_use]
    pub fn xmap0(&self) -> &Xmap9 {
        &self.xmap0
    }

    #[must_use]
    pub fn xmap1(&self) -> &Xmap9 {
        &self.xmap1
    }

    #[must_use]
    pub fn ramdac(&self) -> &Ramdac {
        &self.ramdac
    }

    #[must_use]
    pub fn cc1(&self) -> &[u32; 8] {
        &self.cc1
    }

    #[must_use]
    pub fn ab1(&self) -> &[u32; 8] {
        &self.ab1
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingScheduler {
        pub scheduled: Vec<Duration>,
        pub cancels: u32,
    }

    impl DcbTimeoutScheduler for RecordingScheduler {
        fn schedule(&mut self, delay: Duration) {
            self.scheduled.push(delay);
        }

        fn cancel(&mut self) {
            self.cancels += 1;
        }
    }

    fn mode_word(slave: u32, register: u32, width: u32) -> u32 {
        (slave << 7) | (register << 4) | (width & 3)
    }

    #[test]
    fn mode_decode() {
        let mode = DcbMode::from_word(mode_word(5, 7, 2) | 0x0C);
        assert_eq!(mode.slave(), Some(DcbSlave::Xmap0));
        assert_eq!(mode.register_select, 7);
        assert_eq!(mode.width, 2);
        assert!(mode.register_select_increment);
        assert!(mode.data_packing);

        assert_eq!(DcbMode::from_word(0).width, 4);
        assert_eq!(DcbMode::from_word(mode_word(12, 0, 1)).slave(), None);
    }

    #[test]
    fn data_is_right_justified_for_slaves() {
        let mut dcb = Dcb::new(NewportBoard::Xl24, 1000);
        let mut scheduler = RecordingScheduler::default();

        // Two-byte write of the full 16-bit CMAP palette index
        let mode = DcbMode::from_word(mode_word(2, 0, 2));
        dcb.write(mode, 0x1234_0000, &mut scheduler);
        assert_eq!(dcb.cmap0().palette_index(), 0x1234);
        assert_eq!(dcb.cmap1().palette_index(), 0);

        let read = dcb.read(mode, 0, &mut scheduler);
        assert_eq!(read, 0x1234_0000);
        assert!(scheduler.scheduled.is_empty());
    }

    #[test]
    fn paired_slaves_write_both_chips() {
        let mut dcb = Dcb::new(NewportBoard::Xl8, 1000);
        let mut scheduler = RecordingScheduler::default();

        dcb.write(DcbMode::from_word(mode_word(4, 0, 1)), 0x0400_0000, &mut scheduler);
        assert!(dcb.xmap0().is_8bpp());
        assert!(dcb.xmap1().is_8bpp());

        let revision = dcb.read(DcbMode::from_word(mode_word(6, 1, 1)), 0, &mut scheduler);
        assert_eq!(revision, 0x0100_0000);
    }

    #[test]
    fn non_responding_slave_times_out() {
        let mut dcb = Dcb::new(NewportBoard::Xl24, 250);
        let mut scheduler = RecordingScheduler::default();

        let mode = DcbMode::from_word(mode_word(12, 0, 0));
        assert_eq!(dcb.read(mode, 0xDEAD_BEEF, &mut scheduler), 0xDEAD_BEEF);
        assert!(dcb.busy());
        assert!(!dcb.timed_out());
        assert_eq!(scheduler.scheduled, vec![Duration::from_micros(250)]);

        dcb.timeout_expired();
        assert!(!dcb.busy());
        assert!(dcb.timed_out());

        // A later access clears the timeout flag
        dcb.write(DcbMode::from_word(mode_word(0, 0, 1)), 0x1000_0000, &mut scheduler);
        assert!(!dcb.timed_out());
        assert_eq!(scheduler.cancels, 0);
    }

    #[test]
    fn responding_slave_cancels_pending_timeout() {
        let mut dcb = Dcb::new(NewportBoard::Xl24, 1000);
        let mut scheduler = RecordingScheduler::default();

        dcb.write(DcbMode::from_word(mode_word(15, 0, 0)), 0, &mut scheduler);
        assert!(dcb.busy());

        dcb.write(DcbMode::from_word(mode_word(7, 2, 1)), 0x4000_0000, &mut scheduler);
        assert!(!dcb.busy());
        assert_eq!(scheduler.cancels, 1);
        assert_eq!(dcb.ramdac().command(), 0x40);

        // A stale expiry after cancellation is ignored
        dcb.timeout_expired();
        assert!(!dcb.timed_out());
    }
}
