//! VC2 video timing and cursor generator
//!
//! The VC2 owns a private 32K-word RAM that holds the video timing tables, the display-ID (DID)
//! tables and the cursor glyph. Timing tables are decoded lazily: any write that can change the
//! display geometry marks the decoded window dirty, and the next call to
//! [`Vc2::update_timing`] re-derives it.

use bincode::{Decode, Encode};
use newport_common::boxedarray::BoxedWordArray;
use newport_common::num::GetBit;

pub const RAM_LEN_WORDS: usize = 0x8000;
const RAM_ADDR_MASK: u16 = (RAM_LEN_WORDS - 1) as u16;

// Indirect register indices
const VIDEO_ENTRY: usize = 0x00;
const CURSOR_ENTRY: usize = 0x01;
const CURSOR_X: usize = 0x02;
const CURSOR_Y: usize = 0x03;
const CURRENT_CURSOR_X: usize = 0x04;
const DID_ENTRY: usize = 0x05;
const SCANLINE_LENGTH: usize = 0x06;
const RAM_ADDR: usize = 0x07;
const VT_FRAME_PTR: usize = 0x08;
const VT_LINE_PTR: usize = 0x09;
const VT_LINE_RUN: usize = 0x0A;
const VT_LINE_COUNT: usize = 0x0B;
const CURSOR_TABLE_PTR: usize = 0x0C;
const WORK_CURSOR_Y: usize = 0x0D;
const DID_FRAME_PTR: usize = 0x0E;
const DID_LINE_PTR: usize = 0x0F;
const DISPLAY_CONTROL: usize = 0x10;
const CONFIG: usize = 0x1F;

const REGISTER_COUNT: usize = 0x20;

// DCB register selects
const SELECT_INDEX: u32 = 0;
const SELECT_REGISTER_DATA: u32 = 1;
const SELECT_RAM_DATA: u32 = 3;

// Display control bits
const DC_VBLANK_INT_ENABLE: u8 = 0;
const DC_DISPLAY_ENABLE: u8 = 1;
const DC_VIDEO_ENABLE: u8 = 2;
const DC_DID_ENABLE: u8 = 3;
const DC_CURSOR_FUNCTION: u8 = 4;
const DC_CURSOR_ENABLE: u8 = 7;
const DC_CURSOR_CROSSHAIR: u8 = 8;
const DC_CURSOR_SIZE_64: u8 = 9;

// Line sequence state word bits
const LINE_STATE_ACTIVE: u8 = 0;
const LINE_STATE_END_OF_LINE: u8 = 15;

const DID_END_OF_LINE: u16 = 0xFFFF;

// Bounds on table walks so that a malformed table cannot hang the decoder
const MAX_FRAME_TABLE_ENTRIES: usize = 4096;
const MAX_LINE_SEQUENCE_ENTRIES: usize = 1024;
const MAX_DID_ENTRIES_PER_LINE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum TimingState {
    #[default]
    Idle,
    Dirty,
}

/// Decoded active display window, inclusive on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct ActiveWindow {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl ActiveWindow {
    #[must_use]
    pub fn width(self) -> u32 {
        self.x1 - self.x0 + 1
    }

    #[must_use]
    pub fn height(self) -> u32 {
        self.y1 - self.y0 + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DidEntry {
    /// First pixel of the span this entry applies to
    pub x: u16,
    /// XMAP9 mode table index
    pub mode: u8,
}

impl DidEntry {
    fn from_word(word: u16) -> Self {
        Self { x: word >> 5, mode: (word & 0x1F) as u8 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum CursorMode {
    Glyph,
    Crosshair,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Vc2 {
    registers: [u16; REGISTER_COUNT],
    register_index: usize,
    ram: BoxedWordArray<RAM_LEN_WORDS>,
    timing_state: TimingState,
    window: Option<ActiveWindow>,
    timing_changed: bool,
    vblank: bool,
    vert_int: bool,
    did_line_cursor: u16,
}

impl Vc2 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registers: [0; REGISTER_COUNT],
            register_index: 0,
            ram: BoxedWordArray::new(),
            timing_state: TimingState::Idle,
            window: None,
            timing_changed: false,
            vblank: false,
            vert_int: false,
            did_line_cursor: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// DCB read. RAM data reads advance the RAM address register.
    #[must_use]
    pub fn read(&mut self, select: u32) -> u32 {
        match select {
            SELECT_INDEX => self.register_index as u32,
            SELECT_REGISTER_DATA => self.registers[self.register_index].into(),
            SELECT_RAM_DATA => {
                let addr = self.registers[RAM_ADDR] & RAM_ADDR_MASK;
                self.registers[RAM_ADDR] = addr.wrapping_add(1) & RAM_ADDR_MASK;
                self.ram[addr as usize].into()
            }
            _ => {
                log::warn!("VC2 read from unknown register select {select}");
                0
            }
        }
    }

    /// DCB write. `width` is the transfer width in bytes; an index write that is wider than one
    /// byte carries 16 bits of register data in its low half.
    pub fn write(&mut self, select: u32, value: u32, width: u32) {
        match select {
            SELECT_INDEX => {
                if width <= 1 {
                    self.register_index = (value & 0x1F) as usize;
                } else {
                    self.register_index = value.bits(16..=20) as usize;
                    self.write_register(self.register_index, value as u16);
                }
            }
            SELECT_REGISTER_DATA => self.write_register(self.register_index, value as u16),
            SELECT_RAM_DATA => {
                let addr = self.registers[RAM_ADDR] & RAM_ADDR_MASK;
                self.ram[addr as usize] = value as u16;
                self.registers[RAM_ADDR] = addr.wrapping_add(1) & RAM_ADDR_MASK;
                self.timing_state = TimingState::Dirty;

                log::trace!("VC2 RAM[{addr:04X}] = {:04X}", value as u16);
            }
            _ => {
                log::warn!("VC2 write to unknown register select {select}: {value:08X}");
            }
        }
    }

    fn write_register(&mut self, index: usize, value: u16) {
        self.registers[index] = value;

        match index {
            VT_FRAME_PTR => {
                self.timing_state = TimingState::Dirty;
                log::debug!("VC2 VT frame table pointer: {value:04X}");
            }
            DISPLAY_CONTROL => {
                self.timing_state = TimingState::Dirty;

                log::debug!("VC2 display control write: {value:04X}");
                log::debug!("  Vertical blank interrupt: {}", value.bit(DC_VBLANK_INT_ENABLE));
                log::debug!("  Display enabled: {}", value.bit(DC_DISPLAY_ENABLE));
                log::debug!("  Video enabled: {}", value.bit(DC_VIDEO_ENABLE));
                log::debug!("  DID enabled: {}", value.bit(DC_DID_ENABLE));
                log::debug!("  Cursor mode: {:?}", self.cursor_mode());
                log::debug!("  Cursor size: {}", self.cursor_size());
            }
            RAM_ADDR => {
                self.registers[RAM_ADDR] = value & RAM_ADDR_MASK;
            }
            CURSOR_X | CURSOR_Y => {
                log::trace!("VC2 cursor position: ({}, {})", self.cursor_x(), self.cursor_y());
            }
            VIDEO_ENTRY | CURSOR_ENTRY | CURRENT_CURSOR_X | DID_ENTRY | SCANLINE_LENGTH
            | VT_LINE_PTR | VT_LINE_RUN | VT_LINE_COUNT | CURSOR_TABLE_PTR | WORK_CURSOR_Y
            | DID_FRAME_PTR | DID_LINE_PTR | CONFIG => {
                log::trace!("VC2 register {index:02X} write: {value:04X}");
            }
            _ => {
                log::warn!("VC2 write to unknown register {index:02X}: {value:04X}");
            }
        }
    }

    #[inline]
    fn ram_word(&self, addr: u32) -> u16 {
        self.ram[(addr & u32::from(RAM_ADDR_MASK)) as usize]
    }

    /// Re-decode the VT frame table if anything that affects it has changed. Latches the
    /// timing-changed signal if the active window moved.
    pub fn update_timing(&mut self) -> TimingState {
        if self.timing_state == TimingState::Idle {
            return TimingState::Idle;
        }

        let window = self.decode_frame_table();
        if window != self.window {
            log::debug!("VC2 active window changed: {:?} -> {window:?}", self.window);
            self.window = window;
            self.timing_changed = true;
        }

        self.timing_state = TimingState::Idle;
        TimingState::Idle
    }

    fn decode_frame_table(&self) -> Option<ActiveWindow> {
        let mut window: Option<ActiveWindow> = None;
        let mut entry_addr = u32::from(self.registers[VT_FRAME_PTR]);
        let mut y = 0_u32;

        for _ in 0..MAX_FRAME_TABLE_ENTRIES {
            let line_sequence_ptr = self.ram_word(entry_addr);
            let line_count = self.ram_word(entry_addr + 1);
            if line_count == 0 {
                break;
            }
            entry_addr += 2;

            if let Some((x0, x1)) = self.decode_line_sequence(line_sequence_ptr.into()) {
                let y1 = y + u32::from(line_count) - 1;
                window = Some(match window {
                    None => ActiveWindow { x0, y0: y, x1, y1 },
                    Some(w) => ActiveWindow {
                        x0: w.x0.min(x0),
                        y0: w.y0,
                        x1: w.x1.max(x1),
                        y1: w.y1.max(y1),
                    },
                });
            }

            y += u32::from(line_count);
        }

        window
    }

    // Returns the inclusive range of active pixels on the line, if any
    fn decode_line_sequence(&self, mut addr: u32) -> Option<(u32, u32)> {
        let mut x = 0_u32;
        let mut active: Option<(u32, u32)> = None;

        for _ in 0..MAX_LINE_SEQUENCE_ENTRIES {
            let state = self.ram_word(addr);
            let run_length = u32::from(self.ram_word(addr + 1));
            addr += 2;

            if state.bit(LINE_STATE_ACTIVE) && run_length != 0 {
                let last = x + run_length - 1;
                active = Some(active.map_or((x, last), |(x0, _)| (x0, last)));
            }
            x += run_length;

            if state.bit(LINE_STATE_END_OF_LINE) {
                break;
            }
        }

        active
    }

    /// Start walking the DID entries for scanline `y` and return the first one.
    pub fn begin_did_line(&mut self, y: u32) -> Option<DidEntry> {
        let did_frame_ptr = u32::from(self.registers[DID_FRAME_PTR]);
        self.did_line_cursor = self.ram_word(did_frame_ptr + y);
        self.next_did_line_entry()
    }

    pub fn next_did_line_entry(&mut self) -> Option<DidEntry> {
        let word = self.ram_word(self.did_line_cursor.into());
        if word == DID_END_OF_LINE {
            return None;
        }

        self.did_line_cursor = self.did_line_cursor.wrapping_add(1) & RAM_ADDR_MASK;
        Some(DidEntry::from_word(word))
    }

    /// Collect every DID entry for a scanline.
    pub fn did_line(&mut self, y: u32) -> Vec<DidEntry> {
        let mut entries = Vec::new();
        let mut entry = self.begin_did_line(y);
        while let Some(e) = entry {
            entries.push(e);
            if entries.len() == MAX_DID_ENTRIES_PER_LINE {
                break;
            }
            entry = self.next_did_line_entry();
        }
        entries
    }

    /// Cursor pixel at a screen position: 0 for no cursor, otherwise a 2-bit color index.
    #[must_use]
    pub fn get_cursor_pixel(&self, x: i32, y: i32) -> u8 {
        let control = self.registers[DISPLAY_CONTROL];
        if !control.bit(DC_CURSOR_FUNCTION) || !control.bit(DC_CURSOR_ENABLE) {
            return 0;
        }

        let size = self.cursor_size() as i32;
        let cursor_x = self.cursor_x();
        let cursor_y = self.cursor_y();

        match self.cursor_mode() {
            CursorMode::Crosshair => {
                let half = size / 2;
                let in_square = (cursor_x - half..cursor_x + half).contains(&x)
                    && (cursor_y - half..cursor_y + half).contains(&y);
                u8::from(in_square && (x == cursor_x || y == cursor_y))
            }
            CursorMode::Glyph => {
                let dx = x - cursor_x;
                let dy = y - cursor_y;
                if !(0..size).contains(&dx) || !(0..size).contains(&dy) {
                    return 0;
                }

                let words_per_row = (size / 16) as u32;
                let plane_len = (size * size / 16) as u32;
                let addr = u32::from(self.registers[CURSOR_ENTRY])
                    + dy as u32 * words_per_row
                    + (dx / 16) as u32;
                let bit = 15 - (dx % 16) as u8;

                let plane0 = self.ram_word(addr).bit(bit);
                let plane1 = self.ram_word(addr + plane_len).bit(bit);
                u8::from(plane0) | (u8::from(plane1) << 1)
            }
        }
    }

    /// Vertical blank input. A rising edge raises the vertical interrupt if it is enabled.
    pub fn vblank(&mut self, state: bool) {
        let rising = state && !self.vblank;
        self.vblank = state;

        if rising && self.registers[DISPLAY_CONTROL].bit(DC_VBLANK_INT_ENABLE) {
            log::trace!("VC2 vertical interrupt raised");
            self.vert_int = true;
        }
    }

    #[must_use]
    pub fn vert_int(&self) -> bool {
        self.vert_int
    }

    pub fn clear_vert_int(&mut self) {
        self.vert_int = false;
    }

    /// Returns whether the active window changed since the last call, clearing the signal.
    pub fn take_timing_changed(&mut self) -> bool {
        std::mem::take(&mut self.timing_changed)
    }

    #[must_use]
    pub fn timing_state(&self) -> TimingState {
        self.timing_state
    }

    #[must_use]
    pub fn active_window(&self) -> Option<ActiveWindow> {
        self.window
    }

    #[must_use]
    pub fn readout_x0(&self) -> u32 {
        self.window.map_or(0, |w| w.x0)
    }

    #[must_use]
    pub fn readout_y0(&self) -> u32 {
        self.window.map_or(0, |w| w.y0)
    }

    #[must_use]
    pub fn readout_x1(&self) -> u32 {
        self.window.map_or(0, |w| w.x1)
    }

    #[must_use]
    pub fn readout_y1(&self) -> u32 {
        self.window.map_or(0, |w| w.y1)
    }

    #[must_use]
    pub fn display_enabled(&self) -> bool {
        self.registers[DISPLAY_CONTROL].bit(DC_DISPLAY_ENABLE)
    }

    #[must_use]
    pub fn did_enabled(&self) -> bool {
        self.registers[DISPLAY_CONTROL].bit(DC_DID_ENABLE)
    }

    #[must_use]
    pub fn cursor_mode(&self) -> CursorMode {
        if self.registers[DISPLAY_CONTROL].bit(DC_CURSOR_CROSSHAIR) {
            CursorMode::Crosshair
        } else {
            CursorMode::Glyph
        }
    }

    #[must_use]
    pub fn cursor_size(&self) -> u32 {
        if self.registers[DISPLAY_CONTROL].bit(DC_CURSOR_SIZE_64) { 64 } else { 32 }
    }

    #[must_use]
    pub fn cursor_x(&self) -> i32 {
        self.registers[CURSOR_X].into()
    }

    #[must_use]
    pub fn cursor_y(&self) -> i32 {
        self.registers[CURSOR_Y].into()
    }

    #[must_use]
    pub fn register(&self, index: usize) -> u16 {
        self.registers[index % REGISTER_COUNT]
    }

    #[must_use]
    pub fn register_index(&self) -> usize {
        self.register_index
    }

    #[must_use]
    pub fn ram(&self) -> &[u16; RAM_LEN_WORDS] {
        &self.ram
    }
}

impl Default for Vc2 {
    fn default() -> Self {
        Self::new()
    }
}
