//! Newport board public interface

use crate::cmap::DISPLAY_PALETTE_LEN;
use crate::color::{self, PixelDepth};
use crate::dcb::{Dcb, DcbMode, DcbTimeoutScheduler};
use crate::rex3::planes::{Plane, Planes};
use crate::rex3::registers::{
    DCB_DATA0, DCB_RESET, GO_ALIAS, STATUS, STATUS_VIDEOINT, STATUS_VRINT,
};
use crate::rex3::{Rex3, Rex3Config};
use crate::vc2::{ActiveWindow, Vc2};
use crate::xmap9::PixelMode;
use bincode::{Decode, Encode};
use newport_common::frontend::{Color, FrameSize, Renderer};
use newport_common::num::{BusWordExt, merge_u32};
use newport_config::{
    DEFAULT_DCB_TIMEOUT_US, DEFAULT_SCREEN_HEIGHT, DEFAULT_SCREEN_WIDTH, LineEndpointPolicy,
    MAX_SCREEN_DIMENSION, NewportBoard, UndefinedPlanePolicy,
};
use thiserror::Error;

// REX3 decodes 13 address bits
const REGISTER_WINDOW_MASK: u32 = 0x1FFF;

// 4/8bpp RGB0 pixels are looked up in the last 1K entries of the display palette
const RGB0_PALETTE_BASE: u32 = 0x1C00;

#[derive(Debug, Error)]
pub enum NewportError<RErr> {
    #[error("Rendering error: {0}")]
    Render(RErr),
}

pub type NewportResult<RErr> = Result<(), NewportError<RErr>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct NewportConfig {
    /// Board variant
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t))]
    pub board: NewportBoard,
    /// Framebuffer width in pixels
    #[cfg_attr(feature = "clap", arg(long, default_value_t = DEFAULT_SCREEN_WIDTH))]
    pub screen_width: u32,
    /// Framebuffer height in pixels
    #[cfg_attr(feature = "clap", arg(long, default_value_t = DEFAULT_SCREEN_HEIGHT))]
    pub screen_height: u32,
    /// Which line endpoints are drawn
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t))]
    pub line_endpoints: LineEndpointPolicy,
    /// Behavior of the undefined plane select values
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t))]
    pub undefined_planes: UndefinedPlanePolicy,
    /// Time before an access to an absent DCB slave is abandoned
    #[cfg_attr(feature = "clap", arg(long, default_value_t = DEFAULT_DCB_TIMEOUT_US))]
    pub dcb_timeout_us: u32,
}

impl Default for NewportConfig {
    fn default() -> Self {
        Self {
            board: NewportBoard::default(),
            screen_width: DEFAULT_SCREEN_WIDTH,
            screen_height: DEFAULT_SCREEN_HEIGHT,
            line_endpoints: LineEndpointPolicy::default(),
            undefined_planes: UndefinedPlanePolicy::default(),
            dcb_timeout_us: DEFAULT_DCB_TIMEOUT_US,
        }
    }
}

impl NewportConfig {
    #[must_use]
    pub fn clamped_screen_size(&self) -> (u32, u32) {
        let clamp = |name: &str, value: u32| {
            let clamped = value.clamp(1, MAX_SCREEN_DIMENSION);
            if clamped != value {
                log::warn!("Clamped screen {name} from {value} to {clamped}");
            }
            clamped
        };

        (clamp("width", self.screen_width), clamp("height", self.screen_height))
    }

    #[must_use]
    pub fn to_rex3_config(&self) -> Rex3Config {
        Rex3Config::new(self.board, self.line_endpoints, self.undefined_planes)
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Newport<S> {
    rex3: Rex3,
    dcb: Dcb,
    config: NewportConfig,
    vblank: bool,
    frame_buffer: Vec<Color>,
    scheduler: S,
}

impl<S: DcbTimeoutScheduler> Newport<S> {
    #[must_use]
    pub fn new(config: NewportConfig, scheduler: S) -> Self {
        let (width, height) = config.clamped_screen_size();

        log::info!("Creating Newport {} board with a {width}x{height} framebuffer", config.board);

        Self {
            rex3: Rex3::new(config.to_rex3_config(), width, height),
            dcb: Dcb::new(config.board, config.dcb_timeout_us),
            config,
            vblank: false,
            frame_buffer: Vec::new(),
            scheduler,
        }
    }

    /// 64-bit bus read. The register at the lower address is returned in the upper half.
    pub fn read(&mut self, offset: u32, mem_mask: u64) -> u64 {
        let (register, go) = decode_offset(offset & !7);

        let mut value = 0;
        if mem_mask.accesses_high_half() {
            value |= u64::from(self.load_register(register, go)) << 32;
        }
        if mem_mask.accesses_low_half() {
            value |= u64::from(self.load_register(register | 4, go));
        }
        value & mem_mask
    }

    /// 64-bit bus write. Both halves are stored before a GO alias write executes the command,
    /// so the command runs once per bus write.
    pub fn write(&mut self, offset: u32, data: u64, mem_mask: u64) {
        let (register, go) = decode_offset(offset & !7);

        if mem_mask.accesses_high_half() {
            self.store_masked(register, data.high_half(), mem_mask.high_half());
        }
        if mem_mask.accesses_low_half() {
            self.store_masked(register | 4, data.low_half(), mem_mask.low_half());
        }

        if go {
            self.rex3.execute();
        }
    }

    pub fn read_register(&mut self, offset: u32) -> u32 {
        let (register, go) = decode_offset(offset & !3);
        self.load_register(register, go)
    }

    pub fn write_register(&mut self, offset: u32, value: u32) {
        let (register, go) = decode_offset(offset & !3);
        self.store_register(register, value);

        if go {
            self.rex3.execute();
        }
    }

    fn store_masked(&mut self, register: u32, data: u32, mem_mask: u32) {
        let value = if mem_mask == !0 {
            data
        } else {
            let current = self.rex3.peek_register(register).unwrap_or(0);
            merge_u32(current, data, mem_mask)
        };
        self.store_register(register, value);
    }

    fn load_register(&mut self, register: u32, go: bool) -> u32 {
        match register {
            DCB_DATA0 => {
                let registers = self.rex3.registers();
                let mode = DcbMode::from_word(registers.dcb_mode);
                let msw = self.dcb.read(mode, registers.dcb_data_msw, &mut self.scheduler);

                let registers = self.rex3.registers_mut();
                registers.dcb_data_msw = msw;
                registers.advance_dcb_register_select();
                self.sync_dcb_status();

                msw
            }
            STATUS => {
                let status = self.rex3.read_register(STATUS, go);
                self.dcb.vc2_mut().clear_vert_int();
                status
            }
            _ => self.rex3.read_register(register, go),
        }
    }

    fn store_register(&mut self, register: u32, value: u32) {
        self.rex3.write_register(register, value);

        match register {
            DCB_DATA0 => {
                let registers = self.rex3.registers();
                let mode = DcbMode::from_word(registers.dcb_mode);
                self.dcb.write(mode, registers.dcb_data_msw, &mut self.scheduler);

                self.rex3.registers_mut().advance_dcb_register_select();
                self.sync_dcb_status();
            }
            DCB_RESET => {
                log::debug!("DCB reset");
                self.dcb.abort(&mut self.scheduler);
                self.sync_dcb_status();
            }
            _ => {}
        }
    }

    fn sync_dcb_status(&mut self) {
        self.rex3.set_dcb_status(self.dcb.busy(), self.dcb.timed_out());
    }

    /// Vertical blank input from the surrounding system.
    pub fn vblank(&mut self, state: bool) {
        let rising = state && !self.vblank;
        self.vblank = state;

        self.dcb.vc2_mut().vblank(state);

        if rising {
            self.rex3.raise_status(STATUS_VRINT);
        }
        if self.dcb.vc2().vert_int() {
            self.rex3.raise_status(STATUS_VIDEOINT);
        }
    }

    #[must_use]
    pub fn interrupt_pending(&self) -> bool {
        self.dcb.vc2().vert_int()
    }

    /// Called by the surrounding system when a timeout requested through the scheduler fires.
    pub fn dcb_timeout_expired(&mut self) {
        self.dcb.timeout_expired();
        self.sync_dcb_status();
    }

    /// Soft reset. Drawing state, the framebuffer and the VC2 are cleared, while palettes, mode
    /// tables and RAMDAC LUTs keep their contents.
    pub fn reset(&mut self) {
        log::info!("Resetting Newport board");

        self.rex3.reset();
        self.dcb.reset(&mut self.scheduler);
        self.vblank = false;
        self.frame_buffer.clear();
    }

    /// Compose the active display window and pass it to the renderer. Nothing is rendered while
    /// the timing tables describe no active pixels.
    ///
    /// Display ID lines and cursor positions are looked up in frame coordinates: `(0, 0)` is the
    /// first active pixel, not the first pixel after sync.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by the renderer.
    pub fn render_frame<R: Renderer>(&mut self, renderer: &mut R) -> NewportResult<R::Err> {
        self.dcb.vc2_mut().update_timing();
        let Some(window) = self.dcb.vc2().active_window() else {
            log::trace!("No active display window, skipping frame");
            return Ok(());
        };

        let frame_size = self.compose_frame(window);
        renderer.render_frame(&self.frame_buffer, frame_size).map_err(NewportError::Render)
    }

    fn compose_frame(&mut self, window: ActiveWindow) -> FrameSize {
        let planes = self.rex3.planes();
        let (plane_width, plane_height) = (planes.width(), planes.height());
        let frame_size = FrameSize {
            width: window.width().min(plane_width),
            height: window.height().min(plane_height),
        };

        self.frame_buffer.clear();
        self.frame_buffer.resize(frame_size.len(), Color::BLACK);

        if !self.dcb.vc2().display_enabled() {
            return frame_size;
        }

        let top_scan = self.rex3.registers().top_scan;
        for y in 0..frame_size.height {
            let did_entries = if self.dcb.vc2().did_enabled() {
                self.dcb.vc2_mut().did_line(y)
            } else {
                Vec::new()
            };

            let source_y = ((y + top_scan) % plane_height) as i32;
            let mut mode_index = 0;
            let mut next_entry = 0;

            for x in 0..frame_size.width {
                while let Some(entry) = did_entries.get(next_entry) {
                    if u32::from(entry.x) > x {
                        break;
                    }
                    mode_index = entry.mode;
                    next_entry += 1;
                }

                let rgb = self.resolve_pixel(x as i32, y as i32, source_y, mode_index);
                let color = Color::from_packed_rgb(self.dcb.ramdac().remap(rgb));
                self.frame_buffer[(y * frame_size.width + x) as usize] = color;
            }
        }

        frame_size
    }

    // Packed 0x00RRGGBB for one display pixel, before the RAMDAC
    fn resolve_pixel(&self, x: i32, y: i32, source_y: i32, mode_index: u8) -> u32 {
        let xmap = self.dcb.xmap0();
        let cmap = self.dcb.cmap0();
        let planes = self.rex3.planes();
        let palette = |index: u32| cmap.palette_entry(index & (DISPLAY_PALETTE_LEN as u32 - 1));

        let cursor = self.dcb.vc2().get_cursor_pixel(x, y);
        if cursor != 0 {
            return palette((xmap.cursor_cmap() << 5) | u32::from(cursor));
        }

        let popup = planes.read(Plane::Popup, x, source_y);
        if popup != 0 {
            return palette((xmap.popup_cmap() << 5) | popup);
        }

        let entry = xmap.mode_entry(mode_index.into());
        if entry.overlay_enabled {
            let overlay = planes.read(Plane::Overlay, x, source_y);
            if overlay != 0 {
                return palette(entry.ci_msb | overlay);
            }
        }

        let depth = entry.pixel_size;
        let cell = planes.read(Plane::RgbCi, x, source_y);
        let shift = if entry.buffer_select { depth.store_shift() } else { 0 };
        let pixel = (cell >> shift) & depth.pixel_mask();

        match entry.pixel_mode {
            PixelMode::ColorIndex => palette(entry.ci_msb | pixel),
            PixelMode::Rgb0 if matches!(depth, PixelDepth::Bpp4 | PixelDepth::Bpp8) => {
                palette(RGB0_PALETTE_BASE + pixel)
            }
            PixelMode::Rgb0 | PixelMode::Rgb1 | PixelMode::Rgb2 => color::to_rgb24(depth, pixel),
        }
    }

    #[must_use]
    pub fn rex3(&self) -> &Rex3 {
        &self.rex3
    }

    #[must_use]
    pub fn planes(&self) -> &Planes {
        self.rex3.planes()
    }

    #[must_use]
    pub fn dcb(&self) -> &Dcb {
        &self.dcb
    }

    #[must_use]
    pub fn vc2(&self) -> &Vc2 {
        self.dcb.vc2()
    }

    #[must_use]
    pub fn config(&self) -> &NewportConfig {
        &self.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }
}

fn decode_offset(offset: u32) -> (u32, bool) {
    let offset = offset & REGISTER_WINDOW_MASK;
    (offset & !GO_ALIAS, offset & GO_ALIAS != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcb::tests::RecordingScheduler;
    use crate::rex3::registers::*;
    use std::convert::Infallible;
    use std::time::Duration;
    use test_log::test;

    const SLAVE_VC2: u32 = 0;
    const SLAVE_CMAP01: u32 = 1;
    const SLAVE_XMAP01: u32 = 4;
    const SLAVE_RAMDAC: u32 = 7;
    const SLAVE_CC1: u32 = 8;
    const SLAVE_ABSENT: u32 = 12;

    const VC2_RAM_ADDR: u32 = 0x07;
    const VC2_VT_FRAME_PTR: u32 = 0x08;
    const VC2_DISPLAY_CONTROL: u32 = 0x10;

    #[derive(Default)]
    struct CapturingRenderer {
        frames: Vec<(Vec<Color>, FrameSize)>,
    }

    impl Renderer for CapturingRenderer {
        type Err = Infallible;

        fn render_frame(
            &mut self,
            frame_buffer: &[Color],
            frame_size: FrameSize,
        ) -> Result<(), Self::Err> {
            self.frames.push((frame_buffer[..frame_size.len()].to_vec(), frame_size));
            Ok(())
        }
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        type Err = String;

        fn render_frame(&mut self, _: &[Color], _: FrameSize) -> Result<(), Self::Err> {
            Err("device lost".into())
        }
    }

    #[derive(Debug, Default, Encode, Decode)]
    struct NullScheduler;

    impl DcbTimeoutScheduler for NullScheduler {
        fn schedule(&mut self, _delay: Duration) {}

        fn cancel(&mut self) {}
    }

    fn small_config() -> NewportConfig {
        NewportConfig { screen_width: 64, screen_height: 32, ..NewportConfig::default() }
    }

    fn new_newport() -> Newport<RecordingScheduler> {
        Newport::new(small_config(), RecordingScheduler::default())
    }

    fn set_dcb_mode<S: DcbTimeoutScheduler>(
        newport: &mut Newport<S>,
        slave: u32,
        register: u32,
        width: u32,
    ) {
        newport.write_register(DCB_MODE, (slave << 7) | (register << 4) | (width & 3));
    }

    fn dcb_write<S: DcbTimeoutScheduler>(
        newport: &mut Newport<S>,
        slave: u32,
        register: u32,
        width: u32,
        value: u32,
    ) {
        set_dcb_mode(newport, slave, register, width);
        let msw = if width == 4 { value } else { value << (32 - 8 * width) };
        newport.write_register(DCB_DATA0, msw);
    }

    fn vc2_register<S: DcbTimeoutScheduler>(newport: &mut Newport<S>, index: u32, value: u16) {
        dcb_write(newport, SLAVE_VC2, 0, 3, (index << 16) | u32::from(value));
    }

    fn vc2_ram<S: DcbTimeoutScheduler>(newport: &mut Newport<S>, addr: u16, words: &[u16]) {
        vc2_register(newport, VC2_RAM_ADDR, addr);
        for &word in words {
            dcb_write(newport, SLAVE_VC2, 3, 2, word.into());
        }
    }

    fn palette<S: DcbTimeoutScheduler>(newport: &mut Newport<S>, index: u16, entries: &[u32]) {
        dcb_write(newport, SLAVE_CMAP01, 0, 2, index.into());
        for &entry in entries {
            dcb_write(newport, SLAVE_CMAP01, 1, 3, entry);
        }
    }

    fn mode_table_entry<S: DcbTimeoutScheduler>(newport: &mut Newport<S>, index: u32, raw: u32) {
        dcb_write(newport, SLAVE_XMAP01, 5, 4, (index << 24) | raw);
    }

    // 4x2 active window at the top left, display enabled
    fn program_small_display<S: DcbTimeoutScheduler>(newport: &mut Newport<S>) {
        vc2_ram(newport, 0x100, &[0x200, 2, 0, 0]);
        vc2_ram(newport, 0x200, &[0x0001, 4, 0x8000, 0]);
        vc2_register(newport, VC2_VT_FRAME_PTR, 0x100);
        vc2_register(newport, VC2_DISPLAY_CONTROL, 0x0002);
    }

    fn draw_point<S: DcbTimeoutScheduler>(
        newport: &mut Newport<S>,
        mode1: u32,
        x: u16,
        y: u16,
        color: u32,
    ) {
        newport.write_register(XY_WINDOW, 0x1000_1000);
        newport.write_register(WRITE_MASK, 0xFF_FFFF);
        newport.write_register(DRAW_MODE1, mode1);
        newport.write_register(DRAW_MODE0, 0x22);
        newport.write_register(COLOR_I, color);
        newport.write_register(XY_START_I, (u32::from(x) << 16) | u32::from(y));
        newport.write_register(XY_END_I | GO_ALIAS, (u32::from(x) << 16) | u32::from(y));
    }

    #[test]
    fn palette_writes_through_dcb() {
        let mut newport = new_newport();

        palette(&mut newport, 5, &[0x11_1111, 0x22_2222, 0x33_3333]);

        for cmap in [newport.dcb().cmap0(), newport.dcb().cmap1()] {
            assert_eq!(cmap.palette_entry(5), 0x11_1111);
            assert_eq!(cmap.palette_entry(6), 0x22_2222);
            assert_eq!(cmap.palette_entry(7), 0x33_3333);
            assert_eq!(cmap.palette_index(), 8);
        }

        set_dcb_mode(&mut newport, SLAVE_CMAP01, 0, 2);
        assert_eq!(newport.read_register(DCB_DATA0), 8 << 16);
        assert!(newport.scheduler().scheduled.is_empty());
    }

    #[test]
    fn absent_slave_times_out() {
        let mut newport = new_newport();

        dcb_write(&mut newport, SLAVE_CC1, 0, 4, 0xCAFE_F00D);
        assert_eq!(newport.dcb().cc1()[0], 0xCAFE_F00D);

        set_dcb_mode(&mut newport, SLAVE_ABSENT, 0, 4);
        assert_eq!(newport.read_register(DCB_DATA0), 0xCAFE_F00D);
        assert_eq!(newport.scheduler().scheduled, vec![Duration::from_micros(1000)]);

        let status = newport.read_register(USER_STATUS);
        assert_ne!(status & STATUS_BACK_BUSY, 0);
        assert_eq!(status & STATUS_DCB_TIMEOUT, 0);

        newport.dcb_timeout_expired();
        let status = newport.read_register(USER_STATUS);
        assert_eq!(status & STATUS_BACK_BUSY, 0);
        assert_ne!(status & STATUS_DCB_TIMEOUT, 0);
        assert_eq!(newport.rex3().registers().dcb_data_msw, 0xCAFE_F00D);

        // The next access clears the timeout bit
        dcb_write(&mut newport, SLAVE_CC1, 1, 4, 0);
        assert_eq!(newport.read_register(USER_STATUS) & STATUS_DCB_TIMEOUT, 0);
    }

    #[test]
    fn dcb_reset_cancels_pending_timeout() {
        let mut newport = new_newport();

        dcb_write(&mut newport, SLAVE_ABSENT, 0, 4, 0);
        assert!(newport.dcb().busy());

        newport.write_register(DCB_RESET, 0);
        assert!(!newport.dcb().busy());
        assert_eq!(newport.scheduler().cancels, 1);
        assert_eq!(newport.read_register(USER_STATUS) & STATUS_BACK_BUSY, 0);
    }

    #[test]
    fn dcb_register_select_auto_increment() {
        let mut newport = new_newport();

        // XMAP cursor colormap, then pop-up colormap
        newport.write_register(DCB_MODE, (SLAVE_XMAP01 << 7) | (3 << 4) | 0x08 | 1);
        newport.write_register(DCB_DATA0, 0x1100_0000);
        newport.write_register(DCB_DATA0, 0x2200_0000);

        assert_eq!(newport.dcb().xmap0().cursor_cmap(), 0x11);
        assert_eq!(newport.dcb().xmap1().popup_cmap(), 0x22);
        assert_eq!((newport.read_register(DCB_MODE) >> 4) & 7, 5);
    }

    #[test]
    fn status_read_clears_interrupts_but_user_status_does_not() {
        let mut newport = new_newport();
        vc2_register(&mut newport, VC2_DISPLAY_CONTROL, 0x0003);

        newport.vblank(true);
        assert!(newport.interrupt_pending());

        let both = STATUS_VRINT | STATUS_VIDEOINT;
        assert_eq!(newport.read_register(USER_STATUS) & both, both);
        assert_eq!(newport.read_register(USER_STATUS) & both, both);

        assert_eq!(newport.read_register(STATUS) & both, both);
        assert_eq!(newport.read_register(USER_STATUS) & both, 0);
        assert!(!newport.interrupt_pending());

        // Level held high does not raise again
        newport.vblank(true);
        assert_eq!(newport.read_register(USER_STATUS) & both, 0);
    }

    #[test]
    fn bus_words_are_big_endian_pairs() {
        let mut newport = new_newport();

        newport.write(WRITE_MASK, (0x00FF_FFFF << 32) | 0x0012_3456, !0);
        assert_eq!(newport.read_register(WRITE_MASK), 0x00FF_FFFF);
        assert_eq!(newport.read_register(COLOR_I), 0x0012_3456);
        assert_eq!(newport.read(WRITE_MASK, !0), (0x00FF_FFFF << 32) | 0x0012_3456);

        // Byte write to the low register only
        newport.write(WRITE_MASK, 0xAB, 0xFF);
        assert_eq!(newport.read_register(COLOR_I), 0x0012_34AB);
        assert_eq!(newport.read_register(WRITE_MASK), 0x00FF_FFFF);

        // Upper half only
        newport.write(WRITE_MASK, 0xFF << 32, 0xFFFF_FFFF << 32);
        assert_eq!(newport.read(WRITE_MASK, 0xFFFF_FFFF << 32), 0xFF << 32);
    }

    #[test]
    fn go_alias_bus_write_executes_once() {
        let mut newport = new_newport();
        newport.write_register(XY_WINDOW, 0x1000_1000);
        newport.write_register(WRITE_MASK, 0xFF_FFFF);
        newport.write_register(DRAW_MODE1, 0x3000_8019);
        newport.write_register(DRAW_MODE0, 0x22);
        newport.write_register(COLOR_I, 0x40_4040);
        newport.write_register(LS_MODE, 0);

        // XYStartI and XYEndI share one bus word
        newport.write(XY_START_I | GO_ALIAS, (((2 << 16) | 3) << 32) | ((5 << 16) | 3), !0);

        let planes = newport.planes();
        let drawn: Vec<_> =
            (0..8).filter(|&x| planes.read(Plane::RgbCi, x, 3) == 0x40_4040).collect();
        assert_eq!(drawn, vec![2, 3, 4, 5]);
        assert_eq!(newport.rex3().registers().y_start.integer(), 4);
    }

    #[test]
    fn render_direct_rgb_through_ramdac() {
        let mut newport = new_newport();
        program_small_display(&mut newport);

        // Mode 0: RGB2, 24bpp
        mode_table_entry(&mut newport, 0, 0xF00);
        draw_point(&mut newport, 0x3000_8019, 1, 0, 0x00_00FF);
        draw_point(&mut newport, 0x3000_8019, 3, 1, 0x00_FF00);

        // Halve red full scale
        dcb_write(&mut newport, SLAVE_RAMDAC, 0, 1, 0xFF);
        for value in [0x80, 0xFF, 0xFF] {
            dcb_write(&mut newport, SLAVE_RAMDAC, 1, 1, value);
        }

        let mut renderer = CapturingRenderer::default();
        newport.render_frame(&mut renderer).unwrap();

        assert_eq!(renderer.frames.len(), 1);
        let (frame, size) = &renderer.frames[0];
        assert_eq!(*size, FrameSize { width: 4, height: 2 });
        assert_eq!(frame[1], Color::rgb(0x80, 0, 0));
        assert_eq!(frame[4 + 3], Color::rgb(0, 0xFF, 0));
        assert_eq!(frame[0], Color::BLACK);
    }

    #[test]
    fn render_color_index_and_popup_priority() {
        let mut newport = new_newport();
        program_small_display(&mut newport);

        // Mode 0: color index, 8bpp
        mode_table_entry(&mut newport, 0, 0x400);
        palette(&mut newport, 0, &[0x00_0000, 0x00_00FF]);
        palette(&mut newport, 0x42, &[0x00_FF00]);

        draw_point(&mut newport, 0x3000_0009, 2, 1, 0x42);
        draw_point(&mut newport, 0x3000_0009, 0, 0, 0x42);
        // Pop-up plane pixel on top of the CI pixel
        draw_point(&mut newport, 0x3000_0005, 0, 0, 1);

        let mut renderer = CapturingRenderer::default();
        newport.render_frame(&mut renderer).unwrap();

        let (frame, _) = &renderer.frames[0];
        assert_eq!(frame[4 + 2], Color::rgb(0, 0xFF, 0));
        assert_eq!(frame[0], Color::rgb(0, 0, 0xFF));
        assert_eq!(frame[1], Color::BLACK);
    }

    #[test]
    fn top_scan_scrolls_source_rows() {
        let mut newport = new_newport();
        program_small_display(&mut newport);
        mode_table_entry(&mut newport, 0, 0xF00);
        draw_point(&mut newport, 0x3000_8019, 0, 1, 0xFF_FFFF);

        newport.write_register(TOP_SCAN, 1);

        let mut renderer = CapturingRenderer::default();
        newport.render_frame(&mut renderer).unwrap();

        let (frame, _) = &renderer.frames[0];
        assert_eq!(frame[0], Color::rgb(0xFF, 0xFF, 0xFF));
        assert_eq!(frame[4], Color::BLACK);
    }

    #[test]
    fn no_active_window_renders_nothing() {
        let mut newport = new_newport();
        let mut renderer = CapturingRenderer::default();

        newport.render_frame(&mut renderer).unwrap();
        assert!(renderer.frames.is_empty());
    }

    #[test]
    fn disabled_display_renders_black() {
        let mut newport = new_newport();
        program_small_display(&mut newport);
        mode_table_entry(&mut newport, 0, 0xF00);
        draw_point(&mut newport, 0x3000_8019, 0, 0, 0xFF_FFFF);
        vc2_register(&mut newport, VC2_DISPLAY_CONTROL, 0);

        let mut renderer = CapturingRenderer::default();
        newport.render_frame(&mut renderer).unwrap();

        let (frame, _) = &renderer.frames[0];
        assert!(frame.iter().all(|&color| color == Color::BLACK));
    }

    #[test]
    fn renderer_errors_propagate() {
        let mut newport = new_newport();
        program_small_display(&mut newport);

        let result = newport.render_frame(&mut FailingRenderer);
        assert!(matches!(result, Err(NewportError::Render(msg)) if msg == "device lost"));
    }

    #[test]
    fn soft_reset_keeps_palettes_and_mode_tables() {
        let mut newport = new_newport();
        program_small_display(&mut newport);
        palette(&mut newport, 9, &[0x12_3456]);
        mode_table_entry(&mut newport, 3, 0x400);
        draw_point(&mut newport, 0x3000_8019, 0, 0, 0xFF);

        newport.reset();

        assert_eq!(newport.dcb().cmap0().palette_entry(9), 0x12_3456);
        assert_eq!(newport.dcb().xmap0().raw_mode_entry(3), 0x400);
        assert!(newport.planes().plane(Plane::RgbCi).iter().all(|&cell| cell == 0));
        assert_eq!(newport.vc2().active_window(), None);
        assert_eq!(newport.rex3().registers().draw_mode1, 0);
    }

    #[test]
    fn screen_size_is_clamped() {
        let config = NewportConfig { screen_width: 0, screen_height: 5000, ..small_config() };
        assert_eq!(config.clamped_screen_size(), (1, MAX_SCREEN_DIMENSION));

        let newport = Newport::new(small_config(), NullScheduler);
        assert_eq!((newport.planes().width(), newport.planes().height()), (64, 32));
    }

    #[test]
    fn save_state_round_trip() {
        let mut newport = Newport::new(small_config(), NullScheduler);
        palette(&mut newport, 1, &[0xAB_CDEF]);
        draw_point(&mut newport, 0x3000_8019, 7, 7, 0x55);

        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(&newport, config).unwrap();
        let (restored, _): (Newport<NullScheduler>, _) =
            bincode::decode_from_slice(&bytes, config).unwrap();

        assert_eq!(restored.dcb().cmap0().palette_entry(1), 0xAB_CDEF);
        assert_eq!(restored.planes().read(Plane::RgbCi, 7, 7), 0x55);
        assert_eq!(restored.config(), newport.config());
    }
}
