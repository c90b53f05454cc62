//! REX3 raster engine
//!
//! Commands execute synchronously when a register is written through the GO alias. Each command
//! resolves its pixel pipeline (target plane, depth, masks, color source, converters) once and
//! then walks the pixels of a span, block or line through it.

pub mod planes;
pub mod rasterizer;
pub mod registers;

use crate::color::{self, ConvertFn, PixelDepth};
use crate::rex3::planes::{Plane, Planes};
use crate::rex3::rasterizer::{BresenhamParams, LineStepper};
use crate::rex3::registers::*;
use bincode::{Decode, Encode};
use newport_common::num::GetBit;
use newport_config::{LineEndpointPolicy, NewportBoard, UndefinedPlanePolicy};

const WINDOW_BIAS: i32 = 0x1000;

// GFIFO level (12:7) and BFIFO level (17:13)
const STATUS_FIFO_LEVELS: u32 = 0x0003_FF80;

const BAYER_4X4: [[u32; 4]; 4] = [[0, 12, 3, 15], [8, 4, 11, 7], [2, 14, 1, 13], [10, 6, 9, 5]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Rex3Config {
    pub global_write_mask: u32,
    pub line_endpoints: LineEndpointPolicy,
    pub undefined_planes: UndefinedPlanePolicy,
}

impl Rex3Config {
    #[must_use]
    pub fn new(
        board: NewportBoard,
        line_endpoints: LineEndpointPolicy,
        undefined_planes: UndefinedPlanePolicy,
    ) -> Self {
        Self { global_write_mask: board.global_write_mask(), line_endpoints, undefined_planes }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorSource {
    Flat,
    Shade,
    FastClear,
    Host,
}

// Everything about the pixel path that is fixed for the duration of one command
#[derive(Clone, Copy)]
struct Pipeline {
    mode0: DrawMode0,
    mode1: DrawMode1,
    plane: Option<Plane>,
    source: ColorSource,
    depth: PixelDepth,
    pixel_mask: u32,
    store_shift: u32,
    write_mask: u32,
    host_convert: ConvertFn,
    read_convert: ConvertFn,
}

// Host data port cursor, consumed or filled MSB first
struct HostPort {
    data: u64,
    shift: i32,
    step: i32,
    limit: i32,
    mask: u64,
}

impl HostPort {
    fn new(data: u64, mode1: DrawMode1) -> Self {
        let width = mode1.host_depth.bits_per_pixel() as i32;
        let (shift, step) = if mode1.rw_packed { (64 - width, width) } else { (32, 32) };
        let limit = if mode1.rw_double { 0 } else { 32 };

        Self { data, shift, step, limit, mask: mode1.host_depth.pixel_mask() }
    }

    fn has_room(&self) -> bool {
        self.shift >= self.limit
    }

    fn next(&mut self) -> Option<u32> {
        if !self.has_room() {
            return None;
        }

        let value = ((self.data >> self.shift) & self.mask) as u32;
        self.shift -= self.step;
        Some(value)
    }

    fn push(&mut self, value: u32) {
        if !self.has_room() {
            return;
        }

        self.data |= (u64::from(value) & self.mask) << self.shift;
        self.shift -= self.step;
    }
}

fn channel_bits(depth: PixelDepth) -> (u32, u32, u32) {
    match depth {
        PixelDepth::Bpp4 => (1, 2, 1),
        PixelDepth::Bpp8 => (3, 3, 2),
        PixelDepth::Bpp12 => (4, 4, 4),
        PixelDepth::Bpp24 => (8, 8, 8),
    }
}

// Ordered dither of an 8-bit channel down to `bits` bits; the result stays left-aligned in 8 bits
fn dither_channel(value: u32, bits: u32, threshold: u32) -> u32 {
    if bits >= 8 {
        return value;
    }

    let step = 256 >> bits;
    let level = ((value + threshold * step / 16) >> (8 - bits)).min((1 << bits) - 1);
    level << (8 - bits)
}

fn blend_channel(src: u32, dst: u32, src_weight: u32, dst_weight: u32) -> u32 {
    ((src * src_weight + dst * dst_weight + 127) / 255).min(255)
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Rex3 {
    registers: Registers,
    planes: Planes,
    pending_line: Option<LineStepper>,
    config: Rex3Config,
}

impl Rex3 {
    #[must_use]
    pub fn new(config: Rex3Config, screen_width: u32, screen_height: u32) -> Self {
        Self {
            registers: Registers::default(),
            planes: Planes::new(screen_width, screen_height),
            pending_line: None,
            config,
        }
    }

    pub fn reset(&mut self) {
        self.registers = Registers::default();
        self.planes.clear();
        self.pending_line = None;
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub(crate) fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    #[must_use]
    pub fn planes(&self) -> &Planes {
        &self.planes
    }

    #[must_use]
    pub fn config(&self) -> Rex3Config {
        self.config
    }

    /// Register value without read side effects. Returns `None` for unmapped offsets.
    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub fn peek_register(&self, register: u32) -> Option<u32> {
        let r = &self.registers;
        let value = match register {
            DRAW_MODE1 => r.draw_mode1,
            DRAW_MODE0 => r.draw_mode0,
            LS_MODE => r.ls_mode,
            LS_PATTERN => r.ls_pattern,
            LS_PATTERN_SAVE => r.ls_pattern_saved,
            Z_PATTERN => r.z_pattern,
            COLOR_BACK => r.color_back,
            COLOR_VRAM => r.color_vram,
            ALPHA_REF => r.alpha_ref,
            SMASK0_X => r.smask_x[0],
            SMASK0_Y => r.smask_y[0],
            SETUP => r.setup,
            STEP_Z => r.step_z,
            STALL0 | LS_RESTORE | LS_SAVE => 0,
            X_START | X_START_F => r.x_start.raw(),
            Y_START | Y_START_F => r.y_start.raw(),
            X_END | X_END_F | X_END_F1 => r.x_end.raw(),
            Y_END | Y_END_F => r.y_end.raw(),
            X_SAVE => u32::from(r.x_save as u16),
            XY_MOVE => r.xy_move,
            BRES_D => r.bres_d,
            BRES_S1 => r.bres_s1,
            BRES_OCT_INC1 => r.bres_oct_inc1,
            BRES_RND_INC2 => r.bres_rnd_inc2,
            BRES_E1 => r.bres_e1,
            BRES_S2 => r.bres_s2,
            A_WEIGHT0 => r.a_weight0,
            A_WEIGHT1 => r.a_weight1,
            X_START_I => u32::from(r.x_start.integer() as u16),
            XY_START_I => {
                (u32::from(r.x_start.integer() as u16) << 16)
                    | u32::from(r.y_start.integer() as u16)
            }
            XY_END_I => {
                (u32::from(r.x_end.integer() as u16) << 16) | u32::from(r.y_end.integer() as u16)
            }
            X_START_END_I => {
                (u32::from(r.x_start.integer() as u16) << 16)
                    | u32::from(r.x_end.integer() as u16)
            }
            COLOR_RED => r.color_red,
            COLOR_ALPHA => r.color_alpha,
            COLOR_GREEN => r.color_green,
            COLOR_BLUE => r.color_blue,
            SLOPE_RED | SLOPE_RED1 => (r.slope_red as u32) & 0xFF_FFFF,
            SLOPE_ALPHA => (r.slope_alpha as u32) & 0xFF_FFFF,
            SLOPE_GREEN => (r.slope_green as u32) & 0xFF_FFFF,
            SLOPE_BLUE => (r.slope_blue as u32) & 0xFF_FFFF,
            WRITE_MASK => r.write_mask,
            COLOR_I | COLOR_X => r.color_i,
            HOST_RW0 => (r.host_data >> 32) as u32,
            HOST_RW1 => r.host_data as u32,
            DCB_MODE => r.dcb_mode,
            DCB_DATA0 => r.dcb_data_msw,
            DCB_DATA1 => r.dcb_data_lsw,
            SMASK1_X..=SMASK4_Y if register & 3 == 0 => {
                let (index, is_y) = screen_mask_slot(register);
                if is_y { r.smask_y[index] } else { r.smask_x[index] }
            }
            TOP_SCAN => r.top_scan,
            XY_WINDOW => r.xy_window,
            CLIP_MODE => r.clip_mode,
            CONFIG => r.config,
            STATUS | USER_STATUS => r.status,
            DCB_RESET => 0,
            _ => return None,
        };

        Some(value)
    }

    /// 32-bit register read. Reading the host data port through the GO alias runs a read
    /// command first, and reading Status clears the latched interrupt bits.
    pub fn read_register(&mut self, register: u32, go: bool) -> u32 {
        match register {
            HOST_RW0 if go => {
                self.execute();
                (self.registers.host_data >> 32) as u32
            }
            STATUS => {
                let status = self.registers.status;
                self.registers.status &= !(STATUS_VRINT | STATUS_VIDEOINT);
                status
            }
            _ => self.peek_register(register).unwrap_or_else(|| {
                log::warn!("REX3 read from unknown register {register:04X}");
                0
            }),
        }
    }

    pub fn write_register(&mut self, register: u32, value: u32) {
        log::trace!("REX3 register write: {register:04X} = {value:08X}");

        let r = &mut self.registers;
        match register {
            DRAW_MODE1 => {
                r.write_draw_mode1(value);
                self.pending_line = None;
            }
            DRAW_MODE0 => {
                r.write_draw_mode0(value);
                self.pending_line = None;
            }
            LS_MODE => r.ls_mode = value,
            LS_PATTERN => {
                r.ls_pattern = value;
                r.ls_repeat_count = 0;
            }
            LS_PATTERN_SAVE => r.ls_pattern_saved = value,
            Z_PATTERN => r.z_pattern = value,
            COLOR_BACK => r.color_back = value,
            COLOR_VRAM => r.color_vram = value,
            ALPHA_REF => r.alpha_ref = value & 0xFF,
            STALL0 => {}
            SMASK0_X => r.smask_x[0] = value,
            SMASK0_Y => r.smask_y[0] = value,
            SETUP => r.setup = value,
            STEP_Z => r.step_z = value,
            LS_RESTORE => r.restore_line_pattern(),
            LS_SAVE => r.save_line_pattern(),
            X_START | Y_START | X_END | Y_END | X_START_F | Y_START_F | X_END_F | Y_END_F
            | X_START_I | X_END_F1 | XY_START_I | XY_END_I | X_START_END_I => {
                r.write_coordinate(register, value);
                self.pending_line = None;
            }
            X_SAVE => r.x_save = value as i16,
            XY_MOVE => r.xy_move = value,
            BRES_D | BRES_S1 | BRES_OCT_INC1 | BRES_RND_INC2 => {
                match register {
                    BRES_D => r.bres_d = value & 0x07FF_FFFF,
                    BRES_S1 => r.bres_s1 = value & 0x0001_FFFF,
                    BRES_OCT_INC1 => r.bres_oct_inc1 = value & 0x070F_FFFF,
                    _ => r.bres_rnd_inc2 = value & 0xFF1F_FFFF,
                }
                self.pending_line = None;
            }
            BRES_E1 => r.bres_e1 = value,
            BRES_S2 => r.bres_s2 = value,
            A_WEIGHT0 => r.a_weight0 = value,
            A_WEIGHT1 => r.a_weight1 = value,
            COLOR_RED | COLOR_ALPHA | COLOR_GREEN | COLOR_BLUE => r.write_color(register, value),
            SLOPE_RED | SLOPE_ALPHA | SLOPE_GREEN | SLOPE_BLUE | SLOPE_RED1 => {
                r.write_slope(register, value);
            }
            WRITE_MASK => r.write_mask = value & 0xFF_FFFF,
            COLOR_I | COLOR_X => r.color_i = value,
            HOST_RW0 => {
                r.host_data = (u64::from(value) << 32) | (r.host_data & 0xFFFF_FFFF);
            }
            HOST_RW1 => r.host_data = (r.host_data & !0xFFFF_FFFF) | u64::from(value),
            DCB_MODE => r.dcb_mode = value & 0x7FF,
            DCB_DATA0 => r.dcb_data_msw = value,
            DCB_DATA1 => r.dcb_data_lsw = value,
            SMASK1_X..=SMASK4_Y if register & 3 == 0 => {
                let (index, is_y) = screen_mask_slot(register);
                if is_y {
                    r.smask_y[index] = value;
                } else {
                    r.smask_x[index] = value;
                }
            }
            TOP_SCAN => r.top_scan = value & 0x3FF,
            XY_WINDOW => {
                r.xy_window = value;
                log::debug!("Window origin: {:?}", r.xy_window());
            }
            CLIP_MODE => {
                r.clip_mode = value & 0x1FFF;
                log::debug!("Clip mode: screen masks {:05b}", r.clip_mode & 0x1F);
            }
            CONFIG => r.config = value & 0x1F_FFFF,
            STATUS | USER_STATUS => {
                log::warn!("REX3 write to read-only status register {register:04X}: {value:08X}");
            }
            DCB_RESET => {}
            _ => {
                log::warn!("REX3 write to unknown register {register:04X}: {value:08X}");
            }
        }
    }

    /// Latch the DCB transfer state into the status register.
    pub fn set_dcb_status(&mut self, busy: bool, timed_out: bool) {
        let status = &mut self.registers.status;
        *status &= !(STATUS_BACK_BUSY | STATUS_DCB_TIMEOUT);
        if busy {
            *status |= STATUS_BACK_BUSY;
        }
        if timed_out {
            *status |= STATUS_DCB_TIMEOUT;
        }
    }

    pub fn raise_status(&mut self, bits: u32) {
        self.registers.status |= bits;
    }

    /// Execute the command programmed in the draw mode registers.
    pub fn execute(&mut self) {
        let pipeline = self.resolve_pipeline();
        let mode0 = pipeline.mode0;

        log::trace!(
            "REX3 GO: {:?} {:?} start=({}, {}) end=({}, {})",
            mode0.opcode,
            mode0.address_mode,
            self.registers.x_start.integer(),
            self.registers.y_start.integer(),
            self.registers.x_end.integer(),
            self.registers.y_end.integer()
        );

        match (mode0.opcode, mode0.address_mode) {
            (Opcode::NoOp, _) => {}
            (Opcode::Draw, AddressMode::Span | AddressMode::Block) => self.draw_rect(&pipeline),
            (Opcode::Draw, AddressMode::IntegerLine) => self.draw_line(&pipeline, false),
            (Opcode::Draw, AddressMode::FractionalLine | AddressMode::AntialiasedLine) => {
                self.draw_line(&pipeline, true);
            }
            (Opcode::Read, AddressMode::Span | AddressMode::Block) => self.read_rect(&pipeline),
            (Opcode::ScreenToScreen, AddressMode::Span | AddressMode::Block) => {
                self.copy_rect(&pipeline);
            }
            (opcode, address_mode) => {
                log::debug!("Ignoring undefined command {opcode:?} with {address_mode:?}");
            }
        }

        self.registers.status &= !(STATUS_GFX_BUSY | STATUS_FIFO_LEVELS);
    }

    fn resolve_pipeline(&self) -> Pipeline {
        let mode0 = self.registers.draw_mode0();
        let mode1 = self.registers.draw_mode1();

        let plane = match mode1.planes {
            PlaneSelect::None => None,
            PlaneSelect::RgbCi | PlaneSelect::Rgba => Some(Plane::RgbCi),
            PlaneSelect::Overlay => Some(Plane::Overlay),
            PlaneSelect::Popup => Some(Plane::Popup),
            PlaneSelect::Cid => Some(Plane::Cid),
            PlaneSelect::Undefined(planes) => match self.config.undefined_planes {
                UndefinedPlanePolicy::Ignore => {
                    log::warn!("Undefined plane select {planes}, ignoring pixel writes");
                    None
                }
                UndefinedPlanePolicy::RgbCi => Some(Plane::RgbCi),
            },
        };

        let source = if mode0.color_host {
            ColorSource::Host
        } else if mode1.fast_clear {
            ColorSource::FastClear
        } else if mode0.shade {
            ColorSource::Shade
        } else {
            ColorSource::Flat
        };

        let depth = mode1.draw_depth;
        let (pixel_mask, store_shift, write_mask) = match plane {
            Some(Plane::RgbCi) | None => {
                let shift = if mode1.double_source { depth.store_shift() } else { 0 };
                let mask = ((self.registers.write_mask & depth.pixel_mask()) << shift)
                    & self.config.global_write_mask;
                (depth.pixel_mask(), shift, mask)
            }
            Some(plane) => {
                let mask = plane.storage_mask();
                (mask, 0, self.registers.write_mask & mask)
            }
        };

        let host_depth = mode1.host_depth.pixel_depth();

        Pipeline {
            mode0,
            mode1,
            plane,
            source,
            depth,
            pixel_mask,
            store_shift,
            write_mask,
            host_convert: color::converter(host_depth, depth),
            read_convert: color::converter(depth, host_depth),
        }
    }

    fn position(&self) -> (i32, i32) {
        (self.registers.x_start.integer().into(), self.registers.y_start.integer().into())
    }

    // Step to the next pixel of a span or block. Returns false once the last pixel is done,
    // leaving X at the saved row start and Y on the following row.
    fn advance_rect(&mut self, mode0: DrawMode0) -> bool {
        let (x, y) = self.position();
        let x_end: i32 = self.registers.x_end.integer().into();
        let y_end: i32 = self.registers.y_end.integer().into();

        if x != x_end {
            let dx = (x_end - x).signum();
            self.registers.x_start = FixedCoord::from_integer((x + dx) as i16);
            return true;
        }

        let stride = if mode0.y_stride { 2 } else { 1 };
        let dy = if y_end < y { -1 } else { 1 };
        let last_row = mode0.address_mode == AddressMode::Span || (y_end - y).abs() < stride;

        self.registers.x_start = FixedCoord::from_integer(self.registers.x_save);
        self.registers.y_start = FixedCoord::from_integer((y + dy * stride) as i16);

        !last_row
    }

    fn shaded_color(&self, pipeline: &Pipeline, x: i32, y: i32) -> u32 {
        let r = &self.registers;

        if !pipeline.mode1.rgb_mode {
            let ci = r.color_red.bits(11..=22);
            return if pipeline.mode0.ci_clamp && ci > pipeline.pixel_mask {
                pipeline.pixel_mask
            } else {
                ci & pipeline.pixel_mask
            };
        }

        let mut red = accumulator_channel(r.color_red);
        let mut green = accumulator_channel(r.color_green);
        let mut blue = accumulator_channel(r.color_blue);

        if pipeline.mode1.dither && pipeline.plane == Some(Plane::RgbCi) {
            let threshold = BAYER_4X4[(y & 3) as usize][(x & 3) as usize];
            let (red_bits, green_bits, blue_bits) = channel_bits(pipeline.depth);
            red = dither_channel(red, red_bits, threshold);
            green = dither_channel(green, green_bits, threshold);
            blue = dither_channel(blue, blue_bits, threshold);
        }

        color::from_bgr24(pipeline.depth, (blue << 16) | (green << 8) | red)
    }

    // Returns the source color and alpha for the next pixel, or None if the host data port has
    // been drained
    fn source_pixel(
        &self,
        pipeline: &Pipeline,
        host: &mut HostPort,
        x: i32,
        y: i32,
    ) -> Option<(u32, u32)> {
        let alpha = accumulator_channel(self.registers.color_alpha);

        let color = match pipeline.source {
            ColorSource::Host => {
                let mut value = host.next()?;
                let host_depth = pipeline.mode1.host_depth;
                if pipeline.mode1.swap_endian {
                    value = color::byte_swap(host_depth.pixel_depth(), value);
                }

                let alpha = if pipeline.mode0.alpha_host && host_depth == HostDepth::Bpp32 {
                    value >> 24
                } else {
                    alpha
                };

                let color = if pipeline.mode1.rgb_mode && pipeline.plane == Some(Plane::RgbCi) {
                    (pipeline.host_convert)(value)
                } else {
                    value & pipeline.pixel_mask
                };
                return Some((color, alpha));
            }
            ColorSource::FastClear => self.registers.color_vram & pipeline.pixel_mask,
            ColorSource::Shade => self.shaded_color(pipeline, x, y),
            ColorSource::Flat => self.registers.color_i & pipeline.pixel_mask,
        };

        Some((color, alpha))
    }

    fn z_pattern_bit(&self, mode0: DrawMode0, x: i32) -> bool {
        let len = if mode0.length32 { 32 } else { 16 };
        let i = x.rem_euclid(len) as u8;
        self.registers.z_pattern.bit(31 - i)
    }

    fn next_line_pattern_bit(&mut self, mode0: DrawMode0) -> bool {
        let r = &mut self.registers;
        let bit = r.ls_pattern.bit(31);

        let repeat = (r.ls_mode & 0xFF).max(1);
        r.ls_repeat_count += 1;
        if r.ls_repeat_count >= repeat {
            r.ls_repeat_count = 0;
            r.ls_pattern = if mode0.length32 {
                r.ls_pattern.rotate_left(1)
            } else {
                // 16-bit patterns live in the upper half
                let upper = ((r.ls_pattern >> 16) as u16).rotate_left(1);
                (u32::from(upper) << 16) | (r.ls_pattern & 0xFFFF)
            };
        }

        bit
    }

    // Pattern gating and XY offset, then the store
    fn draw_pixel(&mut self, pipeline: &Pipeline, x: i32, y: i32, color: u32, alpha: u32) {
        let mode0 = pipeline.mode0;
        let background = self.registers.color_back & pipeline.pixel_mask;
        let mut color = Some(color);

        if mode0.z_pattern_enable && !self.z_pattern_bit(mode0, x) {
            color = mode0.z_opaque.then_some(background);
        }

        if mode0.line_pattern_enable && !self.next_line_pattern_bit(mode0) {
            color = if mode0.line_opaque { color.map(|_| background) } else { None };
        }

        let Some(color) = color else { return };

        let (x, y) = if mode0.xy_offset {
            let (move_x, move_y) = self.registers.xy_move();
            (x + i32::from(move_x), y + i32::from(move_y))
        } else {
            (x, y)
        };

        self.store_pixel(pipeline, x, y, color, alpha);
    }

    // Window-relative coordinates to screen coordinates, applying the enabled screen masks.
    // Returns None if the pixel is clipped.
    fn clip(&self, x: i32, y: i32) -> Option<(i32, i32)> {
        let (window_x, window_y) = self.registers.xy_window();
        let biased_x = x + i32::from(window_x);
        let biased_y = y + i32::from(window_y);

        let clip_mode = self.registers.clip_mode & 0x1F;
        if clip_mode != 0 {
            let inside = (0..5).filter(|&i| clip_mode.bit(i)).any(|i| {
                let ((x_min, x_max), (y_min, y_max)) = self.registers.screen_mask(i as usize);
                // Mask 0 is window-relative, the others are in biased screen space
                let (px, py) = if i == 0 { (x, y) } else { (biased_x, biased_y) };
                (i32::from(x_min)..=i32::from(x_max)).contains(&px)
                    && (i32::from(y_min)..=i32::from(y_max)).contains(&py)
            });

            if !inside {
                return None;
            }
        }

        let screen_x = biased_x - WINDOW_BIAS;
        let screen_y = biased_y - WINDOW_BIAS;
        let in_bounds = (0..self.planes.width() as i32).contains(&screen_x)
            && (0..self.planes.height() as i32).contains(&screen_y);
        in_bounds.then_some((screen_x, screen_y))
    }

    fn flip_y(&self, pipeline: &Pipeline, screen_y: i32) -> i32 {
        if pipeline.mode1.y_flip { self.planes.height() as i32 - 1 - screen_y } else { screen_y }
    }

    fn blend(&self, pipeline: &Pipeline, src: u32, dst: u32, src_alpha: u32) -> u32 {
        let mode1 = pipeline.mode1;
        let src24 = color::to_bgr24(pipeline.depth, src);
        let dst24 = color::to_bgr24(pipeline.depth, dst);

        let mut result = 0;
        for shift in [0, 8, 16] {
            let s = (src24 >> shift) & 0xFF;
            let d = (dst24 >> shift) & 0xFF;
            let src_weight = mode1.src_factor.weight(d, src_alpha);
            let dst_weight = mode1.dst_factor.weight(s, src_alpha);
            result |= blend_channel(s, d, src_weight, dst_weight) << shift;
        }

        color::from_bgr24(pipeline.depth, result)
    }

    fn store_pixel(&mut self, pipeline: &Pipeline, x: i32, y: i32, color: u32, alpha: u32) {
        let Some(plane) = pipeline.plane else { return };

        let Some((screen_x, screen_y)) = self.clip(x, y) else {
            log::trace!("Pixel ({x}, {y}) clipped");
            return;
        };
        let screen_y = self.flip_y(pipeline, screen_y);

        let cell = self.planes.read(plane, screen_x, screen_y);
        let dst = (cell >> pipeline.store_shift) & pipeline.pixel_mask;

        let mode1 = pipeline.mode1;
        let value = if mode1.blend && mode1.rgb_mode && plane == Plane::RgbCi {
            let dst = if mode1.back_blend {
                self.registers.color_back & pipeline.pixel_mask
            } else {
                dst
            };
            self.blend(pipeline, color, dst, alpha)
        } else {
            mode1.logic_op.apply(color, dst)
        };

        self.planes.write(
            plane,
            screen_x,
            screen_y,
            value << pipeline.store_shift,
            pipeline.write_mask,
        );
    }

    // Stored pixel at a window-relative position, in draw depth format
    fn load_pixel(&self, pipeline: &Pipeline, x: i32, y: i32) -> u32 {
        let Some(plane) = pipeline.plane else { return 0 };

        let (window_x, window_y) = self.registers.xy_window();
        let screen_x = x + i32::from(window_x) - WINDOW_BIAS;
        let screen_y = self.flip_y(pipeline, y + i32::from(window_y) - WINDOW_BIAS);

        (self.planes.read(plane, screen_x, screen_y) >> pipeline.store_shift) & pipeline.pixel_mask
    }

    fn draw_rect(&mut self, pipeline: &Pipeline) {
        let x_end: i32 = self.registers.x_end.integer().into();
        if pipeline.mode0.left_to_right_only && x_end < i32::from(self.registers.x_save) {
            log::trace!("Right-to-left span with LR-only set, nothing drawn");
            return;
        }

        let mut host = HostPort::new(self.registers.host_data, pipeline.mode1);
        loop {
            let (x, y) = self.position();
            let Some((color, alpha)) = self.source_pixel(pipeline, &mut host, x, y) else {
                // Resume on the next GO with fresh host data
                break;
            };

            self.draw_pixel(pipeline, x, y, color, alpha);
            if pipeline.mode0.shade {
                self.registers.step_colors();
            }

            if !self.advance_rect(pipeline.mode0) {
                break;
            }
        }

    }

    fn draw_line(&mut self, pipeline: &Pipeline, fractional: bool) {
        let mode0 = pipeline.mode0;

        let mut stepper = match self.pending_line.take() {
            Some(stepper) => stepper,
            None => {
                let r = &mut self.registers;
                let (params, start) = match (mode0.do_setup, fractional) {
                    (true, false) => {
                        let (x0, y0) = (r.x_start.integer().into(), r.y_start.integer().into());
                        let (x1, y1) = (r.x_end.integer().into(), r.y_end.integer().into());
                        (BresenhamParams::integer_setup(x0, y0, x1, y1), (x0, y0))
                    }
                    (true, true) => {
                        BresenhamParams::fractional_setup(r.x_start, r.y_start, r.x_end, r.y_end)
                    }
                    (false, false) => (
                        BresenhamParams::from_registers(r),
                        (r.x_start.integer().into(), r.y_start.integer().into()),
                    ),
                    (false, true) => {
                        (BresenhamParams::from_registers(r), (r.x_start.rounded(), r.y_start.rounded()))
                    }
                };

                if mode0.do_setup {
                    params.write_registers(r);
                }

                let Some(stepper) = LineStepper::new(start.0, start.1, params) else {
                    log::trace!("Zero-length line at {start:?}, nothing drawn");
                    return;
                };
                stepper
            }
        };

        let mut host = HostPort::new(self.registers.host_data, pipeline.mode1);
        loop {
            let (x, y) = stepper.position();

            if stepper.endpoint_drawn(self.config.line_endpoints, mode0) {
                let Some((color, alpha)) = self.source_pixel(pipeline, &mut host, x, y) else {
                    self.pending_line = Some(stepper);
                    return;
                };
                self.draw_pixel(pipeline, x, y, color, alpha);
            } else if mode0.line_pattern_enable
                && mode0.line_pattern_advance_last
                && stepper.is_last()
            {
                self.next_line_pattern_bit(mode0);
            }

            if mode0.shade {
                self.registers.step_colors();
            }

            if stepper.is_last() {
                break;
            }
            stepper.advance();
        }

        let (x, y) = stepper.position();
        self.registers.x_start = FixedCoord::from_integer(x as i16);
        self.registers.y_start = FixedCoord::from_integer(y as i16);
        self.registers.bres_d = (stepper.decision() as u32) & 0x07FF_FFFF;
    }

    fn read_rect(&mut self, pipeline: &Pipeline) {
        let mode1 = pipeline.mode1;
        let mut port = HostPort::new(0, mode1);

        while port.has_room() {
            let (x, y) = self.position();

            let mut value = self.load_pixel(pipeline, x, y);
            if mode1.rgb_mode && pipeline.plane == Some(Plane::RgbCi) {
                value = (pipeline.read_convert)(value);
            }
            if mode1.swap_endian {
                value = color::byte_swap(mode1.host_depth.pixel_depth(), value);
            }
            port.push(value);

            if !self.advance_rect(pipeline.mode0) {
                break;
            }
        }

        self.registers.host_data = port.data;
    }

    fn copy_rect(&mut self, pipeline: &Pipeline) {
        let (move_x, move_y) = self.registers.xy_move();

        loop {
            let (x, y) = self.position();
            let value = self.load_pixel(pipeline, x, y);
            let alpha = accumulator_channel(self.registers.color_alpha);
            self.store_pixel(pipeline, x + i32::from(move_x), y + i32::from(move_y), value, alpha);

            if !self.advance_rect(pipeline.mode0) {
                break;
            }
        }
    }
}

// SMask1X..SMask4Y are interleaved X/Y pairs starting at mask 1
fn screen_mask_slot(register: u32) -> (usize, bool) {
    let offset = register - SMASK1_X;
    ((offset / 8) as usize + 1, offset.bit(2))
}
