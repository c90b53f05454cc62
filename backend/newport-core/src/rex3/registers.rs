use crate::color::PixelDepth;
use bincode::{Decode, Encode};
use newport_common::num::{GetBit, SignExtend};

// Register byte offsets within the REX3 window. Setting bit 11 (GO_ALIAS) on any of these
// executes the programmed command after the register write.
pub const DRAW_MODE1: u32 = 0x0000;
pub const DRAW_MODE0: u32 = 0x0004;
pub const LS_MODE: u32 = 0x0008;
pub const LS_PATTERN: u32 = 0x000C;
pub const LS_PATTERN_SAVE: u32 = 0x0010;
pub const Z_PATTERN: u32 = 0x0014;
pub const COLOR_BACK: u32 = 0x0018;
pub const COLOR_VRAM: u32 = 0x001C;
pub const ALPHA_REF: u32 = 0x0020;
pub const STALL0: u32 = 0x0024;
pub const SMASK0_X: u32 = 0x0028;
pub const SMASK0_Y: u32 = 0x002C;
pub const SETUP: u32 = 0x0030;
pub const STEP_Z: u32 = 0x0034;
pub const LS_RESTORE: u32 = 0x0038;
pub const LS_SAVE: u32 = 0x003C;
pub const X_START: u32 = 0x0100;
pub const Y_START: u32 = 0x0104;
pub const X_END: u32 = 0x0108;
pub const Y_END: u32 = 0x010C;
pub const X_SAVE: u32 = 0x0110;
pub const XY_MOVE: u32 = 0x0114;
pub const BRES_D: u32 = 0x0118;
pub const BRES_S1: u32 = 0x011C;
pub const BRES_OCT_INC1: u32 = 0x0120;
pub const BRES_RND_INC2: u32 = 0x0124;
pub const BRES_E1: u32 = 0x0128;
pub const BRES_S2: u32 = 0x012C;
pub const A_WEIGHT0: u32 = 0x0130;
pub const A_WEIGHT1: u32 = 0x0134;
pub const X_START_F: u32 = 0x0138;
pub const Y_START_F: u32 = 0x013C;
pub const X_END_F: u32 = 0x0140;
pub const Y_END_F: u32 = 0x0144;
pub const X_START_I: u32 = 0x0148;
pub const X_END_F1: u32 = 0x014C;
pub const XY_START_I: u32 = 0x0150;
pub const XY_END_I: u32 = 0x0154;
pub const X_START_END_I: u32 = 0x0158;
pub const COLOR_RED: u32 = 0x0200;
pub const COLOR_ALPHA: u32 = 0x0204;
pub const COLOR_GREEN: u32 = 0x0208;
pub const COLOR_BLUE: u32 = 0x020C;
pub const SLOPE_RED: u32 = 0x0210;
pub const SLOPE_ALPHA: u32 = 0x0214;
pub const SLOPE_GREEN: u32 = 0x0218;
pub const SLOPE_BLUE: u32 = 0x021C;
pub const WRITE_MASK: u32 = 0x0220;
pub const COLOR_I: u32 = 0x0224;
pub const COLOR_X: u32 = 0x0228;
pub const SLOPE_RED1: u32 = 0x022C;
pub const HOST_RW0: u32 = 0x0230;
pub const HOST_RW1: u32 = 0x0234;
pub const DCB_MODE: u32 = 0x0238;
pub const DCB_DATA0: u32 = 0x0240;
pub const DCB_DATA1: u32 = 0x0244;
pub const SMASK1_X: u32 = 0x1300;
pub const SMASK4_Y: u32 = 0x131C;
pub const TOP_SCAN: u32 = 0x1320;
pub const XY_WINDOW: u32 = 0x1324;
pub const CLIP_MODE: u32 = 0x1328;
pub const CONFIG: u32 = 0x1330;
pub const STATUS: u32 = 0x1338;
pub const USER_STATUS: u32 = 0x133C;
pub const DCB_RESET: u32 = 0x1340;

pub const GO_ALIAS: u32 = 0x0800;

// Status register bits
pub const STATUS_GFX_BUSY: u32 = 1 << 3;
pub const STATUS_BACK_BUSY: u32 = 1 << 4;
pub const STATUS_VRINT: u32 = 1 << 5;
pub const STATUS_VIDEOINT: u32 = 1 << 6;
pub const STATUS_DCB_TIMEOUT: u32 = 1 << 20;

// Coordinates occupy bits 26:7 of their registers
const COORD_MASK: u32 = 0x07FF_FF80;
// Fractional-format aliases only carry 12 integer bits
const COORD_F_MASK: u32 = 0x007F_FF80;

// Color accumulators are 9.11 fixed point plus headroom for overflow detection
const COLOR_ACCUMULATOR_MASK: u32 = 0x00FF_FFFF;

/// Signed 16.4 fixed-point screen coordinate as stored in bits 26:7 of a coordinate register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct FixedCoord(u32);

impl FixedCoord {
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw & COORD_MASK)
    }

    #[must_use]
    pub fn from_integer(integer: i16) -> Self {
        Self(u32::from(integer as u16) << 11)
    }

    #[must_use]
    pub fn from_parts(integer: i16, fraction: u8) -> Self {
        Self((u32::from(integer as u16) << 11) | (u32::from(fraction & 0xF) << 7))
    }

    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn integer(self) -> i16 {
        (((self.0 << 5) as i32) >> 16) as i16
    }

    #[must_use]
    pub fn fraction(self) -> u8 {
        self.0.bits(7..=10) as u8
    }

    #[must_use]
    pub fn sixteenths(self) -> i32 {
        ((self.0 << 5) as i32) >> 12
    }

    /// Nearest whole pixel.
    #[must_use]
    pub fn rounded(self) -> i32 {
        (self.sixteenths() + 8) >> 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum Opcode {
    #[default]
    NoOp = 0,
    Read = 1,
    Draw = 2,
    ScreenToScreen = 3,
}

impl Opcode {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::NoOp,
            1 => Self::Read,
            2 => Self::Draw,
            3 => Self::ScreenToScreen,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum AddressMode {
    #[default]
    Span,
    Block,
    IntegerLine,
    FractionalLine,
    AntialiasedLine,
    Undefined(u8),
}

impl AddressMode {
    fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => Self::Span,
            1 => Self::Block,
            2 => Self::IntegerLine,
            3 => Self::FractionalLine,
            4 => Self::AntialiasedLine,
            other => Self::Undefined(other as u8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum PlaneSelect {
    #[default]
    None,
    RgbCi,
    Rgba,
    Overlay,
    Popup,
    Cid,
    Undefined(u8),
}

impl PlaneSelect {
    fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => Self::None,
            1 => Self::RgbCi,
            2 => Self::Rgba,
            4 => Self::Overlay,
            5 => Self::Popup,
            6 => Self::Cid,
            other => Self::Undefined(other as u8),
        }
    }
}

/// Bits per pixel of host data port transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum HostDepth {
    #[default]
    Bpp4,
    Bpp8,
    Bpp12,
    Bpp32,
}

impl HostDepth {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Bpp4,
            1 => Self::Bpp8,
            2 => Self::Bpp12,
            3 => Self::Bpp32,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    #[must_use]
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Bpp4 => 4,
            Self::Bpp8 => 8,
            Self::Bpp12 => 12,
            Self::Bpp32 => 32,
        }
    }

    #[must_use]
    pub fn pixel_mask(self) -> u64 {
        (1 << self.bits_per_pixel()) - 1
    }

    /// Equivalent framebuffer depth for color conversion; 32bpp host pixels carry 24bpp color
    /// with alpha in the top byte.
    #[must_use]
    pub fn pixel_depth(self) -> PixelDepth {
        match self {
            Self::Bpp4 => PixelDepth::Bpp4,
            Self::Bpp8 => PixelDepth::Bpp8,
            Self::Bpp12 => PixelDepth::Bpp12,
            Self::Bpp32 => PixelDepth::Bpp24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum LogicOp {
    Zero,
    And,
    AndReverse,
    #[default]
    Src,
    AndInverted,
    Dst,
    Xor,
    Or,
    Nor,
    Equiv,
    InvertDst,
    OrReverse,
    InvertSrc,
    OrInverted,
    Nand,
    One,
}

impl LogicOp {
    fn from_bits(bits: u32) -> Self {
        match bits & 0xF {
            0 => Self::Zero,
            1 => Self::And,
            2 => Self::AndReverse,
            3 => Self::Src,
            4 => Self::AndInverted,
            5 => Self::Dst,
            6 => Self::Xor,
            7 => Self::Or,
            8 => Self::Nor,
            9 => Self::Equiv,
            10 => Self::InvertDst,
            11 => Self::OrReverse,
            12 => Self::InvertSrc,
            13 => Self::OrInverted,
            14 => Self::Nand,
            15 => Self::One,
            _ => unreachable!("value & 0xF is always <= 15"),
        }
    }

    #[must_use]
    pub fn apply(self, src: u32, dst: u32) -> u32 {
        match self {
            Self::Zero => 0,
            Self::And => src & dst,
            Self::AndReverse => src & !dst,
            Self::Src => src,
            Self::AndInverted => !src & dst,
            Self::Dst => dst,
            Self::Xor => src ^ dst,
            Self::Or => src | dst,
            Self::Nor => !(src | dst),
            Self::Equiv => !(src ^ dst),
            Self::InvertDst => !dst,
            Self::OrReverse => src | !dst,
            Self::InvertSrc => !src,
            Self::OrInverted => !src | dst,
            Self::Nand => !(src & dst),
            Self::One => 0xFFFF_FFFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum BlendFactor {
    #[default]
    Zero,
    One,
    /// Destination color for the source factor, source color for the destination factor
    OtherColor,
    OneMinusOtherColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    Undefined(u8),
}

impl BlendFactor {
    fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::OtherColor,
            3 => Self::OneMinusOtherColor,
            4 => Self::SrcAlpha,
            5 => Self::OneMinusSrcAlpha,
            other => Self::Undefined(other as u8),
        }
    }

    /// Weight in 0..=255 for one channel.
    #[must_use]
    pub fn weight(self, other_channel: u32, src_alpha: u32) -> u32 {
        match self {
            Self::Zero | Self::Undefined(_) => 0,
            Self::One => 255,
            Self::OtherColor => other_channel,
            Self::OneMinusOtherColor => 255 - other_channel,
            Self::SrcAlpha => src_alpha,
            Self::OneMinusSrcAlpha => 255 - src_alpha,
        }
    }
}

/// Decoded draw mode 0: command and geometry control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct DrawMode0 {
    pub opcode: Opcode,
    pub address_mode: AddressMode,
    pub do_setup: bool,
    pub color_host: bool,
    pub alpha_host: bool,
    pub stop_on_x: bool,
    pub stop_on_y: bool,
    pub skip_first: bool,
    pub skip_last: bool,
    pub z_pattern_enable: bool,
    pub line_pattern_enable: bool,
    pub line_pattern_advance_last: bool,
    pub length32: bool,
    pub z_opaque: bool,
    pub line_opaque: bool,
    pub shade: bool,
    pub left_to_right_only: bool,
    pub xy_offset: bool,
    pub ci_clamp: bool,
    pub endpoint_filter: bool,
    pub y_stride: bool,
}

impl DrawMode0 {
    #[must_use]
    pub fn from_word(value: u32) -> Self {
        Self {
            opcode: Opcode::from_bits(value),
            address_mode: AddressMode::from_bits(value.bits(2..=4)),
            do_setup: value.bit(5),
            color_host: value.bit(6),
            alpha_host: value.bit(7),
            stop_on_x: value.bit(8),
            stop_on_y: value.bit(9),
            skip_first: value.bit(10),
            skip_last: value.bit(11),
            z_pattern_enable: value.bit(12),
            line_pattern_enable: value.bit(13),
            line_pattern_advance_last: value.bit(14),
            length32: value.bit(15),
            z_opaque: value.bit(16),
            line_opaque: value.bit(17),
            shade: value.bit(18),
            left_to_right_only: value.bit(19),
            xy_offset: value.bit(20),
            ci_clamp: value.bit(21),
            endpoint_filter: value.bit(22),
            y_stride: value.bit(23),
        }
    }
}

/// Decoded draw mode 1: pixel pipeline control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct DrawMode1 {
    pub planes: PlaneSelect,
    pub draw_depth: PixelDepth,
    pub double_source: bool,
    pub y_flip: bool,
    pub rw_packed: bool,
    pub host_depth: HostDepth,
    pub rw_double: bool,
    pub swap_endian: bool,
    pub compare: u8,
    pub rgb_mode: bool,
    pub dither: bool,
    pub fast_clear: bool,
    pub blend: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub back_blend: bool,
    pub prefetch: bool,
    pub blend_alpha: bool,
    pub logic_op: LogicOp,
}

impl DrawMode1 {
    #[must_use]
    pub fn from_word(value: u32) -> Self {
        Self {
            planes: PlaneSelect::from_bits(value),
            draw_depth: PixelDepth::from_bits(value.bits(3..=4)),
            double_source: value.bit(5),
            y_flip: value.bit(6),
            rw_packed: value.bit(7),
            host_depth: HostDepth::from_bits(value.bits(8..=9)),
            rw_double: value.bit(10),
            swap_endian: value.bit(11),
            compare: value.bits(12..=14) as u8,
            rgb_mode: value.bit(15),
            dither: value.bit(16),
            fast_clear: value.bit(17),
            blend: value.bit(18),
            src_factor: BlendFactor::from_bits(value.bits(19..=21)),
            dst_factor: BlendFactor::from_bits(value.bits(22..=24)),
            back_blend: value.bit(25),
            prefetch: value.bit(26),
            blend_alpha: value.bit(27),
            logic_op: LogicOp::from_bits(value.bits(28..=31)),
        }
    }
}

/// Split a register into its signed upper and lower 16-bit halves.
#[must_use]
pub fn split_halves(value: u32) -> (i16, i16) {
    ((value >> 16) as i16, value as i16)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct Registers {
    pub draw_mode0: u32,
    pub draw_mode1: u32,
    pub ls_mode: u32,
    pub ls_pattern: u32,
    pub ls_pattern_saved: u32,
    pub ls_repeat_count: u32,
    pub z_pattern: u32,
    pub color_back: u32,
    pub color_vram: u32,
    pub alpha_ref: u32,
    pub smask_x: [u32; 5],
    pub smask_y: [u32; 5],
    pub setup: u32,
    pub step_z: u32,
    pub x_start: FixedCoord,
    pub y_start: FixedCoord,
    pub x_end: FixedCoord,
    pub y_end: FixedCoord,
    pub x_save: i16,
    pub xy_move: u32,
    pub bres_d: u32,
    pub bres_s1: u32,
    pub bres_oct_inc1: u32,
    pub bres_rnd_inc2: u32,
    pub bres_e1: u32,
    pub bres_s2: u32,
    pub a_weight0: u32,
    pub a_weight1: u32,
    pub color_red: u32,
    pub color_alpha: u32,
    pub color_green: u32,
    pub color_blue: u32,
    pub slope_red: i32,
    pub slope_alpha: i32,
    pub slope_green: i32,
    pub slope_blue: i32,
    pub write_mask: u32,
    pub color_i: u32,
    pub host_data: u64,
    pub dcb_mode: u32,
    pub dcb_data_msw: u32,
    pub dcb_data_lsw: u32,
    pub top_scan: u32,
    pub xy_window: u32,
    pub clip_mode: u32,
    pub config: u32,
    pub status: u32,
}

impl Registers {
    #[must_use]
    pub fn draw_mode0(&self) -> DrawMode0 {
        DrawMode0::from_word(self.draw_mode0)
    }

    #[must_use]
    pub fn draw_mode1(&self) -> DrawMode1 {
        DrawMode1::from_word(self.draw_mode1)
    }

    #[must_use]
    pub fn xy_move(&self) -> (i16, i16) {
        split_halves(self.xy_move)
    }

    /// Window origin in screen coordinates, with the 0x1000 bias still applied.
    #[must_use]
    pub fn xy_window(&self) -> (i16, i16) {
        split_halves(self.xy_window)
    }

    #[must_use]
    pub fn screen_mask(&self, index: usize) -> ((i16, i16), (i16, i16)) {
        (split_halves(self.smask_x[index]), split_halves(self.smask_y[index]))
    }

    pub fn write_draw_mode0(&mut self, value: u32) {
        self.draw_mode0 = value;

        if log::log_enabled!(log::Level::Debug) {
            let mode = self.draw_mode0();
            log::debug!("Draw mode 0 write: {value:08X}");
            log::debug!("  Opcode: {:?}", mode.opcode);
            log::debug!("  Address mode: {:?}", mode.address_mode);
            log::debug!("  Setup: {}, host color: {}", mode.do_setup, mode.color_host);
            log::debug!("  Skip first/last: {}/{}", mode.skip_first, mode.skip_last);
            log::debug!("  Shade: {}", mode.shade);
        }
    }

    pub fn write_draw_mode1(&mut self, value: u32) {
        self.draw_mode1 = value;

        if log::log_enabled!(log::Level::Debug) {
            let mode = self.draw_mode1();
            log::debug!("Draw mode 1 write: {value:08X}");
            log::debug!("  Planes: {:?}", mode.planes);
            log::debug!("  Draw depth: {}", mode.draw_depth);
            log::debug!("  Host depth: {:?}", mode.host_depth);
            log::debug!("  RGB mode: {}", mode.rgb_mode);
            log::debug!("  Blend: {} ({:?}, {:?})", mode.blend, mode.src_factor, mode.dst_factor);
            log::debug!("  Logic op: {:?}", mode.logic_op);
        }
    }

    pub fn write_x_start(&mut self, coord: FixedCoord) {
        self.x_start = coord;
        self.x_save = coord.integer();
    }

    pub fn write_coordinate(&mut self, register: u32, value: u32) {
        match register {
            X_START => self.write_x_start(FixedCoord::from_raw(value)),
            Y_START => self.y_start = FixedCoord::from_raw(value),
            X_END => self.x_end = FixedCoord::from_raw(value),
            Y_END => self.y_end = FixedCoord::from_raw(value),
            X_START_F => self.write_x_start(FixedCoord::from_raw(value & COORD_F_MASK)),
            Y_START_F => self.y_start = FixedCoord::from_raw(value & COORD_F_MASK),
            X_END_F | X_END_F1 => self.x_end = FixedCoord::from_raw(value & COORD_F_MASK),
            Y_END_F => self.y_end = FixedCoord::from_raw(value & COORD_F_MASK),
            X_START_I => self.write_x_start(FixedCoord::from_integer(value as i16)),
            XY_START_I => {
                let (x, y) = split_halves(value);
                self.write_x_start(FixedCoord::from_integer(x));
                self.y_start = FixedCoord::from_integer(y);
            }
            XY_END_I => {
                let (x, y) = split_halves(value);
                self.x_end = FixedCoord::from_integer(x);
                self.y_end = FixedCoord::from_integer(y);
            }
            X_START_END_I => {
                let (x_start, x_end) = split_halves(value);
                self.write_x_start(FixedCoord::from_integer(x_start));
                self.x_end = FixedCoord::from_integer(x_end);
            }
            _ => {
                log::warn!("Invalid coordinate register {register:04X}: {value:08X}");
                return;
            }
        }

        log::trace!(
            "Coordinates: start=({}, {}) end=({}, {})",
            self.x_start.integer(),
            self.y_start.integer(),
            self.x_end.integer(),
            self.y_end.integer()
        );
    }

    /// 24-bit two's complement slope.
    pub fn write_slope(&mut self, register: u32, value: u32) {
        let slope = (value & 0xFF_FFFF).sign_extend(24);
        match register {
            SLOPE_RED | SLOPE_RED1 => self.slope_red = slope,
            SLOPE_ALPHA => self.slope_alpha = slope,
            SLOPE_GREEN => self.slope_green = slope,
            SLOPE_BLUE => self.slope_blue = slope,
            _ => log::warn!("Invalid slope register {register:04X}: {value:08X}"),
        }
    }

    pub fn write_color(&mut self, register: u32, value: u32) {
        let value = value & COLOR_ACCUMULATOR_MASK;
        match register {
            COLOR_RED => self.color_red = value,
            COLOR_ALPHA => self.color_alpha = value,
            COLOR_GREEN => self.color_green = value,
            COLOR_BLUE => self.color_blue = value,
            _ => log::warn!("Invalid color register {register:04X}: {value:08X}"),
        }
    }

    /// Advance the shading accumulators by one step.
    pub fn step_colors(&mut self) {
        fn step(current: u32, slope: i32) -> u32 {
            (current as i32).wrapping_add(slope) as u32 & COLOR_ACCUMULATOR_MASK
        }

        self.color_red = step(self.color_red, self.slope_red);
        self.color_alpha = step(self.color_alpha, self.slope_alpha);
        self.color_green = step(self.color_green, self.slope_green);
        self.color_blue = step(self.color_blue, self.slope_blue);
    }

    pub fn save_line_pattern(&mut self) {
        self.ls_pattern_saved = self.ls_pattern;
    }

    pub fn restore_line_pattern(&mut self) {
        self.ls_pattern = self.ls_pattern_saved;
        self.ls_repeat_count = 0;
    }

    /// Bump the DCB register select after an access when auto-increment is enabled.
    pub fn advance_dcb_register_select(&mut self) {
        if !self.dcb_mode.bit(3) {
            return;
        }

        let crs = (self.dcb_mode.bits(4..=6) + 1) & 7;
        self.dcb_mode = (self.dcb_mode & !0x70) | (crs << 4);
    }
}

/// Integer part of a 9.11 color accumulator, saturating to 0xFF on overflow.
#[must_use]
pub fn accumulator_channel(value: u32) -> u32 {
    let channel = value.bits(11..=19);
    if channel.bit(8) { 0xFF } else { channel }
}
