//! Bresenham line stepping
//!
//! Lines are normalized into one of eight octants, stepped one pixel along the major axis at a
//! time, and stepped along the minor axis whenever the decision variable is non-negative.

use crate::rex3::registers::{DrawMode0, FixedCoord, Registers};
use bincode::{Decode, Encode};
use newport_common::num::{GetBit, SignExtend};
use newport_config::LineEndpointPolicy;

const BRES_D_BITS: u8 = 27;
const BRES_D_MASK: u32 = (1 << BRES_D_BITS) - 1;
const BRES_COUNT_MASK: u32 = 0x1_FFFF;
const BRES_INCR1_BITS: u8 = 20;
const BRES_INCR2_BITS: u8 = 21;

/// Bit 0 = Y major, bit 1 = Y decreasing, bit 2 = X decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct Octant(u8);

impl Octant {
    #[must_use]
    pub fn from_deltas(dx: i32, dy: i32) -> Self {
        let y_major = dy.abs() > dx.abs();
        Self(u8::from(y_major) | (u8::from(dy < 0) << 1) | (u8::from(dx < 0) << 2))
    }

    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self((bits & 7) as u8)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn y_major(self) -> bool {
        self.0.bit(0)
    }

    #[must_use]
    pub fn x_step(self) -> i32 {
        if self.0.bit(2) { -1 } else { 1 }
    }

    #[must_use]
    pub fn y_step(self) -> i32 {
        if self.0.bit(1) { -1 } else { 1 }
    }
}

/// Bresenham decision variable, increments and loop count for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct BresenhamParams {
    pub octant: Octant,
    pub d: i32,
    pub incr1: i32,
    pub incr2: i32,
    /// Major axis span in pixels; the line covers `count + 1` pixels
    pub count: u32,
}

impl BresenhamParams {
    #[must_use]
    pub fn integer_setup(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let dx = x1 - x0;
        let dy = y1 - y0;
        let octant = Octant::from_deltas(dx, dy);

        let (major, minor) =
            if octant.y_major() { (dy.abs(), dx.abs()) } else { (dx.abs(), dy.abs()) };

        Self {
            octant,
            d: 2 * minor - major,
            incr1: 2 * minor,
            incr2: 2 * (minor - major),
            count: major as u32,
        }
    }

    /// Setup from 1/16-pixel coordinates. Returns the parameters along with the rounded start
    /// pixel. The error terms carry the sub-pixel offsets of both endpoints so the stepped pixels
    /// are the ones nearest the true line.
    #[must_use]
    pub fn fractional_setup(
        x_start: FixedCoord,
        y_start: FixedCoord,
        x_end: FixedCoord,
        y_end: FixedCoord,
    ) -> (Self, (i32, i32)) {
        let (x0, y0) = (x_start.sixteenths(), y_start.sixteenths());
        let (x1, y1) = (x_end.sixteenths(), y_end.sixteenths());
        let octant = Octant::from_deltas(x1 - x0, y1 - y0);

        // Normalize so that both axes increase
        let (sx, sy) = (octant.x_step(), octant.y_step());
        let (a0, a1, b0) = if octant.y_major() {
            (sy * y0, sy * y1, sx * x0)
        } else {
            (sx * x0, sx * x1, sy * y0)
        };
        let da = a1 - a0;
        let db = if octant.y_major() { (x1 - x0).abs() } else { (y1 - y0).abs() };

        let round = |v: i32| (v + 8) >> 4;
        let a_start = round(a0);
        let b_start = round(b0);
        let a_end = round(a1);

        let error = (b0 - 16 * b_start) * da + (16 * a_start - a0) * db;

        let params = Self {
            octant,
            d: 2 * error + 32 * db - 16 * da,
            incr1: 32 * db,
            incr2: 32 * db - 32 * da,
            count: (a_end - a_start) as u32,
        };

        let start = if octant.y_major() {
            (sx * b_start, sy * a_start)
        } else {
            (sx * a_start, sy * b_start)
        };

        (params, start)
    }

    /// Host-programmed parameters, used when draw mode 0 does not request setup.
    #[must_use]
    pub fn from_registers(registers: &Registers) -> Self {
        Self {
            octant: Octant::from_bits(registers.bres_oct_inc1.bits(24..=26)),
            d: registers.bres_d.sign_extend(BRES_D_BITS),
            incr1: (registers.bres_oct_inc1 & 0xF_FFFF).sign_extend(BRES_INCR1_BITS),
            incr2: (registers.bres_rnd_inc2 & 0x1F_FFFF).sign_extend(BRES_INCR2_BITS),
            count: registers.bres_s1 & BRES_COUNT_MASK,
        }
    }

    /// Latch the parameters into the Bresenham registers the way setup does on hardware.
    pub fn write_registers(&self, registers: &mut Registers) {
        registers.bres_d = (self.d as u32) & BRES_D_MASK;
        registers.bres_s1 = self.count & BRES_COUNT_MASK;
        registers.bres_oct_inc1 =
            (u32::from(self.octant.bits()) << 24) | ((self.incr1 as u32) & 0xF_FFFF);
        registers.bres_rnd_inc2 =
            (registers.bres_rnd_inc2 & 0xFF00_0000) | ((self.incr2 as u32) & 0x1F_FFFF);
    }
}

/// An in-progress line. Lines drawn with host color can span several GO commands, so the
/// stepper is kept between commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct LineStepper {
    x: i32,
    y: i32,
    params: BresenhamParams,
    index: u32,
}

impl LineStepper {
    /// Returns `None` for a zero-length line.
    #[must_use]
    pub fn new(x: i32, y: i32, params: BresenhamParams) -> Option<Self> {
        (params.count != 0).then_some(Self { x, y, params, index: 0 })
    }

    #[must_use]
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.index == self.params.count
    }

    #[must_use]
    pub fn decision(&self) -> i32 {
        self.params.d
    }

    pub fn advance(&mut self) {
        let octant = self.params.octant;
        let minor_step = self.params.d >= 0;

        if octant.y_major() {
            self.y += octant.y_step();
            if minor_step {
                self.x += octant.x_step();
            }
        } else {
            self.x += octant.x_step();
            if minor_step {
                self.y += octant.y_step();
            }
        }

        // The decision register is 27 bits wide and wraps like one
        let incr = if minor_step { self.params.incr2 } else { self.params.incr1 };
        let d = self.params.d.wrapping_add(incr) as u32;
        self.params.d = (d & BRES_D_MASK).sign_extend(BRES_D_BITS);
        self.index += 1;
    }

    /// Whether the pixel at the current step is drawn, given the endpoint policy.
    #[must_use]
    pub fn endpoint_drawn(&self, policy: LineEndpointPolicy, mode: DrawMode0) -> bool {
        let (skip_first, skip_last) = match policy {
            LineEndpointPolicy::DrawModeFlags => (mode.skip_first, mode.skip_last),
            LineEndpointPolicy::Inclusive => (false, false),
            LineEndpointPolicy::Exclusive => (false, true),
        };

        !(skip_first && self.index == 0) && !(skip_last && self.is_last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(stepper: Option<LineStepper>) -> Vec<(i32, i32)> {
        let Some(mut stepper) = stepper else { return vec![] };

        let mut pixels = vec![stepper.position()];
        while !stepper.is_last() {
            stepper.advance();
            pixels.push(stepper.position());
        }
        pixels
    }

    fn integer_line(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<(i32, i32)> {
        visit(LineStepper::new(x0, y0, BresenhamParams::integer_setup(x0, y0, x1, y1)))
    }

    // Reference: the minor coordinate at each major step is the exact value rounded half up
    fn reference_line(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<(i32, i32)> {
        let (dx, dy) = (x1 - x0, y1 - y0);
        if dx == 0 && dy == 0 {
            return vec![];
        }

        let y_major = dy.abs() > dx.abs();
        let (major, minor) = if y_major { (dy.abs(), dx.abs()) } else { (dx.abs(), dy.abs()) };
        (0..=major)
            .map(|k| {
                let j = (2 * k * minor + major) / (2 * major);
                if y_major {
                    (x0 + j * dx.signum(), y0 + k * dy.signum())
                } else {
                    (x0 + k * dx.signum(), y0 + j * dy.signum())
                }
            })
            .collect()
    }

    #[test]
    fn horizontal_line_covers_both_endpoints() {
        let pixels = integer_line(0, 0, 10, 0);
        assert_eq!(pixels.len(), 11);
        assert!(pixels.iter().enumerate().all(|(i, &p)| p == (i as i32, 0)));
    }

    #[test]
    fn all_octants_match_reference() {
        for dy in -9..=9 {
            for dx in -9..=9 {
                let (x0, y0) = (20, 30);
                let pixels = integer_line(x0, y0, x0 + dx, y0 + dy);
                assert_eq!(pixels, reference_line(x0, y0, x0 + dx, y0 + dy), "dx={dx} dy={dy}");

                // Deterministic across separate commands
                assert_eq!(pixels, integer_line(x0, y0, x0 + dx, y0 + dy));
            }
        }
    }

    #[test]
    fn octant_encoding() {
        assert_eq!(Octant::from_deltas(5, 2).bits(), 0b000);
        assert_eq!(Octant::from_deltas(2, 5).bits(), 0b001);
        assert_eq!(Octant::from_deltas(5, -2).bits(), 0b010);
        assert_eq!(Octant::from_deltas(-5, 2).bits(), 0b100);
        assert_eq!(Octant::from_deltas(-2, -5).bits(), 0b111);
        // X major on ties
        assert_eq!(Octant::from_deltas(3, 3).bits(), 0b000);
    }

    #[test]
    fn zero_length_line_has_no_pixels() {
        assert!(integer_line(4, 4, 4, 4).is_empty());
    }

    #[test]
    fn register_round_trip_preserves_stepping() {
        let params = BresenhamParams::integer_setup(3, 9, -4, 1);
        let mut registers = Registers::default();
        params.write_registers(&mut registers);

        assert_eq!(BresenhamParams::from_registers(&registers), params);
    }

    #[test]
    fn fractional_line_with_whole_coordinates_matches_integer_line() {
        for (x1, y1) in [(7, 3), (-5, 2), (1, -8), (-6, -6)] {
            let (params, start) = BresenhamParams::fractional_setup(
                FixedCoord::from_integer(2),
                FixedCoord::from_integer(3),
                FixedCoord::from_integer(x1),
                FixedCoord::from_integer(y1),
            );
            assert_eq!(start, (2, 3));
            assert_eq!(
                visit(LineStepper::new(start.0, start.1, params)),
                integer_line(2, 3, i32::from(x1), i32::from(y1))
            );
        }
    }

    #[test]
    fn fractional_line_rounds_to_nearest_pixels() {
        // (0.75, 0.25) to (4.25, 1.75): rounds to (1, 0) .. (4, 2)
        let (params, start) = BresenhamParams::fractional_setup(
            FixedCoord::from_parts(0, 12),
            FixedCoord::from_parts(0, 4),
            FixedCoord::from_parts(4, 4),
            FixedCoord::from_parts(1, 12),
        );
        assert_eq!(start, (1, 0));

        let pixels = visit(LineStepper::new(start.0, start.1, params));
        assert_eq!(pixels.len(), 4);
        assert_eq!(pixels.first(), Some(&(1, 0)));
        assert_eq!(pixels.last(), Some(&(4, 2)));

        // Every pixel is the nearest one to the true line at that column
        for &(x, y) in &pixels {
            let exact_y16 = 4 + (x * 16 - 12) * 24 / 56;
            assert!((y * 16 - exact_y16).abs() <= 8, "({x}, {y})");
        }
    }

    #[test]
    fn decision_variable_wraps_at_register_width() {
        let params = BresenhamParams {
            octant: Octant::default(),
            d: 0x03FF_FFFF,
            incr1: 0x7_FFFF,
            incr2: 0xF_FFFF,
            count: BRES_COUNT_MASK,
        };
        let mut stepper = LineStepper::new(0, 0, params).unwrap();

        stepper.advance();
        assert_eq!(stepper.position(), (1, 1));
        assert_eq!(stepper.decision(), 0x040F_FFFE - (1 << 27));

        while !stepper.is_last() {
            stepper.advance();
            assert!((-(1 << 26)..(1 << 26)).contains(&stepper.decision()));
        }
        assert_eq!(stepper.position().0, BRES_COUNT_MASK as i32);
    }

    #[test]
    fn endpoint_policies() {
        let params = BresenhamParams::integer_setup(0, 0, 3, 0);
        let mut stepper = LineStepper::new(0, 0, params).unwrap();
        let flags = DrawMode0 { skip_first: true, skip_last: false, ..DrawMode0::default() };

        assert!(!stepper.endpoint_drawn(LineEndpointPolicy::DrawModeFlags, flags));
        assert!(stepper.endpoint_drawn(LineEndpointPolicy::Inclusive, flags));
        assert!(stepper.endpoint_drawn(LineEndpointPolicy::Exclusive, flags));

        for _ in 0..3 {
            stepper.advance();
        }
        assert!(stepper.is_last());
        assert!(stepper.endpoint_drawn(LineEndpointPolicy::DrawModeFlags, flags));
        assert!(!stepper.endpoint_drawn(LineEndpointPolicy::Exclusive, flags));
    }
}
