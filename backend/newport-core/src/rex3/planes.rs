use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Plane {
    RgbCi,
    Overlay,
    Popup,
    Cid,
}

impl Plane {
    /// Bits that a write to this plane may modify.
    #[must_use]
    pub fn storage_mask(self) -> u32 {
        match self {
            Self::RgbCi => 0xFFFF_FFFF,
            Self::Overlay => 0xFF,
            Self::Popup | Self::Cid => 0x03,
        }
    }
}

/// The four framebuffer planes. Every cell is 32 bits regardless of the depth it is drawn at.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Planes {
    width: u32,
    height: u32,
    rgbci: Vec<u32>,
    overlay: Vec<u32>,
    popup: Vec<u32>,
    cid: Vec<u32>,
}

impl Planes {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            rgbci: vec![0; len],
            overlay: vec![0; len],
            popup: vec![0; len],
            cid: vec![0; len],
        }
    }

    pub fn clear(&mut self) {
        self.rgbci.fill(0);
        self.overlay.fill(0);
        self.popup.fill(0);
        self.cid.fill(0);
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let in_bounds =
            (0..self.width as i32).contains(&x) && (0..self.height as i32).contains(&y);
        in_bounds.then(|| (y as u32 * self.width + x as u32) as usize)
    }

    #[must_use]
    pub fn plane(&self, plane: Plane) -> &[u32] {
        match plane {
            Plane::RgbCi => &self.rgbci,
            Plane::Overlay => &self.overlay,
            Plane::Popup => &self.popup,
            Plane::Cid => &self.cid,
        }
    }

    fn plane_mut(&mut self, plane: Plane) -> &mut [u32] {
        match plane {
            Plane::RgbCi => &mut self.rgbci,
            Plane::Overlay => &mut self.overlay,
            Plane::Popup => &mut self.popup,
            Plane::Cid => &mut self.cid,
        }
    }

    /// Out-of-bounds reads return 0.
    #[must_use]
    pub fn read(&self, plane: Plane, x: i32, y: i32) -> u32 {
        self.index(x, y).map_or(0, |i| self.plane(plane)[i])
    }

    /// Replace the bits of the cell selected by `mask`. Out-of-bounds writes are dropped.
    pub fn write(&mut self, plane: Plane, x: i32, y: i32, value: u32, mask: u32) {
        let Some(i) = self.index(x, y) else { return };

        let mask = mask & plane.storage_mask();
        let cell = &mut self.plane_mut(plane)[i];
        *cell = (*cell & !mask) | (value & mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_writes() {
        let mut planes = Planes::new(16, 8);

        planes.write(Plane::RgbCi, 3, 2, 0x00AB_CDEF, 0x0000_FF00);
        assert_eq!(planes.read(Plane::RgbCi, 3, 2), 0x0000_CD00);

        planes.write(Plane::Popup, 3, 2, 0xFF, 0xFFFF_FFFF);
        assert_eq!(planes.read(Plane::Popup, 3, 2), 0x03);

        planes.write(Plane::Overlay, 15, 7, 0x1234, 0xFFFF_FFFF);
        assert_eq!(planes.read(Plane::Overlay, 15, 7), 0x34);
    }

    #[test]
    fn out_of_bounds_is_ignored() {
        let mut planes = Planes::new(16, 8);

        planes.write(Plane::RgbCi, 16, 0, 1, !0);
        planes.write(Plane::RgbCi, -1, 0, 1, !0);
        planes.write(Plane::RgbCi, 0, 8, 1, !0);
        assert!(planes.plane(Plane::RgbCi).iter().all(|&cell| cell == 0));
        assert_eq!(planes.read(Plane::RgbCi, 0, -1), 0);
    }
}
