use crate::image::{Image, Rgba};

// ============================================================================
// Utility Functions
// ============================================================================

/// Alpha blend a single color channel
/// Uses fast approximation: (x + 1 + (x >> 8)) >> 8 instead of x / 255
#[inline]
fn blend_channel(src: u8, dst: u8, alpha: u16) -> u8 {
    let result = src as u16 * alpha + dst as u16 * (255 - alpha);
    ((result + 1 + (result >> 8)) >> 8) as u8
}

/// Multiply two 0-255 values as if they were 0-1 fractions
#[inline]
fn mul_channel(a: u8, b: u8) -> u8 {
    let x = a as u16 * b as u16;
    ((x + 1 + (x >> 8)) >> 8) as u8
}

/// Write ABGR pixel to slice (RGBA8888 little-endian byte order)
#[inline]
fn write_pixel(dest: &mut [u8], r: u8, g: u8, b: u8) {
    dest[0] = 255; // A
    dest[1] = b; // B
    dest[2] = g; // G
    dest[3] = r; // R
}

// ============================================================================
// PixelBuffer
// ============================================================================

/// RGBA8888 screen buffer for software compositing.
/// Sprites are drawn into this, then it is uploaded to the window texture.
pub struct PixelBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Create a new pixel buffer with custom resolution
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![0; (width * height * 4) as usize],
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Check if coordinates are within bounds
    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32
    }

    /// Calculate byte offset for pixel at (x, y)
    #[inline]
    fn pixel_index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Clear to a solid color
    pub fn clear(&mut self, r: u8, g: u8, b: u8) {
        for px in self.pixels.chunks_exact_mut(4) {
            write_pixel(px, r, g, b);
        }
    }

    /// Set a single pixel (bounds checked)
    #[inline]
    pub fn set_pixel(&mut self, x: i32, y: i32, r: u8, g: u8, b: u8) {
        if self.in_bounds(x, y) {
            let idx = self.pixel_index(x as u32, y as u32);
            write_pixel(&mut self.pixels[idx..idx + 4], r, g, b);
        }
    }

    /// Set pixel with alpha blending
    #[inline]
    pub fn blend_pixel(&mut self, x: i32, y: i32, r: u8, g: u8, b: u8, a: u8) {
        if self.in_bounds(x, y) {
            let idx = self.pixel_index(x as u32, y as u32);
            let alpha = a as u16;
            self.pixels[idx] = 255; // A - always opaque
            self.pixels[idx + 1] = blend_channel(b, self.pixels[idx + 1], alpha);
            self.pixels[idx + 2] = blend_channel(g, self.pixels[idx + 2], alpha);
            self.pixels[idx + 3] = blend_channel(r, self.pixels[idx + 3], alpha);
        }
    }

    /// Read a pixel from the buffer (bounds checked)
    /// Returns None if coordinates are out of bounds
    #[inline]
    pub fn get_pixel(&self, x: i32, y: i32) -> Option<(u8, u8, u8)> {
        if self.in_bounds(x, y) {
            let idx = self.pixel_index(x as u32, y as u32);
            Some((
                self.pixels[idx + 3], // R
                self.pixels[idx + 2], // G
                self.pixels[idx + 1], // B
            ))
        } else {
            None
        }
    }

    /// Fill a rectangle
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, r: u8, g: u8, b: u8) {
        for row in y..y + h as i32 {
            for col in x..x + w as i32 {
                self.set_pixel(col, row, r, g, b);
            }
        }
    }

    /// Checkerboard backdrop so transparency is visible
    pub fn checkerboard(&mut self, tile: u32, c1: (u8, u8, u8), c2: (u8, u8, u8)) {
        let tile = tile.max(1);
        for y in 0..self.height {
            for x in 0..self.width {
                let (r, g, b) = if ((x / tile) + (y / tile)) % 2 == 0 { c1 } else { c2 };
                let idx = self.pixel_index(x, y);
                write_pixel(&mut self.pixels[idx..idx + 4], r, g, b);
            }
        }
    }

    // ========================================================================
    // Sprite Compositing
    // ========================================================================

    /// Draw an RGBA image at (x, y), multiplied by `tint` (color and alpha),
    /// then source-over blended. Fully transparent results are skipped.
    pub fn draw_image_tinted(&mut self, image: &Image, x: i32, y: i32, tint: Rgba) {
        if tint.a == 0 {
            return;
        }
        let w = image.width() as i32;
        for (i, px) in image.pixels().iter().enumerate() {
            let dx = x + i as i32 % w;
            let dy = y + i as i32 / w;
            if !self.in_bounds(dx, dy) {
                continue;
            }
            let a = mul_channel(px.a, tint.a);
            if a == 0 {
                continue;
            }
            let r = mul_channel(px.r, tint.r);
            let g = mul_channel(px.g, tint.g);
            let b = mul_channel(px.b, tint.b);
            if a == 255 {
                self.set_pixel(dx, dy, r, g, b);
            } else {
                self.blend_pixel(dx, dy, r, g, b, a);
            }
        }
    }

    /// Raw bytes for SDL texture upload
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }
}
