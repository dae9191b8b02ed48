//! Sprite Images
//!
//! Row-major RGBA8 pixel storage, plus a few procedural sprite generators so
//! the viewer has something to break apart without loading assets.

/// One RGBA8 pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const WHITE: Self = Self::new(0xFF, 0xFF, 0xFF, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xFF)
    }

    /// Brightness (V of HSV): the largest of the three color channels
    #[inline]
    pub fn brightness(self) -> u8 {
        self.r.max(self.g).max(self.b)
    }
}

/// Row-major offset of `(x, y)`, computed in usize so large images do not
/// wrap in u32
#[inline]
fn pixel_index(width: u32, x: u32, y: u32) -> usize {
    y as usize * width as usize + x as usize
}

/// An RGBA8 image. Dimensions are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl Image {
    /// Create a fully transparent image
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Rgba::TRANSPARENT)
    }

    /// Create an image with every pixel set to `color`
    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
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

    /// True when the image has no pixels at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    /// Mutable pixel access. The slice length never changes.
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [Rgba] {
        &mut self.pixels
    }

    /// Read a pixel (bounds checked)
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        if x < self.width && y < self.height {
            Some(self.pixels[pixel_index(self.width, x, y)])
        } else {
            None
        }
    }

    /// Write a pixel (bounds checked, out of range is ignored)
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Rgba) {
        if x < self.width && y < self.height {
            self.pixels[pixel_index(self.width, x, y)] = color;
        }
    }

    /// Number of pixels with nonzero alpha
    pub fn visible_count(&self) -> usize {
        self.pixels.iter().filter(|p| p.a != 0).count()
    }
}

// ============================================================================
// Procedural Sprite Generators
// ============================================================================

impl Image {
    /// Round blob with a dark outline and a soft highlight toward the top left.
    /// The outline stays below the recolor threshold, the body does not.
    pub fn blob(size: u32, body: (u8, u8, u8), outline: (u8, u8, u8)) -> Self {
        let mut img = Self::new(size, size);
        let center = size as f32 / 2.0;
        let radius = center - 1.0;
        let light_x = center * 0.6;
        let light_y = center * 0.6;

        for y in 0..size {
            for x in 0..size {
                let fx = x as f32 + 0.5;
                let fy = y as f32 + 0.5;
                let d = ((fx - center).powi(2) + (fy - center).powi(2)).sqrt();
                if d > radius {
                    continue;
                }
                if d > radius - 2.0 {
                    img.set(x, y, Rgba::opaque(outline.0, outline.1, outline.2));
                    continue;
                }
                let ld = ((fx - light_x).powi(2) + (fy - light_y).powi(2)).sqrt() / size as f32;
                let shade = (1.15 - ld).clamp(0.55, 1.0);
                img.set(
                    x,
                    y,
                    Rgba::opaque(
                        (body.0 as f32 * shade) as u8,
                        (body.1 as f32 * shade) as u8,
                        (body.2 as f32 * shade) as u8,
                    ),
                );
            }
        }
        img
    }

    /// Diamond filled with a checkerboard, outlined in a dark color
    pub fn checker_gem(size: u32, tile_size: u32, c1: (u8, u8, u8), c2: (u8, u8, u8)) -> Self {
        let mut img = Self::new(size, size);
        let half = size as i32 / 2;
        let tile_size = tile_size.max(1);

        for y in 0..size {
            for x in 0..size {
                let d = (x as i32 - half).abs() + (y as i32 - half).abs();
                if d > half {
                    continue;
                }
                if d >= half - 1 {
                    img.set(x, y, Rgba::opaque(0x18, 0x10, 0x20));
                    continue;
                }
                let checker = ((x / tile_size) + (y / tile_size)) % 2 == 0;
                let (r, g, b) = if checker { c1 } else { c2 };
                img.set(x, y, Rgba::opaque(r, g, b));
            }
        }
        img
    }

    /// Thick ring with a darker inner edge
    pub fn ring(size: u32, thickness: f32, color: (u8, u8, u8)) -> Self {
        let mut img = Self::new(size, size);
        let center = size as f32 / 2.0;
        let outer = center - 1.0;
        let inner = (outer - thickness).max(0.0);

        for y in 0..size {
            for x in 0..size {
                let fx = x as f32 + 0.5 - center;
                let fy = y as f32 + 0.5 - center;
                let d = (fx * fx + fy * fy).sqrt();
                if d > outer || d < inner {
                    continue;
                }
                let c = if d < inner + 1.5 {
                    (color.0 / 5, color.1 / 5, color.2 / 5)
                } else {
                    color
                };
                img.set(x, y, Rgba::opaque(c.0, c.1, c.2));
            }
        }
        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness_is_max_channel() {
        assert_eq!(Rgba::new(10, 200, 30, 255).brightness(), 200);
        assert_eq!(Rgba::new(90, 20, 91, 0).brightness(), 91);
        assert_eq!(Rgba::new(7, 7, 7, 7).brightness(), 7);
    }

    #[test]
    fn test_pixel_index_is_row_major() {
        let mut img = Image::new(3, 2);
        img.set(1, 0, Rgba::WHITE);
        img.set(0, 1, Rgba::opaque(1, 2, 3));
        assert_eq!(img.pixels()[1], Rgba::WHITE);
        assert_eq!(img.pixels()[3], Rgba::opaque(1, 2, 3));
        assert_eq!(img.get(0, 1), Some(Rgba::opaque(1, 2, 3)));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_pixel_index_does_not_wrap_in_u32() {
        // 70_000 * 70_000 is past u32::MAX
        assert_eq!(pixel_index(70_000, 5, 70_000), 4_900_000_005);
        assert_eq!(pixel_index(u32::MAX, u32::MAX, 1), 2 * u32::MAX as usize);
    }

    #[test]
    fn test_out_of_bounds_access_is_ignored() {
        let mut img = Image::new(3, 2);
        img.set(3, 0, Rgba::WHITE);
        img.set(0, 2, Rgba::WHITE);
        assert_eq!(img.visible_count(), 0);
        assert_eq!(img.get(3, 0), None);
    }

    #[test]
    fn test_generators_have_transparent_corners() {
        for img in [
            Image::blob(32, (200, 180, 40), (20, 20, 20)),
            Image::checker_gem(32, 4, (250, 90, 90), (90, 250, 250)),
            Image::ring(32, 6.0, (120, 220, 120)),
        ] {
            assert_eq!(img.get(0, 0).unwrap().a, 0);
            assert_eq!(img.get(31, 31).unwrap().a, 0);
            assert!(img.visible_count() > 0);
        }
    }
}
