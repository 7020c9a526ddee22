//! Pixel surfaces
//!
//! A [`Surface`] is the offscreen bitmap a page is rendered into and the
//! on-screen target a cached bitmap is copied onto. Pixels are stored as
//! tightly packed RGBA rows.

/// Bytes per RGBA pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Largest pixel buffer a surface allocates (512 MiB)
pub const MAX_SURFACE_BYTES: usize = 512 * 1024 * 1024;

/// RGBA pixel buffer with a visibility flag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    visible: bool,
}

impl Surface {
    /// Create a transparent, hidden surface of the given size
    ///
    /// A size that does not [`fit`](Self::fits) yields an empty 0x0 surface.
    pub fn new(width: u32, height: u32) -> Self {
        let mut surface = Self::default();
        surface.resize(width, height);
        surface
    }

    /// Buffer length for `width` x `height`, if within [`MAX_SURFACE_BYTES`]
    pub fn buffer_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
            .filter(|&len| len <= MAX_SURFACE_BYTES)
    }

    /// Whether a `width` x `height` surface can be allocated
    pub fn fits(width: u32, height: u32) -> bool {
        Self::buffer_len(width, height).is_some()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA pixel data
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable RGBA pixel data
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Size of the pixel buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Resize the surface, clearing its contents
    ///
    /// Like assigning a canvas' dimensions, this always resets every pixel
    /// to transparent, even when the size does not change.
    ///
    /// A size that does not [`fit`](Self::fits) leaves the surface released.
    pub fn resize(&mut self, width: u32, height: u32) {
        let Some(len) = Self::buffer_len(width, height) else {
            log::warn!("refusing to allocate a {width}x{height} surface");
            self.release();
            return;
        };
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(len, 0);
    }

    /// Replace this surface's size and pixels with a copy of `source`
    ///
    /// The visibility flag is left untouched.
    pub fn copy_from(&mut self, source: &Surface) {
        self.width = source.width;
        self.height = source.height;
        self.pixels.clear();
        self.pixels.extend_from_slice(&source.pixels);
    }

    /// Overwrite every pixel with a single colour
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for pixel in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&rgba);
        }
    }

    /// Colour of the pixel at (`x`, `y`), if inside the surface
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.pixels.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Shrink the surface to 0x0 and hand its buffer back to the allocator
    ///
    /// Raster buffers are large, so the memory is returned right away
    /// instead of whenever the owning value happens to be dropped.
    pub fn release(&mut self) {
        self.width = 0;
        self.height = 0;
        self.pixels = Vec::new();
        self.visible = false;
    }

    /// Whether the surface holds no pixels (released or zero-sized)
    pub fn is_released(&self) -> bool {
        self.pixels.is_empty()
    }
}
