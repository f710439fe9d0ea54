//! Glyph atlas for the ASCII scene pass.
//!
//! One square tile per ramp symbol, laid out left to right. Tiles come from a
//! font through `fontdue` when one is configured; symbols the font lacks, or
//! every symbol when no font is given, use an ordered-dither tile whose ink
//! coverage follows the symbol's position in the ramp.

use fontdue::{Font, FontSettings};

pub const DEFAULT_CELL_PX: u32 = 64;

#[rustfmt::skip]
const BAYER_8X8: [u8; 64] = [
     0, 32,  8, 40,  2, 34, 10, 42,
    48, 16, 56, 24, 50, 18, 58, 26,
    12, 44,  4, 36, 14, 46,  6, 38,
    60, 28, 52, 20, 62, 30, 54, 22,
     3, 35, 11, 43,  1, 33,  9, 41,
    51, 19, 59, 27, 49, 17, 57, 25,
    15, 47,  7, 39, 13, 45,  5, 37,
    63, 31, 55, 23, 61, 29, 53, 21,
];

#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    #[error("failed to load font: {0}")]
    Font(&'static str),
    #[error("glyph ramp is empty")]
    EmptyRamp,
}

/// RGBA8 atlas; only alpha carries coverage.
#[derive(Clone, Debug)]
pub struct GlyphAtlas {
    cell: u32,
    count: u32,
    pixels: Vec<u8>,
}

impl GlyphAtlas {
    pub fn procedural(ramp: &[char], cell: u32) -> Result<Self, AtlasError> {
        let mut atlas = Self::blank(ramp, cell)?;
        for index in 0..ramp.len() {
            atlas.fill_dither(index);
        }
        Ok(atlas)
    }

    pub fn from_font(font_bytes: &[u8], ramp: &[char], cell: u32) -> Result<Self, AtlasError> {
        let font = Font::from_bytes(font_bytes, FontSettings::default()).map_err(AtlasError::Font)?;
        let mut atlas = Self::blank(ramp, cell)?;
        let px = cell as f32;
        let ascent = font
            .horizontal_line_metrics(px)
            .map(|metrics| metrics.ascent)
            .unwrap_or(px * 0.8);

        for (index, &ch) in ramp.iter().enumerate() {
            if ch == ' ' {
                continue;
            }
            if font.lookup_glyph_index(ch) == 0 {
                tracing::debug!(symbol = %ch, "font lacks glyph; using dither tile");
                atlas.fill_dither(index);
                continue;
            }
            let (metrics, coverage) = font.rasterize(ch, px);
            let left = (cell as i32 - metrics.width as i32) / 2;
            let top = ascent.round() as i32 - (metrics.height as i32 + metrics.ymin);
            for y in 0..metrics.height {
                for x in 0..metrics.width {
                    let tx = left + x as i32;
                    let ty = top + y as i32;
                    if tx < 0 || ty < 0 || tx >= cell as i32 || ty >= cell as i32 {
                        continue;
                    }
                    atlas.set_alpha(index, tx as u32, ty as u32, coverage[y * metrics.width + x]);
                }
            }
        }
        Ok(atlas)
    }

    fn blank(ramp: &[char], cell: u32) -> Result<Self, AtlasError> {
        if ramp.is_empty() {
            return Err(AtlasError::EmptyRamp);
        }
        let cell = cell.max(1);
        let count = ramp.len() as u32;
        Ok(Self {
            cell,
            count,
            pixels: vec![0; (cell * count * cell * 4) as usize],
        })
    }

    fn fill_dither(&mut self, index: usize) {
        let density = 1.0 - index as f32 / (self.count.max(2) - 1) as f32;
        for y in 0..self.cell {
            for x in 0..self.cell {
                let threshold = (BAYER_8X8[((y % 8) * 8 + x % 8) as usize] as f32 + 0.5) / 64.0;
                let alpha = if threshold < density { 255 } else { 0 };
                self.set_alpha(index, x, y, alpha);
            }
        }
    }

    fn set_alpha(&mut self, index: usize, x: u32, y: u32, alpha: u8) {
        let column = index as u32 * self.cell + x;
        let offset = ((y * self.width() + column) * 4) as usize;
        self.pixels[offset..offset + 4].copy_from_slice(&[0, 0, 0, alpha]);
    }

    pub fn width(&self) -> u32 {
        self.cell * self.count
    }

    pub fn height(&self) -> u32 {
        self.cell
    }

    pub fn cell(&self) -> u32 {
        self.cell
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Fraction of inked texels in one tile.
    #[cfg(test)]
    fn coverage(&self, index: usize) -> f32 {
        let mut inked = 0u32;
        for y in 0..self.cell {
            for x in 0..self.cell {
                let column = index as u32 * self.cell + x;
                let offset = ((y * self.width() + column) * 4 + 3) as usize;
                if self.pixels[offset] > 127 {
                    inked += 1;
                }
            }
        }
        inked as f32 / (self.cell * self.cell) as f32
    }
}
