//! CPU-side pixel buffers and PNG encoding.
//!
//! GPU readback and GL-style framebuffers disagree on which row comes first,
//! so every [`RasterImage`] records its [`RowOrder`]. Encoding always writes
//! top row first.

use std::path::Path;

use image::{ColorType, ImageFormat};
use log::debug;

/// Which row of a buffer holds the top of the picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    TopDown,
    BottomUp,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height}x{channels}")]
    BufferSize {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported channel count {0}")]
    Channels(u8),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// 8-bit RGB or RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
    pub row_order: RowOrder,
}

impl RasterImage {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, row_order: RowOrder) -> Self {
        Self {
            width,
            height,
            channels: 4,
            data,
            row_order,
        }
    }

    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Drop the alpha channel. RGB images are returned unchanged.
    pub fn into_rgb(self) -> Self {
        if self.channels != 4 {
            return self;
        }
        let data = self
            .data
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        Self {
            channels: 3,
            data,
            ..self
        }
    }

    /// Reverse the row order in place.
    pub fn flip_vertical(&mut self) {
        let row_len = self.row_len();
        let rows = self.height as usize;
        if row_len == 0 || self.data.len() < row_len * rows {
            return;
        }
        for top in 0..rows / 2 {
            let bottom = rows - 1 - top;
            let (upper, lower) = self.data.split_at_mut(bottom * row_len);
            upper[top * row_len..(top + 1) * row_len].swap_with_slice(&mut lower[..row_len]);
        }
        self.row_order = match self.row_order {
            RowOrder::TopDown => RowOrder::BottomUp,
            RowOrder::BottomUp => RowOrder::TopDown,
        };
    }

    /// Return a copy whose first row is the top of the picture.
    pub fn into_top_down(mut self) -> Self {
        if self.row_order == RowOrder::BottomUp {
            self.flip_vertical();
        }
        self
    }

    /// Pixel at `(x, y)` with `y = 0` at the top of the picture.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = match self.row_order {
            RowOrder::TopDown => y,
            RowOrder::BottomUp => self.height - 1 - y,
        } as usize;
        let channels = self.channels as usize;
        let start = row * self.row_len() + x as usize * channels;
        self.data.get(start..start + channels)
    }

    /// Encode as PNG, top row first.
    pub fn save_png(&self, path: &Path) -> Result<(), EncodeError> {
        let color_type = match self.channels {
            3 => ColorType::Rgb8,
            4 => ColorType::Rgba8,
            other => return Err(EncodeError::Channels(other)),
        };

        let expected = self.row_len() * self.height as usize;
        if self.data.len() != expected {
            return Err(EncodeError::BufferSize {
                width: self.width,
                height: self.height,
                channels: self.channels,
                expected,
                actual: self.data.len(),
            });
        }

        let image = self.clone().into_top_down();
        image::save_buffer_with_format(
            path,
            &image.data,
            image.width,
            image.height,
            color_type,
            ImageFormat::Png,
        )?;
        debug!("Wrote {}x{} PNG to {}", self.width, self.height, path.display());
        Ok(())
    }
}
