//! Offscreen colour/depth target with CPU readback.
//!
//! Exports render into this target instead of the window surface so the
//! output size is independent of the window. Readback copies through a
//! staging buffer whose rows are padded to wgpu's copy alignment.

use std::sync::mpsc;

use log::debug;
use meshview_core::{Color, RasterImage, RowOrder};

use crate::error::RenderError;
use crate::shader::DEPTH_FORMAT;

/// Colour format of exported images (8 bits per channel, sRGB encoded)
pub const CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

const BYTES_PER_PIXEL: u32 = 4;

/// Row stride of the staging buffer; wgpu requires `COPY_BYTES_PER_ROW_ALIGNMENT` (256 bytes).
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (unpadded + align - 1) / align * align
}

/// Drop the per-row padding from a mapped staging buffer.
pub fn strip_row_padding(mapped: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let row = (width * BYTES_PER_PIXEL) as usize;
    let mut pixels = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * padded_row as usize;
        pixels.extend_from_slice(&mapped[start..start + row]);
    }
    pixels
}

/// Clear value for an export: fully transparent, or the background at full alpha.
pub fn clear_color(background: Color, transparent: bool) -> wgpu::Color {
    if transparent {
        wgpu::Color::TRANSPARENT
    } else {
        wgpu::Color {
            r: background.r as f64,
            g: background.g as f64,
            b: background.b as f64,
            a: 1.0,
        }
    }
}

/// Package tightly packed RGBA readback as an image, dropping alpha for opaque exports.
pub fn finish_image(pixels: Vec<u8>, width: u32, height: u32, transparent: bool) -> RasterImage {
    // wgpu texture copies start at the top row
    let image = RasterImage::from_rgba(width, height, pixels, RowOrder::TopDown);
    if transparent {
        image
    } else {
        image.into_rgb()
    }
}

/// Reject export sizes the device cannot allocate: zero, or beyond `max_dimension` on either axis.
pub fn check_capture_size(width: u32, height: u32, max_dimension: u32) -> Result<(), RenderError> {
    let valid = 1..=max_dimension;
    if valid.contains(&width) && valid.contains(&height) {
        Ok(())
    } else {
        Err(RenderError::Framebuffer(format!(
            "{width}x{height} is outside the supported range 1..={max_dimension}"
        )))
    }
}

/// Owned colour and depth attachments sized to one export resolution.
pub struct OffscreenCapture {
    width: u32,
    height: u32,
    color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    staging: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

impl OffscreenCapture {
    /// Allocate attachments, failing with [`RenderError::Framebuffer`] if the device rejects them.
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self, RenderError> {
        check_capture_size(width, height, device.limits().max_texture_dimension_2d)?;

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let color_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Capture Color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CAPTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Capture Depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let padded_bytes_per_row = padded_bytes_per_row(width);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Staging Buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            return Err(RenderError::Framebuffer(err.to_string()));
        }

        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
        debug!("Allocated {width}x{height} capture target");

        Ok(Self {
            width,
            height,
            color_texture,
            color_view,
            depth_view,
            staging,
            padded_bytes_per_row,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.color_view
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    /// Record the colour-to-staging copy. Submit the encoder before [`Self::read_pixels`].
    pub fn encode_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.color_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Map the staging buffer and return tightly packed RGBA rows, top row first.
    pub fn read_pixels(&self, device: &wgpu::Device) -> Result<Vec<u8>, RenderError> {
        let slice = self.staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| RenderError::Framebuffer("readback was never completed".to_string()))?
            .map_err(|err| RenderError::Framebuffer(format!("failed to map readback: {err}")))?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            strip_row_padding(&mapped, self.width, self.height, self.padded_bytes_per_row)
        };
        self.staging.unmap();
        Ok(pixels)
    }
}
