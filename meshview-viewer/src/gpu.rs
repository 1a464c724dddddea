//! wgpu device acquisition and the optional window surface.

use std::sync::Arc;

use log::{info, warn};
use winit::window::Window;

use crate::error::RenderError;

/// Where the coordinator presents its frames.
#[derive(Debug, Clone)]
pub enum RenderTarget {
    /// Present to a window surface; exports still go through an offscreen target
    Window(Arc<Window>),
    /// No surface at all, only offscreen capture
    Headless,
}

/// Device and queue shared by every render target.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// A configured window surface.
pub struct WindowSurface {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

/// First sRGB format the surface offers.
///
/// Exports are written through an sRGB target; a linear surface shows the
/// preview darker than the exported image, so that case is logged.
pub fn preferred_surface_format(formats: &[wgpu::TextureFormat]) -> wgpu::TextureFormat {
    if let Some(format) = formats.iter().copied().find(|f| f.is_srgb()) {
        return format;
    }
    match formats.first() {
        Some(&format) => {
            warn!("Surface has no sRGB format, using {format:?}; preview colours will not match exports");
            format
        }
        None => wgpu::TextureFormat::Bgra8UnormSrgb,
    }
}

impl GpuContext {
    /// Acquire an adapter and device, creating the window surface first when there is one.
    pub fn initialize(
        target: &RenderTarget,
        width: u32,
        height: u32,
    ) -> Result<(Self, Option<WindowSurface>), RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = match target {
            RenderTarget::Window(window) => Some((
                window.clone(),
                instance.create_surface(window.clone()).map_err(|err| {
                    RenderError::GraphicsInit(format!("failed to create surface: {err}"))
                })?,
            )),
            RenderTarget::Headless => None,
        };

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface.as_ref().map(|(_, s)| s),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::GraphicsInit("no suitable GPU adapter".to_string()))?;

        let adapter_info = adapter.get_info();
        info!(
            "Using adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        // Large meshes are one unindexed vertex buffer, so take the adapter's buffer limit
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::downlevel_defaults().using_resolution(adapter_limits.clone())
        };

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("meshview device"),
                required_features: wgpu::Features::empty(),
                required_limits,
            },
            None,
        ))
        .map_err(|err| RenderError::GraphicsInit(format!("failed to create device: {err}")))?;

        device.on_uncaptured_error(Box::new(|err| {
            warn!("Uncaptured GPU error: {err}");
        }));

        let window_surface = surface.map(|(window, surface)| {
            let caps = surface.get_capabilities(&adapter);
            let format = preferred_surface_format(&caps.formats);
            let alpha_mode = caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto);

            let config = wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format,
                width: width.max(1),
                height: height.max(1),
                present_mode: wgpu::PresentMode::AutoVsync,
                alpha_mode,
                view_formats: vec![],
                desired_maximum_frame_latency: 2,
            };
            surface.configure(&device, &config);
            info!("Window surface {}x{}, format {:?}", config.width, config.height, format);

            WindowSurface {
                window,
                surface,
                config,
            }
        });

        Ok((
            Self {
                instance,
                adapter,
                device,
                queue,
            },
            window_surface,
        ))
    }
}

impl WindowSurface {
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigure for a new size. Zero-sized requests (minimised windows) are ignored.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(device, &self.config);
    }

    pub fn reconfigure(&self, device: &wgpu::Device) {
        self.surface.configure(device, &self.config);
    }
}
