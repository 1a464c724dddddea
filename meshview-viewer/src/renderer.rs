//! Render coordinator: owns the mesh, the camera and every GPU resource.
//!
//! Preview frames and exports share one uniform assembly function
//! ([`scene_uniforms`]) and one shader program, so an export reproduces the
//! preview for the same camera and colours. Only the colour target differs.

use std::iter;
use std::mem;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use meshview_core::{Color, Mesh, OrbitCamera, ProjectionMode, RasterImage, Transform};
use nalgebra::{Matrix4, Vector3};
use wgpu::util::DeviceExt;

use crate::capture::{clear_color, finish_image, OffscreenCapture, CAPTURE_FORMAT};
use crate::config::CameraConfig;
use crate::error::RenderError;
use crate::gpu::{GpuContext, RenderTarget, WindowSurface};
use crate::shader::{
    GpuVertex, SceneUniforms, ShaderError, ShaderProgram, AMBIENT_STRENGTH, DEPTH_FORMAT,
    MESH_SHADER, SHININESS, SPECULAR_STRENGTH,
};

/// Side length of the cube drawn when no mesh is loaded
pub const PLACEHOLDER_CUBE_SIZE: f32 = 0.7;

/// Target rectangle in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whole target of the given size.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Remap GL clip-space depth (-1..1) from nalgebra's projections to wgpu's 0..1.
pub fn opengl_to_wgpu() -> Matrix4<f32> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.5, 0.5, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Assemble every uniform for one draw.
///
/// The mesh is already centred, so its model matrix is just the uniform scale;
/// the placeholder cube is drawn as-is. The light sits one unit above the eye.
pub fn scene_uniforms(
    camera: &OrbitCamera,
    mesh: Option<&Mesh>,
    aspect: f32,
    model_color: Color,
) -> Result<SceneUniforms, ShaderError> {
    let model = match mesh {
        Some(mesh) => Transform::scale_matrix(mesh.scale, mesh.scale, mesh.scale),
        None => Matrix4::identity(),
    };
    let projection = opengl_to_wgpu() * camera.projection_matrix(aspect);
    let eye = camera.position();
    let light = eye + Vector3::new(0.0, 1.0, 0.0);

    let mut uniforms = SceneUniforms::default();
    uniforms.set_mat4("model", &model)?;
    uniforms.set_mat4("view", &camera.view_matrix())?;
    uniforms.set_mat4("projection", &projection)?;
    uniforms.set_vec3("light_pos", light.coords.into())?;
    uniforms.set_vec3("view_pos", eye.coords.into())?;
    uniforms.set_vec3("object_color", model_color.to_array())?;
    uniforms.set_vec3("light_color", [1.0, 1.0, 1.0])?;
    uniforms.set_f32("ambient_strength", AMBIENT_STRENGTH)?;
    uniforms.set_f32("specular_strength", SPECULAR_STRENGTH)?;
    uniforms.set_f32("shininess", SHININESS)?;
    Ok(uniforms)
}

/// Operations the controller and batch exporter need from a renderer.
pub trait SceneRenderer {
    fn camera(&self) -> &OrbitCamera;
    fn camera_mut(&mut self) -> &mut OrbitCamera;
    fn has_mesh(&self) -> bool;
    /// File the current mesh was loaded from, if any
    fn mesh_source(&self) -> Option<&Path>;
    fn load_mesh(&mut self, path: &Path) -> Result<(), RenderError>;
    fn center_camera_on_mesh(&mut self);
    fn set_output_size(&mut self, width: u32, height: u32);
    fn render_to_file(&mut self, path: &Path, transparent: bool) -> Result<(), RenderError>;

    fn set_camera_orbit(&mut self, yaw: f32, pitch: f32, distance: f32) {
        self.camera_mut().set_orbit(yaw, pitch, distance);
    }

    /// Apply the stored orbit and projection, or frame the mesh when configured to.
    fn apply_camera_config(&mut self, config: &CameraConfig) {
        self.camera_mut().projection.mode = if config.orthographic {
            ProjectionMode::Orthographic
        } else {
            ProjectionMode::Perspective
        };
        if config.frame_on_load && self.has_mesh() {
            self.center_camera_on_mesh();
        } else {
            self.set_camera_orbit(config.yaw, config.pitch, config.distance);
        }
    }
}

/// Byte size and draw count of a vertex buffer holding `vertex_count` vertices.
///
/// Fails when the buffer would exceed `max_buffer_size` or the count does not
/// fit a draw call. wgpu aborts on oversized mapped-at-creation buffers, so
/// this runs before any upload.
pub fn vertex_buffer_size(vertex_count: usize, max_buffer_size: u64) -> Result<(u64, u32), RenderError> {
    let too_large = || RenderError::MeshTooLarge {
        vertices: vertex_count,
        max_bytes: max_buffer_size,
    };
    let draw_count = u32::try_from(vertex_count).map_err(|_| too_large())?;
    let bytes = u64::try_from(vertex_count)
        .ok()
        .and_then(|count| count.checked_mul(mem::size_of::<GpuVertex>() as u64))
        .filter(|&bytes| bytes <= max_buffer_size)
        .ok_or_else(too_large)?;
    Ok((bytes, draw_count))
}

/// Vertex buffer for one unindexed triangle list.
struct GpuGeometry {
    buffer: wgpu::Buffer,
    vertex_count: u32,
}

impl GpuGeometry {
    fn upload(device: &wgpu::Device, label: &str, vertices: &[GpuVertex]) -> Result<Self, RenderError> {
        let (bytes, vertex_count) = vertex_buffer_size(vertices.len(), device.limits().max_buffer_size)?;
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        debug!("Uploaded {label}: {vertex_count} vertices, {bytes} bytes");
        Ok(Self {
            buffer,
            vertex_count,
        })
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Surface Depth"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Record one clear-and-draw pass.
///
/// wgpu clears whole attachments, so the clear ignores the viewport; only the
/// draw is confined to it.
#[allow(clippy::too_many_arguments)]
fn encode_draw(
    encoder: &mut wgpu::CommandEncoder,
    program: &ShaderProgram,
    geometry: &GpuGeometry,
    format: wgpu::TextureFormat,
    color_view: &wgpu::TextureView,
    depth_view: &wgpu::TextureView,
    clear: wgpu::Color,
    viewport: Viewport,
) -> Result<(), ShaderError> {
    let pipeline = program.pipeline(format).ok_or_else(|| ShaderError::Pipeline {
        format,
        message: "pipeline was not prepared".to_string(),
    })?;

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Mesh Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(clear),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    pass.set_viewport(
        viewport.x,
        viewport.y,
        viewport.width,
        viewport.height,
        0.0,
        1.0,
    );
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, program.bind_group(), &[]);
    pass.set_vertex_buffer(0, geometry.buffer.slice(..));
    pass.draw(0..geometry.vertex_count, 0..1);
    Ok(())
}

/// Owns the GPU device, the shader program, the mesh and the camera.
pub struct RenderCoordinator {
    gpu: GpuContext,
    surface: Option<WindowSurface>,
    surface_depth: Option<wgpu::TextureView>,
    program: ShaderProgram,
    camera: OrbitCamera,
    mesh: Option<Mesh>,
    mesh_source: Option<PathBuf>,
    mesh_geometry: Option<GpuGeometry>,
    placeholder: GpuGeometry,
    capture: Option<OffscreenCapture>,
    background: Color,
    model_color: Color,
    output_size: (u32, u32),
}

impl RenderCoordinator {
    /// Acquire the GPU and build every resource needed to draw.
    ///
    /// `width` and `height` size the window surface and the default export.
    pub fn initialize(width: u32, height: u32, target: RenderTarget) -> Result<Self, RenderError> {
        let (gpu, surface) = GpuContext::initialize(&target, width, height)?;

        let mut program = ShaderProgram::compile(&gpu.device, MESH_SHADER)?;
        program.prepare_pipeline(&gpu.device, CAPTURE_FORMAT)?;

        let surface_depth = match &surface {
            Some(surface) => {
                program.prepare_pipeline(&gpu.device, surface.format())?;
                let (w, h) = surface.size();
                Some(create_depth_view(&gpu.device, w, h))
            }
            None => None,
        };

        let placeholder = GpuGeometry::upload(
            &gpu.device,
            "Placeholder Cube",
            &GpuVertex::from_mesh(&Mesh::cube(PLACEHOLDER_CUBE_SIZE)),
        )?;

        info!(
            "Renderer ready ({}, {}x{})",
            if surface.is_some() { "windowed" } else { "headless" },
            width,
            height
        );

        Ok(Self {
            gpu,
            surface,
            surface_depth,
            program,
            camera: OrbitCamera::new(),
            mesh: None,
            mesh_source: None,
            mesh_geometry: None,
            placeholder,
            capture: None,
            background: Color::new(0.2, 0.3, 0.3),
            model_color: Color::new(1.0, 0.5, 0.2),
            output_size: (width.max(1), height.max(1)),
        })
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    /// Replace the current mesh and upload its vertices.
    ///
    /// A mesh too large for one vertex buffer is rejected and the current mesh is kept.
    pub fn set_mesh(&mut self, mesh: Mesh) -> Result<(), RenderError> {
        let vertices = GpuVertex::from_mesh(&mesh);
        let geometry = GpuGeometry::upload(&self.gpu.device, "Mesh Vertices", &vertices)?;
        info!("Uploaded mesh with {} vertices", vertices.len());
        self.mesh_geometry = Some(geometry);
        self.mesh = Some(mesh);
        self.mesh_source = None;
        Ok(())
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.background = color;
    }

    pub fn set_model_color(&mut self, color: Color) {
        self.model_color = color;
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    /// Resize the window surface and its depth buffer.
    pub fn resize(&mut self, width: u32, height: u32) {
        let Some(surface) = &mut self.surface else {
            return;
        };
        if width == 0 || height == 0 {
            debug!("Ignoring zero-sized resize");
            return;
        }
        surface.resize(&self.gpu.device, width, height);
        self.surface_depth = Some(create_depth_view(&self.gpu.device, width, height));
    }

    fn active_geometry(&self) -> &GpuGeometry {
        self.mesh_geometry.as_ref().unwrap_or(&self.placeholder)
    }

    fn prepare_uniforms(&mut self, viewport: Viewport) -> Result<(), ShaderError> {
        let uniforms = scene_uniforms(
            &self.camera,
            self.mesh.as_ref(),
            viewport.aspect(),
            self.model_color,
        )?;
        self.program.set_uniforms(uniforms);
        self.program.upload(&self.gpu.queue);
        Ok(())
    }

    /// Draw one frame into `viewport` of the window surface and present it.
    ///
    /// GPU validation errors during the draw are logged and the frame is still presented.
    pub fn render_frame(&mut self, viewport: Viewport) -> Result<(), RenderError> {
        if self.surface.is_none() || viewport.is_empty() {
            return Ok(());
        }
        self.prepare_uniforms(viewport)?;

        let (Some(surface), Some(depth_view)) = (&self.surface, &self.surface_depth) else {
            return Ok(());
        };
        let frame = match surface.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("Surface lost or outdated, reconfiguring");
                surface.reconfigure(&self.gpu.device);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("Timed out waiting for a surface frame");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        let drawn = encode_draw(
            &mut encoder,
            &self.program,
            self.active_geometry(),
            surface.format(),
            &view,
            depth_view,
            clear_color(self.background, false),
            viewport,
        );
        if drawn.is_ok() {
            self.gpu.queue.submit(iter::once(encoder.finish()));
        }
        let scope = pollster::block_on(self.gpu.device.pop_error_scope());
        drawn?;
        if let Some(err) = scope {
            warn!("GPU error while drawing frame: {err}");
        }

        frame.present();
        Ok(())
    }

    /// Render the current view offscreen at the output size and read it back.
    pub fn render_to_image(&mut self, transparent: bool) -> Result<RasterImage, RenderError> {
        let (width, height) = self.output_size;
        let capture = match self.capture.take() {
            Some(capture) if capture.size() == (width, height) => capture,
            _ => OffscreenCapture::new(&self.gpu.device, width, height)?,
        };

        let viewport = Viewport::full(width, height);
        let result = self
            .prepare_uniforms(viewport)
            .map_err(RenderError::from)
            .and_then(|()| self.draw_offscreen(&capture, viewport, transparent));
        self.capture = Some(capture);

        let pixels = result?;
        Ok(finish_image(pixels, width, height, transparent))
    }

    fn draw_offscreen(
        &self,
        capture: &OffscreenCapture,
        viewport: Viewport,
        transparent: bool,
    ) -> Result<Vec<u8>, RenderError> {
        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Encoder"),
            });
        let drawn = encode_draw(
            &mut encoder,
            &self.program,
            self.active_geometry(),
            CAPTURE_FORMAT,
            capture.color_view(),
            capture.depth_view(),
            clear_color(self.background, transparent),
            viewport,
        );
        if drawn.is_ok() {
            capture.encode_readback(&mut encoder);
            self.gpu.queue.submit(iter::once(encoder.finish()));
        }
        let scope = pollster::block_on(self.gpu.device.pop_error_scope());
        drawn?;
        if let Some(err) = scope {
            warn!("GPU error while drawing export: {err}");
        }

        capture.read_pixels(&self.gpu.device)
    }
}

impl SceneRenderer for RenderCoordinator {
    fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    fn has_mesh(&self) -> bool {
        self.mesh.is_some()
    }

    fn mesh_source(&self) -> Option<&Path> {
        self.mesh_source.as_deref()
    }

    /// Load, normalize and upload an STL file. The current mesh is kept on failure.
    fn load_mesh(&mut self, path: &Path) -> Result<(), RenderError> {
        let mesh = meshview_core::load_mesh(path)?;
        self.set_mesh(mesh)?;
        self.mesh_source = Some(path.to_path_buf());
        Ok(())
    }

    fn center_camera_on_mesh(&mut self) {
        if let Some(mesh) = &self.mesh {
            self.camera.frame_mesh(mesh);
            debug!(
                "Framed mesh: distance {}, target {:?}",
                self.camera.distance(),
                self.camera.target().coords
            );
        }
    }

    fn set_output_size(&mut self, width: u32, height: u32) {
        self.output_size = (width, height);
    }

    fn render_to_file(&mut self, path: &Path, transparent: bool) -> Result<(), RenderError> {
        let image = self.render_to_image(transparent)?;
        image.save_png(path).map_err(|source| RenderError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "Exported {}x{} render to {}",
            image.width,
            image.height,
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_viewport_aspect() {
        assert_eq!(Viewport::full(1024, 512).aspect(), 2.0);
        assert_eq!(Viewport::new(10.0, 20.0, 300.0, 0.0).aspect(), 1.0);
        assert!(Viewport::full(0, 10).is_empty());
    }

    #[test]
    fn test_depth_correction_maps_to_unit_range() {
        let camera = OrbitCamera::new();
        let clip = opengl_to_wgpu() * camera.projection_matrix(1.0);
        let near = clip.transform_point(&Point3::new(0.0, 0.0, -camera.projection.near));
        let far = clip.transform_point(&Point3::new(0.0, 0.0, -camera.projection.far));
        assert_relative_eq!(near.z, 0.0, epsilon = 1e-4);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_placeholder_uses_identity_model() {
        let camera = OrbitCamera::new();
        let uniforms = scene_uniforms(&camera, None, 1.0, Color::new(1.0, 0.5, 0.2)).unwrap();
        assert_eq!(uniforms.mat4("model"), Some(Matrix4::identity()));
        assert_eq!(uniforms.vec3("object_color"), Some([1.0, 0.5, 0.2]));
        assert_eq!(uniforms.vec3("light_color"), Some([1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_mesh_model_applies_scale() {
        let mut mesh = Mesh::cube(4.0);
        mesh.fit_scale();
        let uniforms = scene_uniforms(&OrbitCamera::new(), Some(&mesh), 1.0, Color::default()).unwrap();
        let model = uniforms.mat4("model").unwrap();
        assert_relative_eq!(
            model.transform_point(&Point3::new(2.0, -2.0, 2.0)),
            Point3::new(0.5, -0.5, 0.5),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_light_sits_above_eye() {
        let mut camera = OrbitCamera::new();
        camera.set_orbit(0.8, 0.5, 3.0);
        let uniforms = scene_uniforms(&camera, None, 1.0, Color::default()).unwrap();

        let eye: [f32; 3] = camera.position().coords.into();
        assert_eq!(uniforms.vec3("view_pos"), Some(eye));
        let light = uniforms.vec3("light_pos").unwrap();
        assert_eq!([light[0], light[2]], [eye[0], eye[2]]);
        assert_relative_eq!(light[1], eye[1] + 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lighting_constants_uploaded() {
        let uniforms = scene_uniforms(&OrbitCamera::new(), None, 1.0, Color::default()).unwrap();
        assert_eq!(uniforms, {
            let mut expected = uniforms;
            expected.set_f32("ambient_strength", 0.3).unwrap();
            expected.set_f32("specular_strength", 0.5).unwrap();
            expected.set_f32("shininess", 32.0).unwrap();
            expected
        });
    }

    #[test]
    fn test_vertex_buffer_size_within_limit() {
        assert_eq!(vertex_buffer_size(36, 256 << 20).unwrap(), (864, 36));
        // Exactly at the limit still fits
        assert_eq!(vertex_buffer_size(10, 240).unwrap(), (240, 10));
    }

    #[test]
    fn test_vertex_buffer_size_rejects_large_meshes() {
        assert!(matches!(
            vertex_buffer_size(11, 240),
            Err(RenderError::MeshTooLarge { vertices: 11, max_bytes: 240 })
        ));

        // 3.8M triangles against the 256 MiB downlevel default
        let vertices = 3_800_000 * 3;
        assert!(vertex_buffer_size(vertices, 256 << 20).is_err());
        assert!(vertex_buffer_size(vertices, u64::MAX).is_ok());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_vertex_count_must_fit_a_draw_call() {
        let too_many = u32::MAX as usize + 1;
        assert!(matches!(
            vertex_buffer_size(too_many, u64::MAX),
            Err(RenderError::MeshTooLarge { .. })
        ));
    }

    #[test]
    fn test_same_inputs_give_same_uniforms() {
        // Preview and export assemble uniforms identically for the same aspect
        let mut camera = OrbitCamera::new();
        camera.set_orbit(-0.4, 0.9, 6.0);
        let mesh = Mesh::cube(2.0);
        let preview = scene_uniforms(&camera, Some(&mesh), 1.0, Color::default()).unwrap();
        let export = scene_uniforms(&camera.clone(), Some(&mesh), 1.0, Color::default()).unwrap();
        assert_eq!(preview, export);

        let wide = scene_uniforms(&camera, Some(&mesh), 2.0, Color::default()).unwrap();
        assert_ne!(preview.mat4("projection"), wide.mat4("projection"));
        assert_eq!(preview.mat4("view"), wide.mat4("view"));
    }
}
