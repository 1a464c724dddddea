//! Mesh shader program and its uniform block.
//!
//! The program is one WGSL module with a single uniform block. Uniforms are
//! addressed by name on the CPU mirror ([`SceneUniforms`]) and uploaded to the
//! GPU as one buffer write, so every render target sees the same values.

use std::borrow::Cow;
use std::mem;

use log::debug;
use meshview_core::Mesh;
use nalgebra::Matrix4;
use wgpu::util::DeviceExt;

/// WGSL source for the Phong mesh program
pub const MESH_SHADER: &str = include_str!("shaders/mesh.wgsl");

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

pub const AMBIENT_STRENGTH: f32 = 0.3;
pub const SPECULAR_STRENGTH: f32 = 0.5;
pub const SHININESS: f32 = 32.0;

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("shader compilation failed: {0}")]
    Compile(String),

    #[error("pipeline creation failed for {format:?}: {message}")]
    Pipeline {
        format: wgpu::TextureFormat,
        message: String,
    },

    #[error("unknown uniform `{0}`")]
    UnknownUniform(String),
}

/// GPU vertex format: position and normal, both `vec3<f32>`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl GpuVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<GpuVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }

    /// Flatten a mesh into draw order, three vertices per triangle.
    pub fn from_mesh(mesh: &Mesh) -> Vec<GpuVertex> {
        mesh.vertices()
            .map(|v| GpuVertex {
                position: v.position.coords.into(),
                normal: v.normal.into(),
            })
            .collect()
    }
}

/// CPU mirror of the WGSL `Scene` uniform block.
///
/// `vec3` members occupy 16 bytes in WGSL uniform layout, so they are stored
/// as `[f32; 4]` with an unused last lane.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniforms {
    model: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    light_pos: [f32; 4],
    view_pos: [f32; 4],
    object_color: [f32; 4],
    light_color: [f32; 4],
    lighting: [f32; 4],
}

impl Default for SceneUniforms {
    fn default() -> Self {
        let identity: [[f32; 4]; 4] = Matrix4::<f32>::identity().into();
        Self {
            model: identity,
            view: identity,
            projection: identity,
            light_pos: [0.0; 4],
            view_pos: [0.0; 4],
            object_color: [1.0, 1.0, 1.0, 0.0],
            light_color: [1.0, 1.0, 1.0, 0.0],
            lighting: [AMBIENT_STRENGTH, SPECULAR_STRENGTH, SHININESS, 0.0],
        }
    }
}

impl SceneUniforms {
    pub fn set_mat4(&mut self, name: &str, value: &Matrix4<f32>) -> Result<(), ShaderError> {
        let slot = match name {
            "model" => &mut self.model,
            "view" => &mut self.view,
            "projection" => &mut self.projection,
            _ => return Err(ShaderError::UnknownUniform(name.to_string())),
        };
        *slot = (*value).into();
        Ok(())
    }

    pub fn set_vec3(&mut self, name: &str, value: [f32; 3]) -> Result<(), ShaderError> {
        let slot = match name {
            "light_pos" => &mut self.light_pos,
            "view_pos" => &mut self.view_pos,
            "object_color" => &mut self.object_color,
            "light_color" => &mut self.light_color,
            _ => return Err(ShaderError::UnknownUniform(name.to_string())),
        };
        *slot = [value[0], value[1], value[2], 0.0];
        Ok(())
    }

    pub fn set_f32(&mut self, name: &str, value: f32) -> Result<(), ShaderError> {
        let lane = match name {
            "ambient_strength" => 0,
            "specular_strength" => 1,
            "shininess" => 2,
            _ => return Err(ShaderError::UnknownUniform(name.to_string())),
        };
        self.lighting[lane] = value;
        Ok(())
    }

    pub fn mat4(&self, name: &str) -> Option<Matrix4<f32>> {
        let columns = match name {
            "model" => self.model,
            "view" => self.view,
            "projection" => self.projection,
            _ => return None,
        };
        Some(columns.into())
    }

    pub fn vec3(&self, name: &str) -> Option<[f32; 3]> {
        let v = match name {
            "light_pos" => self.light_pos,
            "view_pos" => self.view_pos,
            "object_color" => self.object_color,
            "light_color" => self.light_color,
            _ => return None,
        };
        Some([v[0], v[1], v[2]])
    }
}

/// Compiled mesh program with its uniform buffer and per-format pipelines.
pub struct ShaderProgram {
    module: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    uniforms: SceneUniforms,
    // Surface and offscreen targets may differ in colour format
    pipelines: Vec<(wgpu::TextureFormat, wgpu::RenderPipeline)>,
}

impl ShaderProgram {
    /// Compile WGSL source, returning the validator's message on failure.
    pub fn compile(device: &wgpu::Device, source: &str) -> Result<Self, ShaderError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::Compile(err.to_string()));
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let uniforms = SceneUniforms::default();
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Uniform Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        debug!("Compiled mesh shader");
        Ok(Self {
            module,
            pipeline_layout,
            uniform_buffer,
            bind_group,
            uniforms,
            pipelines: Vec::new(),
        })
    }

    /// Replace the CPU mirror; takes effect on the next [`Self::upload`].
    pub fn set_uniforms(&mut self, uniforms: SceneUniforms) {
        self.uniforms = uniforms;
    }

    /// Write the CPU mirror to the uniform buffer.
    pub fn upload(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn pipeline(&self, format: wgpu::TextureFormat) -> Option<&wgpu::RenderPipeline> {
        self.pipelines
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, pipeline)| pipeline)
    }

    /// Build the pipeline for a colour format unless it already exists.
    pub fn prepare_pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> Result<(), ShaderError> {
        if self.pipeline(format).is_some() {
            return Ok(());
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mesh Pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.module,
                entry_point: "vs_main",
                buffers: &[GpuVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // STL winding is not trusted
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::Pipeline {
                format,
                message: err.to_string(),
            });
        }

        debug!("Created mesh pipeline for {:?}", format);
        self.pipelines.push((format, pipeline));
        Ok(())
    }
}
