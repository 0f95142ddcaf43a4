//! The wgpu reference backend.
//!
//! Implements [`RenderBackend`] over a [`GpuContext`]: inward-facing
//! environment spheres with equirectangular mapping, flat marker planes,
//! per-mesh opacity for crossfades, and alpha-blended presentation.

use std::collections::HashMap;

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::backend::{MeshHandle, RenderBackend, TextureHandle};
use crate::camera::CameraState;
use crate::gpu::GpuContext;
use crate::loader::LoadedImage;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniforms {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ModelUniforms {
    model: [[f32; 4]; 4],
    tint: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

impl Vertex {
    const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };
}

struct MeshEntry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    model_buffer: wgpu::Buffer,
    model_bind_group: wgpu::BindGroup,
    texture: Option<u64>,
    opacity: f32,
    position: Vec3,
    attached: bool,
}

struct TextureEntry {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// [`RenderBackend`] implementation over wgpu.
pub struct WgpuBackend {
    gpu: GpuContext,
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    model_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    meshes: HashMap<u64, MeshEntry>,
    textures: HashMap<u64, TextureEntry>,
    white: TextureEntry,
    draw_order: Vec<u64>,
    next_id: u64,
}

impl WgpuBackend {
    pub fn new(gpu: GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Environment Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/env.wgsl").into()),
        });

        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Bind Group Layout"),
            entries: &[uniform_entry(0)],
        });
        let model_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Model Bind Group Layout"),
            entries: &[uniform_entry(0)],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Uniforms"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        // Equirectangular images wrap horizontally but must clamp at the
        // poles.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Environment Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Environment Pipeline Layout"),
            bind_group_layouts: &[&camera_layout, &model_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Environment Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[Vertex::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // The camera sits inside the sphere.
                cull_mode: None,
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let white = Self::build_texture(
            device,
            &gpu.queue,
            &texture_layout,
            &sampler,
            &[255, 255, 255, 255],
            1,
            1,
            "Default White Texture",
        );

        Self {
            gpu,
            pipeline,
            camera_buffer,
            camera_bind_group,
            model_layout,
            texture_layout,
            sampler,
            meshes: HashMap::new(),
            textures: HashMap::new(),
            white,
            draw_order: Vec::new(),
            next_id: 0,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    #[allow(clippy::too_many_arguments)]
    fn build_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        pixels: &[u8],
        width: u32,
        height: u32,
        label: &str,
    ) -> TextureEntry {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        TextureEntry {
            _texture: texture,
            bind_group,
        }
    }

    fn build_mesh(&mut self, vertices: &[Vertex], indices: &[u32], label: &str) -> MeshHandle {
        let device = &self.gpu.device;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let model_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<ModelUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let model_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.model_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: model_buffer.as_entire_binding(),
            }],
        });

        let id = self.alloc_id();
        self.meshes.insert(
            id,
            MeshEntry {
                vertex_buffer,
                index_buffer,
                index_count: indices.len() as u32,
                model_buffer,
                model_bind_group,
                texture: None,
                opacity: 1.0,
                position: Vec3::ZERO,
                attached: false,
            },
        );
        MeshHandle(id)
    }

    /// Inward-facing UV sphere with equirectangular texture coordinates.
    fn sphere_geometry(radius: f32, segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
                let x = ring_radius * theta.sin();
                let z = ring_radius * theta.cos();

                let position = [x * radius, y * radius, z * radius];
                // Normals face the camera at the center.
                let normal = [-x, -y, -z];
                // Mirror horizontally so the image reads correctly from
                // inside.
                let uv = [1.0 - seg as f32 / segments as f32, ring as f32 / rings as f32];

                vertices.push(Vertex {
                    position,
                    normal,
                    uv,
                });
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;

                indices.push(current);
                indices.push(next);
                indices.push(current + 1);

                indices.push(current + 1);
                indices.push(next);
                indices.push(next + 1);
            }
        }

        (vertices, indices)
    }
}

impl RenderBackend for WgpuBackend {
    fn upload_texture(&mut self, image: &LoadedImage, label: &str) -> TextureHandle {
        let entry = Self::build_texture(
            &self.gpu.device,
            &self.gpu.queue,
            &self.texture_layout,
            &self.sampler,
            &image.pixels,
            image.width,
            image.height,
            label,
        );
        let id = self.alloc_id();
        self.textures.insert(id, entry);
        TextureHandle(id)
    }

    fn create_sphere(&mut self, radius: f32) -> MeshHandle {
        let (vertices, indices) = Self::sphere_geometry(radius, 64, 32);
        self.build_mesh(&vertices, &indices, "Environment Sphere")
    }

    fn create_plane(&mut self, width: f32, height: f32) -> MeshHandle {
        let (w, h) = (width / 2.0, height / 2.0);
        let vertices = [
            Vertex {
                position: [-w, -h, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: [0.0, 1.0],
            },
            Vertex {
                position: [w, -h, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: [1.0, 1.0],
            },
            Vertex {
                position: [w, h, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: [1.0, 0.0],
            },
            Vertex {
                position: [-w, h, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: [0.0, 0.0],
            },
        ];
        let indices = [0u32, 1, 2, 0, 2, 3];
        self.build_mesh(&vertices, &indices, "Overlay Plane")
    }

    fn set_texture(&mut self, mesh: MeshHandle, texture: TextureHandle) {
        if let Some(entry) = self.meshes.get_mut(&mesh.0) {
            entry.texture = Some(texture.0);
        }
    }

    fn set_opacity(&mut self, mesh: MeshHandle, opacity: f32) {
        if let Some(entry) = self.meshes.get_mut(&mesh.0) {
            entry.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    fn set_position(&mut self, mesh: MeshHandle, position: Vec3) {
        if let Some(entry) = self.meshes.get_mut(&mesh.0) {
            entry.position = position;
        }
    }

    fn attach(&mut self, mesh: MeshHandle) {
        if let Some(entry) = self.meshes.get_mut(&mesh.0) {
            if !entry.attached {
                entry.attached = true;
                self.draw_order.push(mesh.0);
            }
        }
    }

    fn detach(&mut self, mesh: MeshHandle) {
        if let Some(entry) = self.meshes.get_mut(&mesh.0) {
            entry.attached = false;
        }
        self.draw_order.retain(|id| *id != mesh.0);
    }

    fn render(&mut self, camera: &CameraState) {
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                log::warn!("failed to acquire surface texture: {}", e);
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let uniforms = CameraUniforms {
            view_proj: (camera.proj * camera.view).to_cols_array_2d(),
        };
        self.gpu
            .queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&uniforms));

        for id in &self.draw_order {
            if let Some(entry) = self.meshes.get(id) {
                let model = ModelUniforms {
                    model: Mat4::from_translation(entry.position).to_cols_array_2d(),
                    tint: [1.0, 1.0, 1.0, entry.opacity],
                };
                self.gpu
                    .queue
                    .write_buffer(&entry.model_buffer, 0, bytemuck::bytes_of(&model));
            }
        }

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Environment Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Environment Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.camera_bind_group, &[]);

            for id in &self.draw_order {
                let Some(entry) = self.meshes.get(id) else {
                    continue;
                };
                let texture_bind_group = entry
                    .texture
                    .and_then(|tex| self.textures.get(&tex))
                    .map(|t| &t.bind_group)
                    .unwrap_or(&self.white.bind_group);

                pass.set_bind_group(1, &entry.model_bind_group, &[]);
                pass.set_bind_group(2, texture_bind_group, &[]);
                pass.set_vertex_buffer(0, entry.vertex_buffer.slice(..));
                pass.set_index_buffer(entry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..entry.index_count, 0, 0..1);
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }

    fn dispose_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn dispose_mesh(&mut self, mesh: MeshHandle) {
        self.draw_order.retain(|id| *id != mesh.0);
        self.meshes.remove(&mesh.0);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }
}
