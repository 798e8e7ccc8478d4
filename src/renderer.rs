// renderer.rs: wgpu draw of the attached sphere + egui overlay
//
// The session attaches a display through `DisplaySlot` (any thread); the
// render thread picks the new binding up on the next frame, builds GPU
// buffers for its mesh, and re-uploads the surface texture whenever the
// surface's generation moves.

use crate::mesh::{Eye, SphereMesh};
use crate::scene::EyePass;
use crate::session::SceneHost;
use crate::surface::SurfaceHandle;
use anyhow::{anyhow, Context};
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use wgpu::util::DeviceExt;
use winit::window::Window;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ViewUniform {
    view_proj: [[f32; 4]; 4],
}

#[derive(Clone)]
struct Binding {
    surface: SurfaceHandle,
    mesh: Arc<SphereMesh>,
}

#[derive(Default)]
struct SlotState {
    binding: Option<Binding>,
    version: u64,
}

/// Where the session attaches its display; read by the render thread.
#[derive(Clone, Default)]
pub struct DisplaySlot {
    state: Arc<Mutex<SlotState>>,
}

impl DisplaySlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop the current display; the draw loop falls back to the clear color.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.binding = None;
        state.version += 1;
    }

    #[cfg(test)]
    pub fn is_bound(&self) -> bool {
        self.lock().binding.is_some()
    }

    fn changed_since(&self, seen: u64) -> Option<(u64, Option<Binding>)> {
        let state = self.lock();
        (state.version != seen).then(|| (state.version, state.binding.clone()))
    }
}

impl SceneHost for DisplaySlot {
    fn create_display(&self, width: u32, height: u32, mesh: Arc<SphereMesh>) -> SurfaceHandle {
        let surface = SurfaceHandle::new(width.max(1), height.max(1));
        let mut state = self.lock();
        state.binding = Some(Binding {
            surface: surface.clone(),
            mesh,
        });
        state.version += 1;
        surface
    }
}

/// Largest size with the same aspect that fits in `max` on both sides.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scale = max as f32 / width.max(height) as f32;
    (
        ((width as f32 * scale) as u32).clamp(1, max),
        ((height as f32 * scale) as u32).clamp(1, max),
    )
}

struct GpuMesh {
    positions: wgpu::Buffer,
    /// `[left/mono, right]`
    tex_coords: [wgpu::Buffer; 2],
    indices: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, mesh: &SphereMesh) -> Self {
        let tex = |eye: Eye, label: &str| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(mesh.tex_coords(eye)),
                usage: wgpu::BufferUsages::VERTEX,
            })
        };
        Self {
            positions: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sphere_positions"),
                contents: bytemuck::cast_slice(&mesh.positions),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            tex_coords: [
                tex(Eye::LeftEye, "sphere_uv_left"),
                tex(Eye::RightEye, "sphere_uv_right"),
            ],
            indices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sphere_indices"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count: mesh.indices.len() as u32,
        }
    }

    fn tex_coords(&self, eye: Eye) -> &wgpu::Buffer {
        match eye {
            Eye::Monocular | Eye::LeftEye => &self.tex_coords[0],
            Eye::RightEye => &self.tex_coords[1],
        }
    }
}

struct BoundDisplay {
    surface: SurfaceHandle,
    mesh: GpuMesh,
    texture: wgpu::Texture,
    texture_size: (u32, u32),
    bind_group: wgpu::BindGroup,
    seen_generation: u64,
}

pub struct Renderer {
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,
    render_pipeline: wgpu::RenderPipeline,

    texture_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    // one uniform per eye pass
    view_buffers: [wgpu::Buffer; 2],
    view_bind_groups: [wgpu::BindGroup; 2],

    slot: DisplaySlot,
    slot_version: u64,
    bound: Option<BoundDisplay>,

    // UI
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Renderer {
    pub async fn new(window: Arc<Window>, slot: DisplaySlot) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window.as_ref()) }
            .context("cannot create a drawing surface for the window")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("no compatible GPU adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    label: None,
                },
                None,
            )
            .await
            .context("cannot open the GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("the surface reports no texture formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        // halves of a stereo frame must not bleed into each other at the seam
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let view_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("view_bind_group_layout"),
            });

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
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
                label: Some("texture_bind_group_layout"),
            });

        let identity = ViewUniform {
            view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
        };
        let view_buffer = |label: &str| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&[identity]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        };
        let view_buffers = [view_buffer("view_buffer_0"), view_buffer("view_buffer_1")];
        let view_bind_group = |buffer: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &view_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
                label: Some("view_bind_group"),
            })
        };
        let view_bind_groups = [
            view_bind_group(&view_buffers[0]),
            view_bind_group(&view_buffers[1]),
        ];

        let shader = device.create_shader_module(wgpu::include_wgsl!("shader_sphere.wgsl"));
        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Sphere Pipeline Layout"),
                bind_group_layouts: &[&view_bind_group_layout, &texture_bind_group_layout],
                push_constant_ranges: &[],
            });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Sphere Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![1 => Float32x2],
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // seen from inside
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let egui_ctx = egui::Context::default();
        crate::fonts::setup_egui_fonts(&egui_ctx);

        let mut egui_state = egui_winit::State::new(window.as_ref());
        egui_state.set_pixels_per_point(window.scale_factor() as f32);

        let egui_renderer = egui_wgpu::Renderer::new(&device, config.format, None, 1);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            render_pipeline,
            texture_bind_group_layout,
            sampler,
            view_buffers,
            view_bind_groups,
            slot,
            slot_version: 0,
            bound: None,
            egui_ctx,
            egui_state,
            egui_renderer,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    fn bind(&self, binding: Binding) -> BoundDisplay {
        let (src_w, src_h) = binding.surface.size();
        let max = self.device.limits().max_texture_dimension_2d;
        let (width, height) = fit_within(src_w, src_h, max);
        if (width, height) != (src_w, src_h) {
            warn!(
                "{}",
                crate::i18n::tr_with(
                    "gpu.image_too_large_scaled",
                    &[
                        ("src_w", src_w.to_string()),
                        ("src_h", src_h.to_string()),
                        ("max", max.to_string()),
                        ("new_w", width.to_string()),
                        ("new_h", height.to_string()),
                    ]
                )
            );
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
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
            label: Some("media_texture"),
            view_formats: &[],
        });
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
            label: Some("media_bind_group"),
        });

        info!(
            "display attached: {}x{} surface, {} vertices",
            src_w,
            src_h,
            binding.mesh.vertex_count()
        );

        BoundDisplay {
            mesh: GpuMesh::upload(&self.device, &binding.mesh),
            surface: binding.surface,
            texture,
            texture_size: (width, height),
            bind_group,
            seen_generation: 0,
        }
    }

    /// Pick up a newly attached display and any new surface frame.
    fn sync_display(&mut self) {
        if let Some((version, binding)) = self.slot.changed_since(self.slot_version) {
            self.slot_version = version;
            self.bound = binding.map(|b| self.bind(b));
        }

        let Some(bound) = self.bound.as_mut() else {
            return;
        };
        let surface = bound.surface.clone();
        let queue = &self.queue;
        let texture = &bound.texture;
        let (width, height) = bound.texture_size;
        let uploaded = surface.read_if_newer(bound.seen_generation, |pixels| {
            let scaled;
            let pixels = if pixels.dimensions() == (width, height) {
                pixels
            } else {
                scaled = image::imageops::resize(
                    pixels,
                    width,
                    height,
                    image::imageops::FilterType::Triangle,
                );
                &scaled
            };
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        });
        if let Some((generation, ())) = uploaded {
            bound.seen_generation = generation;
        }
    }

    pub fn render_with_ui(
        &mut self,
        window: &Window,
        passes: &[EyePass],
        run_ui: impl FnOnce(&egui::Context),
    ) -> Result<(), wgpu::SurfaceError> {
        self.sync_display();

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        for (buffer, pass) in self.view_buffers.iter().zip(passes) {
            let uniform = ViewUniform {
                view_proj: pass.view_projection.to_cols_array_2d(),
            };
            self.queue
                .write_buffer(buffer, 0, bytemuck::cast_slice(&[uniform]));
        }

        // 1. Scene: one draw per eye pass
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sphere Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            if let Some(bound) = &self.bound {
                render_pass.set_pipeline(&self.render_pipeline);
                render_pass.set_bind_group(1, &bound.bind_group, &[]);
                render_pass.set_vertex_buffer(0, bound.mesh.positions.slice(..));
                render_pass
                    .set_index_buffer(bound.mesh.indices.slice(..), wgpu::IndexFormat::Uint32);

                for (bind_group, pass) in self.view_bind_groups.iter().zip(passes) {
                    let vp = pass.viewport;
                    render_pass.set_viewport(vp.x, vp.y, vp.width, vp.height, 0.0, 1.0);
                    render_pass.set_bind_group(0, bind_group, &[]);
                    render_pass.set_vertex_buffer(1, bound.mesh.tex_coords(pass.eye).slice(..));
                    render_pass.draw_indexed(0..bound.mesh.index_count, 0, 0..1);
                }
            }
        }

        // 2. UI
        let raw_input = self.egui_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, run_ui);

        self.egui_state
            .handle_platform_output(window, &self.egui_ctx, full_output.platform_output);
        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes);

        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        for (id, delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, delta);
        }

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &clipped_primitives,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            self.egui_renderer
                .render(&mut render_pass, &clipped_primitives, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
