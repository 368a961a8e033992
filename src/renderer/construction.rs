use super::*;

use crate::framebuffer::{validate_sample_count, DEPTH_FORMAT, ID_FORMAT};
use crate::vertex::{CircleVertex, FlatVertex, TexturedVertex};

impl SceneRenderer {
    /// Wraps an existing device and queue. `format` is the color format of
    /// every scene's display image; pick something presentable if frames
    /// will be blitted to a surface.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene uniform"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene texture"),
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
        // The outline shader reads the integer id image with textureLoad, so
        // no sampler entry.
        let outline_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("outline input"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Uint,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("scene texture"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let default_texture_bind_group =
            create_white_texture_bind_group(&device, &queue, &texture_layout, &sampler);

        let pipelines = Pipelines::new(
            &device,
            format,
            &uniform_layout,
            &texture_layout,
            &outline_layout,
        );

        Self {
            device,
            queue,
            format,
            scenes: HashMap::default(),
            next_scene_id: 1,
            binding: SceneBindingStack::new(),
            entities: EntityAllocator::new(),
            pipelines,
            uniform_layout,
            texture_layout,
            outline_layout,
            default_texture_bind_group,
            sampler,
            default_sample_count: 4,
        }
    }

    /// Creates a renderer on its own headless device. Fails if no adapter is
    /// available, which is normal on machines without a GPU or software
    /// rasterizer.
    pub async fn new_headless() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterUnavailable)?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("headless renderer"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;
        Ok(Self::new(device, queue, wgpu::TextureFormat::Rgba8Unorm))
    }

    /// Like [`new_headless`](Self::new_headless), but logs and returns `None`
    /// when no GPU is available so tests can skip instead of failing.
    pub async fn try_new_headless() -> Option<Self> {
        match Self::new_headless().await {
            Ok(renderer) => Some(renderer),
            Err(error) => {
                log::warn!("headless renderer unavailable: {error}");
                None
            }
        }
    }

    pub fn default_sample_count(&self) -> u32 {
        self.default_sample_count
    }

    /// Uploads tightly packed RGBA8 pixels as a texture the bound scene's
    /// textured primitives can sample.
    pub fn create_texture_rgba8(&self, pixels: &[u8], width: u32, height: u32) -> wgpu::BindGroup {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("scene texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene texture"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    /// Points the bound scene's textured primitives at a texture previously
    /// created with [`create_texture_rgba8`](Self::create_texture_rgba8).
    pub fn set_scene_texture(&mut self, bind_group: wgpu::BindGroup) -> Result<(), RenderError> {
        self.bound_scene_mut()?.set_texture_bind_group(bind_group);
        Ok(())
    }
}

fn create_white_texture_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("default white"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[0xff, 0xff, 0xff, 0xff],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("default white"),
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
    })
}

/// Pipelines drawing into the display image, specialized per sample count.
/// Pipeline handles are reference-counted, so cloning the set is cheap.
#[derive(Clone)]
pub(crate) struct DisplaySet {
    pub grid: wgpu::RenderPipeline,
    pub lines: wgpu::RenderPipeline,
    pub triangles: wgpu::RenderPipeline,
    pub textured: wgpu::RenderPipeline,
    pub circles: wgpu::RenderPipeline,
}

/// Pipelines drawing entity ids. Always single-sample: integer attachments
/// cannot be multisampled.
pub(crate) struct IdSet {
    pub lines: wgpu::RenderPipeline,
    pub triangles: wgpu::RenderPipeline,
    pub textured: wgpu::RenderPipeline,
    pub circles: wgpu::RenderPipeline,
}

pub(crate) struct Pipelines {
    flat_shader: wgpu::ShaderModule,
    textured_shader: wgpu::ShaderModule,
    circle_shader: wgpu::ShaderModule,
    grid_shader: wgpu::ShaderModule,

    flat_layout: wgpu::PipelineLayout,
    textured_layout: wgpu::PipelineLayout,

    format: wgpu::TextureFormat,

    /// Display sets are built on first use; the only keys are 1 and 4.
    display: HashMap<u32, DisplaySet>,
    pub id_set: IdSet,
    pub outline: wgpu::RenderPipeline,
}

impl Pipelines {
    fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        uniform_layout: &wgpu::BindGroupLayout,
        texture_layout: &wgpu::BindGroupLayout,
        outline_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let flat_shader = shader(device, "flat", include_str!("../shaders/flat.wgsl"));
        let textured_shader = shader(device, "textured", include_str!("../shaders/textured.wgsl"));
        let circle_shader = shader(device, "circle", include_str!("../shaders/circle.wgsl"));
        let grid_shader = shader(device, "grid", include_str!("../shaders/grid.wgsl"));
        let outline_shader = shader(device, "outline", include_str!("../shaders/outline.wgsl"));

        let flat_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("flat"),
            bind_group_layouts: &[uniform_layout],
            push_constant_ranges: &[],
        });
        let textured_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("textured"),
            bind_group_layouts: &[uniform_layout, texture_layout],
            push_constant_ranges: &[],
        });
        let outline_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("outline"),
                bind_group_layouts: &[uniform_layout, outline_layout],
                push_constant_ranges: &[],
            });

        let id_set = IdSet {
            lines: geometry_pipeline(
                device,
                "lines id",
                &flat_layout,
                &flat_shader,
                FlatVertex::layout(),
                wgpu::PrimitiveTopology::LineList,
                IdTarget::EntityId,
                1,
            ),
            triangles: geometry_pipeline(
                device,
                "triangles id",
                &flat_layout,
                &flat_shader,
                FlatVertex::layout(),
                wgpu::PrimitiveTopology::TriangleList,
                IdTarget::EntityId,
                1,
            ),
            textured: geometry_pipeline(
                device,
                "textured id",
                &textured_layout,
                &textured_shader,
                TexturedVertex::layout(),
                wgpu::PrimitiveTopology::TriangleList,
                IdTarget::EntityId,
                1,
            ),
            circles: geometry_pipeline(
                device,
                "circles id",
                &flat_layout,
                &circle_shader,
                CircleVertex::layout(),
                wgpu::PrimitiveTopology::TriangleList,
                IdTarget::EntityId,
                1,
            ),
        };

        let outline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("outline"),
            layout: Some(&outline_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &outline_shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &outline_shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            flat_shader,
            textured_shader,
            circle_shader,
            grid_shader,
            flat_layout,
            textured_layout,
            format,
            display: HashMap::default(),
            id_set,
            outline,
        }
    }

    /// The display pipelines for a sample count, building them on first use.
    pub(crate) fn display_set(&mut self, device: &wgpu::Device, sample_count: u32) -> DisplaySet {
        let sample_count = validate_sample_count(sample_count);
        let Self {
            display,
            flat_shader,
            textured_shader,
            circle_shader,
            grid_shader,
            flat_layout,
            textured_layout,
            format,
            ..
        } = self;
        display
            .entry(sample_count)
            .or_insert_with(|| {
                build_display_set(
                    device,
                    *format,
                    flat_layout,
                    textured_layout,
                    flat_shader,
                    textured_shader,
                    circle_shader,
                    grid_shader,
                    sample_count,
                )
            })
            .clone()
    }
}

#[allow(clippy::too_many_arguments)]
fn build_display_set(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    flat_layout: &wgpu::PipelineLayout,
    textured_layout: &wgpu::PipelineLayout,
    flat_shader: &wgpu::ShaderModule,
    textured_shader: &wgpu::ShaderModule,
    circle_shader: &wgpu::ShaderModule,
    grid_shader: &wgpu::ShaderModule,
    sample_count: u32,
) -> DisplaySet {
    DisplaySet {
        grid: device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("grid"),
            layout: Some(flat_layout),
            vertex: wgpu::VertexState {
                module: grid_shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: grid_shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            // The grid never occludes geometry.
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: sample_count,
                ..Default::default()
            },
            multiview: None,
            cache: None,
        }),
        lines: geometry_pipeline(
            device,
            "lines",
            flat_layout,
            flat_shader,
            FlatVertex::layout(),
            wgpu::PrimitiveTopology::LineList,
            IdTarget::Color(format),
            sample_count,
        ),
        triangles: geometry_pipeline(
            device,
            "triangles",
            flat_layout,
            flat_shader,
            FlatVertex::layout(),
            wgpu::PrimitiveTopology::TriangleList,
            IdTarget::Color(format),
            sample_count,
        ),
        textured: geometry_pipeline(
            device,
            "textured",
            textured_layout,
            textured_shader,
            TexturedVertex::layout(),
            wgpu::PrimitiveTopology::TriangleList,
            IdTarget::Color(format),
            sample_count,
        ),
        circles: geometry_pipeline(
            device,
            "circles",
            flat_layout,
            circle_shader,
            CircleVertex::layout(),
            wgpu::PrimitiveTopology::TriangleList,
            IdTarget::Color(format),
            sample_count,
        ),
    }
}

fn shader(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

/// Which output a geometry pipeline writes: blended color for the display
/// pass, or raw entity ids for the picking pass.
enum IdTarget {
    Color(wgpu::TextureFormat),
    EntityId,
}

fn geometry_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    vertex_layout: wgpu::VertexBufferLayout<'_>,
    topology: wgpu::PrimitiveTopology,
    target: IdTarget,
    sample_count: u32,
) -> wgpu::RenderPipeline {
    let (fs_entry, color_target) = match target {
        IdTarget::Color(format) => (
            "fs_color",
            wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            },
        ),
        IdTarget::EntityId => (
            "fs_entity",
            wgpu::ColorTargetState {
                format: ID_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            },
        ),
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[vertex_layout],
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fs_entry),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(color_target)],
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: sample_count,
            ..Default::default()
        },
        multiview: None,
        cache: None,
    })
}
