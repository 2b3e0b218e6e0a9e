//! wgpu-backed chunk compositor.
//!
//! One texture per chunk, arena-style: an index-addressed `Vec` of chunks
//! with explicit allocate/resize/destroy rather than relying on implicit
//! collection of graphics resources. Incremental frames upload only the rows
//! that intersect each chunk (`Queue::write_texture` with a sub-rectangle),
//! so upload cost tracks delta rows, not total composite height.

use longshot_core::EngineConfig;
use tracing::{debug, info, warn};

use crate::layout::ChunkLayout;
use crate::CompositorError;

/// Texture format of both chunk textures and the preview target the host
/// renders into. Stream payloads are display-referred RGBA already, so a
/// non-sRGB format avoids double gamma encoding.
pub const PREVIEW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const SHADER: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) pos: vec2<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(pos, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@group(0) @binding(0) var chunk_tex: texture_2d<f32>;
@group(0) @binding(1) var chunk_samp: sampler;

@fragment
fn fs_main(v: VsOut) -> @location(0) vec4<f32> {
    return textureSample(chunk_tex, chunk_samp, v.uv);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 2],
    uv: [f32; 2],
}

const VERTEX_ATTRS: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

// ── GpuContext ────────────────────────────────────────────────────────────────

/// Owned GPU handle. Construction fails with [`CompositorError::GpuUnavailable`]
/// when no adapter exists; the capture session keeps running without a preview.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub async fn new() -> Result<Self, CompositorError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(CompositorError::GpuUnavailable)?;

        info!("Compositor adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("longshot-compositor"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| CompositorError::Init(e.to_string()))?;

        Ok(Self { device, queue })
    }
}

// ── TextureChunk ──────────────────────────────────────────────────────────────

/// One fixed-height tile of the composite: a texture plus its own vertex
/// buffer. Texture dimensions are immutable post-creation, so a width change
/// recreates every chunk.
struct TextureChunk {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    vertex_buf: wgpu::Buffer,
    start_y: u32,
}

impl TextureChunk {
    fn destroy(self) {
        self.texture.destroy();
        self.vertex_buf.destroy();
    }
}

// ── ChunkCompositor ───────────────────────────────────────────────────────────

/// Chunked compositor for one capture session. Chunks come into existence on
/// the first frame and must be released via [`ChunkCompositor::destroy`] (or
/// drop) on session end so repeated sessions do not leak GPU memory.
pub struct ChunkCompositor {
    ctx: GpuContext,
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    chunk_height: u32,
    preview_width: u32,
    layout: Option<ChunkLayout>,
    chunks: Vec<TextureChunk>,
}

impl ChunkCompositor {
    pub fn new(ctx: GpuContext, config: &EngineConfig) -> Self {
        let device = &ctx.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("chunk-blit"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("chunk-bind-layout"),
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("chunk-pipeline-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("chunk-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRS,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: PREVIEW_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("chunk-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            ctx,
            pipeline,
            bind_layout,
            sampler,
            chunk_height: config.max_chunk_height,
            preview_width: config.preview_width,
            layout: None,
            chunks: Vec::new(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Displayed preview height at the fixed logical preview width.
    pub fn displayed_height(&self) -> f64 {
        match self.layout {
            Some(l) if l.width > 0 => {
                self.preview_width as f64 * l.total_height as f64 / l.width as f64
            }
            _ => 0.0,
        }
    }

    // ── Chunk arena management ────────────────────────────────────────────────

    /// Bring the chunk array in line with the composite dimensions: create
    /// missing chunks, destroy excess ones, recreate everything on a width
    /// change (texture dimensions are immutable post-creation).
    pub fn ensure_chunks(&mut self, width: u32, total_height: u32) {
        let target = ChunkLayout::with_chunk_height(width, total_height, self.chunk_height);

        if self.layout.map_or(false, |l| l.width != width) {
            debug!("Composite width changed — recreating all {} chunk(s)", self.chunks.len());
            for chunk in self.chunks.drain(..) {
                chunk.destroy();
            }
        }
        self.layout = Some(target);

        while self.chunks.len() > target.chunk_count() {
            if let Some(chunk) = self.chunks.pop() {
                chunk.destroy();
            }
        }
        while self.chunks.len() < target.chunk_count() {
            let slot = target.slot(self.chunks.len());
            self.chunks.push(self.create_chunk(width, slot.start_y));
        }
    }

    fn create_chunk(&self, width: u32, start_y: u32) -> TextureChunk {
        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("composite-chunk"),
            size: wgpu::Extent3d {
                width,
                height: self.chunk_height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: PREVIEW_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("chunk-bind"),
            layout: &self.bind_layout,
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
        });

        let vertex_buf = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("chunk-quad"),
            size: (4 * std::mem::size_of::<Vertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        TextureChunk { texture, bind_group, vertex_buf, start_y }
    }

    // ── Delta upload ──────────────────────────────────────────────────────────

    /// Upload the dirty row range `[start_row, start_row + rows)` from the
    /// accumulation buffer. Chunks the range does not intersect are skipped;
    /// upload cost is O(delta rows), not O(total height).
    pub fn upload(&mut self, composite: &[u8], start_row: u32, rows: u32) {
        let Some(layout) = self.layout else {
            warn!("upload called before ensure_chunks — no chunk layout");
            return;
        };
        let row_bytes = layout.row_bytes();

        for chunk in &self.chunks {
            let index = (chunk.start_y / self.chunk_height) as usize;
            let Some((local_start, local_rows)) = layout.intersect(index, start_row, rows) else {
                continue;
            };

            let global_start = (chunk.start_y + local_start) as usize;
            let end = (global_start + local_rows as usize) * row_bytes;
            if end > composite.len() {
                warn!(
                    "Upload range {}..{} exceeds composite buffer ({} bytes) — skipping",
                    global_start * row_bytes,
                    end,
                    composite.len()
                );
                continue;
            }
            let bytes = &composite[global_start * row_bytes..end];

            self.ctx.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &chunk.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y: local_start, z: 0 },
                    aspect: wgpu::TextureAspect::All,
                },
                bytes,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(row_bytes as u32),
                    rows_per_image: Some(local_rows),
                },
                wgpu::Extent3d {
                    width: layout.width,
                    height: local_rows,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    // ── Draw ──────────────────────────────────────────────────────────────────

    /// Draw the chunks visible through the preview window into `target`.
    /// `scroll_y` is the preview's scroll offset in displayed pixels.
    pub fn draw(&self, target: &wgpu::TextureView, target_width: u32, target_height: u32, scroll_y: f64) {
        let Some(layout) = self.layout else { return };
        if layout.width == 0 || target_width == 0 || target_height == 0 {
            return;
        }

        // Displayed pixels per source pixel at the fixed preview width.
        let scale = self.preview_width as f64 / layout.width as f64;

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("chunk-draw") });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("chunk-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);

            for chunk in &self.chunks {
                let index = (chunk.start_y / self.chunk_height) as usize;
                let slot = layout.slot(index);

                let top = slot.start_y as f64 * scale - scroll_y;
                let bottom = slot.end_y() as f64 * scale - scroll_y;
                if bottom <= 0.0 || top >= target_height as f64 {
                    continue; // outside the visible viewport
                }

                let verts = quad_vertices(
                    top,
                    bottom,
                    self.preview_width as f64,
                    target_width,
                    target_height,
                    slot.rows as f32 / self.chunk_height as f32,
                );
                self.ctx
                    .queue
                    .write_buffer(&chunk.vertex_buf, 0, bytemuck::cast_slice(&verts));

                pass.set_bind_group(0, &chunk.bind_group, &[]);
                pass.set_vertex_buffer(0, chunk.vertex_buf.slice(..));
                pass.draw(0..4, 0..1);
            }
        }

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Release every chunk's texture and buffer. Safe to call repeatedly;
    /// the compositor can be reused for a new session afterwards.
    pub fn destroy(&mut self) {
        if !self.chunks.is_empty() {
            debug!("Destroying {} chunk(s)", self.chunks.len());
        }
        for chunk in self.chunks.drain(..) {
            chunk.destroy();
        }
        self.layout = None;
    }
}

impl Drop for ChunkCompositor {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Build a strip quad in NDC for a chunk's displayed rect. `v_max` limits
/// sampling to the rows of the fixed-height texture that hold content.
fn quad_vertices(
    top: f64,
    bottom: f64,
    displayed_width: f64,
    target_width: u32,
    target_height: u32,
    v_max: f32,
) -> [Vertex; 4] {
    let x0 = -1.0f32;
    let x1 = (displayed_width / target_width as f64 * 2.0 - 1.0) as f32;
    let y0 = (1.0 - top / target_height as f64 * 2.0) as f32;
    let y1 = (1.0 - bottom / target_height as f64 * 2.0) as f32;

    [
        Vertex { pos: [x0, y0], uv: [0.0, 0.0] },
        Vertex { pos: [x1, y0], uv: [1.0, 0.0] },
        Vertex { pos: [x0, y1], uv: [0.0, v_max] },
        Vertex { pos: [x1, y1], uv: [1.0, v_max] },
    ]
}
