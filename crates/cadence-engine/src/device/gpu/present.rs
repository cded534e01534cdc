//! Swap-image presentation: a textured fullscreen-triangle blit from a
//! source texture region into a destination viewport.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::device::{Filter, Rect};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(super) struct BlitParams {
    uv_offset: [f32; 2],
    uv_scale: [f32; 2],
}

impl BlitParams {
    /// Maps the blit's unit square onto `source` within a `width x height`
    /// texture, mirrored on the flipped axes.
    pub(super) fn new(source: Rect, width: u32, height: u32, flip_x: bool, flip_y: bool) -> Self {
        let src = source.normalized();
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        let (mut u0, mut su) = (src.x as f32 / w, src.w as f32 / w);
        let (mut v0, mut sv) = (src.y as f32 / h, src.h as f32 / h);
        if flip_x {
            u0 += su;
            su = -su;
        }
        if flip_y {
            v0 += sv;
            sv = -sv;
        }
        Self { uv_offset: [u0, v0], uv_scale: [su, sv] }
    }
}

/// Viewport inside the swap image plus the axes to mirror.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(super) struct BlitTarget {
    pub(super) viewport: Rect,
    pub(super) flip_x: bool,
    pub(super) flip_y: bool,
}

impl BlitTarget {
    /// Resolves a destination rectangle against the swap image size.
    ///
    /// `None` covers the whole image. Negative extents mirror that axis.
    /// Returns `None` when nothing of the destination is visible.
    pub(super) fn resolve(destination: Option<Rect>, width: u32, height: u32) -> Option<Self> {
        let dest = destination.unwrap_or(Rect::from_size(width, height));
        // Viewports may not leave the render target, so clip and keep the
        // flip flags from the unnormalized rectangle.
        let viewport = dest.clamp_to(width, height)?;
        Some(Self { viewport, flip_x: dest.w < 0, flip_y: dest.h < 0 })
    }
}

pub(super) struct Blitter {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
}

impl Blitter {
    pub(super) fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cadence blit shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/blit.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cadence blit bgl"),
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
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<BlitParams>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cadence blit pipeline layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("cadence blit pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let sampler = |filter: wgpu::FilterMode, label: &'static str| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::MipmapFilterMode::Nearest,
                ..Default::default()
            })
        };

        Self {
            layout,
            pipeline,
            nearest: sampler(wgpu::FilterMode::Nearest, "cadence blit nearest"),
            linear: sampler(wgpu::FilterMode::Linear, "cadence blit linear"),
        }
    }

    /// Records one blit. `clear` clears the swap image first instead of
    /// keeping earlier blits.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn encode(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        params: BlitParams,
        filter: Filter,
        target: &wgpu::TextureView,
        blit: BlitTarget,
        clear: bool,
    ) {
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cadence blit params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let sampler = match filter {
            Filter::Nearest => &self.nearest,
            Filter::Linear => &self.linear,
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cadence blit bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(source) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
                wgpu::BindGroupEntry { binding: 2, resource: params.as_entire_binding() },
            ],
        });

        let load = if clear { wgpu::LoadOp::Clear(wgpu::Color::BLACK) } else { wgpu::LoadOp::Load };
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("cadence present pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let v = blit.viewport;
        rpass.set_viewport(v.x as f32, v.y as f32, v.w as f32, v.h as f32, 0.0, 1.0);
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_image_without_destination() {
        let target = BlitTarget::resolve(None, 640, 480).unwrap();
        assert_eq!(target.viewport, Rect::new(0, 0, 640, 480));
        assert!(!target.flip_x && !target.flip_y);
    }

    #[test]
    fn negative_height_flips_vertically() {
        let target = BlitTarget::resolve(Some(Rect::new(0, 480, 640, -480)), 640, 480).unwrap();
        assert_eq!(target.viewport, Rect::new(0, 0, 640, 480));
        assert!(target.flip_y);
        assert!(!target.flip_x);
    }

    #[test]
    fn destination_outside_the_image_is_dropped() {
        assert_eq!(BlitTarget::resolve(Some(Rect::new(700, 0, 10, 10)), 640, 480), None);
    }

    #[test]
    fn flipped_params_start_at_the_far_edge() {
        let p = BlitParams::new(Rect::from_size(8, 8), 8, 8, false, true);
        assert_eq!(p.uv_offset, [0.0, 1.0]);
        assert_eq!(p.uv_scale, [1.0, -1.0]);
    }

    #[test]
    fn sub_rect_maps_to_partial_uvs() {
        let p = BlitParams::new(Rect::new(2, 0, 4, 8), 8, 8, false, false);
        assert_eq!(p.uv_offset, [0.25, 0.0]);
        assert_eq!(p.uv_scale, [0.5, 1.0]);
    }
}
