//! Command lists recorded per command buffer and their replay into a wgpu
//! encoder at submit time.

use crate::device::{
    BufferHandle, Color, DepthStencilValue, DeviceError, DrawPrimitives, Filter,
    FramebufferHandle, GraphicsPipelineHandle, Rect, RenderPassHandle, SamplerHandle,
    ShaderStage, TextureHandle, TextureSlice, Viewport,
};

use super::WgpuDevice;
use super::convert;
use super::present::{BlitParams, BlitTarget};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) enum Phase {
    Recording,
    InPass,
    PassEnded,
}

#[derive(Debug, Clone)]
pub(super) enum Recorded {
    BeginPass {
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        render_area: Rect,
        clear_colors: Vec<Color>,
        depth_clear: DepthStencilValue,
    },
    BindPipeline(GraphicsPipelineHandle),
    BindVertexBuffers { first_binding: u32, buffers: Vec<BufferHandle>, offsets: Vec<u64> },
    BindFragmentSamplers { textures: Vec<TextureHandle>, samplers: Vec<SamplerHandle> },
    Draw(DrawPrimitives),
    EndPass,
    Present { source: TextureSlice, destination: Option<Rect>, filter: Filter },
}

#[derive(Debug)]
pub(super) struct CommandList {
    pub(super) swap_index: u32,
    pub(super) phase: Phase,
    pub(super) passes: u32,
    pub(super) pipeline: Option<GraphicsPipelineHandle>,
    pub(super) commands: Vec<Recorded>,
}

impl CommandList {
    pub(super) fn new(swap_index: u32) -> Self {
        Self { swap_index, phase: Phase::Recording, passes: 0, pipeline: None, commands: Vec::new() }
    }

    pub(super) fn expect(&self, phase: Phase, call: &'static str) -> Result<(), DeviceError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(DeviceError::Sequencing(format!(
                "{call} requires {phase:?}, command buffer is {:?}",
                self.phase
            )))
        }
    }

    pub(super) fn bound_pipeline(
        &self,
        call: &'static str,
    ) -> Result<GraphicsPipelineHandle, DeviceError> {
        self.pipeline
            .ok_or_else(|| DeviceError::Sequencing(format!("{call} before bind_graphics_pipeline")))
    }

    pub(super) fn presents(&self) -> bool {
        self.commands.iter().any(|c| matches!(c, Recorded::Present { .. }))
    }
}

/// Swap image acquired for a submission.
pub(super) struct SwapImage<'a> {
    pub(super) view: &'a wgpu::TextureView,
    pub(super) width: u32,
    pub(super) height: u32,
}

impl WgpuDevice {
    /// Encodes one command list. Presents are dropped when no swap image
    /// was acquired.
    pub(super) fn encode(
        &self,
        list: &CommandList,
        swap: Option<&SwapImage<'_>>,
        presented: &mut bool,
    ) -> Result<wgpu::CommandBuffer, DeviceError> {
        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("cadence frame encoder"),
        });

        let mut commands = list.commands.iter();
        while let Some(command) = commands.next() {
            match command {
                Recorded::BeginPass { render_pass, framebuffer, render_area, clear_colors, depth_clear } => {
                    let begin = PassBegin {
                        render_pass: *render_pass,
                        framebuffer: *framebuffer,
                        render_area: *render_area,
                        clear_colors,
                        depth_clear: *depth_clear,
                    };
                    self.encode_pass(&mut encoder, begin, &mut commands)?;
                }
                Recorded::Present { source, destination, filter } => {
                    let Some(swap) = swap else { continue };
                    if self.encode_present(&mut encoder, source, *destination, *filter, swap, !*presented)? {
                        *presented = true;
                    }
                }
                other => {
                    return Err(DeviceError::Sequencing(format!("{other:?} outside a render pass")));
                }
            }
        }

        Ok(encoder.finish())
    }

    fn encode_pass<'c>(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        begin: PassBegin<'_>,
        commands: &mut impl Iterator<Item = &'c Recorded>,
    ) -> Result<(), DeviceError> {
        let pass = self.render_pass(begin.render_pass)?;
        let framebuffer = self.framebuffer(begin.framebuffer)?;
        let (width, height) = (framebuffer.width, framebuffer.height);

        let color_attachments = framebuffer
            .colors
            .iter()
            .zip(&pass.colors)
            .enumerate()
            .map(|(i, (handle, desc))| {
                let target = self.color_target(*handle)?;
                let clear = begin.clear_colors.get(i).copied().unwrap_or_default();
                Ok(Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: target.resolve.as_ref(),
                    ops: wgpu::Operations {
                        load: convert::load_op(desc.load_op, convert::color(clear)),
                        store: convert::store_op(desc.store_op),
                    },
                    depth_slice: None,
                }))
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;

        let mut has_stencil = false;
        let depth_stencil_attachment = match (framebuffer.depth, pass.depth) {
            (Some(handle), Some(desc)) => {
                let target = self.depth_target(handle)?;
                has_stencil = target.format.has_stencil();
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.view,
                    depth_ops: Some(wgpu::Operations {
                        load: convert::load_op(desc.load_op, begin.depth_clear.depth),
                        store: convert::store_op(desc.store_op),
                    }),
                    stencil_ops: has_stencil.then(|| wgpu::Operations {
                        load: convert::load_op(desc.stencil_load_op, begin.depth_clear.stencil),
                        store: convert::store_op(desc.stencil_store_op),
                    }),
                })
            }
            _ => None,
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: pass.label,
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let render_area = begin.render_area.clamp_to(width, height);
        let mut bound = None;
        // Draws are dropped while the viewport or scissor is empty.
        let mut visible = false;

        for command in commands.by_ref() {
            match command {
                Recorded::BindPipeline(handle) => {
                    let pipeline = self.pipeline(*handle)?;
                    rpass.set_pipeline(&pipeline.pipeline);

                    let viewport = pipeline
                        .viewport
                        .unwrap_or_else(|| Viewport::from_size(width, height));
                    let scissor = pipeline
                        .scissor
                        .map_or(render_area, |s| s.clamp_to(width, height));
                    visible = match (clip_viewport(viewport, width, height), scissor) {
                        (Some(v), Some(s)) => {
                            rpass.set_viewport(v.x, v.y, v.w, v.h, v.min_depth, v.max_depth);
                            rpass.set_scissor_rect(s.x as u32, s.y as u32, s.w as u32, s.h as u32);
                            true
                        }
                        _ => false,
                    };

                    rpass.set_blend_constant(pipeline.blend_constant);
                    if has_stencil {
                        rpass.set_stencil_reference(pipeline.stencil_reference);
                    }
                    if pipeline.fragment_sampler_count == 0 {
                        rpass.set_bind_group(2, self.bindings.empty_group(), &[]);
                    }
                    bound = Some(pipeline);
                }
                Recorded::BindVertexBuffers { first_binding, buffers, offsets } => {
                    let slots = (*first_binding..=u32::MAX).zip(buffers.iter().zip(offsets));
                    for (slot, (handle, offset)) in slots {
                        let buffer = self.buffer(*handle)?;
                        rpass.set_vertex_buffer(slot, buffer.buffer.slice(*offset..));
                    }
                }
                Recorded::BindFragmentSamplers { textures, samplers } => {
                    let pipeline = bound.ok_or_else(|| no_pipeline("bind_fragment_samplers"))?;
                    let mut entries = Vec::with_capacity(textures.len() * 2);
                    for (slot, (texture, sampler)) in (0u32..).zip(textures.iter().zip(samplers)) {
                        entries.push(wgpu::BindGroupEntry {
                            binding: 2 * slot,
                            resource: wgpu::BindingResource::TextureView(&self.texture(*texture)?.view),
                        });
                        entries.push(wgpu::BindGroupEntry {
                            binding: 2 * slot + 1,
                            resource: wgpu::BindingResource::Sampler(self.sampler(*sampler)?),
                        });
                    }
                    let group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("cadence sampler bind group"),
                        layout: self.bindings.sampler_layout(pipeline.fragment_sampler_count),
                        entries: &entries,
                    });
                    rpass.set_bind_group(2, &group, &[]);
                }
                Recorded::Draw(draw) => {
                    let pipeline = bound.ok_or_else(|| no_pipeline("draw_primitives"))?;
                    if !visible {
                        continue;
                    }
                    for (index, stage, size, offset) in [
                        (0, ShaderStage::Vertex, pipeline.vertex_uniform_size, draw.vertex_param_offset),
                        (1, ShaderStage::Fragment, pipeline.fragment_uniform_size, draw.fragment_param_offset),
                    ] {
                        let group = self.bindings.uniform_group(stage, size).ok_or_else(|| {
                            DeviceError::Validation(format!("no {stage:?} uniform layout for {size} bytes"))
                        })?;
                        let slot = [offset];
                        let offsets = if size == 0 { &slot[..0] } else { &slot[..] };
                        rpass.set_bind_group(index, group, offsets);
                    }
                    let count = pipeline.primitive_type.vertex_count(draw.primitive_count);
                    let end = draw.vertex_start.checked_add(count).ok_or_else(|| {
                        DeviceError::Validation(format!(
                            "draw of {count} vertices from {} overflows",
                            draw.vertex_start
                        ))
                    })?;
                    rpass.draw(draw.vertex_start..end, 0..1);
                }
                Recorded::EndPass => return Ok(()),
                other => {
                    return Err(DeviceError::Sequencing(format!("{other:?} inside a render pass")));
                }
            }
        }

        Err(DeviceError::Sequencing("render pass was not ended".into()))
    }

    /// Returns whether anything was drawn into the swap image.
    fn encode_present(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &TextureSlice,
        destination: Option<Rect>,
        filter: Filter,
        swap: &SwapImage<'_>,
        clear: bool,
    ) -> Result<bool, DeviceError> {
        let texture = self.texture(source.texture)?;
        let Some(target) = BlitTarget::resolve(destination, swap.width, swap.height) else {
            log::debug!("present destination {destination:?} is outside the swap image");
            return Ok(false);
        };
        let params = BlitParams::new(
            source.rect,
            texture.width,
            texture.height,
            target.flip_x,
            target.flip_y,
        );
        self.blitter.encode(
            &self.ctx.device,
            encoder,
            &texture.view,
            params,
            filter,
            swap.view,
            target,
            clear,
        );
        Ok(true)
    }
}

struct PassBegin<'a> {
    render_pass: RenderPassHandle,
    framebuffer: FramebufferHandle,
    render_area: Rect,
    clear_colors: &'a [Color],
    depth_clear: DepthStencilValue,
}

fn no_pipeline(call: &'static str) -> DeviceError {
    DeviceError::Sequencing(format!("{call} before bind_graphics_pipeline"))
}

/// Intersects a viewport with the render target.
fn clip_viewport(v: Viewport, width: u32, height: u32) -> Option<Viewport> {
    let x0 = v.x.max(0.0);
    let y0 = v.y.max(0.0);
    let x1 = (v.x + v.w).min(width as f32);
    let y1 = (v.y + v.h).min(height as f32);
    (x1 > x0 && y1 > y0).then_some(Viewport { x: x0, y: y0, w: x1 - x0, h: y1 - y0, ..v })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_is_clipped_to_the_target() {
        let v = Viewport { x: -10.0, y: 0.0, w: 100.0, h: 50.0, min_depth: 0.0, max_depth: 1.0 };
        let clipped = clip_viewport(v, 64, 32).unwrap();
        assert_eq!((clipped.x, clipped.y, clipped.w, clipped.h), (0.0, 0.0, 64.0, 32.0));
    }

    #[test]
    fn viewport_outside_the_target_is_empty() {
        let v = Viewport { x: 70.0, ..Viewport::from_size(10, 10) };
        assert_eq!(clip_viewport(v, 64, 64), None);
    }

    #[test]
    fn phase_mismatch_names_the_call() {
        let list = CommandList::new(0);
        let err = list.expect(Phase::InPass, "draw_primitives").unwrap_err();
        assert!(matches!(err, DeviceError::Sequencing(msg) if msg.contains("draw_primitives")));
        assert!(list.bound_pipeline("bind_vertex_buffers").is_err());
        assert!(!list.presents());
    }
}
