//! Typestate command recorder.
//!
//! One recorder drives one command buffer through a fixed sequence:
//!
//! ```text
//! acquire -> begin_render_pass -> bind_pipeline -> (push params, bind, draw)*
//!         -> end_render_pass -> queue_present? -> submit
//! ```
//!
//! Each phase is its own type and every transition consumes the previous
//! one, so out-of-order calls do not compile. A recorder dropped before
//! `submit` discards its command buffer.

use std::marker::PhantomData;

use crate::device::{
    BufferHandle, BufferUsage, CommandBufferHandle, Device, DrawPrimitives, Filter,
    GraphicsPipelineHandle, Rect, RenderPassBegin, RenderPassHandle, ResourceHandle,
    SamplerHandle, ShaderStage, TextureHandle, TextureSlice, TextureUsage,
};
use crate::resource::{PipelineInfo, ResourceGraph};
use crate::staging;

use super::context::FrameStats;
use super::error::FrameError;

/// Command buffer acquired, no render pass yet.
pub enum Acquired {}
/// Inside the render pass, no pipeline bound.
pub enum InRenderPass {}
/// Inside the render pass with a pipeline bound; draws are allowed.
pub enum PipelineBound {}
/// Render pass ended; present and submit remain.
pub enum PassEnded {}

/// Uniform slot returned by a parameter push.
///
/// Valid for the next draw on the same command buffer only; the draw consumes it.
#[must_use = "a parameter offset must be passed to the next draw"]
#[derive(Debug, PartialEq, Eq)]
pub struct ParamOffset {
    command_buffer: CommandBufferHandle,
    stage: ShaderStage,
    offset: u32,
}

impl ParamOffset {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

/// Draw arguments other than parameter offsets.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawArgs {
    pub vertex_start: u32,
    pub primitive_count: u32,
}

struct Recording<'r, D: Device + ?Sized> {
    device: &'r mut D,
    graph: &'r ResourceGraph,
    command_buffer: CommandBufferHandle,
    render_pass: Option<RenderPassHandle>,
    pipeline: Option<GraphicsPipelineHandle>,
    vertex_bound: Vec<bool>,
    samplers_bound: usize,
    draws: u32,
    param_bytes: usize,
    presented: bool,
    finished: bool,
}

impl<D: Device + ?Sized> Drop for Recording<'_, D> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "command buffer #{} dropped before submission; discarding",
                self.command_buffer.raw()
            );
            self.device.discard_command_buffer(self.command_buffer);
        }
    }
}

/// Records one command buffer. `S` is the current phase.
pub struct CommandRecorder<'r, D: Device + ?Sized, S> {
    rec: Recording<'r, D>,
    _state: PhantomData<S>,
}

impl<'r, D: Device + ?Sized, S> CommandRecorder<'r, D, S> {
    pub fn command_buffer(&self) -> CommandBufferHandle {
        self.rec.command_buffer
    }

    fn transition<T>(self) -> CommandRecorder<'r, D, T> {
        CommandRecorder { rec: self.rec, _state: PhantomData }
    }

    fn end_pass(mut self) -> Result<CommandRecorder<'r, D, PassEnded>, FrameError> {
        let cb = self.rec.command_buffer;
        self.rec
            .device
            .end_render_pass(cb)
            .map_err(FrameError::device("end_render_pass"))?;
        self.rec.pipeline = None;
        log::trace!("cb #{}: end render pass", cb.raw());
        Ok(self.transition())
    }
}

impl<'r, D: Device + ?Sized> CommandRecorder<'r, D, Acquired> {
    /// Acquires a fresh command buffer for `swap_index`.
    pub fn acquire(
        device: &'r mut D,
        graph: &'r ResourceGraph,
        swap_index: u32,
    ) -> Result<Self, FrameError> {
        let command_buffer = device
            .acquire_command_buffer(swap_index)
            .map_err(FrameError::device("acquire_command_buffer"))?;
        log::trace!("cb #{}: acquired for swap image {swap_index}", command_buffer.raw());
        Ok(Self {
            rec: Recording {
                device,
                graph,
                command_buffer,
                render_pass: None,
                pipeline: None,
                vertex_bound: Vec::new(),
                samplers_bound: 0,
                draws: 0,
                param_bytes: 0,
                presented: false,
                finished: false,
            },
            _state: PhantomData,
        })
    }

    pub fn begin_render_pass(
        mut self,
        begin: &RenderPassBegin<'_>,
    ) -> Result<CommandRecorder<'r, D, InRenderPass>, FrameError> {
        let graph = self.rec.graph;
        let pass = graph
            .render_pass(begin.render_pass)
            .ok_or(FrameError::UnknownResource(begin.render_pass.into()))?;
        let framebuffer = graph
            .framebuffer(begin.framebuffer)
            .ok_or(FrameError::UnknownResource(begin.framebuffer.into()))?;
        if framebuffer.render_pass != begin.render_pass {
            return Err(FrameError::RenderPassMismatch {
                resource: begin.framebuffer.into(),
                expected: framebuffer.render_pass.into(),
                actual: begin.render_pass.into(),
            });
        }
        if begin.color_clear_values.len() != pass.color_targets.len() {
            return Err(FrameError::ClearValueCount {
                expected: pass.color_targets.len(),
                actual: begin.color_clear_values.len(),
            });
        }

        let cb = self.rec.command_buffer;
        let device = &mut *self.rec.device;
        staging::stage(begin, |b| device.begin_render_pass(cb, b.get()))
            .map_err(FrameError::device("begin_render_pass"))?;
        self.rec.render_pass = Some(begin.render_pass);
        log::trace!("cb #{}: begin {}", cb.raw(), ResourceHandle::from(begin.render_pass));
        Ok(self.transition())
    }
}

impl<'r, D: Device + ?Sized> CommandRecorder<'r, D, InRenderPass> {
    /// Binds a pipeline created for the active render pass.
    pub fn bind_pipeline(
        mut self,
        pipeline: GraphicsPipelineHandle,
    ) -> Result<CommandRecorder<'r, D, PipelineBound>, FrameError> {
        let info = self
            .rec
            .graph
            .pipeline(pipeline)
            .ok_or(FrameError::UnknownResource(pipeline.into()))?;
        if let Some(active) = self.rec.render_pass {
            if info.render_pass != active {
                return Err(FrameError::RenderPassMismatch {
                    resource: pipeline.into(),
                    expected: info.render_pass.into(),
                    actual: active.into(),
                });
            }
        }
        let bindings = info.vertex_bindings.len();

        let cb = self.rec.command_buffer;
        self.rec
            .device
            .bind_graphics_pipeline(cb, pipeline)
            .map_err(FrameError::device("bind_graphics_pipeline"))?;
        self.rec.pipeline = Some(pipeline);
        self.rec.vertex_bound = vec![false; bindings];
        self.rec.samplers_bound = 0;
        log::trace!("cb #{}: bind {}", cb.raw(), ResourceHandle::from(pipeline));
        Ok(self.transition())
    }

    /// Ends a pass that recorded no draws.
    pub fn end_render_pass(self) -> Result<CommandRecorder<'r, D, PassEnded>, FrameError> {
        self.end_pass()
    }
}

impl<'r, D: Device + ?Sized> CommandRecorder<'r, D, PipelineBound> {
    fn pipeline_info(&self) -> Result<&'r PipelineInfo, FrameError> {
        let graph: &'r ResourceGraph = self.rec.graph;
        let pipeline = self.rec.pipeline.ok_or(FrameError::BindingCount {
            what: "graphics pipelines",
            expected: 1,
            actual: 0,
        })?;
        graph.pipeline(pipeline).ok_or(FrameError::UnknownResource(pipeline.into()))
    }

    /// Pushes one uniform block for `stage`. Its size must equal the
    /// pipeline's declared uniform size for the stage.
    pub fn push_shader_params(
        &mut self,
        stage: ShaderStage,
        data: &[u8],
    ) -> Result<ParamOffset, FrameError> {
        let expected = self.pipeline_info()?.uniform_size(stage);
        if expected == 0 || data.len() as u64 != expected {
            return Err(FrameError::ParamSize { stage, expected, actual: data.len() as u64 });
        }

        let cb = self.rec.command_buffer;
        let device = &mut *self.rec.device;
        let offset = staging::stage(data, |d| device.push_shader_params(cb, stage, d.get(), 1))
            .map_err(FrameError::device("push_shader_params"))?;
        self.rec.param_bytes += data.len();
        log::trace!("cb #{}: push {stage:?} params ({} bytes) at {offset}", cb.raw(), data.len());
        Ok(ParamOffset { command_buffer: cb, stage, offset })
    }

    /// Binds `buffers` to consecutive vertex bindings from `first_binding`.
    ///
    /// Each buffer's declared stride must equal the pipeline's stride for its binding.
    pub fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[(BufferHandle, u64)],
    ) -> Result<(), FrameError> {
        let info = self.pipeline_info()?;
        let graph = self.rec.graph;
        let declared = info.vertex_bindings.len();
        if buffers.is_empty() {
            return Err(FrameError::BindingCount { what: "vertex buffers", expected: declared, actual: 0 });
        }
        let mut slots = Vec::with_capacity(buffers.len());
        for (i, (buffer, _)) in buffers.iter().enumerate() {
            let number = u32::try_from(i).ok().and_then(|i| first_binding.checked_add(i));
            let slot =
                number.and_then(|n| info.vertex_bindings.iter().position(|b| b.binding == n));
            let Some(slot) = slot else {
                return Err(FrameError::BindingCount {
                    what: "vertex buffers",
                    expected: declared,
                    actual: (first_binding as usize).saturating_add(buffers.len()),
                });
            };
            let layout = &info.vertex_bindings[slot];
            let resource = ResourceHandle::from(*buffer);
            let buf = graph.buffer(*buffer).ok_or(FrameError::UnknownResource(resource))?;
            if !buf.usage.contains(BufferUsage::VERTEX) {
                return Err(FrameError::WrongUsage { resource, required: "vertex" });
            }
            if buf.vertex_stride != Some(layout.stride) {
                return Err(FrameError::VertexLayoutMismatch {
                    binding: layout.binding,
                    expected: layout.stride,
                    actual: buf.vertex_stride,
                });
            }
            if !buf.uploaded() {
                return Err(FrameError::NotUploaded(resource));
            }
            slots.push(slot);
        }

        let cb = self.rec.command_buffer;
        let device = &mut *self.rec.device;
        staging::stage_array(buffers.iter().map(|(b, _)| *b), |handles| {
            staging::stage_array(buffers.iter().map(|(_, o)| *o), |offsets| {
                device.bind_vertex_buffers(cb, first_binding, handles.get(), offsets.get())
            })
        })
        .map_err(FrameError::device("bind_vertex_buffers"))?;
        for slot in slots {
            self.rec.vertex_bound[slot] = true;
        }
        log::trace!("cb #{}: bind {} vertex buffers", cb.raw(), buffers.len());
        Ok(())
    }

    /// Binds texture/sampler pairs to the fragment sampler slots in order.
    pub fn bind_fragment_samplers(
        &mut self,
        pairs: &[(TextureHandle, SamplerHandle)],
    ) -> Result<(), FrameError> {
        let info = self.pipeline_info()?;
        let graph = self.rec.graph;
        let expected = info.fragment_sampler_count as usize;
        if pairs.len() != expected {
            return Err(FrameError::BindingCount {
                what: "fragment samplers",
                expected,
                actual: pairs.len(),
            });
        }
        for (texture, sampler) in pairs {
            let resource = ResourceHandle::from(*texture);
            let tex = graph.texture(*texture).ok_or(FrameError::UnknownResource(resource))?;
            if !tex.usage.contains(TextureUsage::SAMPLER) {
                return Err(FrameError::WrongUsage { resource, required: "sampler" });
            }
            if !tex.uploaded {
                return Err(FrameError::NotUploaded(resource));
            }
            if !graph.contains(*sampler) {
                return Err(FrameError::UnknownResource((*sampler).into()));
            }
        }

        let cb = self.rec.command_buffer;
        let device = &mut *self.rec.device;
        staging::stage_array(pairs.iter().map(|(t, _)| *t), |textures| {
            staging::stage_array(pairs.iter().map(|(_, s)| *s), |samplers| {
                device.bind_fragment_samplers(cb, textures.get(), samplers.get())
            })
        })
        .map_err(FrameError::device("bind_fragment_samplers"))?;
        self.rec.samplers_bound = pairs.len();
        log::trace!("cb #{}: bind {} fragment samplers", cb.raw(), pairs.len());
        Ok(())
    }

    fn resolve_offset(
        &self,
        stage: ShaderStage,
        declared: u64,
        token: Option<ParamOffset>,
    ) -> Result<u32, FrameError> {
        match token {
            Some(t) if t.command_buffer != self.rec.command_buffer || t.stage != stage => {
                Err(FrameError::ForeignParamOffset { stage })
            }
            Some(t) => Ok(t.offset),
            None if declared > 0 => Err(FrameError::MissingParams { stage }),
            None => Ok(0),
        }
    }

    /// Records a non-indexed draw, consuming the parameter offsets.
    pub fn draw(
        &mut self,
        args: DrawArgs,
        vertex_params: Option<ParamOffset>,
        fragment_params: Option<ParamOffset>,
    ) -> Result<(), FrameError> {
        let info = self.pipeline_info()?;
        let bound = self.rec.vertex_bound.iter().filter(|b| **b).count();
        if bound != info.vertex_bindings.len() {
            return Err(FrameError::BindingCount {
                what: "vertex buffers",
                expected: info.vertex_bindings.len(),
                actual: bound,
            });
        }
        let samplers = info.fragment_sampler_count as usize;
        if self.rec.samplers_bound != samplers {
            return Err(FrameError::BindingCount {
                what: "fragment samplers",
                expected: samplers,
                actual: self.rec.samplers_bound,
            });
        }
        let vertex_param_offset =
            self.resolve_offset(ShaderStage::Vertex, info.vertex_uniform_size, vertex_params)?;
        let fragment_param_offset =
            self.resolve_offset(ShaderStage::Fragment, info.fragment_uniform_size, fragment_params)?;

        let draw = DrawPrimitives {
            vertex_start: args.vertex_start,
            primitive_count: args.primitive_count,
            vertex_param_offset,
            fragment_param_offset,
        };
        let cb = self.rec.command_buffer;
        let device = &mut *self.rec.device;
        staging::stage(&draw, |d| device.draw_primitives(cb, d.get()))
            .map_err(FrameError::device("draw_primitives"))?;
        self.rec.draws += 1;
        log::trace!(
            "cb #{}: draw {} primitives from vertex {}",
            cb.raw(),
            args.primitive_count,
            args.vertex_start
        );
        Ok(())
    }

    pub fn end_render_pass(self) -> Result<CommandRecorder<'r, D, PassEnded>, FrameError> {
        self.end_pass()
    }
}

impl<'r, D: Device + ?Sized> CommandRecorder<'r, D, PassEnded> {
    /// Queues `source` for presentation into `destination` of the swap image.
    pub fn queue_present(
        &mut self,
        source: &TextureSlice,
        destination: Option<Rect>,
        filter: Filter,
    ) -> Result<(), FrameError> {
        let resource = ResourceHandle::from(source.texture);
        if !self.rec.graph.contains(resource) {
            return Err(FrameError::UnknownResource(resource));
        }
        let cb = self.rec.command_buffer;
        let device = &mut *self.rec.device;
        staging::stage(source, |s| device.queue_present(cb, s.get(), destination.as_ref(), filter))
            .map_err(FrameError::device("queue_present"))?;
        self.rec.presented = true;
        log::trace!("cb #{}: queue present of {resource}", cb.raw());
        Ok(())
    }

    /// Submits the command buffer. It cannot be used again, even on failure.
    pub fn submit(mut self) -> Result<FrameStats, FrameError> {
        let cb = self.rec.command_buffer;
        self.rec.finished = true;
        self.rec
            .device
            .submit(&[cb])
            .map_err(FrameError::device("submit"))?;
        log::trace!("cb #{}: submitted", cb.raw());
        Ok(FrameStats {
            command_buffer: cb,
            draws: self.rec.draws,
            param_bytes: self.rec.param_bytes,
            presented: self.rec.presented,
        })
    }
}
