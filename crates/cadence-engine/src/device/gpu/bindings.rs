//! Bind group layouts shared by every pipeline, and the uniform rings that
//! back shader parameter pushes.
//!
//! Pipeline layout:
//!
//! | group | contents                                                   |
//! |-------|------------------------------------------------------------|
//! | 0     | vertex uniform block, binding 0, dynamic offset            |
//! | 1     | fragment uniform block, binding 0, dynamic offset          |
//! | 2     | fragment samplers: texture at `2i`, sampler at `2i + 1`    |
//!
//! Groups a pipeline does not use are bound to an empty group.

use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::device::{DeviceError, ShaderStage};

/// Bytes reserved per stage for parameter pushes between ring resets.
const RING_CAPACITY: u64 = 256 * 1024;

/// Append-only uniform buffer, reset when no command buffer is pending.
pub(super) struct UniformRing {
    buffer: wgpu::Buffer,
    cursor: u64,
    alignment: u64,
}

impl UniformRing {
    fn new(device: &wgpu::Device, label: &'static str) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: RING_CAPACITY,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let alignment = device.limits().min_uniform_buffer_offset_alignment.max(1) as u64;
        Self { buffer, cursor: 0, alignment }
    }

    /// Writes `data` at the next aligned slot and returns its offset.
    pub(super) fn push(&mut self, queue: &wgpu::Queue, data: &[u8]) -> Result<u32, DeviceError> {
        let len = data.len() as u64;
        if self.cursor + len > RING_CAPACITY {
            return Err(DeviceError::Validation(format!(
                "parameter ring full ({} of {RING_CAPACITY} bytes used)",
                self.cursor
            )));
        }
        let offset = self.cursor;
        queue.write_buffer(&self.buffer, offset, data);
        self.cursor = (offset + len).div_ceil(self.alignment) * self.alignment;
        u32::try_from(offset).map_err(|_| DeviceError::OutOfMemory)
    }

    pub(super) fn reset(&mut self) {
        self.cursor = 0;
    }
}

pub(super) struct Bindings {
    empty_layout: wgpu::BindGroupLayout,
    empty_group: wgpu::BindGroup,
    uniform_layouts: HashMap<(ShaderStage, u64), wgpu::BindGroupLayout>,
    uniform_groups: HashMap<(ShaderStage, u64), wgpu::BindGroup>,
    sampler_layouts: HashMap<u32, wgpu::BindGroupLayout>,
    pub(super) vertex_ring: UniformRing,
    pub(super) fragment_ring: UniformRing,
}

impl Bindings {
    pub(super) fn new(device: &wgpu::Device) -> Self {
        let empty_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cadence empty bgl"),
            entries: &[],
        });
        let empty_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cadence empty bind group"),
            layout: &empty_layout,
            entries: &[],
        });
        Self {
            empty_layout,
            empty_group,
            uniform_layouts: HashMap::new(),
            uniform_groups: HashMap::new(),
            sampler_layouts: HashMap::new(),
            vertex_ring: UniformRing::new(device, "cadence vertex params"),
            fragment_ring: UniformRing::new(device, "cadence fragment params"),
        }
    }

    pub(super) fn empty_group(&self) -> &wgpu::BindGroup {
        &self.empty_group
    }

    pub(super) fn ring_mut(&mut self, stage: ShaderStage) -> &mut UniformRing {
        match stage {
            ShaderStage::Vertex => &mut self.vertex_ring,
            ShaderStage::Fragment => &mut self.fragment_ring,
        }
    }

    pub(super) fn reset_rings(&mut self) {
        self.vertex_ring.reset();
        self.fragment_ring.reset();
    }

    /// Uniform group for a block of `size` bytes, or the empty group for 0.
    pub(super) fn uniform_group(&self, stage: ShaderStage, size: u64) -> Option<&wgpu::BindGroup> {
        if size == 0 {
            return Some(&self.empty_group);
        }
        self.uniform_groups.get(&(stage, size))
    }

    /// Creates the pipeline layout for the given uniform sizes and sampler count.
    pub(super) fn pipeline_layout(
        &mut self,
        device: &wgpu::Device,
        vertex_uniform_size: u64,
        fragment_uniform_size: u64,
        fragment_samplers: u32,
    ) -> wgpu::PipelineLayout {
        self.ensure_uniform(device, ShaderStage::Vertex, vertex_uniform_size);
        self.ensure_uniform(device, ShaderStage::Fragment, fragment_uniform_size);
        self.ensure_samplers(device, fragment_samplers);

        let group0 = self.uniform_layout(ShaderStage::Vertex, vertex_uniform_size);
        let group1 = self.uniform_layout(ShaderStage::Fragment, fragment_uniform_size);
        let group2 = self.sampler_layout(fragment_samplers);
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cadence pipeline layout"),
            bind_group_layouts: &[group0, group1, group2],
            immediate_size: 0,
        })
    }

    pub(super) fn sampler_layout(&self, count: u32) -> &wgpu::BindGroupLayout {
        self.sampler_layouts.get(&count).unwrap_or(&self.empty_layout)
    }

    fn uniform_layout(&self, stage: ShaderStage, size: u64) -> &wgpu::BindGroupLayout {
        self.uniform_layouts.get(&(stage, size)).unwrap_or(&self.empty_layout)
    }

    fn ensure_uniform(&mut self, device: &wgpu::Device, stage: ShaderStage, size: u64) {
        let Some(min_binding_size) = NonZeroU64::new(size) else {
            return;
        };
        if self.uniform_groups.contains_key(&(stage, size)) {
            return;
        }
        let visibility = match stage {
            ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
            ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cadence uniform bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: Some(min_binding_size),
                },
                count: None,
            }],
        });
        let ring = match stage {
            ShaderStage::Vertex => &self.vertex_ring,
            ShaderStage::Fragment => &self.fragment_ring,
        };
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cadence uniform bind group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &ring.buffer,
                    offset: 0,
                    size: Some(min_binding_size),
                }),
            }],
        });
        self.uniform_layouts.insert((stage, size), layout);
        self.uniform_groups.insert((stage, size), group);
    }

    fn ensure_samplers(&mut self, device: &wgpu::Device, count: u32) {
        if count == 0 || self.sampler_layouts.contains_key(&count) {
            return;
        }
        let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..count)
            .flat_map(|i| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * i,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * i + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cadence sampler bgl"),
            entries: &entries,
        });
        self.sampler_layouts.insert(count, layout);
    }
}
