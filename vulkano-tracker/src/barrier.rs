//! Barrier descriptors and the command stream they are recorded into.

use crate::{
    interval::{BufferInterval, ImageInterval},
    NonExhaustive, NE,
};
use ash::vk;
use smallvec::SmallVec;

/// Something that pipeline barrier commands can be recorded into.
///
/// [`ResourceTracker::flush`] records all of its queued barriers with a single call to
/// [`pipeline_barrier`].
///
/// [`ResourceTracker::flush`]: crate::ResourceTracker::flush
/// [`pipeline_barrier`]: Self::pipeline_barrier
pub trait CommandStream {
    /// Records one pipeline barrier command containing every barrier in `dependency_info`.
    fn pipeline_barrier(&mut self, dependency_info: &DependencyInfo<'_>);
}

impl<T: CommandStream + ?Sized> CommandStream for &mut T {
    #[inline]
    fn pipeline_barrier(&mut self, dependency_info: &DependencyInfo<'_>) {
        (**self).pipeline_barrier(dependency_info);
    }
}

/// A [`CommandStream`] that records into a Vulkan command buffer through `vkCmdPipelineBarrier2`.
#[derive(Clone, Copy)]
pub struct RawCommandStream<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
}

impl<'a> RawCommandStream<'a> {
    /// Creates a new `RawCommandStream` recording into `command_buffer`.
    ///
    /// # Safety
    ///
    /// - `command_buffer` must have been allocated from `device`.
    /// - `command_buffer` must be in the recording state whenever barriers are recorded into the
    ///   stream.
    /// - `device` must have been created with API version 1.3 or later, or with the
    ///   [`synchronization2`] feature enabled.
    /// - Every barrier recorded into the stream must refer to a buffer, image or range that is
    ///   valid to synchronize on `device`.
    ///
    /// [`synchronization2`]: vk::PhysicalDeviceSynchronization2Features
    #[inline]
    pub unsafe fn new(device: &'a ash::Device, command_buffer: vk::CommandBuffer) -> Self {
        RawCommandStream {
            device,
            command_buffer,
        }
    }

    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl CommandStream for RawCommandStream<'_> {
    fn pipeline_barrier(&mut self, dependency_info: &DependencyInfo<'_>) {
        if dependency_info.is_empty() {
            return;
        }

        let &DependencyInfo {
            dependency_flags,
            memory_barriers,
            buffer_memory_barriers,
            image_memory_barriers,
            _ne: _,
        } = dependency_info;

        let memory_barriers_vk: SmallVec<[_; 2]> =
            memory_barriers.iter().map(MemoryBarrier::to_vk).collect();
        let buffer_memory_barriers_vk: SmallVec<[_; 8]> = buffer_memory_barriers
            .iter()
            .map(BufferMemoryBarrier::to_vk)
            .collect();
        let image_memory_barriers_vk: SmallVec<[_; 8]> = image_memory_barriers
            .iter()
            .map(ImageMemoryBarrier::to_vk)
            .collect();

        let dependency_info_vk = vk::DependencyInfo::default()
            .dependency_flags(dependency_flags)
            .memory_barriers(&memory_barriers_vk)
            .buffer_memory_barriers(&buffer_memory_barriers_vk)
            .image_memory_barriers(&image_memory_barriers_vk);

        unsafe {
            self.device
                .cmd_pipeline_barrier2(self.command_buffer, &dependency_info_vk)
        };
    }
}

/// Dependency info for barriers in a pipeline barrier command.
///
/// A pipeline barrier creates a dependency between commands recorded before the barrier (the
/// source scope) and commands recorded after it (the destination scope). Each barrier has a set
/// of source/destination pipeline stages and source/destination memory access types. The
/// pipeline stages create an *execution dependency*, and the memory access types a *memory
/// dependency*: any `src_access` performed before the barrier is made available and visible to
/// any `dst_access` made after it.
#[derive(Clone, Debug)]
pub struct DependencyInfo<'a> {
    /// Flags to modify how the execution and memory dependencies are formed.
    ///
    /// The default value is empty.
    pub dependency_flags: vk::DependencyFlags,

    /// Memory barriers for global operations and accesses, not limited to a single resource.
    ///
    /// The default value is empty.
    pub memory_barriers: &'a [MemoryBarrier<'a>],

    /// Memory barriers for individual buffers.
    ///
    /// The default value is empty.
    pub buffer_memory_barriers: &'a [BufferMemoryBarrier<'a>],

    /// Memory barriers for individual images.
    ///
    /// The default value is empty.
    pub image_memory_barriers: &'a [ImageMemoryBarrier<'a>],

    pub _ne: NonExhaustive<'a>,
}

impl Default for DependencyInfo<'_> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyInfo<'_> {
    /// Returns a default `DependencyInfo`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            dependency_flags: vk::DependencyFlags::empty(),
            memory_barriers: &[],
            buffer_memory_barriers: &[],
            image_memory_barriers: &[],
            _ne: NE,
        }
    }

    /// Returns `true` if `self` doesn't contain any barriers.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.memory_barriers.is_empty()
            && self.buffer_memory_barriers.is_empty()
            && self.image_memory_barriers.is_empty()
    }

    /// Returns the total number of barriers in `self`.
    #[inline]
    pub const fn len(&self) -> usize {
        self.memory_barriers.len()
            + self.buffer_memory_barriers.len()
            + self.image_memory_barriers.len()
    }
}

/// A memory barrier that is applied globally.
///
/// Acceleration structures have no addressable range, so their hazards are resolved with these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryBarrier<'a> {
    /// The pipeline stages in the source scope to wait for.
    ///
    /// The default value is [`vk::PipelineStageFlags2::NONE`].
    pub src_stages: vk::PipelineStageFlags2,

    /// The memory accesses in the source scope to make available and visible.
    ///
    /// The default value is [`vk::AccessFlags2::NONE`].
    pub src_access: vk::AccessFlags2,

    /// The pipeline stages in the destination scope that must wait for `src_stages`.
    ///
    /// The default value is [`vk::PipelineStageFlags2::NONE`].
    pub dst_stages: vk::PipelineStageFlags2,

    /// The memory accesses in the destination scope that must wait for `src_access` to be made
    /// available and visible.
    ///
    /// The default value is [`vk::AccessFlags2::NONE`].
    pub dst_access: vk::AccessFlags2,

    pub _ne: NonExhaustive<'a>,
}

impl Default for MemoryBarrier<'_> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBarrier<'_> {
    /// Returns a default `MemoryBarrier`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            src_stages: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stages: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            _ne: NE,
        }
    }

    pub fn to_vk(&self) -> vk::MemoryBarrier2<'static> {
        let &Self {
            src_stages,
            src_access,
            dst_stages,
            dst_access,
            _ne: _,
        } = self;

        vk::MemoryBarrier2::default()
            .src_stage_mask(src_stages)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stages)
            .dst_access_mask(dst_access)
    }
}

/// A memory barrier that is applied to a single buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferMemoryBarrier<'a> {
    /// The pipeline stages in the source scope to wait for.
    ///
    /// The default value is [`vk::PipelineStageFlags2::NONE`].
    pub src_stages: vk::PipelineStageFlags2,

    /// The memory accesses in the source scope to make available and visible.
    ///
    /// The default value is [`vk::AccessFlags2::NONE`].
    pub src_access: vk::AccessFlags2,

    /// The pipeline stages in the destination scope that must wait for `src_stages`.
    ///
    /// The default value is [`vk::PipelineStageFlags2::NONE`].
    pub dst_stages: vk::PipelineStageFlags2,

    /// The memory accesses in the destination scope that must wait for `src_access` to be made
    /// available and visible.
    ///
    /// The default value is [`vk::AccessFlags2::NONE`].
    pub dst_access: vk::AccessFlags2,

    /// The buffer to apply the barrier to.
    ///
    /// The default value is a null handle, which must be overridden.
    pub buffer: vk::Buffer,

    /// The byte range of `buffer` to apply the barrier to. A range reaching
    /// [`DeviceSize::MAX`](crate::DeviceSize) is recorded as [`vk::WHOLE_SIZE`].
    ///
    /// The default value is empty, which must be overridden.
    pub range: BufferInterval,

    pub _ne: NonExhaustive<'a>,
}

impl Default for BufferMemoryBarrier<'_> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl BufferMemoryBarrier<'_> {
    /// Returns a default `BufferMemoryBarrier`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            src_stages: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stages: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            buffer: vk::Buffer::null(),
            range: BufferInterval::new(0, 0),
            _ne: NE,
        }
    }

    pub fn to_vk(&self) -> vk::BufferMemoryBarrier2<'static> {
        let &Self {
            src_stages,
            src_access,
            dst_stages,
            dst_access,
            buffer,
            range,
            _ne: _,
        } = self;

        let size = if range.end() == crate::DeviceSize::MAX {
            vk::WHOLE_SIZE
        } else {
            range.size()
        };

        vk::BufferMemoryBarrier2::default()
            .src_stage_mask(src_stages)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stages)
            .dst_access_mask(dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer)
            .offset(range.offset())
            .size(size)
    }
}

/// A memory barrier that is applied to a single image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageMemoryBarrier<'a> {
    /// The pipeline stages in the source scope to wait for.
    ///
    /// The default value is [`vk::PipelineStageFlags2::NONE`].
    pub src_stages: vk::PipelineStageFlags2,

    /// The memory accesses in the source scope to make available and visible.
    ///
    /// The default value is [`vk::AccessFlags2::NONE`].
    pub src_access: vk::AccessFlags2,

    /// The pipeline stages in the destination scope that must wait for `src_stages`.
    ///
    /// The default value is [`vk::PipelineStageFlags2::NONE`].
    pub dst_stages: vk::PipelineStageFlags2,

    /// The memory accesses in the destination scope that must wait for `src_access` to be made
    /// available and visible.
    ///
    /// The default value is [`vk::AccessFlags2::NONE`].
    pub dst_access: vk::AccessFlags2,

    /// The layout that the specified `subresource_range` of `image` is expected to be in when the
    /// source scope completes.
    ///
    /// The default value is [`vk::ImageLayout::UNDEFINED`].
    pub old_layout: vk::ImageLayout,

    /// The layout that the specified `subresource_range` of `image` will be transitioned to
    /// before the destination scope begins.
    ///
    /// The default value is [`vk::ImageLayout::UNDEFINED`].
    pub new_layout: vk::ImageLayout,

    /// The image to apply the barrier to.
    ///
    /// The default value is a null handle, which must be overridden.
    pub image: vk::Image,

    /// The subresource range of `image` to apply the barrier to.
    ///
    /// The default value is empty, which must be overridden.
    pub subresource_range: ImageInterval,

    pub _ne: NonExhaustive<'a>,
}

impl Default for ImageMemoryBarrier<'_> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ImageMemoryBarrier<'_> {
    /// Returns a default `ImageMemoryBarrier`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            src_stages: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stages: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::UNDEFINED,
            image: vk::Image::null(),
            subresource_range: ImageInterval::from_counts(vk::ImageAspectFlags::empty(), 0, 0, 0, 0),
            _ne: NE,
        }
    }

    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        let &Self {
            src_stages,
            src_access,
            dst_stages,
            dst_access,
            old_layout,
            new_layout,
            image,
            ref subresource_range,
            _ne: _,
        } = self;

        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src_stages)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stages)
            .dst_access_mask(dst_access)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range.to_vk())
    }
}
