//! The states resources can be in, and the rules that decide when moving between two states needs
//! a barrier.

use crate::{
    interval::{BufferInterval, ImageInterval, Interval},
    ValidationError,
};
use ash::vk;

/// Every access flag that denotes a write to memory. Any other flag is a read.
pub(crate) const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_WRITE.as_raw()
        | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags2::HOST_WRITE.as_raw()
        | vk::AccessFlags2::MEMORY_WRITE.as_raw()
        | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw()
        | vk::AccessFlags2::TRANSFORM_FEEDBACK_WRITE_EXT.as_raw()
        | vk::AccessFlags2::TRANSFORM_FEEDBACK_COUNTER_WRITE_EXT.as_raw()
        | vk::AccessFlags2::VIDEO_DECODE_WRITE_KHR.as_raw()
        | vk::AccessFlags2::VIDEO_ENCODE_WRITE_KHR.as_raw()
        | vk::AccessFlags2::COMMAND_PREPROCESS_WRITE_NV.as_raw()
        | vk::AccessFlags2::MICROMAP_WRITE_EXT.as_raw()
        | vk::AccessFlags2::OPTICAL_FLOW_WRITE_NV.as_raw(),
);

/// The state of a region of some resource, as given to [`ResourceTracker::track`] and
/// [`ResourceTracker::request`].
///
/// [`ResourceTracker::track`]: crate::ResourceTracker::track
/// [`ResourceTracker::request`]: crate::ResourceTracker::request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Image(ImageState),
    Buffer(BufferState),
    AccelerationStructure(AccelerationStructureState),
}

impl ResourceState {
    /// Returns `true` if the state covers no part of its resource.
    #[inline]
    pub fn is_empty(&self) -> bool {
        match self {
            ResourceState::Image(state) => state.subresource_range.is_empty(),
            ResourceState::Buffer(state) => state.range.is_empty(),
            ResourceState::AccelerationStructure(_) => false,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        match self {
            ResourceState::Image(state) => state.validate().map_err(|err| err.add_context("image")),
            ResourceState::Buffer(state) => {
                state.validate().map_err(|err| err.add_context("buffer"))
            }
            ResourceState::AccelerationStructure(state) => state
                .validate()
                .map_err(|err| err.add_context("acceleration_structure")),
        }
    }
}

impl From<ImageState> for ResourceState {
    #[inline]
    fn from(state: ImageState) -> Self {
        ResourceState::Image(state)
    }
}

impl From<BufferState> for ResourceState {
    #[inline]
    fn from(state: BufferState) -> Self {
        ResourceState::Buffer(state)
    }
}

impl From<AccelerationStructureState> for ResourceState {
    #[inline]
    fn from(state: AccelerationStructureState) -> Self {
        ResourceState::AccelerationStructure(state)
    }
}

/// The state of a range of subresources of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageState {
    pub image: vk::Image,

    /// The aspects, mip levels and array layers this state applies to.
    pub subresource_range: ImageInterval,

    pub layout: vk::ImageLayout,

    /// The pipeline stages that access the subresources.
    pub stages: vk::PipelineStageFlags2,

    /// The kinds of memory access performed by `stages`.
    pub access: vk::AccessFlags2,
}

impl ImageState {
    fn validate(&self) -> Result<(), Box<ValidationError>> {
        validate_scope(self.stages, self.access)
    }

    #[inline]
    pub(crate) fn access_state(&self) -> ImageAccessState {
        ImageAccessState {
            layout: self.layout,
            scope: AccessScope::new(self.stages, self.access),
        }
    }
}

/// The state of a byte range of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferState {
    pub buffer: vk::Buffer,

    /// The bytes this state applies to.
    pub range: BufferInterval,

    /// The pipeline stages that access the bytes.
    pub stages: vk::PipelineStageFlags2,

    /// The kinds of memory access performed by `stages`.
    pub access: vk::AccessFlags2,
}

impl BufferState {
    fn validate(&self) -> Result<(), Box<ValidationError>> {
        validate_scope(self.stages, self.access)
    }

    #[inline]
    pub(crate) fn scope(&self) -> AccessScope {
        AccessScope::new(self.stages, self.access)
    }
}

/// The state of a whole acceleration structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccelerationStructureState {
    pub acceleration_structure: vk::AccelerationStructureKHR,

    /// The pipeline stages that access the acceleration structure.
    pub stages: vk::PipelineStageFlags2,

    /// The kinds of memory access performed by `stages`.
    pub access: vk::AccessFlags2,
}

impl AccelerationStructureState {
    fn validate(&self) -> Result<(), Box<ValidationError>> {
        validate_scope(self.stages, self.access)
    }

    #[inline]
    pub(crate) fn scope(&self) -> AccessScope {
        AccessScope::new(self.stages, self.access)
    }
}

fn validate_scope(
    stages: vk::PipelineStageFlags2,
    access: vk::AccessFlags2,
) -> Result<(), Box<ValidationError>> {
    if !access.is_empty() && stages.is_empty() {
        return Err(Box::new(ValidationError {
            context: "stages".into(),
            problem: "is empty, but `access` is not".into(),
            ..Default::default()
        }));
    }

    Ok(())
}

/// The pipeline stages and memory accesses that last touched a region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessScope {
    pub stages: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl AccessScope {
    /// The scope used for regions whose history is unknown and must be assumed to be anything.
    pub(crate) const UNKNOWN: Self = AccessScope {
        stages: vk::PipelineStageFlags2::ALL_COMMANDS,
        access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::MEMORY_READ.as_raw() | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
        ),
    };

    #[inline]
    pub const fn new(stages: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        AccessScope { stages, access }
    }

    #[inline]
    pub fn contains_write(&self) -> bool {
        self.access.intersects(WRITE_ACCESS)
    }

    /// Returns whether accessing the region with `next` after `self` needs a barrier.
    ///
    /// Read-after-read never does. Any other combination does, except that repeating the exact
    /// same scope only needs one if `repeated_write_barriers` is set and the scope writes.
    pub fn needs_barrier_before(&self, next: &AccessScope, repeated_write_barriers: bool) -> bool {
        if self == next {
            return repeated_write_barriers && self.contains_write();
        }

        self.contains_write() || next.contains_write()
    }

    /// Returns the scope to record after accessing the region with `next`.
    ///
    /// Reads that follow reads without a barrier in between are accumulated, so that a later
    /// write waits for all of them.
    pub fn then(&self, next: &AccessScope) -> AccessScope {
        if self.contains_write() || next.contains_write() {
            *next
        } else {
            AccessScope {
                stages: self.stages | next.stages,
                access: self.access | next.access,
            }
        }
    }
}

/// The layout and scope that last touched a range of image subresources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageAccessState {
    pub layout: vk::ImageLayout,
    pub scope: AccessScope,
}

impl ImageAccessState {
    /// The state of subresources that the tracker has never seen.
    pub(crate) const UNDEFINED: Self = ImageAccessState {
        layout: vk::ImageLayout::UNDEFINED,
        scope: AccessScope::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE),
    };

    /// Returns whether accessing the subresources with `next` after `self` needs a barrier.
    ///
    /// Unlike with buffers, any change of layout or scope needs one, and so does every use of
    /// subresources whose layout is `UNDEFINED`.
    pub fn needs_barrier_before(
        &self,
        next: &ImageAccessState,
        repeated_write_barriers: bool,
    ) -> bool {
        if self.layout == vk::ImageLayout::UNDEFINED
            || self.layout != next.layout
            || self.scope != next.scope
        {
            return true;
        }

        repeated_write_barriers && self.scope.contains_write()
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessScope, ImageAccessState, ResourceState, WRITE_ACCESS};
    use crate::{interval::BufferInterval, state::BufferState};
    use ash::vk;

    const TRANSFER_WRITE: AccessScope = AccessScope::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
    );
    const VERTEX_READ: AccessScope = AccessScope::new(
        vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
        vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
    );
    const FRAGMENT_READ: AccessScope = AccessScope::new(
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::AccessFlags2::SHADER_SAMPLED_READ,
    );

    #[test]
    fn write_classification() {
        assert!(TRANSFER_WRITE.contains_write());
        assert!(!VERTEX_READ.contains_write());
        assert!(AccessScope::UNKNOWN.contains_write());
        assert!(!WRITE_ACCESS.intersects(
            vk::AccessFlags2::SHADER_READ
                | vk::AccessFlags2::MEMORY_READ
                | vk::AccessFlags2::TRANSFER_READ
                | vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR
        ));
    }

    #[test]
    fn buffer_hazards() {
        // Read after write.
        assert!(TRANSFER_WRITE.needs_barrier_before(&VERTEX_READ, false));
        // Write after read.
        assert!(VERTEX_READ.needs_barrier_before(&TRANSFER_WRITE, false));
        // Write after write.
        let compute_write = AccessScope::new(
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_WRITE,
        );
        assert!(TRANSFER_WRITE.needs_barrier_before(&compute_write, false));
        // Read after read.
        assert!(!VERTEX_READ.needs_barrier_before(&FRAGMENT_READ, false));
        assert!(!VERTEX_READ.needs_barrier_before(&VERTEX_READ, true));
    }

    #[test]
    fn repeated_writes() {
        assert!(!TRANSFER_WRITE.needs_barrier_before(&TRANSFER_WRITE, false));
        assert!(TRANSFER_WRITE.needs_barrier_before(&TRANSFER_WRITE, true));
    }

    #[test]
    fn reads_accumulate() {
        let both = VERTEX_READ.then(&FRAGMENT_READ);
        assert_eq!(
            both.stages,
            vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT
                | vk::PipelineStageFlags2::FRAGMENT_SHADER,
        );
        assert_eq!(VERTEX_READ.then(&TRANSFER_WRITE), TRANSFER_WRITE);
        assert_eq!(TRANSFER_WRITE.then(&VERTEX_READ), VERTEX_READ);
    }

    #[test]
    fn image_transitions() {
        let color_write = ImageAccessState {
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            scope: AccessScope::new(
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            ),
        };
        let sampled = ImageAccessState {
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            scope: FRAGMENT_READ,
        };
        let sampled_in_vertex = ImageAccessState {
            scope: AccessScope::new(
                vk::PipelineStageFlags2::VERTEX_SHADER,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
            ),
            ..sampled
        };

        assert!(ImageAccessState::UNDEFINED.needs_barrier_before(&color_write, false));
        assert!(color_write.needs_barrier_before(&sampled, false));
        assert!(sampled.needs_barrier_before(&sampled_in_vertex, false));
        assert!(!sampled.needs_barrier_before(&sampled, true));
        assert!(!color_write.needs_barrier_before(&color_write, false));
        assert!(color_write.needs_barrier_before(&color_write, true));

        let discarded = ImageAccessState {
            layout: vk::ImageLayout::UNDEFINED,
            ..sampled
        };
        assert!(discarded.needs_barrier_before(&sampled, false));
    }

    #[test]
    fn validation() {
        let state = ResourceState::from(BufferState {
            buffer: vk::Buffer::null(),
            range: BufferInterval::new(0, 16),
            stages: vk::PipelineStageFlags2::NONE,
            access: vk::AccessFlags2::SHADER_READ,
        });

        let err = state.validate().unwrap_err();
        assert_eq!(err.context, "buffer.stages");

        let state = ResourceState::from(BufferState {
            buffer: vk::Buffer::null(),
            range: BufferInterval::new(0, 16),
            stages: vk::PipelineStageFlags2::NONE,
            access: vk::AccessFlags2::NONE,
        });

        assert!(state.validate().is_ok());
    }
}
