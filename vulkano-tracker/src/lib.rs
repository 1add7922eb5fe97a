//! Sub-resource state tracking and pipeline barrier batching.
//!
//! A [`ResourceTracker`] remembers, for every buffer byte range, image subresource range and
//! acceleration structure it has been told about, which pipeline stages and memory accesses last
//! touched it (and, for images, which layout it is in). Before recording work on the device, the
//! user [requests] the state each resource needs to be in. The tracker compares the request
//! against what it knows, queues the minimal set of barriers that make the request safe, and
//! records them all at once with a single pipeline barrier command when [flushed].
//!
//! # Hazards
//!
//! Two accesses to overlapping memory need to be ordered unless they are both reads:
//!
//! - *write-after-write*: the second write must not land before the first.
//! - *write-after-read*: the write must not clobber data that is still being read.
//! - *read-after-write*: the read must see the written data.
//!
//! Images additionally need a barrier whenever their layout changes, which includes the first
//! use of an image whose contents are undefined.
//!
//! # Granularity
//!
//! Buffers are tracked per byte range ([`BufferInterval`]), images per aspect, mip level and
//! array layer ([`ImageInterval`]), and acceleration structures as a whole. A request that spans
//! several differently-tracked pieces produces one barrier per piece that needs one, scoped to
//! exactly that piece.
//!
//! # Threading
//!
//! A tracker is meant to be owned by a single recording thread. Independent trackers never
//! interact with each other, and nothing in this crate holds global state.
//!
//! [requests]: ResourceTracker::request
//! [flushed]: ResourceTracker::flush

pub use ash::vk::DeviceSize;
pub use barrier::{
    BufferMemoryBarrier, CommandStream, DependencyInfo, ImageMemoryBarrier, MemoryBarrier,
    RawCommandStream,
};
pub use interval::{BufferInterval, ImageInterval, Interval};
pub use interval_set::IntervalSet;
pub use state::{
    AccelerationStructureState, AccessScope, BufferState, ImageAccessState, ImageState,
    ResourceState,
};
use std::{borrow::Cow, error::Error, fmt, marker::PhantomData};
pub use tracker::{ResourceTracker, ResourceTrackerCreateInfo, UnknownAccessPolicy};

pub mod barrier;
pub mod interval;
pub mod interval_set;
pub mod state;
pub mod tracker;

/// The arguments or other context of a call to a tracker function were not valid.
#[derive(Clone, Debug, Default)]
pub struct ValidationError {
    /// The context in which the problem exists (e.g. a specific parameter).
    pub context: Cow<'static, str>,

    /// A description of the problem.
    pub problem: Cow<'static, str>,

    /// Valid Usage IDs (VUIDs) in the Vulkan specification that relate to the problem.
    pub vuids: &'static [&'static str],
}

impl ValidationError {
    pub(crate) fn add_context(
        mut self: Box<Self>,
        context: impl Into<Cow<'static, str>>,
    ) -> Box<Self> {
        if self.context.is_empty() {
            self.context = context.into();
        } else {
            self.context = format!("{}.{}", context.into(), self.context).into();
        }

        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}", self.problem)?;
        } else {
            write!(f, "{}: {}", self.context, self.problem)?;
        }

        if !self.vuids.is_empty() {
            write!(f, "\n\nVulkan VUIDs:")?;

            for vuid in self.vuids {
                write!(f, "\n    {}", vuid)?;
            }
        }

        Ok(())
    }
}

impl Error for ValidationError {}

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside this crate. Structures with a field of this type can
/// only be constructed by calling a constructor function or `Default::default()`. The effect is
/// similar to the standard Rust `#[non_exhaustive]` attribute, except that it does not prevent
/// update syntax from being used.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NonExhaustive<'a>(PhantomData<&'a ()>);

impl fmt::Debug for NonExhaustive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("NonExhaustive")
    }
}

const NE: NonExhaustive<'static> = NonExhaustive(PhantomData);
