//! The resource tracker.
//!
//! For every handle it knows about, the tracker keeps a list of *buckets*. Each bucket pairs an
//! [`IntervalSet`] with the state that the regions in that set were last recorded in. The
//! buckets of one handle partition the regions the tracker has an opinion about: no two of them
//! share any byte, or any aspect of any subresource. Regions that are in no bucket are
//! untracked.

use crate::{
    barrier::{
        BufferMemoryBarrier, CommandStream, DependencyInfo, ImageMemoryBarrier, MemoryBarrier,
    },
    interval::{BufferInterval, ImageInterval, Interval},
    interval_set::IntervalSet,
    state::{
        AccelerationStructureState, AccessScope, BufferState, ImageAccessState, ImageState,
        ResourceState,
    },
    NonExhaustive, ValidationError, NE,
};
use ash::vk;
use foldhash::HashMap;
use log::{debug, trace};
use smallvec::SmallVec;

/// Tracks the state of buffers, images and acceleration structures, and computes the barriers
/// needed to move them between states.
///
/// The tracker only ever sees opaque handles. It has no way of knowing when a resource is
/// destroyed, so before a handle value is reused for a different resource, the old entries must
/// be dropped with [`forget_image`], [`forget_buffer`] or [`forget_acceleration_structure`].
///
/// Image ranges whose mip levels or array layers extend to `u32::MAX` stand for "every remaining
/// mip level or array layer". If such ranges are mixed with ranges that have explicit counts on
/// the same image, the image's extent must be declared with [`set_image_extent`], otherwise the
/// parts of the sentinel ranges that lie past the explicit ones end up in barriers of their own.
///
/// [`forget_image`]: Self::forget_image
/// [`forget_buffer`]: Self::forget_buffer
/// [`forget_acceleration_structure`]: Self::forget_acceleration_structure
/// [`set_image_extent`]: Self::set_image_extent
#[derive(Debug)]
pub struct ResourceTracker {
    images: HashMap<vk::Image, Vec<Bucket<ImageInterval, ImageAccessState>>>,
    image_extents: HashMap<vk::Image, ImageExtent>,
    buffers: HashMap<vk::Buffer, Vec<Bucket<BufferInterval, AccessScope>>>,
    acceleration_structures: HashMap<vk::AccelerationStructureKHR, AccessScope>,

    image_barriers: Vec<ImageMemoryBarrier<'static>>,
    buffer_barriers: Vec<BufferMemoryBarrier<'static>>,
    memory_barriers: Vec<MemoryBarrier<'static>>,

    dependency_flags: vk::DependencyFlags,
    unknown_buffer_access: UnknownAccessPolicy,
    unknown_acceleration_structure_access: UnknownAccessPolicy,
    repeated_write_barriers: bool,
    accumulate_reads: bool,
}

#[derive(Debug)]
struct Bucket<I, S> {
    intervals: IntervalSet<I>,
    state: S,
}

#[derive(Clone, Copy, Debug)]
struct ImageExtent {
    mip_levels: u32,
    array_layers: u32,
}

impl ResourceTracker {
    /// Creates a new `ResourceTracker` that doesn't know about any resource.
    pub fn new(create_info: ResourceTrackerCreateInfo) -> Self {
        let ResourceTrackerCreateInfo {
            dependency_flags,
            unknown_buffer_access,
            unknown_acceleration_structure_access,
            repeated_write_barriers,
            accumulate_reads,
            _ne: _,
        } = create_info;

        ResourceTracker {
            images: HashMap::default(),
            image_extents: HashMap::default(),
            buffers: HashMap::default(),
            acceleration_structures: HashMap::default(),
            image_barriers: Vec::new(),
            buffer_barriers: Vec::new(),
            memory_barriers: Vec::new(),
            dependency_flags,
            unknown_buffer_access,
            unknown_acceleration_structure_access,
            repeated_write_barriers,
            accumulate_reads,
        }
    }

    /// Declares how many mip levels and array layers `image` has.
    ///
    /// From then on, the subresource ranges given for `image` are clamped to its extent, and
    /// ranges with explicit counts that go past it are rejected. Whatever was already recorded
    /// past the extent is dropped.
    pub fn set_image_extent(
        &mut self,
        image: vk::Image,
        mip_levels: u32,
        array_layers: u32,
    ) -> Result<(), Box<ValidationError>> {
        Self::validate_set_image_extent(mip_levels, array_layers)?;

        unsafe { self.set_image_extent_unchecked(image, mip_levels, array_layers) };

        Ok(())
    }

    fn validate_set_image_extent(
        mip_levels: u32,
        array_layers: u32,
    ) -> Result<(), Box<ValidationError>> {
        if mip_levels == 0 {
            return Err(Box::new(ValidationError {
                context: "mip_levels".into(),
                problem: "is zero".into(),
                vuids: &["VUID-VkImageCreateInfo-mipLevels-00947"],
            }));
        }

        if array_layers == 0 {
            return Err(Box::new(ValidationError {
                context: "array_layers".into(),
                problem: "is zero".into(),
                vuids: &["VUID-VkImageCreateInfo-arrayLayers-00948"],
            }));
        }

        Ok(())
    }

    /// # Safety
    ///
    /// - `mip_levels` and `array_layers` must not be zero.
    pub unsafe fn set_image_extent_unchecked(
        &mut self,
        image: vk::Image,
        mip_levels: u32,
        array_layers: u32,
    ) {
        trace!(
            "setting the extent of {:?} to {} mip levels and {} array layers",
            image,
            mip_levels,
            array_layers,
        );
        self.image_extents.insert(
            image,
            ImageExtent {
                mip_levels,
                array_layers,
            },
        );

        if let Some(buckets) = self.images.get_mut(&image) {
            for bucket in buckets.iter_mut() {
                bucket.intervals = bucket
                    .intervals
                    .iter()
                    .map(|interval| interval.clamped(mip_levels, array_layers))
                    .collect();
            }

            buckets.retain(|bucket| !bucket.intervals.is_empty());

            if cfg!(debug_assertions) {
                assert_partition(buckets);
            }
        }
    }

    /// Records that a region of a resource is in `state`, regardless of what was recorded for it
    /// before. No barrier is queued.
    ///
    /// This is meant for seeding the state of newly created resources, and for transitions that
    /// happen outside of the tracker's knowledge.
    pub fn track(&mut self, state: impl Into<ResourceState>) -> Result<(), Box<ValidationError>> {
        let state = state.into();
        self.validate_track(&state)?;

        unsafe { self.track_unchecked(state) };

        Ok(())
    }

    fn validate_track(&self, state: &ResourceState) -> Result<(), Box<ValidationError>> {
        state.validate().map_err(|err| err.add_context("state"))?;

        if let ResourceState::Image(state) = state {
            self.validate_image_range(state)?;
        }

        Ok(())
    }

    fn validate_image_range(&self, state: &ImageState) -> Result<(), Box<ValidationError>> {
        let range = &state.subresource_range;

        let Some(extent) = self.image_extents.get(&state.image) else {
            return Ok(());
        };

        if range.is_empty() {
            return Ok(());
        }

        if range.base_mip_level() >= extent.mip_levels {
            return Err(Box::new(ValidationError {
                context: "state.image.subresource_range.base_mip_level".into(),
                problem: "is not less than the number of mip levels of the image".into(),
                vuids: &["VUID-VkImageMemoryBarrier2-subresourceRange-01486"],
            }));
        }

        let mip_end = range.mip_levels().end;

        if mip_end != u32::MAX && mip_end > extent.mip_levels {
            return Err(Box::new(ValidationError {
                context: "state.image.subresource_range".into(),
                problem: "`base_mip_level + level_count` is greater than the number of mip \
                    levels of the image"
                    .into(),
                vuids: &["VUID-VkImageMemoryBarrier2-subresourceRange-01724"],
            }));
        }

        if range.base_array_layer() >= extent.array_layers {
            return Err(Box::new(ValidationError {
                context: "state.image.subresource_range.base_array_layer".into(),
                problem: "is not less than the number of array layers of the image".into(),
                vuids: &["VUID-VkImageMemoryBarrier2-subresourceRange-01488"],
            }));
        }

        let layer_end = range.array_layers().end;

        if layer_end != u32::MAX && layer_end > extent.array_layers {
            return Err(Box::new(ValidationError {
                context: "state.image.subresource_range".into(),
                problem: "`base_array_layer + layer_count` is greater than the number of array \
                    layers of the image"
                    .into(),
                vuids: &["VUID-VkImageMemoryBarrier2-subresourceRange-01725"],
            }));
        }

        Ok(())
    }

    /// Returns `range` clamped to the extent of `image`, if it is known.
    fn clamp_image_range(&self, image: vk::Image, range: ImageInterval) -> ImageInterval {
        match self.image_extents.get(&image) {
            Some(extent) => range.clamped(extent.mip_levels, extent.array_layers),
            None => range,
        }
    }

    /// # Safety
    ///
    /// - `state` must be valid: if its access set is not empty, its stage set must not be empty
    ///   either.
    pub unsafe fn track_unchecked(&mut self, state: impl Into<ResourceState>) {
        let state = state.into();

        if state.is_empty() {
            return;
        }

        match state {
            ResourceState::Image(state) => {
                let range = self.clamp_image_range(state.image, state.subresource_range);

                if range.is_empty() {
                    return;
                }

                let buckets = self.images.entry(state.image).or_default();
                let next = state.access_state();
                trace!("tracking {:?} {:?} as {:?}", state.image, range, next);
                assign(buckets, range, next);
            }
            ResourceState::Buffer(state) => {
                let buckets = self.buffers.entry(state.buffer).or_default();
                let next = state.scope();
                trace!("tracking {:?} {:?} as {:?}", state.buffer, state.range, next);
                assign(buckets, state.range, next);
            }
            ResourceState::AccelerationStructure(state) => {
                let next = state.scope();
                trace!("tracking {:?} as {:?}", state.acceleration_structure, next);
                self.acceleration_structures
                    .insert(state.acceleration_structure, next);
            }
        }
    }

    /// Declares that, from this point on, a region of a resource will be accessed as described by
    /// `state`. The barriers needed to make that access safe are queued, and the region is
    /// recorded as being in `state` afterwards.
    ///
    /// Requesting the same region twice without an access in between compares the second
    /// request against the first, so callers should request each resource once per
    /// synchronization point.
    pub fn request(
        &mut self,
        state: impl Into<ResourceState>,
    ) -> Result<(), Box<ValidationError>> {
        let state = state.into();
        self.validate_request(&state)?;

        unsafe { self.request_unchecked(state) };

        Ok(())
    }

    fn validate_request(&self, state: &ResourceState) -> Result<(), Box<ValidationError>> {
        state.validate().map_err(|err| err.add_context("state"))?;

        if let ResourceState::Image(state) = state {
            self.validate_image_range(state)?;

            if state.layout == vk::ImageLayout::UNDEFINED
                || state.layout == vk::ImageLayout::PREINITIALIZED
            {
                return Err(Box::new(ValidationError {
                    context: "state.image.layout".into(),
                    problem: "is `vk::ImageLayout::UNDEFINED` or \
                        `vk::ImageLayout::PREINITIALIZED`"
                        .into(),
                    vuids: &["VUID-VkImageMemoryBarrier2-newLayout-01198"],
                }));
            }
        }

        Ok(())
    }

    /// # Safety
    ///
    /// - `state` must be valid: if its access set is not empty, its stage set must not be empty
    ///   either.
    /// - If `state` is an image state, its layout must not be `vk::ImageLayout::UNDEFINED` or
    ///   `vk::ImageLayout::PREINITIALIZED`.
    pub unsafe fn request_unchecked(&mut self, state: impl Into<ResourceState>) {
        let state = state.into();

        if state.is_empty() {
            return;
        }

        match state {
            ResourceState::Image(state) => self.request_image(&state),
            ResourceState::Buffer(state) => self.request_buffer(&state),
            ResourceState::AccelerationStructure(state) => {
                self.request_acceleration_structure(&state)
            }
        }
    }

    fn request_image(&mut self, state: &ImageState) {
        let range = self.clamp_image_range(state.image, state.subresource_range);

        if range.is_empty() {
            return;
        }

        let next = state.access_state();
        let buckets = self.images.entry(state.image).or_default();
        let (recorded, uncovered) = split_by_state(buckets, &range);

        let untracked = uncovered.iter().map(|&piece| (piece, ImageAccessState::UNDEFINED));

        for (piece, prev) in recorded.into_iter().chain(untracked) {
            // Subresources the tracker has never seen are in an undefined layout and always need
            // a transition.
            if !prev.needs_barrier_before(&next, self.repeated_write_barriers) {
                continue;
            }

            let barrier = ImageMemoryBarrier {
                src_stages: prev.scope.stages,
                src_access: prev.scope.access,
                dst_stages: next.scope.stages,
                dst_access: next.scope.access,
                old_layout: prev.layout,
                new_layout: next.layout,
                image: state.image,
                subresource_range: piece,
                _ne: NE,
            };
            trace!("queueing image barrier {:?}", barrier);
            self.image_barriers.push(barrier);
        }

        trace!("recording {:?} {:?} as {:?}", state.image, range, next);
        assign(buckets, range, next);
    }

    fn request_buffer(&mut self, state: &BufferState) {
        let next = state.scope();
        let buckets = self.buffers.entry(state.buffer).or_default();
        let (recorded, uncovered) = split_by_state(buckets, &state.range);
        let mut updates: SmallVec<[(BufferInterval, AccessScope); 4]> = SmallVec::new();

        for (piece, prev) in recorded {
            if prev.needs_barrier_before(&next, self.repeated_write_barriers) {
                let barrier = buffer_barrier(state.buffer, piece, &prev, &next);
                trace!("queueing buffer barrier {:?}", barrier);
                self.buffer_barriers.push(barrier);
            }

            let after = if self.accumulate_reads {
                prev.then(&next)
            } else {
                next
            };
            updates.push((piece, after));
        }

        for &piece in &uncovered {
            if self.unknown_buffer_access == UnknownAccessPolicy::FullBarrier {
                let barrier = buffer_barrier(state.buffer, piece, &AccessScope::UNKNOWN, &next);
                trace!("queueing buffer barrier {:?}", barrier);
                self.buffer_barriers.push(barrier);
            }

            updates.push((piece, next));
        }

        for (piece, scope) in updates {
            trace!("recording {:?} {:?} as {:?}", state.buffer, piece, scope);
            assign(buckets, piece, scope);
        }
    }

    fn request_acceleration_structure(&mut self, state: &AccelerationStructureState) {
        let next = state.scope();
        let prev = self
            .acceleration_structures
            .get(&state.acceleration_structure)
            .copied();

        let src = match prev {
            Some(prev) if prev.needs_barrier_before(&next, self.repeated_write_barriers) => {
                Some(prev)
            }
            Some(_) => None,
            None => (self.unknown_acceleration_structure_access
                == UnknownAccessPolicy::FullBarrier)
                .then_some(AccessScope::UNKNOWN),
        };

        if let Some(src) = src {
            let barrier = MemoryBarrier {
                src_stages: src.stages,
                src_access: src.access,
                dst_stages: next.stages,
                dst_access: next.access,
                _ne: NE,
            };
            trace!(
                "queueing memory barrier for {:?} {:?}",
                state.acceleration_structure,
                barrier,
            );
            self.memory_barriers.push(barrier);
        }

        let after = match prev {
            Some(prev) if self.accumulate_reads => prev.then(&next),
            _ => next,
        };
        trace!(
            "recording {:?} as {:?}",
            state.acceleration_structure,
            after,
        );
        self.acceleration_structures
            .insert(state.acceleration_structure, after);
    }

    /// Records all queued barriers into `stream` with a single pipeline barrier command, then
    /// clears the queue. Does nothing if no barriers are queued.
    pub fn flush<S: CommandStream + ?Sized>(&mut self, stream: &mut S) {
        if !self.has_pending() {
            return;
        }

        debug!(
            "flushing {} image, {} buffer and {} memory barriers",
            self.image_barriers.len(),
            self.buffer_barriers.len(),
            self.memory_barriers.len(),
        );

        stream.pipeline_barrier(&self.pending());

        self.image_barriers.clear();
        self.buffer_barriers.clear();
        self.memory_barriers.clear();
    }

    /// Returns the barriers that are queued for the next [`flush`](Self::flush).
    #[inline]
    pub fn pending(&self) -> DependencyInfo<'_> {
        DependencyInfo {
            dependency_flags: self.dependency_flags,
            memory_barriers: &self.memory_barriers,
            buffer_memory_barriers: &self.buffer_barriers,
            image_memory_barriers: &self.image_barriers,
            _ne: NE,
        }
    }

    /// Returns `true` if any barriers are queued.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending().is_empty()
    }

    /// Returns the recorded states of the subresources of `image`.
    pub fn image_states(
        &self,
        image: vk::Image,
    ) -> impl Iterator<Item = (ImageInterval, ImageAccessState)> + '_ {
        self.images
            .get(&image)
            .into_iter()
            .flatten()
            .flat_map(Bucket::entries)
    }

    /// Returns the recorded states of the byte ranges of `buffer`.
    pub fn buffer_states(
        &self,
        buffer: vk::Buffer,
    ) -> impl Iterator<Item = (BufferInterval, AccessScope)> + '_ {
        self.buffers
            .get(&buffer)
            .into_iter()
            .flatten()
            .flat_map(Bucket::entries)
    }

    /// Returns the recorded state of `acceleration_structure`.
    #[inline]
    pub fn acceleration_structure_state(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> Option<AccessScope> {
        self.acceleration_structures
            .get(&acceleration_structure)
            .copied()
    }

    /// Drops everything recorded about `image`, including its extent.
    #[inline]
    pub fn forget_image(&mut self, image: vk::Image) {
        self.images.remove(&image);
        self.image_extents.remove(&image);
    }

    /// Drops everything recorded about `buffer`.
    #[inline]
    pub fn forget_buffer(&mut self, buffer: vk::Buffer) {
        self.buffers.remove(&buffer);
    }

    /// Drops everything recorded about `acceleration_structure`.
    #[inline]
    pub fn forget_acceleration_structure(
        &mut self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) {
        self.acceleration_structures.remove(&acceleration_structure);
    }

    /// Drops everything recorded about every resource, along with the queued barriers.
    pub fn clear(&mut self) {
        self.images.clear();
        self.image_extents.clear();
        self.buffers.clear();
        self.acceleration_structures.clear();
        self.image_barriers.clear();
        self.buffer_barriers.clear();
        self.memory_barriers.clear();
    }
}

impl Default for ResourceTracker {
    #[inline]
    fn default() -> Self {
        Self::new(ResourceTrackerCreateInfo::default())
    }
}

impl<I: Interval, S: Copy> Bucket<I, S> {
    fn entries(&self) -> impl Iterator<Item = (I, S)> + '_ {
        self.intervals
            .iter()
            .map(move |&interval| (interval, self.state))
    }
}

fn buffer_barrier(
    buffer: vk::Buffer,
    range: BufferInterval,
    src: &AccessScope,
    dst: &AccessScope,
) -> BufferMemoryBarrier<'static> {
    BufferMemoryBarrier {
        src_stages: src.stages,
        src_access: src.access,
        dst_stages: dst.stages,
        dst_access: dst.access,
        buffer,
        range,
        _ne: NE,
    }
}

/// Splits `range` into the pieces that are recorded in some bucket, paired with their state, and
/// the pieces that are not recorded anywhere.
fn split_by_state<I: Interval, S: Copy>(
    buckets: &[Bucket<I, S>],
    range: &I,
) -> (SmallVec<[(I, S); 4]>, IntervalSet<I>) {
    let mut recorded = SmallVec::new();
    let mut uncovered = IntervalSet::from_interval(*range);

    for bucket in buckets {
        for stored in bucket.intervals.find_overlapping(range) {
            if let Some(piece) = stored.intersect(range) {
                uncovered.remove(piece);
                recorded.push((piece, bucket.state));
            }
        }
    }

    (recorded, uncovered)
}

/// Records `interval` as being in `state`, removing it from every other bucket.
fn assign<I: Interval, S: Copy + Eq>(buckets: &mut Vec<Bucket<I, S>>, interval: I, state: S) {
    for bucket in buckets.iter_mut().filter(|bucket| bucket.state != state) {
        bucket.intervals.remove(interval);
    }

    buckets.retain(|bucket| !bucket.intervals.is_empty());

    match buckets.iter_mut().find(|bucket| bucket.state == state) {
        Some(bucket) => bucket.intervals.add(interval),
        None => buckets.push(Bucket {
            intervals: IntervalSet::from_interval(interval),
            state,
        }),
    }

    assert_assigned(buckets, &interval, &state);

    if cfg!(debug_assertions) {
        assert_partition(buckets);
    }
}

/// Checks that `interval` is recorded in `state` and in no other bucket. This only looks at the
/// intervals that can overlap `interval`, so it runs in every build.
fn assert_assigned<I: Interval, S: Eq>(buckets: &[Bucket<I, S>], interval: &I, state: &S) {
    for bucket in buckets {
        if bucket.state == *state {
            assert!(
                bucket.intervals.covers(interval),
                "{:?} is not recorded in its new state",
                interval,
            );
        } else {
            assert!(
                !bucket.intervals.has_overlap(interval),
                "{:?} is recorded in more than one state",
                interval,
            );
        }
    }
}

fn assert_partition<I: Interval, S: Eq>(buckets: &[Bucket<I, S>]) {
    for (index, bucket) in buckets.iter().enumerate() {
        assert!(!bucket.intervals.is_empty(), "bucket {} is empty", index);

        for other in &buckets[index + 1..] {
            assert!(bucket.state != other.state, "two buckets share a state");

            for interval in &bucket.intervals {
                assert!(
                    !other.intervals.has_overlap(interval),
                    "{:?} is recorded in more than one state",
                    interval,
                );
            }
        }
    }
}

/// Parameters to create a new `ResourceTracker`.
#[derive(Clone, Debug)]
pub struct ResourceTrackerCreateInfo {
    /// The dependency flags of the pipeline barriers recorded by [`ResourceTracker::flush`].
    ///
    /// The default value is empty.
    pub dependency_flags: vk::DependencyFlags,

    /// What to assume about the history of buffer ranges that are requested before the tracker
    /// knows anything about them.
    ///
    /// The default value is [`UnknownAccessPolicy::AssumeNone`].
    pub unknown_buffer_access: UnknownAccessPolicy,

    /// What to assume about the history of acceleration structures that are requested before the
    /// tracker knows anything about them.
    ///
    /// The default value is [`UnknownAccessPolicy::AssumeNone`].
    pub unknown_acceleration_structure_access: UnknownAccessPolicy,

    /// Whether requesting a writing state on a region that was last written with that exact same
    /// state queues a barrier.
    ///
    /// Consecutive writes with the same scope are usually either to disjoint parts of the
    /// region, or already ordered by the caller, so by default they are not synchronized with
    /// each other.
    ///
    /// The default value is `false`.
    pub repeated_write_barriers: bool,

    /// Whether a read that follows another read without a barrier in between is recorded along
    /// with the earlier read, rather than replacing it. When enabled, a later write waits for
    /// every one of those reads.
    ///
    /// This applies to buffers and acceleration structures. Images always get a barrier when
    /// their scope changes, so they never accumulate.
    ///
    /// The default value is `true`.
    pub accumulate_reads: bool,

    pub _ne: NonExhaustive<'static>,
}

impl Default for ResourceTrackerCreateInfo {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTrackerCreateInfo {
    /// Returns a default `ResourceTrackerCreateInfo`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            dependency_flags: vk::DependencyFlags::empty(),
            unknown_buffer_access: UnknownAccessPolicy::AssumeNone,
            unknown_acceleration_structure_access: UnknownAccessPolicy::AssumeNone,
            repeated_write_barriers: false,
            accumulate_reads: true,
            _ne: NE,
        }
    }
}

/// What the tracker assumes about a buffer range or acceleration structure it has never seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UnknownAccessPolicy {
    /// The resource has not been accessed before, so nothing needs to be waited for.
    #[default]
    AssumeNone,

    /// The resource may have been accessed in any way, so the first request waits for all
    /// commands and makes all memory accesses available and visible.
    FullBarrier,
}
