//! Contiguous regions of buffers and images.
//!
//! Both kinds of interval share the same algebra through the [`Interval`] trait, which is what
//! [`IntervalSet`] is built on. An interval that covers nothing (zero bytes, zero mip levels, zero
//! array layers or no aspects) is *empty*: it never overlaps, contains or merges with anything.
//!
//! [`IntervalSet`]: crate::IntervalSet

use crate::DeviceSize;
use ash::vk;
use smallvec::{smallvec, SmallVec};
use std::{cmp, fmt::Debug, ops::Range};

/// A region of a resource that can be stored in an [`IntervalSet`].
///
/// [`IntervalSet`]: crate::IntervalSet
pub trait Interval: Copy + Eq + Debug {
    /// The key that intervals are sorted by. This is the "start" of the interval.
    type Key: Ord;

    /// Returns the sort key of `self`.
    fn sort_key(&self) -> Self::Key;

    /// Returns `true` if `self` covers nothing.
    fn is_empty(&self) -> bool;

    /// Returns `true` if `other` lies entirely inside `self`.
    fn contains(&self, other: &Self) -> bool;

    /// Returns `true` if `self` and `other` have a non-empty intersection.
    fn overlaps(&self, other: &Self) -> bool;

    /// Returns the smallest interval covering both `self` and `other`, or `None` if the two can't
    /// be represented by a single interval.
    fn merge(&self, other: &Self) -> Option<Self>;

    /// Returns the region covered by both `self` and `other`, or `None` if they don't overlap.
    fn intersect(&self, other: &Self) -> Option<Self>;

    /// Returns the pieces of `self` that are not covered by `other`. The pieces are disjoint and
    /// none of them overlaps `other`.
    fn difference(&self, other: &Self) -> SmallVec<[Self; 4]>;

    /// Given a slice of disjoint intervals sorted by [`sort_key`], returns the window of indices
    /// that can possibly overlap or merge with `query`.
    ///
    /// The default implementation returns the whole slice.
    ///
    /// [`sort_key`]: Self::sort_key
    #[inline]
    fn candidates(sorted: &[Self], query: &Self) -> Range<usize> {
        let _ = query;

        0..sorted.len()
    }
}

/// A half-open byte range `offset..offset + size` of a buffer.
///
/// The size is clamped on construction so that the end never overflows. An interval whose end is
/// [`DeviceSize::MAX`] extends to the end of the buffer, which is how [`vk::WHOLE_SIZE`] is
/// represented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferInterval {
    offset: DeviceSize,
    size: DeviceSize,
}

impl BufferInterval {
    /// Creates a new `BufferInterval` starting at `offset` that is `size` bytes long.
    #[inline]
    pub const fn new(offset: DeviceSize, size: DeviceSize) -> Self {
        let max_size = DeviceSize::MAX - offset;

        BufferInterval {
            offset,
            size: if size > max_size { max_size } else { size },
        }
    }

    /// Creates a `BufferInterval` covering the whole buffer, whatever its size.
    #[inline]
    pub const fn whole() -> Self {
        Self::new(0, vk::WHOLE_SIZE)
    }

    #[inline]
    const fn from_bounds(start: DeviceSize, end: DeviceSize) -> Self {
        BufferInterval {
            offset: start,
            size: end - start,
        }
    }

    #[inline]
    pub const fn offset(&self) -> DeviceSize {
        self.offset
    }

    #[inline]
    pub const fn size(&self) -> DeviceSize {
        self.size
    }

    /// Returns the exclusive end of the interval.
    #[inline]
    pub const fn end(&self) -> DeviceSize {
        self.offset + self.size
    }

    #[inline]
    pub const fn range(&self) -> Range<DeviceSize> {
        self.offset..self.end()
    }
}

impl From<Range<DeviceSize>> for BufferInterval {
    #[inline]
    fn from(range: Range<DeviceSize>) -> Self {
        BufferInterval::new(range.start, range.end.saturating_sub(range.start))
    }
}

impl Interval for BufferInterval {
    type Key = DeviceSize;

    #[inline]
    fn sort_key(&self) -> DeviceSize {
        self.offset
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    fn contains(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.offset <= other.offset
            && self.end() >= other.end()
    }

    #[inline]
    fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.offset < other.end()
            && other.offset < self.end()
    }

    fn merge(&self, other: &Self) -> Option<Self> {
        if self.is_empty() || other.is_empty() {
            return None;
        }

        // Touching intervals merge as well as overlapping ones.
        if self.offset > other.end() || other.offset > self.end() {
            return None;
        }

        Some(BufferInterval::from_bounds(
            cmp::min(self.offset, other.offset),
            cmp::max(self.end(), other.end()),
        ))
    }

    fn intersect(&self, other: &Self) -> Option<Self> {
        self.overlaps(other).then(|| {
            BufferInterval::from_bounds(
                cmp::max(self.offset, other.offset),
                cmp::min(self.end(), other.end()),
            )
        })
    }

    fn difference(&self, other: &Self) -> SmallVec<[Self; 4]> {
        if self.is_empty() {
            return SmallVec::new();
        }

        if !self.overlaps(other) {
            return smallvec![*self];
        }

        let mut pieces = SmallVec::new();

        if self.offset < other.offset {
            pieces.push(BufferInterval::from_bounds(self.offset, other.offset));
        }

        if other.end() < self.end() {
            pieces.push(BufferInterval::from_bounds(other.end(), self.end()));
        }

        pieces
    }

    fn candidates(sorted: &[Self], query: &Self) -> Range<usize> {
        // The intervals are disjoint, so their ends are sorted as well as their starts.
        let start = sorted.partition_point(|interval| interval.end() < query.offset);
        let end = sorted.partition_point(|interval| interval.offset <= query.end());

        start..cmp::max(start, end)
    }
}

/// A range of aspects, mip levels and array layers of an image.
///
/// The mip level and array layer counts are clamped on construction so that the ends never
/// overflow. A range whose end is `u32::MAX` extends to the last mip level or array layer of the
/// image, which is how [`vk::REMAINING_MIP_LEVELS`] and [`vk::REMAINING_ARRAY_LAYERS`] are
/// represented.
///
/// Two image intervals only interact if their aspects do. Merging is more restrictive than
/// overlapping: the aspects must be equal, and the intervals must either share their array
/// layers and have overlapping or adjacent mip levels, or share their mip levels and have
/// overlapping or adjacent array layers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImageInterval {
    aspects: vk::ImageAspectFlags,
    base_mip_level: u32,
    level_count: u32,
    base_array_layer: u32,
    layer_count: u32,
}

impl ImageInterval {
    /// Creates a new `ImageInterval` from a set of aspects and ranges of mip levels and array
    /// layers.
    #[inline]
    pub const fn new(
        aspects: vk::ImageAspectFlags,
        mip_levels: Range<u32>,
        array_layers: Range<u32>,
    ) -> Self {
        Self::from_counts(
            aspects,
            mip_levels.start,
            mip_levels.end.saturating_sub(mip_levels.start),
            array_layers.start,
            array_layers.end.saturating_sub(array_layers.start),
        )
    }

    /// Creates a new `ImageInterval` from base indices and counts, the same way
    /// `VkImageSubresourceRange` is specified.
    #[inline]
    pub const fn from_counts(
        aspects: vk::ImageAspectFlags,
        base_mip_level: u32,
        level_count: u32,
        base_array_layer: u32,
        layer_count: u32,
    ) -> Self {
        let max_level_count = u32::MAX - base_mip_level;
        let max_layer_count = u32::MAX - base_array_layer;

        ImageInterval {
            aspects,
            base_mip_level,
            level_count: if level_count > max_level_count {
                max_level_count
            } else {
                level_count
            },
            base_array_layer,
            layer_count: if layer_count > max_layer_count {
                max_layer_count
            } else {
                layer_count
            },
        }
    }

    #[inline]
    pub const fn aspects(&self) -> vk::ImageAspectFlags {
        self.aspects
    }

    #[inline]
    pub const fn base_mip_level(&self) -> u32 {
        self.base_mip_level
    }

    #[inline]
    pub const fn level_count(&self) -> u32 {
        self.level_count
    }

    #[inline]
    pub const fn base_array_layer(&self) -> u32 {
        self.base_array_layer
    }

    #[inline]
    pub const fn layer_count(&self) -> u32 {
        self.layer_count
    }

    #[inline]
    pub const fn mip_levels(&self) -> Range<u32> {
        self.base_mip_level..self.base_mip_level + self.level_count
    }

    #[inline]
    pub const fn array_layers(&self) -> Range<u32> {
        self.base_array_layer..self.base_array_layer + self.layer_count
    }

    /// Returns the part of `self` that lies within an image with `mip_levels` mip levels and
    /// `array_layers` array layers. The result is empty if the bases are out of range.
    #[inline]
    pub fn clamped(&self, mip_levels: u32, array_layers: u32) -> Self {
        let mips = self.mip_levels();
        let layers = self.array_layers();

        ImageInterval {
            aspects: self.aspects,
            base_mip_level: mips.start,
            level_count: cmp::min(mips.end, mip_levels).saturating_sub(mips.start),
            base_array_layer: layers.start,
            layer_count: cmp::min(layers.end, array_layers).saturating_sub(layers.start),
        }
    }

    #[inline]
    fn with(&self, aspects: vk::ImageAspectFlags, mips: Range<u32>, layers: Range<u32>) -> Self {
        ImageInterval {
            aspects,
            base_mip_level: mips.start,
            level_count: mips.end - mips.start,
            base_array_layer: layers.start,
            layer_count: layers.end - layers.start,
        }
    }

    pub fn to_vk(&self) -> vk::ImageSubresourceRange {
        let level_count = if self.mip_levels().end == u32::MAX {
            vk::REMAINING_MIP_LEVELS
        } else {
            self.level_count
        };
        let layer_count = if self.array_layers().end == u32::MAX {
            vk::REMAINING_ARRAY_LAYERS
        } else {
            self.layer_count
        };

        vk::ImageSubresourceRange {
            aspect_mask: self.aspects,
            base_mip_level: self.base_mip_level,
            level_count,
            base_array_layer: self.base_array_layer,
            layer_count,
        }
    }
}

impl From<vk::ImageSubresourceRange> for ImageInterval {
    #[inline]
    fn from(range: vk::ImageSubresourceRange) -> Self {
        ImageInterval::from_counts(
            range.aspect_mask,
            range.base_mip_level,
            range.level_count,
            range.base_array_layer,
            range.layer_count,
        )
    }
}

impl Interval for ImageInterval {
    type Key = (u32, u32, u32);

    #[inline]
    fn sort_key(&self) -> Self::Key {
        (
            self.aspects.as_raw(),
            self.base_mip_level,
            self.base_array_layer,
        )
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.aspects.is_empty() || self.level_count == 0 || self.layer_count == 0
    }

    fn contains(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.aspects == other.aspects
            && range_contains(&self.mip_levels(), &other.mip_levels())
            && range_contains(&self.array_layers(), &other.array_layers())
    }

    fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.aspects.intersects(other.aspects)
            && ranges_overlap(&self.mip_levels(), &other.mip_levels())
            && ranges_overlap(&self.array_layers(), &other.array_layers())
    }

    fn merge(&self, other: &Self) -> Option<Self> {
        if self.is_empty() || other.is_empty() || self.aspects != other.aspects {
            return None;
        }

        if self.contains(other) {
            return Some(*self);
        }

        if other.contains(self) {
            return Some(*other);
        }

        let (mips, layers) = (self.mip_levels(), self.array_layers());
        let (other_mips, other_layers) = (other.mip_levels(), other.array_layers());

        if layers == other_layers && ranges_touch(&mips, &other_mips) {
            Some(self.with(self.aspects, range_hull(&mips, &other_mips), layers))
        } else if mips == other_mips && ranges_touch(&layers, &other_layers) {
            Some(self.with(self.aspects, mips, range_hull(&layers, &other_layers)))
        } else {
            None
        }
    }

    fn intersect(&self, other: &Self) -> Option<Self> {
        self.overlaps(other).then(|| {
            self.with(
                self.aspects & other.aspects,
                range_intersection(&self.mip_levels(), &other.mip_levels()),
                range_intersection(&self.array_layers(), &other.array_layers()),
            )
        })
    }

    fn difference(&self, other: &Self) -> SmallVec<[Self; 4]> {
        if self.is_empty() {
            return SmallVec::new();
        }

        if !self.overlaps(other) {
            return smallvec![*self];
        }

        let mut pieces = SmallVec::new();
        let (mips, layers) = (self.mip_levels(), self.array_layers());

        let remaining_aspects =
            vk::ImageAspectFlags::from_raw(self.aspects.as_raw() & !other.aspects.as_raw());

        if !remaining_aspects.is_empty() {
            pieces.push(self.with(remaining_aspects, mips.clone(), layers.clone()));
        }

        let aspects = self.aspects & other.aspects;
        let common_mips = range_intersection(&mips, &other.mip_levels());
        let common_layers = range_intersection(&layers, &other.array_layers());

        // Mip levels outside of the overlap keep every array layer.
        if mips.start < common_mips.start {
            pieces.push(self.with(aspects, mips.start..common_mips.start, layers.clone()));
        }

        if common_mips.end < mips.end {
            pieces.push(self.with(aspects, common_mips.end..mips.end, layers.clone()));
        }

        // Within the overlapping mip levels, only the array layers outside of the overlap remain.
        if layers.start < common_layers.start {
            pieces.push(self.with(aspects, common_mips.clone(), layers.start..common_layers.start));
        }

        if common_layers.end < layers.end {
            pieces.push(self.with(aspects, common_mips, common_layers.end..layers.end));
        }

        pieces
    }
}

fn range_contains(outer: &Range<u32>, inner: &Range<u32>) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

fn ranges_overlap(a: &Range<u32>, b: &Range<u32>) -> bool {
    a.start < b.end && b.start < a.end
}

fn ranges_touch(a: &Range<u32>, b: &Range<u32>) -> bool {
    a.start <= b.end && b.start <= a.end
}

fn range_hull(a: &Range<u32>, b: &Range<u32>) -> Range<u32> {
    cmp::min(a.start, b.start)..cmp::max(a.end, b.end)
}

fn range_intersection(a: &Range<u32>, b: &Range<u32>) -> Range<u32> {
    cmp::max(a.start, b.start)..cmp::min(a.end, b.end)
}

#[cfg(test)]
mod tests {
    use super::{BufferInterval, ImageInterval, Interval};
    use ash::vk;

    const COLOR: vk::ImageAspectFlags = vk::ImageAspectFlags::COLOR;
    const DEPTH: vk::ImageAspectFlags = vk::ImageAspectFlags::DEPTH;
    const STENCIL: vk::ImageAspectFlags = vk::ImageAspectFlags::STENCIL;

    fn buf(offset: u64, size: u64) -> BufferInterval {
        BufferInterval::new(offset, size)
    }

    #[test]
    fn buffer_empty() {
        let empty = buf(10, 0);
        assert!(empty.is_empty());
        assert!(!empty.overlaps(&buf(0, 100)));
        assert!(!buf(0, 100).contains(&empty));
        assert_eq!(empty.merge(&buf(10, 5)), None);
        assert_eq!(buf(10, 5).merge(&empty), None);
        assert!(empty.difference(&buf(0, 100)).is_empty());
    }

    #[test]
    fn buffer_bounds_are_clamped() {
        let whole = BufferInterval::whole();
        assert_eq!(whole.end(), u64::MAX);

        let tail = buf(64, vk::WHOLE_SIZE);
        assert_eq!(tail.end(), u64::MAX);
        assert!(whole.contains(&tail));
        assert_eq!(BufferInterval::from(30..10), buf(30, 0));
    }

    #[test]
    fn buffer_contains() {
        assert!(buf(0, 100).contains(&buf(10, 20)));
        assert!(buf(0, 100).contains(&buf(0, 100)));
        assert!(!buf(0, 100).contains(&buf(50, 100)));
        assert!(!buf(0, 100).contains(&buf(200, 10)));
    }

    #[test]
    fn buffer_overlaps() {
        assert!(buf(0, 100).overlaps(&buf(50, 100)));
        assert!(buf(0, 100).overlaps(&buf(10, 20)));
        assert!(!buf(0, 100).overlaps(&buf(100, 50)));
        assert!(!buf(0, 100).overlaps(&buf(200, 50)));
    }

    #[test]
    fn buffer_merge() {
        assert_eq!(buf(0, 100).merge(&buf(50, 100)), Some(buf(0, 150)));
        assert_eq!(buf(100, 50).merge(&buf(0, 100)), Some(buf(0, 150)));
        assert_eq!(buf(0, 100).merge(&buf(0, 100)), Some(buf(0, 100)));
        assert_eq!(buf(0, 100).merge(&buf(101, 10)), None);
    }

    #[test]
    fn buffer_intersect() {
        assert_eq!(buf(0, 100).intersect(&buf(50, 100)), Some(buf(50, 50)));
        assert_eq!(buf(0, 100).intersect(&buf(10, 20)), Some(buf(10, 20)));
        assert_eq!(buf(0, 100).intersect(&buf(100, 20)), None);
        assert_eq!(buf(0, 100).intersect(&buf(300, 20)), None);
    }

    #[test]
    fn buffer_difference() {
        assert_eq!(buf(0, 100).difference(&buf(200, 10)).as_slice(), &[buf(0, 100)]);
        assert_eq!(
            buf(0, 100).difference(&buf(25, 50)).as_slice(),
            &[buf(0, 25), buf(75, 25)],
        );
        assert_eq!(buf(0, 100).difference(&buf(0, 40)).as_slice(), &[buf(40, 60)]);
        assert_eq!(buf(0, 100).difference(&buf(60, 100)).as_slice(), &[buf(0, 60)]);
        assert!(buf(10, 20).difference(&buf(0, 100)).is_empty());
    }

    #[test]
    fn buffer_algebra_exhaustive() {
        let covered = |intervals: &[BufferInterval], byte: u64| {
            intervals.iter().any(|i| i.range().contains(&byte))
        };

        for a_offset in 0..6 {
            for a_size in 0..6 {
                for b_offset in 0..6 {
                    for b_size in 0..6 {
                        let a = buf(a_offset, a_size);
                        let b = buf(b_offset, b_size);
                        let non_empty = a_size != 0 && b_size != 0;
                        let touching = a.end() == b.offset() || b.end() == a.offset();

                        match a.merge(&b) {
                            Some(merged) => {
                                assert!(non_empty && (a.overlaps(&b) || touching));
                                assert_eq!(merged.offset(), a.offset().min(b.offset()));
                                assert_eq!(merged.end(), a.end().max(b.end()));
                            }
                            None => assert!(!non_empty || !(a.overlaps(&b) || touching)),
                        }

                        let pieces = a.difference(&b);

                        for piece in &pieces {
                            assert!(!piece.overlaps(&b));
                        }

                        for byte in 0..12 {
                            let expected =
                                a.range().contains(&byte) && !b.range().contains(&byte);
                            assert_eq!(covered(&pieces, byte), expected, "{a:?} - {b:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn image_empty() {
        assert!(ImageInterval::new(COLOR, 0..0, 0..1).is_empty());
        assert!(ImageInterval::new(COLOR, 0..1, 3..3).is_empty());
        assert!(ImageInterval::new(vk::ImageAspectFlags::empty(), 0..1, 0..1).is_empty());
        assert!(!ImageInterval::new(COLOR, 0..1, 0..1).is_empty());
    }

    #[test]
    fn image_vk_conversion() {
        let range = vk::ImageSubresourceRange {
            aspect_mask: COLOR,
            base_mip_level: 2,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 1,
            layer_count: 3,
        };
        let interval = ImageInterval::from(range);

        assert_eq!(interval.mip_levels(), 2..u32::MAX);
        assert_eq!(interval.array_layers(), 1..4);

        let vk_range = interval.to_vk();
        assert_eq!(vk_range.aspect_mask, COLOR);
        assert_eq!(vk_range.base_mip_level, 2);
        assert_eq!(vk_range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(vk_range.base_array_layer, 1);
        assert_eq!(vk_range.layer_count, 3);
    }

    #[test]
    fn image_clamped() {
        let remaining = ImageInterval::new(COLOR, 1..u32::MAX, 0..u32::MAX);
        assert_eq!(
            remaining.clamped(4, 6),
            ImageInterval::new(COLOR, 1..4, 0..6),
        );
        assert_eq!(
            ImageInterval::new(COLOR, 0..2, 1..3).clamped(4, 6),
            ImageInterval::new(COLOR, 0..2, 1..3),
        );
        assert!(ImageInterval::new(COLOR, 4..u32::MAX, 0..1)
            .clamped(4, 6)
            .is_empty());
        assert!(ImageInterval::new(COLOR, 0..1, 6..8).clamped(4, 6).is_empty());
    }

    #[test]
    fn image_contains() {
        let outer = ImageInterval::new(COLOR, 0..4, 0..6);
        assert!(outer.contains(&ImageInterval::new(COLOR, 1..3, 2..4)));
        assert!(!outer.contains(&ImageInterval::new(DEPTH, 1..3, 2..4)));
        assert!(!outer.contains(&ImageInterval::new(COLOR, 1..5, 2..4)));
    }

    #[test]
    fn image_overlaps() {
        let a = ImageInterval::new(COLOR, 0..4, 0..2);
        assert!(a.overlaps(&ImageInterval::new(COLOR, 3..5, 1..3)));
        assert!(!a.overlaps(&ImageInterval::new(COLOR, 4..5, 0..2)));
        assert!(!a.overlaps(&ImageInterval::new(DEPTH, 0..4, 0..2)));

        let depth_stencil = ImageInterval::new(DEPTH | STENCIL, 0..1, 0..1);
        assert!(depth_stencil.overlaps(&ImageInterval::new(STENCIL, 0..1, 0..1)));
    }

    #[test]
    fn image_merge() {
        let a = ImageInterval::new(COLOR, 0..2, 0..4);

        // Along mip levels.
        assert_eq!(
            a.merge(&ImageInterval::new(COLOR, 2..5, 0..4)),
            Some(ImageInterval::new(COLOR, 0..5, 0..4)),
        );
        // Along array layers.
        assert_eq!(
            a.merge(&ImageInterval::new(COLOR, 0..2, 3..8)),
            Some(ImageInterval::new(COLOR, 0..2, 0..8)),
        );
        // Containment.
        assert_eq!(a.merge(&ImageInterval::new(COLOR, 1..2, 1..3)), Some(a));
        // Diagonal neighbours can't be represented by one interval.
        assert_eq!(a.merge(&ImageInterval::new(COLOR, 2..4, 4..8)), None);
        // Different aspects never merge.
        assert_eq!(a.merge(&ImageInterval::new(DEPTH, 2..4, 0..4)), None);
        // Gaps don't merge.
        assert_eq!(a.merge(&ImageInterval::new(COLOR, 3..4, 0..4)), None);
    }

    #[test]
    fn image_intersect() {
        let a = ImageInterval::new(DEPTH | STENCIL, 0..4, 0..4);
        assert_eq!(
            a.intersect(&ImageInterval::new(DEPTH, 2..6, 3..9)),
            Some(ImageInterval::new(DEPTH, 2..4, 3..4)),
        );
        assert_eq!(a.intersect(&ImageInterval::new(COLOR, 0..4, 0..4)), None);
        assert_eq!(a.intersect(&ImageInterval::new(DEPTH, 4..6, 0..4)), None);
    }

    #[test]
    fn image_difference_single_dimension() {
        let a = ImageInterval::new(COLOR, 0..3, 0..1);
        let pieces = a.difference(&ImageInterval::new(COLOR, 1..2, 0..1));

        assert_eq!(
            pieces.as_slice(),
            &[
                ImageInterval::new(COLOR, 0..1, 0..1),
                ImageInterval::new(COLOR, 2..3, 0..1),
            ],
        );
    }

    #[test]
    fn image_difference_covers_remainder() {
        let a = ImageInterval::new(DEPTH | STENCIL, 0..4, 0..4);
        let b = ImageInterval::new(DEPTH, 1..3, 1..2);
        let pieces = a.difference(&b);

        for piece in &pieces {
            assert!(!piece.overlaps(&b));
            for other in &pieces {
                assert!(piece == other || !piece.overlaps(other));
            }
        }

        for aspect in [DEPTH, STENCIL] {
            for mip in 0..4 {
                for layer in 0..4 {
                    let texel = ImageInterval::new(aspect, mip..mip + 1, layer..layer + 1);
                    let expected = !b.overlaps(&texel);
                    let covered = pieces.iter().any(|piece| piece.overlaps(&texel));
                    assert_eq!(covered, expected, "{texel:?}");
                }
            }
        }
    }
}
