//! Read-only health checks over a region arena.
//!
//! None of these mutate the arena. They all walk the region list from the
//! head, so a cyclic list panics instead of looping forever.

use crate::arena::RegionArena;
use crate::buffer::BufferSource;
use crate::region::{Region, Relation, HEADER_SIZE};

/// Number of regions, FREE and USED, in the arena.
pub fn active_region_count<S: BufferSource>(arena: &RegionArena<S>) -> usize {
    arena.regions().count()
}

/// Sum of the payload sizes of all regions.
pub fn total_payload_bytes<S: BufferSource>(arena: &RegionArena<S>) -> usize {
    arena.regions().map(|r| r.payload_size).sum()
}

/// True iff the regions' payloads and headers add up to the capacity.
pub fn is_accounting_consistent<S: BufferSource>(arena: &RegionArena<S>) -> bool {
    let (count, payload) = arena
        .regions()
        .fold((0, 0), |(count, payload), r| (count + 1, payload + r.payload_size));

    match arena.capacity().checked_sub(HEADER_SIZE * count) {
        Some(expected) => payload == expected,
        None => false,
    }
}

/// Validity contains a representation of all invalid states found in a
/// region list.
#[derive(Default, Debug, PartialEq, Eq)]
pub struct Validity {
    /// Number of places where a region does not end where the next begins,
    /// counting the start and end of the buffer.
    pub gaps: usize,

    /// Number of regions overlapping the one before them.
    ///
    /// This likely indicates corruption.
    pub overlaps: usize,

    /// Number of regions that do not have an address greater than the one
    /// before them.
    pub out_of_orders: usize,

    /// Number of FREE regions directly following another FREE region. These
    /// should have been merged.
    pub adjacent_free: usize,

    /// Whether the arena's `used` counter disagrees with the USED regions.
    pub used_mismatch: bool,
}

impl Validity {
    /// Returns a boolean - a simple check if all cases are 0
    pub fn is_valid(&self) -> bool {
        self.gaps == 0
            && self.overlaps == 0
            && self.out_of_orders == 0
            && self.adjacent_free == 0
            && !self.used_mismatch
    }
}

impl From<Validity> for bool {
    fn from(v: Validity) -> bool {
        v.is_valid()
    }
}

#[derive(Default, Debug, PartialEq, Eq)]
pub struct Stats {
    pub regions: usize,
    pub payload_bytes: usize,
    /// Header plus payload of every FREE region.
    pub free_bytes: usize,
    /// Header plus payload of every USED region.
    pub used_bytes: usize,
    /// Largest payload a single `acquire` could currently be given.
    pub largest_free: usize,
}

/// Check the current shape of the region list, and whether it is valid.
pub fn stats<S: BufferSource>(arena: &RegionArena<S>) -> (Validity, Stats) {
    let mut validity: Validity = Default::default();
    let mut stats: Stats = Default::default();

    let mut previous: Option<Region> = None;
    for region in arena.regions() {
        match previous.map(|p| (p.relation(&region), p.is_free())) {
            Some((Relation::AdjacentBefore, was_free)) => {
                // This is the only valid layout.
                if was_free && region.is_free() {
                    validity.adjacent_free += 1;
                }
            }
            Some((Relation::Before, _)) => {
                // Right order, but there are bytes no region covers.
                validity.gaps += 1;
            }
            Some((Relation::Overlapping, _)) => {
                // This is really bad.
                validity.overlaps += 1;
            }
            Some((Relation::AdjacentAfter, _)) | Some((Relation::After, _)) => {
                // Wrong order.
                validity.out_of_orders += 1;
            }
            None => {
                // The head must start the buffer.
                if region.offset != 0 {
                    validity.gaps += 1;
                }
            }
        }

        stats.regions += 1;
        stats.payload_bytes += region.payload_size;
        if region.is_free() {
            stats.free_bytes += region.span();
            stats.largest_free = stats.largest_free.max(region.payload_size);
        } else {
            stats.used_bytes += region.span();
        }
        previous = Some(region);
    }

    // The last region must end the buffer.
    if let Some(last) = previous {
        if last.end() != arena.capacity() {
            validity.gaps += 1;
        }
    }

    validity.used_mismatch = stats.used_bytes != arena.used();

    (validity, stats)
}
