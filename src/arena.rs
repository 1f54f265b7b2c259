//! The region arena: a first-fit allocator over one fixed buffer.
//!
//! The whole buffer is covered by a singly linked list of regions, each
//! starting with an in-band header. The list is kept in address order with no
//! gaps, and no two neighbouring regions are ever both FREE:
//!
//! ```text
//!   | H | payload (USED) | H | payload (FREE)      | H | payload (USED) |
//!   0                    ^                          ^
//!                        next                       next
//! ```
//!
//! `acquire` walks the list for the first FREE region that fits and splits
//! off what it doesn't need; `release` merges the region with FREE neighbours
//! on both sides; `resize` grows into a FREE successor when it can and
//! relocates otherwise.

use core::cmp::min;
use core::fmt;
use core::ptr::NonNull;

use log::{debug, trace};

use crate::buffer::{Backing, BufferSource, SystemSource};
use crate::error::{Error, Result};
use crate::region::{self, Region, Regions, State, HEADER_SIZE, MAX_CAPACITY};

/// The first region always starts at the beginning of the buffer.
const HEAD: usize = 0;

/// Identifies a region handed out by a [`RegionArena`], by the offset of its
/// payload within the arena's buffer.
///
/// [`RegionArena`]: struct.RegionArena.html
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionHandle(usize);

impl RegionHandle {
    /// Offset of the payload's first byte within the arena buffer.
    pub fn offset(self) -> usize {
        self.0
    }
}

/// A fixed-capacity, first-fit arena of variable sized regions.
///
/// Not thread-safe; see [`LockedArena`](../locked/struct.LockedArena.html)
/// for sharing one between threads.
pub struct RegionArena<S: BufferSource = SystemSource> {
    source: S,
    buffer: Option<Backing>,
    capacity: usize,
    used: usize,
}

impl RegionArena<SystemSource> {
    /// Create an arena over `capacity` bytes from the global allocator.
    pub fn create(capacity: usize) -> Result<Self> {
        RegionArena::create_in(SystemSource, capacity)
    }
}

impl<S: BufferSource> RegionArena<S> {
    /// Create an arena over `capacity` bytes reserved from `source`.
    ///
    /// The arena starts out as a single FREE region spanning the buffer.
    pub fn create_in(mut source: S, capacity: usize) -> Result<Self> {
        if capacity <= HEADER_SIZE || capacity > MAX_CAPACITY {
            return Err(Error::InvalidCapacity { capacity });
        }

        let mut buffer = Backing::reserve(&mut source, capacity)?;
        let head = Region {
            offset: HEAD,
            payload_size: capacity - HEADER_SIZE,
            next: None,
            state: State::Free,
        };
        head.write(buffer.as_mut_slice());
        debug!(
            "Created region arena of {} bytes, head region of {} bytes",
            capacity, head.payload_size
        );

        Ok(RegionArena {
            source,
            buffer: Some(buffer),
            capacity,
            used: 0,
        })
    }

    /// Total size of the backing buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes taken by USED regions, headers included.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes not taken by USED regions, headers of FREE regions included.
    pub fn free(&self) -> usize {
        self.capacity - self.used
    }

    /// False once the arena has been destroyed.
    pub fn is_live(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Iterate over all regions in address order. Empty once destroyed.
    pub fn regions(&self) -> Regions<'_> {
        match self.buffer {
            Some(ref b) => Regions::new(b.as_slice(), Some(HEAD)),
            None => Regions::new(&[], None),
        }
    }

    fn buf(&self) -> Result<&[u8]> {
        self.buffer
            .as_ref()
            .map(Backing::as_slice)
            .ok_or(Error::InvalidState)
    }

    fn buf_mut(&mut self) -> Result<&mut [u8]> {
        self.buffer
            .as_mut()
            .map(Backing::as_mut_slice)
            .ok_or(Error::InvalidState)
    }

    // Write a batch of updated descriptors. Callers compute every new header
    // before calling this, so the list is never observed half updated.
    fn commit(&mut self, regions: &[Region]) -> Result<()> {
        let buf = self.buf_mut()?;
        for r in regions {
            r.write(buf);
        }
        Ok(())
    }

    /// Find the region with its payload at `payload_offset`, along with the
    /// region before it in the list.
    fn locate(&self, payload_offset: usize) -> Result<(Option<Region>, Region)> {
        let buf = self.buf()?;

        let mut previous = None;
        for region in Regions::new(buf, Some(HEAD)) {
            if region.payload_start() == payload_offset {
                return Ok((previous, region));
            }
            if region.payload_start() > payload_offset {
                break;
            }
            previous = Some(region);
        }

        Err(Error::NotFound)
    }

    /// Like `locate`, but only for regions in use.
    fn locate_used(&self, handle: RegionHandle) -> Result<(Option<Region>, Region)> {
        match self.locate(handle.0) {
            Ok((previous, region)) if region.is_used() => Ok((previous, region)),
            Ok(_) | Err(Error::NotFound) => Err(Error::InvalidHandle),
            Err(e) => Err(e),
        }
    }

    fn successor(&self, region: &Region) -> Result<Option<Region>> {
        let buf = self.buf()?;
        Ok(region.next.map(|offset| Region::read(buf, offset)))
    }

    /// Acquire a region with a payload of at least `size` bytes.
    ///
    /// The first FREE region large enough is used. If what it has left over
    /// can hold a header and a byte of payload, that is split off as a new
    /// FREE region; otherwise the region is handed out whole, and may be larger
    /// than requested.
    pub fn acquire(&mut self, size: usize) -> Result<RegionHandle> {
        let buf = self.buf()?;
        if size == 0 {
            return Err(Error::ZeroSize);
        }

        let out_of_space = Error::OutOfSpace {
            requested: size,
            available: self.free(),
        };
        let needed = size.checked_add(HEADER_SIZE);
        if size > MAX_CAPACITY || needed.map_or(true, |n| n > self.free()) {
            return Err(out_of_space);
        }

        let candidate = Regions::new(buf, Some(HEAD))
            .inspect(|r| trace!("  Checking {}", r))
            .find(|r| r.is_free() && r.payload_size >= size)
            .ok_or(out_of_space)?
            .with_state(State::Used);

        let acquired = match region::split(candidate, size) {
            Some((head, tail)) => {
                trace!("Split {} off to leave {}", head, tail);
                self.commit(&[tail, head])?;
                head
            }
            None => {
                trace!("{} left unsplit: no room for a header in the remainder", candidate);
                self.commit(&[candidate])?;
                candidate
            }
        };

        self.used += acquired.span();
        Ok(RegionHandle(acquired.payload_start()))
    }

    /// Return a region to the arena, merging it with FREE neighbours.
    pub fn release(&mut self, handle: RegionHandle) -> Result<()> {
        let (previous, region) = self.locate_used(handle)?;
        trace!("Releasing {}", region);

        self.used -= region.span();

        let mut merged = region.with_state(State::Free);
        if let Some(next) = self.successor(&merged)? {
            if next.is_free() {
                trace!("Merging {} with following {}", merged, next);
                merged = region::join(merged, next);
            }
        }
        if let Some(previous) = previous {
            if previous.is_free() {
                trace!("Merging {} into preceding {}", merged, previous);
                merged = region::join(previous, merged);
            }
        }

        self.commit(&[merged])
    }

    /// Release the region whose payload starts at `ptr`.
    pub fn deallocate(&mut self, ptr: *const u8) -> Result<()> {
        let handle = self.find_ptr(ptr)?;
        self.release(handle)
    }

    /// Acquire a region and return a pointer to its payload.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        let handle = self.acquire(size)?;
        self.payload_ptr(handle)
    }

    /// Change the payload size of a region, returning its (possibly new)
    /// handle.
    ///
    /// Shrinking happens in place. Growing happens in place when the next
    /// region is FREE and large enough; otherwise a new region is acquired,
    /// the payload copied over and the old region released. If that fails
    /// with `OutOfSpace`, the old region is left untouched.
    pub fn resize(&mut self, handle: RegionHandle, new_size: usize) -> Result<RegionHandle> {
        if new_size == 0 {
            self.buf()?;
            return Err(Error::ZeroSize);
        }

        let (_, region) = self.locate_used(handle)?;
        if new_size == region.payload_size {
            return Ok(handle);
        }

        let next = self.successor(&region)?;
        if new_size < region.payload_size {
            self.shrink(region, next, new_size)?;
            return Ok(handle);
        }

        if new_size > MAX_CAPACITY {
            return Err(Error::OutOfSpace {
                requested: new_size,
                available: self.free(),
            });
        }

        if let Some(next) = next {
            let needed = new_size - region.payload_size;
            if next.is_free() && next.span() >= needed {
                self.grow_into(region, next, new_size)?;
                return Ok(handle);
            }
        }

        self.relocate(region, new_size)
    }

    fn shrink(&mut self, region: Region, next: Option<Region>, new_size: usize) -> Result<()> {
        let slack = region.payload_size - new_size;

        if let Some(next) = next.filter(Region::is_free) {
            // The FREE neighbour takes the slack by moving its header back.
            let moved = Region {
                offset: next.offset - slack,
                payload_size: next.payload_size + slack,
                ..next
            };
            let shrunk = Region {
                payload_size: new_size,
                next: Some(moved.offset),
                ..region
            };
            trace!("Shrank {} into {}", shrunk, moved);
            self.used -= slack;
            return self.commit(&[moved, shrunk]);
        }

        match region::split(region, new_size) {
            Some((shrunk, tail)) => {
                trace!("Shrank {}, freeing {}", shrunk, tail);
                self.used -= tail.span();
                self.commit(&[tail, shrunk])
            }
            None => {
                trace!(
                    "{} kept at its size: {} bytes of slack can't hold a header",
                    region,
                    slack
                );
                Ok(())
            }
        }
    }

    fn grow_into(&mut self, region: Region, next: Region, new_size: usize) -> Result<()> {
        match region::move_start(next, region.payload_start() + new_size) {
            Some(moved) => {
                let grown = Region {
                    payload_size: new_size,
                    next: Some(moved.offset),
                    ..region
                };
                trace!("Grew {} in place, leaving {}", grown, moved);
                self.used += grown.payload_size - region.payload_size;
                self.commit(&[moved, grown])
            }
            None => {
                let grown = region::join(region, next);
                trace!("Grew {} in place, absorbing {}", grown, next);
                self.used += next.span();
                self.commit(&[grown])
            }
        }
    }

    fn relocate(&mut self, region: Region, new_size: usize) -> Result<RegionHandle> {
        let moved_to = self.acquire(new_size)?;
        debug!(
            "Relocating {} to a {} byte region at {}",
            region,
            new_size,
            moved_to.0
        );

        let copied = min(region.payload_size, new_size);
        let from = region.payload_start();
        self.buf_mut()?
            .copy_within(from..from + copied, moved_to.0);

        self.release(RegionHandle(from))?;
        Ok(moved_to)
    }

    /// Find the region whose payload starts at `payload_offset`.
    pub fn find(&self, payload_offset: usize) -> Result<RegionHandle> {
        let (_, region) = self.locate(payload_offset)?;
        trace!("Found {}", region);
        Ok(RegionHandle(region.payload_start()))
    }

    /// Find the region whose payload starts at `ptr`.
    pub fn find_ptr(&self, ptr: *const u8) -> Result<RegionHandle> {
        let base = self.buf()?.as_ptr() as usize;
        let addr = ptr as usize;
        if addr < base || addr >= base + self.capacity {
            return Err(Error::NotFound);
        }
        self.find(addr - base)
    }

    /// The region a handle refers to.
    pub fn region(&self, handle: RegionHandle) -> Result<Region> {
        self.locate_used(handle).map(|(_, region)| region)
    }

    /// Payload size of a region; may exceed what was asked for.
    pub fn size_of(&self, handle: RegionHandle) -> Result<usize> {
        self.region(handle).map(|r| r.payload_size)
    }

    pub fn payload(&self, handle: RegionHandle) -> Result<&[u8]> {
        let region = self.region(handle)?;
        Ok(&self.buf()?[region.payload_start()..region.end()])
    }

    pub fn payload_mut(&mut self, handle: RegionHandle) -> Result<&mut [u8]> {
        let region = self.region(handle)?;
        Ok(&mut self.buf_mut()?[region.payload_start()..region.end()])
    }

    pub fn payload_ptr(&mut self, handle: RegionHandle) -> Result<NonNull<u8>> {
        let payload = self.payload_mut(handle)?;
        Ok(NonNull::from(payload).cast())
    }

    /// Release the backing buffer. The arena is unusable afterwards.
    pub fn destroy(&mut self) -> Result<()> {
        let buffer = self.buffer.take().ok_or(Error::InvalidState)?;
        debug!(
            "Destroying region arena of {} bytes with {} bytes in use",
            self.capacity, self.used
        );
        buffer.release(&mut self.source);
        self.used = 0;
        Ok(())
    }
}

impl<S: BufferSource> Drop for RegionArena<S> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.release(&mut self.source);
        }
    }
}

impl<S: BufferSource> fmt::Display for RegionArena<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionArena(")?;
        let mut start = true;
        for region in self.regions() {
            if !start {
                write!(f, ", ")?;
            } else {
                start = false;
            }
            write!(f, "{}", region)?;
        }

        write!(f, ")")
    }
}
