use core::fmt;
use core::mem::size_of;

use static_assertions::{const_assert, const_assert_eq};

/// The in-band header at the start of every region.
///
/// The header includes the payload size, the offset of the next region's
/// header (or `TERMINAL`), the FREE/USED state, and a tag byte so that
/// reading a header from a stray offset is caught instead of trusted.
///
/// We use C representation and pad to 16 bytes. This is a stronger constraint
/// than is entirely needed, but it keeps the header a round size. Headers are
/// read and written as little-endian bytes, so they need no alignment inside
/// the buffer.
// Only used to pin the header size; the fields are encoded by hand.
#[allow(dead_code)]
#[repr(C)]
struct RegionHeader {
    payload_size: u32,
    next: u32,
    state: u8,
    tag: u8,
    _pad: [u8; 6],
}

/// Size of the header preceding every payload.
pub const HEADER_SIZE: usize = 16;
const_assert_eq!(HEADER_SIZE, size_of::<RegionHeader>());

const SIZE_FIELD: usize = 0;
const NEXT_FIELD: usize = 4;
const STATE_FIELD: usize = 8;
const TAG_FIELD: usize = 9;
const_assert!(TAG_FIELD < HEADER_SIZE);

const HEADER_TAG: u8 = 0xA5;
/// `next` value of the last region in the list.
const TERMINAL: u32 = u32::MAX;

/// Largest buffer a region list can describe: offsets and sizes are stored
/// as u32, and `u32::MAX` is reserved for the terminal marker.
pub const MAX_CAPACITY: usize = u32::MAX as usize;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Free,
    Used,
}

impl State {
    fn to_byte(self) -> u8 {
        match self {
            State::Free => 0,
            State::Used => 1,
        }
    }

    fn from_byte(byte: u8) -> Option<State> {
        match byte {
            0 => Some(State::Free),
            1 => Some(State::Used),
            _ => None,
        }
    }
}

/// An enum for easy comparison of regions and their order
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Relation {
    Before,
    AdjacentBefore,
    Overlapping,
    AdjacentAfter,
    After,
}

/// A decoded region descriptor.
///
/// Regions are values: they are read out of the buffer, transformed by
/// [`split`], [`join`] and [`move_start`], and written back with
/// [`Region::write`]. Nothing in the buffer changes until the write.
///
/// [`split`]: fn.split.html
/// [`join`]: fn.join.html
/// [`move_start`]: fn.move_start.html
/// [`Region::write`]: struct.Region.html#method.write
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Region {
    /// Offset of the header within the buffer.
    pub offset: usize,
    /// Usable bytes following the header.
    pub payload_size: usize,
    /// Offset of the next region's header.
    pub next: Option<usize>,
    pub state: State,
}

impl Region {
    pub fn payload_start(&self) -> usize {
        self.offset + HEADER_SIZE
    }

    /// One past the last payload byte.
    pub fn end(&self) -> usize {
        self.payload_start() + self.payload_size
    }

    /// Header plus payload.
    pub fn span(&self) -> usize {
        HEADER_SIZE + self.payload_size
    }

    pub fn is_free(&self) -> bool {
        self.state == State::Free
    }

    pub fn is_used(&self) -> bool {
        self.state == State::Used
    }

    #[must_use]
    pub fn with_state(self, state: State) -> Region {
        Region { state, ..self }
    }

    /// Compare two regions to see how they are ordered.
    pub fn relation(&self, other: &Region) -> Relation {
        if self.end() < other.offset {
            Relation::Before
        } else if self.end() == other.offset {
            Relation::AdjacentBefore
        } else if self.offset < other.end() {
            Relation::Overlapping
        } else if self.offset == other.end() {
            Relation::AdjacentAfter
        } else {
            Relation::After
        }
    }

    /// Decode the header at `offset`.
    ///
    /// Panics if the bytes there are not a header this crate wrote, or if the
    /// header describes memory outside of `buf`: either means the region list
    /// is corrupt, and carrying on would hand out aliased memory.
    pub fn read(buf: &[u8], offset: usize) -> Region {
        let header = match buf.get(offset..offset + HEADER_SIZE) {
            Some(h) => h,
            None => panic!(
                "Region header at {} lies outside of a {} byte buffer",
                offset,
                buf.len()
            ),
        };

        if header[TAG_FIELD] != HEADER_TAG {
            panic!("Corrupt region header at {}: bad tag", offset);
        }

        let state = match State::from_byte(header[STATE_FIELD]) {
            Some(s) => s,
            None => panic!(
                "Corrupt region header at {}: state byte {}",
                offset, header[STATE_FIELD]
            ),
        };

        let payload_size = read_u32(header, SIZE_FIELD) as usize;
        let next = match read_u32(header, NEXT_FIELD) {
            TERMINAL => None,
            n => Some(n as usize),
        };

        let region = Region {
            offset,
            payload_size,
            next,
            state,
        };

        if region.end() > buf.len() {
            panic!(
                "Region at {} of size {} overruns a {} byte buffer",
                offset,
                payload_size,
                buf.len()
            );
        }

        region
    }

    /// Encode this region's header into the buffer.
    pub fn write(&self, buf: &mut [u8]) {
        debug_assert!(self.end() <= buf.len() && self.end() <= MAX_CAPACITY);

        let header = &mut buf[self.offset..self.offset + HEADER_SIZE];
        write_u32(header, SIZE_FIELD, self.payload_size as u32);
        write_u32(
            header,
            NEXT_FIELD,
            self.next.map(|n| n as u32).unwrap_or(TERMINAL),
        );
        header[STATE_FIELD] = self.state.to_byte();
        header[TAG_FIELD] = HEADER_TAG;
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Free => "FREE",
            State::Used => "USED",
        };
        write!(f, "Region({}, {}, {})", self.offset, self.payload_size, state)
    }
}

fn read_u32(header: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&header[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn write_u32(header: &mut [u8], at: usize, value: u32) {
    header[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Split `region` so that its payload is exactly `size`, and return it along
/// with the new FREE region covering the rest.
///
/// Returns None if the leftover could not hold a header plus at least one
/// payload byte; the caller then keeps the region whole.
pub fn split(region: Region, size: usize) -> Option<(Region, Region)> {
    if size > region.payload_size || region.payload_size - size <= HEADER_SIZE {
        return None;
    }

    let tail = Region {
        offset: region.payload_start() + size,
        payload_size: region.payload_size - size - HEADER_SIZE,
        next: region.next,
        state: State::Free,
    };
    let head = Region {
        payload_size: size,
        next: Some(tail.offset),
        ..region
    };

    Some((head, tail))
}

/// Merge `second` into `first`, which survives with `first`'s state.
///
/// Panics if `second` is not the region directly after `first`.
pub fn join(first: Region, second: Region) -> Region {
    assert!(
        first.next == Some(second.offset) && first.relation(&second) == Relation::AdjacentBefore,
        "Can't join {} and {}: they are not neighbours",
        first,
        second
    );

    Region {
        payload_size: first.payload_size + HEADER_SIZE + second.payload_size,
        next: second.next,
        ..first
    }
}

/// Move the header of `region` to `new_offset`, keeping its end fixed.
///
/// Moving backwards grows the payload; moving forwards shrinks it. Returns
/// None if the moved region would be left without at least one payload byte.
pub fn move_start(region: Region, new_offset: usize) -> Option<Region> {
    let end = region.end();
    if new_offset + HEADER_SIZE >= end {
        return None;
    }

    Some(Region {
        offset: new_offset,
        payload_size: end - new_offset - HEADER_SIZE,
        ..region
    })
}

/// Walks the region list from the head in list order.
///
/// The walk is bounded by the most regions the buffer could possibly hold; a
/// longer walk means the list is cyclic, and panics.
pub struct Regions<'buf> {
    buf: &'buf [u8],
    next: Option<usize>,
    steps: usize,
    max_steps: usize,
}

impl<'buf> Regions<'buf> {
    pub fn new(buf: &'buf [u8], head: Option<usize>) -> Self {
        Regions {
            buf,
            next: head,
            steps: 0,
            max_steps: max_regions(buf.len()),
        }
    }
}

impl<'buf> Iterator for Regions<'buf> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        let offset = self.next.take()?;

        self.steps += 1;
        if self.steps > self.max_steps {
            panic!(
                "Region list is longer than the {} regions a {} byte buffer can hold; it is cyclic or corrupt",
                self.max_steps,
                self.buf.len()
            );
        }

        let region = Region::read(self.buf, offset);
        self.next = region.next;
        Some(region)
    }
}

/// Upper bound on the number of regions in a buffer of `capacity` bytes:
/// every region takes a header and at least one payload byte.
pub fn max_regions(capacity: usize) -> usize {
    capacity / (HEADER_SIZE + 1)
}
