#![no_std]

//! Fixed-capacity memory allocators over pre-reserved buffers.
//!
//! This crate provides two allocators, each of which reserves a single buffer
//! up front and never goes back to the host for more:
//!
//! - [`RegionArena`](arena/struct.RegionArena.html): a first-fit free-list
//!   allocator. Regions can be acquired, released and resized individually,
//!   and adjacent free regions are merged on release.
//! - [`Scratchpad`](scratchpad/struct.Scratchpad.html): a bump allocator for
//!   transient memory, freed all at once with `reset`.
//!
//! Both are single-threaded. [`LockedArena`](locked/struct.LockedArena.html)
//! wraps a `RegionArena` in a spin lock for callers that must share one.
//!
//! ## Layout
//!
//! Every region in a `RegionArena` starts with a 16 byte header, stored in the
//! buffer itself. The headers form a linked list covering the whole buffer
//! in address order:
//!
//! ```text
//!   ┌────┬──────────────┬────┬──────────────────┬────┬───────────┐
//!   │ H  │ USED payload │ H  │ FREE payload     │ H  │ USED ...  │
//!   └────┴──────────────┴────┴──────────────────┴────┴───────────┘
//!   0     ▲ handle
//! ```
//!
//! Handles are offsets of a payload within the buffer, and are checked
//! against the list on every use.
//!
//! ## Example
//!
//! ```
//! use region_alloc::{checks, RegionArena, Scratchpad, HEADER_SIZE};
//!
//! let mut arena = RegionArena::create(1024).unwrap();
//! let a = arena.acquire(100).unwrap();
//! let b = arena.acquire(100).unwrap();
//! assert_eq!(checks::active_region_count(&arena), 3);
//!
//! arena.payload_mut(a).unwrap()[..5].copy_from_slice(b"hello");
//! let a = arena.resize(a, 200).unwrap();
//! assert_eq!(&arena.payload(a).unwrap()[..5], b"hello");
//!
//! arena.release(a).unwrap();
//! arena.release(b).unwrap();
//! assert_eq!(checks::active_region_count(&arena), 1);
//! assert_eq!(checks::total_payload_bytes(&arena), 1024 - HEADER_SIZE);
//!
//! let mut pad = Scratchpad::create(100).unwrap();
//! assert_eq!(pad.allocate(60).unwrap().offset(), 0);
//! assert!(pad.allocate(50).is_err());
//! pad.reset();
//! assert_eq!(pad.allocate(50).unwrap().offset(), 0);
//! ```

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod arena;
pub mod buffer;
pub mod checks;
pub mod error;
pub mod locked;
pub mod region;
pub mod scratchpad;

pub use arena::{RegionArena, RegionHandle};
#[cfg(feature = "use_libc")]
pub use buffer::LibcSource;
pub use buffer::{BufferSource, SystemSource, ToyHeap};
pub use error::{Error, Result};
pub use locked::LockedArena;
pub use region::HEADER_SIZE;
pub use scratchpad::{ScratchSlice, Scratchpad};
