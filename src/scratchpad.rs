//! A bump allocator over a fixed buffer.
//!
//! ```text
//!   | A1 | A2 | A3 |            free            |
//!                 ^ used                       ^ capacity
//! ```
//!
//! Each allocation bumps `used` forward. There is no way to give back a
//! single allocation; `reset` gives back all of them at once.

use core::ops::Range;

use log::{debug, trace};

use crate::buffer::{Backing, BufferSource, SystemSource};
use crate::error::{Error, Result};

/// A range handed out by [`Scratchpad::allocate`].
///
/// Only meaningful until the next `reset`; nothing checks for use after that.
///
/// [`Scratchpad::allocate`]: struct.Scratchpad.html#method.allocate
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScratchSlice {
    offset: usize,
    len: usize,
}

impl ScratchSlice {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

pub struct Scratchpad<S: BufferSource = SystemSource> {
    source: S,
    buffer: Option<Backing>,
    capacity: usize,
    used: usize,
}

impl Scratchpad<SystemSource> {
    pub fn create(capacity: usize) -> Result<Self> {
        Scratchpad::create_in(SystemSource, capacity)
    }
}

impl<S: BufferSource> Scratchpad<S> {
    pub fn create_in(mut source: S, capacity: usize) -> Result<Self> {
        let buffer = Backing::reserve(&mut source, capacity)?;
        debug!("Created scratchpad of {} bytes", capacity);
        Ok(Scratchpad {
            source,
            buffer: Some(buffer),
            capacity,
            used: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    pub fn is_live(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Take the next `size` bytes. Filling the buffer exactly is allowed.
    pub fn allocate(&mut self, size: usize) -> Result<ScratchSlice> {
        if self.buffer.is_none() {
            return Err(Error::InvalidState);
        }

        match self.used.checked_add(size) {
            Some(end) if end <= self.capacity => {
                let slice = ScratchSlice {
                    offset: self.used,
                    len: size,
                };
                trace!("Scratchpad handed out {:?}", slice.range());
                self.used = end;
                Ok(slice)
            }
            _ => Err(Error::OutOfSpace {
                requested: size,
                available: self.remaining(),
            }),
        }
    }

    /// Allocate and borrow the bytes in one go.
    pub fn allocate_bytes(&mut self, size: usize) -> Result<&mut [u8]> {
        let slice = self.allocate(size)?;
        self.bytes_mut(slice)
    }

    pub fn bytes(&self, slice: ScratchSlice) -> Result<&[u8]> {
        let buffer = self.buffer.as_ref().ok_or(Error::InvalidState)?;
        buffer
            .as_slice()
            .get(slice.range())
            .ok_or(Error::InvalidHandle)
    }

    pub fn bytes_mut(&mut self, slice: ScratchSlice) -> Result<&mut [u8]> {
        let buffer = self.buffer.as_mut().ok_or(Error::InvalidState)?;
        buffer
            .as_mut_slice()
            .get_mut(slice.range())
            .ok_or(Error::InvalidHandle)
    }

    /// Give back every allocation at once.
    pub fn reset(&mut self) {
        trace!("Scratchpad reset with {} bytes used", self.used);
        self.used = 0;
    }

    /// Release the backing buffer. The scratchpad is unusable afterwards.
    pub fn destroy(&mut self) -> Result<()> {
        let buffer = self.buffer.take().ok_or(Error::InvalidState)?;
        debug!("Destroying scratchpad of {} bytes", self.capacity);
        buffer.release(&mut self.source);
        self.used = 0;
        Ok(())
    }
}

impl<S: BufferSource> Drop for Scratchpad<S> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.release(&mut self.source);
        }
    }
}
