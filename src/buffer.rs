//! Backing buffers, and the sources they are reserved from.
//!
//! ## Basic Types
//!
//! ### [`BufferSource`](trait.BufferSource.html)
//!
//! `BufferSource` is a simple trait interface meant to abstract over the calls
//! to the host to reserve and release a contiguous range of memory. Each
//! allocator calls it exactly twice: once at creation, once at teardown.
//!
//! ### [`Backing`](struct.Backing.html)
//!
//! A `Backing` owns one reserved range for the lifetime of an allocator, and
//! hands out safe slices over it.
//!
//! ### [`SystemSource`](struct.SystemSource.html), `LibcSource`, [`ToyHeap`](struct.ToyHeap.html)
//!
//! `SystemSource` reserves from the global allocator, `LibcSource` maps
//! anonymous pages (with the `use_libc` feature), and `ToyHeap` is a budgeted
//! source that is mainly useful for testing reservation failure.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::fmt;
use core::ptr::NonNull;

#[cfg(feature = "use_libc")]
use errno::Errno;
use log::{debug, warn};

use crate::error::{Error, Result};

/// Alignment of every buffer handed out by the sources in this module.
pub const BUFFER_ALIGN: usize = 16;

// Round up value to the nearest multiple of increment
#[cfg_attr(not(feature = "use_libc"), allow(dead_code))]
fn round_up(value: usize, increment: usize) -> usize {
    if value == 0 {
        return 0;
    }
    increment * ((value - 1) / increment + 1)
}

pub trait BufferSource {
    type Err: fmt::Debug;

    /// Reserve at least `size` bytes. Returns a pointer and the number of
    /// bytes actually reserved at that pointer.
    ///
    /// # Safety
    ///
    /// For this to function properly with the other types in this crate:
    ///
    /// - `size` must be non-zero.
    /// - On success, the memory at the returned pointer must be readable,
    ///   writable, at least `size` bytes long, and untracked by any other rust
    ///   code until it is passed back to `release`.
    unsafe fn reserve(&mut self, size: usize) -> core::result::Result<(NonNull<u8>, usize), Self::Err>;

    /// Give back a range obtained from `reserve`.
    ///
    /// # Safety
    ///
    /// `ptr` and `reserved` must be exactly what a previous call to `reserve`
    /// on this source returned, and the range must not be used afterwards.
    unsafe fn release(&mut self, ptr: NonNull<u8>, reserved: usize);
}

/// SystemSource reserves buffers from the global allocator.
#[derive(Default, Debug)]
pub struct SystemSource;

#[derive(Debug)]
pub struct SystemSourceError;

impl SystemSource {
    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, BUFFER_ALIGN).ok()
    }
}

impl BufferSource for SystemSource {
    type Err = SystemSourceError;

    unsafe fn reserve(&mut self, size: usize) -> core::result::Result<(NonNull<u8>, usize), Self::Err> {
        let layout = SystemSource::layout(size).ok_or(SystemSourceError)?;
        let ptr = NonNull::new(alloc_zeroed(layout)).ok_or(SystemSourceError)?;
        Ok((ptr, size))
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, reserved: usize) {
        // The layout was valid when the buffer was reserved, so it still is.
        if let Some(layout) = SystemSource::layout(reserved) {
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

/// LibcSource maps anonymous pages of virtual memory for each buffer.
#[cfg(feature = "use_libc")]
#[derive(Default, Debug)]
pub struct LibcSource {
    // Just for tracking, not really needed
    pages: usize,
    mappings: usize,
}

#[cfg(feature = "use_libc")]
impl LibcSource {
    /// Number of pages currently mapped.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Number of mappings currently outstanding.
    pub fn mappings(&self) -> usize {
        self.mappings
    }
}

#[cfg(feature = "use_libc")]
impl BufferSource for LibcSource {
    type Err = Errno;

    unsafe fn reserve(&mut self, size: usize) -> core::result::Result<(NonNull<u8>, usize), Self::Err> {
        let pagesize = sysconf::page::pagesize();
        let to_allocate = round_up(size, pagesize);

        let ptr = libc::mmap(
            // Address we want the memory at. We don't care, so null it is.
            core::ptr::null_mut(),
            // Amount of memory to map
            to_allocate,
            // We want read/write access to this memory
            libc::PROT_WRITE | libc::PROT_READ,
            // MAP_ANON: no file descriptor, we're just going to use the memory.
            // MAP_PRIVATE: we're not sharing this with any other process.
            libc::MAP_ANON | libc::MAP_PRIVATE,
            -1,
            0,
        );

        if ptr == libc::MAP_FAILED {
            return Err(errno::errno());
        }

        let ptr = match NonNull::new(ptr as *mut u8) {
            Some(p) => p,
            None => return Err(Errno(libc::ENOMEM)),
        };

        self.pages += to_allocate / pagesize;
        self.mappings += 1;

        Ok((ptr, to_allocate))
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, reserved: usize) {
        if libc::munmap(ptr.as_ptr() as *mut libc::c_void, reserved) != 0 {
            warn!("munmap of {:?}:{} failed: {:?}", ptr, reserved, errno::errno());
            return;
        }
        self.pages -= reserved / sysconf::page::pagesize();
        self.mappings -= 1;
    }
}

/// A source with a fixed byte budget, backed by the global allocator.
///
/// Reservations that would push the outstanding total past the budget fail,
/// which makes it easy to exercise `OutOfMemory` paths.
#[derive(Debug)]
pub struct ToyHeap {
    pub budget: usize,
    pub outstanding: usize,
    pub reservations: usize,
    pub releases: usize,
    system: SystemSource,
}

impl Default for ToyHeap {
    fn default() -> Self {
        ToyHeap::with_budget(256 * 1024)
    }
}

impl ToyHeap {
    pub fn with_budget(budget: usize) -> Self {
        ToyHeap {
            budget,
            outstanding: 0,
            reservations: 0,
            releases: 0,
            system: SystemSource,
        }
    }
}

#[derive(Debug)]
pub struct ToyHeapOverflowError {
    pub requested: usize,
    pub remaining: usize,
}

impl BufferSource for ToyHeap {
    type Err = ToyHeapOverflowError;

    unsafe fn reserve(&mut self, size: usize) -> core::result::Result<(NonNull<u8>, usize), Self::Err> {
        let remaining = self.budget - self.outstanding;
        if size > remaining {
            return Err(ToyHeapOverflowError {
                requested: size,
                remaining,
            });
        }

        let (ptr, reserved) = self.system.reserve(size).map_err(|_| ToyHeapOverflowError {
            requested: size,
            remaining,
        })?;
        self.outstanding += reserved;
        self.reservations += 1;
        Ok((ptr, reserved))
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, reserved: usize) {
        self.system.release(ptr, reserved);
        self.outstanding -= reserved;
        self.releases += 1;
    }
}

/// Exclusive ownership of one reserved buffer.
///
/// Invariants: `ptr` points to `reserved >= len` bytes obtained from a
/// `BufferSource`, readable and writable, and aliased by nothing else.
pub struct Backing {
    ptr: NonNull<u8>,
    len: usize,
    reserved: usize,
}

// A Backing is sendable: it is the sole owner of its range, like a Box<[u8]>.
// It hands out slices only through &self / &mut self, so it is not Sync.
unsafe impl Send for Backing {}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backing({:?}, {}/{})", self.ptr, self.len, self.reserved)
    }
}

impl Backing {
    /// Reserve `len` bytes from `source`.
    ///
    /// Any failure of the source is logged and reported as `OutOfMemory`.
    pub fn reserve<S: BufferSource>(source: &mut S, len: usize) -> Result<Backing> {
        if len == 0 {
            return Err(Error::InvalidCapacity { capacity: len });
        }

        let (ptr, reserved) = match unsafe { source.reserve(len) } {
            Ok(res) => res,
            Err(err) => {
                warn!("Failed to reserve {} bytes: {:?}", len, err);
                return Err(Error::OutOfMemory);
            }
        };

        if reserved < len {
            warn!("Source reserved {} bytes when {} were requested", reserved, len);
            unsafe { source.release(ptr, reserved) };
            return Err(Error::OutOfMemory);
        }

        debug!("Reserved {} bytes at {:?} ({} requested)", reserved, ptr, len);
        Ok(Backing { ptr, len, reserved })
    }

    /// Hand the buffer back to the source it came from.
    pub fn release<S: BufferSource>(self, source: &mut S) {
        debug!("Releasing {} bytes at {:?}", self.reserved, self.ptr);
        unsafe { source.release(self.ptr, self.reserved) };
    }

    /// Usable length, as requested at reservation.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}
