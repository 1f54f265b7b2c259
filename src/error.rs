use core::fmt;

/// Everything that can go wrong when calling into a [`RegionArena`] or a
/// [`Scratchpad`].
///
/// Internal corruption of the region list is never reported through this
/// type; it panics instead, as continuing would risk aliased memory.
///
/// [`RegionArena`]: ../arena/struct.RegionArena.html
/// [`Scratchpad`]: ../scratchpad/struct.Scratchpad.html
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The buffer source could not reserve the backing buffer.
    OutOfMemory,
    /// No free region (or scratch space) is large enough.
    OutOfSpace { requested: usize, available: usize },
    /// The handle does not name a USED region of this arena.
    InvalidHandle,
    /// No region starts its payload at the given address.
    NotFound,
    /// The allocator was already destroyed.
    InvalidState,
    /// A zero byte region was requested.
    ZeroSize,
    /// The capacity cannot hold a single region, or does not fit a header field.
    InvalidCapacity { capacity: usize },
}

pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::OutOfMemory => write!(f, "failed to reserve the backing buffer"),
            Error::OutOfSpace {
                requested,
                available,
            } => write!(
                f,
                "out of space: requested {} bytes, {} available",
                requested, available
            ),
            Error::InvalidHandle => write!(f, "handle does not refer to a region in use"),
            Error::NotFound => write!(f, "no region starts at the given address"),
            Error::InvalidState => write!(f, "allocator has been destroyed"),
            Error::ZeroSize => write!(f, "zero-sized regions are not supported"),
            Error::InvalidCapacity { capacity } => {
                write!(f, "unsupported capacity of {} bytes", capacity)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_display() {
        let err = Error::OutOfSpace {
            requested: 64,
            available: 10,
        };
        assert_eq!(
            err.to_string(),
            "out of space: requested 64 bytes, 10 available"
        );
        assert_eq!(
            Error::InvalidState.to_string(),
            "allocator has been destroyed"
        );
    }
}
