// Closed tagged error set for the mesh IPC core.
//
// Mirrors `cortez_error_codes` from the original C library one-to-one, minus
// the C ABI's numeric values (those were never part of this crate's public
// contract). Every fallible operation returns `Result<T>` and also mirrors
// the outcome into the owning handle's "last error" slot.

use std::fmt;

/// The closed set of failures the mesh IPC core can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CortezError {
    /// A caller-supplied argument was invalid (empty name, zero size, ...).
    InvalidArgument,
    /// Allocation failed.
    OutOfMemory,
    /// `join` with a create-only policy found the channel already exists.
    ChannelExists,
    /// `join` with a join-only policy found no channel with that name.
    ChannelNotFound,
    /// Opening the device or mapping the segment failed.
    MappingFailed,
    /// A segment's header magic did not match the expected constant.
    BadMagic,
    /// A write reservation did not fit in the available space.
    BufferFull,
    /// A requested message is larger than the channel's capacity.
    MessageTooLarge,
    /// A blocking read exceeded its deadline.
    TimedOut,
    /// A frame header's magic was neither the message nor skip magic.
    Corrupt,
    /// The underlying device ioctl failed.
    IoctlFailed,
    /// An invariant was violated that should be unreachable in correct use.
    Internal,
    /// Another transaction is already open on this channel.
    TransactionInProgress,
    /// The channel's recorded owner process is no longer alive.
    ChannelStale,
    /// No peer with the requested identity is known to the mesh.
    PeerNotFound,
    /// A non-blocking read found nothing available (transient, not an error
    /// in the `cortez_error_codes` sense, but surfaced the same way here).
    Empty,
}

pub type Result<T> = std::result::Result<T, CortezError>;

impl fmt::Display for CortezError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CortezError::InvalidArgument => "invalid argument",
            CortezError::OutOfMemory => "out of memory",
            CortezError::ChannelExists => "channel already exists",
            CortezError::ChannelNotFound => "channel not found",
            CortezError::MappingFailed => "shared memory mapping failed",
            CortezError::BadMagic => "invalid channel or message magic",
            CortezError::BufferFull => "channel buffer is full",
            CortezError::MessageTooLarge => "message is too large",
            CortezError::TimedOut => "operation timed out",
            CortezError::Corrupt => "channel data is corrupt",
            CortezError::IoctlFailed => "kernel ioctl failed",
            CortezError::Internal => "internal library error",
            CortezError::TransactionInProgress => "another transaction is in progress",
            CortezError::ChannelStale => "channel is stale, needs recovery",
            CortezError::PeerNotFound => "peer not found in the mesh",
            CortezError::Empty => "no message available",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for CortezError {}

/// A per-handle/per-mesh slot holding the last error observed.
///
/// Operations return `Result<T>` directly; this slot exists purely for
/// parity with the original's `cortez_get_last_error` / mesh-level
/// last-error convention, for callers that drop the `Result` on the floor.
#[derive(Debug, Default)]
pub struct LastError(std::sync::atomic::AtomicI32);

impl LastError {
    pub const fn new() -> Self {
        Self(std::sync::atomic::AtomicI32::new(0))
    }

    pub fn set(&self, err: Option<CortezError>) {
        let code = err.map(error_code).unwrap_or(0);
        self.0.store(code, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<CortezError> {
        code_error(self.0.load(std::sync::atomic::Ordering::Relaxed))
    }
}

fn error_code(e: CortezError) -> i32 {
    match e {
        CortezError::InvalidArgument => 1,
        CortezError::OutOfMemory => 2,
        CortezError::ChannelExists => 3,
        CortezError::ChannelNotFound => 4,
        CortezError::MappingFailed => 5,
        CortezError::BadMagic => 6,
        CortezError::BufferFull => 7,
        CortezError::MessageTooLarge => 8,
        CortezError::TimedOut => 9,
        CortezError::Corrupt => 10,
        CortezError::IoctlFailed => 11,
        CortezError::Internal => 12,
        CortezError::TransactionInProgress => 13,
        CortezError::ChannelStale => 14,
        CortezError::PeerNotFound => 15,
        CortezError::Empty => 16,
    }
}

fn code_error(code: i32) -> Option<CortezError> {
    Some(match code {
        1 => CortezError::InvalidArgument,
        2 => CortezError::OutOfMemory,
        3 => CortezError::ChannelExists,
        4 => CortezError::ChannelNotFound,
        5 => CortezError::MappingFailed,
        6 => CortezError::BadMagic,
        7 => CortezError::BufferFull,
        8 => CortezError::MessageTooLarge,
        9 => CortezError::TimedOut,
        10 => CortezError::Corrupt,
        11 => CortezError::IoctlFailed,
        12 => CortezError::Internal,
        13 => CortezError::TransactionInProgress,
        14 => CortezError::ChannelStale,
        15 => CortezError::PeerNotFound,
        16 => CortezError::Empty,
        _ => return None,
    })
}
