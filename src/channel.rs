// Channel header, ring buffer, join/leave, transactional write, zero-copy
// write, read/peek/release, and stale-channel recovery.
//
// Grounded on the teacher's `channel.rs` (open/connect control flow, the
// general send/recv/Drop shape) and `proto/shm_ring.rs` (cursor load/store
// ordering, a shared header published via atomics). The teacher's
// fixed-256-slot epoch/broadcast ring is replaced with a variable-length
// byte ring plus an explicit two-phase transaction token, matching this
// system's single-in-flight-writer model. Where the teacher hand-rolls a
// process-local atomic refcount on its channel handle, this crate uses
// `Arc` instead: the same "last reference tears down the mapping"
// semantics, expressed with the idiomatic Rust primitive for it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::channel_name::MAX_NAME_LEN;
use crate::device;
use crate::error::{CortezError, LastError, Result};
use crate::frame::{
    FrameHeader, SkipHeader, Timestamp, FRAME_HEADER_LEN, MESSAGE_MAGIC, SKIP_HEADER_LEN, SKIP_MAGIC,
};
use crate::futex::{self, WaitOutcome};
use crate::spin;

pub const CHANNEL_MAGIC: u64 = 0xDEAD_BEEF_CAFE_FACE;

pub const DEFAULT_JOIN_SIZE: usize = 4 * 1024 * 1024;

/// Policy controlling what [`Channel::join`] does when the named channel
/// does/doesn't already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePolicy {
    CreateOrJoin,
    CreateOnly,
    JoinOnly,
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    pub size: usize,
    pub create_policy: CreatePolicy,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_JOIN_SIZE,
            create_policy: CreatePolicy::CreateOrJoin,
        }
    }
}

/// Snapshot of a channel's published health counters (`spec.md` §3/§4.2).
#[derive(Debug, Clone, Copy)]
pub struct ChannelStats {
    pub messages_written: u64,
    pub messages_read: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub write_contention_count: u64,
    pub channel_recovered_count: u64,
    pub active_connections: u32,
    pub owner_pid: i32,
    pub buffer_capacity: u64,
    pub buffer_bytes_used: u64,
}

/// Shared channel header, fixed at offset 0 of the mapped segment.
///
/// `magic`, `total_shm_size`, `buffer_capacity`, and `owner_pid` are set
/// once at creation (or during recovery) and read without atomics
/// thereafter, matching the non-`volatile` fields of the original
/// `CortezChannelHeader`. Every other field is `volatile` in the original
/// and is an atomic type here.
#[repr(C)]
struct ChannelHeader {
    magic: u64,
    futex_word: AtomicU32,
    total_shm_size: u64,
    buffer_capacity: u64,
    owner_pid: i32,
    lock: AtomicU32,
    active_connections: AtomicU32,
    head: AtomicU64,
    tail: AtomicU64,
    tx_head: AtomicU64,
    messages_written: AtomicU64,
    messages_read: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    write_contention_count: AtomicU64,
    channel_recovered_count: AtomicU64,
    // The ring buffer bytes start immediately after this header.
}

const HEADER_LEN: usize = std::mem::size_of::<ChannelHeader>();

struct ChannelInner {
    fd: std::os::unix::io::RawFd,
    name: String,
    base: *mut u8,
    mapped_size: usize,
    header: *mut ChannelHeader,
    is_owner: bool,
    stale: bool,
    local_head: AtomicU64,
    local_tail: AtomicU64,
    last_error: LastError,
}

unsafe impl Send for ChannelInner {}
unsafe impl Sync for ChannelInner {}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if !self.is_owner {
            self.header().active_connections.fetch_sub(1, Ordering::Relaxed);
        }
        unsafe {
            device::unmap(self.base, self.mapped_size);
            device::close(self.fd);
        }
        log::debug!("channel '{}' unmapped and closed", self.name);
    }
}

impl ChannelInner {
    fn header(&self) -> &ChannelHeader {
        unsafe { &*self.header }
    }

    fn buffer_ptr(&self) -> *mut u8 {
        unsafe { self.base.add(HEADER_LEN) }
    }
}

/// A reference-counted handle to a joined channel.
///
/// Cloning bumps the reference count (`Arc`); the underlying mapping is torn
/// down when the last clone is dropped, matching the spec's join/leave
/// refcounting rules.
#[derive(Clone)]
pub struct Channel(Arc<ChannelInner>);

fn get_write_space(head: u64, tail: u64, capacity: u64) -> u64 {
    if head >= tail {
        capacity - (head - tail)
    } else {
        tail - head
    }
}

fn get_read_space(head: u64, tail: u64, capacity: u64) -> u64 {
    if head >= tail {
        head - tail
    } else {
        capacity - (tail - head)
    }
}

unsafe fn copy_to_ring(buffer: *mut u8, capacity: u64, offset: u64, data: &[u8]) {
    let start = (offset % capacity) as usize;
    let cap = capacity as usize;
    let len = data.len();
    if start + len <= cap {
        std::ptr::copy_nonoverlapping(data.as_ptr(), buffer.add(start), len);
    } else {
        let part1 = cap - start;
        std::ptr::copy_nonoverlapping(data.as_ptr(), buffer.add(start), part1);
        std::ptr::copy_nonoverlapping(data[part1..].as_ptr(), buffer, len - part1);
    }
}

unsafe fn copy_from_ring(dest: *mut u8, buffer: *const u8, capacity: u64, offset: u64, len: usize) {
    let start = (offset % capacity) as usize;
    let cap = capacity as usize;
    if start + len <= cap {
        std::ptr::copy_nonoverlapping(buffer.add(start), dest, len);
    } else {
        let part1 = cap - start;
        std::ptr::copy_nonoverlapping(buffer.add(start), dest, part1);
        std::ptr::copy_nonoverlapping(buffer, dest.add(part1), len - part1);
    }
}

fn init_header(header: &mut ChannelHeader, total_size: usize, is_recovery: bool) {
    if !is_recovery {
        header.magic = CHANNEL_MAGIC;
        header.total_shm_size = total_size as u64;
        header.buffer_capacity = (total_size - HEADER_LEN) as u64;
        header.channel_recovered_count.store(0, Ordering::Relaxed);
    }
    header.owner_pid = device::current_pid();
    header.futex_word.store(0, Ordering::Relaxed);
    header.active_connections.store(0, Ordering::Relaxed);
    header.head.store(0, Ordering::Relaxed);
    header.tail.store(0, Ordering::Relaxed);
    header.tx_head.store(0, Ordering::Relaxed);
    header.messages_written.store(0, Ordering::Relaxed);
    header.messages_read.store(0, Ordering::Relaxed);
    header.bytes_written.store(0, Ordering::Relaxed);
    header.bytes_read.store(0, Ordering::Relaxed);
    header.write_contention_count.store(0, Ordering::Relaxed);
    if is_recovery {
        header.channel_recovered_count.fetch_add(1, Ordering::Relaxed);
    }
    header.lock.store(0, Ordering::Release);
}

impl Channel {
    /// Join (create or connect to) a named channel.
    pub fn join(name: &str, options: &ChannelOptions) -> Result<Self> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(CortezError::InvalidArgument);
        }

        let (tunnel, is_creator) = match options.create_policy {
            CreatePolicy::JoinOnly => (device::connect(name)?, false),
            CreatePolicy::CreateOnly => (device::create(name, options.size)?, true),
            CreatePolicy::CreateOrJoin => match device::create(name, options.size) {
                Ok(t) => (t, true),
                Err(CortezError::ChannelExists) => (device::connect(name)?, false),
                Err(e) => return Err(e),
            },
        };

        let mut map_size = tunnel.map_size;
        let mut base = unsafe { device::map(tunnel.fd, map_size)? };

        let stale;
        if is_creator {
            init_header(unsafe { &mut *(base as *mut ChannelHeader) }, map_size, false);
            stale = false;
        } else {
            let header = unsafe { &*(base as *mut ChannelHeader) };
            if header.magic != CHANNEL_MAGIC {
                unsafe {
                    device::unmap(base, map_size);
                    device::close(tunnel.fd);
                }
                return Err(CortezError::BadMagic);
            }
            let actual_size = header.total_shm_size as usize;
            if actual_size != map_size {
                unsafe { device::unmap(base, map_size) };
                map_size = actual_size;
                base = unsafe { device::map(tunnel.fd, map_size)? };
            }
            let header = unsafe { &*(base as *mut ChannelHeader) };
            header.active_connections.fetch_add(1, Ordering::Relaxed);
            stale = !device::is_pid_alive(header.owner_pid);
        }

        let header = unsafe { &*(base as *mut ChannelHeader) };
        let local_head = header.head.load(Ordering::Acquire);
        let local_tail = header.tail.load(Ordering::Acquire);

        log::info!("joined channel '{name}' (creator={is_creator}, stale={stale})");

        Ok(Channel(Arc::new(ChannelInner {
            fd: tunnel.fd,
            name: name.to_string(),
            base,
            mapped_size: map_size,
            header: base as *mut ChannelHeader,
            is_owner: is_creator,
            stale,
            local_head: AtomicU64::new(local_head),
            local_tail: AtomicU64::new(local_tail),
            last_error: LastError::new(),
        })))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Whether this handle's channel was joined with a dead owner pid.
    /// Must be recovered via [`Channel::recover`] before use.
    pub fn is_stale(&self) -> bool {
        self.0.stale
    }

    pub fn last_error(&self) -> Option<CortezError> {
        self.0.last_error.get()
    }

    fn fail(&self, e: CortezError) -> CortezError {
        self.0.last_error.set(Some(e));
        e
    }

    fn ok(&self) {
        self.0.last_error.set(None);
    }

    pub fn stats(&self) -> ChannelStats {
        let h = self.0.header();
        ChannelStats {
            messages_written: h.messages_written.load(Ordering::Relaxed),
            messages_read: h.messages_read.load(Ordering::Relaxed),
            bytes_written: h.bytes_written.load(Ordering::Relaxed),
            bytes_read: h.bytes_read.load(Ordering::Relaxed),
            write_contention_count: h.write_contention_count.load(Ordering::Relaxed),
            channel_recovered_count: h.channel_recovered_count.load(Ordering::Relaxed),
            active_connections: h.active_connections.load(Ordering::Relaxed),
            owner_pid: h.owner_pid,
            buffer_capacity: h.buffer_capacity,
            buffer_bytes_used: get_read_space(
                h.head.load(Ordering::Acquire),
                h.tail.load(Ordering::Acquire),
                h.buffer_capacity,
            ),
        }
    }

    /// Recover a stale channel: re-initialize transient header state and
    /// take ownership. `spec.md` §4.7.
    pub fn recover(&self) -> Result<()> {
        let inner = &self.0;
        let header = unsafe { &mut *inner.header };
        if header
            .lock
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(self.fail(CortezError::TransactionInProgress));
        }

        init_header(header, header.total_shm_size as usize, true);
        inner.local_head.store(0, Ordering::Relaxed);
        inner.local_tail.store(0, Ordering::Relaxed);

        log::warn!("recovered stale channel '{}'", inner.name);
        self.ok();
        Ok(())
    }

    /// Reserve `total_size` contiguous bytes (frame header + payload) for a
    /// single in-flight transaction. `spec.md` §4.4 step 1-4.
    pub fn begin_write(&self, total_size: u32) -> Result<WriteTx> {
        let inner = &self.0;
        let header = inner.header();
        if total_size == 0 {
            return Err(self.fail(CortezError::InvalidArgument));
        }
        if total_size as u64 > header.buffer_capacity {
            return Err(self.fail(CortezError::MessageTooLarge));
        }

        // At most one transaction may be in flight at a time; back off and
        // retry a bounded number of times before giving up, since the
        // holder is typically mid-copy rather than stuck.
        const MAX_ATTEMPTS: u32 = 64;
        let mut k = 0u32;
        let mut attempt = 0u32;
        loop {
            if header
                .tx_head
                .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
            header.write_contention_count.fetch_add(1, Ordering::Relaxed);
            attempt += 1;
            if attempt >= MAX_ATTEMPTS {
                return Err(self.fail(CortezError::TransactionInProgress));
            }
            spin::backoff(&mut k);
        }

        let head = header.head.load(Ordering::Relaxed);
        let tail = header.tail.load(Ordering::Acquire);

        if get_write_space(head, tail, header.buffer_capacity) <= total_size as u64 {
            header.tx_head.store(0, Ordering::Release);
            return Err(self.fail(CortezError::BufferFull));
        }

        header.tx_head.store(head + total_size as u64, Ordering::Release);
        self.ok();
        Ok(WriteTx {
            reserved_head: head,
            reserved_size: total_size,
        })
    }

    /// Abort an open transaction without publishing anything. `spec.md` §4.4.
    pub fn abort_write(&self, tx: WriteTx) {
        let _ = tx;
        self.0.header().tx_head.store(0, Ordering::Release);
    }

    /// Commit a transaction, copying `iov` in order after the frame header.
    /// `spec.md` §4.4 steps 1-6.
    pub fn commit_write(&self, tx: WriteTx, msg_type: u16, iov: &[&[u8]]) -> Result<()> {
        let inner = &self.0;
        let header = inner.header();
        let payload_len: usize = iov.iter().map(|s| s.len()).sum();

        if tx.reserved_size as usize != FRAME_HEADER_LEN + payload_len {
            header.tx_head.store(0, Ordering::Release);
            return Err(self.fail(CortezError::InvalidArgument));
        }

        let frame = FrameHeader::new(tx.reserved_size, payload_len as u32, msg_type, iov.len() as u16);
        let capacity = header.buffer_capacity;
        let buffer = inner.buffer_ptr();

        let mut offset = tx.reserved_head;
        unsafe {
            copy_to_ring(buffer, capacity, offset, frame.as_bytes());
        }
        offset += FRAME_HEADER_LEN as u64;
        for slice in iov {
            unsafe {
                copy_to_ring(buffer, capacity, offset, slice);
            }
            offset += slice.len() as u64;
        }

        header.head.store(tx.reserved_head + tx.reserved_size as u64, Ordering::Release);
        header.tx_head.store(0, Ordering::Release);
        header.futex_word.fetch_add(1, Ordering::Relaxed);
        futex::wake(&header.futex_word, 1);
        header.messages_written.fetch_add(1, Ordering::Relaxed);
        header.bytes_written.fetch_add(tx.reserved_size as u64, Ordering::Relaxed);

        self.ok();
        Ok(())
    }

    /// Copying write of a single payload slice. `spec.md` §4.4.
    pub fn write(&self, msg_type: u16, payload: &[u8]) -> Result<()> {
        self.writev(msg_type, &[payload])
    }

    /// Copying write of several payload slices concatenated in order.
    pub fn writev(&self, msg_type: u16, iov: &[&[u8]]) -> Result<()> {
        let payload_len: usize = iov.iter().map(|s| s.len()).sum();
        let total = FRAME_HEADER_LEN + payload_len;
        let tx = self.begin_write(total as u32)?;
        self.commit_write(tx, msg_type, iov)
    }

    /// Reserve space and hand back raw pointers to write a payload in place.
    /// `spec.md` §4.5.
    pub fn begin_write_zc(&self, payload_size: u32) -> Result<ZcWriteHandle> {
        if payload_size == 0 {
            return Err(self.fail(CortezError::InvalidArgument));
        }
        let total_size = FRAME_HEADER_LEN as u32 + payload_size;
        let tx = self.begin_write(total_size)?;

        let inner = &self.0;
        let capacity = inner.header().buffer_capacity;
        let buffer = inner.buffer_ptr();
        let payload_start = tx.reserved_head + FRAME_HEADER_LEN as u64;
        let start_offset = (payload_start % capacity) as usize;
        let cap = capacity as usize;

        let (part1, part2) = if start_offset + payload_size as usize <= cap {
            (
                unsafe { std::slice::from_raw_parts_mut(buffer.add(start_offset), payload_size as usize) },
                None,
            )
        } else {
            let part1_len = cap - start_offset;
            let part2_len = payload_size as usize - part1_len;
            (
                unsafe { std::slice::from_raw_parts_mut(buffer.add(start_offset), part1_len) },
                Some(unsafe { std::slice::from_raw_parts_mut(buffer, part2_len) }),
            )
        };

        self.ok();
        Ok(ZcWriteHandle {
            channel: Channel(Arc::clone(&self.0)),
            tx: Some(tx),
            part1,
            part2,
        })
    }

    /// Block on the channel's futex word until at least a frame header's
    /// worth of data is available, `timeout` elapses, or `timeout` is `None`
    /// (forever). Passing `Some(Duration::ZERO)` makes this non-blocking.
    /// `spec.md` §4.6.
    pub fn read(&self, timeout: Option<Duration>) -> Result<Message> {
        let inner = &self.0;
        let header = inner.header();

        let mut futex_val = header.futex_word.load(Ordering::Acquire);
        let mut head = header.head.load(Ordering::Acquire);
        inner.local_head.store(head, Ordering::Relaxed);
        let tail = inner.local_tail.load(Ordering::Relaxed);

        let deadline = timeout.map(|d| std::time::Instant::now() + d);

        while get_read_space(head, tail, header.buffer_capacity) < FRAME_HEADER_LEN as u64 {
            if let Some(d) = timeout {
                if d.is_zero() {
                    return Err(self.fail(CortezError::Empty));
                }
            }

            let wait_for = match deadline {
                None => None,
                Some(dl) => {
                    let now = std::time::Instant::now();
                    if now >= dl {
                        return Err(self.fail(CortezError::TimedOut));
                    }
                    Some(dl - now)
                }
            };

            match futex::wait(&header.futex_word, futex_val, wait_for)? {
                WaitOutcome::TimedOut => return Err(self.fail(CortezError::TimedOut)),
                WaitOutcome::Woken => {}
            }

            futex_val = header.futex_word.load(Ordering::Acquire);
            head = header.head.load(Ordering::Acquire);
            inner.local_head.store(head, Ordering::Relaxed);
        }

        self.peek()
    }

    /// Non-blocking peek at the next frame. `spec.md` §4.6.
    pub fn peek(&self) -> Result<Message> {
        let inner = &self.0;
        let header = inner.header();
        let capacity = header.buffer_capacity;

        let head = header.head.load(Ordering::Acquire);
        inner.local_head.store(head, Ordering::Relaxed);
        let tail = inner.local_tail.load(Ordering::Relaxed);
        let available = get_read_space(head, tail, capacity);

        if available < FRAME_HEADER_LEN as u64 {
            return Err(self.fail(CortezError::Empty));
        }

        let buffer = inner.buffer_ptr();
        let tail_offset = (tail % capacity) as usize;
        let cap = capacity as usize;

        let header_wraps = tail_offset + FRAME_HEADER_LEN > cap;
        let frame = if header_wraps {
            let mut scratch = vec![0u8; FRAME_HEADER_LEN];
            unsafe {
                copy_from_ring(scratch.as_mut_ptr(), buffer, capacity, tail, FRAME_HEADER_LEN);
            }
            unsafe { FrameHeader::from_bytes(&scratch) }
        } else {
            unsafe { std::ptr::read_unaligned(buffer.add(tail_offset) as *const FrameHeader) }
        };

        if frame.magic == SKIP_MAGIC {
            let skip = if header_wraps {
                let mut scratch = vec![0u8; SKIP_HEADER_LEN];
                unsafe {
                    copy_from_ring(scratch.as_mut_ptr(), buffer, capacity, tail, SKIP_HEADER_LEN);
                }
                unsafe { SkipHeader::from_bytes(&scratch) }
            } else {
                unsafe { std::ptr::read_unaligned(buffer.add(tail_offset) as *const SkipHeader) }
            };
            let new_tail = tail + skip.total_len as u64;
            inner.local_tail.store(new_tail, Ordering::Relaxed);
            header.tail.store(new_tail, Ordering::Release);
            return self.peek();
        }

        if frame.magic != MESSAGE_MAGIC {
            return Err(self.fail(CortezError::Corrupt));
        }
        if available < frame.total_len as u64 {
            return Err(self.fail(CortezError::Empty));
        }

        let payload_len = frame.payload_len as usize;
        let payload = if tail_offset + frame.total_len as usize > cap {
            let mut owned = vec![0u8; payload_len];
            unsafe {
                copy_from_ring(
                    owned.as_mut_ptr(),
                    buffer,
                    capacity,
                    tail + FRAME_HEADER_LEN as u64,
                    payload_len,
                );
            }
            MessagePayload::Owned(owned)
        } else {
            MessagePayload::Borrowed {
                ptr: unsafe { buffer.add(tail_offset + FRAME_HEADER_LEN) },
                len: payload_len,
            }
        };

        self.ok();
        Ok(Message {
            channel: Channel(Arc::clone(&self.0)),
            total_len: frame.total_len,
            msg_type: frame.msg_type,
            sender_pid: frame.sender_pid,
            timestamp: frame.timestamp,
            payload,
        })
    }

    fn release(&self, total_len: u32) {
        let inner = &self.0;
        let header = inner.header();
        let new_tail = inner.local_tail.load(Ordering::Relaxed) + total_len as u64;
        inner.local_tail.store(new_tail, Ordering::Relaxed);
        header.tail.store(new_tail, Ordering::Release);
        header.messages_read.fetch_add(1, Ordering::Relaxed);
        header.bytes_read.fetch_add(total_len as u64, Ordering::Relaxed);
    }
}

/// A reservation made by [`Channel::begin_write`], consumed by
/// [`Channel::commit_write`] or [`Channel::abort_write`].
pub struct WriteTx {
    reserved_head: u64,
    reserved_size: u32,
}

/// A zero-copy write in progress: up to two slices into the ring covering
/// exactly the reserved payload, filled by the caller and then committed or
/// aborted.
pub struct ZcWriteHandle {
    channel: Channel,
    tx: Option<WriteTx>,
    part1: &'static mut [u8],
    part2: Option<&'static mut [u8]>,
}

impl ZcWriteHandle {
    pub fn part1(&mut self) -> &mut [u8] {
        self.part1
    }

    pub fn part2(&mut self) -> Option<&mut [u8]> {
        self.part2.as_deref_mut()
    }

    /// Compose and publish the frame header, then release the transaction.
    /// `spec.md` §4.5.
    pub fn commit(mut self, msg_type: u16) -> Result<()> {
        let tx = self.tx.take().expect("tx present until commit/drop");
        let inner = &self.channel.0;
        let header = inner.header();
        let payload_len = self.part1.len() + self.part2.as_ref().map(|p| p.len()).unwrap_or(0);

        let frame = FrameHeader::new(tx.reserved_size, payload_len as u32, msg_type, 1);
        unsafe {
            copy_to_ring(inner.buffer_ptr(), header.buffer_capacity, tx.reserved_head, frame.as_bytes());
        }

        header.head.store(tx.reserved_head + tx.reserved_size as u64, Ordering::Release);
        header.tx_head.store(0, Ordering::Release);
        header.futex_word.fetch_add(1, Ordering::Relaxed);
        futex::wake(&header.futex_word, 1);
        header.messages_written.fetch_add(1, Ordering::Relaxed);
        header.bytes_written.fetch_add(tx.reserved_size as u64, Ordering::Relaxed);

        self.channel.ok();
        Ok(())
    }

    /// Discard the reservation without publishing anything.
    pub fn abort(mut self) {
        if let Some(tx) = self.tx.take() {
            self.channel.abort_write(tx);
        }
    }
}

impl Drop for ZcWriteHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.channel.abort_write(tx);
        }
    }
}

enum MessagePayload {
    Borrowed { ptr: *const u8, len: usize },
    Owned(Vec<u8>),
}

/// A received message, borrowed from the ring until dropped (or explicitly
/// [`Message::release`]d), at which point the channel's tail cursor advances
/// past it. `spec.md` §3 "Received message", §9 "Reader-surface aliasing".
pub struct Message {
    channel: Channel,
    total_len: u32,
    msg_type: u16,
    sender_pid: i32,
    timestamp: Timestamp,
    payload: MessagePayload,
}

impl Message {
    pub fn msg_type(&self) -> u16 {
        self.msg_type
    }

    pub fn sender_pid(&self) -> i32 {
        self.sender_pid
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn payload(&self) -> &[u8] {
        match &self.payload {
            MessagePayload::Borrowed { ptr, len } => unsafe { std::slice::from_raw_parts(*ptr, *len) },
            MessagePayload::Owned(v) => v,
        }
    }

    /// Explicitly release the message, advancing the channel's tail.
    /// Equivalent to dropping it; provided for call sites that want to
    /// mirror the spec's peek/release pairing by name.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        self.channel.release(self.total_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_space_and_read_space_are_complementary() {
        let capacity = 1024u64;
        assert_eq!(get_write_space(100, 0, capacity), capacity - 100);
        assert_eq!(get_read_space(100, 0, capacity), 100);
    }

    #[test]
    fn header_len_leaves_room_for_a_ring() {
        assert!(HEADER_LEN > 0 && HEADER_LEN < 256);
    }

    #[test]
    fn options_default_to_create_or_join() {
        let opts = ChannelOptions::default();
        assert_eq!(opts.create_policy, CreatePolicy::CreateOrJoin);
        assert_eq!(opts.size, DEFAULT_JOIN_SIZE);
    }
}
