// The cortez_tunnel character device contract (external collaborator,
// `spec.md` §4.1/§6). This module owns every `unsafe`/`libc` syscall used to
// talk to it, the way the teacher's `platform/posix.rs` isolates its own
// `shm_open`/`mmap` surface — but the actual mechanism differs: this device
// is a custom Linux char device reached through two ioctls and an `mmap`,
// not POSIX shared memory.
//
// Ioctl numbers and the `tunnel_create_t` layout are pinned by the original
// kernel module (`k-module/cortez_tunnel.c`,
// `tunnel-kernel-module/cortez_tunnel_shared.h`).

use std::ffi::CString;
use std::os::unix::io::RawFd;

use crate::channel_name::{self, NAME_BUF_LEN};
use crate::error::{CortezError, Result};

pub const DEVICE_PATH: &str = "/dev/cortez_tunnel";

/// 16 MiB, the kernel driver's hard cap on a single tunnel's size.
pub const MAX_SEGMENT_SIZE: usize = 16 * 1024 * 1024;

const TUNNEL_MAGIC: u8 = b't';

const fn ioc_write(nr: u8, size: usize) -> libc::c_ulong {
    const DIR_WRITE: libc::c_ulong = 1;
    const NRSHIFT: u32 = 0;
    const TYPESHIFT: u32 = NRSHIFT + 8;
    const SIZESHIFT: u32 = TYPESHIFT + 8;
    const DIRSHIFT: u32 = SIZESHIFT + 14;
    (DIR_WRITE << DIRSHIFT)
        | ((TUNNEL_MAGIC as libc::c_ulong) << TYPESHIFT)
        | ((nr as libc::c_ulong) << NRSHIFT)
        | ((size as libc::c_ulong) << SIZESHIFT)
}

/// `tunnel_create_t` from the kernel header: `{char name[32]; unsigned long size;}`.
#[repr(C)]
struct TunnelCreate {
    name: [u8; NAME_BUF_LEN],
    size: u64,
}

fn tunnel_create_ioctl() -> libc::c_ulong {
    // The ioctl command's size field encodes sizeof(the argument), and the
    // argument passed to TUNNEL_CREATE is a `tunnel_create_t *`, not the
    // struct itself — matching `_IOW('t', 1, tunnel_create_t *)`.
    ioc_write(1, std::mem::size_of::<*const TunnelCreate>())
}

fn tunnel_connect_ioctl() -> libc::c_ulong {
    ioc_write(2, std::mem::size_of::<*const u8>())
}

/// Round `size` up to the next page multiple, matching the kernel's
/// `PAGE_ALIGN`.
pub fn page_align(size: usize) -> usize {
    let page = page_size();
    (size + page - 1) / page * page
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// An open file descriptor bound to a tunnel, plus the size the caller
/// should map.
pub struct TunnelHandle {
    pub fd: RawFd,
    /// Size to pass to `mmap` — for a freshly created tunnel this is the
    /// aligned requested size; for a bare connect it is one page (enough to
    /// read the header's authoritative `total_shm_size` before remapping).
    pub map_size: usize,
}

/// Issue `TUNNEL_CREATE`. Maps `EEXIST` to [`CortezError::ChannelExists`].
pub fn create(name: &str, requested_size: usize) -> Result<TunnelHandle> {
    let fd = open_device()?;
    let name_buf = channel_name::to_device_buf(name)?;
    let aligned = page_align(requested_size);
    if aligned == 0 || aligned > MAX_SEGMENT_SIZE {
        unsafe { libc::close(fd) };
        return Err(CortezError::InvalidArgument);
    }

    let info = TunnelCreate {
        name: name_buf,
        size: aligned as u64,
    };

    let rc = unsafe { libc::ioctl(fd, tunnel_create_ioctl(), &info as *const TunnelCreate) };
    if rc != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        unsafe { libc::close(fd) };
        return Err(match errno {
            libc::EEXIST => CortezError::ChannelExists,
            _ => CortezError::IoctlFailed,
        });
    }

    Ok(TunnelHandle { fd, map_size: aligned })
}

/// Issue `TUNNEL_CONNECT`. Maps `ENOENT` to [`CortezError::ChannelNotFound`].
pub fn connect(name: &str) -> Result<TunnelHandle> {
    let fd = open_device()?;
    let name_buf = channel_name::to_device_buf(name)?;

    let rc = unsafe { libc::ioctl(fd, tunnel_connect_ioctl(), name_buf.as_ptr()) };
    if rc != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        unsafe { libc::close(fd) };
        return Err(match errno {
            libc::ENOENT => CortezError::ChannelNotFound,
            _ => CortezError::IoctlFailed,
        });
    }

    Ok(TunnelHandle {
        fd,
        map_size: page_size(),
    })
}

fn open_device() -> Result<RawFd> {
    let path = CString::new(DEVICE_PATH).map_err(|_| CortezError::Internal)?;
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
    if fd < 0 {
        return Err(CortezError::MappingFailed);
    }
    Ok(fd)
}

/// Map `size` bytes of the tunnel's memory, read-write, shared.
///
/// # Safety
/// `fd` must be a valid, still-open descriptor bound to a tunnel.
pub unsafe fn map(fd: RawFd, size: usize) -> Result<*mut u8> {
    let ptr = libc::mmap(
        std::ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        0,
    );
    if ptr == libc::MAP_FAILED {
        return Err(CortezError::MappingFailed);
    }
    Ok(ptr as *mut u8)
}

/// # Safety
/// `ptr`/`size` must describe a live mapping created by [`map`].
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    libc::munmap(ptr as *mut libc::c_void, size);
}

/// # Safety
/// `fd` must be a valid, open descriptor not used again afterward.
pub unsafe fn close(fd: RawFd) {
    libc::close(fd);
}

/// Probe whether `pid` is alive via `kill(pid, 0)`, matching the original's
/// `is_pid_alive`: success or any errno other than `ESRCH` is "alive".
pub fn is_pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

pub fn current_pid() -> i32 {
    unsafe { libc::getpid() }
}
