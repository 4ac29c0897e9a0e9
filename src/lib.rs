// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared-memory mesh IPC over the cortez_tunnel character device: ring
// buffered channels with transactional and zero-copy writes, futex-backed
// blocking reads, stale-owner recovery, and a peer-discovery mesh built on
// top of per-process inbox channels.
//
// Linux only: the segment transport is a custom kernel char device, and
// blocking reads use a raw `futex(2)`, neither of which have portable
// equivalents.

#![cfg(target_os = "linux")]

pub mod error;
pub use error::{CortezError, LastError, Result};

mod device;
mod futex;
mod spin;

pub mod channel_name;

pub mod frame;
pub use frame::{Timestamp, MSG_GOODBYE, MSG_HEARTBEAT, MSG_REGISTER, MSG_USER_START};

pub mod channel;
pub use channel::{Channel, ChannelOptions, ChannelStats, CreatePolicy, Message, WriteTx, ZcWriteHandle};

pub mod mesh;
pub use mesh::{Mesh, MeshOptions, PeerInfo};
