// Peer discovery, liveness tracking, and the mesh send/receive façade.
//
// Grounded on `proto/service_registry.rs` for the shape of a process-local
// peer table (lock, upsert, gc-the-dead, find-by-prefix) and on the
// original's housekeeper thread for the actual wire protocol: every node
// joins a per-pid inbox channel plus the well-known registry channel,
// broadcasts `REGISTER` on startup, refreshes with periodic `HEARTBEAT`s,
// and announces `GOODBYE` on clean shutdown. A background thread drains the
// registry channel and evicts peers that stop heartbeating.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::channel::{Channel, ChannelOptions, CreatePolicy, Message, ZcWriteHandle};
use crate::channel_name;
use crate::device;
use crate::error::{CortezError, LastError, Result};
use crate::frame::{MSG_GOODBYE, MSG_HEARTBEAT, MSG_REGISTER};

pub const REGISTRY_CHANNEL_NAME: &str = "_cortez_registry";
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
pub const PEER_TIMEOUT: Duration = Duration::from_secs(10);
const HOUSEKEEPER_POLL: Duration = Duration::from_millis(100);

const INBOX_DEFAULT_SIZE: usize = 1024 * 1024;
const REGISTRY_DEFAULT_SIZE: usize = 4 * 1024 * 1024;

/// Identity of a peer as carried in registry wire messages.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub pid: i32,
    pub inbox_channel_name: String,
}

const INBOX_NAME_FIELD_LEN: usize = 64;

#[repr(C)]
struct RegistryWireMsg {
    pid: i32,
    inbox_channel_name: [u8; INBOX_NAME_FIELD_LEN],
}

const WIRE_MSG_LEN: usize = std::mem::size_of::<RegistryWireMsg>();

impl RegistryWireMsg {
    fn encode(pid: i32, inbox_name: &str) -> [u8; WIRE_MSG_LEN] {
        let mut name_buf = [0u8; INBOX_NAME_FIELD_LEN];
        let bytes = inbox_name.as_bytes();
        let len = bytes.len().min(INBOX_NAME_FIELD_LEN - 1);
        name_buf[..len].copy_from_slice(&bytes[..len]);
        let msg = RegistryWireMsg {
            pid,
            inbox_channel_name: name_buf,
        };
        unsafe { std::mem::transmute_copy(&msg) }
    }

    fn decode(bytes: &[u8]) -> Option<PeerInfo> {
        if bytes.len() < WIRE_MSG_LEN {
            return None;
        }
        let msg: RegistryWireMsg = unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const RegistryWireMsg) };
        let end = msg
            .inbox_channel_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(INBOX_NAME_FIELD_LEN);
        let name = std::str::from_utf8(&msg.inbox_channel_name[..end]).ok()?.to_string();
        Some(PeerInfo {
            pid: msg.pid,
            inbox_channel_name: name,
        })
    }
}

struct PeerEntry {
    info: PeerInfo,
    last_heartbeat: Instant,
    send_channel: Option<Channel>,
}

#[derive(Debug, Clone, Copy)]
pub struct MeshOptions {
    pub inbox_size: usize,
    pub registry_size: usize,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            inbox_size: INBOX_DEFAULT_SIZE,
            registry_size: REGISTRY_DEFAULT_SIZE,
        }
    }
}

struct MeshInner {
    node_name: String,
    pid: i32,
    inbox: Channel,
    registry: Channel,
    peers: Mutex<Vec<PeerEntry>>,
    run: Arc<AtomicBool>,
    housekeeper: Mutex<Option<JoinHandle<()>>>,
    last_error: LastError,
}

/// The mesh façade: a process's door onto the many-to-many message bus.
///
/// Construct with [`Mesh::init`]; call [`Mesh::shutdown`] (or just drop it)
/// when leaving the mesh.
pub struct Mesh(Arc<MeshInner>);

fn join_or_recover(name: &str, size: usize, policy: CreatePolicy) -> Result<Channel> {
    let opts = ChannelOptions {
        size,
        create_policy: policy,
    };
    let ch = Channel::join(name, &opts)?;
    if ch.is_stale() {
        ch.recover()?;
    }
    Ok(ch)
}

/// Best-effort human-readable process name for log lines, read from
/// `/proc/{pid}/comm`. Purely a logging nicety; falls back to the bare pid.
fn process_comm(pid: i32) -> String {
    std::fs::read_to_string(format!("/proc/{pid}/comm"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| pid.to_string())
}

impl Mesh {
    /// Join the mesh under `node_name`: creates this process's inbox,
    /// joins the shared registry channel, drains stale registry traffic,
    /// broadcasts `REGISTER`, and starts the housekeeper thread.
    /// `spec.md` §4.8/§4.9.
    pub fn init(node_name: &str, options: &MeshOptions) -> Result<Self> {
        channel_name::validate(node_name)?;
        let pid = device::current_pid();
        let inbox_name = channel_name::shorten(&format!("{node_name}-{pid}"));

        let inbox = join_or_recover(&inbox_name, options.inbox_size, CreatePolicy::CreateOrJoin)?;
        let registry = join_or_recover(
            REGISTRY_CHANNEL_NAME,
            options.registry_size,
            CreatePolicy::CreateOrJoin,
        )?;

        // Drain whatever is already sitting in the registry channel before
        // announcing ourselves, so a late joiner doesn't reprocess it as if
        // it were fresh.
        while registry.read(Some(Duration::ZERO)).is_ok() {}

        let run = Arc::new(AtomicBool::new(true));
        let inner = Arc::new(MeshInner {
            node_name: node_name.to_string(),
            pid,
            inbox,
            registry,
            peers: Mutex::new(Vec::new()),
            run: Arc::clone(&run),
            housekeeper: Mutex::new(None),
            last_error: LastError::new(),
        });

        let mesh = Mesh(inner);
        mesh.broadcast(MSG_REGISTER, &mesh.self_wire_msg())?;

        let hk_inner = Arc::clone(&mesh.0);
        let handle = std::thread::spawn(move || housekeeper_main(hk_inner, run));
        *mesh.0.housekeeper.lock().unwrap() = Some(handle);

        log::info!("mesh node '{node_name}' (pid {pid}) joined, inbox '{inbox_name}'");
        Ok(mesh)
    }

    fn self_wire_msg(&self) -> [u8; WIRE_MSG_LEN] {
        RegistryWireMsg::encode(self.0.pid, self.0.inbox.name())
    }

    fn broadcast(&self, msg_type: u16, payload: &[u8]) -> Result<()> {
        self.0.registry.write(msg_type, payload)
    }

    pub fn pid(&self) -> i32 {
        self.0.pid
    }

    pub fn inbox_name(&self) -> &str {
        self.0.inbox.name()
    }

    pub fn last_error(&self) -> Option<CortezError> {
        self.0.last_error.get()
    }

    /// List currently-known live peers.
    pub fn list_peers(&self) -> Vec<PeerInfo> {
        self.0
            .peers
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.info.clone())
            .collect()
    }

    /// Find a peer whose node name (the part of the inbox name before the
    /// trailing `-{pid}`) matches `name_prefix`.
    pub fn find_peer_by_name(&self, name_prefix: &str) -> Option<PeerInfo> {
        let needle = format!("{name_prefix}-");
        self.0
            .peers
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.info.inbox_channel_name.starts_with(&needle))
            .map(|e| e.info.clone())
    }

    fn peer_channel(&self, pid: i32) -> Result<Channel> {
        let mut peers = self.0.peers.lock().unwrap();
        let entry = peers
            .iter_mut()
            .find(|e| e.info.pid == pid)
            .ok_or(CortezError::PeerNotFound)?;
        if let Some(ch) = &entry.send_channel {
            return Ok(ch.clone());
        }
        let ch = Channel::join(&entry.info.inbox_channel_name, &ChannelOptions {
            size: INBOX_DEFAULT_SIZE,
            create_policy: CreatePolicy::JoinOnly,
        })?;
        entry.send_channel = Some(ch.clone());
        Ok(ch)
    }

    /// Send a user message to `target_pid`'s inbox. `spec.md` §4.8.
    pub fn send(&self, target_pid: i32, msg_type: u16, payload: &[u8]) -> Result<()> {
        let ch = self.peer_channel(target_pid).map_err(|e| {
            self.0.last_error.set(Some(e));
            e
        })?;
        let result = ch.write(msg_type, payload);
        self.0.last_error.set(result.err());
        result
    }

    /// Reserve space for a zero-copy send into `target_pid`'s inbox. Write
    /// the payload into the handle's `part1`/`part2` slices, then call
    /// `handle.commit(msg_type)` or `handle.abort()`. `spec.md` §4.8.
    pub fn begin_send_zc(&self, target_pid: i32, payload_size: u32) -> Result<ZcWriteHandle> {
        let ch = self.peer_channel(target_pid).map_err(|e| {
            self.0.last_error.set(Some(e));
            e
        })?;
        let result = ch.begin_write_zc(payload_size);
        if let Err(e) = &result {
            self.0.last_error.set(Some(*e));
        }
        result
    }

    /// Block waiting for the next message addressed to this node's inbox.
    pub fn read(&self, timeout: Option<Duration>) -> Result<Message> {
        self.0.inbox.read(timeout)
    }

    /// Broadcast `GOODBYE`, stop the housekeeper, and release all joined
    /// channels. `spec.md` §4.9.
    pub fn shutdown(&self) {
        let _ = self.broadcast(MSG_GOODBYE, &self.self_wire_msg());
        self.0.run.store(false, Ordering::Relaxed);
        if let Some(handle) = self.0.housekeeper.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.0.peers.lock().unwrap().clear();
        log::info!("mesh node '{}' (pid {}) left", self.0.node_name, self.0.pid);
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        // Only the last Arc reference (there is exactly one, Mesh has no
        // Clone impl) tears the mesh down; guard against double-shutdown if
        // the caller already called it explicitly.
        if self.0.run.swap(false, Ordering::Relaxed) {
            let _ = self.broadcast(MSG_GOODBYE, &self.self_wire_msg());
        }
        if let Some(handle) = self.0.housekeeper.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn upsert_peer(inner: &MeshInner, info: PeerInfo) {
    if info.pid == inner.pid {
        return;
    }
    let mut peers = inner.peers.lock().unwrap();
    match peers.iter_mut().find(|e| e.info.pid == info.pid) {
        Some(e) => e.last_heartbeat = Instant::now(),
        None => {
            log::info!(
                "peer joined: pid {} ({}) inbox '{}'",
                info.pid,
                process_comm(info.pid),
                info.inbox_channel_name
            );
            peers.push(PeerEntry {
                info,
                last_heartbeat: Instant::now(),
                send_channel: None,
            });
        }
    }
}

fn remove_peer(inner: &MeshInner, pid: i32) {
    let mut peers = inner.peers.lock().unwrap();
    if let Some(idx) = peers.iter().position(|e| e.info.pid == pid) {
        log::info!("peer left: pid {pid}");
        peers.remove(idx);
    }
}

fn evict_timed_out(inner: &MeshInner) {
    let mut peers = inner.peers.lock().unwrap();
    let now = Instant::now();
    peers.retain(|e| {
        let alive = now.duration_since(e.last_heartbeat) < PEER_TIMEOUT && device::is_pid_alive(e.info.pid);
        if !alive {
            log::warn!("peer timed out: pid {}", e.info.pid);
        }
        alive
    });
}

fn housekeeper_main(inner: Arc<MeshInner>, run: Arc<AtomicBool>) {
    let mut last_self_heartbeat = Instant::now();

    while run.load(Ordering::Relaxed) {
        while let Ok(msg) = inner.registry.read(Some(Duration::ZERO)) {
            let msg_type = msg.msg_type();
            if let Some(info) = RegistryWireMsg::decode(msg.payload()) {
                match msg_type {
                    MSG_REGISTER | MSG_HEARTBEAT => upsert_peer(&inner, info),
                    MSG_GOODBYE => remove_peer(&inner, info.pid),
                    _ => {}
                }
            }
        }

        if last_self_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
            let wire = RegistryWireMsg::encode(inner.pid, inner.inbox.name());
            let _ = inner.registry.write(MSG_HEARTBEAT, &wire);
            last_self_heartbeat = Instant::now();
        }

        evict_timed_out(&inner);
        std::thread::sleep(HOUSEKEEPER_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_msg_roundtrips() {
        let bytes = RegistryWireMsg::encode(4242, "node-4242");
        let info = RegistryWireMsg::decode(&bytes).unwrap();
        assert_eq!(info.pid, 4242);
        assert_eq!(info.inbox_channel_name, "node-4242");
    }

    #[test]
    fn wire_msg_truncates_overlong_names_safely() {
        let long = "x".repeat(200);
        let bytes = RegistryWireMsg::encode(1, &long);
        let info = RegistryWireMsg::decode(&bytes).unwrap();
        assert_eq!(info.inbox_channel_name.len(), INBOX_NAME_FIELD_LEN - 1);
    }

    #[test]
    fn mesh_options_default_sizes_are_sane() {
        let opts = MeshOptions::default();
        assert!(opts.inbox_size < opts.registry_size);
    }
}
