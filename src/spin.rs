// Adaptive-backoff helper for the tx_head / recovery_lock CAS loops.
//
// Same progression as the teacher's `spin_lock.rs`: busy-spin, then a CPU
// pause hint, then a thread yield, then a short sleep. Used directly by
// `channel.rs` around its CAS retries rather than wrapped in a standalone
// lock type, since this spec has no shared mutex, only bare CAS fields.

/// Busy-spin, then pause, then yield, then sleep — one step per call.
///
/// - `k < 4`: busy spin (nothing)
/// - `k < 16`: `spin_loop` hint
/// - `k < 32`: `yield_now`
/// - otherwise: sleep 1ms
#[inline]
pub fn backoff(k: &mut u32) {
    if *k < 4 {
        // busy spin
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(std::time::Duration::from_millis(1));
        return;
    }
    *k += 1;
}
