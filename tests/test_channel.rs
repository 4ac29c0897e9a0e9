// Channel integration tests: solo echo, wrap-around, full-then-drain,
// stale-owner recovery, and transaction abort (`spec.md` §8's concrete
// scenarios). Each test claims its own channel name so tests can run
// concurrently without colliding on the same tunnel device segment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cortez_mesh_ipc::{Channel, ChannelOptions, CortezError, CreatePolicy};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{tag}-{}-{n}", std::process::id())
}

fn small_channel(tag: &str) -> Channel {
    Channel::join(
        &unique_name(tag),
        &ChannelOptions {
            size: 64 * 1024,
            create_policy: CreatePolicy::CreateOnly,
        },
    )
    .expect("join")
}

#[test]
fn solo_echo_roundtrips_a_message() {
    let ch = small_channel("echo");
    ch.write(101, b"hello").expect("write");
    let msg = ch.read(Some(Duration::from_secs(1))).expect("read");
    assert_eq!(msg.payload(), b"hello");
    assert_eq!(msg.msg_type(), 101);
    assert_eq!(msg.sender_pid(), std::process::id() as i32);
}

#[test]
fn read_on_empty_channel_times_out() {
    let ch = small_channel("empty");
    let err = ch.read(Some(Duration::from_millis(50))).unwrap_err();
    assert_eq!(err, CortezError::TimedOut);
}

#[test]
fn non_blocking_read_on_empty_channel_is_empty_not_timed_out() {
    let ch = small_channel("nonblocking");
    let err = ch.read(Some(Duration::ZERO)).unwrap_err();
    assert_eq!(err, CortezError::Empty);
}

#[test]
fn many_messages_wrap_the_ring_buffer() {
    let ch = small_channel("wrap");
    let payload = vec![0x42u8; 200];

    // Enough iterations to wrap past the 64 KiB ring several times over.
    for i in 0..2000u32 {
        ch.write(200, &payload).expect("write");
        let msg = ch.read(Some(Duration::from_secs(1))).expect("read");
        assert_eq!(msg.payload(), payload.as_slice());
        assert_eq!(msg.msg_type(), 200);
        let _ = i;
    }

    let stats = ch.stats();
    assert_eq!(stats.messages_written, 2000);
    assert_eq!(stats.messages_read, 2000);
}

#[test]
fn fill_then_drain_recovers_full_capacity() {
    let ch = small_channel("full-drain");
    let payload = vec![0u8; 512];

    let mut written = 0;
    loop {
        match ch.write(1, &payload) {
            Ok(()) => written += 1,
            Err(CortezError::BufferFull) => break,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert!(written > 0);

    for _ in 0..written {
        ch.read(Some(Duration::from_secs(1))).expect("read");
    }

    // The ring is now fully drained; a fresh round of writes must succeed
    // exactly as many times as before.
    let mut written_again = 0;
    loop {
        match ch.write(1, &payload) {
            Ok(()) => written_again += 1,
            Err(CortezError::BufferFull) => break,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(written, written_again);
}

#[test]
fn message_too_large_is_rejected_without_side_effects() {
    let ch = small_channel("too-large");
    let huge = vec![0u8; 10 * 1024 * 1024];
    let err = ch.write(1, &huge).unwrap_err();
    assert_eq!(err, CortezError::MessageTooLarge);
    assert_eq!(ch.stats().messages_written, 0);
}

#[test]
fn abort_write_leaves_no_trace_and_unblocks_future_writes() {
    let ch = small_channel("abort");
    let tx = ch.begin_write(64).expect("begin");
    ch.abort_write(tx);

    // The transaction slot must be free again for the next writer.
    let tx2 = ch.begin_write(64).expect("begin after abort");
    ch.commit_write(tx2, 1, &[&[1, 2, 3, 4]]).expect("commit");

    assert_eq!(ch.stats().messages_written, 1);
}

#[test]
fn zero_copy_write_is_visible_to_the_reader() {
    let ch = small_channel("zc");
    let mut zc = ch.begin_write_zc(8).expect("begin zc");
    zc.part1()[..8].copy_from_slice(b"zerocopy");
    zc.commit(150).expect("commit zc");

    let msg = ch.read(Some(Duration::from_secs(1))).expect("read");
    assert_eq!(msg.payload(), b"zerocopy");
    assert_eq!(msg.msg_type(), 150);
}

#[test]
fn join_with_join_only_policy_fails_on_missing_channel() {
    let name = unique_name("missing");
    let err = Channel::join(
        &name,
        &ChannelOptions {
            size: 4096,
            create_policy: CreatePolicy::JoinOnly,
        },
    )
    .unwrap_err();
    assert_eq!(err, CortezError::ChannelNotFound);
}

#[test]
fn second_creator_with_create_only_policy_sees_channel_exists() {
    let name = unique_name("exists");
    let opts = ChannelOptions {
        size: 4096,
        create_policy: CreatePolicy::CreateOnly,
    };
    let _first = Channel::join(&name, &opts).expect("first create");
    let err = Channel::join(&name, &opts).unwrap_err();
    assert_eq!(err, CortezError::ChannelExists);
}

#[test]
fn stats_report_buffer_bytes_used() {
    let ch = small_channel("stats");
    assert_eq!(ch.stats().buffer_bytes_used, 0);
    ch.write(1, &[0u8; 100]).expect("write");
    assert!(ch.stats().buffer_bytes_used > 0);
}
