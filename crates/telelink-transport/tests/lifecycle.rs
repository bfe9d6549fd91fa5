mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use bytes::Bytes;
use telelink_frame::{FrameDecoder, FrameEncoder};
use telelink_transport::{
    ChannelId, ConnectionFactory, Error, Handlers, Identity, Link, LinkEvent, Transport, TransportError,
    MAX_CHANNELS,
};

use common::{isolated_factory, TIMEOUT};

/// In-memory transport: records outgoing frames, flags when closed.
struct Loopback {
    sent: Arc<Mutex<Vec<Bytes>>>,
    released: Arc<AtomicBool>,
}

impl Transport for Loopback {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

struct Harness {
    link: Link,
    sent: Arc<Mutex<Vec<Bytes>>>,
    released: Arc<AtomicBool>,
}

fn open_loopback(
    factory: &ConnectionFactory,
) -> (telelink_transport::Connection, Harness) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(AtomicBool::new(false));
    let mut link_slot = None;
    let conn = factory
        .open_with(Identity::new(1, 240), Handlers::new(), |link| {
            link_slot = Some(link.clone());
            Ok(Loopback {
                sent: Arc::clone(&sent),
                released: Arc::clone(&released),
            })
        })
        .unwrap();
    let harness = Harness {
        link: link_slot.unwrap(),
        sent,
        released,
    };
    (conn, harness)
}

#[test]
fn loopback_round_trip_and_close() {
    let factory = isolated_factory();
    let (conn, harness) = open_loopback(&factory);
    let channel = conn.channel();
    assert!(factory.registry().is_allocated(channel));
    assert_eq!(conn.transport_name(), "loopback");

    let (tx, rx) = mpsc::channel();
    conn.subscribe(move |msg, ch| tx.send((msg.clone(), ch)).unwrap());

    conn.send_message(0, &[1, 2, 3]).unwrap();
    conn.send_message(0, &[4]).unwrap();
    let frames = harness.sent.lock().unwrap().clone();
    assert_eq!(frames.len(), 2);

    // Feed what we sent back in, as if the peer echoed it.
    let mut decoder = FrameDecoder::new();
    for frame in &frames {
        decoder.push(frame);
    }
    harness.link.ingest(harness.link.channel(), &mut decoder);

    let (first, ch) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(ch, channel);
    assert_eq!(first.seq, 0);
    assert_eq!((first.system_id, first.component_id), (1, 240));
    assert_eq!(&first.payload[..], &[1, 2, 3]);
    let (second, _) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(second.seq, 1);

    let stats = conn.stats();
    assert_eq!(stats.tx_frames, 2);
    assert_eq!(stats.rx_messages, 2);

    conn.close();
    conn.close();
    assert!(!conn.is_open());
    assert!(harness.released.load(Ordering::SeqCst));
    assert!(!factory.registry().is_allocated(channel));
    assert!(matches!(
        conn.send_bytes(&b"late"[..]),
        Err(Error::Transport(TransportError::Closed))
    ));
}

#[test]
fn dropping_connection_releases_channel() {
    let factory = isolated_factory();
    let (conn, harness) = open_loopback(&factory);
    let channel = conn.channel();
    drop(conn);
    assert!(harness.released.load(Ordering::SeqCst));
    assert!(!factory.registry().is_allocated(channel));
    assert_eq!(factory.registry().available(), MAX_CHANNELS);
}

#[test]
fn failure_emits_event_and_closes() {
    let factory = isolated_factory();
    let (conn, harness) = open_loopback(&factory);
    let (tx, rx) = mpsc::channel();
    conn.subscribe_events(move |event| {
        let tag = match event {
            LinkEvent::Failed(_) => "failed",
            LinkEvent::Closed => "closed",
            _ => "other",
        };
        tx.send(tag).unwrap();
    });

    harness
        .link
        .fail(TransportError::Disconnected { transport: "loopback" });

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "failed");
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "closed");
    assert!(!conn.is_open());
    assert_eq!(factory.registry().available(), MAX_CHANNELS);
}

#[test]
fn forwarded_messages_keep_their_origin() {
    let factory = isolated_factory();
    let (conn, harness) = open_loopback(&factory);

    let foreign = FrameEncoder::new(7, 1).finalize(30, b"att").unwrap();
    let mut decoder = FrameDecoder::new();
    decoder.push(&foreign);
    let message = decoder.next_message().unwrap().unwrap();

    conn.send(&message).unwrap();
    let sent = harness.sent.lock().unwrap().clone();
    assert_eq!(sent, vec![foreign]);
}

#[test]
fn concurrent_opens_get_distinct_channels() {
    let factory = isolated_factory();
    let (tx, rx) = mpsc::channel();

    thread::scope(|scope| {
        for _ in 0..MAX_CHANNELS {
            let tx = tx.clone();
            let factory = &factory;
            scope.spawn(move || {
                let (conn, _harness) = open_loopback(factory);
                tx.send(conn).unwrap();
            });
        }
    });
    drop(tx);

    let conns: Vec<_> = rx.iter().collect();
    let mut ids: Vec<ChannelId> = conns.iter().map(|c| c.channel()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), MAX_CHANNELS);

    let err = factory
        .open_with(Identity::new(1, 1), Handlers::new(), |_link| -> Result<Loopback, TransportError> {
            unreachable!("no channel should be available")
        })
        .unwrap_err();
    assert!(matches!(err, Error::ResourceExhausted { max: MAX_CHANNELS }));

    drop(conns);
    assert_eq!(factory.registry().available(), MAX_CHANNELS);
}

#[test]
fn descriptor_ids_override_defaults() {
    let factory = isolated_factory();
    let conn = factory.open("udp://127.0.0.1:0@?ids=42,190", 1, 240).unwrap();
    assert_eq!(conn.system_id(), 42);
    assert_eq!(conn.component_id(), 190);
}

#[test]
fn handlers_given_at_open_see_frames_read_during_open() {
    let factory = isolated_factory();
    let (tx, rx) = mpsc::channel();
    let handlers = Handlers::new().on_message(move |msg, ch| tx.send((msg.msg_id, ch)).unwrap());

    let conn = factory
        .open_with(Identity::new(1, 1), handlers, |link| {
            // A peer that talks as soon as the transport is up.
            let mut decoder = FrameDecoder::new();
            decoder.push(&FrameEncoder::new(1, 1).finalize(0, b"hb").unwrap());
            link.ingest(link.channel(), &mut decoder);
            Ok(Loopback {
                sent: Arc::default(),
                released: Arc::default(),
            })
        })
        .unwrap();

    assert_eq!(rx.try_recv().unwrap(), (0, conn.channel()));
    assert_eq!(conn.stats().rx_messages, 1);
}
