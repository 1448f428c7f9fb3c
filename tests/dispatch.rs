//! End-to-end dispatch tests with in-process sinks.
//!
//! None of these touch an audio device.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use traffic_sonifier::audio::{
    AudioSink, Channel, StereoBuffer, ToneBank, ToneDescriptor, ToneShape, ToneSynthesizer,
};
use traffic_sonifier::dispatch::{Classifier, DispatchLimits, Dispatcher, Offer, ToneMap};
use traffic_sonifier::error::AudioError;
use traffic_sonifier::network::{LinkType, PacketView, SyntheticTraffic};

fn short_shape() -> ToneShape {
    ToneShape {
        duration_secs: 0.02,
        ..ToneShape::default()
    }
}

fn bank() -> Arc<ToneBank> {
    let synth = ToneSynthesizer::new(short_shape()).unwrap();
    Arc::new(ToneBank::precomputed(synth, ToneMap::default().all_descriptors()))
}

fn dispatcher(limits: DispatchLimits, sink: Arc<dyn AudioSink>) -> Dispatcher {
    Dispatcher::new(Classifier::default(), limits, bank(), sink).unwrap()
}

/// Poll until `done` holds or five seconds pass
fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

/// Blocks every play until the release channel is closed
struct BlockingSink {
    release: Receiver<()>,
    entered: AtomicUsize,
}

impl BlockingSink {
    fn new() -> (Arc<Self>, Sender<()>) {
        let (release_tx, release_rx) = bounded(0);
        let sink = Arc::new(Self {
            release: release_rx,
            entered: AtomicUsize::new(0),
        });
        (sink, release_tx)
    }
}

impl AudioSink for BlockingSink {
    fn name(&self) -> &str {
        "blocking"
    }

    fn play(&self, _buffer: &StereoBuffer) -> Result<(), AudioError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let _ = self.release.recv();
        Ok(())
    }
}

/// Keeps every buffer it is given
#[derive(Default)]
struct RecordingSink {
    played: Mutex<Vec<StereoBuffer>>,
}

impl AudioSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn play(&self, buffer: &StereoBuffer) -> Result<(), AudioError> {
        self.played.lock().push(buffer.clone());
        Ok(())
    }
}

struct FailingSink;

impl AudioSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn play(&self, _buffer: &StereoBuffer) -> Result<(), AudioError> {
        Err(AudioError::StreamClosed)
    }
}

struct PanickingSink;

impl AudioSink for PanickingSink {
    fn name(&self) -> &str {
        "panicking"
    }

    fn play(&self, _buffer: &StereoBuffer) -> Result<(), AudioError> {
        panic!("device vanished");
    }
}

#[test]
fn test_forty_first_tone_is_dropped_while_forty_are_in_flight() {
    let (sink, release) = BlockingSink::new();
    let dispatcher = dispatcher(
        DispatchLimits {
            max_concurrent_tones: 5,
            max_queue_size: 40,
        },
        sink.clone(),
    );
    let tone = ToneDescriptor::new(330, Channel::Left);

    for i in 0..40 {
        assert_eq!(dispatcher.offer(tone), Offer::Accepted, "offer {}", i + 1);
    }
    assert_eq!(dispatcher.offer(tone), Offer::Dropped);
    assert_eq!(dispatcher.tracked(), 40);

    // Only the workers ever reach the sink
    assert!(wait_for(|| sink.entered.load(Ordering::SeqCst) == 5));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(sink.entered.load(Ordering::SeqCst), 5);

    drop(release);
    assert!(wait_for(|| dispatcher.outstanding() == 0));
    assert_eq!(dispatcher.offer(tone), Offer::Accepted);

    let stats = dispatcher.stats();
    assert_eq!(stats.accepted, 41);
    assert_eq!(stats.dropped, 1);

    let report = dispatcher.shutdown(Duration::from_secs(5));
    assert_eq!(report.unjoined_workers, 0);
}

#[test]
fn test_packets_map_to_tones_and_channels() {
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = dispatcher(
        DispatchLimits {
            max_concurrent_tones: 1,
            max_queue_size: 40,
        },
        sink.clone(),
    );

    let traffic = SyntheticTraffic::default();
    let offers: Vec<Option<Offer>> = (0..5)
        .map(|i| {
            let frame = traffic.packet(i);
            dispatcher.handle(&PacketView::parse(LinkType::RawIp, &frame))
        })
        .collect();
    assert_eq!(
        offers,
        vec![
            Some(Offer::Accepted),
            Some(Offer::Accepted),
            Some(Offer::Accepted),
            Some(Offer::Accepted),
            None,
        ]
    );

    dispatcher.shutdown(Duration::from_secs(5));

    let synth = ToneSynthesizer::new(short_shape()).unwrap();
    let expected = [
        ToneDescriptor::new(330, Channel::Left),
        ToneDescriptor::new(523, Channel::Right),
        ToneDescriptor::new(392, Channel::Left),
        ToneDescriptor::new(261, Channel::Right),
    ];
    let played = sink.played.lock();
    assert_eq!(played.len(), expected.len());
    for (buffer, descriptor) in played.iter().zip(expected.iter()) {
        assert_eq!(buffer.samples(), synth.render(descriptor).samples());
        let silent = match descriptor.channel {
            Channel::Left => Channel::Right,
            Channel::Right => Channel::Left,
        };
        assert_eq!(buffer.peak(silent), 0);
        assert!(buffer.peak(descriptor.channel) > 0);
    }
}

#[test]
fn test_packet_without_transport_creates_no_task() {
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = dispatcher(DispatchLimits::default(), sink.clone());

    let icmp = SyntheticTraffic::default().packet(4);
    assert_eq!(dispatcher.handle(&PacketView::parse(LinkType::RawIp, &icmp)), None);
    assert_eq!(dispatcher.handle(&PacketView::parse(LinkType::RawIp, &[0u8; 3])), None);

    let stats = dispatcher.stats();
    assert_eq!(stats.packets, 2);
    assert_eq!(stats.classified, 0);
    assert_eq!(dispatcher.tracked(), 0);

    dispatcher.shutdown(Duration::from_secs(5));
    assert!(sink.played.lock().is_empty());
}

#[test]
fn test_failed_playback_is_counted_and_frees_slot() {
    let dispatcher = dispatcher(
        DispatchLimits {
            max_concurrent_tones: 2,
            max_queue_size: 2,
        },
        Arc::new(FailingSink),
    );
    let tone = ToneDescriptor::new(261, Channel::Right);

    for _ in 0..10 {
        assert!(wait_for(|| dispatcher.outstanding() < 2));
        assert_eq!(dispatcher.offer(tone), Offer::Accepted);
    }
    assert!(wait_for(|| dispatcher.stats().failed == 10));
    assert_eq!(dispatcher.stats().played, 0);

    let report = dispatcher.shutdown(Duration::from_secs(5));
    assert_eq!(report.outstanding_tasks, 0);
}

#[test]
fn test_panicking_sink_does_not_stop_workers() {
    let dispatcher = dispatcher(
        DispatchLimits {
            max_concurrent_tones: 1,
            max_queue_size: 1,
        },
        Arc::new(PanickingSink),
    );
    let tone = ToneDescriptor::new(392, Channel::Left);

    for _ in 0..3 {
        assert!(wait_for(|| dispatcher.outstanding() == 0));
        assert_eq!(dispatcher.offer(tone), Offer::Accepted);
    }
    assert!(wait_for(|| dispatcher.outstanding() == 0));

    let report = dispatcher.shutdown(Duration::from_secs(5));
    assert_eq!(report.unjoined_workers, 0);
    assert_eq!(report.outstanding_tasks, 0);
}

#[test]
fn test_shutdown_gives_up_on_stuck_playback() {
    let (sink, release) = BlockingSink::new();
    let dispatcher = dispatcher(
        DispatchLimits {
            max_concurrent_tones: 2,
            max_queue_size: 10,
        },
        sink.clone(),
    );
    for _ in 0..4 {
        dispatcher.offer(ToneDescriptor::new(523, Channel::Right));
    }
    assert!(wait_for(|| sink.entered.load(Ordering::SeqCst) == 2));

    let report = dispatcher.shutdown(Duration::from_millis(50));
    assert_eq!(report.unjoined_workers, 2);
    assert_eq!(report.outstanding_tasks, 4);
    drop(release);
}
