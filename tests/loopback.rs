use bytes::Bytes;
use castwire::codec::passthrough::{
    PassthroughAudioDecoder, PassthroughAudioEncoder, PassthroughVideoDecoder,
    PassthroughVideoEncoder, samples_to_bytes,
};
use castwire::config::SessionConfig;
use castwire::display::{ChannelPresenter, RingAudioOutput};
use castwire::pipeline::receiver::{DecoderFactories, ReceiverCoordinator};
use castwire::pipeline::sender::SenderCoordinator;
use castwire::pipeline::{ManualClock, MediaKind, RawFrame, Timestamp};
use castwire::transport::memory;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;

fn session_config() -> SessionConfig {
    SessionConfig {
        keyframe_interval: 5,
        presenter_depth: 64,
        ..SessionConfig::default()
    }
}

fn video_frame(index: i64) -> RawFrame {
    RawFrame::video(
        Bytes::from(vec![index as u8; 16]),
        Timestamp::from_micros(index * 33_000),
        2,
        2,
    )
}

/// 10 ms of mono audio at 48 kHz
fn audio_frame(index: i64) -> RawFrame {
    RawFrame::audio(
        samples_to_bytes(&[0.1; 480]),
        Timestamp::from_micros(index * 10_000),
        48_000,
        1,
        480,
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

struct Session {
    sender: SenderCoordinator,
    receiver: ReceiverCoordinator,
    shown: mpsc::Receiver<castwire::pipeline::DecodedVideoFrame>,
}

fn launch(config: SessionConfig) -> Session {
    let (near, far) = memory::loopback(config.channel_capacity);
    let (outbound, _) = near.split();
    let (_, inbound) = far.split();

    let mut receiver = ReceiverCoordinator::new(config.clone());
    let (presenter, shown) = ChannelPresenter::channel(config.presenter_depth);
    let clock = ManualClock::new();
    receiver
        .launch(
            inbound,
            DecoderFactories {
                video: PassthroughVideoDecoder::factory(),
                audio: PassthroughAudioDecoder::factory(),
            },
            presenter,
            clock.clone(),
            RingAudioOutput::new(48_000, clock),
        )
        .unwrap();

    let mut sender = SenderCoordinator::new(config);
    sender.launch(outbound).unwrap();

    Session {
        sender,
        receiver,
        shown,
    }
}

#[tokio::test]
async fn test_video_recovers_from_first_keyframe_race() {
    let Session {
        mut sender,
        mut receiver,
        mut shown,
    } = launch(session_config());

    let (tx, rx) = mpsc::channel(32);
    sender
        .start(Box::new(PassthroughVideoEncoder::new(Some(30.0))), rx)
        .unwrap();

    tx.send(video_frame(0)).await.unwrap();
    assert!(wait_until(|| receiver.is_kind_ready(MediaKind::Video)).await);
    for i in 1..=10 {
        tx.send(video_frame(i)).await.unwrap();
    }
    drop(tx);

    sender.join().await;
    receiver.join().await;
    receiver.stop().await;

    let mut stamps = Vec::new();
    while let Some(frame) = shown.recv().await {
        stamps.push(frame.timestamp.micros / 1000);
    }

    // frame 0 may lose the race against its config; the keyframe at 5
    // re-anchors the stream either way
    assert!(stamps.ends_with(&[165, 198, 231, 264, 297, 330]), "{stamps:?}");
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(sender.health().frames_encoded.load(Ordering::Relaxed), 11);
    assert_eq!(
        sender.health().keyframes_processed.load(Ordering::Relaxed),
        3
    );
}

#[tokio::test]
async fn test_audio_is_gated_then_scheduled_in_order() {
    let Session {
        mut sender,
        mut receiver,
        shown: _shown,
    } = launch(session_config());

    let (tx, rx) = mpsc::channel(32);
    sender
        .start(Box::new(PassthroughAudioEncoder::new()), rx)
        .unwrap();
    for i in 0..6 {
        tx.send(audio_frame(i)).await.unwrap();
    }
    drop(tx);

    sender.join().await;
    receiver.join().await;

    // audio rides the reliable channel behind its config, nothing is lost
    let health = receiver.health();
    assert_eq!(health.audio_scheduled.load(Ordering::Relaxed), 6);
    assert_eq!(health.not_ready_drops.load(Ordering::Relaxed), 0);
    assert_eq!(health.audio_resyncs.load(Ordering::Relaxed), 0);
    assert!(receiver.is_kind_ready(MediaKind::Audio));
    assert!(!receiver.is_kind_ready(MediaKind::Video));

    receiver.stop().await;
    assert!(!receiver.is_ready());
}

#[tokio::test]
async fn test_paused_sender_drops_frames() {
    let Session {
        mut sender,
        mut receiver,
        shown: _shown,
    } = launch(session_config());

    let (tx, rx) = mpsc::channel(32);
    sender
        .start(Box::new(PassthroughAudioEncoder::new()), rx)
        .unwrap();
    sender.pause();
    assert!(sender.state().is_paused());
    for i in 0..3 {
        tx.send(audio_frame(i)).await.unwrap();
    }
    assert!(
        wait_until(|| sender.health().inactive_drops.load(Ordering::Relaxed) == 3).await
    );

    sender.resume();
    tx.send(audio_frame(3)).await.unwrap();
    drop(tx);
    sender.join().await;
    receiver.join().await;

    assert_eq!(sender.health().frames_encoded.load(Ordering::Relaxed), 1);
    assert_eq!(receiver.health().audio_scheduled.load(Ordering::Relaxed), 1);
}
