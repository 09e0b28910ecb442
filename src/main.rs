use anyhow::Result;
use bytes::Bytes;
use castwire::codec::passthrough::{
    PassthroughAudioDecoder, PassthroughAudioEncoder, PassthroughVideoDecoder,
    PassthroughVideoEncoder, samples_to_bytes,
};
use castwire::config::{SessionConfig, app_name, version};
use castwire::display::{ChannelPresenter, RingAudioOutput};
use castwire::pipeline::receiver::{DecoderFactories, ReceiverCoordinator};
use castwire::pipeline::sender::SenderCoordinator;
use castwire::pipeline::{MonotonicClock, RawFrame, Timestamp};
use castwire::transport::memory;
use clap::{Arg, ArgAction, Command};
use log::info;
use std::time::Duration;
use tokio::sync::mpsc;

const FRAME_RATE: u64 = 30;
const WIDTH: u32 = 64;
const HEIGHT: u32 = 36;
const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u16 = 2;
const AUDIO_BUFFER_MS: u64 = 20;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Session config file (JSON).")
                .required(false),
        )
        .arg(
            Arg::new("frames")
                .short('f')
                .long("frames")
                .value_name("COUNT")
                .help("Video frames to send.")
                .value_parser(clap::value_parser!(u64))
                .default_value("90"),
        )
        .arg(
            Arg::new("keyframe-interval")
                .short('k')
                .long("keyframe-interval")
                .value_name("FRAMES")
                .help("Force a keyframe every this many frames.")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("no-audio")
                .long("no-audio")
                .help("Send video only.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-video")
                .long("no-video")
                .help("Send audio only.")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => SessionConfig::from_path(path)?,
        None => SessionConfig::default(),
    };
    if let Some(interval) = matches.get_one::<u32>("keyframe-interval") {
        config.keyframe_interval = *interval;
    }
    config.validate()?;

    let frames = matches.get_one::<u64>("frames").copied().unwrap_or(90);
    let with_video = !matches.get_flag("no-video");
    let with_audio = !matches.get_flag("no-audio");

    info!(
        "{} {}: loopback session, {} frames (video: {}, audio: {})",
        app_name(),
        version(),
        frames,
        with_video,
        with_audio
    );

    let (near, far) = memory::loopback(config.channel_capacity);
    let (outbound, _) = near.split();
    let (_, inbound) = far.split();

    // Receiver
    let mut receiver = ReceiverCoordinator::new(config.clone());
    let (presenter, mut shown) = ChannelPresenter::channel(config.presenter_depth);
    let clock = MonotonicClock::new();
    let audio_output = RingAudioOutput::new(SAMPLE_RATE as usize * CHANNELS as usize, clock.clone());
    let reader = audio_output.reader();
    receiver.launch(
        inbound,
        DecoderFactories {
            video: PassthroughVideoDecoder::factory(),
            audio: PassthroughAudioDecoder::factory(),
        },
        presenter,
        clock,
        audio_output,
    )?;

    let display = tokio::spawn(async move {
        let mut count = 0u64;
        while let Some(frame) = shown.recv().await {
            count += 1;
            if count == 1 {
                info!("First frame shown: {}x{}", frame.width, frame.height);
            }
        }
        count
    });
    let playback = tokio::spawn(async move {
        let mut device = vec![0.0f32; (SAMPLE_RATE as usize / 50) * CHANNELS as usize];
        let mut interval = tokio::time::interval(Duration::from_millis(AUDIO_BUFFER_MS));
        let mut played = 0usize;
        for _ in 0..200 {
            interval.tick().await;
            played += reader.read(&mut device);
        }
        played
    });

    // Sender
    let mut sender = SenderCoordinator::new(config.clone());
    sender.launch(outbound)?;

    let duration = Duration::from_millis(frames * 1000 / FRAME_RATE);
    if with_video {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        sender.start(Box::new(PassthroughVideoEncoder::new(Some(FRAME_RATE as f64))), rx)?;
        tokio::spawn(produce_video(tx, frames));
    }
    if with_audio {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        sender.start(Box::new(PassthroughAudioEncoder::new()), rx)?;
        tokio::spawn(produce_audio(tx, duration));
    }

    sender.join().await;
    sender.stop().await;

    receiver.join().await;
    receiver.stop().await;

    let frames_shown = display.await?;
    playback.abort();
    info!("Frames shown: {}", frames_shown);
    info!("Sender {}", sender.health().summary());
    info!("Receiver {}", receiver.health().summary());
    Ok(())
}

/// Synthetic video source: flat frames whose luma tracks the frame index
async fn produce_video(tx: mpsc::Sender<RawFrame>, frames: u64) {
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / FRAME_RATE));
    for i in 0..frames {
        interval.tick().await;
        let data = Bytes::from(vec![(i % 256) as u8; (WIDTH * HEIGHT * 4) as usize]);
        let timestamp = Timestamp::from_duration(Duration::from_millis(i * 1000 / FRAME_RATE));
        if tx.send(RawFrame::video(data, timestamp, WIDTH, HEIGHT)).await.is_err() {
            break;
        }
    }
}

/// Synthetic audio source: a 440 Hz tone in fixed-size buffers
async fn produce_audio(tx: mpsc::Sender<RawFrame>, duration: Duration) {
    let frames_per_buffer = (SAMPLE_RATE as u64 * AUDIO_BUFFER_MS / 1000) as u32;
    let buffers = duration.as_millis() as u64 / AUDIO_BUFFER_MS;
    let mut interval = tokio::time::interval(Duration::from_millis(AUDIO_BUFFER_MS));
    let mut phase = 0u64;

    for i in 0..buffers {
        interval.tick().await;
        let mut samples = Vec::with_capacity(frames_per_buffer as usize * CHANNELS as usize);
        for _ in 0..frames_per_buffer {
            let t = phase as f32 / SAMPLE_RATE as f32;
            let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.25;
            samples.extend(std::iter::repeat_n(value, CHANNELS as usize));
            phase += 1;
        }
        let timestamp = Timestamp::from_duration(Duration::from_millis(i * AUDIO_BUFFER_MS));
        let frame = RawFrame::audio(
            samples_to_bytes(&samples),
            timestamp,
            SAMPLE_RATE,
            CHANNELS,
            frames_per_buffer,
        );
        if tx.send(frame).await.is_err() {
            break;
        }
    }
}
