//! duoplay-demo - exercises the streaming player against the default
//! output device with a generated tone, for manual smoke-testing.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use duoplay_core::decoder::ToneDecoder;
use duoplay_core::message::{Message, MessageQueue};
use duoplay_core::sink::{AudioSink, CpalSink};
use duoplay_core::streaming::{RefClock, StreamingAudioPlayer, SyncType};
use duoplay_core::types::{AudioFormat, ChannelLayout, CodecId, SampleFormat};

/// A wall-clock `RefClock`: the reference video/display clock this player
/// keeps the audio sink locked to, advancing in real time.
struct WallClock {
    started: Instant,
}

impl RefClock for WallClock {
    fn now(&self) -> i64 {
        self.started.elapsed().as_micros() as i64
    }
    fn speed(&self) -> f64 {
        1.0
    }
    fn discontinuity(&mut self, new_clock: i64) {
        self.started = Instant::now() - Duration::from_micros(new_clock.max(0) as u64);
    }
    fn refresh_period(&self) -> Option<i64> {
        None
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("duoplay-demo starting up");

    let format = AudioFormat {
        sample_rate: duoplay_core::audio::DEFAULT_SAMPLE_RATE,
        encoded_sample_rate: duoplay_core::audio::DEFAULT_SAMPLE_RATE,
        channel_layout: ChannelLayout::STEREO,
        sample_format: SampleFormat::Float32,
        is_passthrough: false,
        codec_id: CodecId::Pcm,
    };

    let sink: Box<dyn AudioSink> = Box::new(CpalSink::open_default(format.clone())?);

    let five_seconds_of_frames = format.sample_rate as u64 * 5;
    let mut tone = ToneDecoder::new(format.clone(), five_seconds_of_frames);
    tone.start(0);

    let queue = Arc::new(MessageQueue::new());
    let mut player = StreamingAudioPlayer::new(
        queue.clone(),
        Box::new(tone),
        sink,
        None,
        None,
        SyncType::Discon,
        0.05,
    );

    let atomics = player.atomics();
    let stop = player.stop_flag();

    // Feed demuxer packets from a background thread, the way a real demux
    // stage would, while the player drains its message queue on this one.
    let feeder_queue = queue.clone();
    let feeder_stop = stop.clone();
    let feeder = std::thread::spawn(move || {
        let bytes_per_packet = format.bytes_per_frame() as usize * 1024;
        let mut pts = 0i64;
        while !feeder_stop.load(Ordering::Relaxed) {
            feeder_queue.put(Message::DemuxerPacket {
                bytes: vec![0u8; bytes_per_packet],
                pts,
                duration: 1024 * duoplay_core::types::DVD_TIME_BASE / format.sample_rate as i64,
            });
            pts += 1024 * duoplay_core::types::DVD_TIME_BASE / format.sample_rate as i64;
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    queue.put(Message::PlayerStarted);
    let mut clock = WallClock { started: Instant::now() };

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        player.step(&mut clock);
    }

    stop.store(true, Ordering::Relaxed);
    let _ = feeder.join();

    log::info!("sent {} frames", atomics.frames_sent.load(Ordering::Relaxed));
    Ok(())
}
