use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::audio::AudioFormat;
use crate::error::{AssistantError, Result};

/// Blocking read of fixed-size PCM frames from an input device.
///
/// `Ok(Some(frame))` is one frame of `chunk` s16le samples. `Ok(None)`
/// means no data is currently available (the caller may idle and retry).
/// `Err` is a device fault, fatal to the current capture.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Microphone capture via cpal.
///
/// The cpal stream is `!Send`, so a dedicated thread owns it and forwards
/// chunked frames over a bounded channel; `read_frame` blocks on that
/// channel. Frames are dropped when the channel is full rather than
/// stalling the audio callback.
pub struct CpalMicrophone {
    rx: Receiver<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    read_timeout: Duration,
}

impl CpalMicrophone {
    pub fn open(format: AudioFormat) -> Result<Self> {
        let (frame_tx, frame_rx) = bounded::<Vec<u8>>(32);
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let worker = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || capture_thread(format, frame_tx, ready_tx, shutdown_flag))
            .map_err(|e| AssistantError::Device(format!("capture thread: {}", e)))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => return Err(AssistantError::Device(msg)),
            Err(_) => {
                return Err(AssistantError::Device(
                    "capture thread did not start".into(),
                ))
            }
        }

        Ok(Self {
            rx: frame_rx,
            shutdown,
            worker: Some(worker),
            read_timeout: format.frame_duration() * 4,
        })
    }
}

impl FrameSource for CpalMicrophone {
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(AssistantError::Device(
                "microphone capture thread stopped".into(),
            )),
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn capture_thread(
    format: AudioFormat,
    frame_tx: Sender<Vec<u8>>,
    ready_tx: Sender<std::result::Result<(), String>>,
    shutdown: Arc<AtomicBool>,
) {
    let stream = match build_capture_stream(&format, frame_tx) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(msg) => {
            let _ = ready_tx.send(Err(msg));
            return;
        }
    };

    if let Err(e) = stream.play() {
        log::error!("Failed to start capture stream: {}", e);
        return;
    }

    while !shutdown.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(100));
    }
    // Stream dropped here, closing the frame channel.
}

fn build_capture_stream(
    format: &AudioFormat,
    frame_tx: Sender<Vec<u8>>,
) -> std::result::Result<cpal::Stream, String> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| "no default input device found".to_string())?;

    let supported = device
        .default_input_config()
        .map_err(|e| format!("input config: {}", e))?;

    let stream_config = cpal::StreamConfig {
        channels: supported.channels(),
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    log::info!(
        "Microphone configured: {} channels @ {}Hz (device format: {:?})",
        stream_config.channels,
        format.sample_rate,
        supported.sample_format()
    );

    let chunk = format.chunk;
    match supported.sample_format() {
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, frame_tx, chunk),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, frame_tx, chunk),
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, frame_tx, chunk),
        other => Err(format!("unsupported sample format: {:?}", other)),
    }
}

fn build_stream<T>(
    device: &Device,
    config: &cpal::StreamConfig,
    frame_tx: Sender<Vec<u8>>,
    chunk: usize,
) -> std::result::Result<cpal::Stream, String>
where
    T: Sample + SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let channels = config.channels as usize;
    let mut buffer: Vec<u8> = Vec::with_capacity(chunk * 2);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Capture channel 0 of interleaved frames, convert to s16le.
                for point in data.chunks(channels) {
                    if let Some(sample) = point.first() {
                        let value = i16::from_sample(*sample);
                        buffer.extend_from_slice(&value.to_le_bytes());

                        if buffer.len() >= chunk * 2 {
                            if frame_tx.try_send(std::mem::take(&mut buffer)).is_err() {
                                log::warn!("Frame channel full, dropping audio frame");
                            }
                            buffer.reserve(chunk * 2);
                        }
                    }
                }
            },
            |err| log::error!("Capture stream error: {}", err),
            None,
        )
        .map_err(|e| format!("input stream: {}", e))
}
