//! Native audio devices: CPAL microphone and Rodio speaker.
//!
//! Neither CPAL streams nor Rodio output streams are `Send` on every host,
//! so each device lives on a dedicated thread and is driven over channels.

use crate::device::{CaptureConstraints, MicrophoneSource, PlaybackBuffer, SpeechOutput};
use crate::error::AudioError;
use crate::pcm::pcm16_to_float;
use crate::resample::{downmix_to_mono, MicResampler};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// How often the speaker thread checks for a stop while a buffer renders.
const SPEAKER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default system microphone via CPAL.
#[derive(Default)]
pub struct CpalMicrophone {
    target_rate: u32,
    worker: Option<(std_mpsc::Sender<()>, JoinHandle<()>)>,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MicrophoneSource for CpalMicrophone {
    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<(), AudioError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| AudioError::Device("no input device available".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            device_rate = supported.sample_rate().0,
            device_channels = supported.channels(),
            target_rate = constraints.sample_rate,
            "input device ready"
        );
        // Echo cancellation, noise suppression and gain control are left to
        // the OS audio stack; CPAL exposes no switches for them.
        self.target_rate = constraints.sample_rate;
        Ok(())
    }

    fn start(&mut self, samples: mpsc::UnboundedSender<Vec<f32>>) -> Result<(), AudioError> {
        self.stop();

        let target_rate = self.target_rate;
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), AudioError>>();

        let handle = std::thread::Builder::new()
            .name("gather-mic".to_string())
            .spawn(move || {
                let stream = match build_input_stream(samples, target_rate) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Park until stopped; dropping the stream closes the device.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::Stream(format!("failed to spawn capture thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| AudioError::Stream("capture thread exited during startup".to_string()))??;
        self.worker = Some((stop_tx, handle));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((stop_tx, handle)) = self.worker.take() {
            let _ = stop_tx.send(());
            if handle.join().is_err() {
                warn!("capture thread panicked");
            }
        }
    }

    fn release(&mut self) {
        self.stop();
    }
}

fn build_input_stream(
    samples: mpsc::UnboundedSender<Vec<f32>>,
    target_rate: u32,
) -> Result<cpal::Stream, AudioError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AudioError::Device("no input device available".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;

    let channels = usize::from(supported.channels());
    let mut resampler = MicResampler::new(supported.sample_rate().0, target_rate);
    let config: cpal::StreamConfig = supported.config();
    let on_error = |err: cpal::StreamError| warn!(error = %err, "input stream error");

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = downmix_to_mono(data, channels);
                let block = resampler.process(&mono);
                if !block.is_empty() {
                    let _ = samples.send(block);
                }
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data.iter().map(|&s| pcm16_to_float(s)).collect();
                let mono = downmix_to_mono(&floats, channels);
                let block = resampler.process(&mono);
                if !block.is_empty() {
                    let _ = samples.send(block);
                }
            },
            on_error,
            None,
        ),
        other => {
            return Err(AudioError::Device(format!(
                "unsupported input sample format: {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| AudioError::Device(e.to_string()))
}

enum SpeakerCommand {
    Play(PlaybackBuffer, oneshot::Sender<Result<(), AudioError>>),
    Stop,
}

/// Default system speaker via Rodio.
pub struct RodioSpeaker {
    commands: Mutex<std_mpsc::Sender<SpeakerCommand>>,
}

impl RodioSpeaker {
    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Device`] when no output device can be opened.
    pub fn open() -> Result<Self, AudioError> {
        let (command_tx, command_rx) = std_mpsc::channel::<SpeakerCommand>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), AudioError>>();

        std::thread::Builder::new()
            .name("gather-speaker".to_string())
            .spawn(move || run_speaker(command_rx, ready_tx))
            .map_err(|e| AudioError::Stream(format!("failed to spawn speaker thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| AudioError::Stream("speaker thread exited during startup".to_string()))??;

        Ok(Self {
            commands: Mutex::new(command_tx),
        })
    }

    fn send(&self, command: SpeakerCommand) -> Result<(), AudioError> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .send(command)
            .map_err(|_| AudioError::Stream("speaker thread stopped".to_string()))
    }
}

#[async_trait]
impl SpeechOutput for RodioSpeaker {
    async fn play(&self, buffer: PlaybackBuffer) -> Result<(), AudioError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(SpeakerCommand::Play(buffer, done_tx))?;
        done_rx
            .await
            .map_err(|_| AudioError::Stream("speaker thread stopped".to_string()))?
    }

    fn stop(&self) {
        let _ = self.send(SpeakerCommand::Stop);
    }
}

fn run_speaker(
    commands: std_mpsc::Receiver<SpeakerCommand>,
    ready: std_mpsc::Sender<Result<(), AudioError>>,
) {
    let (_stream, handle) = match rodio::OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(AudioError::Device(e.to_string())));
            return;
        }
    };
    let new_sink = || rodio::Sink::try_new(&handle).map_err(|e| AudioError::Device(e.to_string()));
    let mut sink = match new_sink() {
        Ok(sink) => sink,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut backlog: VecDeque<(PlaybackBuffer, oneshot::Sender<Result<(), AudioError>>)> =
        VecDeque::new();

    loop {
        let (buffer, done) = match backlog.pop_front() {
            Some(next) => next,
            None => match commands.recv() {
                Ok(SpeakerCommand::Play(buffer, done)) => (buffer, done),
                Ok(SpeakerCommand::Stop) => continue,
                Err(_) => return,
            },
        };

        sink.append(rodio::buffer::SamplesBuffer::new(
            1,
            buffer.sample_rate,
            buffer.samples,
        ));

        let mut outcome = Ok(());
        while !sink.empty() {
            match commands.recv_timeout(SPEAKER_POLL_INTERVAL) {
                Ok(SpeakerCommand::Stop) => {
                    sink.stop();
                    match new_sink() {
                        Ok(fresh) => sink = fresh,
                        Err(e) => {
                            outcome = Err(e);
                        }
                    }
                    break;
                }
                Ok(SpeakerCommand::Play(next, next_done)) => backlog.push_back((next, next_done)),
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }
        let _ = done.send(outcome);
    }
}
