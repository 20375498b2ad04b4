use std::io::Cursor;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;

use crate::app::Event;

type AudioResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Playback lifecycle notifications, delivered on the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEvent {
    /// Remote audio fully downloaded
    FinishedLoadingUrl,
    /// Decoded and handed to the output device
    FinishedLoading,
    /// Played to the end (or failed); never sent for interrupted playback
    FinishedPlaying { url: String },
}

pub trait AudioPlayer: Send + Sync {
    /// Start playing `url`, interrupting whatever is playing.
    fn play_url(&self, url: &str);
    /// Interrupt playback without a `FinishedPlaying` event.
    fn stop(&self);
}

#[derive(Default)]
struct Current {
    generation: u64,
    sink: Option<Arc<rodio::Sink>>,
}

/// Downloads audio with reqwest and plays it through rodio on the blocking pool.
pub struct RodioPlayer {
    client: reqwest::Client,
    sender: async_channel::Sender<Event>,
    current: Arc<Mutex<Current>>,
}

impl RodioPlayer {
    pub fn new(sender: async_channel::Sender<Event>) -> Self {
        Self {
            client: reqwest::Client::new(),
            sender,
            current: Arc::new(Mutex::new(Current::default())),
        }
    }

    /// Bump the generation and silence the active sink. Returns the new generation.
    fn interrupt(&self) -> u64 {
        let mut current = self.current.lock().unwrap();
        current.generation += 1;
        if let Some(sink) = current.sink.take() {
            sink.stop();
        }
        current.generation
    }
}

impl AudioPlayer for RodioPlayer {
    fn play_url(&self, url: &str) {
        log::info!("Play sound {url}");
        let generation = self.interrupt();
        let client = self.client.clone();
        let sender = self.sender.clone();
        let current = self.current.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            let bytes = match download(&client, &url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Audio download failed: {e}");
                    if is_current(&current, generation) {
                        let _ = sender
                            .send(Event::Audio(AudioEvent::FinishedPlaying { url }))
                            .await;
                    }
                    return;
                }
            };
            if !is_current(&current, generation) {
                return;
            }
            let _ = sender.send(Event::Audio(AudioEvent::FinishedLoadingUrl)).await;

            let loaded_sender = sender.clone();
            let playback_state = current.clone();
            let result = tokio::task::spawn_blocking(move || {
                play_blocking(bytes, &playback_state, generation, &loaded_sender)
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Audio playback failed: {e}"),
                Err(e) => log::warn!("Audio playback task panicked: {e}"),
            }

            let finished = {
                let mut current = current.lock().unwrap();
                if current.generation == generation {
                    current.sink = None;
                    true
                } else {
                    false
                }
            };
            if finished {
                let _ = sender
                    .send(Event::Audio(AudioEvent::FinishedPlaying { url }))
                    .await;
            }
        });
    }

    fn stop(&self) {
        log::debug!("Stopping audio");
        self.interrupt();
    }
}

fn is_current(current: &Mutex<Current>, generation: u64) -> bool {
    current.lock().unwrap().generation == generation
}

async fn download(client: &reqwest::Client, url: &str) -> AudioResult<Vec<u8>> {
    let response = client.get(url).send().await?.error_for_status()?;
    let mut bytes = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    log::debug!("Downloaded {} bytes of audio", bytes.len());
    Ok(bytes)
}

/// Decode and play to the end. Blocking; the output stream can't leave this thread.
fn play_blocking(
    bytes: Vec<u8>,
    current: &Mutex<Current>,
    generation: u64,
    sender: &async_channel::Sender<Event>,
) -> AudioResult<()> {
    let (_stream, handle) = rodio::OutputStream::try_default()?;
    let sink = Arc::new(rodio::Sink::try_new(&handle)?);
    sink.append(rodio::Decoder::new(Cursor::new(bytes))?);

    {
        let mut current = current.lock().unwrap();
        if current.generation != generation {
            return Ok(());
        }
        current.sink = Some(sink.clone());
    }
    let _ = sender.send_blocking(Event::Audio(AudioEvent::FinishedLoading));

    sink.sleep_until_end();
    Ok(())
}
