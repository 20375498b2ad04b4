use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::capture::{dispatch_capture, dispatch_focus, dispatch_permission_request};
use super::event_handler::handle_event;
use super::pipeline::{dispatch_fetch, dispatch_upload};
use super::polling::Poller;
use super::state::{AppState, Effect, Event, Screen};
use crate::analyzer::Backend;
use crate::audio::AudioPlayer;
use crate::camera::Camera;

/// Owns the session state and the capability providers; runs reducer effects.
pub struct Controller {
    state: AppState,
    camera: Arc<dyn Camera>,
    backend: Arc<dyn Backend>,
    audio: Arc<dyn AudioPlayer>,
    poller: Poller,
    sender: async_channel::Sender<Event>,
    settings_dir: PathBuf,
}

impl Controller {
    pub fn new(
        camera: Arc<dyn Camera>,
        backend: Arc<dyn Backend>,
        audio: Arc<dyn AudioPlayer>,
        poll_interval: Duration,
        sender: async_channel::Sender<Event>,
        settings_dir: PathBuf,
    ) -> Self {
        Self {
            state: AppState::default(),
            camera,
            backend,
            audio,
            poller: Poller::new(poll_interval),
            sender,
            settings_dir,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn screen(&self) -> Screen {
        Screen::resolve(&self.state)
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_armed()
    }

    /// Read the cached platform permission once at start-up.
    pub fn load_permission(&mut self) {
        let status = self.camera.permission_status();
        self.dispatch(Event::PermissionLoaded(status));
    }

    pub fn dispatch(&mut self, event: Event) {
        for effect in handle_event(&mut self.state, event) {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RequestPermission => dispatch_permission_request(&self.camera, &self.sender),
            Effect::OpenSettings => {
                let dir = self.settings_dir.clone();
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = crate::settings::open_settings(&dir) {
                        log::warn!("Could not open settings: {e}");
                    }
                });
            }
            Effect::TakePhoto => dispatch_capture(&self.camera, &self.sender),
            Effect::Focus(point) => dispatch_focus(&self.camera, &self.sender, point),
            Effect::Upload { path, epoch } => {
                dispatch_upload(&self.backend, &self.sender, path, epoch)
            }
            Effect::FetchMessages { thread_id, epoch } => {
                dispatch_fetch(&self.backend, &self.sender, thread_id, epoch)
            }
            Effect::StartPolling => self.poller.arm(self.sender.clone()),
            Effect::StopPolling => self.poller.disarm(),
            Effect::PlayAudio(url) => self.audio.play_url(&url),
            Effect::StopAudio => self.audio.stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::analyzer::{ApiError, UploadResponse};
    use crate::app::state::Session;
    use crate::app::AiMessage;
    use crate::audio::AudioEvent;
    use crate::camera::{PermissionStatus, PhotoOptions, Point};

    type BoxError = Box<dyn std::error::Error + Send + Sync>;

    struct FakeCamera;

    #[async_trait]
    impl Camera for FakeCamera {
        fn permission_status(&self) -> PermissionStatus {
            PermissionStatus::Granted
        }
        async fn request_permission(&self) -> PermissionStatus {
            PermissionStatus::Granted
        }
        async fn take_photo(&self, _options: PhotoOptions) -> Result<PathBuf, BoxError> {
            Ok(PathBuf::from("/tmp/photo.jpg"))
        }
        fn supports_focus(&self) -> bool {
            false
        }
        async fn focus(&self, _point: Point) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        upload_delay: Duration,
        upload_fails: bool,
        messages: Mutex<Vec<AiMessage>>,
        uploads: AtomicUsize,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn upload_image(&self, path: &Path) -> Result<UploadResponse, ApiError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            if !self.upload_delay.is_zero() {
                tokio::time::sleep(self.upload_delay).await;
            }
            if self.upload_fails {
                return Err(ApiError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                });
            }
            Ok(UploadResponse {
                texts_found: Some("OPEN 9-5".into()),
                thread_id: Some("t1".into()),
            })
        }

        async fn fetch_messages(&self, _thread_id: &str) -> Result<Vec<AiMessage>, ApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.messages.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct FakeAudio {
        played: Mutex<Vec<String>>,
        stops: AtomicUsize,
    }

    impl AudioPlayer for FakeAudio {
        fn play_url(&self, url: &str) {
            self.played.lock().unwrap().push(url.to_string());
        }
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        controller: Controller,
        receiver: async_channel::Receiver<Event>,
        backend: Arc<FakeBackend>,
        audio: Arc<FakeAudio>,
    }

    impl Harness {
        fn new(backend: FakeBackend) -> Self {
            let (sender, receiver) = async_channel::unbounded();
            let backend = Arc::new(backend);
            let audio = Arc::new(FakeAudio::default());
            let mut controller = Controller::new(
                Arc::new(FakeCamera),
                backend.clone(),
                audio.clone(),
                Duration::from_secs(5),
                sender,
                PathBuf::from("/tmp"),
            );
            controller.load_permission();
            Self {
                controller,
                receiver,
                backend,
                audio,
            }
        }

        /// Let spawned tasks run and feed their events back in.
        async fn settle(&mut self) {
            for _ in 0..8 {
                tokio::task::yield_now().await;
                while let Ok(event) = self.receiver.try_recv() {
                    self.controller.dispatch(event);
                }
            }
        }

        async fn wait(&mut self, secs: u64) {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            self.settle().await;
        }

        async fn capture_and_analyze(&mut self) {
            self.controller.dispatch(Event::TakePhoto);
            self.settle().await;
            assert_eq!(self.controller.screen(), Screen::Captured);
            self.controller.dispatch(Event::Analyze);
        }

        fn fetches(&self) -> usize {
            self.backend.fetches.load(Ordering::SeqCst)
        }

        fn played(&self) -> Vec<String> {
            self.audio.played.lock().unwrap().clone()
        }
    }

    fn msg(id: &str, created_at: i64) -> AiMessage {
        AiMessage {
            id: id.into(),
            created_at: created_at as f64,
            thread_id: "t1".into(),
            audio_url: format!("https://cdn/{id}.mp3"),
            text: format!("reply {id}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn capture_analyze_and_deliver_first_reply() {
        let backend = FakeBackend::default();
        backend.messages.lock().unwrap().push(msg("m1", 100));
        let mut h = Harness::new(backend);
        assert_eq!(h.controller.screen(), Screen::Camera);

        h.capture_and_analyze().await;
        assert_eq!(h.controller.screen(), Screen::Analyzing);
        assert!(h.controller.is_polling());
        h.settle().await;

        let state = h.controller.state();
        assert_eq!(h.controller.screen(), Screen::Result);
        assert_eq!(state.session.result.as_deref(), Some("reply m1"));
        assert_eq!(state.session.texts_found, "OPEN 9-5");
        assert_eq!(state.session.processed_ids, HashSet::from(["m1".to_string()]));
        assert_eq!(h.played(), vec!["https://cdn/m1.mp3".to_string()]);
        assert_eq!(h.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_message_is_played_once_across_polls() {
        let backend = FakeBackend::default();
        backend.messages.lock().unwrap().push(msg("m1", 100));
        let mut h = Harness::new(backend);
        h.capture_and_analyze().await;
        h.settle().await;

        h.wait(6).await;
        h.wait(5).await;
        assert_eq!(h.fetches(), 3);
        assert_eq!(h.played().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn playback_finish_chains_without_refetch() {
        let backend = FakeBackend::default();
        backend
            .messages
            .lock()
            .unwrap()
            .extend([msg("m2", 200), msg("m1", 100)]);
        let mut h = Harness::new(backend);
        h.capture_and_analyze().await;
        h.settle().await;
        assert_eq!(h.played(), vec!["https://cdn/m1.mp3".to_string()]);

        h.controller.dispatch(Event::Audio(AudioEvent::FinishedPlaying {
            url: "https://cdn/m1.mp3".into(),
        }));
        assert_eq!(h.fetches(), 1);
        assert_eq!(
            h.played(),
            vec!["https://cdn/m1.mp3".to_string(), "https://cdn/m2.mp3".to_string()]
        );
        assert_eq!(h.controller.state().session.result.as_deref(), Some("reply m2"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_mid_analysis_stops_polling() {
        let mut h = Harness::new(FakeBackend::default());
        h.capture_and_analyze().await;
        h.settle().await;
        h.wait(6).await;
        assert_eq!(h.fetches(), 2);

        h.controller.dispatch(Event::Reset);
        assert!(!h.controller.is_polling());
        assert_eq!(h.audio.stops.load(Ordering::SeqCst), 1);

        h.wait(30).await;
        assert_eq!(h.fetches(), 2);
        assert_eq!(h.controller.screen(), Screen::Camera);
    }

    #[tokio::test(start_paused = true)]
    async fn upload_landing_after_reset_is_ignored() {
        let mut h = Harness::new(FakeBackend {
            upload_delay: Duration::from_secs(3),
            ..FakeBackend::default()
        });
        h.capture_and_analyze().await;
        h.settle().await;
        h.controller.dispatch(Event::Reset);

        h.wait(10).await;
        assert_eq!(h.backend.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(h.fetches(), 0);
        assert_eq!(h.controller.state().session, Session::default());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_upload_allows_retry() {
        let mut h = Harness::new(FakeBackend {
            upload_fails: true,
            ..FakeBackend::default()
        });
        h.capture_and_analyze().await;
        h.settle().await;
        assert_eq!(h.controller.screen(), Screen::Captured);
        assert!(!h.controller.is_polling());
        assert!(h.controller.state().last_error.is_some());

        h.controller.dispatch(Event::Analyze);
        h.settle().await;
        assert_eq!(h.backend.uploads.load(Ordering::SeqCst), 2);
    }
}
