use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use crate::analyzer::UploadResponse;
use crate::audio::AudioEvent;
use crate::camera::{PermissionStatus, Point};

/// One AI-generated reply for a backend thread.
#[derive(Debug, Clone, PartialEq)]
pub struct AiMessage {
    pub id: String,
    /// Server timestamp; integral seconds in practice, fractional values accepted
    pub created_at: f64,
    pub thread_id: String,
    pub audio_url: String,
    pub text: String,
}

/// Everything that belongs to one photo, from capture to the last reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub image_path: Option<PathBuf>,
    pub analyzing: bool,
    pub thread_id: Option<String>,
    pub result: Option<String>,
    pub texts_found: String,
    /// Undelivered messages, ascending by `created_at`. The head is the active one.
    pub queue: VecDeque<AiMessage>,
    pub processed_ids: HashSet<String>,
}

impl Session {
    pub fn active_message(&self) -> Option<&AiMessage> {
        self.queue.front()
    }
}

/// Controller state. Lives on the event-loop thread only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub session: Session,
    pub permission: PermissionStatus,
    /// Bumped on every capture and reset; async completions from older epochs are dropped.
    pub epoch: u64,
    pub focus_spot: Option<Point>,
    pub last_error: Option<String>,
}

/// Mutually exclusive screens, listed in resolution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Result,
    Analyzing,
    Captured,
    Camera,
    Permission,
}

impl Screen {
    /// First match wins.
    pub fn resolve(state: &AppState) -> Screen {
        let session = &state.session;
        if session.result.is_some() {
            Screen::Result
        } else if session.image_path.is_some() && session.analyzing {
            Screen::Analyzing
        } else if session.image_path.is_some() {
            Screen::Captured
        } else if state.permission != PermissionStatus::Unknown {
            Screen::Camera
        } else {
            Screen::Permission
        }
    }
}

/// Everything that reaches the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // User input
    RequestPermission,
    TakePhoto,
    Focus(Point),
    Analyze,
    Reset,
    Quit,

    // Camera capability
    PermissionLoaded(PermissionStatus),
    PermissionResolved(PermissionStatus),
    PhotoCaptured(PathBuf),
    CaptureFailed(String),
    FocusApplied(Point),

    // Network, tagged with the epoch the request was issued under
    UploadComplete { epoch: u64, response: UploadResponse },
    UploadFailed { epoch: u64, error: String },
    MessagesFetched { epoch: u64, messages: Vec<AiMessage> },
    FetchFailed { epoch: u64, error: String },

    PollTick,
    Audio(AudioEvent),
}

/// Side effects requested by the reducer, executed by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestPermission,
    OpenSettings,
    TakePhoto,
    Focus(Point),
    Upload { path: PathBuf, epoch: u64 },
    FetchMessages { thread_id: String, epoch: u64 },
    StartPolling,
    StopPolling,
    PlayAudio(String),
    StopAudio,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(result: bool, image: bool, analyzing: bool, permission: PermissionStatus) -> AppState {
        AppState {
            session: Session {
                image_path: image.then(|| PathBuf::from("/tmp/photo.jpg")),
                analyzing,
                result: result.then(|| "text".to_string()),
                ..Session::default()
            },
            permission,
            ..AppState::default()
        }
    }

    #[test]
    fn screen_priority_covers_every_combination() {
        use PermissionStatus::*;
        for permission in [Unknown, Granted, Denied] {
            for image in [false, true] {
                for analyzing in [false, true] {
                    assert_eq!(
                        Screen::resolve(&state(true, image, analyzing, permission)),
                        Screen::Result
                    );
                    let expected = match (image, analyzing, permission) {
                        (true, true, _) => Screen::Analyzing,
                        (true, false, _) => Screen::Captured,
                        (false, _, Unknown) => Screen::Permission,
                        (false, _, _) => Screen::Camera,
                    };
                    assert_eq!(
                        Screen::resolve(&state(false, image, analyzing, permission)),
                        expected,
                        "image={image} analyzing={analyzing} permission={permission:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn fresh_state_asks_for_permission() {
        assert_eq!(Screen::resolve(&AppState::default()), Screen::Permission);
    }
}
