use std::collections::HashSet;

use super::state::{AiMessage, AppState, Effect, Event, Screen, Session};
use crate::audio::AudioEvent;
use crate::camera::PermissionStatus;

/// Apply one event to the state. This is the core state machine.
///
/// Pure: all I/O is returned as effects for the controller to run.
pub fn handle_event(state: &mut AppState, event: Event) -> Vec<Effect> {
    let screen = Screen::resolve(state);
    let mut effects = Vec::new();

    match event {
        Event::RequestPermission => {
            if screen == Screen::Permission {
                log::info!("Requesting camera permission...");
                effects.push(Effect::RequestPermission);
            } else {
                ignore("permission request", screen);
            }
        }
        Event::PermissionLoaded(status) => {
            log::info!("Camera permission status: {status:?}");
            state.permission = status;
        }
        Event::PermissionResolved(status) => {
            log::info!("Camera permission status after request: {status:?}");
            state.permission = status;
            if status == PermissionStatus::Denied {
                effects.push(Effect::OpenSettings);
            }
        }
        Event::TakePhoto => {
            if screen == Screen::Camera {
                effects.push(Effect::TakePhoto);
            } else {
                ignore("capture", screen);
            }
        }
        Event::Focus(point) => {
            if screen == Screen::Camera {
                effects.push(Effect::Focus(point));
            } else {
                ignore("focus", screen);
            }
        }
        Event::FocusApplied(point) => {
            if screen == Screen::Camera {
                state.focus_spot = Some(point);
            }
        }
        Event::PhotoCaptured(path) => {
            log::info!("New image taken: {}", path.display());
            state.session = Session {
                image_path: Some(path),
                ..Session::default()
            };
            state.epoch += 1;
            state.focus_spot = None;
            state.last_error = None;
            effects.push(Effect::StopPolling);
        }
        Event::CaptureFailed(err) => {
            log::error!("Failed to take photo: {err}");
            state.last_error = Some(format!("Capture failed: {err}"));
        }
        Event::Analyze => {
            if screen != Screen::Captured {
                ignore("analyze", screen);
            } else if let Some(path) = state.session.image_path.clone() {
                log::info!("Sending image for analysis");
                state.session.analyzing = true;
                state.last_error = None;
                effects.push(Effect::StartPolling);
                effects.push(Effect::Upload {
                    path,
                    epoch: state.epoch,
                });
            }
        }
        Event::Reset => {
            log::info!("Resetting session");
            reset(state, &mut effects);
        }
        Event::Quit => {}
        Event::UploadComplete { epoch, response } => {
            if is_stale(state, epoch, "upload response") {
                return effects;
            }
            if let Some(texts) = response.texts_found.filter(|t| !t.is_empty()) {
                state.session.texts_found = texts;
            }
            if let Some(thread_id) = response.thread_id.filter(|t| !t.is_empty()) {
                log::info!("Will start polling with thread id: {thread_id}");
                state.session.thread_id = Some(thread_id.clone());
                effects.push(Effect::FetchMessages { thread_id, epoch });
            }
        }
        Event::UploadFailed { epoch, error } => {
            if is_stale(state, epoch, "upload failure") {
                return effects;
            }
            log::error!("Upload failed: {error}");
            state.session.analyzing = false;
            state.last_error = Some(format!("Upload failed: {error}"));
            effects.push(Effect::StopPolling);
        }
        Event::MessagesFetched { epoch, messages } => {
            if is_stale(state, epoch, "messages") {
                return effects;
            }
            replace_queue(&mut state.session, messages);
            activate_head(&mut state.session, &mut effects);
        }
        Event::FetchFailed { epoch, error } => {
            if !is_stale(state, epoch, "fetch failure") {
                log::warn!("Polling messages failed: {error}");
            }
        }
        Event::PollTick => match (&state.session.thread_id, state.session.analyzing) {
            (Some(thread_id), true) => {
                log::debug!("Poll messages for thread {thread_id}");
                effects.push(Effect::FetchMessages {
                    thread_id: thread_id.clone(),
                    epoch: state.epoch,
                });
            }
            (None, true) => log::debug!("Don't fetch, no thread id yet"),
            (_, false) => log::debug!("Poll tick outside analysis"),
        },
        Event::Audio(AudioEvent::FinishedPlaying { url }) => {
            let session = &mut state.session;
            let is_active = session
                .active_message()
                .is_some_and(|m| m.audio_url == url && session.processed_ids.contains(&m.id));
            if is_active {
                log::debug!("Audio finished playing: {url}");
                session.queue.pop_front();
                activate_head(session, &mut effects);
            } else {
                log::debug!("Ignoring finish of {url}, not the active message");
            }
        }
        Event::Audio(other) => log::debug!("Audio event: {other:?}"),
    }

    effects
}

fn ignore(what: &str, screen: Screen) {
    log::debug!("Ignoring {what} on {screen:?} screen");
}

/// Responses from before the last capture/reset, or after analysis stopped, are dropped.
fn is_stale(state: &AppState, epoch: u64, what: &str) -> bool {
    if epoch != state.epoch || !state.session.analyzing {
        log::debug!("Discarding stale {what} (epoch {epoch}, current {})", state.epoch);
        return true;
    }
    false
}

fn reset(state: &mut AppState, effects: &mut Vec<Effect>) {
    state.session = Session::default();
    state.epoch += 1;
    state.focus_spot = None;
    state.last_error = None;
    effects.push(Effect::StopPolling);
    effects.push(Effect::StopAudio);
}

/// The latest fetch is authoritative: the queue is replaced, never merged.
fn replace_queue(session: &mut Session, messages: Vec<AiMessage>) {
    let mut seen = HashSet::new();
    let mut fresh: Vec<AiMessage> = messages
        .into_iter()
        .filter(|m| !session.processed_ids.contains(&m.id) && seen.insert(m.id.clone()))
        .collect();
    fresh.sort_by(|a, b| a.created_at.total_cmp(&b.created_at));
    session.queue = fresh.into();
}

/// Deliver the queue head if it hasn't been delivered yet.
fn activate_head(session: &mut Session, effects: &mut Vec<Effect>) {
    while let Some(head) = session.active_message() {
        if session.processed_ids.contains(&head.id) {
            return;
        }
        let head = head.clone();
        session.processed_ids.insert(head.id.clone());
        log::info!(
            "Delivering message {} of thread {} ({} chars)",
            head.id,
            head.thread_id,
            head.text.len()
        );
        session.result = Some(head.text);

        if head.audio_url.is_empty() {
            log::warn!("Message {} has no audio, advancing", head.id);
            session.queue.pop_front();
            continue;
        }
        effects.push(Effect::PlayAudio(head.audio_url));
        return;
    }
}
