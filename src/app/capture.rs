use std::sync::Arc;

use super::state::Event;
use crate::camera::{Camera, PhotoOptions, Point};

/// Ask for camera access; the answer is delivered as `PermissionResolved`.
pub fn dispatch_permission_request(
    camera: &Arc<dyn Camera>,
    sender: &async_channel::Sender<Event>,
) {
    let camera = camera.clone();
    let sender = sender.clone();

    tokio::spawn(async move {
        let status = camera.request_permission().await;
        let _ = sender.send(Event::PermissionResolved(status)).await;
    });
}

/// Take a still, favouring speed, with the shutter sound off.
pub fn dispatch_capture(camera: &Arc<dyn Camera>, sender: &async_channel::Sender<Event>) {
    let camera = camera.clone();
    let sender = sender.clone();

    tokio::spawn(async move {
        let event = match camera.take_photo(PhotoOptions::default()).await {
            Ok(path) => Event::PhotoCaptured(path),
            Err(e) => Event::CaptureFailed(e.to_string()),
        };
        let _ = sender.send(event).await;
    });
}

/// Forward a tap to the device. No-op when the device can't focus.
pub fn dispatch_focus(
    camera: &Arc<dyn Camera>,
    sender: &async_channel::Sender<Event>,
    point: Point,
) {
    if !camera.supports_focus() {
        log::debug!("Device doesn't support focus, ignoring tap");
        return;
    }
    let camera = camera.clone();
    let sender = sender.clone();

    tokio::spawn(async move {
        match camera.focus(point).await {
            Ok(()) => {
                let _ = sender.send(Event::FocusApplied(point)).await;
            }
            Err(e) => log::warn!("Focus failed: {e}"),
        }
    });
}
