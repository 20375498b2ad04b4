use std::path::PathBuf;
use std::sync::Arc;

use super::state::Event;
use crate::analyzer::Backend;

/// Upload the captured image on the runtime; the outcome comes back as an event.
pub fn dispatch_upload(
    backend: &Arc<dyn Backend>,
    sender: &async_channel::Sender<Event>,
    path: PathBuf,
    epoch: u64,
) {
    let backend = backend.clone();
    let sender = sender.clone();

    tokio::spawn(async move {
        let event = match backend.upload_image(&path).await {
            Ok(response) => Event::UploadComplete { epoch, response },
            Err(e) => Event::UploadFailed {
                epoch,
                error: e.to_string(),
            },
        };
        let _ = sender.send(event).await;
    });
}

/// Fetch the thread's messages on the runtime.
pub fn dispatch_fetch(
    backend: &Arc<dyn Backend>,
    sender: &async_channel::Sender<Event>,
    thread_id: String,
    epoch: u64,
) {
    let backend = backend.clone();
    let sender = sender.clone();

    tokio::spawn(async move {
        let event = match backend.fetch_messages(&thread_id).await {
            Ok(messages) => {
                log::debug!("Thread {thread_id} returned {} messages", messages.len());
                Event::MessagesFetched { epoch, messages }
            }
            Err(e) => Event::FetchFailed {
                epoch,
                error: e.to_string(),
            },
        };
        let _ = sender.send(event).await;
    });
}
