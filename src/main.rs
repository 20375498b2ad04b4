mod analyzer;
mod app;
mod audio;
mod camera;
mod config;
mod settings;
mod ui;

use std::sync::Arc;

use app::{Controller, Event};
use config::Config;

fn main() {
    env_logger::init();
    log::info!("OCR Camera starting");

    let config = Config::load();
    if let Err(e) = config.validate() {
        log::error!("Configuration incomplete: {e}");
        eprintln!("ocr-camera: {e}");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(run(config));
    // Don't wait on the pending stdin read or an audio clip still playing.
    runtime.shutdown_background();
    log::info!("OCR Camera stopped");
}

async fn run(config: Config) {
    // Every input (user, camera, network, timer, audio) lands on this channel.
    let (sender, receiver) = async_channel::unbounded::<Event>();

    let camera = Arc::new(camera::FolderCamera::new(&config.camera));
    let backend = Arc::new(analyzer::HttpBackend::new(
        config.upload_url.clone(),
        config.messages_url.clone(),
    ));
    let audio = Arc::new(audio::RodioPlayer::new(sender.clone()));

    let mut controller = Controller::new(
        camera,
        backend,
        audio,
        config.poll_interval(),
        sender.clone(),
        Config::dir(),
    );
    controller.load_permission();

    ui::terminal::spawn_stdin_reader(sender);

    let mut last_view = String::new();
    show(&controller, &mut last_view);

    while let Ok(event) = receiver.recv().await {
        if event == Event::Quit {
            break;
        }
        controller.dispatch(event);
        show(&controller, &mut last_view);
    }
}

/// Print the screen only when it changed.
fn show(controller: &Controller, last_view: &mut String) {
    let view = ui::terminal::render(controller.state());
    if view != *last_view {
        log::debug!(
            "Screen {:?} (polling: {})",
            controller.screen(),
            controller.is_polling()
        );
        println!("\n{view}");
        *last_view = view;
    }
}
