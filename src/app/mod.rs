mod capture;
mod controller;
mod event_handler;
mod pipeline;
mod polling;
mod state;

pub use controller::Controller;
pub use state::{AiMessage, AppState, Event, Screen};
