use std::fmt::Write as _;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::app::{AppState, Event, Screen};
use crate::camera::{PermissionStatus, Point};

/// Text rendition of the current screen.
pub fn render(state: &AppState) -> String {
    let session = &state.session;
    let mut out = String::new();

    match Screen::resolve(state) {
        Screen::Permission => {
            out.push_str("== Camera access ==\n");
            out.push_str("This app needs your camera to read text.\n");
            out.push_str("  [allow] give permission\n");
        }
        Screen::Camera => {
            out.push_str("== Camera ==\n");
            if state.permission == PermissionStatus::Denied {
                out.push_str("Camera access denied; enable it in settings.\n");
            }
            if let Some(spot) = state.focus_spot {
                let _ = writeln!(out, "Focused at ({:.0}, {:.0})", spot.x, spot.y);
            }
            out.push_str("  [shoot] take photo   [focus X Y] tap to focus\n");
        }
        Screen::Captured => {
            out.push_str("== Captured ==\n");
            if let Some(path) = &session.image_path {
                let _ = writeln!(out, "{}", path.display());
            }
            out.push_str("  [analyze] send for analysis   [cancel] discard\n");
        }
        Screen::Analyzing => {
            out.push_str("== Analyzing ==\n");
            if session.texts_found.is_empty() {
                out.push_str("Looking for text...\n");
            } else {
                let _ = writeln!(out, "Found: {}", session.texts_found);
            }
            out.push_str("  [cancel] stop\n");
        }
        Screen::Result => {
            out.push_str("== Result ==\n");
            if let Some(result) = &session.result {
                let _ = writeln!(out, "{result}");
            }
            out.push_str("  [reset] start over\n");
        }
    }

    if let Some(err) = &state.last_error {
        let _ = writeln!(out, "! {err}");
    }
    out
}

/// Map one line of input to a user event.
pub fn parse_command(line: &str) -> Result<Event, String> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Err("empty command".into());
    };
    match cmd.to_ascii_lowercase().as_str() {
        "allow" | "permission" => Ok(Event::RequestPermission),
        "shoot" | "capture" | "photo" => Ok(Event::TakePhoto),
        "focus" => {
            let mut coord = || -> Result<f32, String> {
                words
                    .next()
                    .ok_or("usage: focus X Y")?
                    .parse::<f32>()
                    .map_err(|e| format!("bad coordinate: {e}"))
            };
            let x = coord()?;
            let y = coord()?;
            Ok(Event::Focus(Point { x, y }))
        }
        "analyze" | "analyse" => Ok(Event::Analyze),
        "cancel" | "reset" => Ok(Event::Reset),
        "quit" | "exit" | "q" => Ok(Event::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

/// Read commands from stdin and forward them to the event loop. EOF quits.
pub fn spawn_stdin_reader(sender: async_channel::Sender<Event>) {
    tokio::spawn(forward_commands(BufReader::new(tokio::io::stdin()), sender));
}

/// Forward parsed lines until `quit`, EOF or a closed loop. Nothing is read past `quit`.
async fn forward_commands<R>(reader: R, sender: async_channel::Sender<Event>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match parse_command(&line) {
                Ok(event) => {
                    let quit = event == Event::Quit;
                    if sender.send(event).await.is_err() || quit {
                        break;
                    }
                }
                Err(e) => eprintln!("{e}"),
            },
            Ok(None) => {
                let _ = sender.send(Event::Quit).await;
                break;
            }
            Err(e) => {
                log::error!("Failed to read input: {e}");
                let _ = sender.send(Event::Quit).await;
                break;
            }
        }
    }
}
