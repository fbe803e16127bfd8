//! Keyboard and pointer input from the terminal.
//!
//! The kiosk's input bridge writes one command per line to the process's
//! standard input:
//!
//! | Line | Signal |
//! |---|---|
//! | empty, `b`, `begin` | begin |
//! | `r`, `restart` | restart key |
//! | `click <x> <y>` | pointer click |
//! | `q`, `quit` | quit |

use std::io::{BufRead, BufReader, Read};
use std::thread;

use booth_core::{BoothMessage, Signal};
use tokio::sync::mpsc;

/// Parses one input line. Unknown commands yield `None`.
pub fn parse_command(line: &str) -> Option<Signal> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Some(Signal::Begin);
    };

    let signal = match command.to_ascii_lowercase().as_str() {
        "b" | "begin" => Signal::Begin,
        "r" | "restart" => Signal::RestartKey,
        "q" | "quit" => Signal::Quit,
        "click" => {
            let x = words.next()?.parse().ok()?;
            let y = words.next()?.parse().ok()?;
            Signal::Click { x, y }
        }
        _ => return None,
    };

    if words.next().is_some() {
        return None;
    }
    Some(signal)
}

/// Forwards parsed commands from `source` to the session loop until the
/// source ends or the loop stops listening. Returns the number forwarded.
pub fn forward_commands<R: Read>(source: R, inbox: &mpsc::Sender<BoothMessage>) -> usize {
    let mut forwarded = 0;
    for line in BufReader::new(source).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read input, input disabled");
                break;
            }
        };

        let Some(signal) = parse_command(&line) else {
            tracing::warn!(input = %line.trim(), "Unknown input command");
            continue;
        };

        if inbox.blocking_send(BoothMessage::Signal(signal)).is_err() {
            tracing::debug!("Session loop gone, input reader stopping");
            break;
        }
        forwarded += 1;
    }
    forwarded
}

/// Starts a thread reading commands from standard input.
///
/// End of input stops the reader but not the booth.
pub fn spawn_stdin_reader(inbox: mpsc::Sender<BoothMessage>) -> std::io::Result<()> {
    thread::Builder::new()
        .name("booth-input".to_string())
        .spawn(move || {
            let forwarded = forward_commands(std::io::stdin(), &inbox);
            tracing::info!(forwarded, "Standard input closed");
        })
        .map(drop)
}
