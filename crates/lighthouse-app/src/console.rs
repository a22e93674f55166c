//! Text console collaborators: stdin as the input stream, stdout as the
//! display.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;

use lighthouse_core::events::SessionEvent;
use lighthouse_intake::InputEvent;

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand {
    Say(String),
    Abandon,
    Quit,
    Blank,
}

pub fn parse_line(line: &str) -> LineCommand {
    let line = line.trim();
    match line {
        "" => LineCommand::Blank,
        "/abandon" => LineCommand::Abandon,
        "/quit" | "/exit" => LineCommand::Quit,
        _ => LineCommand::Say(line.to_string()),
    }
}

/// Ask whether to continue a saved conversation. Anything but an explicit
/// "no" resumes.
pub fn ask_resume(greeting: &str) -> io::Result<bool> {
    let mut stdout = io::stdout();
    writeln!(stdout, "A saved conversation was found. {}", greeting)?;
    write!(stdout, "Continue where you left off? [Y/n] ")?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(!matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "n" | "no"
    ))
}

/// Forward stdin lines into the session until `/quit`, EOF or the session
/// hangs up. Runs on a plain thread so a pending read never holds up
/// runtime shutdown.
pub fn spawn_input_reader(tx: mpsc::UnboundedSender<InputEvent>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read from stdin");
                    break;
                }
            };
            let event = match parse_line(&line) {
                LineCommand::Say(text) => InputEvent::Typed(text),
                LineCommand::Abandon => InputEvent::Abandon,
                LineCommand::Quit => break,
                LineCommand::Blank => continue,
            };
            if tx.send(event).is_err() {
                break;
            }
        }
        tracing::debug!("Console input closed");
    })
}

/// Text to show the user for a session event, if any.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Response { text } => Some(format!("Lighthouse: {}", text)),
        SessionEvent::TextFallback { prompt, .. } => Some(format!("({})", prompt)),
        SessionEvent::Abandoned => {
            Some("Okay. Nothing has been saved. We're here whenever you need us.".to_string())
        }
        SessionEvent::Interrupted => Some(
            "Your progress is saved. Run lighthouse again to pick up where you left off."
                .to_string(),
        ),
        _ => None,
    }
}

pub async fn print_events(mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = rx.recv().await {
        tracing::trace!(event = ?event, "Session event");
        if let Some(line) = render_event(&event) {
            println!("{}", line);
        }
    }
}

/// Wait for the printer to drain. Returns false if the task failed.
pub async fn join_printer(printer: tokio::task::JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Event printer task failed");
            false
        }
    }
}
