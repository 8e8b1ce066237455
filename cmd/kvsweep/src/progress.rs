//! Spinner shown on stderr while an operation is in flight.

use std::future::Future;
use std::io::{self, IsTerminal, Write};
use std::time::Duration;

const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_INTERVAL: Duration = Duration::from_millis(80);

const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Await `fut`, animating `message` on stderr until it resolves.
///
/// Draws nothing when stderr is not a terminal. The line is cleared before
/// returning; reporting the outcome is left to the caller.
pub async fn spin<F: Future>(message: &str, fut: F) -> F::Output {
    let mut stderr = io::stderr();
    if !stderr.is_terminal() {
        return fut.await;
    }

    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    let mut frame = 0usize;
    tokio::pin!(fut);

    let output = loop {
        tokio::select! {
            output = &mut fut => break output,
            _ = ticker.tick() => {
                let _ = write!(stderr, "\r{CYAN}{}{RESET} {message}\x1b[K", FRAMES[frame % FRAMES.len()]);
                let _ = stderr.flush();
                frame += 1;
            }
        }
    };

    let _ = write!(stderr, "\r\x1b[K");
    let _ = stderr.flush();
    output
}
