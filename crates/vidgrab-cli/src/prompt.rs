//! Interactive collision prompt.

use std::io::{self, BufRead, BufReader, Stderr, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use vidgrab_core::{CancellationToken, CollisionPrompt, CollisionStrategy};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

enum Line {
    Text(String),
    Closed,
    Cancelled,
}

/// Asks on a line-oriented terminal how to handle an existing file.
///
/// Lines are read on a background thread so a pending question gives up as
/// soon as the run is cancelled; it then answers [`CollisionStrategy::Skip`].
/// End of input or a read error answers [`CollisionStrategy::AutoRename`],
/// which never loses data.
pub struct LinePrompt<W> {
    lines: Mutex<Receiver<io::Result<String>>>,
    writer: Mutex<W>,
    cancel: CancellationToken,
}

impl LinePrompt<Stderr> {
    /// Prompt on stderr, read answers from stdin.
    #[must_use]
    pub fn stdio(cancel: CancellationToken) -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr(), cancel)
    }
}

impl<W: Write + Send> LinePrompt<W> {
    /// Create a prompt over arbitrary streams.
    pub fn new<R>(reader: R, writer: W, cancel: CancellationToken) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self {
            lines: Mutex::new(spawn_reader(reader)),
            writer: Mutex::new(writer),
            cancel,
        }
    }

    fn ask(&self, existing: &Path) -> io::Result<Option<CollisionStrategy>> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            write!(
                writer,
                "'{}' already exists. [o]verwrite, [s]kip or [r]ename? (applies to the rest of this run) ",
                existing.display()
            )?;
            writer.flush()?;

            match self.next_line(&lines)? {
                Line::Text(line) => {
                    if let Some(strategy) = parse_choice(&line) {
                        return Ok(Some(strategy));
                    }
                    writeln!(writer, "Please answer o, s or r.")?;
                }
                Line::Closed => return Ok(None),
                Line::Cancelled => {
                    writeln!(writer)?;
                    debug!("Collision prompt interrupted by cancellation");
                    return Ok(Some(CollisionStrategy::Skip));
                }
            }
        }
    }

    fn next_line(&self, lines: &Receiver<io::Result<String>>) -> io::Result<Line> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Line::Cancelled);
            }
            match lines.recv_timeout(POLL_INTERVAL) {
                Ok(line) => return line.map(Line::Text),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(Line::Closed),
            }
        }
    }
}

impl<W: Write + Send> CollisionPrompt for LinePrompt<W> {
    fn choose(&self, existing: &Path) -> CollisionStrategy {
        match self.ask(existing) {
            Ok(Some(strategy)) => strategy,
            Ok(None) => CollisionStrategy::AutoRename,
            Err(e) => {
                warn!("Collision prompt failed, renaming instead: {}", e);
                CollisionStrategy::AutoRename
            }
        }
    }
}

/// Forward lines from `reader` one at a time; the channel closes at end of
/// input or after the first read error.
fn spawn_reader<R>(mut reader: R) -> Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(0);
    thread::spawn(move || {
        loop {
            let mut line = String::new();
            let read = match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => Ok(line),
                Err(e) => Err(e),
            };
            let failed = read.is_err();
            if tx.send(read).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Parse one answer line.
#[must_use]
pub fn parse_choice(input: &str) -> Option<CollisionStrategy> {
    match input.trim().to_ascii_lowercase().as_str() {
        "o" | "overwrite" => Some(CollisionStrategy::Overwrite),
        "s" | "skip" => Some(CollisionStrategy::Skip),
        "r" | "rename" => Some(CollisionStrategy::AutoRename),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::{Cursor, Read};
    use std::sync::mpsc::Sender;
    use std::time::Instant;

    use super::*;

    /// Reader that blocks until its sender is dropped.
    struct Stalled(Receiver<()>);

    impl Read for Stalled {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    fn stalled() -> (Sender<()>, BufReader<Stalled>) {
        let (hold, rx) = mpsc::channel();
        (hold, BufReader::new(Stalled(rx)))
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("o\n"), Some(CollisionStrategy::Overwrite));
        assert_eq!(parse_choice("  Skip "), Some(CollisionStrategy::Skip));
        assert_eq!(parse_choice("R"), Some(CollisionStrategy::AutoRename));
        assert_eq!(parse_choice("rename"), Some(CollisionStrategy::AutoRename));
        assert_eq!(parse_choice(""), None);
        assert_eq!(parse_choice("yes"), None);
    }

    #[test]
    fn test_prompt_repeats_until_valid_answer() {
        let prompt = LinePrompt::new(
            Cursor::new("maybe\ns\n"),
            Vec::new(),
            CancellationToken::new(),
        );
        let choice = prompt.choose(Path::new("/videos/Demo [abc].mp4"));
        assert_eq!(choice, CollisionStrategy::Skip);

        let written = prompt.writer.into_inner().unwrap();
        let written = String::from_utf8(written).unwrap();
        assert_eq!(written.matches("already exists").count(), 2);
        assert!(written.contains("Please answer o, s or r."));
        assert!(written.contains("Demo [abc].mp4"));
    }

    #[test]
    fn test_end_of_input_renames() {
        let prompt = LinePrompt::new(Cursor::new(""), Vec::new(), CancellationToken::new());
        assert_eq!(
            prompt.choose(Path::new("clip.mp4")),
            CollisionStrategy::AutoRename
        );
    }

    #[test]
    fn test_cancel_interrupts_pending_question() {
        let (hold, reader) = stalled();
        let cancel = CancellationToken::new();
        let prompt = LinePrompt::new(reader, Vec::new(), cancel.clone());

        let trigger = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });

        let started = Instant::now();
        assert_eq!(
            prompt.choose(Path::new("clip.mp4")),
            CollisionStrategy::Skip
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(hold);
    }

    #[test]
    fn test_cancelled_before_asking_skips() {
        let (hold, reader) = stalled();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let prompt = LinePrompt::new(reader, Vec::new(), cancel);

        assert_eq!(
            prompt.choose(Path::new("clip.mp4")),
            CollisionStrategy::Skip
        );
        let written = String::from_utf8(prompt.writer.into_inner().unwrap()).unwrap();
        assert!(written.ends_with('\n'));
        drop(hold);
    }
}
