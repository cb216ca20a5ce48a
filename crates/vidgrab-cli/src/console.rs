//! Terminal rendering of batch events.

use std::io::{self, IsTerminal, Stdout, Write};
use std::sync::{Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::debug;
use vidgrab_core::{BatchEvent, BatchReport, DownloadProgress};

const BAR_TEMPLATE: &str = "  [{bar:30.cyan/blue}] {pos:>3}% {msg}";

struct State<W> {
    out: W,
    bar: Option<ProgressBar>,
}

/// Prints batch events as they arrive.
///
/// Each item gets its own progress bar, drawn only on a terminal. Item,
/// status and outcome lines go to `out` above the bar.
pub struct Console<W> {
    state: Mutex<State<W>>,
    draw_bars: bool,
}

impl Console<Stdout> {
    /// Console on standard output; bars are hidden when it is not a terminal.
    #[must_use]
    pub fn stdout() -> Self {
        let draw_bars = io::stdout().is_terminal();
        Self::new(io::stdout(), draw_bars)
    }
}

impl<W: Write + Send> Console<W> {
    /// Console writing lines to `out`.
    pub const fn new(out: W, draw_bars: bool) -> Self {
        Self {
            state: Mutex::new(State { out, bar: None }),
            draw_bars,
        }
    }

    /// Render one event.
    pub fn show(&self, event: &BatchEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.render(&mut state, event) {
            debug!("Failed to write progress output: {}", e);
        }
    }

    /// Print the run summary.
    pub fn finish(&self, report: &BatchReport) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = state.bar.take() {
            bar.finish_and_clear();
        }
        if let Err(e) = print_line(&mut state, &report.summary()) {
            debug!("Failed to write batch summary: {}", e);
        }
    }

    fn render(&self, state: &mut State<W>, event: &BatchEvent) -> io::Result<()> {
        match event {
            BatchEvent::ItemStarted { index, total, url } => {
                if let Some(bar) = state.bar.take() {
                    bar.finish_and_clear();
                }
                let header = print_line(state, &format!("[{}/{}] {}", index + 1, total, url));
                state.bar = Some(self.item_bar());
                header?;
            }
            BatchEvent::Status { message, .. } => {
                print_line(state, &format!("  {message}"))?;
            }
            BatchEvent::Progress { progress, .. } => {
                if let Some(bar) = &state.bar {
                    bar.set_position(u64::from(progress.percent));
                    bar.set_message(progress_message(progress));
                }
            }
            BatchEvent::ItemFinished { outcome, .. } => {
                if let Some(bar) = state.bar.take() {
                    bar.finish_and_clear();
                }
                print_line(state, &format!("  {outcome}"))?;
            }
        }
        Ok(())
    }

    fn item_bar(&self) -> ProgressBar {
        let target = if self.draw_bars {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(100), target);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        bar
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }

    #[cfg(test)]
    fn bar_position(&self) -> Option<(u64, String)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.bar.as_ref().map(|bar| (bar.position(), bar.message()))
    }
}

/// Write a line above the current bar, if any.
fn print_line<W: Write>(state: &mut State<W>, line: &str) -> io::Result<()> {
    let State { out, bar } = state;
    let mut write = || {
        writeln!(out, "{line}")?;
        out.flush()
    };
    match bar {
        Some(bar) => bar.suspend(write),
        None => write(),
    }
}

fn progress_message(progress: &DownloadProgress) -> String {
    let mut message = format!("[{}] {}", progress.phase, progress.status);
    if let Some(rate) = progress.formatted_rate() {
        message.push_str(&format!(" @ {rate}"));
    }
    if let Some(eta) = &progress.eta {
        message.push_str(&format!(" ETA {eta}"));
    }
    message
}
