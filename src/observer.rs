//! Progress reporting hooks for section fetches.
//!
//! The fetch worker only talks to [`ProgressObserver`]; the binary plugs in
//! indicatif bars, tests and library callers can stay silent.
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;

/// Receives progress updates for a single section.
pub trait ProgressObserver: Send + Sync {
    /// `n` more bytes were written.
    fn inc(&self, n: u64);
    /// A short human-facing status line.
    fn message(&self, msg: String);
    /// The section is done, successfully or not.
    fn finish(&self);
}

/// Draws one indicatif bar per section.
pub struct ConsoleObserver {
    pub pb: ProgressBar,
}

impl ProgressObserver for ConsoleObserver {
    fn inc(&self, n: u64) {
        self.pb.inc(n);
    }

    fn message(&self, msg: String) {
        self.pb.set_message(msg);
    }

    fn finish(&self) {
        self.pb.finish();
    }
}

/// Discards every update.
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {
    fn inc(&self, _n: u64) {}

    fn message(&self, _msg: String) {}

    fn finish(&self) {}
}

/// Hands out an observer per section.
pub trait ObserverFactory: Send + Sync {
    fn section(&self, index: usize, len: u64) -> Arc<dyn ProgressObserver>;
}

impl ObserverFactory for SilentObserver {
    fn section(&self, _index: usize, _len: u64) -> Arc<dyn ProgressObserver> {
        Arc::new(SilentObserver)
    }
}

/// Adds a bar to a shared [`MultiProgress`] for every section.
pub struct ConsoleProgress {
    multi: MultiProgress,
    style: ProgressStyle,
}

impl ConsoleProgress {
    pub fn new(multi: MultiProgress) -> Self {
        let style = ProgressStyle::with_template("{msg} {bar:40.cyan/blue} {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        Self { multi, style }
    }
}

impl ObserverFactory for ConsoleProgress {
    fn section(&self, index: usize, len: u64) -> Arc<dyn ProgressObserver> {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.style.clone());
        pb.set_message(format!("Part {}", index + 1));
        Arc::new(ConsoleObserver { pb })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_observer_tracks_position() {
        let observer = ConsoleObserver {
            pb: ProgressBar::hidden(),
        };
        observer.inc(5);
        observer.inc(7);
        observer.message("Part 1".into());
        observer.finish();

        assert_eq!(observer.pb.position(), 12);
        assert!(observer.pb.is_finished());
    }

    #[test]
    fn test_console_progress_sizes_bars() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let factory = ConsoleProgress::new(multi);
        let observer = factory.section(0, 6);
        observer.inc(6);
        observer.finish();
    }
}
