//! Progress reporting: nested bars plus a scrolling log surface.
//!
//! Every stage takes a `ProgressSink`; the no-op sink keeps call sites
//! unconditional. The console reporter renders four nested counters
//! (overall, file, split, step) in a static header region and routes log
//! lines through a single consumer thread so concurrent producers never
//! clobber the bars and never block on rendering.

use crossbeam_channel::{unbounded, Receiver, Sender};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::thread::JoinHandle;

/// The four nesting levels of pipeline progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Overall = 0,
    File = 1,
    Split = 2,
    Step = 3,
}

pub trait ProgressSink: Send + Sync {
    /// Start (or restart) the counter at `level` with a new total.
    fn begin(&self, _level: Level, _description: &str, _total: u64) {}

    /// Advance the counter at `level`.
    fn advance(&self, _level: Level, _n: u64) {}

    /// Append a line to the scrolling log region. Must never block.
    fn log(&self, _message: &str) {}

    /// Flush pending output and release the display surface.
    fn finish(&self) {}
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {}

/// Sink that collects log lines, for assertions in tests.
#[derive(Default)]
pub struct CollectorSink {
    lines: Mutex<Vec<String>>,
}

impl CollectorSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl ProgressSink for CollectorSink {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

/// Terminal reporter over `indicatif`.
pub struct ConsoleReporter {
    multi: MultiProgress,
    bars: Mutex<[Option<ProgressBar>; 4]>,
    log_tx: Mutex<Option<Sender<String>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleReporter {
    #[must_use]
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let (log_tx, log_rx): (Sender<String>, Receiver<String>) = unbounded();

        // Single consumer serializes log output under the bars.
        let consumer_multi = multi.clone();
        let consumer = std::thread::spawn(move || {
            while let Ok(line) = log_rx.recv() {
                let _ = consumer_multi.println(line);
            }
        });

        Self {
            multi,
            bars: Mutex::new([None, None, None, None]),
            log_tx: Mutex::new(Some(log_tx)),
            consumer: Mutex::new(Some(consumer)),
        }
    }

    fn bar_style(level: Level) -> ProgressStyle {
        let template = match level {
            Level::Overall => "{prefix:>7} [{bar:36.cyan/blue}] {pos}/{len} {msg}",
            _ => "{prefix:>7} [{bar:36}] {pos}/{len} {msg}",
        };
        ProgressStyle::default_bar()
            .template(template)
            .unwrap()
            .progress_chars("#>-")
    }

    fn prefix(level: Level) -> &'static str {
        match level {
            Level::Overall => "overall",
            Level::File => "file",
            Level::Split => "split",
            Level::Step => "step",
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleReporter {
    fn begin(&self, level: Level, description: &str, total: u64) {
        let mut bars = self.bars.lock().unwrap();
        let slot = level as usize;

        if let Some(old) = bars[slot].take() {
            old.finish_and_clear();
        }

        let bar = self.multi.insert(slot, ProgressBar::new(total));
        bar.set_style(Self::bar_style(level));
        bar.set_prefix(Self::prefix(level));
        bar.set_message(description.to_string());
        bars[slot] = Some(bar);
    }

    fn advance(&self, level: Level, n: u64) {
        let bars = self.bars.lock().unwrap();
        if let Some(bar) = &bars[level as usize] {
            bar.inc(n);
        }
    }

    fn log(&self, message: &str) {
        // Unbounded channel: producers enqueue and move on.
        if let Some(tx) = self.log_tx.lock().unwrap().as_ref() {
            let _ = tx.send(message.to_string());
        }
    }

    fn finish(&self) {
        // Dropping the sender drains and stops the consumer; remaining
        // queued lines are printed before the thread exits.
        if let Some(tx) = self.log_tx.lock().unwrap().take() {
            drop(tx);
        }
        if let Some(handle) = self.consumer.lock().unwrap().take() {
            let _ = handle.join();
        }
        let mut bars = self.bars.lock().unwrap();
        for bar in bars.iter_mut() {
            if let Some(bar) = bar.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        self.finish();
    }
}
