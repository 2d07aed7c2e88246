// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Console text posting.
//!
//! A [`Poster`] formats messages and hands them to exactly one [`PostSink`]:
//! a registered hook, a stream such as stderr, or the host console. The sink
//! and the verbosity threshold are chosen by whoever builds the poster, so
//! nothing here is process-global.
//!
//! Posting allocates and may lock the sink, so it must not be called from
//! the audio thread.

pub mod sink;

pub use sink::{
    escape_console, ConsoleSink, HookSink, PostHook, PostLevel, PostSink, StreamSink, TracingSink,
};

use crate::config::PostConfig;
use parking_lot::Mutex;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Maximum length of one formatted message, including the terminator slot.
pub const MAX_POST_LEN: usize = 1000;

const FIND_HINT: &str = "... you might be able to track this down from the Find menu.";

/// Formats messages and forwards them to a sink.
pub struct Poster {
    sink: Arc<dyn PostSink>,
    verbosity: u8,
    /// Last error attributed to an object, for `find_error`.
    last_error: Mutex<Option<TrackedError>>,
    hinted: AtomicBool,
    /// Error stashed by `log_error` until `ouch`.
    pending: Mutex<Option<TrackedError>>,
}

#[derive(Debug, Clone)]
struct TrackedError {
    object: String,
    message: String,
}

impl Poster {
    /// Create a poster writing to `sink`, dropping verbose output above `verbosity`.
    pub fn new(sink: Arc<dyn PostSink>, verbosity: u8) -> Self {
        Self {
            sink,
            verbosity,
            last_error: Mutex::new(None),
            hinted: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    /// Build a poster from configuration.
    ///
    /// A registered hook wins; otherwise stderr when `print_to_stderr` is set,
    /// then tracing when `forward_to_tracing` is set, else the host console
    /// on stdout.
    pub fn from_config(config: &PostConfig, hook: Option<PostHook>) -> Self {
        let sink: Arc<dyn PostSink> = match hook {
            Some(hook) => Arc::new(HookSink::from_boxed(hook)),
            None if config.print_to_stderr => Arc::new(StreamSink::stderr()),
            None if config.forward_to_tracing => Arc::new(TracingSink::new()),
            None => Arc::new(ConsoleSink::stdout()),
        };
        Self::new(sink, config.verbosity)
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Post a complete line.
    pub fn post(&self, msg: impl Display) {
        let mut text = format_bounded(msg);
        text.push('\n');
        self.sink.emit(PostLevel::Normal, &text);
    }

    /// Start a line without terminating it.
    pub fn start_post(&self, msg: impl Display) {
        self.sink.emit(PostLevel::Normal, &format_bounded(msg));
    }

    /// Append a space-separated word to the current line.
    pub fn post_string(&self, s: &str) {
        self.sink.emit(PostLevel::Normal, " ");
        self.sink.emit(PostLevel::Normal, s);
    }

    /// Append a number to the current line.
    pub fn post_float(&self, f: f32) {
        self.post_string(&f.to_string());
    }

    /// Terminate the current line.
    pub fn end_post(&self) {
        self.sink.emit(PostLevel::Normal, "\n");
    }

    pub fn error(&self, msg: impl Display) {
        self.sink.emit(PostLevel::Error, &format_bounded(msg));
        self.end_post();
    }

    /// Post diagnostic output if `level` is within the configured verbosity.
    pub fn verbose(&self, level: u8, msg: impl Display) {
        if level > self.verbosity {
            return;
        }
        self.sink.emit(PostLevel::Verbose(level), &format_bounded(msg));
        self.end_post();
    }

    pub fn bug(&self, msg: impl Display) {
        self.sink.emit(PostLevel::Bug, &format_bounded(msg));
        self.end_post();
    }

    /// Report an error caused by `object` and remember it for [`find_error`].
    ///
    /// The first such error also posts a hint at verbose level 0.
    ///
    /// [`find_error`]: Poster::find_error
    pub fn object_error(&self, object: &str, msg: impl Display) {
        let message = format_bounded(msg);
        self.sink.emit(PostLevel::Error, &message);
        self.end_post();

        *self.last_error.lock() = Some(TrackedError {
            object: object.to_string(),
            message,
        });

        if !self.hinted.swap(true, Ordering::Relaxed) {
            self.verbose(0, FIND_HINT);
        }
    }

    /// Post the last error reported through `object_error`.
    ///
    /// Returns the offending object's name, if any.
    pub fn find_error(&self) -> Option<String> {
        let last = self.last_error.lock().clone();
        match last {
            None => {
                self.post("no findable error yet.");
                None
            }
            Some(tracked) => {
                self.post("last trackable error:");
                self.post(&tracked.message);
                Some(tracked.object)
            }
        }
    }

    /// Stash an error to be reported later by [`ouch`](Poster::ouch).
    pub fn log_error(&self, object: &str, message: impl Display) {
        *self.pending.lock() = Some(TrackedError {
            object: object.to_string(),
            message: message.to_string(),
        });
    }

    /// Stash the last OS error for `object`.
    pub fn log_os_error(&self, object: &str) {
        self.log_error(object, std::io::Error::last_os_error());
    }

    /// Report the stashed error, if one was logged, and ring the sink's bell.
    pub fn ouch(&self) {
        let pending = self.pending.lock().clone();
        if let Some(TrackedError { object, message }) = pending {
            if object.is_empty() {
                self.error(message);
            } else {
                self.error(format_args!("{}: {}", object, message));
            }
            self.sink.bell();
        }
    }
}

impl fmt::Debug for Poster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poster")
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

/// Format `msg`, truncated to `MAX_POST_LEN - 1` bytes on a char boundary.
fn format_bounded(msg: impl Display) -> String {
    let mut text = msg.to_string();
    let limit = MAX_POST_LEN - 1;
    if text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink recording every emission.
    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(PostLevel, String)>>,
        bells: std::sync::atomic::AtomicUsize,
    }

    impl PostSink for Recorder {
        fn emit(&self, level: PostLevel, text: &str) {
            self.lines.lock().push((level, text.to_string()));
        }

        fn bell(&self) {
            self.bells.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn poster(verbosity: u8) -> (Poster, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (Poster::new(recorder.clone(), verbosity), recorder)
    }

    fn texts(recorder: &Recorder) -> String {
        recorder
            .lines
            .lock()
            .iter()
            .map(|(_, t)| t.as_str())
            .collect()
    }

    #[test]
    fn test_post_line_building() {
        let (p, rec) = poster(0);
        p.post(format_args!("gain {}", 3));
        p.start_post("values:");
        p.post_string("a");
        p.post_float(0.5);
        p.end_post();

        assert_eq!(texts(&rec), "gain 3\nvalues: a 0.5\n");
    }

    #[test]
    fn test_verbose_threshold() {
        let (p, rec) = poster(1);
        p.verbose(1, "kept");
        p.verbose(2, "dropped");

        let lines = rec.lines.lock();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (PostLevel::Verbose(1), "kept".to_string()));
        assert_eq!(lines[1], (PostLevel::Normal, "\n".to_string()));
    }

    #[test]
    fn test_error_and_bug_levels() {
        let (p, rec) = poster(0);
        p.error("no device");
        p.bug("bad index");

        let lines = rec.lines.lock();
        assert_eq!(lines[0], (PostLevel::Error, "no device".to_string()));
        assert_eq!(lines[2], (PostLevel::Bug, "bad index".to_string()));
    }

    #[test]
    fn test_truncation() {
        let (p, rec) = poster(0);
        p.start_post("é".repeat(MAX_POST_LEN));

        let lines = rec.lines.lock();
        assert!(lines[0].1.len() <= MAX_POST_LEN - 1);
        assert_eq!(lines[0].1.len() % 2, 0);
    }

    #[test]
    fn test_find_error() {
        let (p, rec) = poster(0);
        assert_eq!(p.find_error(), None);

        p.object_error("osc~", "bad frequency");
        p.object_error("dac~", "no output");
        assert_eq!(p.find_error(), Some("dac~".to_string()));

        let out = texts(&rec);
        assert!(out.starts_with("no findable error yet.\n"));
        assert_eq!(out.matches(FIND_HINT).count(), 1);
        assert!(out.ends_with("last trackable error:\nno output\n"));
    }

    #[test]
    fn test_ouch() {
        let (p, rec) = poster(0);
        p.ouch();
        assert!(rec.lines.lock().is_empty());
        assert_eq!(rec.bells.load(Ordering::Relaxed), 0);

        p.log_error("audio", "device busy");
        p.ouch();
        p.log_error("", "plain");
        p.ouch();
        assert_eq!(rec.bells.load(Ordering::Relaxed), 2);

        let lines = rec.lines.lock();
        assert_eq!(lines[0], (PostLevel::Error, "audio: device busy".to_string()));
        assert_eq!(lines[2], (PostLevel::Error, "plain".to_string()));
    }

    #[test]
    fn test_from_config_prefers_hook() {
        let seen = Arc::new(Mutex::new(String::new()));
        let captured = Arc::clone(&seen);
        let hook: PostHook = Box::new(move |s: &str| captured.lock().push_str(s));

        let config = PostConfig {
            print_to_stderr: true,
            ..PostConfig::default()
        };
        let p = Poster::from_config(&config, Some(hook));
        p.error("x");

        assert_eq!(*seen.lock(), "error: x\n");
    }
}
