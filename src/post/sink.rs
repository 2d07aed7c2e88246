// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Destinations for posted text.

use parking_lot::Mutex;
use std::borrow::Cow;
use std::io::{self, Write};

/// Severity of a posted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostLevel {
    /// Ordinary console output.
    Normal,
    /// Error report.
    Error,
    /// Diagnostic output at the given verbosity level.
    Verbose(u8),
    /// Internal consistency check failure.
    Bug,
}

impl PostLevel {
    /// Prefix used by plain-text sinks.
    pub fn prefix(&self) -> Cow<'static, str> {
        match self {
            PostLevel::Normal => Cow::Borrowed(""),
            PostLevel::Error => Cow::Borrowed("error: "),
            PostLevel::Verbose(level) => Cow::Owned(format!("verbose({}): ", level)),
            PostLevel::Bug => Cow::Borrowed("consistency check failed: "),
        }
    }

    /// Level number understood by the host console.
    pub fn console_level(&self) -> u32 {
        match self {
            PostLevel::Normal | PostLevel::Bug => 3,
            PostLevel::Error => 1,
            PostLevel::Verbose(level) => *level as u32 + 4,
        }
    }
}

/// Something that accepts posted text.
///
/// `text` carries its own line endings; continuation fragments from
/// [`Poster::start_post`](super::Poster::start_post) arrive without one.
pub trait PostSink: Send + Sync {
    fn emit(&self, level: PostLevel, text: &str);

    /// Audible alert after an error report. Only the host console has one.
    fn bell(&self) {}
}

/// Callback registered by the embedding application.
pub type PostHook = Box<dyn Fn(&str) + Send + Sync>;

/// Forwards prefixed text to a registered callback.
pub struct HookSink {
    hook: PostHook,
}

impl HookSink {
    pub fn new(hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            hook: Box::new(hook),
        }
    }

    pub fn from_boxed(hook: PostHook) -> Self {
        Self { hook }
    }
}

impl PostSink for HookSink {
    fn emit(&self, level: PostLevel, text: &str) {
        match level {
            PostLevel::Normal => (self.hook)(text),
            _ => (self.hook)(&format!("{}{}", level.prefix(), text)),
        }
    }
}

/// Writes prefixed text to a byte stream.
pub struct StreamSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Consume the sink and return the underlying stream.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl StreamSink<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> PostSink for StreamSink<W> {
    fn emit(&self, level: PostLevel, text: &str) {
        let mut out = self.out.lock();
        // Nowhere left to report a failing diagnostic stream.
        let _ = write!(out, "{}{}", level.prefix(), text);
        let _ = out.flush();
    }
}

/// Sends text to the host GUI console as `::pdwindow::post` commands.
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> PostSink for ConsoleSink<W> {
    fn emit(&self, level: PostLevel, text: &str) {
        let line = format!(
            "::pdwindow::post {} {{{}}}\n",
            level.console_level(),
            escape_console(text)
        );
        let mut out = self.out.lock();
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }

    fn bell(&self) {
        let mut out = self.out.lock();
        let _ = out.write_all(b"bell\n");
        let _ = out.flush();
    }
}

/// Escape characters that are special to the console's command parser.
pub fn escape_console(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '{' | '}' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Routes posted text into `tracing`.
///
/// Fragments are buffered until a newline arrives, so a line built with
/// `start_post`/`post_string`/`end_post` becomes one event. Blank lines are
/// dropped. A line carrying an error, verbose or bug fragment is traced at
/// that level.
#[derive(Debug, Default)]
pub struct TracingSink {
    pending: Mutex<PendingLine>,
}

#[derive(Debug, Default)]
struct PendingLine {
    level: Option<PostLevel>,
    text: String,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PostSink for TracingSink {
    fn emit(&self, level: PostLevel, text: &str) {
        let mut complete = Vec::new();
        {
            let mut pending = self.pending.lock();
            if pending.level.is_none() || level != PostLevel::Normal {
                pending.level = Some(level);
            }
            pending.text.push_str(text);

            while let Some(end) = pending.text.find('\n') {
                let line: String = pending.text.drain(..=end).collect();
                let line_level = pending.level.take().unwrap_or(PostLevel::Normal);
                complete.push((line_level, line));
            }
            if !pending.text.is_empty() && pending.level.is_none() {
                pending.level = Some(level);
            }
        }

        for (level, line) in complete {
            let line = line.trim_end();
            if !line.trim().is_empty() {
                trace_line(level, line);
            }
        }
    }
}

fn trace_line(level: PostLevel, text: &str) {
    match level {
        PostLevel::Normal => tracing::info!(target: "sootring::post", "{}", text),
        PostLevel::Error => tracing::error!(target: "sootring::post", "{}", text),
        PostLevel::Verbose(level) => {
            tracing::debug!(target: "sootring::post", verbosity = level, "{}", text)
        }
        PostLevel::Bug => {
            tracing::error!(target: "sootring::post", "consistency check failed: {}", text)
        }
    }
}
