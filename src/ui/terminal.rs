use std::fmt::Display;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::cursor::{MoveTo, MoveToColumn};
use crossterm::queue;
use crossterm::style::{Attribute, Color, ContentStyle, Print, StyledContent};
use crossterm::terminal::{Clear, ClearType};

use crate::core::reply::{ResponseEnd, ResponseView};

/// Redraw cadence while a reply is streaming.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(1000 / 24);

const THINKING: &str = "thinking…";

#[derive(Debug, Clone, Copy)]
enum Tone {
    Assistant,
    Muted,
    Notice,
    Error,
}

impl Tone {
    fn style(self) -> ContentStyle {
        let mut style = ContentStyle::new();
        match self {
            Tone::Assistant => style.foreground_color = Some(Color::Yellow),
            Tone::Muted => {
                style.attributes.set(Attribute::Dim);
                style.attributes.set(Attribute::Italic);
            }
            Tone::Notice => {
                style.foreground_color = Some(Color::Green);
                style.attributes.set(Attribute::Bold);
            }
            Tone::Error => {
                style.foreground_color = Some(Color::Red);
                style.attributes.set(Attribute::Bold);
            }
        }
        style
    }
}

/// Plain terminal renderer: appends reply text as it becomes visible and
/// prints colored status lines.
pub struct TerminalView<W: Write + Send> {
    out: W,
    pending: String,
    last_flush: Option<Instant>,
    refresh_interval: Duration,
    thinking_shown: bool,
    color: bool,
}

impl TerminalView<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), true)
    }
}

impl<W: Write + Send> TerminalView<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            pending: String::new(),
            last_flush: None,
            refresh_interval: REFRESH_INTERVAL,
            thinking_shown: false,
            color,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn clear_screen(&mut self) {
        let _ = queue!(self.out, Clear(ClearType::All), MoveTo(0, 0));
        let _ = self.out.flush();
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn styled<D: Display>(&self, content: D, tone: Tone) -> StyledContent<D> {
        let style = if self.color {
            tone.style()
        } else {
            ContentStyle::new()
        };
        StyledContent::new(style, content)
    }

    fn clear_thinking(&mut self) {
        if self.thinking_shown {
            let _ = queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine));
            self.thinking_shown = false;
        }
    }

    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            self.clear_thinking();
            let text = std::mem::take(&mut self.pending);
            let styled = self.styled(&text, Tone::Assistant);
            let _ = queue!(self.out, Print(styled));
        }
        let _ = self.out.flush();
        self.last_flush = Some(Instant::now());
    }

    fn status_line(&mut self, tone: Tone, text: &str) {
        let styled = self.styled(text, tone);
        let _ = queue!(self.out, Print(styled), Print("\n"));
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> ResponseView for TerminalView<W> {
    fn begin_response(&mut self) {
        self.pending.clear();
        self.thinking_shown = false;
        self.last_flush = None;
    }

    fn show_delta(&mut self, delta: &str, thinking: bool) {
        if thinking && delta.is_empty() {
            if !self.thinking_shown {
                let styled = self.styled(THINKING, Tone::Muted);
                let _ = queue!(self.out, Print(styled));
                let _ = self.out.flush();
                self.thinking_shown = true;
            }
            return;
        }

        self.pending.push_str(delta);
        let due = self
            .last_flush
            .is_none_or(|last| last.elapsed() >= self.refresh_interval);
        if due {
            self.flush_pending();
        }
    }

    fn end_response(&mut self, _visible: &str, end: ResponseEnd) {
        self.flush_pending();
        self.clear_thinking();
        let _ = queue!(self.out, Print("\n"));
        if end == ResponseEnd::Interrupted {
            let styled = self.styled("[stopped]", Tone::Muted);
            let _ = queue!(self.out, Print(styled), Print("\n"));
        }
        let _ = queue!(self.out, Print("\n"));
        let _ = self.out.flush();
    }

    fn notice(&mut self, text: &str) {
        self.status_line(Tone::Notice, text);
    }

    fn error(&mut self, text: &str) {
        self.status_line(Tone::Error, text);
    }
}
