//! Hides a leading reasoning segment from model output.
//!
//! Some models open their answer with `<think>...</think>`. The filter buffers
//! the raw accumulated text so markers split across fragments are still
//! recognised, and reports only the delta that became visible on each push.

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Nothing but whitespace or a partial opening marker seen yet.
    Undetermined,
    /// Inside the reasoning segment; nothing is emitted.
    Suppressing,
    Passthrough,
    Done,
}

#[derive(Debug, Clone)]
pub struct ThinkFilter {
    raw: String,
    state: FilterState,
    emitted_upto: usize,
    trim_pending: bool,
    visible: String,
}

impl Default for ThinkFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self {
            raw: String::new(),
            state: FilterState::Undetermined,
            emitted_upto: 0,
            trim_pending: false,
            visible: String::new(),
        }
    }

    /// Runs the incremental algorithm once over a complete response.
    pub fn apply(text: &str) -> String {
        let mut filter = Self::new();
        filter.push(text);
        filter.finish();
        filter.visible
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn is_suppressing(&self) -> bool {
        self.state == FilterState::Suppressing
    }

    /// Text decided visible so far.
    pub fn visible(&self) -> &str {
        &self.visible
    }

    pub fn into_visible(self) -> String {
        self.visible
    }

    /// Feeds one fragment and returns the newly visible text, possibly empty.
    pub fn push(&mut self, fragment: &str) -> String {
        if self.state == FilterState::Done {
            return String::new();
        }
        self.raw.push_str(fragment);

        loop {
            match self.state {
                FilterState::Undetermined => {
                    let trimmed = self.raw.trim_start();
                    if trimmed.is_empty() {
                        return String::new();
                    }
                    let lower = trimmed.to_ascii_lowercase();
                    if lower.starts_with(THINK_OPEN) {
                        self.state = FilterState::Suppressing;
                    } else if THINK_OPEN.starts_with(lower.as_str()) {
                        return String::new();
                    } else {
                        self.state = FilterState::Passthrough;
                    }
                }
                FilterState::Suppressing => {
                    // ASCII lowercasing keeps byte offsets aligned with `raw`.
                    let lower = self.raw.to_ascii_lowercase();
                    let Some(position) = lower.find(THINK_CLOSE) else {
                        return String::new();
                    };
                    self.emitted_upto = position + THINK_CLOSE.len();
                    self.trim_pending = true;
                    self.state = FilterState::Passthrough;
                }
                FilterState::Passthrough => return self.emit_pending(),
                FilterState::Done => return String::new(),
            }
        }
    }

    /// Ends the response. Pending text that never resolved into a reasoning
    /// segment is released; an unclosed reasoning segment stays hidden.
    pub fn finish(&mut self) -> String {
        let delta = match self.state {
            FilterState::Undetermined => {
                let pending = self.raw.clone();
                self.visible.push_str(&pending);
                pending
            }
            FilterState::Passthrough => self.emit_pending(),
            FilterState::Suppressing | FilterState::Done => String::new(),
        };
        self.state = FilterState::Done;
        delta
    }

    /// Ends the response early. Undecided text is dropped since it may be the
    /// start of a reasoning segment.
    pub fn interrupt(&mut self) -> String {
        let delta = match self.state {
            FilterState::Passthrough => self.emit_pending(),
            _ => String::new(),
        };
        self.state = FilterState::Done;
        delta
    }

    fn emit_pending(&mut self) -> String {
        if self.trim_pending {
            let pending = &self.raw[self.emitted_upto..];
            let trimmed = pending.trim_start();
            self.emitted_upto += pending.len() - trimmed.len();
            if trimmed.is_empty() {
                return String::new();
            }
            self.trim_pending = false;
        }

        let delta = self.raw[self.emitted_upto..].to_string();
        self.emitted_upto = self.raw.len();
        self.visible.push_str(&delta);
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(fragments: &[&str]) -> (String, String) {
        let mut filter = ThinkFilter::new();
        let mut streamed = String::new();
        for fragment in fragments {
            streamed.push_str(&filter.push(fragment));
        }
        streamed.push_str(&filter.finish());
        (streamed, filter.into_visible())
    }

    fn every_two_way_split(text: &str) -> Vec<(String, String)> {
        text.char_indices()
            .map(|(index, _)| (text[..index].to_string(), text[index..].to_string()))
            .collect()
    }

    #[test]
    fn hides_closed_reasoning() {
        assert_eq!(ThinkFilter::apply("<think>secret</think>hello"), "hello");
    }

    #[test]
    fn unclosed_reasoning_never_leaks() {
        assert_eq!(ThinkFilter::apply("<think>secret"), "");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(ThinkFilter::apply("plain text"), "plain text");
        assert_eq!(ThinkFilter::apply("<b>bold</b>"), "<b>bold</b>");
    }

    #[test]
    fn markers_are_case_insensitive() {
        assert_eq!(
            ThinkFilter::apply("  <THINK>plan</Think>\n\n  Answer"),
            "Answer"
        );
    }

    #[test]
    fn fragmentation_does_not_change_output() {
        let cases = [
            "<think>secret</think>hello",
            "<think>secret",
            "plain text",
            "\n<think>a\nb</think>\n\n  spaced answer",
            "<thinking is not a marker",
        ];

        for case in cases {
            let whole = ThinkFilter::apply(case);

            for (head, tail) in every_two_way_split(case) {
                let (streamed, visible) = feed(&[&head, &tail]);
                assert_eq!(visible, whole, "split {head:?} | {tail:?}");
                assert_eq!(streamed, whole, "split {head:?} | {tail:?}");
            }

            let chars: Vec<String> = case.chars().map(String::from).collect();
            let refs: Vec<&str> = chars.iter().map(String::as_str).collect();
            let (streamed, visible) = feed(&refs);
            assert_eq!(visible, whole, "per-char feed of {case:?}");
            assert_eq!(streamed, whole);
        }
    }

    #[test]
    fn reports_state_transitions() {
        let mut filter = ThinkFilter::new();
        assert_eq!(filter.push("  "), "");
        assert_eq!(filter.state(), FilterState::Undetermined);
        assert_eq!(filter.push("<thi"), "");
        assert_eq!(filter.state(), FilterState::Undetermined);
        assert_eq!(filter.push("nk>reasoning</th"), "");
        assert!(filter.is_suppressing());
        assert_eq!(filter.push("ink> "), "");
        assert_eq!(filter.state(), FilterState::Passthrough);
        assert_eq!(filter.push("Hi"), "Hi");
        assert_eq!(filter.push(" there"), " there");
        assert_eq!(filter.finish(), "");
        assert_eq!(filter.state(), FilterState::Done);
        assert_eq!(filter.push("late"), "");
        assert_eq!(filter.visible(), "Hi there");
    }

    #[test]
    fn interrupt_keeps_only_decided_text() {
        let mut filter = ThinkFilter::new();
        filter.push("<think>half a tho");
        assert_eq!(filter.interrupt(), "");
        assert_eq!(filter.visible(), "");

        let mut filter = ThinkFilter::new();
        filter.push("<thi");
        assert_eq!(filter.interrupt(), "");
        assert_eq!(filter.visible(), "");

        let mut filter = ThinkFilter::new();
        filter.push("partial ans");
        filter.interrupt();
        assert_eq!(filter.visible(), "partial ans");
    }
}
