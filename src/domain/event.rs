//! Window events delivered by the host's event-observation layer.

use std::borrow::Cow;

/// Kind of a window event.
///
/// Only state and content changes reach the classifier; everything else is
/// dropped by the type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    WindowStateChanged,
    WindowContentChanged,
    ViewClicked,
    ViewFocused,
    ViewScrolled,
    TextChanged,
    Other,
}

impl EventKind {
    /// Whether the classifier inspects events of this kind.
    pub fn is_classified(&self) -> bool {
        matches!(
            self,
            EventKind::WindowStateChanged | EventKind::WindowContentChanged
        )
    }
}

/// A single window/content-change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    pub kind: EventKind,
    pub source_package: Cow<'static, str>,
    pub class_name: Cow<'static, str>,
    /// Visible text captured with the event, in its original case.
    pub text: String,
    /// Host timestamp in wall-clock milliseconds.
    pub timestamp_millis: u64,
}

impl WindowEvent {
    pub fn new(
        kind: EventKind,
        source_package: impl Into<Cow<'static, str>>,
        class_name: impl Into<Cow<'static, str>>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source_package: source_package.into(),
            class_name: class_name.into(),
            text: text.into(),
            timestamp_millis: 0,
        }
    }

    /// Convenience constructor for a window-state change with no text.
    pub fn state_changed(source_package: impl Into<Cow<'static, str>>) -> Self {
        Self::new(EventKind::WindowStateChanged, source_package, "", "")
    }

    pub fn with_timestamp(mut self, timestamp_millis: u64) -> Self {
        self.timestamp_millis = timestamp_millis;
        self
    }

    pub fn is_state_change(&self) -> bool {
        self.kind == EventKind::WindowStateChanged
    }
}
