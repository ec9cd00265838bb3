//! Recording sink for tests and headless runs.
//!
//! Unlike the mockall-generated mock, [`RecordingUiSink`] accepts any call
//! sequence and lets the test inspect it afterwards, which suits assertions
//! about notices produced by background tasks.

use std::sync::{Mutex, PoisonError};

use super::{UiEvent, UiSink};

/// Stores every [`UiEvent`] it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingUiSink {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingUiSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything recorded so far.
    pub fn events(&self) -> Vec<UiEvent> {
        self.lock().clone()
    }

    /// Log and alert texts, in order, without the affordance toggles.
    pub fn lines(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                UiEvent::Log(text) | UiEvent::Alert(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Only the alert texts.
    pub fn alerts(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                UiEvent::Alert(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// `true` if any log or alert line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    /// The most recent `Connected` toggle, if any.
    pub fn last_connected(&self) -> Option<bool> {
        self.lock().iter().rev().find_map(|event| match event {
            UiEvent::Connected(value) => Some(*value),
            _ => None,
        })
    }

    /// The most recent `Listening` toggle, if any.
    pub fn last_listening(&self) -> Option<bool> {
        self.lock().iter().rev().find_map(|event| match event {
            UiEvent::Listening(value) => Some(*value),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<UiEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: UiEvent) {
        self.lock().push(event);
    }
}

impl UiSink for RecordingUiSink {
    fn notify(&self, text: &str) {
        self.push(UiEvent::Log(text.to_string()));
    }

    fn alert(&self, text: &str) {
        self.push(UiEvent::Alert(text.to_string()));
    }

    fn set_connected(&self, connected: bool) {
        self.push(UiEvent::Connected(connected));
    }

    fn set_listening(&self, listening: bool) {
        self.push(UiEvent::Listening(listening));
    }
}
