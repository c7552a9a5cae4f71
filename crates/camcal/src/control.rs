//! Keyboard control over the terminal.
//!
//! `g` starts capturing, `u` toggles the undistorted preview, `q`, `Esc` and
//! `Ctrl-C` quit.

use std::time::Duration;

use camcal_capture::{ControlInput, ControlSignal};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Reads single key presses; the terminal is in raw mode while this lives.
pub struct TerminalControl {
    raw: bool,
}

impl TerminalControl {
    pub fn new() -> Self {
        let raw = match enable_raw_mode() {
            Ok(()) => true,
            Err(err) => {
                log::warn!("keyboard control unavailable: {err}");
                false
            }
        };
        Self { raw }
    }
}

impl Default for TerminalControl {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalControl {
    fn drop(&mut self) {
        if self.raw {
            let _ = disable_raw_mode();
        }
    }
}

pub(crate) fn map_key(key: &KeyEvent) -> Option<ControlSignal> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(ControlSignal::Quit)
        }
        KeyCode::Char('g') => Some(ControlSignal::StartCapture),
        KeyCode::Char('u') => Some(ControlSignal::ToggleUndistort),
        KeyCode::Char('q') | KeyCode::Esc => Some(ControlSignal::Quit),
        _ => None,
    }
}

impl ControlInput for TerminalControl {
    fn poll(&mut self, timeout: Duration) -> Option<ControlSignal> {
        if !self.raw || !event::poll(timeout).unwrap_or(false) {
            return None;
        }
        match event::read() {
            Ok(Event::Key(key)) => map_key(&key),
            _ => None,
        }
    }
}
