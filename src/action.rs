use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Delay used when the delay field holds anything but digits.
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// One click to replay: where, and how long to wait afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClickAction {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "delay")]
    pub delay_ms: u64,
}

impl ClickAction {
    pub fn new(x: i32, y: i32, delay_ms: u64) -> Self {
        Self { x, y, delay_ms }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

impl fmt::Display for ClickAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Click at ({}, {}) with {}ms delay", self.x, self.y, self.delay_ms)
    }
}

/// Ordered click sequence. Insertion order is playback order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionList {
    actions: Vec<ClickAction>,
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `coords` as `"x, y"` and appends a click with `delay_ms`.
    /// The list is untouched when parsing fails.
    pub fn add(&mut self, coords: &str, delay_ms: u64) -> Result<ClickAction, ParseError> {
        let (x, y) = parse_coords(coords)?;
        let action = ClickAction::new(x, y, delay_ms);
        self.actions.push(action);
        tracing::info!("Added click at ({}, {}) with delay {}ms", x, y, delay_ms);
        Ok(action)
    }

    /// Total replacement, used by profile load.
    pub fn replace_all(&mut self, actions: Vec<ClickAction>) {
        self.actions = actions;
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    /// Immutable copy handed to a playback run.
    pub fn snapshot(&self) -> Arc<[ClickAction]> {
        Arc::from(self.actions.as_slice())
    }

    pub fn as_slice(&self) -> &[ClickAction] {
        &self.actions
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClickAction> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl From<Vec<ClickAction>> for ActionList {
    fn from(actions: Vec<ClickAction>) -> Self {
        Self { actions }
    }
}

/// Parses `"x, y"`. Whitespace around either field is ignored; fields past the
/// second are ignored as well.
pub fn parse_coords(text: &str) -> Result<(i32, i32), ParseError> {
    let mut fields = text.split(',');
    let (Some(x), Some(y)) = (fields.next(), fields.next()) else {
        return Err(ParseError::MissingField { input: text.to_string() });
    };
    Ok((parse_int("x", x)?, parse_int("y", y)?))
}

fn parse_int(field: &'static str, raw: &str) -> Result<i32, ParseError> {
    let raw = raw.trim();
    raw.parse().map_err(|_| ParseError::InvalidInteger { field, value: raw.to_string() })
}

/// Delay field: digits only, otherwise [`DEFAULT_DELAY_MS`]. Never an error.
pub fn parse_delay(text: &str) -> u64 {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return DEFAULT_DELAY_MS;
    }
    text.parse().unwrap_or(DEFAULT_DELAY_MS)
}
