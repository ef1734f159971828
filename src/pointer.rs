use crate::error::PointerError;
use display_info::DisplayInfo;
use enigo::{MouseButton, MouseControllable};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;

/// OS pointer primitives used by capture and playback.
pub trait Pointer: Send + 'static {
    fn location(&mut self) -> Result<(i32, i32), PointerError>;
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), PointerError>;
    fn click(&mut self) -> Result<(), PointerError>;

    fn click_at(&mut self, x: i32, y: i32) -> Result<(), PointerError> {
        self.move_to(x, y)?;
        self.click()
    }
}

static ENIGO: Lazy<Mutex<enigo::Enigo>> = Lazy::new(|| Mutex::new(enigo::Enigo::new()));

/// The real mouse. All handles share one process-wide `Enigo`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnigoPointer;

impl Pointer for EnigoPointer {
    fn location(&mut self) -> Result<(i32, i32), PointerError> {
        Ok(ENIGO.lock().mouse_location())
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<(), PointerError> {
        ENIGO.lock().mouse_move_to(x, y);
        Ok(())
    }

    fn click(&mut self) -> Result<(), PointerError> {
        ENIGO.lock().mouse_click(MouseButton::Left);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recorded {
    position: (i32, i32),
    clicks: Vec<(i32, i32)>,
    fail_after: Option<usize>,
}

/// Pointer that only remembers what it was asked to do. Used for `--dry-run`.
/// Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct RecordingPointer {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingPointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with the pointer resting at `(x, y)`.
    pub fn at(x: i32, y: i32) -> Self {
        let pointer = Self::default();
        pointer.inner.lock().position = (x, y);
        pointer
    }

    /// Every click after the first `n` fails.
    pub fn failing_after(n: usize) -> Self {
        let pointer = Self::default();
        pointer.inner.lock().fail_after = Some(n);
        pointer
    }

    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.inner.lock().clicks.clone()
    }

    pub fn click_count(&self) -> usize {
        self.inner.lock().clicks.len()
    }
}

impl Pointer for RecordingPointer {
    fn location(&mut self) -> Result<(i32, i32), PointerError> {
        Ok(self.inner.lock().position)
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<(), PointerError> {
        self.inner.lock().position = (x, y);
        Ok(())
    }

    fn click(&mut self) -> Result<(), PointerError> {
        let mut rec = self.inner.lock();
        if rec.fail_after.is_some_and(|n| rec.clicks.len() >= n) {
            return Err(PointerError::Click("simulated failure".into()));
        }
        let at = rec.position;
        rec.clicks.push(at);
        tracing::debug!("(dry run) click at ({}, {})", at.0, at.1);
        Ok(())
    }
}

/// Whether `(x, y)` lies on any attached display. `None` when the displays
/// cannot be enumerated.
pub fn on_any_display(x: i32, y: i32) -> Option<bool> {
    match DisplayInfo::all() {
        Ok(displays) => Some(displays.iter().any(|d| contains(d, x, y))),
        Err(e) => {
            tracing::debug!("Cannot enumerate displays: {}", e);
            None
        }
    }
}

fn contains(d: &DisplayInfo, x: i32, y: i32) -> bool {
    let (dx, dy) = (i64::from(x) - i64::from(d.x), i64::from(y) - i64::from(d.y));
    dx >= 0 && dy >= 0 && dx < i64::from(d.width) && dy < i64::from(d.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_pointer_tracks_clicks() {
        let mut pointer = RecordingPointer::at(5, 5);
        assert_eq!(pointer.location().unwrap(), (5, 5));
        pointer.click_at(10, 20).unwrap();
        pointer.click_at(30, 40).unwrap();
        assert_eq!(pointer.location().unwrap(), (30, 40));
        assert_eq!(pointer.clicks(), vec![(10, 20), (30, 40)]);
    }

    #[test]
    fn test_clones_share_record() {
        let pointer = RecordingPointer::new();
        let mut clone = pointer.clone();
        clone.click_at(1, 1).unwrap();
        assert_eq!(pointer.click_count(), 1);
    }

    #[test]
    fn test_failing_after() {
        let mut pointer = RecordingPointer::failing_after(1);
        pointer.click_at(1, 1).unwrap();
        assert!(matches!(pointer.click_at(2, 2), Err(PointerError::Click(_))));
        assert_eq!(pointer.click_count(), 1);
    }
}
