//! Position capture: get the window out of the way, give the user time to move
//! the pointer onto the target, then sample it.

use crate::{error::PointerError, pointer::Pointer, presentation::Presentation};
use std::{
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Blocks for `settle`. The surface is restored even when sampling fails.
pub fn capture_once<P: Pointer + ?Sized>(
    presentation: &dyn Presentation,
    pointer: &mut P,
    settle: Duration,
) -> Result<(i32, i32), PointerError> {
    presentation.hide();
    thread::sleep(settle);
    let sampled = pointer.location();
    presentation.show();
    if let Ok((x, y)) = sampled {
        tracing::info!("Selected position ({}, {})", x, y);
    }
    sampled
}

/// Runs [`capture_once`] on its own thread so the UI event loop keeps turning
/// during the settle delay.
pub fn spawn_capture<P: Pointer>(
    presentation: Arc<dyn Presentation>,
    mut pointer: P,
    settle: Duration,
) -> mpsc::Receiver<Result<(i32, i32), PointerError>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = capture_once(presentation.as_ref(), &mut pointer, settle);
        let _ = tx.send(result);
        presentation.refresh();
    });
    rx
}
