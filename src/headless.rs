use crate::{
    action::ClickAction,
    hotkey::{self, HotkeyBackend, HotkeyCommand, POLL_INTERVAL},
    playback::{ExitReason, PlaybackEngine, PlaybackEvent, PlaybackSummary, RepeatPolicy, SHUTDOWN_TIMEOUT},
    pointer::Pointer,
    presentation::NoPresentation,
};
use std::sync::{mpsc::RecvTimeoutError, Arc};

/// Plays `actions` without a window until the policy is exhausted or the stop
/// hotkey is pressed.
pub fn play<P: Pointer + Clone>(
    pointer: P,
    actions: Vec<ClickAction>,
    policy: RepeatPolicy,
    jitter: bool,
    hotkeys: &mut dyn HotkeyBackend,
) -> PlaybackSummary {
    let (mut engine, events) = PlaybackEngine::new(pointer, Arc::new(NoPresentation));
    let stopper = engine.stop_handle();
    hotkey::register_defaults(
        hotkeys,
        Box::new(move |cmd| {
            if cmd == HotkeyCommand::Stop {
                stopper.stop();
            }
        }),
    );

    engine.start(Arc::from(actions), policy, jitter);
    let summary = loop {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(PlaybackEvent::Finished(summary)) => break summary,
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                break PlaybackSummary {
                    cycles: 0,
                    clicks: 0,
                    reason: ExitReason::Failed("playback event channel closed".into()),
                }
            }
        }
    };

    engine.shutdown(SHUTDOWN_TIMEOUT);
    hotkeys.unregister();
    summary
}
