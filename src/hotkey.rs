//! Global start/stop hotkeys.
//!
//! A [`HotkeyBackend`] delivers [`HotkeyCommand`]s to a callback no matter which
//! window has focus. With the `hooks` feature the backend is built on
//! `rdev::listen`; without it registration reports [`PlatformError::Unsupported`].

use crate::error::PlatformError;
use std::{fmt, time::Duration};

/// How often the dispatcher wakes to check its stop flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound on waiting for the dispatcher to exit.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HotkeyCommand {
    Start,
    Stop,
}

/// Modifiers plus one letter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Combo {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    /// Uppercase ASCII letter.
    pub letter: char,
}

impl Combo {
    pub const fn ctrl_alt(letter: char) -> Self {
        Self { ctrl: true, alt: true, shift: false, letter }
    }
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        write!(f, "{}", self.letter)
    }
}

pub const START_COMBO: Combo = Combo::ctrl_alt('S');
pub const STOP_COMBO: Combo = Combo::ctrl_alt('Q');

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub combo: Combo,
    pub command: HotkeyCommand,
}

pub fn default_bindings() -> Vec<HotkeyBinding> {
    vec![
        HotkeyBinding { combo: START_COMBO, command: HotkeyCommand::Start },
        HotkeyBinding { combo: STOP_COMBO, command: HotkeyCommand::Stop },
    ]
}

/// Which of a modifier's two keys. AltGr counts as the right Alt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Backend-neutral key identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyId {
    Ctrl(Side),
    Alt(Side),
    Shift(Side),
    Letter(char),
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyInput {
    Press(KeyId),
    Release(KeyId),
}

/// A modifier is held while either of its keys is down.
#[derive(Clone, Copy, Debug, Default)]
struct ModifierState {
    left: bool,
    right: bool,
}

impl ModifierState {
    fn set(&mut self, side: Side, down: bool) {
        match side {
            Side::Left => self.left = down,
            Side::Right => self.right = down,
        }
    }

    fn held(self) -> bool {
        self.left || self.right
    }
}

/// Turns a stream of key presses and releases into hotkey commands.
#[derive(Debug)]
pub struct ComboMatcher {
    bindings: Vec<HotkeyBinding>,
    ctrl: ModifierState,
    alt: ModifierState,
    shift: ModifierState,
    latched: Option<char>,
}

impl ComboMatcher {
    pub fn new(bindings: Vec<HotkeyBinding>) -> Self {
        Self {
            bindings,
            ctrl: ModifierState::default(),
            alt: ModifierState::default(),
            shift: ModifierState::default(),
            latched: None,
        }
    }

    pub fn handle(&mut self, input: KeyInput) -> Option<HotkeyCommand> {
        let (key, down) = match input {
            KeyInput::Press(key) => (key, true),
            KeyInput::Release(key) => (key, false),
        };
        match key {
            KeyId::Ctrl(side) => self.ctrl.set(side, down),
            KeyId::Alt(side) => self.alt.set(side, down),
            KeyId::Shift(side) => self.shift.set(side, down),
            KeyId::Letter(c) if !down => {
                if self.latched == Some(c) {
                    self.latched = None;
                }
            }
            KeyId::Letter(c) => {
                // Auto-repeat sends more presses while the key is held.
                if self.latched == Some(c) {
                    return None;
                }
                let (ctrl, alt, shift) = (self.ctrl.held(), self.alt.held(), self.shift.held());
                let hit = self
                    .bindings
                    .iter()
                    .find(|b| {
                        b.combo.letter == c
                            && b.combo.ctrl == ctrl
                            && b.combo.alt == alt
                            && b.combo.shift == shift
                    })
                    .copied()?;
                self.latched = Some(c);
                tracing::debug!("Hotkey {} -> {:?}", hit.combo, hit.command);
                return Some(hit.command);
            }
            KeyId::Other => {}
        }
        None
    }
}

pub type HotkeyCallback = Box<dyn Fn(HotkeyCommand) + Send + 'static>;

pub trait HotkeyBackend: Send {
    fn register(
        &mut self,
        bindings: &[HotkeyBinding],
        callback: HotkeyCallback,
    ) -> Result<(), PlatformError>;

    /// Stops delivering commands. Waits at most [`JOIN_TIMEOUT`].
    fn unregister(&mut self);
}

/// The backend for this build.
pub fn platform_backend() -> Box<dyn HotkeyBackend> {
    #[cfg(feature = "hooks")]
    {
        Box::new(rdev_backend::RdevBackend::new())
    }
    #[cfg(not(feature = "hooks"))]
    {
        Box::new(DisabledBackend)
    }
}

/// Registers the default bindings, logging instead of failing.
pub fn register_defaults(backend: &mut dyn HotkeyBackend, callback: HotkeyCallback) -> bool {
    match backend.register(&default_bindings(), callback) {
        Ok(()) => {
            tracing::info!("Hotkeys: {} start, {} stop", START_COMBO, STOP_COMBO);
            true
        }
        Err(e) => {
            tracing::warn!("{}; continuing without global hotkeys", e);
            false
        }
    }
}

#[derive(Debug, Default)]
pub struct DisabledBackend;

impl HotkeyBackend for DisabledBackend {
    fn register(&mut self, _: &[HotkeyBinding], _: HotkeyCallback) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn unregister(&mut self) {}
}

#[cfg(feature = "hooks")]
pub mod rdev_backend {
    use super::*;
    use rdev::{EventType, Key};
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            mpsc::{self, RecvTimeoutError},
            Arc,
        },
        thread,
    };

    /// How long registration waits for `rdev::listen` to fail fast.
    const LISTEN_GRACE: Duration = Duration::from_millis(200);

    /// `rdev::listen` feeds a channel; a dispatcher thread drains it with a
    /// bounded poll and runs the matcher. rdev offers no way to end `listen`, so
    /// that thread stays detached and just drops events once unregistered.
    #[derive(Default)]
    pub struct RdevBackend {
        running: Arc<AtomicBool>,
        dispatcher: Option<thread::JoinHandle<()>>,
        dispatcher_done: Option<mpsc::Receiver<()>>,
    }

    impl RdevBackend {
        pub fn new() -> Self {
            Self::default()
        }
    }

    pub fn key_input(event: &EventType) -> Option<KeyInput> {
        match *event {
            EventType::KeyPress(k) => Some(KeyInput::Press(key_id(k))),
            EventType::KeyRelease(k) => Some(KeyInput::Release(key_id(k))),
            _ => None,
        }
    }

    fn key_id(key: Key) -> KeyId {
        match key {
            Key::ControlLeft => KeyId::Ctrl(Side::Left),
            Key::ControlRight => KeyId::Ctrl(Side::Right),
            Key::Alt => KeyId::Alt(Side::Left),
            Key::AltGr => KeyId::Alt(Side::Right),
            Key::ShiftLeft => KeyId::Shift(Side::Left),
            Key::ShiftRight => KeyId::Shift(Side::Right),
            other => letter(other).map_or(KeyId::Other, KeyId::Letter),
        }
    }

    fn letter(key: Key) -> Option<char> {
        Some(match key {
            Key::KeyA => 'A',
            Key::KeyB => 'B',
            Key::KeyC => 'C',
            Key::KeyD => 'D',
            Key::KeyE => 'E',
            Key::KeyF => 'F',
            Key::KeyG => 'G',
            Key::KeyH => 'H',
            Key::KeyI => 'I',
            Key::KeyJ => 'J',
            Key::KeyK => 'K',
            Key::KeyL => 'L',
            Key::KeyM => 'M',
            Key::KeyN => 'N',
            Key::KeyO => 'O',
            Key::KeyP => 'P',
            Key::KeyQ => 'Q',
            Key::KeyR => 'R',
            Key::KeyS => 'S',
            Key::KeyT => 'T',
            Key::KeyU => 'U',
            Key::KeyV => 'V',
            Key::KeyW => 'W',
            Key::KeyX => 'X',
            Key::KeyY => 'Y',
            Key::KeyZ => 'Z',
            _ => return None,
        })
    }

    impl HotkeyBackend for RdevBackend {
        fn register(
            &mut self,
            bindings: &[HotkeyBinding],
            callback: HotkeyCallback,
        ) -> Result<(), PlatformError> {
            self.unregister();

            let running = Arc::new(AtomicBool::new(true));
            self.running = Arc::clone(&running);
            let (raw_tx, raw_rx) = mpsc::channel::<KeyInput>();
            let (done_tx, done_rx) = mpsc::channel();

            let dispatch_running = Arc::clone(&running);
            let mut matcher = ComboMatcher::new(bindings.to_vec());
            let dispatcher = thread::Builder::new()
                .name("hotkey-dispatch".into())
                .spawn(move || {
                    while dispatch_running.load(Ordering::SeqCst) {
                        match raw_rx.recv_timeout(POLL_INTERVAL) {
                            Ok(input) => {
                                if let Some(cmd) = matcher.handle(input) {
                                    callback(cmd);
                                }
                            }
                            Err(RecvTimeoutError::Timeout) => {}
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    let _ = done_tx.send(());
                })
                .map_err(PlatformError::DispatcherStart)?;
            self.dispatcher = Some(dispatcher);
            self.dispatcher_done = Some(done_rx);

            let (err_tx, err_rx) = mpsc::channel();
            let listen_running = Arc::clone(&running);
            let spawned = thread::Builder::new().name("hotkey-listen".into()).spawn(move || {
                let result = rdev::listen(move |event| {
                    if !listen_running.load(Ordering::SeqCst) {
                        return;
                    }
                    if let Some(input) = key_input(&event.event_type) {
                        let _ = raw_tx.send(input);
                    }
                });
                if let Err(e) = result {
                    let _ = err_tx.send(format!("{:?}", e));
                }
            });
            if let Err(e) = spawned {
                self.unregister();
                return Err(PlatformError::DispatcherStart(e));
            }

            if let Ok(reason) = err_rx.recv_timeout(LISTEN_GRACE) {
                self.unregister();
                return Err(PlatformError::ListenFailed(reason));
            }
            Ok(())
        }

        fn unregister(&mut self) {
            self.running.store(false, Ordering::SeqCst);
            let Some(handle) = self.dispatcher.take() else { return };
            let exited = self
                .dispatcher_done
                .take()
                .is_some_and(|done| done.recv_timeout(JOIN_TIMEOUT).is_ok());
            if exited {
                let _ = handle.join();
                tracing::debug!("Hotkey dispatcher stopped");
            } else {
                tracing::warn!("Hotkey dispatcher did not stop within {:?}", JOIN_TIMEOUT);
            }
        }
    }

    impl Drop for RdevBackend {
        fn drop(&mut self) {
            self.unregister();
        }
    }

}
