pub mod action;
pub mod capture;
pub mod cli;
pub mod error;
pub mod gui;
pub mod headless;
pub mod hotkey;
pub mod playback;
pub mod pointer;
pub mod presentation;
pub mod profile;

pub use action::{ActionList, ClickAction};
pub use error::{ClickerError, ParseError, PlatformError, PointerError, Result};
pub use playback::{PlaybackEngine, PlaybackEvent, PlaybackSession, RepeatPolicy};
