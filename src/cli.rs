use crate::{playback::RepeatPolicy, presentation::Theme};
use clap::{ArgAction, Parser, Subcommand};
use std::{
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
};

#[derive(Parser, Debug)]
#[command(name = "tiny-clicker", version, about = "Replays saved mouse click sequences")]
pub struct Cli {
    /// Profile to load at startup
    #[arg(long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Initial color theme
    #[arg(long, value_enum, default_value_t = Theme::Light)]
    pub theme: Theme,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a profile without opening the window
    Play {
        /// Profile file (.tiny)
        profile: PathBuf,

        /// Number of passes over the profile
        #[arg(long, conflicts_with = "seconds")]
        count: Option<NonZeroU32>,

        /// Keep repeating passes until this many seconds have elapsed
        #[arg(long)]
        seconds: Option<NonZeroU64>,

        /// Randomize each delay by up to 100ms
        #[arg(long)]
        jitter: bool,

        /// Log clicks instead of moving the mouse
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the pointer position after a short delay
    Capture {
        #[arg(long, default_value_t = 2000)]
        settle_ms: u64,
    },
}

/// Neither limit means repeat until stopped.
pub fn repeat_policy(count: Option<NonZeroU32>, seconds: Option<NonZeroU64>) -> RepeatPolicy {
    match (count, seconds) {
        (Some(n), _) => RepeatPolicy::ByCount(n),
        (None, Some(s)) => RepeatPolicy::ByDuration(s),
        (None, None) => RepeatPolicy::Unbounded,
    }
}

pub fn log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
