use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tiny_clicker::{
    capture,
    cli::{self, Cli, Command},
    gui, headless, hotkey,
    playback::ExitReason,
    pointer::{EnigoPointer, RecordingPointer},
    presentation::NoPresentation,
    profile,
};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = cli::log_level(cli.verbose, cli.quiet);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("tiny_clicker={},warn", level))),
        )
        .with_target(false)
        .init();

    match cli.command {
        None => gui::run(cli.profile, cli.theme).map_err(|e| anyhow::anyhow!("{e}")),
        Some(Command::Capture { settle_ms }) => {
            let (x, y) = capture::capture_once(
                &NoPresentation,
                &mut EnigoPointer,
                Duration::from_millis(settle_ms),
            )?;
            println!("{}, {}", x, y);
            Ok(())
        }
        Some(Command::Play { profile: path, count, seconds, jitter, dry_run }) => {
            let actions = profile::load(&path)
                .with_context(|| format!("Cannot play {}", path.display()))?;
            let policy = cli::repeat_policy(count, seconds);
            let mut hotkeys = hotkey::platform_backend();
            let summary = if dry_run {
                headless::play(RecordingPointer::new(), actions, policy, jitter, hotkeys.as_mut())
            } else {
                headless::play(EnigoPointer, actions, policy, jitter, hotkeys.as_mut())
            };
            println!("{} cycles, {} clicks ({:?})", summary.cycles, summary.clicks, summary.reason);
            if let ExitReason::Failed(reason) = summary.reason {
                anyhow::bail!("Clicking aborted: {reason}");
            }
            Ok(())
        }
    }
}
