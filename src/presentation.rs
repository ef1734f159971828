use egui::{self, Color32, Visuals};
use std::fmt;

/// Show/hide the main surface. Called from worker threads.
pub trait Presentation: Send + Sync {
    fn hide(&self);
    fn show(&self);
    /// Wake the surface so it can pick up new state.
    fn refresh(&self) {}
}

/// Headless runs have nothing to hide.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPresentation;

impl Presentation for NoPresentation {
    fn hide(&self) {}
    fn show(&self) {}
}

/// Minimizes and restores the eframe window.
#[derive(Clone)]
pub struct EguiPresentation {
    ctx: egui::Context,
}

impl EguiPresentation {
    pub fn new(ctx: egui::Context) -> Self {
        Self { ctx }
    }
}

impl Presentation for EguiPresentation {
    fn hide(&self) {
        self.ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(true));
        self.ctx.request_repaint();
    }

    fn show(&self) {
        self.ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(false));
        self.ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
        self.ctx.request_repaint();
    }

    fn refresh(&self) {
        self.ctx.request_repaint();
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Theme {
    #[default]
    Light,
    Dark,
    RetroTerminal,
    SolarizedDark,
    SolarizedLight,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::Light,
        Theme::Dark,
        Theme::RetroTerminal,
        Theme::SolarizedDark,
        Theme::SolarizedLight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Theme::Light => "Light",
            Theme::Dark => "Dark",
            Theme::RetroTerminal => "Retro Terminal",
            Theme::SolarizedDark => "Solarized Dark",
            Theme::SolarizedLight => "Solarized Light",
        }
    }

    /// (background, text)
    pub fn colors(self) -> (Color32, Color32) {
        match self {
            Theme::Light => (Color32::WHITE, Color32::BLACK),
            Theme::Dark => (Color32::BLACK, Color32::WHITE),
            Theme::RetroTerminal => (Color32::BLACK, Color32::from_rgb(0x00, 0xff, 0x00)),
            Theme::SolarizedDark => {
                (Color32::from_rgb(0x00, 0x2b, 0x36), Color32::from_rgb(0x83, 0x94, 0x96))
            }
            Theme::SolarizedLight => {
                (Color32::from_rgb(0xfd, 0xf6, 0xe3), Color32::from_rgb(0x65, 0x7b, 0x83))
            }
        }
    }

    pub fn is_dark(self) -> bool {
        matches!(self, Theme::Dark | Theme::RetroTerminal | Theme::SolarizedDark)
    }

    pub fn visuals(self) -> Visuals {
        let (bg, fg) = self.colors();
        let mut visuals = if self.is_dark() { Visuals::dark() } else { Visuals::light() };
        visuals.panel_fill = bg;
        visuals.window_fill = bg;
        visuals.extreme_bg_color = bg;
        visuals.override_text_color = Some(fg);
        visuals
    }

    pub fn apply(self, ctx: &egui::Context) {
        ctx.set_visuals(self.visuals());
        tracing::info!("Theme changed to {}", self.label());
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub const HELP_TEXT: &str = "\
Welcome to TinyClicker!

Features:
- Customize your click locations and delays.
- Save and load profiles for your click patterns.
- Choose between repeating by number of cycles or by time.
- Themes: Light, Dark, Retro Terminal and Solarized.
- Randomize delay slightly (up to 100ms either way).

Default Hotkeys:
- Ctrl+Alt+S: Start clicking
- Ctrl+Alt+Q: Stop clicking

To add a click action:
1. Enter the coordinates (x, y) and the delay after the click in milliseconds.
2. Press \"Add Click\", or \"Select Position\" to capture the pointer
   position 2 seconds later.
";
