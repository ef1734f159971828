use crate::{
    action::{parse_delay, ActionList},
    capture::{spawn_capture, SETTLE_DELAY},
    error::PointerError,
    hotkey::{self, HotkeyBackend, HotkeyCallback, HotkeyCommand},
    playback::{
        ExitReason, PlaybackEngine, PlaybackEvent, PlaybackSummary, RepeatMode, RepeatPolicy,
        StartOutcome, StopHandle, SHUTDOWN_TIMEOUT,
    },
    pointer::{self, EnigoPointer, Pointer},
    presentation::{EguiPresentation, Theme, HELP_TEXT},
    profile::{self, PROFILE_EXTENSION},
};
use egui::{self, Color32};
use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
};

type CaptureResult = Result<(i32, i32), PointerError>;

pub fn run(profile: Option<PathBuf>, theme: Theme) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([600.0, 520.0])
            .with_min_inner_size([480.0, 420.0]),
        ..Default::default()
    };
    eframe::run_native(
        "TinyClicker",
        options,
        Box::new(move |cc| {
            let mut app = TinyClickerApp::new(
                cc.egui_ctx.clone(),
                EnigoPointer,
                hotkey::platform_backend(),
                theme,
            );
            if let Some(path) = profile {
                app.load_profile(&path);
            }
            Box::new(app)
        }),
    )
}

/// Stop acts straight from the hotkey thread, since a minimized window may get
/// no frames. Start needs the form inputs, so it waits for the next frame.
fn hotkey_callback(
    stopper: StopHandle,
    commands: mpsc::Sender<HotkeyCommand>,
    repaint: egui::Context,
) -> HotkeyCallback {
    Box::new(move |cmd| {
        match cmd {
            HotkeyCommand::Stop => stopper.stop(),
            HotkeyCommand::Start => {
                let _ = commands.send(cmd);
            }
        }
        repaint.request_repaint();
    })
}

pub struct TinyClickerApp<P: Pointer + Clone = EnigoPointer> {
    actions: ActionList,
    coords_input: String,
    delay_input: String,
    jitter: bool,
    repeat_mode: RepeatMode,
    repeat_count_input: String,
    repeat_seconds_input: String,
    theme: Theme,
    show_help: bool,

    pointer: P,
    presentation: Arc<EguiPresentation>,
    engine: PlaybackEngine<P>,
    events: mpsc::Receiver<PlaybackEvent>,
    hotkeys: Box<dyn HotkeyBackend>,
    hotkey_commands: mpsc::Receiver<HotkeyCommand>,
    capture: Option<mpsc::Receiver<CaptureResult>>,

    completed_cycles: u64,
    last_summary: Option<PlaybackSummary>,
    notice: Option<String>,
    error: Option<String>,
    shut_down: bool,
}

impl<P: Pointer + Clone> TinyClickerApp<P> {
    pub fn new(
        ctx: egui::Context,
        pointer: P,
        mut hotkeys: Box<dyn HotkeyBackend>,
        theme: Theme,
    ) -> Self {
        let presentation = Arc::new(EguiPresentation::new(ctx.clone()));
        let (engine, events) = PlaybackEngine::new(pointer.clone(), presentation.clone());

        let (cmd_tx, hotkey_commands) = mpsc::channel();
        hotkey::register_defaults(
            hotkeys.as_mut(),
            hotkey_callback(engine.stop_handle(), cmd_tx, ctx.clone()),
        );
        theme.apply(&ctx);

        Self {
            actions: ActionList::new(),
            coords_input: String::new(),
            delay_input: String::new(),
            jitter: false,
            repeat_mode: RepeatMode::default(),
            repeat_count_input: String::new(),
            repeat_seconds_input: String::new(),
            theme,
            show_help: false,
            pointer,
            presentation,
            engine,
            events,
            hotkeys,
            hotkey_commands,
            capture: None,
            completed_cycles: 0,
            last_summary: None,
            notice: None,
            error: None,
            shut_down: false,
        }
    }

    fn add_click(&mut self) {
        let delay = parse_delay(&self.delay_input);
        match self.actions.add(&self.coords_input, delay) {
            Ok(action) => {
                self.error = None;
                self.notice = match pointer::on_any_display(action.x, action.y) {
                    Some(false) => Some(format!("({}, {}) is outside every display", action.x, action.y)),
                    _ => None,
                };
            }
            Err(e) => {
                tracing::warn!("Invalid coordinates input: {}", e);
                self.error = Some(e.to_string());
            }
        }
    }

    fn select_position(&mut self) {
        if self.capture.is_some() {
            return;
        }
        // Capture would restore the window in the middle of a run.
        if self.engine.is_running() {
            self.notice = Some("Stop clicking before selecting a position".into());
            return;
        }
        self.notice = Some("Move the pointer to the target...".into());
        self.capture = Some(spawn_capture(self.presentation.clone(), self.pointer.clone(), SETTLE_DELAY));
    }

    fn poll_capture(&mut self) {
        let Some(rx) = &self.capture else { return };
        let Ok(result) = rx.try_recv() else { return };
        self.capture = None;
        self.notice = None;
        match result {
            Ok((x, y)) => self.coords_input = format!("{}, {}", x, y),
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    pub fn load_profile(&mut self, path: &Path) {
        match profile::load(path) {
            Ok(actions) => {
                self.actions.replace_all(actions);
                self.error = None;
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.error = Some(e.to_string());
            }
        }
    }

    pub fn save_profile(&mut self, path: &Path) {
        match profile::save(path, self.actions.as_slice()) {
            Ok(()) => self.error = None,
            Err(e) => {
                tracing::error!("{}", e);
                self.error = Some(e.to_string());
            }
        }
    }

    fn start_clicking(&mut self) {
        if self.engine.is_running() {
            return;
        }
        let policy = match RepeatPolicy::from_inputs(
            self.repeat_mode,
            &self.repeat_count_input,
            &self.repeat_seconds_input,
        ) {
            Ok(policy) => policy,
            Err(e) => {
                self.error = Some(e.to_string());
                return;
            }
        };
        match self.engine.start(self.actions.snapshot(), policy, self.jitter) {
            StartOutcome::Started => {
                self.error = None;
                self.completed_cycles = 0;
                self.last_summary = None;
            }
            StartOutcome::AlreadyRunning => {}
            StartOutcome::StillStopping => {
                self.notice = Some("Previous run is still stopping, try again".into());
            }
        }
    }

    fn stop_clicking(&mut self) {
        self.engine.stop();
    }

    fn handle_background(&mut self) {
        while let Ok(cmd) = self.hotkey_commands.try_recv() {
            match cmd {
                HotkeyCommand::Start => self.start_clicking(),
                HotkeyCommand::Stop => self.stop_clicking(),
            }
        }
        while let Ok(event) = self.events.try_recv() {
            match event {
                PlaybackEvent::CycleCompleted(n) => self.completed_cycles = n,
                PlaybackEvent::Finished(summary) => {
                    if let ExitReason::Failed(reason) = &summary.reason {
                        self.error = Some(format!("Clicking aborted: {}", reason));
                    }
                    self.last_summary = Some(summary);
                }
                PlaybackEvent::Clicked { .. } => {}
            }
        }
        self.poll_capture();
    }

    fn status_line(&self) -> String {
        if self.engine.is_running() {
            return format!("Status: Running ({} cycles completed)", self.completed_cycles);
        }
        match &self.last_summary {
            Some(s) => format!("Status: Idle (last run: {} cycles, {} clicks)", s.cycles, s.clicks),
            None => "Status: Idle".to_string(),
        }
    }

    /// Stop playback, wait for the worker, release the hotkeys.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.engine.shutdown(SHUTDOWN_TIMEOUT);
        self.hotkeys.unregister();
        tracing::info!("Exiting TinyClicker...");
    }

    fn profile_dialog() -> rfd::FileDialog {
        rfd::FileDialog::new().add_filter("TinyClicker Files", &[PROFILE_EXTENSION])
    }

    fn draw(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(self.status_line());
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label("Click Coordinates (x, y):");
            ui.text_edit_singleline(&mut self.coords_input);
            ui.label("Delay between clicks (ms):");
            ui.text_edit_singleline(&mut self.delay_input);
            ui.checkbox(&mut self.jitter, "Randomize delay slightly");

            ui.horizontal(|ui| {
                if ui.button("Add Click").clicked() {
                    self.add_click();
                }
                let can_capture = self.capture.is_none() && !self.engine.is_running();
                if ui.add_enabled(can_capture, egui::Button::new("Select Position")).clicked() {
                    self.select_position();
                }
                if ui.button("Clear").clicked() {
                    self.actions.clear();
                }
            });

            egui::ScrollArea::vertical().max_height(160.0).show(ui, |ui| {
                for action in self.actions.iter() {
                    ui.monospace(action.to_string());
                }
            });

            ui.horizontal(|ui| {
                if ui.button("Save Profile").clicked() {
                    if let Some(path) = Self::profile_dialog().save_file() {
                        self.save_profile(&profile::with_default_extension(path));
                    }
                }
                if ui.button("Load Profile").clicked() {
                    if let Some(path) = Self::profile_dialog().pick_file() {
                        self.load_profile(&path);
                    }
                }
            });

            ui.separator();
            ui.horizontal(|ui| {
                ui.radio_value(&mut self.repeat_mode, RepeatMode::Count, "Repeat by number");
                ui.add_enabled(
                    self.repeat_mode == RepeatMode::Count,
                    egui::TextEdit::singleline(&mut self.repeat_count_input).desired_width(60.0),
                );
                ui.radio_value(&mut self.repeat_mode, RepeatMode::Duration, "Repeat for time (seconds)");
                ui.add_enabled(
                    self.repeat_mode == RepeatMode::Duration,
                    egui::TextEdit::singleline(&mut self.repeat_seconds_input).desired_width(60.0),
                );
                ui.radio_value(&mut self.repeat_mode, RepeatMode::Unbounded, "Until stopped");
            });

            let before = self.theme;
            egui::ComboBox::from_label("Theme")
                .selected_text(self.theme.label())
                .show_ui(ui, |ui| {
                    for theme in Theme::ALL {
                        ui.selectable_value(&mut self.theme, theme, theme.label());
                    }
                });
            if self.theme != before {
                self.theme.apply(ctx);
            }

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Start Clicking").clicked() {
                    self.start_clicking();
                }
                if ui.button("Stop Clicking").clicked() {
                    self.stop_clicking();
                }
                if ui.button("Help").clicked() {
                    self.show_help = true;
                }
            });

            if let Some(err) = &self.error {
                ui.colored_label(Color32::RED, err);
            }
            if let Some(notice) = &self.notice {
                ui.label(notice);
            }
        });

        egui::Window::new("Help")
            .open(&mut self.show_help)
            .resizable(true)
            .show(ctx, |ui| {
                ui.monospace(HELP_TEXT);
            });
    }
}

impl<P: Pointer + Clone> eframe::App for TinyClickerApp<P> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_background();
        if ctx.input(|i| i.viewport().close_requested()) {
            self.shutdown();
        }
        self.draw(ctx);
        if self.engine.is_running() || self.capture.is_some() {
            ctx.request_repaint_after(std::time::Duration::from_millis(250));
        }
    }
}

impl<P: Pointer + Clone> Drop for TinyClickerApp<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{action::ClickAction, hotkey::DisabledBackend, pointer::RecordingPointer};
    use std::time::{Duration, Instant};

    fn app(pointer: &RecordingPointer) -> TinyClickerApp<RecordingPointer> {
        TinyClickerApp::new(
            egui::Context::default(),
            pointer.clone(),
            Box::new(DisabledBackend),
            Theme::Light,
        )
    }

    fn pump_until(app: &mut TinyClickerApp<RecordingPointer>, done: impl Fn(&TinyClickerApp<RecordingPointer>) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(app) {
            assert!(Instant::now() < deadline, "timed out");
            app.handle_background();
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_app_defaults() {
        let app = app(&RecordingPointer::new());
        assert!(app.actions.is_empty());
        assert!(!app.jitter);
        assert_eq!(app.repeat_mode, RepeatMode::Unbounded);
        assert_eq!(app.status_line(), "Status: Idle");
    }

    #[test]
    fn test_add_click_uses_delay_fallback() {
        let mut app = app(&RecordingPointer::new());
        app.coords_input = "15, 25".into();
        app.delay_input = "fast".into();
        app.add_click();
        assert_eq!(app.actions.as_slice(), &[ClickAction::new(15, 25, 1000)]);
        assert!(app.error.is_none());
    }

    #[test]
    fn test_bad_coordinates_reported_inline() {
        let mut app = app(&RecordingPointer::new());
        app.coords_input = "15".into();
        app.add_click();
        assert!(app.actions.is_empty());
        assert!(app.error.is_some());
    }

    #[test]
    fn test_invalid_repeat_count_refuses_start() {
        let mut app = app(&RecordingPointer::new());
        app.repeat_mode = RepeatMode::Count;
        app.repeat_count_input = "none".into();
        app.start_clicking();
        assert!(!app.engine.is_running());
        assert!(app.error.as_deref().unwrap_or_default().contains("Repeat count"));
    }

    #[test]
    fn test_hotkey_commands_drive_engine() {
        let pointer = RecordingPointer::new();
        let mut app = app(&pointer);
        app.actions.replace_all(vec![ClickAction::new(1, 1, 20)]);
        let (tx, rx) = mpsc::channel();
        app.hotkey_commands = rx;

        tx.send(HotkeyCommand::Start).unwrap();
        app.handle_background();
        assert!(app.engine.is_running());

        tx.send(HotkeyCommand::Stop).unwrap();
        app.handle_background();
        assert!(!app.engine.is_running());
        pump_until(&mut app, |a| a.last_summary.is_some());
        assert_eq!(app.last_summary.as_ref().unwrap().reason, ExitReason::Stopped);
    }

    #[test]
    fn test_stop_hotkey_acts_without_a_frame() {
        let pointer = RecordingPointer::new();
        let mut app = app(&pointer);
        app.actions.replace_all(vec![ClickAction::new(1, 1, 20)]);
        app.start_clicking();
        assert!(app.engine.is_running());

        let (tx, rx) = mpsc::channel();
        let callback = hotkey_callback(app.engine.stop_handle(), tx, egui::Context::default());
        std::thread::spawn(move || callback(HotkeyCommand::Stop)).join().unwrap();
        assert!(!app.engine.is_running());
        assert!(rx.try_recv().is_err());

        let clicks = pointer.click_count();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(pointer.click_count(), clicks);
    }

    #[test]
    fn test_start_hotkey_goes_through_frame() {
        let mut app = app(&RecordingPointer::new());
        let (tx, rx) = mpsc::channel();
        let callback = hotkey_callback(app.engine.stop_handle(), tx, egui::Context::default());
        callback(HotkeyCommand::Start);
        assert!(!app.engine.is_running());
        app.hotkey_commands = rx;
        app.handle_background();
        assert!(app.engine.is_running());
        app.stop_clicking();
    }

    #[test]
    fn test_select_position_refused_while_running() {
        let pointer = RecordingPointer::new();
        let mut app = app(&pointer);
        app.actions.replace_all(vec![ClickAction::new(1, 1, 20)]);
        app.start_clicking();
        app.select_position();
        assert!(app.capture.is_none());
        assert!(app.notice.is_some());
        assert!(app.engine.is_running());
        app.stop_clicking();
    }

    #[test]
    fn test_edits_during_run_do_not_affect_it() {
        let pointer = RecordingPointer::new();
        let mut app = app(&pointer);
        app.actions.replace_all(vec![ClickAction::new(5, 5, 10)]);
        app.repeat_mode = RepeatMode::Count;
        app.repeat_count_input = "3".into();
        app.start_clicking();
        app.actions.replace_all(vec![ClickAction::new(9, 9, 10), ClickAction::new(8, 8, 10)]);
        pump_until(&mut app, |a| a.last_summary.is_some());
        assert_eq!(pointer.clicks(), vec![(5, 5); 3]);
        assert_eq!(app.completed_cycles, 3);
    }

    #[test]
    fn test_failed_load_keeps_list() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.tiny");
        std::fs::write(&path, "[{\"x\": 1,").unwrap();
        let mut app = app(&RecordingPointer::new());
        app.actions.replace_all(vec![ClickAction::new(1, 2, 3)]);
        app.load_profile(&path);
        assert_eq!(app.actions.as_slice(), &[ClickAction::new(1, 2, 3)]);
        assert!(app.error.is_some());
    }

    #[test]
    fn test_save_and_load_through_app() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("routine.tiny");
        let mut app = app(&RecordingPointer::new());
        app.actions.replace_all(vec![ClickAction::new(1, 2, 3), ClickAction::new(4, 5, 6)]);
        app.save_profile(&path);
        app.actions.clear();
        app.load_profile(&path);
        assert_eq!(app.actions.len(), 2);
        assert!(app.error.is_none());
    }

    #[test]
    fn test_captured_position_fills_coordinates() {
        let pointer = RecordingPointer::at(321, 654);
        let mut app = app(&pointer);
        app.capture = Some(spawn_capture(app.presentation.clone(), pointer.clone(), Duration::from_millis(5)));
        pump_until(&mut app, |a| a.capture.is_none());
        assert_eq!(app.coords_input, "321, 654");
    }
}
