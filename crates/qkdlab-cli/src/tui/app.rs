//! TUI application state and event loop.
//!
//! Design: the dashboard never talks to the engine itself. Every key that
//! changes the run (start, stop, quit) is forwarded to the
//! [`SessionController`], which owns the polling timer and the charts. The
//! draw loop only reads an owned [`SessionView`] copy each frame, so it never
//! blocks on the network.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use tokio::runtime::Runtime;

use qkdlab_core::controller::CHART_SURFACES;
use qkdlab_core::notify::Notification;
use qkdlab_core::{Level, NotificationBoard, Notifier, RunConfig, SessionController, SessionView};

/// Frame budget for one draw + input poll.
const FRAME: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// ViewMode
// ---------------------------------------------------------------------------

/// What the main panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Metric panel and the live chart set.
    #[default]
    Charts,
    /// Per-qubit strip of the latest batch. Chart surfaces are torn down.
    Qubits,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Charts => Self::Qubits,
            Self::Qubits => Self::Charts,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Charts => "charts",
            Self::Qubits => "qubits",
        }
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    controller: SessionController,
    board: Arc<NotificationBoard>,
    rt: Runtime,
    run_config: RunConfig,
    running: bool,
    view_mode: ViewMode,
    export_dir: PathBuf,
    last_export: Option<PathBuf>,
}

impl App {
    pub fn new(
        controller: SessionController,
        board: Arc<NotificationBoard>,
        rt: Runtime,
        run_config: RunConfig,
    ) -> Self {
        Self {
            controller,
            board,
            rt,
            run_config,
            running: true,
            view_mode: ViewMode::default(),
            export_dir: PathBuf::from("."),
            last_export: None,
        }
    }

    /// Directory `e` writes view snapshots to.
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Restore the terminal before a panic message is printed.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        // Leaving the dashboard always ends the run.
        self.rt.block_on(self.controller.stop());

        if let Some(path) = &self.last_export {
            println!("Last view snapshot: {}", path.display());
        }
        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while self.running {
            terminal.draw(|f| super::ui::draw(f, self))?;

            if event::poll(FRAME)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('s') => self.start(),
            KeyCode::Char('x') => self.stop(),
            KeyCode::Char('v') => self.toggle_view(),
            KeyCode::Char('e') => match self.export_snapshot() {
                Ok(path) => {
                    self.board
                        .notify(Level::Success, &format!("Exported {}", path.display()));
                    self.last_export = Some(path);
                }
                Err(e) => self
                    .board
                    .notify(Level::Error, &format!("Export failed: {e}")),
            },
            _ => {}
        }
    }

    fn start(&self) {
        let controller = self.controller.clone();
        let config = self.run_config.clone();
        self.rt.spawn(async move {
            controller.start(config).await;
        });
    }

    fn stop(&self) {
        let controller = self.controller.clone();
        self.rt.spawn(async move {
            controller.stop().await;
        });
    }

    /// Switch panels. Leaving the chart view unmounts every chart surface;
    /// coming back remounts them and the next snapshot rebuilds the charts.
    fn toggle_view(&mut self) {
        self.view_mode = self.view_mode.toggled();
        let mount = self.view_mode == ViewMode::Charts;
        self.controller.with_surfaces(|surfaces| {
            for surface in CHART_SURFACES {
                if mount {
                    surfaces.mount(surface);
                } else {
                    surfaces.unmount(surface);
                }
            }
        });
    }

    /// Write the current view as pretty JSON and return its path.
    pub fn export_snapshot(&self) -> io::Result<PathBuf> {
        let epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        let path = self.export_dir.join(format!(
            "qkdlab-view-{}-{:03}.json",
            epoch.as_secs(),
            epoch.subsec_millis()
        ));
        let json = serde_json::json!({
            "engine": self.controller.config().engine_url,
            "run_config": self.run_config,
            "view_mode": self.view_mode.label(),
            "session": self.controller.view(),
        });
        let contents = serde_json::to_string_pretty(&json).map_err(io::Error::other)?;
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    // --- Accessors for the renderer ---

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn view(&self) -> SessionView {
        self.controller.view()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    pub fn engine_url(&self) -> &str {
        &self.controller.config().engine_url
    }

    pub fn notification(&self) -> Option<Notification> {
        self.board.latest()
    }

    pub fn last_export(&self) -> Option<&Path> {
        self.last_export.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qkdlab_core::controller::QBER_CHART;
    use qkdlab_core::{ClientConfig, HttpTransport, SessionPhase};

    fn app() -> App {
        // Nothing in these tests reaches the engine.
        let config = ClientConfig::default()
            .with_engine_url("http://127.0.0.1:1")
            .unwrap();
        let board = Arc::new(NotificationBoard::default());
        let transport = Arc::new(HttpTransport::new(config.clone()).unwrap());
        let controller = SessionController::new(transport, board.clone(), config);
        App::new(controller, board, Runtime::new().unwrap(), RunConfig::default())
    }

    #[test]
    fn view_mode_toggles_back_and_forth() {
        assert_eq!(ViewMode::default(), ViewMode::Charts);
        assert_eq!(ViewMode::Charts.toggled(), ViewMode::Qubits);
        assert_eq!(ViewMode::Qubits.toggled(), ViewMode::Charts);
        assert_eq!(ViewMode::Qubits.label(), "qubits");
    }

    #[test]
    fn v_unmounts_and_remounts_chart_surfaces() {
        let mut app = app();
        let mounted = |app: &App| {
            app.controller
                .with_surfaces(|s| CHART_SURFACES.iter().all(|name| s.is_mounted(name)))
        };
        assert!(mounted(&app));

        app.handle_key(KeyCode::Char('v'));
        assert_eq!(app.view_mode(), ViewMode::Qubits);
        assert!(
            !app.controller
                .with_surfaces(|s| s.is_mounted(QBER_CHART))
        );

        app.handle_key(KeyCode::Char('v'));
        assert_eq!(app.view_mode(), ViewMode::Charts);
        assert!(mounted(&app));
    }

    #[test]
    fn q_and_esc_quit() {
        let mut app = app();
        app.handle_key(KeyCode::Char('q'));
        assert!(!app.is_running());

        let mut app = self::app();
        app.handle_key(KeyCode::Esc);
        assert!(!app.is_running());
    }

    #[test]
    fn e_exports_the_view_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app().with_export_dir(dir.path());
        app.handle_key(KeyCode::Char('e'));

        let path = app.last_export().unwrap().to_path_buf();
        assert!(path.starts_with(dir.path()));
        let contents = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["engine"], "http://127.0.0.1:1");
        assert_eq!(json["view_mode"], "charts");
        assert_eq!(json["session"]["phase"], "idle");
        assert_eq!(json["run_config"]["photon_rate"], 1000.0);
        assert!(
            app.notification()
                .is_some_and(|n| n.message.starts_with("Exported"))
        );
    }

    #[test]
    fn export_into_missing_dir_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app().with_export_dir(dir.path().join("missing"));
        app.handle_key(KeyCode::Char('e'));
        assert!(app.last_export().is_none());
        let note = app.notification().unwrap();
        assert_eq!(note.level, Level::Error);
    }

    #[test]
    fn x_on_idle_stays_idle() {
        let mut app = app();
        app.handle_key(KeyCode::Char('x'));
        app.rt.block_on(async {
            tokio::task::yield_now().await;
        });
        assert_eq!(app.view().phase, SessionPhase::Idle);
    }
}
