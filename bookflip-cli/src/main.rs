use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use bookflip_core::{
    BookProject, Command, Config, FileProjectStore, JsonProjectProvider, Library, LoggingConfig,
    ProjectProvider, SlotContent, SlotSide, Viewer, ViewerEvent,
};
use bookflip_tty::{
    format_status, write_status_line, EventMapper, SpreadFrame, SpreadRenderer, UiEvent,
};
use clap::{Parser, Subcommand, ValueEnum};
use crossterm::cursor;
use crossterm::event::{
    self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const IDLE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(
    name = "bookflip",
    version,
    about = "Build picture books from templates and flip through them in the terminal"
)]
struct Args {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// List saved projects, most recently updated first
    List {
        /// Include demo projects
        #[arg(long)]
        all: bool,
    },
    /// Create a project with one empty spread
    New { title: String },
    /// Delete a project
    Delete { id: String },
    /// Append an empty spread to a project
    AddPage { id: String },
    /// Put a template on one side of a spread
    Place {
        id: String,
        /// Spread to edit (0-based)
        #[arg(long)]
        page: usize,
        #[arg(long, value_enum)]
        side: SideArg,
        #[arg(long)]
        template: String,
        /// Slot content as a JSON object
        #[arg(long)]
        content: Option<String>,
    },
    /// Change fields of a slot that is already placed, keeping its id
    Edit {
        id: String,
        /// Spread to edit (0-based)
        #[arg(long)]
        page: usize,
        #[arg(long, value_enum)]
        side: SideArg,
        /// Fields to overwrite, as a JSON object
        #[arg(long)]
        content: String,
    },
    /// Open a project in the spread viewer (the most recent one by default)
    View {
        id: Option<String>,
        /// View an exported project file and reload it when it changes
        #[arg(long, conflicts_with = "id")]
        file: Option<PathBuf>,
        /// Spread to open on (0-based)
        #[arg(short = 's', long)]
        spread: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SideArg {
    Left,
    Right,
}

impl From<SideArg> for SlotSide {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Left => SlotSide::Left,
            SideArg::Right => SlotSide::Right,
        }
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        enter_viewer_modes(&mut io::stdout())?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = leave_viewer_modes(&mut io::stdout());
        let _ = terminal::disable_raw_mode();
    }
}

fn enter_viewer_modes<W: Write>(writer: &mut W) -> io::Result<()> {
    crossterm::execute!(writer, EnableMouseCapture, EnableFocusChange, cursor::Hide)
}

/// Undoes every mode switched on by [`enter_viewer_modes`].
fn leave_viewer_modes<W: Write>(writer: &mut W) -> io::Result<()> {
    crossterm::execute!(writer, DisableMouseCapture, DisableFocusChange, cursor::Show)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "bookflip", "bookflip")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = Config::load(&config_path)?;

    let action = args.action.unwrap_or(Action::View {
        id: None,
        file: None,
        spread: None,
    });
    let interactive = matches!(action, Action::View { .. });
    let _log_guard = init_logging(&project_dirs, &config.logging, !interactive)?;

    let store = FileProjectStore::new(
        project_dirs.data_local_dir().join("projects.json"),
        config.library,
    )?;
    debug!(path = ?store.path(), "opened library");
    let library = Library::new(Arc::new(store));

    match action {
        Action::List { all } => {
            let projects = library.projects(all)?;
            if projects.is_empty() {
                println!("no projects yet, create one with `bookflip new <title>`");
            }
            for project in &projects {
                println!("{}", describe(project));
            }
        }
        Action::New { title } => {
            let project = library.create(&title)?;
            println!("{}", project.id);
        }
        Action::Delete { id } => library.delete(&id)?,
        Action::AddPage { id } => {
            let index = library.add_page(&id)?;
            println!("added spread {}", index);
        }
        Action::Place {
            id,
            page,
            side,
            template,
            content,
        } => {
            let content = match content {
                Some(raw) => serde_json::from_str::<SlotContent>(&raw)
                    .context("--content must be a JSON object")?,
                None => SlotContent::new(),
            };
            let slot = library.apply_template(&id, page, side.into(), &template, content)?;
            println!("{}", slot.id);
        }
        Action::Edit {
            id,
            page,
            side,
            content,
        } => {
            let content = serde_json::from_str::<SlotContent>(&content)
                .context("--content must be a JSON object")?;
            let slot = library.update_content(&id, page, side.into(), content)?;
            println!("{}", slot.id);
        }
        Action::View { id, file, spread } => {
            let provider = JsonProjectProvider;
            let project = match (&file, id) {
                (Some(path), _) => provider
                    .open(path)
                    .await
                    .with_context(|| format!("failed to open {:?}", path))?,
                (None, Some(id)) => library.get(&id)?,
                (None, None) => library.open_or_demo()?,
            };
            run_viewer(project, &config, file.as_deref(), spread, &provider).await?;
        }
    }
    Ok(())
}

fn describe(project: &BookProject) -> String {
    format!(
        "{}  {}  {} spread(s), {} filled  updated {}",
        project.id,
        project.title,
        project.spread_count(),
        project.content_count(),
        project.updated_at.format("%Y-%m-%d %H:%M")
    )
}

async fn run_viewer(
    project: BookProject,
    config: &Config,
    file: Option<&Path>,
    spread: Option<usize>,
    provider: &dyn ProjectProvider,
) -> Result<()> {
    let mut viewer = Viewer::new(project, config);
    if let Some(index) = spread {
        viewer.apply(Command::GotoSpread { index }, Instant::now())?;
    }
    let events = viewer.events();

    let (_watcher, mut reloads) = match file {
        Some(path) => {
            let (watcher, rx) = watch_file(path)?;
            (Some(watcher), Some(rx))
        }
        None => (None, None),
    };

    let _raw = RawModeGuard::new()?;
    let mut renderer = SpreadRenderer::new(io::stdout());
    let mut mapper = EventMapper::new();
    let mut dirty = true;

    loop {
        let now = Instant::now();
        viewer.tick(now);
        for event in events.lock().drain(..) {
            match event {
                ViewerEvent::PageChanged(index) => info!(spread = index, "page changed"),
                ViewerEvent::TransitionInvalidated => {
                    debug!("flip invalidated by project change")
                }
                ViewerEvent::RedrawNeeded => dirty = true,
                ViewerEvent::TransitionStarted(_) | ViewerEvent::TransitionSettled => {}
            }
        }

        let animating = viewer.transition().in_flight();
        if dirty || animating {
            redraw(&mut renderer, &viewer, &mut mapper, now)?;
            dirty = false;
        }

        let timeout = if animating {
            FRAME_INTERVAL
        } else {
            viewer
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(now))
                .unwrap_or(IDLE_POLL)
                .min(IDLE_POLL)
        };
        if event::poll(timeout)? {
            let pending_before = mapper.pending_input();
            let ui_event = mapper.map_event(event::read()?);
            let pending_changed = mapper.pending_input() != pending_before;
            match handle_event(ui_event, &mut viewer, pending_changed, Instant::now())? {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }

        if let (Some(path), Some(rx)) = (file, reloads.as_mut()) {
            let mut changed = false;
            while rx.try_recv().is_ok() {
                changed = true;
            }
            if changed {
                match provider.open(path).await {
                    Ok(project) => {
                        info!(path = ?path, spreads = project.spread_count(), "reloaded project");
                        viewer.replace_project(project);
                    }
                    Err(err) => warn!(?err, path = ?path, "failed to reload project"),
                }
            }
        }
    }

    viewer.destroy();
    {
        let writer = renderer.writer();
        crossterm::execute!(writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

/// Commands redraw through the viewer's own events; otherwise only a changed count
/// prefix needs the status line repainted.
fn handle_event(
    event: UiEvent,
    viewer: &mut Viewer,
    pending_changed: bool,
    now: Instant,
) -> Result<LoopAction> {
    let idle = if pending_changed {
        LoopAction::ContinueRedraw
    } else {
        LoopAction::Continue
    };
    match event {
        UiEvent::Command(command) => {
            viewer.apply(command, now)?;
            Ok(idle)
        }
        UiEvent::Redraw => Ok(LoopAction::ContinueRedraw),
        UiEvent::Quit => Ok(LoopAction::Quit),
        UiEvent::None => Ok(idle),
    }
}

/// Watches the directory holding `path` so saves that replace the file are seen too.
fn watch_file(path: &Path) -> Result<(RecommendedWatcher, UnboundedReceiver<()>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let file_name = path.file_name().map(|name| name.to_os_string());
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else { return };
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        let touches_file = event
            .paths
            .iter()
            .any(|changed| changed.file_name() == file_name.as_deref());
        if touches_file {
            let _ = tx.send(());
        }
    })?;
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {:?}", dir))?;
    Ok((watcher, rx))
}

fn redraw(
    renderer: &mut SpreadRenderer<io::Stdout>,
    viewer: &Viewer,
    mapper: &mut EventMapper,
    now: Instant,
) -> Result<()> {
    let window = terminal::window_size()?;
    let columns = window.columns.max(1);
    let rows = window.rows.max(1);
    if window.width > 0 {
        mapper.set_cell_width(f32::from(window.width) / f32::from(columns));
    }

    renderer.begin_sync_update()?;
    renderer.clear_all()?;
    let frame = SpreadFrame {
        window: viewer.window(),
        navigation: viewer.navigation(),
        transition: viewer.transition(),
        progress: viewer.transition_progress(now),
        drag: viewer.drag_progress(),
    };
    renderer.draw(&frame, columns, rows.saturating_sub(1))?;

    let status = format_status(
        &viewer.project().title,
        viewer.navigation(),
        viewer.transition(),
    );
    let status = combine_status(status, mapper.pending_input().as_deref());
    let writer = renderer.writer();
    crossterm::execute!(
        writer,
        cursor::MoveTo(0, rows.saturating_sub(1)),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(writer, &status)?;
    renderer.end_sync_update()?;
    Ok(())
}

fn combine_status(mut base: String, pending_input: Option<&str>) -> String {
    if let Some(pending) = pending_input.filter(|s| !s.is_empty()) {
        base.push_str(" | ");
        base.push_str(pending);
    }
    base
}

fn init_logging(
    project_dirs: &ProjectDirs,
    logging: &LoggingConfig,
    console: bool,
) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "bookflip.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // the viewer owns the terminal, so only one-shot commands log to it
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

    #[test]
    fn no_subcommand_means_view() {
        let args = Args::try_parse_from(["bookflip"]).unwrap();
        assert!(args.action.is_none());
        assert!(args.config.is_none());
    }

    #[test]
    fn place_parses_side_and_content() {
        let args = Args::try_parse_from([
            "bookflip",
            "place",
            "abc",
            "--page",
            "2",
            "--side",
            "right",
            "--template",
            "quote-block",
            "--content",
            r#"{"quote":"Less is more"}"#,
        ])
        .unwrap();
        match args.action {
            Some(Action::Place {
                id,
                page,
                side,
                template,
                content,
            }) => {
                assert_eq!(id, "abc");
                assert_eq!(page, 2);
                assert_eq!(SlotSide::from(side), SlotSide::Right);
                assert_eq!(template, "quote-block");
                assert!(content.is_some());
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn view_rejects_id_together_with_file() {
        assert!(Args::try_parse_from(["bookflip", "view", "abc", "--file", "book.json"]).is_err());
        let args =
            Args::try_parse_from(["bookflip", "--config", "c.toml", "view", "-s", "3"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(
            args.action,
            Some(Action::View {
                id: None,
                file: None,
                spread: Some(3)
            })
        ));
    }

    #[test]
    fn leaving_the_viewer_undoes_every_mode() {
        let mut entered = Vec::new();
        enter_viewer_modes(&mut entered).unwrap();
        let entered = String::from_utf8(entered).unwrap();
        assert!(entered.contains("\u{1b}[?1000h"));
        assert!(entered.contains("\u{1b}[?1004h"));
        assert!(entered.contains("\u{1b}[?25l"));

        let mut left = Vec::new();
        leave_viewer_modes(&mut left).unwrap();
        let left = String::from_utf8(left).unwrap();
        assert!(left.contains("\u{1b}[?1000l"));
        assert!(left.contains("\u{1b}[?1004l"));
        assert!(left.contains("\u{1b}[?25h"));
    }

    #[test]
    fn only_meaningful_events_request_redraw() {
        let now = Instant::now();
        let mut viewer = Viewer::new(BookProject::new("Menu"), &Config::default());
        let mut mapper = EventMapper::new();

        let motion = Event::Mouse(MouseEvent {
            kind: MouseEventKind::Moved,
            column: 4,
            row: 4,
            modifiers: KeyModifiers::NONE,
        });
        let ui_event = mapper.map_event(motion);
        assert_eq!(
            handle_event(ui_event, &mut viewer, false, now).unwrap(),
            LoopAction::Continue
        );

        let digit = Event::Key(KeyEvent::new(KeyCode::Char('2'), KeyModifiers::NONE));
        let ui_event = mapper.map_event(digit);
        assert_eq!(
            handle_event(ui_event, &mut viewer, true, now).unwrap(),
            LoopAction::ContinueRedraw
        );

        assert_eq!(
            handle_event(UiEvent::Redraw, &mut viewer, false, now).unwrap(),
            LoopAction::ContinueRedraw
        );
        assert_eq!(
            handle_event(UiEvent::Quit, &mut viewer, false, now).unwrap(),
            LoopAction::Quit
        );
    }

    #[test]
    fn commands_reach_the_viewer() {
        let now = Instant::now();
        let mut project = BookProject::new("Menu");
        project.add_page();
        let mut viewer = Viewer::new(project, &Config::default());
        assert_eq!(
            handle_event(
                UiEvent::Command(Command::NextSpread),
                &mut viewer,
                false,
                now
            )
            .unwrap(),
            LoopAction::Continue
        );
        assert!(viewer.transition().in_flight());

        viewer.destroy();
        assert!(handle_event(
            UiEvent::Command(Command::PrevSpread),
            &mut viewer,
            false,
            now
        )
        .is_err());
    }

    #[test]
    fn edit_requires_content() {
        assert!(
            Args::try_parse_from(["bookflip", "edit", "abc", "--page", "0", "--side", "left"])
                .is_err()
        );
        let args = Args::try_parse_from([
            "bookflip",
            "edit",
            "abc",
            "--page",
            "0",
            "--side",
            "left",
            "--content",
            r#"{"title":"Final"}"#,
        ])
        .unwrap();
        assert!(matches!(args.action, Some(Action::Edit { page: 0, .. })));
    }

    #[test]
    fn combine_status_appends_pending_count() {
        assert_eq!(combine_status("Book".into(), Some("12")), "Book | 12");
        assert_eq!(combine_status("Book".into(), Some("")), "Book");
        assert_eq!(combine_status("Book".into(), None), "Book");
    }

    #[test]
    fn describe_lists_counts() {
        let project = BookProject::new("Menu");
        let line = describe(&project);
        assert!(line.starts_with(&project.id));
        assert!(line.contains("Menu  1 spread(s), 0 filled"));
    }
}
