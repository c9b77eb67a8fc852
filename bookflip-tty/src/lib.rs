use std::io::{self, Write};

use anyhow::Result;
use bookflip_core::{
    Command, Direction, NavigationState, Slot, SpreadWindow, TransitionState,
};
use crossterm::{
    cursor,
    event::{
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
        MouseEventKind,
    },
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use serde_json::Value;
use tracing::debug;

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Copy)]
pub struct SpreadFrame<'a> {
    pub window: SpreadWindow<'a>,
    pub navigation: NavigationState,
    pub transition: TransitionState,
    /// Fraction of the current transition phase, `0.0..=1.0`.
    pub progress: f32,
    /// Signed drag progress, `-1.0..=1.0`.
    pub drag: f32,
}

/// One page-sized box on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Panel<'a> {
    pub x: u16,
    pub width: u16,
    pub slot: Option<&'a Slot>,
    pub turning: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub page_width: u16,
    pub left_x: u16,
    pub right_x: u16,
}

impl Layout {
    const MIN_PAGE_WIDTH: u16 = 6;

    /// Two pages with a one-column margin on each side and a one-column spine.
    pub fn for_columns(columns: u16) -> Option<Self> {
        let page_width = columns.saturating_sub(3) / 2;
        if page_width < Self::MIN_PAGE_WIDTH {
            return None;
        }
        Some(Self {
            page_width,
            left_x: 1,
            right_x: 2 + page_width,
        })
    }

    fn spine(&self) -> u16 {
        self.left_x + self.page_width
    }
}

/// Lays out the pages for a frame, back to front. While a page turns, its visible
/// width shrinks towards the spine for the first half of the phase and the reverse
/// side grows out of the spine for the second half.
pub fn compose<'a>(frame: &SpreadFrame<'a>, layout: Layout) -> Vec<Panel<'a>> {
    let window = frame.window;
    let fold = match frame.transition {
        TransitionState::Committing(direction) => Some((direction, frame.progress)),
        TransitionState::Settling(_) => None,
        TransitionState::Idle => {
            let direction = if frame.drag > 0.0 {
                Some(Direction::Next)
            } else if frame.drag < 0.0 {
                Some(Direction::Prev)
            } else {
                None
            };
            direction
                .filter(|direction| frame.navigation.can_flip(*direction))
                .map(|direction| (direction, frame.drag.abs() * 0.5))
        }
    };

    let Some((direction, progress)) = fold else {
        return vec![
            layout.page(layout.left_x, window.current.left),
            layout.page(layout.right_x, window.current.right),
        ];
    };

    let progress = progress.clamp(0.0, 1.0);
    let (base, turning) = match direction {
        Direction::Next => {
            let base = [
                layout.page(layout.left_x, window.current.left),
                layout.page(layout.right_x, window.next.right),
            ];
            let turning = if progress < 0.5 {
                let width = scaled(layout.page_width, 1.0 - 2.0 * progress);
                Panel {
                    x: layout.right_x,
                    width,
                    slot: window.current.right,
                    turning: true,
                }
            } else {
                let width = scaled(layout.page_width, 2.0 * progress - 1.0);
                Panel {
                    x: layout.spine() - width,
                    width,
                    slot: window.next.left,
                    turning: true,
                }
            };
            (base, turning)
        }
        Direction::Prev => {
            let base = [
                layout.page(layout.left_x, window.prev.left),
                layout.page(layout.right_x, window.current.right),
            ];
            let turning = if progress < 0.5 {
                let width = scaled(layout.page_width, 1.0 - 2.0 * progress);
                Panel {
                    x: layout.spine() - width,
                    width,
                    slot: window.current.left,
                    turning: true,
                }
            } else {
                let width = scaled(layout.page_width, 2.0 * progress - 1.0);
                Panel {
                    x: layout.right_x,
                    width,
                    slot: window.prev.right,
                    turning: true,
                }
            };
            (base, turning)
        }
    };

    let mut panels = base.to_vec();
    if turning.width > 0 {
        panels.push(turning);
    }
    panels
}

impl Layout {
    fn page<'a>(&self, x: u16, slot: Option<&'a Slot>) -> Panel<'a> {
        Panel {
            x,
            width: self.page_width,
            slot,
            turning: false,
        }
    }
}

fn scaled(width: u16, fraction: f32) -> u16 {
    (width as f32 * fraction.clamp(0.0, 1.0)).round() as u16
}

/// Text lines describing a slot's content, most prominent first.
pub fn slot_summary(slot: &Slot) -> Vec<String> {
    const PROMINENT: [&str; 6] = ["title", "subtitle", "quote", "author", "content", "caption"];

    let mut lines = vec![format!("[{}]", slot.template)];
    for key in PROMINENT {
        if let Some(Value::String(text)) = slot.content.get(key) {
            let text = clean_text(text);
            if text.is_empty() {
                continue;
            }
            match key {
                "quote" => lines.push(format!("\"{}\"", text)),
                "author" => lines.push(format!("- {}", text)),
                _ => lines.push(text),
            }
        }
    }
    for (key, value) in &slot.content {
        if PROMINENT.contains(&key.as_str()) {
            continue;
        }
        match value {
            Value::Array(items) => lines.push(format!("{}: {} item(s)", key, items.len())),
            Value::String(text) if !text.is_empty() => {
                lines.push(format!("{}: {}", key, clean_text(text)))
            }
            _ => {}
        }
    }
    if !slot.eye_icons.is_empty() {
        lines.push(format!("{} linked media", slot.eye_icons.len()));
    }
    lines
}

fn clean_text(text: &str) -> String {
    text.replace("<br/>", " ")
        .replace("<br>", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let word: String = word.chars().take(width).collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn pad(text: &str, width: usize) -> String {
    let mut out: String = text.chars().take(width).collect();
    let len = out.chars().count();
    out.extend(std::iter::repeat(' ').take(width - len));
    out
}

pub struct SpreadRenderer<W: Write> {
    writer: W,
}

impl<W: Write> SpreadRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Draws the frame into the top `rows` rows of a `columns` wide area.
    pub fn draw(&mut self, frame: &SpreadFrame<'_>, columns: u16, rows: u16) -> Result<()> {
        let Some(layout) = Layout::for_columns(columns) else {
            debug!(columns, "window too narrow for a spread");
            queue!(self.writer, cursor::MoveTo(0, 0), Print("window too small"))?;
            self.writer.flush()?;
            return Ok(());
        };
        let height = rows.saturating_sub(2);
        if height < 3 {
            self.writer.flush()?;
            return Ok(());
        }
        for panel in compose(frame, layout) {
            self.draw_panel(&panel, 1, height)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn draw_panel(&mut self, panel: &Panel<'_>, top: u16, height: u16) -> Result<()> {
        let width = panel.width as usize;
        if width < 2 {
            for row in 0..height {
                queue!(
                    self.writer,
                    cursor::MoveTo(panel.x, top + row),
                    Print(if panel.turning { "\\" } else { "|" })
                )?;
            }
            return Ok(());
        }

        let inner = width - 2;
        let edge = if panel.turning { '~' } else { '-' };
        let border = format!("+{}+", edge.to_string().repeat(inner));
        let mut body: Vec<String> = match panel.slot {
            Some(slot) => slot_summary(slot)
                .iter()
                .flat_map(|line| {
                    let mut wrapped = wrap(line, inner.saturating_sub(1).max(1));
                    wrapped.push(String::new());
                    wrapped
                })
                .collect(),
            None => vec![String::new(), "Empty page".to_string()],
        };
        let body_rows = height.saturating_sub(2) as usize;
        body.truncate(body_rows);

        queue!(self.writer, cursor::MoveTo(panel.x, top), Print(&border))?;
        for row in 0..body_rows {
            let text = body.get(row).map(String::as_str).unwrap_or("");
            let line = format!("|{}|", pad(&format!(" {}", text), inner));
            queue!(
                self.writer,
                cursor::MoveTo(panel.x, top + 1 + row as u16),
                Print(line)
            )?;
        }
        queue!(
            self.writer,
            cursor::MoveTo(panel.x, top + height - 1),
            Print(&border)
        )?;
        Ok(())
    }

    /// Holds terminal output until [`Self::end_sync_update`] so a frame appears at once.
    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

pub fn format_status(title: &str, navigation: NavigationState, transition: TransitionState) -> String {
    if navigation.is_empty() {
        return format!("{} | no spreads", title);
    }
    let mut status = format!(
        "{} | spread {}/{} | pages {}-{} of {}",
        title,
        navigation.current_index + 1,
        navigation.total_spreads,
        navigation.current_index * 2 + 1,
        navigation.current_index * 2 + 2,
        navigation.total_spreads * 2
    );
    match transition {
        TransitionState::Idle => {}
        TransitionState::Committing(direction) => {
            status.push_str(&format!(" | turning {}", direction_label(direction)))
        }
        TransitionState::Settling(_) => status.push_str(" | settling"),
    }
    status
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Next => "forward",
        Direction::Prev => "back",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    Redraw,
    Quit,
    None,
}

#[derive(Debug)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    cell_width: f32,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self {
            pending_count: None,
            pending_digits: String::new(),
            cell_width: Self::DEFAULT_CELL_WIDTH,
        }
    }
}

impl EventMapper {
    const DEFAULT_CELL_WIDTH: f32 = 8.0;

    pub fn new() -> Self {
        Self::default()
    }

    /// Pixel width of one terminal column; mouse columns are scaled by it so drag
    /// thresholds stay in logical pixels.
    pub fn set_cell_width(&mut self, pixels: f32) {
        if pixels.is_finite() && pixels > 0.0 {
            self.cell_width = pixels;
        }
    }

    pub fn cell_width(&self) -> f32 {
        self.cell_width
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(key) => self.map_key(key),
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Resize(_, _) => UiEvent::Redraw,
            Event::FocusLost => UiEvent::Command(Command::PointerCancel),
            _ => UiEvent::None,
        }
    }

    fn map_key(&mut self, key: KeyEvent) -> UiEvent {
        if key.kind == KeyEventKind::Release {
            return UiEvent::None;
        }
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('l'), _)
            | (KeyCode::Char('j'), _)
            | (KeyCode::Char(' '), _)
            | (KeyCode::Right, _)
            | (KeyCode::Down, _)
            | (KeyCode::PageDown, _) => {
                self.reset_count();
                UiEvent::Command(Command::NextSpread)
            }
            (KeyCode::Char('h'), _)
            | (KeyCode::Char('k'), _)
            | (KeyCode::Left, _)
            | (KeyCode::Up, _)
            | (KeyCode::PageUp, _)
            | (KeyCode::Backspace, _) => {
                self.reset_count();
                UiEvent::Command(Command::PrevSpread)
            }
            (KeyCode::Char('g'), _) | (KeyCode::Home, _) => {
                let index = self.take_index().unwrap_or(0);
                UiEvent::Command(Command::GotoSpread { index })
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                let index = self.take_index().unwrap_or(usize::MAX);
                UiEvent::Command(Command::GotoSpread { index })
            }
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let x = f32::from(mouse.column) * self.cell_width;
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.reset_count();
                UiEvent::Command(Command::PointerDown { x })
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                UiEvent::Command(Command::PointerMove { x })
            }
            MouseEventKind::Up(MouseButton::Left) => UiEvent::Command(Command::PointerUp),
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    /// A typed count is a 1-based spread number.
    fn take_index(&mut self) -> Option<usize> {
        let index = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .map(|count| count - 1);
        self.pending_digits.clear();
        index
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookflip_core::{demo_project, resolve_window, SlotContent, SlotSide};
    use crossterm::event::{KeyEventState, MouseEvent};
    use serde_json::json;

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn mouse_event(kind: MouseEventKind, column: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row: 5,
            modifiers: KeyModifiers::NONE,
        })
    }

    fn frame<'a>(
        window: SpreadWindow<'a>,
        navigation: NavigationState,
        transition: TransitionState,
        progress: f32,
        drag: f32,
    ) -> SpreadFrame<'a> {
        SpreadFrame {
            window,
            navigation,
            transition,
            progress,
            drag,
        }
    }

    #[test]
    fn event_mapper_maps_arrows_and_letters_to_flips() {
        let mut mapper = EventMapper::new();
        for code in [KeyCode::Right, KeyCode::Char('l'), KeyCode::Char(' ')] {
            assert_eq!(
                mapper.map_event(key_event(code)),
                UiEvent::Command(Command::NextSpread)
            );
        }
        for code in [KeyCode::Left, KeyCode::Char('h'), KeyCode::PageUp] {
            assert_eq!(
                mapper.map_event(key_event(code)),
                UiEvent::Command(Command::PrevSpread)
            );
        }
    }

    #[test]
    fn event_mapper_uses_numeric_prefix_as_spread_number() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('1'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('2'))), UiEvent::None);
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::GotoSpread { index: 11 })
        );
        assert!(mapper.pending_input().is_none());

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('G'))),
            UiEvent::Command(Command::GotoSpread { index: usize::MAX })
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::GotoSpread { index: 0 })
        );
    }

    #[test]
    fn event_mapper_drops_prefix_on_other_command() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('l'))),
            UiEvent::Command(Command::NextSpread)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::GotoSpread { index: 0 })
        );
    }

    #[test]
    fn event_mapper_quits_on_q_esc_and_ctrl_c() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('q'))), UiEvent::Quit);
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::Quit);
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('c'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Quit
        );
    }

    #[test]
    fn event_mapper_ignores_key_release() {
        let mut mapper = EventMapper::new();
        let release = Event::Key(KeyEvent {
            code: KeyCode::Right,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert_eq!(mapper.map_event(release), UiEvent::None);
    }

    #[test]
    fn event_mapper_scales_mouse_columns_to_pixels() {
        let mut mapper = EventMapper::new();
        mapper.set_cell_width(10.0);
        mapper.set_cell_width(-1.0);
        assert_eq!(mapper.cell_width(), 10.0);

        assert_eq!(
            mapper.map_event(mouse_event(MouseEventKind::Down(MouseButton::Left), 10)),
            UiEvent::Command(Command::PointerDown { x: 100.0 })
        );
        assert_eq!(
            mapper.map_event(mouse_event(MouseEventKind::Drag(MouseButton::Left), 21)),
            UiEvent::Command(Command::PointerMove { x: 210.0 })
        );
        assert_eq!(
            mapper.map_event(mouse_event(MouseEventKind::Up(MouseButton::Left), 21)),
            UiEvent::Command(Command::PointerUp)
        );
        assert_eq!(
            mapper.map_event(mouse_event(MouseEventKind::Down(MouseButton::Right), 3)),
            UiEvent::None
        );
        assert_eq!(mapper.map_event(Event::Resize(80, 24)), UiEvent::Redraw);
        assert_eq!(
            mapper.map_event(Event::FocusLost),
            UiEvent::Command(Command::PointerCancel)
        );
    }

    #[test]
    fn slot_summary_orders_prominent_fields() {
        let mut content = SlotContent::new();
        content.insert("content".into(), json!("Line one<br/>line   two"));
        content.insert("title".into(), json!("Chapter 1"));
        content.insert("images".into(), json!(["a", "b"]));
        content.insert("image".into(), Value::Null);
        let slot = Slot::new("s", "text-article", content, SlotSide::Left);

        assert_eq!(
            slot_summary(&slot),
            vec![
                "[text-article]".to_string(),
                "Chapter 1".to_string(),
                "Line one line two".to_string(),
                "images: 2 item(s)".to_string(),
            ]
        );
    }

    #[test]
    fn wrap_breaks_on_word_boundaries() {
        assert_eq!(
            wrap("the quick brown fox", 9),
            vec!["the quick", "brown fox"]
        );
        assert_eq!(wrap("abcdefghijkl", 5), vec!["abcde"]);
        assert!(wrap("", 5).is_empty());
    }

    #[test]
    fn layout_needs_room_for_two_pages() {
        assert!(Layout::for_columns(10).is_none());
        let layout = Layout::for_columns(83).unwrap();
        assert_eq!(layout.page_width, 40);
        assert_eq!(layout.left_x, 1);
        assert_eq!(layout.right_x, 42);
    }

    #[test]
    fn idle_frame_shows_current_spread() {
        let project = demo_project();
        let window = resolve_window(&project.pages, 1);
        let layout = Layout::for_columns(83).unwrap();
        let panels = compose(
            &frame(window, NavigationState::new(4, 1), TransitionState::Idle, 0.0, 0.0),
            layout,
        );
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].slot.map(|s| s.id.as_str()), Some("demo-left-2"));
        assert_eq!(panels[1].slot.map(|s| s.id.as_str()), Some("demo-right-2"));
        assert!(panels.iter().all(|panel| !panel.turning));
    }

    #[test]
    fn next_flip_folds_right_page_then_reveals_next_left() {
        let project = demo_project();
        let window = resolve_window(&project.pages, 0);
        let layout = Layout::for_columns(83).unwrap();
        let navigation = NavigationState::new(4, 0);
        let committing = TransitionState::Committing(Direction::Next);

        let early = compose(&frame(window, navigation, committing, 0.25, 0.0), layout);
        assert_eq!(early.len(), 3);
        assert_eq!(early[1].slot.map(|s| s.id.as_str()), Some("demo-right-2"));
        let turning = early[2];
        assert!(turning.turning);
        assert_eq!(turning.x, layout.right_x);
        assert_eq!(turning.width, 20);
        assert_eq!(turning.slot.map(|s| s.id.as_str()), Some("demo-right-1"));

        let late = compose(&frame(window, navigation, committing, 0.75, 0.0), layout);
        let turning = late[2];
        assert_eq!(turning.width, 20);
        assert_eq!(turning.x + turning.width, layout.left_x + layout.page_width);
        assert_eq!(turning.slot.map(|s| s.id.as_str()), Some("demo-left-2"));
    }

    #[test]
    fn prev_flip_reveals_previous_spread() {
        let project = demo_project();
        let window = resolve_window(&project.pages, 2);
        let layout = Layout::for_columns(83).unwrap();
        let panels = compose(
            &frame(
                window,
                NavigationState::new(4, 2),
                TransitionState::Committing(Direction::Prev),
                1.0,
                0.0,
            ),
            layout,
        );
        assert_eq!(panels[0].slot.map(|s| s.id.as_str()), Some("demo-left-2"));
        assert_eq!(panels[2].x, layout.right_x);
        assert_eq!(panels[2].width, layout.page_width);
        assert_eq!(panels[2].slot.map(|s| s.id.as_str()), Some("demo-right-2"));
    }

    #[test]
    fn drag_lifts_page_only_when_flip_is_possible() {
        let project = demo_project();
        let layout = Layout::for_columns(83).unwrap();

        let last = resolve_window(&project.pages, 3);
        let panels = compose(
            &frame(last, NavigationState::new(4, 3), TransitionState::Idle, 0.0, 0.6),
            layout,
        );
        assert_eq!(panels.len(), 2);

        let first = resolve_window(&project.pages, 0);
        let panels = compose(
            &frame(first, NavigationState::new(4, 0), TransitionState::Idle, 0.0, 0.6),
            layout,
        );
        assert_eq!(panels.len(), 3);
        assert_eq!(panels[2].width, 16);
    }

    #[test]
    fn renderer_writes_slot_text() {
        let project = demo_project();
        let window = resolve_window(&project.pages, 1);
        let mut renderer = SpreadRenderer::new(Vec::new());
        renderer
            .draw(
                &frame(window, NavigationState::new(4, 1), TransitionState::Idle, 0.0, 0.0),
                83,
                24,
            )
            .unwrap();
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(output.contains("[quote-block]"));
        assert!(output.contains("- Steve Jobs"));
        assert!(output.contains("[mixed-media]"));
    }

    #[test]
    fn renderer_marks_empty_pages_and_small_windows() {
        let pages = vec![bookflip_core::Page::empty()];
        let window = resolve_window(&pages, 0);
        assert!(window.current.is_empty());
        let navigation = NavigationState::new(1, 0);

        let mut renderer = SpreadRenderer::new(Vec::new());
        renderer
            .draw(&frame(window, navigation, TransitionState::Idle, 0.0, 0.0), 40, 10)
            .unwrap();
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(output.matches("Empty page").count(), 2);

        let mut renderer = SpreadRenderer::new(Vec::new());
        renderer
            .draw(&frame(window, navigation, TransitionState::Idle, 0.0, 0.0), 8, 10)
            .unwrap();
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(output.contains("window too small"));
    }

    #[test]
    fn sync_update_brackets_frame() {
        let project = demo_project();
        let window = resolve_window(&project.pages, 0);
        let mut renderer = SpreadRenderer::new(Vec::new());
        renderer.begin_sync_update().unwrap();
        renderer
            .draw(
                &frame(window, NavigationState::new(4, 0), TransitionState::Idle, 0.0, 0.0),
                83,
                24,
            )
            .unwrap();
        renderer.end_sync_update().unwrap();
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(output.starts_with("\u{1b}[?2026h"));
        assert!(output.ends_with("\u{1b}[?2026l"));
        assert!(output.contains("[text-article]"));
    }

    #[test]
    fn mouse_motion_without_button_maps_to_nothing() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('3')));
        assert_eq!(
            mapper.map_event(mouse_event(MouseEventKind::Moved, 12)),
            UiEvent::None
        );
        assert_eq!(mapper.pending_input().as_deref(), Some("3"));
    }

    #[test]
    fn status_reports_spread_pages_and_phase() {
        let navigation = NavigationState::new(4, 1);
        assert_eq!(
            format_status("Catalog", navigation, TransitionState::Idle),
            "Catalog | spread 2/4 | pages 3-4 of 8"
        );
        assert_eq!(
            format_status(
                "Catalog",
                navigation,
                TransitionState::Committing(Direction::Prev)
            ),
            "Catalog | spread 2/4 | pages 3-4 of 8 | turning back"
        );
        assert!(format_status("Catalog", navigation, TransitionState::Settling(Direction::Next))
            .ends_with("| settling"));
        assert_eq!(
            format_status("Empty", NavigationState::new(0, 0), TransitionState::Idle),
            "Empty | no spreads"
        );
    }
}
