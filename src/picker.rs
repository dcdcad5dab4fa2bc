//! Multi-select list used by `--prompt`.

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    DefaultTerminal, Frame,
};

use crate::error::Result;

/// Selection state over a fixed list of labels.
pub struct PickerState {
    selected: Vec<bool>,
    list_state: ListState,
}

impl PickerState {
    pub fn new(len: usize) -> Self {
        let mut list_state = ListState::default();
        if len > 0 {
            list_state.select(Some(0));
        }
        Self {
            selected: vec![false; len],
            list_state,
        }
    }

    pub fn next(&mut self) {
        let len = self.selected.len();
        if len == 0 {
            return;
        }
        let i = self.list_state.selected().map_or(0, |i| (i + 1) % len);
        self.list_state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.selected.len();
        if len == 0 {
            return;
        }
        let i = self
            .list_state
            .selected()
            .map_or(0, |i| if i == 0 { len - 1 } else { i - 1 });
        self.list_state.select(Some(i));
    }

    pub fn toggle_current(&mut self) {
        if let Some(idx) = self.list_state.selected()
            && let Some(flag) = self.selected.get_mut(idx)
        {
            *flag = !*flag;
        }
    }

    /// Select everything, or clear the selection if everything was selected.
    pub fn toggle_all(&mut self) {
        let all = self.selected.iter().all(|s| *s);
        self.selected.iter_mut().for_each(|s| *s = !all);
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.selected
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.then_some(i))
            .collect()
    }
}

fn render(f: &mut Frame, title: &str, labels: &[String], state: &mut PickerState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());

    let items: Vec<ListItem> = labels
        .iter()
        .zip(&state.selected)
        .map(|(label, selected)| {
            let checkbox = if *selected { "[x]" } else { "[ ]" };
            ListItem::new(Line::from(format!("{} {}", checkbox, label)))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(
                    "{} ({}/{})",
                    title,
                    state.selected_indices().len(),
                    labels.len()
                )),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    if let Some(area) = chunks.first() {
        f.render_stateful_widget(list, *area, &mut state.list_state);
    }
    if let Some(area) = chunks.get(1) {
        let help = Paragraph::new("↑/↓ move  space toggle  a all  enter confirm  esc cancel")
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(help, *area);
    }
}

fn run(terminal: &mut DefaultTerminal, title: &str, labels: &[String]) -> Result<Vec<usize>> {
    let mut state = PickerState::new(labels.len());

    loop {
        terminal.draw(|f| render(f, title, labels, &mut state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.previous(),
                KeyCode::Char(' ') => state.toggle_current(),
                KeyCode::Char('a') => state.toggle_all(),
                KeyCode::Enter => return Ok(state.selected_indices()),
                KeyCode::Esc | KeyCode::Char('q') => return Ok(Vec::new()),
                _ => {}
            }
        }
    }
}

/// Let the operator tick any number of `labels`; returns their indices.
/// Cancelling selects nothing.
pub fn pick_many(title: &str, labels: &[String]) -> Result<Vec<usize>> {
    let mut terminal = ratatui::init();
    let result = run(&mut terminal, title, labels);
    ratatui::restore();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_nothing_selected() {
        let state = PickerState::new(3);

        assert!(state.selected_indices().is_empty());
        assert_eq!(state.list_state.selected(), Some(0));
    }

    #[test]
    fn test_toggle_current_follows_cursor() {
        let mut state = PickerState::new(3);

        state.next();
        state.toggle_current();
        state.next();
        state.next();
        state.toggle_current();

        assert_eq!(state.selected_indices(), vec![0, 1]);
    }

    #[test]
    fn test_previous_wraps() {
        let mut state = PickerState::new(3);

        state.previous();
        state.toggle_current();

        assert_eq!(state.selected_indices(), vec![2]);
    }

    #[test]
    fn test_toggle_all() {
        let mut state = PickerState::new(3);
        state.toggle_current();

        state.toggle_all();
        assert_eq!(state.selected_indices(), vec![0, 1, 2]);

        state.toggle_all();
        assert!(state.selected_indices().is_empty());
    }

    #[test]
    fn test_empty_list() {
        let mut state = PickerState::new(0);

        state.next();
        state.toggle_current();

        assert!(state.selected_indices().is_empty());
        assert_eq!(state.list_state.selected(), None);
    }
}
