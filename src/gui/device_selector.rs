use std::{io::stdout, path::PathBuf, time::Duration};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Moves a list cursor one step, wrapping at both ends.
fn step_cursor(cursor: usize, len: usize, down: bool) -> usize {
    if down {
        (cursor + 1) % len
    } else {
        (cursor + len - 1) % len
    }
}

/// Lets the user pick the serial device the array is attached to. Returns
/// `None` if they quit without choosing.
pub fn device_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, GuiError> {
    if available_ports.is_empty() {
        return Err(GuiError::NothingToSelect);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    let n_ports = available_ports.len();
    let mut selected_port = None;
    loop {
        let title = Title::from(" Array Device ".cyan().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".cyan().bold(),
            " Select ".into(),
            "<Enter>".cyan().bold(),
            " Quit ".into(),
            "<Q> ".cyan().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let port_names = available_ports.iter().map(|p| p.to_string_lossy());
        let list = List::new(port_names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Cyan))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Down => cursor = step_cursor(cursor, n_ports, true),
                        KeyCode::Up => cursor = step_cursor(cursor, n_ports, false),
                        KeyCode::Enter => {
                            selected_port = Some(cursor);
                            break;
                        }
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        _ => {}
                    }
                }
            }
        }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(selected_port.map(|i| available_ports.swap_remove(i)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps() {
        assert_eq!(step_cursor(0, 3, true), 1);
        assert_eq!(step_cursor(2, 3, true), 0);
        assert_eq!(step_cursor(0, 3, false), 2);
    }

    #[test]
    fn no_ports_is_an_error() {
        assert!(matches!(
            device_selector(Vec::new()),
            Err(GuiError::NothingToSelect)
        ));
    }
}
