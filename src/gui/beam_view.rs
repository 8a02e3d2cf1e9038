use std::{
    io::stdout,
    sync::mpsc::{self, TryRecvError},
    time::{Duration, Instant},
};

use crate::gui::error::GuiError;
use crate::pipeline::Pipeline;
use crate::receiver::Receiver;
use crate::scanner::BeamImage;
use crate::signal;

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use log::debug;
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Why the view returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewExit {
    /// A key was pressed
    KeyPressed,
    /// SIGINT arrived
    Interrupted,
    /// The pipeline disconnected underneath the view
    PipelineStopped,
}

/// Maps an intensity onto a blue-cyan-yellow-red ramp. Zero stays black so
/// a squelched frame reads as "nothing there".
pub fn heat_color(value: u8) -> Color {
    if value == 0 {
        return Color::Black;
    }
    let t = value as f32 / 255.0;
    let channel = |centre: f32| -> u8 {
        ((1.5 - (4.0 * t - centre).abs()).clamp(0.0, 1.0) * 255.0) as u8
    };
    Color::Rgb(channel(3.0), channel(2.0), channel(1.0))
}

/// One line per image row, two blank cells per pixel coloured by
/// intensity, so pixels come out roughly square.
pub fn image_lines(image: &BeamImage) -> Vec<Line<'static>> {
    (0..image.height)
        .map(|y| {
            let spans: Vec<Span<'static>> = (0..image.width)
                .map(|x| Span::styled("  ", Style::default().bg(heat_color(image.get(x, y)))))
                .collect();
            Line::from(spans)
        })
        .collect()
}

/// Shows frames from `frames` until a key is pressed, SIGINT arrives or the
/// pipeline stops. The caller is left to disconnect the pipeline.
pub fn beam_view<R: Receiver>(
    pipeline: &Pipeline<R>,
    frames: &mpsc::Receiver<BeamImage>,
    source: &str,
) -> Result<ViewExit, GuiError> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut latest: Option<BeamImage> = None;
    let mut shown = 0u64;
    let started = Instant::now();

    let exit = loop {
        if signal::interrupted() {
            break ViewExit::Interrupted;
        }
        if !pipeline.is_running() {
            break ViewExit::PipelineStopped;
        }

        // only the newest frame is worth drawing
        loop {
            match frames.try_recv() {
                Ok(image) => {
                    shown += 1;
                    latest = Some(image);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("scanner hung up");
                    break;
                }
            }
        }

        let fps = shown as f64 / started.elapsed().as_secs_f64().max(1e-3);
        let status = match &latest {
            Some(image) => format!(
                " generation {} | {}x{} | {:.1} frames/s ",
                image.generation, image.width, image.height, fps
            ),
            None => " waiting for the first frame ".to_owned(),
        };
        let title = Title::from(Span::styled(
            format!(" BeamScope: {} ", source),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
        let instructions = Title::from(Line::from(vec![
            status.into(),
            " Quit ".into(),
            "<Any key> ".cyan().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let body = Paragraph::new(latest.as_ref().map(image_lines).unwrap_or_default())
            .alignment(Alignment::Center)
            .block(block);

        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(body, area);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    break ViewExit::KeyPressed;
                }
            }
        }
    };

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(exit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_ends() {
        assert_eq!(heat_color(0), Color::Black);
        // low values are blue, high values red
        assert!(matches!(heat_color(10), Color::Rgb(0, 0, b) if b > 100));
        assert!(matches!(heat_color(255), Color::Rgb(r, 0, 0) if r > 100));
    }

    #[test]
    fn middle_is_green_ish() {
        match heat_color(128) {
            Color::Rgb(r, g, b) => {
                assert_eq!(g, 255);
                assert!(r < 255 && b < 255);
            }
            other => panic!("unexpected colour {:?}", other),
        }
    }

    #[test]
    fn lines_follow_the_image() {
        let mut image = BeamImage::new(3, 2);
        image.pixels[4] = 200;
        let lines = image_lines(&image);

        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.spans.len() == 3));
        assert_eq!(lines[0].spans[0].style.bg, Some(Color::Black));
        assert_eq!(lines[1].spans[1].style.bg, Some(heat_color(200)));
    }
}
