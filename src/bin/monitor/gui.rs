use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame, Terminal,
};
use std::{error::Error, io, ops::Range, time::Duration};

use beamscope::snapshot::ChannelLevel;

struct App {
    rms: Vec<(f64, f64)>,
    peak: Vec<(f64, f64)>,
    wired: Vec<(f64, f64)>,
    channels: f64,
    ceiling: f64,
}

impl App {
    fn new(levels: &[ChannelLevel], wired: Range<usize>) -> App {
        let rms: Vec<(f64, f64)> = levels
            .iter()
            .enumerate()
            .map(|(c, l)| (c as f64, l.rms as f64))
            .collect();
        let peak: Vec<(f64, f64)> = levels
            .iter()
            .enumerate()
            .map(|(c, l)| (c as f64, l.peak as f64))
            .collect();
        let ceiling = peak.iter().fold(0.0f64, |m, &(_, p)| m.max(p));
        let ceiling = if ceiling > 0.0 { ceiling * 1.1 } else { 1.0 };
        // mark the wired channels along the bottom of the plot
        let wired = wired
            .filter(|&c| c < levels.len())
            .map(|c| (c as f64, 0.0))
            .collect();

        App {
            rms,
            peak,
            wired,
            channels: levels.len().max(1) as f64,
            ceiling,
        }
    }
}

pub fn engage_gui(levels: &[ChannelLevel], wired: Range<usize>) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::new(levels, wired);
    let res = run_app(&mut terminal, app);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') | KeyCode::Esc = key.code {
                    return Ok(());
                }
            }
        }
    }
}

fn axis_labels(max: f64, precision: usize) -> Vec<Span<'static>> {
    [0.0, 0.5, 1.0]
        .iter()
        .map(|f| Span::from(format!("{:.*}", precision, f * max)))
        .collect()
}

fn ui(f: &mut Frame, app: &App) {
    let chart = Chart::new(vec![
        Dataset::default()
            .name("peak")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Red))
            .data(&app.peak),
        Dataset::default()
            .name("rms")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&app.rms),
        Dataset::default()
            .name("wired")
            .marker(symbols::Marker::Block)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::DarkGray))
            .data(&app.wired),
    ])
    .block(
        Block::default()
            .title(" Channel levels (q to quit) ")
            .borders(Borders::ALL),
    )
    .x_axis(
        Axis::default()
            .title(Span::styled("channel", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds([0.0, app.channels])
            .labels(axis_labels(app.channels, 0)),
    )
    .y_axis(
        Axis::default()
            .title(Span::styled("level", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds([0.0, app.ceiling])
            .labels(axis_labels(app.ceiling, 4)),
    );

    f.render_widget(chart, f.size());
}
