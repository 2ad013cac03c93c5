mod export;
mod help;
mod state;

use crate::cli::{self, Cli};
use crate::eras;
use crate::model::{FlowEvent, SessionConfig, Step};
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{apply_event, InputFocus, ResultTab, UiState};
use std::path::PathBuf;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub async fn run(args: Cli) -> Result<()> {
    let cfg = cli::build_config(&args)?;

    // Unbounded channels so neither side ever waits on the other.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<FlowEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let session = Arc::new(cli::build_session(&cfg, Some(event_tx.clone()))?);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_cfg = cfg.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_cfg, event_rx, cmd_tx));

    let res = orchestrator::run_controller(&cfg, session, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    cfg: SessionConfig,
    mut event_rx: UnboundedReceiver<FlowEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState {
        info: "Strike a pose!".into(),
        ..Default::default()
    };
    if cfg.camera_command.is_none() {
        state.capture_notice = Some("No camera configured; press u to upload a photo.".into());
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            state.tick = state.tick.wrapping_add(1);
            terminal.draw(|f| draw(f.area(), f, &state, &cfg)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(cmd) = handle_key(&mut state, k.modifiers, k.code) {
                    let quit = matches!(cmd, UiCommand::Quit);
                    if cmd_tx.send(cmd).is_err() || quit {
                        break Ok(());
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    res
}

/// Handle a key press, returning the command to send to the controller, if any.
fn handle_key(state: &mut UiState, modifiers: KeyModifiers, code: KeyCode) -> Option<UiCommand> {
    if modifiers == KeyModifiers::CONTROL && code == KeyCode::Char('c') {
        return Some(UiCommand::Quit);
    }
    if state.focus != InputFocus::None {
        return handle_input_key(state, code);
    }
    if state.show_help {
        if matches!(code, KeyCode::Char('?') | KeyCode::Esc) {
            state.show_help = false;
        }
        return None;
    }

    match code {
        KeyCode::Char('q') => return Some(UiCommand::Quit),
        KeyCode::Char('?') => {
            state.show_help = true;
            return None;
        }
        KeyCode::Char('r') if state.current_step() != Step::Capture => {
            return Some(UiCommand::Reset);
        }
        _ => {}
    }

    match state.current_step() {
        Step::Capture => match code {
            KeyCode::Char('c') => {
                state.info = "Capturing...".into();
                Some(UiCommand::CaptureCamera)
            }
            KeyCode::Char('u') | KeyCode::Enter => {
                state.focus = InputFocus::CapturePath;
                None
            }
            _ => None,
        },
        Step::EraSelection => match code {
            KeyCode::Up | KeyCode::Char('k') => {
                state.move_cursor(-1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                state.move_cursor(1);
                None
            }
            KeyCode::Char(d @ '1'..='9') => {
                let idx = d as usize - '1' as usize;
                if idx < eras::ERAS.len() {
                    state.era_cursor = idx;
                }
                None
            }
            KeyCode::Enter => state.selected_era().map(UiCommand::SelectEra),
            KeyCode::Char('b') => Some(UiCommand::Retake),
            _ => None,
        },
        Step::Processing => None,
        Step::Result => match code {
            KeyCode::Tab | KeyCode::Right => switch_tab(state, state.tab.next()),
            KeyCode::BackTab | KeyCode::Left => switch_tab(state, state.tab.prev()),
            KeyCode::Char('e') | KeyCode::Enter if state.tab == ResultTab::Edit => {
                if state.editing {
                    state.info = "An edit is already in progress".into();
                } else {
                    state.focus = InputFocus::EditPrompt;
                }
                None
            }
            KeyCode::Char('e') => {
                state.tab = ResultTab::Edit;
                state.focus = InputFocus::EditPrompt;
                None
            }
            KeyCode::Char('s') => Some(UiCommand::Save),
            KeyCode::Char('y') => {
                export::copy_saved_path(state);
                None
            }
            _ => None,
        },
    }
}

fn switch_tab(state: &mut UiState, tab: ResultTab) -> Option<UiCommand> {
    state.tab = tab;
    if tab == ResultTab::Analyze {
        return Some(UiCommand::Analyze);
    }
    None
}

fn handle_input_key(state: &mut UiState, code: KeyCode) -> Option<UiCommand> {
    let buf = match state.focus {
        InputFocus::CapturePath => &mut state.capture_input,
        InputFocus::EditPrompt => &mut state.edit_input,
        InputFocus::None => return None,
    };
    match code {
        KeyCode::Esc => {
            state.focus = InputFocus::None;
            None
        }
        KeyCode::Backspace => {
            buf.pop();
            None
        }
        KeyCode::Char(c) => {
            buf.push(c);
            None
        }
        KeyCode::Enter => {
            let text = buf.trim().to_string();
            if text.is_empty() {
                return None;
            }
            match state.focus {
                InputFocus::CapturePath => {
                    state.focus = InputFocus::None;
                    state.info = "Loading photo...".into();
                    Some(UiCommand::CaptureFile(PathBuf::from(text)))
                }
                InputFocus::EditPrompt if state.editing => {
                    state.info = "An edit is already in progress".into();
                    None
                }
                InputFocus::EditPrompt => {
                    state.focus = InputFocus::None;
                    Some(UiCommand::Edit(text))
                }
                InputFocus::None => None,
            }
        }
        _ => None,
    }
}

fn step_index(step: Step) -> usize {
    match step {
        Step::Capture => 0,
        Step::EraSelection | Step::Processing => 1,
        Step::Result => 2,
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, cfg: &SessionConfig) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);

    let steps = [Step::Capture, Step::EraSelection, Step::Result]
        .iter()
        .map(|s| Line::from(s.label()))
        .collect::<Vec<_>>();
    let tabs = Tabs::new(steps)
        .select(step_index(state.current_step()))
        .block(Block::default().borders(Borders::ALL).title("chronosnap"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.current_step() {
        Step::Capture => draw_capture(chunks[1], f, state),
        Step::EraSelection => draw_eras(chunks[1], f, state),
        Step::Processing => draw_processing(chunks[1], f, state),
        Step::Result => draw_result(chunks[1], f, state, cfg),
    }

    let status = Paragraph::new(Line::from(vec![
        Span::raw(state.info.clone()),
        Span::styled("   ? help  q quit", Style::default().fg(Color::DarkGray)),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, chunks[2]);

    if state.show_help {
        help::draw_help(centered(area, 70, 24), f);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

fn input_line(label: &'static str, value: &str, focused: bool) -> Line<'static> {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let cursor = if focused { "▏" } else { "" };
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Gray)),
        Span::styled(format!("{value}{cursor}"), style),
    ])
}

fn draw_capture(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines = vec![
        Line::from(Span::styled(
            "Strike a pose!",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("c", Style::default().fg(Color::Magenta)),
            Span::raw("  take a photo    "),
            Span::styled("u", Style::default().fg(Color::Magenta)),
            Span::raw("  upload a file"),
        ]),
        Line::from(""),
        input_line(
            "Photo path: ",
            &state.capture_input,
            state.focus == InputFocus::CapturePath,
        ),
    ];
    if let Some(notice) = state.capture_notice.as_deref() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            notice.to_string(),
            Style::default().fg(Color::Red),
        )));
    }
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("1. Snap"));
    f.render_widget(p, area);
}

fn draw_eras(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(area);

    let items = eras::ERAS
        .iter()
        .enumerate()
        .map(|(i, e)| ListItem::new(format!("{}. {}", i + 1, e.name)))
        .collect::<Vec<_>>();
    let title = match state.captured.as_ref() {
        Some(c) => format!("Choose your destination ({})", c.describe()),
        None => "Choose your destination".to_string(),
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    let mut list_state = ListState::default().with_selected(Some(state.era_cursor));
    f.render_stateful_widget(list, cols[0], &mut list_state);

    let detail = match state.selected_era() {
        Some(era) => vec![
            Line::from(Span::styled(
                era.name,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(era.description),
            Line::from(""),
            Line::from(Span::styled(era.preview_url, Style::default().fg(Color::DarkGray))),
            Line::from(""),
            Line::from(vec![
                Span::styled("Enter", Style::default().fg(Color::Magenta)),
                Span::raw(" travel   "),
                Span::styled("b", Style::default().fg(Color::Magenta)),
                Span::raw(" retake"),
            ]),
        ],
        None => vec![Line::from("No era selected")],
    };
    let p = Paragraph::new(detail)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("2. Select Time"));
    f.render_widget(p, cols[1]);
}

fn draw_processing(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let spinner = SPINNER[state.tick % SPINNER.len()];
    let dest = state.traveling_to.unwrap_or("another time");
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("{spinner} Traveling to {dest}..."),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Calibrating the temporal flux...",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let p = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Processing"));
    f.render_widget(p, area);
}

fn draw_result(area: Rect, f: &mut ratatui::Frame, state: &UiState, cfg: &SessionConfig) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
        .split(area);

    let label = Style::default().fg(Color::Gray);
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Era:      ", label),
            Span::styled(
                state.era.map(|e| e.name).unwrap_or("-"),
                Style::default().fg(Color::Cyan),
            ),
        ]),
        Line::from(vec![
            Span::styled("Result:   ", label),
            Span::raw(state.result.as_ref().map(|r| r.describe()).unwrap_or_default()),
        ]),
        Line::from(vec![
            Span::styled("Original: ", label),
            Span::raw(
                state
                    .original
                    .as_ref()
                    .map(|r| r.describe())
                    .unwrap_or_default(),
            ),
        ]),
    ];
    if let Some(path) = state.last_saved_path.as_ref() {
        lines.push(Line::from(vec![
            Span::styled("Saved:    ", label),
            Span::raw(path.display().to_string()),
        ]));
    }
    if !state.edits.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Edits:", label)));
        for (i, e) in state.edits.iter().enumerate() {
            lines.push(Line::from(format!("  {}. {e}", i + 1)));
        }
    }
    if state.editing {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{} Rewriting the timeline...", SPINNER[state.tick % SPINNER.len()]),
            Style::default().fg(Color::Yellow),
        )));
    }
    let summary = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("3. Experience"));
    f.render_widget(summary, cols[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(cols[1]);
    let tabs = Tabs::new(
        ResultTab::ALL
            .iter()
            .map(|t| Line::from(t.title()))
            .collect::<Vec<_>>(),
    )
    .select(state.tab.index())
    .block(Block::default().borders(Borders::ALL))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, right[0]);

    let body = match state.tab {
        ResultTab::View => vec![
            Line::from(format!(
                "Transport complete! Welcome to {}.",
                state.era.map(|e| e.name).unwrap_or("the past")
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("image model: {}", cfg.image_model),
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(Span::styled(
                format!("analysis model: {}", cfg.analysis_model),
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("s", Style::default().fg(Color::Magenta)),
                Span::raw(" save   "),
                Span::styled("y", Style::default().fg(Color::Magenta)),
                Span::raw(" copy path   "),
                Span::styled("r", Style::default().fg(Color::Magenta)),
                Span::raw(" start over"),
            ]),
        ],
        ResultTab::Edit => vec![
            Line::from("Describe a change, e.g. \"add a top hat\" or \"make it sepia\"."),
            Line::from(""),
            input_line(
                "Edit: ",
                &state.edit_input,
                state.focus == InputFocus::EditPrompt,
            ),
            Line::from(""),
            Line::from(Span::styled(
                if state.editing {
                    "Waiting for the current edit..."
                } else {
                    "Press e to type, Enter to apply"
                },
                Style::default().fg(Color::DarkGray),
            )),
        ],
        ResultTab::Analyze => match state.analysis.as_ref() {
            Some(a) if a.is_loading => vec![Line::from(Span::styled(
                format!("{} Scanning the particles...", SPINNER[state.tick % SPINNER.len()]),
                Style::default().fg(Color::Yellow),
            ))],
            Some(a) => a.text.lines().map(|l| Line::from(l.to_string())).collect(),
            None => vec![Line::from("Switch to this tab to analyze the image.")],
        },
    };
    let p = Paragraph::new(body)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(state.tab.title()));
    f.render_widget(p, right[1]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(state: &mut UiState, code: KeyCode) -> Option<UiCommand> {
        handle_key(state, KeyModifiers::NONE, code)
    }

    fn at(step: Step) -> UiState {
        UiState {
            step: Some(step),
            ..Default::default()
        }
    }

    #[test]
    fn upload_path_is_typed_then_sent() {
        let mut s = at(Step::Capture);
        assert!(press(&mut s, KeyCode::Char('u')).is_none());
        for c in "/tmp/me.png".chars() {
            assert!(press(&mut s, KeyCode::Char(c)).is_none());
        }
        match press(&mut s, KeyCode::Enter) {
            Some(UiCommand::CaptureFile(p)) => assert_eq!(p, PathBuf::from("/tmp/me.png")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.focus, InputFocus::None);
    }

    #[test]
    fn q_while_typing_is_text() {
        let mut s = at(Step::Capture);
        press(&mut s, KeyCode::Char('u'));
        assert!(press(&mut s, KeyCode::Char('q')).is_none());
        assert_eq!(s.capture_input, "q");
        assert!(matches!(
            handle_key(&mut s, KeyModifiers::CONTROL, KeyCode::Char('c')),
            Some(UiCommand::Quit)
        ));
    }

    #[test]
    fn era_keys_select_and_retake() {
        let mut s = at(Step::EraSelection);
        press(&mut s, KeyCode::Char('j'));
        match press(&mut s, KeyCode::Enter) {
            Some(UiCommand::SelectEra(e)) => assert_eq!(e.id, eras::ERAS[1].id),
            other => panic!("unexpected {other:?}"),
        }
        press(&mut s, KeyCode::Char('6'));
        assert_eq!(s.era_cursor, 5);
        assert!(matches!(press(&mut s, KeyCode::Char('b')), Some(UiCommand::Retake)));
    }

    #[test]
    fn processing_ignores_era_keys() {
        let mut s = at(Step::Processing);
        assert!(press(&mut s, KeyCode::Enter).is_none());
        assert!(matches!(press(&mut s, KeyCode::Char('r')), Some(UiCommand::Reset)));
    }

    #[test]
    fn analyze_tab_requests_analysis() {
        let mut s = at(Step::Result);
        assert!(press(&mut s, KeyCode::Tab).is_none());
        assert_eq!(s.tab, ResultTab::Edit);
        assert!(matches!(press(&mut s, KeyCode::Tab), Some(UiCommand::Analyze)));
    }

    #[test]
    fn edit_is_blocked_while_editing() {
        let mut s = at(Step::Result);
        press(&mut s, KeyCode::Char('e'));
        for c in "add a hat".chars() {
            press(&mut s, KeyCode::Char(c));
        }
        s.editing = true;
        assert!(press(&mut s, KeyCode::Enter).is_none());
        s.editing = false;
        match press(&mut s, KeyCode::Enter) {
            Some(UiCommand::Edit(text)) => assert_eq!(text, "add a hat"),
            other => panic!("unexpected {other:?}"),
        }
        // Kept until the edit is applied.
        assert_eq!(s.edit_input, "add a hat");
    }

    #[test]
    fn help_swallows_keys() {
        let mut s = at(Step::Result);
        press(&mut s, KeyCode::Char('?'));
        assert!(s.show_help);
        assert!(press(&mut s, KeyCode::Char('s')).is_none());
        press(&mut s, KeyCode::Esc);
        assert!(!s.show_help);
    }
}
