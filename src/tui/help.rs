use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

fn key_line(keys: &[&'static str], action: &'static str) -> Line<'static> {
    let mut spans = vec![Span::raw("  ")];
    let mut width = 0;
    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" / "));
            width += 3;
        }
        spans.push(Span::styled(*k, Style::default().fg(Color::Magenta)));
        width += k.chars().count();
    }
    spans.push(Span::raw(" ".repeat(14usize.saturating_sub(width))));
    spans.push(Span::raw(action));
    Line::from(spans)
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line(&["q", "Ctrl-C"], "Quit"),
        key_line(&["?"], "Toggle this help"),
        Line::from(""),
        Line::from("1. Snap:"),
        key_line(&["c"], "Take a photo with the camera"),
        key_line(&["u"], "Type a file path to upload (Enter to send, Esc to cancel)"),
        Line::from(""),
        Line::from("2. Select Time:"),
        key_line(&["↑/↓", "j/k"], "Choose an era"),
        key_line(&["1-6"], "Jump to an era"),
        key_line(&["Enter"], "Travel"),
        key_line(&["b"], "Retake photo"),
        Line::from(""),
        Line::from("3. Experience:"),
        key_line(&["tab", "←/→"], "Switch View / Edit / Analyze"),
        key_line(&["e"], "Write an edit (Enter to apply, Esc to cancel)"),
        key_line(&["s"], "Save image"),
        key_line(&["y"], "Copy saved path to clipboard"),
        key_line(&["r"], "Start over"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
