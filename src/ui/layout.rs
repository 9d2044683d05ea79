use crate::app::{App, AppView, Panel};
use crate::settings::SettingsField;
use crate::speedtest::rating::{label, BEST_SCORE};
use crate::speedtest::TestPhase;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

const ACCENT: Color = Color::Rgb(100, 149, 237);
const DOWNLINK: Color = Color::Rgb(134, 194, 156);
const DOWNLINK_DIM: Color = Color::Rgb(80, 120, 90);
const UPLINK: Color = Color::Rgb(147, 180, 220);
const UPLINK_DIM: Color = Color::Rgb(90, 110, 140);
const LATENCY: Color = Color::Rgb(220, 180, 130);
const POOR: Color = Color::Rgb(210, 120, 120);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let area = frame.area();

    match app.view {
        AppView::Main => draw_main_view(frame, area, app),
        AppView::Settings => draw_settings_view(frame, area, app),
    }
}

fn draw_main_view(frame: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .split(area);

    draw_header(frame, rows[0], app);

    let panels = Layout::horizontal([Constraint::Ratio(1, 3); 3]).split(rows[1]);

    draw_throughput_panel(
        frame,
        panels[0],
        app,
        ThroughputView {
            title: "Download",
            color: DOWNLINK,
            dim_color: DOWNLINK_DIM,
            selected: app.selected_panel == Panel::Download,
            final_mbps: app.result.download_mbps,
            samples: &app.download_samples,
            bytes: app.download_bytes,
            progress: phase_progress(app, TestPhase::Download, app.download_progress),
        },
    );
    draw_throughput_panel(
        frame,
        panels[1],
        app,
        ThroughputView {
            title: "Upload",
            color: UPLINK,
            dim_color: UPLINK_DIM,
            selected: app.selected_panel == Panel::Upload,
            final_mbps: app.result.upload_mbps,
            samples: &app.upload_samples,
            bytes: app.upload_bytes,
            progress: phase_progress(app, TestPhase::Upload, app.upload_progress),
        },
    );
    draw_latency_panel(frame, panels[2], app, app.selected_panel == Panel::Ping);

    draw_ratings(frame, rows[2], app);
    draw_help(frame, rows[3], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let columns = Layout::horizontal([
        Constraint::Length(12),
        Constraint::Min(10),
        Constraint::Length(20),
    ])
    .split(inner);

    frame.render_widget(
        Paragraph::new("linkgauge").style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        columns[0],
    );

    let (status, color) = match app.phase {
        TestPhase::Idle => ("Ready", TEXT_MUTED),
        TestPhase::Download => ("Saturating downlink...", DOWNLINK),
        TestPhase::Upload => ("Saturating uplink...", UPLINK),
        TestPhase::Ping => ("Measuring latency...", LATENCY),
        TestPhase::Complete => ("Complete", ACCENT),
    };
    frame.render_widget(
        Paragraph::new(status)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center),
        columns[1],
    );

    frame.render_widget(
        Paragraph::new(phase_trail(app.phase)).alignment(Alignment::Right),
        columns[2],
    );
}

/// "down / up / ping" with finished phases dimmed and the running one lit.
fn phase_trail(current: TestPhase) -> Line<'static> {
    const ORDER: [(TestPhase, &str); 3] = [
        (TestPhase::Download, "down"),
        (TestPhase::Upload, "up"),
        (TestPhase::Ping, "ping"),
    ];

    let current_index = match current {
        TestPhase::Idle => None,
        TestPhase::Complete => Some(ORDER.len()),
        running => ORDER.iter().position(|(phase, _)| *phase == running),
    };

    let mut spans = Vec::new();
    for (i, (_, name)) in ORDER.iter().enumerate() {
        let style = match current_index {
            Some(at) if at == i => Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            Some(at) if i < at => Style::default().fg(TEXT_SECONDARY),
            _ => Style::default().fg(TEXT_MUTED),
        };
        if i > 0 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
        spans.push(Span::styled(*name, style));
    }

    Line::from(spans)
}

struct ThroughputView<'a> {
    title: &'static str,
    color: Color,
    dim_color: Color,
    selected: bool,
    final_mbps: f64,
    samples: &'a [f64],
    bytes: u64,
    progress: f64,
}

fn draw_throughput_panel(frame: &mut Frame, area: Rect, app: &App, view: ThroughputView<'_>) {
    let block = panel_block(view.title, view.color, view.selected);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    // Final figure once known, the live cumulative average before that.
    let speed = if view.final_mbps > 0.0 {
        view.final_mbps
    } else {
        view.samples.last().copied().unwrap_or(0.0)
    };
    frame.render_widget(
        Paragraph::new(format_speed(speed))
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        rows[0],
    );

    let detail = if view.bytes > 0 {
        format!(
            "{} in {:.1} of {} s",
            format_bytes(view.bytes),
            view.progress * app.settings.phase_budget.as_secs_f64(),
            app.settings.budget_secs()
        )
    } else {
        format!("{} streams · {} s budget", app.settings.streams, app.settings.budget_secs())
    };
    frame.render_widget(
        Paragraph::new(detail)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        rows[1],
    );

    draw_progress_bar(frame, rows[2], view.progress, view.color, view.dim_color);
    draw_sparkline(frame, rows[3], view.samples, view.color);
}

fn draw_latency_panel(frame: &mut Frame, area: Rect, app: &App, selected: bool) {
    let block = panel_block("Latency", LATENCY, selected);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    let ping = if app.result.ping_ms > 0.0 {
        app.result.ping_ms
    } else {
        app.ping_samples.last().copied().unwrap_or(0.0)
    };
    let value = if ping > 0.0 { format!("{:.0} ms", ping) } else { "—".to_string() };
    frame.render_widget(
        Paragraph::new(value)
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        rows[0],
    );

    let detail = match (app.phase, app.result.jitter_ms > 0.0) {
        (_, true) => format!("jitter {:.1} ms", app.result.jitter_ms),
        (TestPhase::Ping, false) => format!("{} of {} samples", app.ping_samples.len(), app.settings.ping_count),
        _ => format!("{} samples", app.settings.ping_count),
    };
    frame.render_widget(
        Paragraph::new(detail)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        rows[1],
    );

    draw_sparkline(frame, rows[2], &app.ping_samples, LATENCY);
}

fn panel_block(title: &str, color: Color, selected: bool) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if selected { BORDER_ACTIVE } else { BORDER }))
        .title(Span::styled(
            format!(" {} ", title),
            Style::default().fg(if selected { color } else { TEXT_SECONDARY }),
        ))
}

fn draw_ratings(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(" Suitability ", Style::default().fg(TEXT_SECONDARY)));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.phase != TestPhase::Complete {
        frame.render_widget(
            Paragraph::new("ratings appear when the test completes")
                .style(Style::default().fg(TEXT_MUTED))
                .alignment(Alignment::Center),
            inner,
        );
        return;
    }

    let columns = Layout::horizontal([Constraint::Ratio(1, 4); 4]).split(inner);
    for ((activity, score), column) in app.result.ratings.entries().iter().zip(columns.iter()) {
        let line = Line::from(vec![
            Span::styled(format!("{} ", activity), Style::default().fg(TEXT_SECONDARY)),
            Span::styled(score_dots(*score), Style::default().fg(score_color(*score))),
            Span::styled(format!(" {}", label(*score)), Style::default().fg(TEXT_MUTED)),
        ]);
        frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), *column);
    }
}

fn draw_progress_bar(frame: &mut Frame, area: Rect, ratio: f64, color: Color, dim_color: Color) {
    if area.width < 4 {
        return;
    }

    let width = (area.width - 2) as usize;
    let filled = ((ratio.clamp(0.0, 1.0) * width as f64) as usize).min(width);

    let bar = Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), Style::default().fg(color)),
        Span::styled("━".repeat(width - filled), Style::default().fg(dim_color)),
        Span::raw(" "),
    ]);

    frame.render_widget(Paragraph::new(bar), area);
}

fn draw_sparkline(frame: &mut Frame, area: Rect, data: &[f64], color: Color) {
    if data.is_empty() || area.width < 4 || area.height < 2 {
        return;
    }

    let max_val = data.iter().copied().fold(0.0, f64::max);
    let points: Vec<(f64, f64)> = data.iter().enumerate().map(|(i, &v)| (i as f64, v)).collect();

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&points);

    // Cumulative averages start near zero, so anchor the axis there.
    let chart = Chart::new(vec![dataset])
        .x_axis(Axis::default().bounds([0.0, data.len() as f64]))
        .y_axis(Axis::default().bounds([0.0, (max_val * 1.1).max(1.0)]));

    frame.render_widget(chart, area);
}

fn draw_settings_view(frame: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(10),
        Constraint::Length(1),
    ])
    .split(area);

    let header_block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));
    let header_inner = header_block.inner(rows[0]);
    frame.render_widget(header_block, rows[0]);
    frame.render_widget(
        Paragraph::new("Settings").style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        header_inner,
    );

    let content_area = Layout::horizontal([
        Constraint::Length(2),
        Constraint::Min(30),
        Constraint::Length(2),
    ])
    .split(rows[1])[1];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER));
    let inner = block.inner(content_area);
    frame.render_widget(block, content_area);

    let fields = [
        (SettingsField::PhaseBudget, "Phase duration", format!("{} s", app.settings.budget_secs())),
        (SettingsField::Streams, "Parallel streams", app.settings.streams.to_string()),
        (SettingsField::PingCount, "Ping samples", app.settings.ping_count.to_string()),
    ];
    let field_rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .split(inner);

    for ((field, name, value), row) in fields.iter().zip(field_rows.iter()) {
        draw_setting_row(frame, *row, name, value, app.selected_setting == *field);
    }

    frame.render_widget(
        Paragraph::new("↑↓ select · ←→ adjust · enter done")
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        rows[2],
    );
}

fn draw_setting_row(frame: &mut Frame, area: Rect, name: &str, value: &str, selected: bool) {
    let columns = Layout::horizontal([Constraint::Length(18), Constraint::Min(10)]).split(area);

    let (name_style, value_style, value_text) = if selected {
        (
            Style::default().fg(ACCENT),
            Style::default().fg(TEXT_PRIMARY),
            format!("< {} >", value),
        )
    } else {
        (
            Style::default().fg(TEXT_SECONDARY),
            Style::default().fg(TEXT_MUTED),
            value.to_string(),
        )
    };

    frame.render_widget(Paragraph::new(format!(" {}", name)).style(name_style), columns[0]);
    frame.render_widget(Paragraph::new(value_text).style(value_style), columns[1]);
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = if app.phase.is_running() {
        "tab select · esc cancel · q quit"
    } else {
        "enter start · s settings · tab select · q quit"
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

fn phase_progress(app: &App, phase: TestPhase, live: f64) -> f64 {
    let rank = |p: TestPhase| match p {
        TestPhase::Idle => 0,
        TestPhase::Download => 1,
        TestPhase::Upload => 2,
        TestPhase::Ping => 3,
        TestPhase::Complete => 4,
    };

    match rank(app.phase).cmp(&rank(phase)) {
        std::cmp::Ordering::Less => 0.0,
        std::cmp::Ordering::Equal => live,
        std::cmp::Ordering::Greater => 1.0,
    }
}

fn score_dots(score: u8) -> String {
    let filled = score.min(BEST_SCORE) as usize;
    format!("{}{}", "●".repeat(filled), "○".repeat(BEST_SCORE as usize - filled))
}

fn score_color(score: u8) -> Color {
    match score {
        0..=2 => POOR,
        3 => LATENCY,
        _ => DOWNLINK,
    }
}

fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else if mbps >= 1.0 {
        format!("{:.2} Mbps", mbps)
    } else if mbps > 0.0 {
        format!("{:.0} Kbps", mbps * 1000.0)
    } else {
        "—".to_string()
    }
}

fn format_bytes(bytes: u64) -> String {
    const MB: f64 = 1_000_000.0;
    let bytes = bytes as f64;
    if bytes >= 1000.0 * MB {
        format!("{:.2} GB", bytes / (1000.0 * MB))
    } else {
        format!("{:.1} MB", bytes / MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use ratatui::{backend::TestBackend, Terminal};

    #[test]
    fn speed_units() {
        assert_eq!(format_speed(0.0), "—");
        assert_eq!(format_speed(0.25), "250 Kbps");
        assert_eq!(format_speed(10.0), "10.00 Mbps");
        assert_eq!(format_speed(1500.0), "1.50 Gbps");
    }

    #[test]
    fn dots_fill_by_score() {
        assert_eq!(score_dots(1), "●○○○○");
        assert_eq!(score_dots(5), "●●●●●");
    }

    #[test]
    fn progress_follows_phase_order() {
        let mut app = App::new(Settings::default());
        app.phase = TestPhase::Upload;
        assert_eq!(phase_progress(&app, TestPhase::Download, 0.3), 1.0);
        assert_eq!(phase_progress(&app, TestPhase::Upload, 0.3), 0.3);
        app.phase = TestPhase::Download;
        assert_eq!(phase_progress(&app, TestPhase::Upload, 0.3), 0.0);
    }

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| draw_ui(frame, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn completed_run_shows_ratings() {
        let mut app = App::new(Settings::default());
        app.result.download_mbps = 10.0;
        app.result.ratings = crate::speedtest::rating::Ratings::derive(10.0, 2.0, 40.0);
        app.phase = TestPhase::Complete;

        let screen = render(&app);
        assert!(screen.contains("10.00 Mbps"));
        assert!(screen.contains("Excellent"));
        assert!(screen.contains("Suitability"));
    }

    #[test]
    fn settings_screen_lists_fields() {
        let mut app = App::new(Settings::default());
        app.view = AppView::Settings;

        let screen = render(&app);
        assert!(screen.contains("Phase duration"));
        assert!(screen.contains("< 8 s >"));
        assert!(screen.contains("Parallel streams"));
    }
}
