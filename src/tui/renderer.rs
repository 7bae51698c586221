//! TUI rendering logic using ratatui.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame,
};

use super::state::{ErrorInfo, TuiState};
use crate::progress::Phase;
use crate::rating::QualityScore;
use crate::results::SpeedTestResult;

/// Rows of history shown under the results.
pub const HISTORY_ROWS: usize = 5;

/// Get color for speed value based on thresholds.
///
/// - Green: >= 100 Mbps (fast)
/// - Yellow: 25-100 Mbps (moderate)
/// - Red: < 25 Mbps (slow)
pub fn speed_color(speed_mbps: f64) -> Color {
    if speed_mbps >= 100.0 {
        Color::Green
    } else if speed_mbps >= 25.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn score_color(score: QualityScore) -> Color {
    match score {
        QualityScore::Poor => Color::Red,
        QualityScore::Average => Color::Yellow,
        QualityScore::Good => Color::Cyan,
        QualityScore::Great => Color::Green,
    }
}

/// Speeds carry one decimal.
pub fn format_speed(speed_mbps: f64, unit: &str) -> String {
    format!("{:.1} {}", speed_mbps, unit)
}

/// Ping is shown in whole milliseconds, jitter with one decimal.
pub fn format_latency(latency_ms: f64, decimals: usize, unit: &str) -> String {
    format!("{:.*} {}", decimals, latency_ms, unit)
}

/// Minimal mode threshold in columns.
const MINIMAL_MODE_THRESHOLD: u16 = 60;

pub fn is_minimal_mode(width: u16) -> bool {
    width < MINIMAL_MODE_THRESHOLD
}

/// Render one frame, picking the layout from the terminal width.
pub fn render_frame(frame: &mut Frame, state: &TuiState) {
    if is_minimal_mode(frame.area().width) {
        render_minimal_frame(frame, state);
    } else {
        render_normal_frame(frame, state);
    }
}

fn render_normal_frame(frame: &mut Frame, state: &TuiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Phase
            Constraint::Length(3), // Speed gauge
            Constraint::Length(2), // Phase progress
            Constraint::Length(5), // Figures and rating
            Constraint::Min(2),    // History
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_phase_indicator(frame, chunks[0], state);
    render_speed_gauge(frame, chunks[1], state);
    render_phase_progress(frame, chunks[2], state);
    if let Some(ref error) = state.error {
        render_error(frame, chunks[3], error);
    } else {
        render_figures(frame, chunks[3], state);
    }
    render_history(frame, chunks[4], state);
    render_status_bar(frame, chunks[5], state);
}

fn render_minimal_frame(frame: &mut Frame, state: &TuiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Phase + speed
            Constraint::Length(1), // Gauge
            Constraint::Min(1),    // Figures
        ])
        .split(frame.area());

    let labels = &state.labels;
    let speed = state.snapshot.display_speed;
    let line = Line::from(vec![
        Span::styled(
            format!("{} ", labels.phase(state.phase())),
            phase_style(state.phase()),
        ),
        Span::styled(
            format_speed(speed, &labels.speed_unit),
            Style::default().fg(speed_color(speed)),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), chunks[0]);

    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(speed_color(speed)))
        .ratio(state.gauge_position())
        .label("");
    frame.render_widget(gauge, chunks[1]);

    if let Some(ref error) = state.error {
        let paragraph = Paragraph::new(error.message.as_str())
            .style(Style::default().fg(Color::Red));
        frame.render_widget(paragraph, chunks[2]);
        return;
    }

    let snapshot = &state.snapshot;
    let text = format!(
        "↓ {}  ↑ {}  {}",
        format_speed(snapshot.download_speed, &labels.speed_unit),
        format_speed(snapshot.upload_speed, &labels.speed_unit),
        format_latency(snapshot.ping, 0, &labels.latency_unit),
    );
    frame.render_widget(Paragraph::new(text), chunks[2]);
}

fn phase_style(phase: Phase) -> Style {
    let color = match phase {
        Phase::Idle => Color::DarkGray,
        Phase::Complete => Color::Green,
        Phase::Ping | Phase::Download | Phase::Upload => Color::Yellow,
    };

    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

pub fn render_phase_indicator(
    frame: &mut Frame,
    area: Rect,
    state: &TuiState,
) {
    let phase = state.phase();
    let marker = match phase {
        Phase::Idle => "○",
        Phase::Ping | Phase::Download | Phase::Upload => "▶",
        Phase::Complete => "✓",
    };

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let text = format!("{} {}", marker, state.labels.phase(phase));
    frame.render_widget(Paragraph::new(text).style(phase_style(phase)), inner);
}

/// The eased speed on the logarithmic scale.
pub fn render_speed_gauge(frame: &mut Frame, area: Rect, state: &TuiState) {
    let speed = state.snapshot.display_speed;

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::NONE))
        .gauge_style(Style::default().fg(speed_color(speed)))
        .ratio(state.gauge_position())
        .label(Span::styled(
            format_speed(speed, &state.labels.speed_unit),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    frame.render_widget(gauge, area);
}

fn render_phase_progress(frame: &mut Frame, area: Rect, state: &TuiState) {
    let label = match (state.phase(), state.last_probe) {
        (Phase::Ping, Some((value_ms, current, total))) => format!(
            "{} {}/{}: {}",
            state.labels.ping,
            current,
            total,
            format_latency(value_ms, 0, &state.labels.latency_unit)
        ),
        _ => format!("{}%", state.snapshot.progress.round() as u16),
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::BOTTOM))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(state.progress_ratio())
        .label(label);
    frame.render_widget(gauge, area);
}

fn figure(name: &str, value: String, color: Color) -> Vec<Span<'static>> {
    vec![
        Span::styled(
            format!("{}: ", name),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled(value, Style::default().fg(color)),
    ]
}

/// Ping, jitter, download and upload, plus the rating once complete.
pub fn render_figures(frame: &mut Frame, area: Rect, state: &TuiState) {
    let labels = &state.labels;
    let snapshot = &state.snapshot;

    let mut latency = figure(
        &labels.ping,
        format_latency(snapshot.ping, 0, &labels.latency_unit),
        Color::Cyan,
    );
    latency.push(Span::raw("  "));
    latency.extend(figure(
        &labels.jitter,
        format_latency(snapshot.jitter, 1, &labels.latency_unit),
        Color::Cyan,
    ));

    let mut lines = vec![
        Line::from(latency),
        Line::from(figure(
            &labels.download,
            format_speed(snapshot.download_speed, &labels.speed_unit),
            speed_color(snapshot.download_speed),
        )),
        Line::from(figure(
            &labels.upload,
            format_speed(snapshot.upload_speed, &labels.speed_unit),
            speed_color(snapshot.upload_speed),
        )),
    ];

    if let (Phase::Complete, Some(rating)) = (state.phase(), state.rating) {
        let mut spans = figure(
            &labels.rating,
            labels.score(rating.overall).to_string(),
            score_color(rating.overall),
        );
        for (name, score) in [
            (&labels.streaming, rating.streaming),
            (&labels.gaming, rating.gaming),
            (&labels.video_conferencing, rating.video_conferencing),
        ] {
            spans.push(Span::styled(
                format!("  {} {}", name, labels.score(score)),
                Style::default().fg(score_color(score)),
            ));
        }
        lines.push(Line::from(spans));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

fn history_line(state: &TuiState, result: &SpeedTestResult) -> Line<'static> {
    let labels = &state.labels;

    Line::from(vec![
        Span::styled(
            result.timestamp.format("%Y-%m-%d %H:%M  ").to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!(
                "↓ {:>10}",
                format_speed(result.download_speed_mbps, &labels.speed_unit)
            ),
            Style::default().fg(speed_color(result.download_speed_mbps)),
        ),
        Span::styled(
            format!(
                "  ↑ {:>10}",
                format_speed(result.upload_speed_mbps, &labels.speed_unit)
            ),
            Style::default().fg(speed_color(result.upload_speed_mbps)),
        ),
        Span::raw(format!(
            "  {}",
            format_latency(result.ping_ms, 0, &labels.latency_unit)
        )),
    ])
}

pub fn render_history(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(state.labels.history.as_str());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = state
        .snapshot
        .history
        .iter()
        .take(HISTORY_ROWS)
        .map(|result| history_line(state, result))
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

pub fn render_status_bar(frame: &mut Frame, area: Rect, state: &TuiState) {
    let (text, color) = if state.snapshot.copied {
        (state.labels.copied.clone(), Color::Green)
    } else if state.shared {
        (state.labels.shared.clone(), Color::Green)
    } else if state.phase().is_running() {
        ("esc stop  q quit".to_string(), Color::DarkGray)
    } else {
        ("r run  s share  c clear  q quit".to_string(), Color::DarkGray)
    };

    let paragraph = Paragraph::new(text).style(Style::default().fg(color));
    frame.render_widget(paragraph, area);
}

fn render_error(frame: &mut Frame, area: Rect, error: &ErrorInfo) {
    let mut lines = vec![Line::from(Span::styled(
        format!("Error: {}", error.message),
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    ))];

    if let Some(ref suggestion) = error.suggestion {
        lines.push(Line::from(Span::styled(
            format!("Suggestion: {}", suggestion),
            Style::default().fg(Color::Yellow),
        )));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Labels;
    use crate::rating::rate;
    use proptest::prelude::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn render_to_string(state: &TuiState, width: u16, height: u16) -> String {
        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).unwrap();

        terminal.draw(|frame| render_frame(frame, state)).unwrap();

        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer.cell((x, y)).unwrap().symbol());
            }
            text.push('\n');
        }
        text
    }

    fn complete_state() -> TuiState {
        let result = SpeedTestResult::new(250.0, 40.0, 18.0, 1.4);
        let mut state = TuiState::default();
        state.snapshot.phase = Phase::Complete;
        state.snapshot.progress = 100.0;
        state.snapshot.ping = result.ping_ms;
        state.snapshot.jitter = result.jitter_ms;
        state.snapshot.download_speed = result.download_speed_mbps;
        state.snapshot.upload_speed = result.upload_speed_mbps;
        state.rating = Some(rate(&result));
        state.snapshot.history = vec![result];
        state
    }

    #[test]
    fn test_complete_frame_shows_figures_and_rating() {
        let rendered = render_to_string(&complete_state(), 80, 20);

        assert!(rendered.contains("Complete"), "{}", rendered);
        assert!(rendered.contains("Download: 250.0 Mbps"), "{}", rendered);
        assert!(rendered.contains("Upload: 40.0 Mbps"), "{}", rendered);
        assert!(rendered.contains("Ping: 18 ms"), "{}", rendered);
        assert!(rendered.contains("Jitter: 1.4 ms"), "{}", rendered);
        assert!(rendered.contains("Rating: Great"), "{}", rendered);
        assert!(rendered.contains("History"), "{}", rendered);
    }

    #[test]
    fn test_running_frame_shows_live_speed() {
        let mut state = TuiState::default();
        state.snapshot.phase = Phase::Download;
        state.snapshot.progress = 40.0;
        state.snapshot.display_speed = 87.3;

        let rendered = render_to_string(&state, 80, 20);

        assert!(rendered.contains("▶ Download"), "{}", rendered);
        assert!(rendered.contains("87.3 Mbps"), "{}", rendered);
        assert!(rendered.contains("40%"), "{}", rendered);
        assert!(rendered.contains("esc stop  q quit"), "{}", rendered);
        assert!(!rendered.contains("Rating"), "{}", rendered);
    }

    #[test]
    fn test_ping_progress_shows_last_probe() {
        let mut state = TuiState::default();
        state.snapshot.phase = Phase::Ping;
        state.last_probe = Some((23.4, 7, 20));

        let rendered = render_to_string(&state, 80, 20);

        assert!(rendered.contains("Ping 7/20: 23 ms"), "{}", rendered);
    }

    #[test]
    fn test_labels_replace_words() {
        let mut state = complete_state();
        state.labels = Labels {
            download: "Herunterladen".into(),
            complete: "Fertig".into(),
            ..Labels::default()
        };

        let rendered = render_to_string(&state, 80, 20);

        assert!(rendered.contains("Herunterladen: 250.0"), "{}", rendered);
        assert!(rendered.contains("Fertig"), "{}", rendered);
    }

    #[test]
    fn test_copied_flag_in_status_bar() {
        let mut state = complete_state();
        state.snapshot.copied = true;

        let rendered = render_to_string(&state, 80, 20);

        assert!(rendered.contains("Copied to clipboard"), "{}", rendered);
    }

    #[test]
    fn test_error_replaces_figures() {
        let mut state = TuiState::default();
        state.error = Some(ErrorInfo {
            message: "echo service returned 503".into(),
            suggestion: Some("Try again later.".into()),
        });

        let rendered = render_to_string(&state, 80, 20);

        assert!(rendered.contains("Error: echo service returned 503"));
        assert!(rendered.contains("Suggestion: Try again later."));
    }

    #[test]
    fn test_minimal_frame() {
        let rendered = render_to_string(&complete_state(), 40, 4);

        assert!(rendered.contains("↓ 250.0 Mbps"), "{}", rendered);
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(21.6, 0, "ms"), "22 ms");
        assert_eq!(format_latency(1.24, 1, "ms"), "1.2 ms");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn speed_color_matches_thresholds(speed in 0.0f64..5000.0) {
            let expected = if speed >= 100.0 {
                Color::Green
            } else if speed >= 25.0 {
                Color::Yellow
            } else {
                Color::Red
            };
            prop_assert_eq!(speed_color(speed), expected);
        }

        #[test]
        fn minimal_mode_below_sixty_columns(width in 0u16..200) {
            prop_assert_eq!(is_minimal_mode(width), width < 60);
        }
    }
}
