//! TUI rendering.
//!
//! ┌ 🔬 qkdlab  running  sim 3f2a…  t=12.0s  #12 ──────────────────┐
//! ├──────────────┬────────────────────────┬───────────────────────┤
//! │  Metrics     │  QBER (%)              │  Key rate (bits/s)    │
//! │  QBER 6.1%   │   ⣀⡠⠔⠒⠉⠉⠒⠢⢄           │   ⣀⣀⣀⣀⣀⣀⣀⣀           │
//! │  ...         ├────────────────────────┼───────────────────────┤
//! │  [security]  │  Photons  ▇▇ ▆▆        │  QBER vs time  ⠁⠂⠄     │
//! ├──────────────┴────────────────────────┴───────────────────────┤
//! │  ✓ Continuous simulation started                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │  s: start  x: stop  v: view  e: export  q: quit               │
//! └───────────────────────────────────────────────────────────────┘

use super::app::{App, ViewMode};
use qkdlab_core::controller::{
    KEY_RATE_CHART, PHOTONS_CHART, QBER_CHART, QBER_SCATTER_CHART, SECURITY_CHART,
};
use qkdlab_core::{
    ChartSnapshot, Level, PerQubitRecord, QubitFate, QubitView, SessionPhase, SessionView,
};
use ratatui::{prelude::*, widgets::*};

pub fn draw(f: &mut Frame, app: &App) {
    let view = app.view();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(12),   // main
            Constraint::Length(3), // notification
            Constraint::Length(1), // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app, &view);
    match app.view_mode() {
        ViewMode::Charts => draw_charts(f, rows[1], app, &view),
        ViewMode::Qubits => draw_qubits(f, rows[1], &view),
    }
    draw_notification(f, rows[2], app);
    draw_keys(f, rows[3]);
}

fn draw_title(f: &mut Frame, area: Rect, app: &App, view: &SessionView) {
    let phase_style = match view.phase {
        SessionPhase::Running => Style::default().bold().fg(Color::Green),
        SessionPhase::Idle => Style::default().fg(Color::DarkGray),
        SessionPhase::Starting | SessionPhase::Stopping => {
            Style::default().bold().fg(Color::Yellow)
        }
    };
    let sim = view
        .simulation_id
        .as_deref()
        .map(|id| id.chars().take(8).collect::<String>())
        .unwrap_or_else(|| "-".to_string());
    let elapsed = view.elapsed_time.unwrap_or(0.0);
    let failing = if view.consecutive_failures > 0 {
        format!("  ⚠ {} failed polls", view.consecutive_failures)
    } else {
        String::new()
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(" 🔬 qkdlab ", Style::default().bold().fg(Color::Cyan)),
            Span::styled(format!(" {} ", view.phase.as_str()), phase_style),
            Span::styled(
                format!(
                    " sim {sim}  t={elapsed:.1}s  #{}  {}{failing} ",
                    view.snapshots_applied,
                    app.engine_url()
                ),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    f.render_widget(block, area);
}

fn draw_charts(f: &mut Frame, area: Rect, app: &App, view: &SessionView) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(30),
            Constraint::Percentage(50),
            Constraint::Percentage(50),
        ])
        .split(area);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(3)])
        .split(cols[0]);
    draw_metrics(f, left[0], app, view);
    draw_security(f, left[1], view.charts.get(SECURITY_CHART));

    let mid = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(cols[1]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(cols[2]);

    draw_xy(f, mid[0], view.charts.get(QBER_CHART), GraphType::Line, Color::Cyan);
    draw_xy(
        f,
        right[0],
        view.charts.get(KEY_RATE_CHART),
        GraphType::Line,
        Color::Green,
    );
    draw_photons(f, mid[1], view.charts.get(PHOTONS_CHART));
    draw_xy(
        f,
        right[1],
        view.charts.get(QBER_SCATTER_CHART),
        GraphType::Scatter,
        Color::Magenta,
    );
}

fn draw_metrics(f: &mut Frame, area: Rect, app: &App, view: &SessionView) {
    let cfg = app.run_config();
    let mut lines = vec![
        Line::from(Span::styled("Channel", Style::default().bold())),
        Line::from(format!("  distance   {:.1}", cfg.distance)),
        Line::from(format!("  noise      {:.3}", cfg.channel_noise)),
        Line::from(format!("  eve        {}", cfg.eve_attack.as_str())),
        Line::from(format!("  rate       {:.0}/s", cfg.photon_rate)),
        Line::from(""),
    ];

    match &view.metrics {
        Some(m) => {
            let qber = m.qber.unwrap_or(0.0);
            let qber_style = if qber < 0.05 {
                Style::default().fg(Color::Green)
            } else if qber < 0.11 {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::Red)
            };
            lines.push(Line::from(vec![
                Span::styled("QBER ", Style::default().bold()),
                Span::styled(format!("{:.2}%", qber * 100.0), qber_style),
            ]));
            lines.push(Line::from(format!(
                "key rate   {:.1} b/s",
                m.key_generation_rate.unwrap_or(0.0)
            )));
            lines.push(Line::from(format!(
                "sent/recv  {}/{}",
                m.photons_sent.unwrap_or(0),
                m.photons_received.unwrap_or(0)
            )));
            if let Some(eff) = m.channel_efficiency {
                lines.push(Line::from(format!("efficiency {:.1}%", eff * 100.0)));
            }
            if let Some(fid) = m.quantum_fidelity {
                lines.push(Line::from(format!("fidelity   {fid:.3}")));
            }
            if let Some(level) = &m.security_level {
                lines.push(Line::from(format!("security   {level}")));
            }
        }
        None => lines.push(Line::from(Span::styled(
            "Press s to start a run",
            Style::default().fg(Color::DarkGray),
        ))),
    }

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Metrics "));
    f.render_widget(p, area);
}

fn draw_security(f: &mut Frame, area: Rect, chart: Option<&ChartSnapshot>) {
    let secure = chart
        .and_then(|c| c.values().first().copied())
        .unwrap_or(0.0)
        .clamp(0.0, 100.0);
    let color = if secure >= 50.0 {
        Color::Green
    } else if secure > 0.0 {
        Color::Yellow
    } else {
        Color::Red
    };
    let title = chart.map_or(" Security ".to_string(), |c| format!(" {} ", c.title));
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(color))
        .ratio(secure / 100.0)
        .label(format!("{secure:.0}% secure"));
    f.render_widget(gauge, area);
}

fn empty_panel(f: &mut Frame, area: Rect, title: &str) {
    let p = Paragraph::new("waiting for data")
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL).title(format!(" {title} ")));
    f.render_widget(p, area);
}

/// Axis bounds covering every point, or the chart's fixed y range.
fn bounds(chart: &ChartSnapshot) -> ([f64; 2], [f64; 2]) {
    let xs = chart.points.iter().map(|&(x, _)| x);
    let x_min = xs.clone().fold(f64::MAX, f64::min);
    let x_max = xs.fold(f64::MIN, f64::max).max(x_min + 1.0);
    let (y_min, y_max) = chart.y_bounds.unwrap_or_else(|| {
        let max = chart.values().into_iter().fold(0.0, f64::max);
        (0.0, (max * 1.1).max(1.0))
    });
    ([x_min, x_max], [y_min, y_max])
}

fn draw_xy(
    f: &mut Frame,
    area: Rect,
    chart: Option<&ChartSnapshot>,
    graph: GraphType,
    color: Color,
) {
    let Some(chart) = chart.filter(|c| !c.points.is_empty()) else {
        empty_panel(f, area, chart.map_or("chart", |c| c.title.as_str()));
        return;
    };
    let ([x_min, x_max], [y_min, y_max]) = bounds(chart);
    let latest = chart.values().last().copied().unwrap_or(0.0);

    let datasets = vec![
        Dataset::default()
            .name(format!("{latest:.2}"))
            .marker(symbols::Marker::Braille)
            .graph_type(graph)
            .style(Style::default().fg(color))
            .data(&chart.points),
    ];
    let widget = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", chart.title)),
        )
        .x_axis(Axis::default().bounds([x_min, x_max]).labels(vec![
            Line::from(format!("{x_min:.0}")),
            Line::from(format!("{x_max:.0}")),
        ]))
        .y_axis(Axis::default().bounds([y_min, y_max]).labels(vec![
            Line::from(format!("{y_min:.1}")),
            Line::from(format!("{y_max:.1}")),
        ]));
    f.render_widget(widget, area);
}

fn draw_photons(f: &mut Frame, area: Rect, chart: Option<&ChartSnapshot>) {
    let Some(chart) = chart.filter(|c| !c.points.is_empty()) else {
        empty_panel(f, area, "Photons");
        return;
    };
    let values = chart.values();
    let bars: Vec<Bar> = chart
        .labels
        .iter()
        .zip(&values)
        .map(|(label, &v)| {
            Bar::default()
                .label(Line::from(label.clone()))
                .value(v.max(0.0) as u64)
        })
        .collect();
    let widget = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", chart.title)),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(9)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Yellow))
        .value_style(Style::default().fg(Color::Black).bg(Color::Yellow));
    f.render_widget(widget, area);
}

fn fate_style(fate: QubitFate) -> Style {
    match fate {
        QubitFate::Sifted => Style::default().fg(Color::Green),
        QubitFate::ChannelError => Style::default().fg(Color::Yellow),
        QubitFate::Intercepted => Style::default().fg(Color::Red).bold(),
        QubitFate::Discarded => Style::default().fg(Color::DarkGray),
        QubitFate::Lost => Style::default().fg(Color::DarkGray).italic(),
    }
}

/// One column per qubit: Alice bit/basis, Bob bit/basis, Eve basis.
fn qubit_strip(records: &[PerQubitRecord]) -> Vec<Line<'static>> {
    let row = |label: &'static str, cell: &dyn Fn(&PerQubitRecord) -> char| {
        let mut spans = vec![Span::styled(label, Style::default().bold())];
        spans.extend(
            records
                .iter()
                .map(|r| Span::styled(format!("{} ", cell(r)), fate_style(r.fate()))),
        );
        Line::from(spans)
    };
    vec![
        row("Alice bit  ", &|r: &PerQubitRecord| r.alice_bit.symbol()),
        row("Alice base ", &|r: &PerQubitRecord| r.alice_base.symbol()),
        row("Bob bit    ", &|r: &PerQubitRecord| r.bob_bit.map_or('?', |b| b.symbol())),
        row("Bob base   ", &|r: &PerQubitRecord| r.bob_base.symbol()),
        row("Eve base   ", &|r: &PerQubitRecord| r.eve_base.map_or('-', |b| b.symbol())),
    ]
}

fn draw_qubits(f: &mut Frame, area: Rect, view: &SessionView) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Latest qubit batch ");
    let lines = match &view.qubits {
        Some(QubitView::Records(normalized)) => {
            let sifted = normalized.records.iter().filter(|r| r.is_sifted()).count();
            let mut lines = vec![
                Line::from(Span::styled(
                    format!(
                        "{} qubits ({:?} shape), {sifted} sifted",
                        normalized.records.len(),
                        normalized.shape
                    ),
                    Style::default().fg(Color::DarkGray),
                )),
                Line::from(""),
            ];
            lines.extend(qubit_strip(&normalized.records));
            lines.push(Line::from(""));
            lines.push(Line::from(vec![
                Span::styled("sifted ", fate_style(QubitFate::Sifted)),
                Span::styled("error ", fate_style(QubitFate::ChannelError)),
                Span::styled("eve ", fate_style(QubitFate::Intercepted)),
                Span::styled("discarded ", fate_style(QubitFate::Discarded)),
                Span::styled("lost", fate_style(QubitFate::Lost)),
            ]));
            lines
        }
        Some(QubitView::Degraded(fields)) => {
            let mut lines = vec![Line::from(Span::styled(
                "Per-qubit detail failed validation; raw fields:",
                Style::default().fg(Color::Yellow),
            ))];
            lines.extend(
                fields
                    .iter()
                    .map(|(name, value)| Line::from(format!("  {name:<18} {value}"))),
            );
            lines
        }
        None => vec![Line::from(Span::styled(
            "No qubit data yet",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    let p = Paragraph::new(lines).wrap(Wrap { trim: false }).block(block);
    f.render_widget(p, area);
}

fn draw_notification(f: &mut Frame, area: Rect, app: &App) {
    let (text, style) = match app.notification() {
        Some(n) => {
            let (icon, color) = match n.level {
                Level::Info => ("ℹ", Color::Cyan),
                Level::Success => ("✓", Color::Green),
                Level::Warning => ("⚠", Color::Yellow),
                Level::Error => ("✗", Color::Red),
            };
            (format!("{icon} {}", n.message), Style::default().fg(color))
        }
        None => match app.last_export() {
            Some(path) => (
                format!("last export: {}", path.display()),
                Style::default().fg(Color::DarkGray),
            ),
            None => (String::new(), Style::default()),
        },
    };
    let p = Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(" Status "));
    f.render_widget(p, area);
}

fn draw_keys(f: &mut Frame, area: Rect) {
    let bar = Paragraph::new(" s: start   x: stop   v: charts/qubits   e: export JSON   q: quit")
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}
