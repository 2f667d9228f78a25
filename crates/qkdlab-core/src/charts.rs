//! Metric/chart registry.
//!
//! Maps logical series names to renderable charts and guarantees that at
//! most one live chart is bound to a given drawing surface. Surfaces come
//! and go with the view (a dashboard tab is torn down, a pane is hidden);
//! the [`SurfaceBoard`] tracks which ones currently exist and who holds
//! them.
//!
//! Binding an already-bound surface is an error in every charting backend,
//! so the registry checks before it binds and never attempts it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

/// Updates at or above this rate are redrawn without animation.
pub const HIGH_FREQUENCY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("surface {0:?} is not mounted")]
    SurfaceMissing(String),

    #[error("surface {0:?} is already bound to a chart")]
    SurfaceBusy(String),

    #[error("no chart registered under {0:?}")]
    UnknownChart(String),
}

// ---------------------------------------------------------------------------
// Surfaces
// ---------------------------------------------------------------------------

/// Proof that a chart holds a surface. Only valid while the surface stays
/// mounted and the binding has not been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingToken(u64);

#[derive(Debug, Default)]
struct SurfaceSlot {
    bound: Option<BindingToken>,
}

/// The set of drawing surfaces currently present in the view.
#[derive(Debug, Default)]
pub struct SurfaceBoard {
    slots: HashMap<String, SurfaceSlot>,
    next_token: u64,
}

impl SurfaceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a surface available. Mounting an existing surface is a no-op.
    pub fn mount(&mut self, surface: &str) {
        self.slots.entry(surface.to_string()).or_default();
    }

    /// Remove a surface. Any binding to it dies with it.
    pub fn unmount(&mut self, surface: &str) -> bool {
        self.slots.remove(surface).is_some()
    }

    pub fn is_mounted(&self, surface: &str) -> bool {
        self.slots.contains_key(surface)
    }

    pub fn is_bound(&self, surface: &str) -> bool {
        self.slots
            .get(surface)
            .is_some_and(|slot| slot.bound.is_some())
    }

    pub fn bind(&mut self, surface: &str) -> Result<BindingToken, ChartError> {
        let slot = self
            .slots
            .get_mut(surface)
            .ok_or_else(|| ChartError::SurfaceMissing(surface.to_string()))?;
        if slot.bound.is_some() {
            return Err(ChartError::SurfaceBusy(surface.to_string()));
        }
        self.next_token += 1;
        let token = BindingToken(self.next_token);
        slot.bound = Some(token);
        Ok(token)
    }

    /// Release a binding. Stale tokens are ignored.
    pub fn release(&mut self, surface: &str, token: BindingToken) {
        if let Some(slot) = self.slots.get_mut(surface) {
            if slot.bound == Some(token) {
                slot.bound = None;
            }
        }
    }

    pub fn is_live(&self, surface: &str, token: BindingToken) -> bool {
        self.slots
            .get(surface)
            .is_some_and(|slot| slot.bound == Some(token))
    }

    pub fn surfaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.keys().cloned().collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Chart
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Doughnut,
    Scatter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedrawMode {
    Animated,
    NoAnimation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub surface: String,
    pub title: String,
    pub y_bounds: Option<(f64, f64)>,
    /// Category labels for bar and doughnut charts.
    pub labels: Vec<String>,
}

impl ChartSpec {
    pub fn new(kind: ChartKind, surface: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            surface: surface.into(),
            title: title.into(),
            y_bounds: None,
            labels: Vec::new(),
        }
    }

    pub fn y_bounds(mut self, min: f64, max: f64) -> Self {
        self.y_bounds = Some((min, max));
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct Chart {
    spec: ChartSpec,
    token: BindingToken,
    points: VecDeque<(f64, f64)>,
    redraws: u64,
    last_redraw: Option<RedrawMode>,
    last_update: Option<Instant>,
}

impl Chart {
    pub fn spec(&self) -> &ChartSpec {
        &self.spec
    }

    pub fn points(&self) -> Vec<(f64, f64)> {
        self.points.iter().copied().collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|&(_, y)| y).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    pub fn last_redraw(&self) -> Option<RedrawMode> {
        self.last_redraw
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        ChartSnapshot {
            kind: self.spec.kind,
            title: self.spec.title.clone(),
            y_bounds: self.spec.y_bounds,
            labels: self.spec.labels.clone(),
            points: self.points(),
        }
    }
}

/// Owned copy of a chart's renderable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSnapshot {
    pub kind: ChartKind,
    pub title: String,
    pub y_bounds: Option<(f64, f64)>,
    pub labels: Vec<String>,
    pub points: Vec<(f64, f64)>,
}

impl ChartSnapshot {
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|&(_, y)| y).collect()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ChartRegistry {
    board: SurfaceBoard,
    charts: BTreeMap<String, Chart>,
    update_interval: Duration,
}

impl ChartRegistry {
    pub fn new(board: SurfaceBoard, update_interval: Duration) -> Self {
        Self {
            board,
            charts: BTreeMap::new(),
            update_interval,
        }
    }

    pub fn board(&self) -> &SurfaceBoard {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut SurfaceBoard {
        &mut self.board
    }

    /// Existing live chart for `name`, or a fresh one built from `spec`.
    ///
    /// Returns `None` (and logs) when the surface is gone or held by a
    /// different chart.
    pub fn ensure(&mut self, name: &str, spec: &ChartSpec) -> Option<&mut Chart> {
        let reusable = self.charts.get(name).is_some_and(|chart| {
            chart.spec.surface == spec.surface
                && chart.spec.kind == spec.kind
                && self.board.is_live(&chart.spec.surface, chart.token)
        });
        if reusable {
            return self.charts.get_mut(name);
        }

        if let Some(stale) = self.charts.remove(name) {
            log::debug!("chart {name}: dropping stale binding on {}", stale.spec.surface);
            self.board.release(&stale.spec.surface, stale.token);
        }

        if !self.board.is_mounted(&spec.surface) {
            log::debug!("chart {name}: surface {} not mounted, skipping", spec.surface);
            return None;
        }
        if self.board.is_bound(&spec.surface) {
            log::warn!("chart {name}: surface {} already bound, skipping", spec.surface);
            return None;
        }

        let token = match self.board.bind(&spec.surface) {
            Ok(token) => token,
            Err(e) => {
                log::warn!("chart {name}: {e}");
                return None;
            }
        };
        let chart = Chart {
            spec: spec.clone(),
            token,
            points: VecDeque::new(),
            redraws: 0,
            last_redraw: None,
            last_update: None,
        };
        Some(self.charts.entry(name.to_string()).or_insert(chart))
    }

    /// Release every chart and its surface binding.
    pub fn destroy_all(&mut self) {
        for (_, chart) in std::mem::take(&mut self.charts) {
            self.board.release(&chart.spec.surface, chart.token);
        }
    }

    /// Append one sample, dropping the oldest beyond `window`, then redraw.
    pub fn push_point(
        &mut self,
        name: &str,
        x: f64,
        y: f64,
        window: usize,
    ) -> Result<RedrawMode, ChartError> {
        let interval = self.update_interval;
        let chart = self.live_chart(name)?;
        chart.points.push_back((x, y));
        while chart.points.len() > window {
            chart.points.pop_front();
        }
        Ok(redraw(chart, interval))
    }

    /// Replace the series with the trailing `window` of `values`, indexed from 0.
    pub fn set_series(
        &mut self,
        name: &str,
        values: &[f64],
        window: usize,
    ) -> Result<RedrawMode, ChartError> {
        let interval = self.update_interval;
        let chart = self.live_chart(name)?;
        let start = values.len().saturating_sub(window);
        chart.points = values[start..]
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as f64, v))
            .collect();
        Ok(redraw(chart, interval))
    }

    fn live_chart(&mut self, name: &str) -> Result<&mut Chart, ChartError> {
        let chart = self
            .charts
            .get_mut(name)
            .ok_or_else(|| ChartError::UnknownChart(name.to_string()))?;
        if !self.board.is_live(&chart.spec.surface, chart.token) {
            return Err(ChartError::SurfaceMissing(chart.spec.surface.clone()));
        }
        Ok(chart)
    }

    pub fn get(&self, name: &str) -> Option<&Chart> {
        self.charts.get(name)
    }

    pub fn series(&self, name: &str) -> Option<Vec<f64>> {
        self.charts.get(name).map(Chart::values)
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, ChartSnapshot> {
        self.charts
            .iter()
            .map(|(name, chart)| (name.clone(), chart.snapshot()))
            .collect()
    }
}

fn redraw(chart: &mut Chart, configured_interval: Duration) -> RedrawMode {
    let now = Instant::now();
    let frequent = configured_interval <= HIGH_FREQUENCY_INTERVAL
        || chart
            .last_update
            .is_some_and(|prev| now.duration_since(prev) <= HIGH_FREQUENCY_INTERVAL);
    let mode = if frequent {
        RedrawMode::NoAnimation
    } else {
        RedrawMode::Animated
    };
    chart.last_update = Some(now);
    chart.last_redraw = Some(mode);
    chart.redraws += 1;
    mode
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(surfaces: &[&str]) -> ChartRegistry {
        let mut board = SurfaceBoard::new();
        for s in surfaces {
            board.mount(s);
        }
        ChartRegistry::new(board, Duration::from_secs(1))
    }

    fn line(surface: &str) -> ChartSpec {
        ChartSpec::new(ChartKind::Line, surface, "QBER (%)").y_bounds(0.0, 20.0)
    }

    #[test]
    fn window_keeps_most_recent_in_order() {
        let mut reg = registry(&["qber"]);
        reg.ensure("qber", &line("qber")).unwrap();
        for i in 0..35 {
            reg.push_point("qber", i as f64, i as f64 * 0.5, 20).unwrap();
        }
        let series = reg.series("qber").unwrap();
        assert_eq!(series.len(), 20);
        let expected: Vec<f64> = (15..35).map(|i| i as f64 * 0.5).collect();
        assert_eq!(series, expected);
    }

    #[test]
    fn window_exactly_full_after_twenty() {
        let mut reg = registry(&["s"]);
        reg.ensure("s", &line("s")).unwrap();
        for i in 0..20 {
            reg.push_point("s", i as f64, i as f64, 20).unwrap();
        }
        assert_eq!(reg.get("s").unwrap().len(), 20);
        assert_eq!(reg.series("s").unwrap()[0], 0.0);
    }

    #[test]
    fn frequent_updates_redraw_without_animation() {
        let mut reg = registry(&["s"]);
        reg.ensure("s", &line("s")).unwrap();
        let mode = reg.push_point("s", 0.0, 1.0, 20).unwrap();
        assert_eq!(mode, RedrawMode::NoAnimation);
        assert_eq!(reg.get("s").unwrap().redraws(), 1);

        let mut slow = ChartRegistry::new(SurfaceBoard::new(), Duration::from_secs(5));
        slow.board_mut().mount("s");
        slow.ensure("s", &line("s")).unwrap();
        assert_eq!(slow.push_point("s", 0.0, 1.0, 20).unwrap(), RedrawMode::Animated);
    }

    #[test]
    fn ensure_reuses_live_chart() {
        let mut reg = registry(&["qber"]);
        reg.ensure("qber", &line("qber")).unwrap();
        reg.push_point("qber", 0.0, 2.0, 20).unwrap();
        reg.ensure("qber", &line("qber")).unwrap();
        assert_eq!(reg.series("qber").unwrap(), vec![2.0]);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn ensure_on_missing_surface_fails_soft() {
        let mut reg = registry(&[]);
        assert!(reg.ensure("qber", &line("qber")).is_none());
        assert!(reg.is_empty());
        assert_eq!(
            reg.push_point("qber", 0.0, 1.0, 20),
            Err(ChartError::UnknownChart("qber".to_string()))
        );
    }

    #[test]
    fn ensure_never_rebinds_a_busy_surface() {
        let mut reg = registry(&["shared"]);
        reg.ensure("a", &line("shared")).unwrap();
        assert!(reg.ensure("b", &line("shared")).is_none());
        assert!(reg.get("b").is_none());
    }

    #[test]
    fn destroy_all_releases_surfaces() {
        let mut reg = registry(&["a", "b"]);
        reg.ensure("a", &line("a")).unwrap();
        reg.ensure("b", &line("b")).unwrap();
        assert!(reg.board().is_bound("a"));
        reg.destroy_all();
        assert!(reg.is_empty());
        assert!(!reg.board().is_bound("a"));
        assert!(!reg.board().is_bound("b"));
        assert!(reg.ensure("a", &line("a")).is_some());
    }

    #[test]
    fn remounted_surface_gets_fresh_chart() {
        let mut reg = registry(&["qber"]);
        reg.ensure("qber", &line("qber")).unwrap();
        reg.push_point("qber", 0.0, 3.0, 20).unwrap();

        reg.board_mut().unmount("qber");
        assert_eq!(
            reg.push_point("qber", 1.0, 4.0, 20),
            Err(ChartError::SurfaceMissing("qber".to_string()))
        );
        assert!(reg.ensure("qber", &line("qber")).is_none());

        reg.board_mut().mount("qber");
        reg.ensure("qber", &line("qber")).unwrap();
        assert!(reg.series("qber").unwrap().is_empty());
    }

    #[test]
    fn set_series_keeps_trailing_window() {
        let mut reg = registry(&["k"]);
        reg.ensure("k", &line("k")).unwrap();
        let values: Vec<f64> = (0..30).map(f64::from).collect();
        reg.set_series("k", &values, 20).unwrap();
        assert_eq!(reg.series("k").unwrap(), values[10..].to_vec());
        assert_eq!(reg.get("k").unwrap().points()[0], (0.0, 10.0));
    }

    #[test]
    fn board_bind_rules() {
        let mut board = SurfaceBoard::new();
        assert_eq!(
            board.bind("x"),
            Err(ChartError::SurfaceMissing("x".to_string()))
        );
        board.mount("x");
        let token = board.bind("x").unwrap();
        assert_eq!(board.bind("x"), Err(ChartError::SurfaceBusy("x".to_string())));
        board.release("x", token);
        let again = board.bind("x").unwrap();
        assert_ne!(token, again);
        board.release("x", token);
        assert!(board.is_live("x", again));
        assert!(board.unmount("x"));
        assert!(!board.is_live("x", again));
    }
}
