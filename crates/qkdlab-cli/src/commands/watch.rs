use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use qkdlab_core::controller::QBER_CHART;
use qkdlab_core::{LogNotifier, SessionPhase, SessionView, StartOutcome};
use tokio::time::{Instant, sleep};

/// How often the view is sampled for new snapshots.
const SAMPLE_EVERY: Duration = Duration::from_millis(50);

pub fn run(
    engine: Option<&str>,
    channel: &super::ChannelArgs,
    duration: Option<f64>,
    poll_ms: Option<u64>,
) {
    let client = super::client_config(engine, poll_ms);
    let controller = super::make_controller(client, Arc::new(LogNotifier));
    let run_config = channel.run_config();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Ctrl+C handler unavailable: {e}");
    }

    let rt = super::runtime();
    rt.block_on(async {
        match controller.start(run_config).await {
            StartOutcome::Started(ack) => {
                println!(
                    "Continuous run {} started ({} photons/s)",
                    ack.simulation_id.as_deref().unwrap_or("?"),
                    ack.photon_rate.unwrap_or(channel.photon_rate)
                );
            }
            StartOutcome::Failed(e) => {
                eprintln!("Failed to start: {e}");
                std::process::exit(1);
            }
            other => {
                eprintln!("Start did not complete: {other:?}");
                std::process::exit(1);
            }
        }
        println!("  Press Ctrl+C to stop.");
        println!();

        let deadline = duration.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
        let mut printed = 0;
        loop {
            sleep(SAMPLE_EVERY).await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }

            let view = controller.view();
            if view.snapshots_applied > printed {
                printed = view.snapshots_applied;
                println!("{}", snapshot_line(&view));
            }
            if view.phase == SessionPhase::Idle {
                println!("Run ended by the engine.");
                break;
            }
        }

        controller.stop().await;
    });
    println!("Stopped.");
}

fn snapshot_line(view: &SessionView) -> String {
    let Some(m) = &view.metrics else {
        return format!("#{:<4} (no metrics)", view.snapshots_applied);
    };
    let qber = m.qber.map_or("-".to_string(), |q| format!("{:.2}%", q * 100.0));
    let rate = m
        .key_generation_rate
        .map_or("-".to_string(), |r| format!("{r:.1}"));
    let security = m
        .security_level
        .as_ref()
        .map_or("-".to_string(), ToString::to_string);
    let window = view.series(QBER_CHART).map_or(0, |s| s.len());
    format!(
        "#{:<4} t={:>7.1}s  QBER {qber:>7}  key {rate:>9} b/s  sent {:>8}  recv {:>8}  {security}  [{window} pts]",
        view.snapshots_applied,
        view.elapsed_time.unwrap_or(0.0),
        m.photons_sent.unwrap_or(0),
        m.photons_received.unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use qkdlab_core::{Metrics, SecurityLevel};
    use std::collections::BTreeMap;

    fn view(metrics: Option<Metrics>) -> SessionView {
        SessionView {
            phase: SessionPhase::Running,
            generation: 1,
            polling: true,
            simulation_id: None,
            metrics,
            elapsed_time: Some(3.0),
            charts: BTreeMap::new(),
            qubits: None,
            snapshots_applied: 3,
            consecutive_failures: 0,
        }
    }

    #[test]
    fn test_snapshot_line_formats_metrics() {
        let line = snapshot_line(&view(Some(Metrics {
            qber: Some(0.0625),
            key_generation_rate: Some(390.25),
            photons_sent: Some(3000),
            photons_received: Some(2430),
            security_level: Some(SecurityLevel::High),
            ..Metrics::default()
        })));
        assert!(line.starts_with("#3"));
        assert!(line.contains("6.25%"));
        assert!(line.contains("390.2") || line.contains("390.3"));
        assert!(line.contains("2430"));
        assert!(line.contains("High"));
        assert!(line.ends_with("[0 pts]"));
    }

    #[test]
    fn test_snapshot_line_without_metrics() {
        assert_eq!(snapshot_line(&view(None)), "#3    (no metrics)");
    }
}
