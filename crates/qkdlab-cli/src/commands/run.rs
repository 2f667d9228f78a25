use std::sync::Arc;

use qkdlab_core::{
    LogNotifier, PerQubitRecord, QubitFate, QubitView, RunConfig, SimulationResult,
};

pub struct RunCommandConfig<'a> {
    pub engine: Option<&'a str>,
    pub channel: &'a super::ChannelArgs,
    pub qubits: usize,
    pub bits: Option<&'a str>,
    pub bases: Option<&'a str>,
    pub json: bool,
}

pub fn run(cfg: RunCommandConfig<'_>) {
    let run_config = RunConfig {
        num_qubits: cfg.qubits,
        alice_bits: cfg.bits.map(str::to_string),
        alice_bases: cfg.bases.map(str::to_string),
        ..cfg.channel.run_config()
    };
    if run_config.alice_bits.is_some() != run_config.alice_bases.is_some() {
        eprintln!("--bits and --bases must be given together");
        std::process::exit(2);
    }

    let client = super::client_config(cfg.engine, None);
    let controller = super::make_controller(client, Arc::new(LogNotifier));
    let rt = super::runtime();
    let report = match rt.block_on(controller.run_once(&run_config)) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Simulation failed: {e}");
            std::process::exit(1);
        }
    };

    if cfg.json {
        match serde_json::to_string_pretty(&report.result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to encode result: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    for line in summary_lines(&report.result) {
        println!("{line}");
    }
    println!();
    match &report.view {
        QubitView::Records(normalized) => {
            for line in record_table(&normalized.records) {
                println!("{line}");
            }
        }
        QubitView::Degraded(fields) => {
            println!("  Per-qubit detail could not be validated; raw fields:");
            for (name, value) in fields {
                println!("    {name:<18} {value}");
            }
        }
    }
    if !report.result.logs.is_empty() {
        println!();
        for entry in &report.result.logs {
            println!("  [{:<7}] {}", entry.level, entry.message);
        }
    }
}

fn summary_lines(result: &SimulationResult) -> Vec<String> {
    let mut lines = vec![format!("BB84 run: {}", result.status)];
    if let Some(qber) = result.qber {
        let verdict = match result.is_secure {
            Some(true) => "secure",
            Some(false) => "INSECURE",
            None => "unknown",
        };
        lines.push(format!("  QBER            {:.2}% ({verdict})", qber * 100.0));
    }
    let keys = [
        ("Alice sifted", &result.alice_sifted),
        ("Bob sifted", &result.bob_sifted),
        ("Final key", &result.final_key),
    ];
    for (label, key) in keys {
        if let Some(key) = key {
            lines.push(format!("  {label:<15} {key} ({} bits)", key.len()));
        }
    }
    if let Some(n) = result.errors_corrected {
        lines.push(format!(
            "  Corrected       {n} errors, {} parity bits disclosed",
            result.parity_bits_disclosed.unwrap_or(0)
        ));
    }
    if let Some(rate) = result.key_generation_rate {
        lines.push(format!("  Key rate        {rate:.1} bits/s"));
    }
    lines
}

fn fate_label(fate: QubitFate) -> &'static str {
    match fate {
        QubitFate::Sifted => "sifted",
        QubitFate::ChannelError => "error",
        QubitFate::Intercepted => "error (eve)",
        QubitFate::Discarded => "discarded",
        QubitFate::Lost => "lost",
    }
}

fn record_table(records: &[PerQubitRecord]) -> Vec<String> {
    let mut lines = vec![format!(
        "  {:>4}  {:>5} {:>5}  {:>5} {:>5}  {:>3}  {}",
        "#", "A bit", "A bas", "B bit", "B bas", "Eve", "fate"
    )];
    for (i, r) in records.iter().enumerate() {
        let bob_bit = r.bob_bit.map_or('?', |b| b.symbol());
        let eve = r.eve_base.map_or('-', |b| b.symbol());
        lines.push(format!(
            "  {:>4}  {:>5} {:>5}  {:>5} {:>5}  {:>3}  {}",
            i,
            r.alice_bit.symbol(),
            r.alice_base.symbol(),
            bob_bit,
            r.bob_base.symbol(),
            eve,
            fate_label(r.fate())
        ));
    }
    let sifted = records.iter().filter(|r| r.is_sifted()).count();
    let intercepted = records.iter().filter(|r| r.eve_intercepted()).count();
    lines.push(format!(
        "  {sifted}/{} sifted, {intercepted} intercepted",
        records.len()
    ));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use qkdlab_core::{Basis, Bit, RunStatus};

    fn record(alice: Bit, bob: Option<Bit>, same_basis: bool, eve: bool) -> PerQubitRecord {
        PerQubitRecord {
            alice_bit: alice,
            alice_base: Basis::Rectilinear,
            bob_bit: bob,
            bob_base: if same_basis {
                Basis::Rectilinear
            } else {
                Basis::Diagonal
            },
            eve_base: eve.then_some(Basis::Diagonal),
        }
    }

    #[test]
    fn test_record_table_marks_fates() {
        let records = [
            record(Bit::Zero, Some(Bit::Zero), true, false),
            record(Bit::One, Some(Bit::Zero), false, false),
            record(Bit::One, None, true, false),
            record(Bit::One, Some(Bit::Zero), true, true),
        ];
        let lines = record_table(&records);
        assert_eq!(lines.len(), 6);
        assert!(lines[1].ends_with("sifted"));
        assert!(lines[2].ends_with("discarded"));
        assert!(lines[3].contains('?'));
        assert!(lines[3].ends_with("lost"));
        assert!(lines[4].ends_with("error (eve)"));
        assert_eq!(lines[5], "  2/4 sifted, 1 intercepted");
    }

    #[test]
    fn test_summary_lines_include_keys_and_verdict() {
        let result: SimulationResult = serde_json::from_value(serde_json::json!({
            "status": "success",
            "qber": 0.125,
            "is_secure": false,
            "alice_sifted": "0110",
            "bob_sifted": "0100",
            "final_key": "01",
        }))
        .unwrap();
        assert_eq!(result.status, RunStatus::Success);
        let lines = summary_lines(&result);
        assert_eq!(lines[0], "BB84 run: success");
        assert!(lines[1].contains("12.50%"));
        assert!(lines[1].contains("INSECURE"));
        assert!(lines.iter().any(|l| l.contains("Final key") && l.contains("(2 bits)")));
    }
}
