//! CLI for qkdlab: BB84 quantum key distribution, live.

mod commands;
mod tui;

use clap::{ArgAction, Parser, Subcommand};

use commands::ChannelArgs;

#[derive(Parser)]
#[command(name = "qkdlab")]
#[command(about = "qkdlab: run BB84 simulations and watch key distribution live")]
#[command(version = qkdlab_core::VERSION)]
struct Cli {
    /// Log more (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP simulation engine
    Server {
        /// Port to listen on
        #[arg(long, default_value = "5000")]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Seed the engine's randomness for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run one BB84 exchange and print the per-qubit table
    Run {
        /// Engine base URL (overrides QKDLAB_ENGINE_URL)
        #[arg(long)]
        engine: Option<String>,

        /// Random qubits to send when no manual input is given
        #[arg(long, default_value = "16")]
        qubits: usize,

        /// Alice's bits, e.g. 0110 (requires --bases)
        #[arg(long)]
        bits: Option<String>,

        /// Alice's bases, e.g. +x+x (requires --bits)
        #[arg(long)]
        bases: Option<String>,

        /// Print the raw engine result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        channel: ChannelArgs,
    },

    /// Headless continuous run: one line per snapshot, Ctrl+C to stop
    Watch {
        /// Engine base URL (overrides QKDLAB_ENGINE_URL)
        #[arg(long)]
        engine: Option<String>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Poll interval in milliseconds (overrides QKDLAB_POLL_INTERVAL_MS)
        #[arg(long)]
        poll_ms: Option<u64>,

        #[command(flatten)]
        channel: ChannelArgs,
    },

    /// Live interactive dashboard (TUI)
    Monitor {
        /// Engine base URL (overrides QKDLAB_ENGINE_URL)
        #[arg(long)]
        engine: Option<String>,

        /// Poll interval in milliseconds (overrides QKDLAB_POLL_INTERVAL_MS)
        #[arg(long)]
        poll_ms: Option<u64>,

        #[command(flatten)]
        channel: ChannelArgs,
    },
}

/// The dashboard owns the terminal, so it stays silent unless asked.
fn init_logging(verbose: u8, quiet: bool) {
    let default = match (verbose, quiet) {
        (0, true) => "off",
        (0, false) => "warn",
        (1, _) => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, matches!(cli.command, Commands::Monitor { .. }));

    match cli.command {
        Commands::Server { port, host, seed } => commands::server::run(&host, port, seed),
        Commands::Run {
            engine,
            qubits,
            bits,
            bases,
            json,
            channel,
        } => commands::run::run(commands::run::RunCommandConfig {
            engine: engine.as_deref(),
            channel: &channel,
            qubits,
            bits: bits.as_deref(),
            bases: bases.as_deref(),
            json,
        }),
        Commands::Watch {
            engine,
            duration,
            poll_ms,
            channel,
        } => commands::watch::run(engine.as_deref(), &channel, duration, poll_ms),
        Commands::Monitor {
            engine,
            poll_ms,
            channel,
        } => commands::monitor::run(engine.as_deref(), &channel, poll_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_manual_bits() {
        let cli = Cli::parse_from([
            "qkdlab", "run", "--bits", "0110", "--bases", "+x+x", "--eve", "intercept_resend",
        ]);
        match cli.command {
            Commands::Run {
                bits,
                bases,
                channel,
                ..
            } => {
                assert_eq!(bits.as_deref(), Some("0110"));
                assert_eq!(bases.as_deref(), Some("+x+x"));
                assert_eq!(channel.eve, "intercept_resend");
                assert_eq!(channel.distance, 10.0);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_watch_flags_and_global_verbose() {
        let cli = Cli::parse_from([
            "qkdlab", "watch", "-vv", "--duration", "2.5", "--poll-ms", "250", "--noise", "0.2",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Watch {
                duration,
                poll_ms,
                channel,
                engine,
            } => {
                assert_eq!(duration, Some(2.5));
                assert_eq!(poll_ms, Some(250));
                assert_eq!(channel.noise, 0.2);
                assert!(engine.is_none());
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_unknown_eve_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["qkdlab", "monitor", "--eve", "beam_splitter"]).is_err());
    }
}
