pub mod monitor;
pub mod run;
pub mod server;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use qkdlab_core::{
    ClientConfig, ErrorCorrection, EveAttack, HttpTransport, Notifier, PrivacyAmplification,
    RunConfig, SessionController,
};

/// Channel and post-processing parameters shared by every run command.
#[derive(Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Fiber length
    #[arg(long, default_value = "10")]
    pub distance: f64,

    /// Depolarizing noise probability (0-1)
    #[arg(long, default_value = "0.1")]
    pub noise: f64,

    /// Eavesdropper: none or intercept_resend
    #[arg(long, default_value = "none", value_parser = ["none", "intercept_resend", "ir"])]
    pub eve: String,

    /// Error correction: none or cascade (winnow and ldpc run cascade)
    #[arg(long, default_value = "none", value_parser = ["none", "cascade", "winnow", "ldpc"])]
    pub error_correction: String,

    /// Privacy amplification: none, standard, universal or toeplitz
    #[arg(long, default_value = "none", value_parser = ["none", "standard", "universal", "toeplitz"])]
    pub privacy_amplification: String,

    /// Photons per second for continuous runs
    #[arg(long, default_value = "1000")]
    pub photon_rate: f64,
}

impl ChannelArgs {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            distance: self.distance,
            channel_noise: self.noise,
            eve_attack: parse_eve_attack(&self.eve),
            error_correction: parse_error_correction(&self.error_correction),
            privacy_amplification: parse_privacy_amplification(&self.privacy_amplification),
            photon_rate: self.photon_rate,
            ..RunConfig::default()
        }
    }
}

/// Client settings: environment first, then command-line overrides.
/// Exits with a message on invalid input.
pub fn client_config(engine: Option<&str>, poll_ms: Option<u64>) -> ClientConfig {
    let mut config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid environment: {e}");
            std::process::exit(2);
        }
    };
    if let Some(url) = engine {
        config = match config.with_engine_url(url) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(2);
            }
        };
    }
    if let Some(ms) = poll_ms {
        config.poll_interval = Duration::from_millis(ms.max(1));
    }
    config
}

/// Controller talking HTTP to the configured engine.
pub fn make_controller(config: ClientConfig, notifier: Arc<dyn Notifier>) -> SessionController {
    let transport = match HttpTransport::new(config.clone()) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };
    SessionController::new(Arc::new(transport), notifier, config)
}

pub fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {e}");
            std::process::exit(1);
        }
    }
}

pub fn parse_eve_attack(s: &str) -> EveAttack {
    match s {
        "none" => EveAttack::None,
        "intercept_resend" | "intercept-resend" | "ir" => EveAttack::InterceptResend,
        _ => {
            eprintln!("Unknown eve attack '{s}', using none");
            EveAttack::None
        }
    }
}

pub fn parse_error_correction(s: &str) -> ErrorCorrection {
    match s {
        "none" => ErrorCorrection::None,
        "cascade" | "winnow" | "ldpc" => ErrorCorrection::Cascade,
        _ => {
            eprintln!("Unknown error correction '{s}', using none");
            ErrorCorrection::None
        }
    }
}

pub fn parse_privacy_amplification(s: &str) -> PrivacyAmplification {
    match s {
        "none" => PrivacyAmplification::None,
        "standard" => PrivacyAmplification::Standard,
        "universal" => PrivacyAmplification::Universal,
        "toeplitz" => PrivacyAmplification::Toeplitz,
        _ => {
            eprintln!("Unknown privacy amplification '{s}', using none");
            PrivacyAmplification::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_eve_variants() {
        assert_eq!(parse_eve_attack("none"), EveAttack::None);
        assert_eq!(
            parse_eve_attack("intercept_resend"),
            EveAttack::InterceptResend
        );
        assert_eq!(parse_eve_attack("ir"), EveAttack::InterceptResend);
    }

    #[test]
    fn test_parse_unknown_eve_defaults_none() {
        assert_eq!(parse_eve_attack("photon_splitting"), EveAttack::None);
        assert_eq!(parse_eve_attack(""), EveAttack::None);
    }

    #[test]
    fn test_parse_error_correction_aliases() {
        assert_eq!(parse_error_correction("cascade"), ErrorCorrection::Cascade);
        assert_eq!(parse_error_correction("winnow"), ErrorCorrection::Cascade);
        assert_eq!(parse_error_correction("ldpc"), ErrorCorrection::Cascade);
        assert_eq!(parse_error_correction("CASCADE"), ErrorCorrection::None); // case-sensitive
    }

    #[test]
    fn test_parse_privacy_amplification() {
        assert_eq!(
            parse_privacy_amplification("standard"),
            PrivacyAmplification::Standard
        );
        assert_eq!(
            parse_privacy_amplification("universal"),
            PrivacyAmplification::Universal
        );
        assert_eq!(
            parse_privacy_amplification("toeplitz"),
            PrivacyAmplification::Toeplitz
        );
        assert_eq!(
            parse_privacy_amplification("bogus"),
            PrivacyAmplification::None
        );
    }

    #[test]
    fn test_channel_args_build_run_config() {
        let args = ChannelArgs {
            distance: 25.0,
            noise: 0.05,
            eve: "intercept_resend".to_string(),
            error_correction: "winnow".to_string(),
            privacy_amplification: "toeplitz".to_string(),
            photon_rate: 500.0,
        };
        let config = args.run_config();
        assert_eq!(config.distance, 25.0);
        assert_eq!(config.channel_noise, 0.05);
        assert_eq!(config.eve_attack, EveAttack::InterceptResend);
        assert_eq!(config.error_correction, ErrorCorrection::Cascade);
        assert_eq!(config.privacy_amplification, PrivacyAmplification::Toeplitz);
        assert_eq!(config.photon_rate, 500.0);
        assert_eq!(config.num_qubits, RunConfig::default().num_qubits);
        assert!(config.alice_bits.is_none());
    }
}
