use qkdlab_core::transport::{POLL_PATH, RUN_ONCE_PATH, START_PATH, STOP_PATH};

pub fn run(host: &str, port: u16, seed: Option<u64>) {
    let base = format!("http://{host}:{port}");

    println!("🔬 qkdlab engine v{}", qkdlab_core::VERSION);
    println!("   {base}");
    if let Some(seed) = seed {
        println!("   deterministic seed {seed}");
    }
    println!();
    println!("   Endpoints:");
    println!("     GET  /                 API index (try: curl {base})");
    println!("     POST {START_PATH}");
    println!("     POST {STOP_PATH}");
    println!("     GET  {POLL_PATH}");
    println!("     POST {RUN_ONCE_PATH}");
    println!("     GET  /health           Engine health check");
    println!();
    println!("   Examples:");
    println!(
        "     curl -X POST {base}{RUN_ONCE_PATH} -H 'content-type: application/json' -d '{{\"num_qubits\": 16}}'"
    );
    println!("     qkdlab watch --engine {base}");
    println!();

    let rt = super::runtime();
    if let Err(e) = rt.block_on(qkdlab_server::run_server(host, port, seed)) {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}
