//! Headless townsfolk simulation.
//!
//! People wander a 30x30 field, bump into each other and talk. With an
//! `ANTHROPIC_API_KEY` the conversations are generated by Claude; without
//! one (or with `--offline`) they are simulated.
//!
//! ```bash
//! cargo run -p townsfolk -- --people 8 --ticks 1200 --seed 42
//! ```

mod headless;

use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = headless::parse_config_from_args(&args);
    headless::run_headless(config)?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn print_help() {
    println!("Townsfolk - a small town of AI-driven people");
    println!();
    println!("USAGE:");
    println!("  townsfolk [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help          Show this help message");
    println!("  --people <N>        Number of townsfolk (default: 10)");
    println!("  --ticks <N>         Ticks to run at 20 per second (default: 2400)");
    println!("  --seed <N>          Random seed (default: random)");
    println!("  --max-turns <N>     Lines per person per conversation (default: 6)");
    println!("  --offline           Simulate conversations without calling Claude");
    println!();
    println!("ENVIRONMENT:");
    println!("  ANTHROPIC_API_KEY        Claude API key (also read from .env)");
    println!("  TOWNSFOLK_MODEL          Model override");
    println!("  TOWNSFOLK_MAX_TURNS      Lines per person per conversation");
    println!("  TOWNSFOLK_WORKERS        Concurrent model calls (default: 3)");
    println!("  TOWNSFOLK_TURN_DELAY_MS  Pause between turns (default: 1500)");
    println!("  RUST_LOG                 Log filter (default: info)");
}
