use airtime::broadcast_loop::BroadcastLoop;
use airtime::clock::{ShowClock, WallClock};
use airtime::config::{CONFIG_FILE, ShowConfig};
use airtime::context::BroadcastState;
use airtime::dialogue::DialogueBank;
use airtime::sim::{SimAdSource, SimCallerQueue};
use airtime::sources::{CallerOutcome, ShowObserver};
use airtime::timer::TimingEvent;
use airtime::transcript::TranscriptLog;
use airtime::unit::SimRunner;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "airtime", about = "Interactive radio-broadcast simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated show to completion
    Run {
        /// Show length in seconds (overrides config)
        #[arg(short, long)]
        duration: Option<f64>,
        /// Ad spots per break (overrides config)
        #[arg(short, long)]
        slots: Option<usize>,
        /// Number of scripted callers to queue up
        #[arg(short, long, default_value = "4")]
        callers: usize,
        /// Schedule an ad break this many seconds into the show
        #[arg(short, long)]
        break_after: Option<f64>,
        /// Time scale for content durations (1.0 = real time)
        #[arg(short, long)]
        time_scale: Option<f64>,
        /// Seed for the shuffle and dialogue picks
        #[arg(long)]
        seed: Option<u64>,
        /// Config file path (default: airtime_config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print the effective configuration
    Show {
        /// Config file path (default: airtime_config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a default config file
    Init {
        /// Config file path (default: airtime_config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Scripted callers for the demo queue.
const CALLER_POOL: [(&str, &str, f64); 6] = [
    ("Dale", "lights over the reservoir", 14.0),
    ("Marge", "the old tunnel system", 11.0),
    ("Ray", "highway rest stops", 9.0),
    ("Priss", "numbers stations", 12.0),
    ("Walt", "missing time", 10.0),
    ("June", "the neighbor's antenna", 8.0),
];

struct PrintObserver;

impl ShowObserver for PrintObserver {
    fn state_changed(&self, from: BroadcastState, to: BroadcastState) {
        println!("  [state] {} -> {}", from, to);
    }

    fn dead_air_started(&self) {
        println!("  [air] dead air");
    }

    fn dead_air_ended(&self) {
        println!("  [air] dead air over");
    }

    fn timing_event(&self, event: &TimingEvent) {
        println!("  [timer] {} (t={:.1}s)", event.kind, event.at_secs);
    }
}

fn config_path(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            duration,
            slots,
            callers,
            break_after,
            time_scale,
            seed,
            config,
        } => {
            if let Some(seed) = seed {
                fastrand::seed(seed);
            }
            let mut cfg = ShowConfig::load(&config_path(config));
            if let Some(d) = duration {
                cfg.show_duration_secs = d;
            }
            if let Some(s) = slots {
                cfg.ad_slots_per_break = s;
            }
            if let Some(ts) = time_scale {
                cfg.time_scale = ts;
            }
            let cfg = cfg.sanitized();

            let bank = match &cfg.dialogue_bank {
                Some(path) => match DialogueBank::load(path) {
                    Ok(bank) => bank,
                    Err(e) => {
                        eprintln!("{}", e);
                        std::process::exit(1);
                    }
                },
                None => DialogueBank::default_bank(),
            };

            let clock: Arc<dyn ShowClock> = Arc::new(WallClock::new());
            let transcript = Arc::new(TranscriptLog::new());
            let runner = Arc::new(SimRunner::with_time_scale(
                transcript.clone(),
                clock.clone(),
                cfg.time_scale,
            ));
            let caller_queue = Arc::new(SimCallerQueue::new());
            for i in 0..callers {
                let (name, topic, arc_secs) = CALLER_POOL[i % CALLER_POOL.len()];
                // Every fourth caller wanders off topic.
                let outcome = CallerOutcome {
                    off_topic: i % 4 == 3,
                    fraud: false,
                };
                caller_queue.push_caller(name, topic, arc_secs, outcome);
            }
            let ads = Arc::new(SimAdSource::new(cfg.ad_slots_per_break, clock.clone()));

            let duration_secs = cfg.show_duration_secs;
            let broadcast = BroadcastLoop::new(
                cfg,
                clock,
                caller_queue,
                ads.clone(),
                Arc::new(bank),
                runner,
                Arc::new(PrintObserver),
            );

            println!(
                "On air: {:.0}s show, {} caller(s) holding",
                duration_secs, callers
            );
            broadcast.start(duration_secs);
            if let Some(secs) = break_after {
                ads.set_next_break_in(secs);
                broadcast.schedule_break(secs);
                println!("  [traffic] break scheduled in {:.0}s", secs);
            }

            let mut printed = 0;
            while broadcast.is_running() {
                for entry in transcript.get(printed) {
                    println!("[{}] {}: {}", entry.logged_at, entry.speaker, entry.text);
                    printed += 1;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            for entry in transcript.get(printed) {
                println!("[{}] {}: {}", entry.logged_at, entry.speaker, entry.text);
                printed += 1;
            }
            println!("Off air. {} transcript entries.", printed);
        }
        Commands::Config { action } => match action {
            ConfigCmd::Show { config } => {
                let cfg = ShowConfig::load(&config_path(config)).sanitized();
                match serde_json::to_string_pretty(&cfg) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigCmd::Init { config } => {
                let path = config_path(config);
                if let Err(e) = ShowConfig::default().save(&path) {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
                println!("Wrote default config to {}", path.display());
            }
        },
    }
}
