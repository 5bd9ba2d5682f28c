///
/// spindle-demo - Scheduler demonstration programs
///
/// Runs small workloads on the spindle scheduler:
/// - spindle-demo hello: one thread prints and exits
/// - spindle-demo yield: threads interleave through voluntary yields
/// - spindle-demo preempt: threads that never yield, rotated by the timer
/// - spindle-demo block: a waiter blocks until another thread wakes it
///

use clap::{Parser, Subcommand};
use std::cell::Cell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use spindle_runtime::{
    Scheduler, SchedulerConfig, SchedulerError, ThreadHandle, block, current, no_preempt, spawn,
    unblock, yield_now,
};
use tracing::{Level, error};

#[derive(Parser)]
#[command(name = "spindle-demo")]
#[command(author, version, about = "Green thread scheduler demonstrations", long_about = None)]
struct Cli {
    /// Scheduler configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log scheduler lifecycle events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single thread that prints a greeting
    Hello,

    /// Interleave threads through voluntary yields
    Yield {
        /// Number of threads
        #[arg(long, default_value_t = 3)]
        threads: usize,

        /// Yields per thread
        #[arg(long, default_value_t = 3)]
        rounds: usize,
    },

    /// Rotate threads that never yield using timer preemption
    Preempt {
        /// Number of spinning threads
        #[arg(long, default_value_t = 3)]
        threads: usize,
    },

    /// Block a thread until another one wakes it
    Block,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let config = match cli.config {
        Some(path) => match SchedulerConfig::from_path(&path) {
            Ok(config) => config,
            Err(err) => {
                error!(path = %path.display(), %err, "failed to load config");
                return ExitCode::FAILURE;
            }
        },
        None => SchedulerConfig::default(),
    };
    let scheduler = Scheduler::new(config);

    let result = match cli.command {
        Commands::Hello => hello(&scheduler),
        Commands::Yield { threads, rounds } => interleave(&scheduler, threads, rounds),
        Commands::Preempt { threads } => preempt(&scheduler, threads),
        Commands::Block => wake_up(&scheduler),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "demo failed");
            ExitCode::FAILURE
        }
    }
}

fn spawn_or_log<F>(f: F)
where
    F: FnOnce() + 'static,
{
    if let Err(err) = spawn(f) {
        error!(%err, "failed to create thread");
    }
}

fn hello(scheduler: &Scheduler) -> Result<(), SchedulerError> {
    scheduler.run(false, || println!("Hello world!"))
}

fn interleave(scheduler: &Scheduler, threads: usize, rounds: usize) -> Result<(), SchedulerError> {
    scheduler.run(false, move || {
        for id in 1..=threads {
            spawn_or_log(move || {
                for round in 1..=rounds {
                    println!("thread{id}: round {round}");
                    yield_now();
                }
            });
        }
    })
}

fn preempt(scheduler: &Scheduler, threads: usize) -> Result<(), SchedulerError> {
    let spins: Arc<Vec<AtomicU64>> = Arc::new((0..threads).map(|_| AtomicU64::new(0)).collect());

    scheduler.run(true, move || {
        for id in 0..threads {
            let spins = Arc::clone(&spins);
            let _guard = no_preempt();
            spawn_or_log(move || {
                while spins.iter().any(|count| count.load(Ordering::Relaxed) == 0) {
                    spins[id].fetch_add(1, Ordering::Relaxed);
                    std::hint::spin_loop();
                }

                let _guard = no_preempt();
                println!(
                    "thread{}: saw every thread run after {} spins",
                    id + 1,
                    spins[id].load(Ordering::Relaxed)
                );
            });
        }
    })
}

fn wake_up(scheduler: &Scheduler) -> Result<(), SchedulerError> {
    scheduler.run(false, || {
        let waiter: Rc<Cell<Option<ThreadHandle>>> = Rc::new(Cell::new(None));

        let slot = Rc::clone(&waiter);
        spawn_or_log(move || {
            slot.set(current());
            println!("waiter: blocking");
            block();
            println!("waiter: woken up");
        });

        spawn_or_log(move || {
            println!("waker: unblocking waiter");
            match waiter.get().map(unblock) {
                Some(Ok(())) => println!("waker: done"),
                Some(Err(err)) => error!(%err, "unblock failed"),
                None => error!("waiter never ran"),
            }
        });
    })
}
