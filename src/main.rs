//! Demo host for the queue-bypass admission core.
//!
//! Wires the registry, classifier, and reconciler to an in-process world and
//! FIFO queue, then drives the admin command surface from stdin. Stands in
//! for the game server that would normally own these collaborators.

use clap::Parser;
use log::info;
use requeue_relief::classifier::DisconnectClassifier;
use requeue_relief::commands::{self, AdminCommand};
use requeue_relief::config::Config;
use requeue_relief::host::{CapacitySource, FinalizeSink};
use requeue_relief::queue::{FifoWaitQueue, QueuedClient, WaitQueue};
use requeue_relief::reconciler::{AdmissionReconciler, TtlPolicy};
use requeue_relief::registry::TicketRegistry;
use requeue_relief::scheduler::TokioScheduler;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};

/// In-process stand-in for the live server: a population set with a fixed
/// capacity.
struct DemoWorld {
    capacity: usize,
    population: Mutex<HashSet<String>>,
}

impl CapacitySource for DemoWorld {
    fn total_capacity(&self) -> usize {
        self.capacity
    }

    fn population(&self) -> usize {
        self.population.lock().unwrap().len()
    }
}

impl FinalizeSink for DemoWorld {
    fn finalize_join(&self, client: QueuedClient) {
        info!(
            "Finalizing connection {} for player {}",
            client.connection_id, client.player_uid
        );
        self.population.lock().unwrap().insert(client.player_uid);
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Total player capacity of the demo world
    #[clap(short, long, default_value_t = 10)]
    capacity: usize,
    /// Path to the JSON config file
    #[clap(long, default_value = "requeue-relief.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let scheduler = Arc::new(TokioScheduler::from_current()?);
    let registry = TicketRegistry::new(scheduler);
    let classifier = Arc::new(DisconnectClassifier::new(
        config.timings.failed_join_threshold(),
    ));
    let world = Arc::new(DemoWorld {
        capacity: args.capacity,
        population: Mutex::new(HashSet::new()),
    });
    let queue = Arc::new(FifoWaitQueue::new());

    let reconciler = AdmissionReconciler::new(
        Arc::clone(&registry),
        classifier,
        Arc::clone(&queue) as Arc<dyn WaitQueue>,
        Arc::clone(&world) as Arc<dyn CapacitySource>,
        world as Arc<dyn FinalizeSink>,
        TtlPolicy::from_timings(&config.timings),
    );
    reconciler.attach();

    info!(
        "Admission console ready (capacity {}); type 'help' for commands",
        args.capacity
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match AdminCommand::parse_line(&line) {
                            Ok(command) => println!(
                                "{}",
                                commands::execute(command, &registry, &reconciler, queue.as_ref())
                            ),
                            Err(error) => println!("{}", error),
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    reconciler.detach();
    Ok(())
}
