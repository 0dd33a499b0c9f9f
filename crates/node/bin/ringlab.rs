use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use rand::Rng;
use ringlab_core::consts::DEBUG_INITIAL_NODES;
use ringlab_core::consts::DEBUG_RING_BITS;
use ringlab_core::consts::DEFAULT_FINGER_UPDATE_INTERVAL_MS;
use ringlab_core::consts::DEFAULT_INITIAL_NODES;
use ringlab_core::consts::DEFAULT_RING_BITS;
use ringlab_core::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use ringlab_core::dht::RoutingMode;
use ringlab_core::inspect::NetworkInspect;
use ringlab_core::message::MessageKind;
use ringlab_core::network::Network;
use ringlab_core::network::NetworkConfig;
use ringlab_node::logging::init_logging;
use ringlab_node::logging::LogLevel;

#[derive(Parser, Debug)]
#[clap(about = "Chord overlay simulator", version)]
struct Cli {
    #[clap(long, value_enum, default_value_t = LogLevel::Info, env)]
    log_level: LogLevel,

    /// Shrink the network to the debug preset, overriding
    /// --initial-nodes and --network-bits.
    #[clap(long)]
    debug: bool,

    /// Run the fully connected overlay instead of the chord ring.
    #[clap(long, short = 'f')]
    fully_connected: bool,

    /// Number of peers created at startup.
    #[clap(long, default_value_t = DEFAULT_INITIAL_NODES)]
    initial_nodes: usize,

    /// Identifier width of the ring, in bits.
    #[clap(long, default_value_t = DEFAULT_RING_BITS)]
    network_bits: u8,

    /// Stabilize interval of each peer, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_STABILIZE_INTERVAL_MS)]
    stabilize_interval: u64,

    /// Cadence of the background finger repair, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_FINGER_UPDATE_INTERVAL_MS)]
    finger_update_interval: u64,

    /// Route lookups by successor chasing only, ignoring finger tables.
    #[clap(long)]
    use_successor_only: bool,

    /// How long to keep the simulation running before dumping state, in
    /// seconds.
    #[clap(long, default_value_t = 10)]
    run_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();
    init_logging(cli.log_level);

    if cli.debug {
        cli.initial_nodes = DEBUG_INITIAL_NODES;
        cli.network_bits = DEBUG_RING_BITS;
    }

    let config = if cli.fully_connected {
        NetworkConfig::fully_connected(cli.network_bits)
    } else {
        let routing = if cli.use_successor_only {
            RoutingMode::SuccessorOnly
        } else {
            RoutingMode::FingerTable
        };
        NetworkConfig::chord(cli.network_bits, routing)
            .stabilize_every(Duration::from_millis(cli.stabilize_interval))
    };
    let network = Network::new(config)?;

    for i in 0..cli.initial_nodes {
        network.create_peer(&format!("Node_{i}"))?;
    }
    network.arrange_overlay_structure();

    // Store an entry through one random peer and read it back through
    // another, the canonical round trip.
    let entry = network.random_peer().context("no peers created")?;
    network.set(&entry, "Test", "Value")?;
    let entry = network.random_peer().context("no peers created")?;
    let value = network.get(&entry, "Test")?;
    tracing::info!("get(\"Test\") through {} returned {:?}", entry.id(), value);

    // Let the overlay run: stabilizers tick on their own schedules, and
    // finger repair periodically fixes one random row of one random peer.
    let deadline = Instant::now() + Duration::from_secs(cli.run_secs);
    if cli.fully_connected {
        tokio::time::sleep(deadline.saturating_duration_since(Instant::now())).await;
    } else {
        while Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(cli.finger_update_interval)).await;
            if let Some(peer) = network.random_peer() {
                let row = rand::thread_rng().gen_range(0..cli.network_bits as usize);
                network.fix_fingers(peer.id(), row, row)?;
            }
        }
    }

    let snapshot = NetworkInspect::inspect(&network)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    tracing::info!(
        "queries: {} lookups, {} gets, {} sets; {} messages total",
        network.message_count(MessageKind::Lookup),
        network.message_count(MessageKind::Get),
        network.message_count(MessageKind::Set),
        network.messages().len()
    );

    network.shutdown();
    Ok(())
}
