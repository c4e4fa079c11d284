use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;

use trueshot::{NetworkEndpoint, PacketLossSimulation};
use trueshot_server::{GameServer, ServerConfig, ServerEvent};

#[derive(Parser)]
#[command(name = "trueshot-server")]
#[command(about = "Authoritative prediction server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = trueshot::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = trueshot::DEFAULT_MAX_PEERS)]
    max_clients: usize,

    #[arg(long, help = "Stop after this many ticks instead of running forever")]
    ticks: Option<u32>,

    #[arg(long, default_value_t = 0.0, help = "Outgoing packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let config = ServerConfig {
        max_clients: args.max_clients,
        ..Default::default()
    };

    let mut endpoint = NetworkEndpoint::server(bind_addr.as_str(), config.max_clients)?;
    if args.loss_percent > 0.0 {
        endpoint.set_packet_loss(PacketLossSimulation::with_loss(args.loss_percent));
        log::info!("Simulating {}% outgoing packet loss", args.loss_percent);
    }

    let mut server = GameServer::new(endpoint, config);
    let running = server.running();
    ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    log::info!("Server started on {}", server.local_addr());

    while server.is_running() {
        server.tick_once();
        log_events(&mut server);

        if args.ticks.is_some_and(|limit| server.tick() >= limit) {
            break;
        }
    }

    log::info!("Server shutting down");
    server.shutdown();
    log_events(&mut server);

    let stats = server.stats();
    log::info!(
        "Ran {} ticks: {} inputs applied, {} snapshots sent, {} packets dropped",
        stats.tick,
        stats.authority.inputs_applied,
        stats.authority.snapshots_sent,
        stats.authority.decode_failures
            + stats.authority.unknown_kinds
            + stats.authority.stale_inputs
            + stats.authority.orphan_inputs
    );

    Ok(())
}

fn log_events(server: &mut GameServer<NetworkEndpoint>) {
    for event in server.drain_events() {
        match event {
            ServerEvent::ClientConnected { player_id, peer } => {
                log::info!("Player {} connected on {}", player_id, peer);
            }
            ServerEvent::ClientDisconnected { player_id, reason } => {
                log::info!("Player {} {}", player_id, reason.as_str());
            }
            ServerEvent::Error { message } => {
                log::error!("{}", message);
            }
        }
    }
}
