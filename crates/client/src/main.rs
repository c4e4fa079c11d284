use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;

use trueshot::{InputIntent, NetworkEndpoint};
use trueshot_client::{ClientConfig, ConstantInput, NetworkClient};

#[derive(Parser)]
#[command(name = "trueshot-client")]
#[command(about = "Headless prediction client")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:7777",
        help = "Server address to connect to"
    )]
    server: SocketAddr,

    #[arg(short, long, default_value_t = 500, help = "Number of ticks to simulate")]
    ticks: u32,

    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
    forward: f32,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    right: f32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ClientConfig {
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        ..Default::default()
    };

    let transport = NetworkEndpoint::client()?;
    let mut client = NetworkClient::new(transport, config);
    let running = client.running();
    ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    client.connect_blocking(args.server)?;

    let mut input = ConstantInput::new(InputIntent {
        forward: args.forward,
        right: args.right,
        ..Default::default()
    });
    let completed = client.run_ticks(&mut input, args.ticks)?;
    client.poll_for(Duration::from_millis(250))?;

    let stats = client.stats();
    log::info!(
        "Ran {} ticks: sent {} inputs, applied {}/{} snapshots",
        completed,
        stats.inputs_sent,
        stats.snapshots_applied,
        stats.snapshots_received
    );
    log::info!(
        "Player {:?} at {} (last reconciled tick {:?}, {} pending)",
        client.local_player_id(),
        client.predicted_position(),
        client.predictor().last_reconciled_tick(),
        client.predictor().pending_count()
    );

    client.shutdown();
    Ok(())
}
