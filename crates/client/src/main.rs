mod report;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;

use report::{TickStats, log_event, log_stats};
use tessera::{ClientConfig, ConnectionState, NetworkClient};

#[derive(Parser)]
#[command(name = "tessera-client")]
#[command(about = "Headless tessera protocol client")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = tessera::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long)]
    user: String,

    #[arg(long, default_value = "")]
    pass: String,

    #[arg(short, long, default_value = "main")]
    realm: String,

    #[arg(short, long, default_value_t = 30)]
    tick_rate: u32,

    #[arg(
        long,
        default_value_t = 0,
        help = "Stop after this many ticks (0 runs until disconnected)"
    )]
    ticks: u64,

    #[arg(long, default_value_t = 10, help = "Seconds between statistics reports")]
    stats_every: u64,

    #[arg(long, help = "Reconnect automatically after losing the link")]
    reconnect: bool,

    #[arg(long, help = "Walk the local player in a circle once in game")]
    wander: bool,

    #[arg(long, default_value_t = 10, help = "Connect timeout in seconds")]
    timeout: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ClientConfig::default();
    config.reconnect.enabled = args.reconnect;
    config.connection.connect_timeout = Duration::from_secs(args.timeout);

    let mut client = NetworkClient::with_tcp(config);
    client
        .connect_default(&args.host, args.port)
        .with_context(|| format!("connecting to {}:{}", args.host, args.port))?;

    run(&mut client, &args)?;

    client.disconnect();
    for event in client.poll_events() {
        log_event(&event);
    }
    log_stats(&client.stats(), None);
    Ok(())
}

fn run(client: &mut NetworkClient, args: &Args) -> Result<()> {
    let tick_interval = Duration::from_secs(1) / args.tick_rate.max(1);
    let stats_interval = Duration::from_secs(args.stats_every.max(1));
    let mut tick_stats = TickStats::new();
    let mut last_report = Instant::now();
    let mut logged_in = false;
    let mut angle = 0.0f32;
    let mut count = 0u64;

    loop {
        let started = Instant::now();
        client.tick();
        tick_stats.record_tick();
        count += 1;

        for event in client.poll_events() {
            log_event(&event);
        }

        match client.state() {
            ConnectionState::Connected if !logged_in => {
                client.login(&args.user, &args.pass, &args.realm)?;
                logged_in = true;
            }
            ConnectionState::InGame if args.wander => {
                angle += tick_interval.as_secs_f32();
                let origin = client.local_entity().map_or(Vec2::ZERO, |e| e.position);
                let velocity = Vec2::from_angle(angle) * 2.0;
                let position = origin + velocity * tick_interval.as_secs_f32();
                client.report_local_movement(position, velocity, velocity.to_angle())?;
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                if !client.connection().is_reconnect_pending() {
                    log::info!("link down, stopping");
                    return Ok(());
                }
                logged_in = false;
            }
            _ => {}
        }

        if last_report.elapsed() >= stats_interval {
            log_stats(&client.stats(), Some(&tick_stats));
            last_report = Instant::now();
        }

        if args.ticks > 0 && count >= args.ticks {
            return Ok(());
        }

        if let Some(remaining) = tick_interval.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
}
