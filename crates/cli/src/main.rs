use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use drift::{
    ClientConfig, ClientSession, DEFAULT_PORT, DirectionalInput, HostConfig, HostSession,
    NetAddress,
};

#[derive(Parser)]
#[command(name = "drift")]
#[command(about = "Synchronized movement host and client")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the authoritative host
    Host {
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Join a running host
    Client {
        #[arg(short, long, default_value = "127.0.0.1")]
        address: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Use the datagram transport instead of a stream
        #[arg(long)]
        udp: bool,
    },
}

const TICK: Duration = Duration::from_millis(16);
const REPORT_EVERY: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("installing ctrl-c handler")?;

    match args.command {
        Command::Host { port } => run_host(port, running),
        Command::Client { address, port, udp } => run_client(&address, port, udp, running),
    }
}

fn run_host(port: u16, running: Arc<AtomicBool>) -> Result<()> {
    let mut session = HostSession::new(HostConfig::default());
    session
        .listen(port)
        .with_context(|| format!("listening on port {port}"))?;

    let mut population = session.world().len();
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        session.tick(TICK.as_secs_f64(), DirectionalInput::default());

        if session.world().len() != population {
            population = session.world().len();
            info!("{population} entities in play");
        }

        sleep_remainder(started);
    }

    info!("shutting down");
    session.shutdown();
    Ok(())
}

fn run_client(address: &str, port: u16, udp: bool, running: Arc<AtomicBool>) -> Result<()> {
    let target =
        NetAddress::parse(address, port).with_context(|| format!("invalid address {address}"))?;

    let mut session = ClientSession::new(ClientConfig::default());
    if udp {
        session
            .connect_datagram(target)
            .with_context(|| format!("reaching {target} over udp"))?;
    } else {
        session
            .connect(target)
            .with_context(|| format!("connecting to {target}"))?;
    }

    // Input capture lives outside this binary; the session is driven with
    // no directions held.
    let mut last_report = Instant::now();
    while running.load(Ordering::SeqCst) && session.is_connected() {
        let started = Instant::now();
        session.tick(TICK.as_secs_f64(), DirectionalInput::default());

        if last_report.elapsed() >= REPORT_EVERY {
            last_report = Instant::now();
            if let Some(local) = session.world().local() {
                info!(
                    "{}: at ({:.1}, {:.1}), {} entities visible",
                    local.id,
                    local.position.x,
                    local.position.y,
                    session.world().len()
                );
            }
        }

        sleep_remainder(started);
    }

    info!("disconnecting");
    session.disconnect();
    Ok(())
}

fn sleep_remainder(started: Instant) {
    let elapsed = started.elapsed();
    if elapsed < TICK {
        thread::sleep(TICK - elapsed);
    }
}
