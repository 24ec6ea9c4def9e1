// This is the entry point for probing a single node from the command line
// Everything interesting lives in the library; here I only wire options to a peer
use bitcoin::p2p::message::NetworkMessage;
use btc_probe::{ClientConfig, Command, Opt, Peer};
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{debug, error, LevelFilter};
use std::error::Error;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    let opt = Opt::parse();

    // Info is enough to follow a probe; --verbose shows every protocol step
    let level = if opt.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::builder().filter_level(level).init();

    if let Err(e) = run(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), Box<dyn Error>> {
    // One config for the whole run; every peer gets a cheap Arc clone
    let config = Arc::new(load_config(&opt)?);

    // Each command opens its own connection and always closes it, even on error
    match opt.command {
        Command::Handshake { address } => {
            let mut peer = connect_and_handshake(config, &address)?;
            let report = peer.report();
            peer.disconnect();

            // The report is JSON so I can pipe it straight into crawl results
            let report = report.ok_or("handshake finished without a report")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::GetAddr { address, wait } => {
            let mut peer = connect_and_handshake(config, &address)?;
            let result = request_addresses(&mut peer, Duration::from_secs(wait));
            peer.disconnect();
            for line in result? {
                println!("{line}");
            }
        }
        Command::Watch { address, count } => {
            let mut peer = connect_and_handshake(config, &address)?;
            let result = watch_messages(&mut peer, count);
            peer.disconnect();
            result?;
        }
    }
    Ok(())
}

// Settings come from the file first, then the environment, then the command line
fn load_config(opt: &Opt) -> Result<ClientConfig, Box<dyn Error>> {
    let mut config = match &opt.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    }
    .with_env_overrides()?;

    // Flags only override what was actually passed
    if let Some(network) = opt.network {
        config = config.with_network(network.into());
    }
    if let Some(version) = opt.protocol_version {
        config = config.with_protocol_version(version);
    }
    // 0 means no explicit connect deadline
    if let Some(secs) = opt.timeout {
        config = config.with_connect_timeout(Duration::from_secs(secs));
    }
    config.validate()?;
    Ok(config)
}

fn connect_and_handshake(
    config: Arc<ClientConfig>,
    address: &str,
) -> Result<Peer, Box<dyn Error>> {
    let mut peer: Peer = Peer::new(config, address);
    peer.connect()?;
    // A failed handshake leaves the socket open, so I close it here
    if let Err(e) = peer.handshake() {
        peer.disconnect();
        return Err(e.into());
    }
    Ok(peer)
}

// I keep answering pings while waiting, otherwise some nodes drop me
fn request_addresses(peer: &mut Peer, wait: Duration) -> Result<Vec<String>, Box<dyn Error>> {
    peer.send_message(NetworkMessage::GetAddr)?;
    // The wait covers the whole exchange, not each message
    let deadline = Instant::now() + wait;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(format!("[{}] No addr reply within {wait:?}", peer.get_address()).into());
        }

        let (message, _) = peer.receive_message_timeout(remaining)?;
        match message {
            NetworkMessage::Ping(nonce) => peer.send_message(NetworkMessage::Pong(nonce))?,
            NetworkMessage::Addr(entries) => {
                return Ok(entries
                    .into_iter()
                    .map(|(_, address)| match address.socket_addr() {
                        Ok(socket_addr) => socket_addr.to_string(),
                        Err(_) => format!("unroutable:{}", address.port),
                    })
                    .collect());
            }
            // Newer nodes may answer with addrv2 entries (Tor, I2P and so on)
            NetworkMessage::AddrV2(entries) => {
                return Ok(entries
                    .into_iter()
                    .map(|entry| match entry.socket_addr() {
                        Ok(socket_addr) => socket_addr.to_string(),
                        Err(_) => format!("{:?}:{}", entry.addr, entry.port),
                    })
                    .collect());
            }
            other => debug!(
                "[{}] Ignoring {} while waiting for addr",
                peer.get_address(),
                other.command()
            ),
        }
    }
}

// I print the raw payload in hex so I can decode anything odd by hand later
fn watch_messages(peer: &mut Peer, count: usize) -> Result<(), Box<dyn Error>> {
    for _ in 0..count {
        let (message, payload) = peer.receive_message()?;
        println!(
            "{} ({} bytes) {}",
            message.command(),
            payload.len(),
            HEXLOWER.encode(&payload)
        );
        if let NetworkMessage::Ping(nonce) = message {
            peer.send_message(NetworkMessage::Pong(nonce))?;
        }
    }
    Ok(())
}
