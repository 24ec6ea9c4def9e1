use bitcoin::Network;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// Networks a node can be probed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkArg {
    Bitcoin,
    Testnet,
    Signet,
    Regtest,
}

impl FromStr for NetworkArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bitcoin" | "main" | "mainnet" => Ok(NetworkArg::Bitcoin),
            "testnet" | "test" => Ok(NetworkArg::Testnet),
            "signet" => Ok(NetworkArg::Signet),
            "regtest" => Ok(NetworkArg::Regtest),
            _ => Err(format!(
                "Invalid network: {s}. Valid options: bitcoin, testnet, signet, regtest"
            )),
        }
    }
}

impl std::fmt::Display for NetworkArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkArg::Bitcoin => write!(f, "bitcoin"),
            NetworkArg::Testnet => write!(f, "testnet"),
            NetworkArg::Signet => write!(f, "signet"),
            NetworkArg::Regtest => write!(f, "regtest"),
        }
    }
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Network {
        match arg {
            NetworkArg::Bitcoin => Network::Bitcoin,
            NetworkArg::Testnet => Network::Testnet,
            NetworkArg::Signet => Network::Signet,
            NetworkArg::Regtest => Network::Regtest,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "btc-probe")]
pub struct Opt {
    #[arg(long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Network to speak (bitcoin, testnet, signet, regtest)"
    )]
    pub network: Option<NetworkArg>,
    #[arg(
        long = "protocol-version",
        global = true,
        help = "Protocol version to announce"
    )]
    pub protocol_version: Option<u32>,
    #[arg(long, global = true, help = "Connect timeout in seconds, 0 leaves it to the OS")]
    pub timeout: Option<u64>,
    #[arg(short, long, global = true, help = "Log protocol progress")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        name = "handshake",
        about = "Run the version handshake and print what the node reported"
    )]
    Handshake {
        #[arg(help = "Node address as host:port")]
        address: String,
    },
    #[command(name = "getaddr", about = "Ask a node for the addresses it knows")]
    GetAddr {
        #[arg(help = "Node address as host:port")]
        address: String,
        #[arg(long, default_value_t = 30, help = "Seconds to wait for a reply")]
        wait: u64,
    },
    #[command(name = "watch", about = "Print messages a node sends after the handshake")]
    Watch {
        #[arg(help = "Node address as host:port")]
        address: String,
        #[arg(long, default_value_t = 10, help = "Number of messages to print")]
        count: usize,
    },
}
