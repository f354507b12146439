use anyhow::Result;
use clap::{Parser, Subcommand};
use scaled_ep_xdp::DEFAULT_PIN_DIR;
use std::{net::Ipv4Addr, path::PathBuf};

mod commands;
mod utils;

/// Scaled-endpoint transit stage command line interface
#[derive(Parser)]
#[clap(name = "sep", author, version, about)]
struct Cli {
    /// Sets the level of verbosity
    #[clap(short, long, global = true)]
    verbose: bool,

    /// bpffs directory holding the pinned maps and links
    #[clap(long, global = true, default_value = DEFAULT_PIN_DIR)]
    pin_dir: PathBuf,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the XDP program
    Xdp {
        #[clap(subcommand)]
        cmd: XdpCommands,
    },

    /// Manage scaled endpoints in the running program
    Endpoint {
        #[clap(subcommand)]
        cmd: EndpointCommands,
    },

    /// Manage the interface identity of the running program
    Iface {
        #[clap(subcommand)]
        cmd: IfaceCommands,
    },

    /// Write the interface and endpoints of a configuration file
    Apply {
        /// Configuration file (TOML, JSON or YAML)
        config: PathBuf,
    },

    /// Build a Geneve-encapsulated test frame
    Craft {
        /// Output file for the raw frame
        #[clap(short, long)]
        out: PathBuf,

        /// Virtual network identifier
        #[clap(long, default_value = "1")]
        vni: u32,

        /// Inner source address and port
        #[clap(long, default_value = "192.168.1.10:40000")]
        src: String,

        /// Inner destination (virtual) address and port
        #[clap(long, default_value = "10.0.0.3:80")]
        dst: String,

        /// Inner protocol: udp, tcp, icmp or a protocol number
        #[clap(long, default_value = "udp")]
        proto: String,

        /// Outer IPv4 time-to-live
        #[clap(long, default_value = "64")]
        ttl: u8,

        /// Truncate the frame to this many bytes
        #[clap(long)]
        truncate: Option<usize>,
    },

    /// Run the decision engine offline over frame files
    Decide {
        /// Configuration file providing the interface and endpoints
        #[clap(short, long)]
        config: PathBuf,

        /// Frame files as written by `craft`
        #[clap(required = true)]
        frames: Vec<PathBuf>,

        /// Write the rewritten frame of a single input here
        #[clap(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum XdpCommands {
    /// Load the XDP program, attach it and pin it
    Load {
        /// Path to the XDP object file
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Interface to attach to
        #[clap(short, long)]
        interface: Option<String>,

        /// Configuration to apply once loaded
        #[clap(short, long)]
        config: Option<PathBuf>,

        /// Use SKB mode (slower but more compatible)
        #[clap(long)]
        skb_mode: bool,

        /// Use hardware offload
        #[clap(long)]
        offload: bool,
    },

    /// Detach the XDP program and remove its pins
    Unload {
        /// Interface to detach from
        #[clap(short, long)]
        interface: String,
    },

    /// Show decision counters of the running program
    Stats {
        /// Print as JSON
        #[clap(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum EndpointCommands {
    /// Add or replace a scaled endpoint
    Add {
        /// Virtual network identifier (24 bits)
        #[clap(long)]
        vni: u32,

        /// Virtual service address
        #[clap(long)]
        vip: Ipv4Addr,

        /// Backend addresses in selection order
        #[clap(long, value_delimiter = ',')]
        backends: Vec<Ipv4Addr>,
    },

    /// Remove a scaled endpoint
    Remove {
        #[clap(long)]
        vni: u32,

        #[clap(long)]
        vip: Ipv4Addr,
    },

    /// Show all scaled endpoints
    Show,
}

#[derive(Subcommand)]
enum IfaceCommands {
    /// Set the local tunnel address and interface index
    Set {
        #[clap(long)]
        ip: Ipv4Addr,

        #[clap(long)]
        ifindex: u32,
    },

    /// Show the interface identity
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "debug" } else { "info" },
    ))
    .init();

    match cli.command {
        Commands::Xdp { cmd } => commands::xdp::handle_command(cmd, &cli.pin_dir).await,
        Commands::Endpoint { cmd } => {
            commands::endpoint::handle_command(cmd, &cli.pin_dir).await
        }
        Commands::Iface { cmd } => commands::iface::handle_command(cmd, &cli.pin_dir).await,
        Commands::Apply { config } => commands::apply::apply_config(&config, &cli.pin_dir).await,
        Commands::Craft {
            out,
            vni,
            src,
            dst,
            proto,
            ttl,
            truncate,
        } => commands::offline::craft(commands::offline::CraftArgs {
            out,
            vni,
            src,
            dst,
            proto,
            ttl,
            truncate,
        }),
        Commands::Decide {
            config,
            frames,
            out,
        } => commands::offline::decide(&config, &frames, out.as_deref()),
    }
}
