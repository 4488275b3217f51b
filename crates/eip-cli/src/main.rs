//! eipctl: inspect EIP provider gateways
//!
//! Loads provider documents and client preferences from disk, then lists
//! ranked gateways, location loads, or renders a VPN profile.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use eip_gateways::{ClientPreferences, GatewaysManager, Provider, TransportType, timezone};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "eipctl", about = "Gateway selection and VPN profile generation for EIP providers")]
struct Args {
    /// Provider eip-service.json
    #[arg(long)]
    eip_service: PathBuf,
    /// Client secrets (ca_cert, provider_private_key, provider_vpn_certificate)
    #[arg(long)]
    secrets: PathBuf,
    /// Geo service answer with a gateway ordering
    #[arg(long)]
    geoip: Option<PathBuf>,
    /// Client preferences (.toml or .json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Client UTC offset in hours, defaults to the local one
    #[arg(long, allow_negative_numbers = true)]
    timezone: Option<i32>,
    /// Debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List gateways in selection order
    Gateways {
        /// Transport to select for, defaults to the preferred one
        #[arg(long)]
        transport: Option<TransportType>,
        /// Only gateways in this city
        #[arg(long)]
        city: Option<String>,
    },
    /// List locations with their load
    Locations {
        /// Sort by load for this transport
        #[arg(long)]
        transport: Option<TransportType>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Render the profile of one gateway
    Profile {
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "openvpn")]
        transport: TransportType,
    },
    /// Provider-wide transport support
    Capabilities,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let preferences = match &args.config {
        Some(path) => ClientPreferences::load(path)
            .with_context(|| format!("loading preferences from {}", path.display()))?,
        None => ClientPreferences::default(),
    };
    let provider = Provider::load(&args.eip_service, &args.secrets, args.geoip.as_deref())
        .context("loading provider documents")?;

    if let Command::Capabilities = args.command {
        println!("locations:         {}", provider.eip_service.locations.len());
        println!(
            "pluggable:         {}",
            provider.supports_pluggable_transports(preferences.use_obfs_vpn)
        );
        println!(
            "experimental:      {}",
            provider.supports_experimental_pluggable_transports()
        );
        return Ok(());
    }

    let client_timezone = args.timezone.unwrap_or_else(timezone::current_offset);
    debug!("Client timezone UTC{:+}", client_timezone);
    let manager = GatewaysManager::with_timezone(&provider, preferences, client_timezone);
    if manager.is_empty() {
        bail!("provider has no usable gateways");
    }

    match args.command {
        Command::Gateways { transport, city } => {
            let transport = transport.unwrap_or_else(|| manager.transport());
            info!("Selecting {} gateways ({} ordering)", transport, manager.strategy());
            let mut n = 0;
            while let Some(gateway) = manager.select_for(n, transport, city.as_deref()) {
                let transports: Vec<&str> = gateway.transports().iter().map(TransportType::as_str).collect();
                println!(
                    "{:>2}. {:<28} {:<16} {:<12} UTC{:+} [{}]",
                    n,
                    gateway.host(),
                    gateway.remote_ip(),
                    gateway.name(),
                    gateway.timezone(),
                    transports.join(", ")
                );
                n += 1;
            }
            if n == 0 {
                println!("No gateway supports {}", transport);
            }
        }
        Command::Locations { transport, json } => {
            let locations = match transport {
                Some(transport) => manager.sorted_gateway_locations(transport),
                None => manager.gateway_locations(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&locations)?);
                return Ok(());
            }
            for location in &locations {
                println!(
                    "{}{:<16} {:<8} load={:.2} gateways={}",
                    if location.selected { "* " } else { "  " },
                    location.name,
                    location.load(),
                    location.average_load,
                    location.number_of_gateways
                );
            }
        }
        Command::Profile { host, transport } => {
            let gateway = manager
                .gateway(&host)
                .with_context(|| format!("unknown gateway {}", host))?;
            let profile = gateway
                .profile(transport)
                .with_context(|| format!("{} does not support {}", host, transport))?;

            println!("{}", profile.config());
            println!();
            for connection in &profile.connections {
                println!("# connection {}", connection);
            }
            if let Some(options) = &profile.obfs4_options {
                println!(
                    "# obfs4 {}:{} iat-mode={} kcp={}",
                    options.gateway_ip, options.port, options.iat_mode, options.use_kcp
                );
            }
            if !profile.is_usable() {
                bail!("profile for {} has no remotes", host);
            }
        }
        Command::Capabilities => {}
    }

    Ok(())
}
