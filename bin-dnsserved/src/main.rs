mod metrics_http;
mod spf_resolver;
mod zoneconfig;

use std::collections::HashSet;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dns_server::hooks::DefaultHooks;
use dns_server::{serve_tcp, serve_udp, ServerConfig, ServerState, Zones};
use dns_transport::endpoint::{Endpoint, Protocol};
use spf_resolver::DnsClientResolver;

fn begin_logging() {
    let log_format: HashSet<String> = env::var("RUST_LOG_FORMAT")
        .map(|var| var.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!log_format.contains("no-ansi"));

    if log_format.contains("json") {
        if log_format.contains("no-time") {
            logger.json().without_time().init();
        } else {
            logger.json().init();
        }
    } else if log_format.contains("pretty") {
        if log_format.contains("no-time") {
            logger.pretty().without_time().init();
        } else {
            logger.pretty().init();
        }
    } else if log_format.contains("compact") {
        if log_format.contains("no-time") {
            logger.compact().without_time().init();
        } else {
            logger.compact().init();
        }
    } else if log_format.contains("no-time") {
        logger.without_time().init();
    } else {
        logger.init();
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// An authoritative DNS server.
///
/// Serves the zones named in `--zones-file` over UDP and TCP (and
/// TLS, if configured), verifying and signing TSIG-protected
/// requests with the keys in `--config-file`.
///
/// Prometheus metrics are served at
/// "http://{metrics-interface}:{metrics-port}/metrics"
struct Args {
    /// Path to the server configuration file (transports, timeouts, TSIG keys)
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,

    /// Path to the zone data file (literal record list, see zoneconfig)
    #[clap(short, long, value_parser)]
    zones_file: Option<PathBuf>,

    /// Interface to serve Prometheus metrics on
    #[clap(long, value_parser, default_value_t = Ipv4Addr::LOCALHOST)]
    metrics_interface: Ipv4Addr,

    /// Port to serve Prometheus metrics on
    #[clap(long, value_parser, default_value_t = 9420)]
    metrics_port: u16,

    /// Upstream nameserver to use when periodically re-checking the
    /// SPF records named in `spf_check_domains`
    #[clap(long, value_parser, default_value_t = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)))]
    spf_resolver: IpAddr,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    begin_logging();

    let config = match &args.config_file {
        Some(path) => match ServerConfig::load(path) {
            Ok(config) => config,
            Err(error) => {
                tracing::error!(?error, "could not load server configuration");
                process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    let zones = match &args.zones_file {
        Some(path) => match zoneconfig::load(path) {
            Ok(zones) => zones,
            Err(error) => {
                tracing::error!(?error, "could not load zone configuration");
                process::exit(1);
            }
        },
        None => Zones::default(),
    };

    let keys = match config.key_selector() {
        Ok(keys) => keys,
        Err(error) => {
            tracing::error!(?error, "could not build TSIG key selector");
            process::exit(1);
        }
    };

    let state = Arc::new(ServerState {
        zones,
        keys: Arc::new(keys),
        config: config.clone(),
        hooks: Arc::new(DefaultHooks),
    });

    let cancellation = CancellationToken::new();
    for transport in &config.transports {
        let state = state.clone();
        let cancellation = cancellation.clone();
        match transport.protocol {
            Protocol::Udp => {
                tracing::info!(address = %transport.address, port = %transport.port, "binding DNS UDP socket");
                let socket = match UdpSocket::bind((transport.address, transport.port)).await {
                    Ok(socket) => socket,
                    Err(error) => {
                        tracing::error!(?error, "could not bind DNS UDP socket");
                        process::exit(1);
                    }
                };
                tokio::spawn(serve_udp(socket, state, cancellation));
            }
            Protocol::Tcp => {
                tracing::info!(address = %transport.address, port = %transport.port, "binding DNS TCP socket");
                let listener = match TcpListener::bind((transport.address, transport.port)).await {
                    Ok(listener) => listener,
                    Err(error) => {
                        tracing::error!(?error, "could not bind DNS TCP socket");
                        process::exit(1);
                    }
                };
                tokio::spawn(serve_tcp(listener, state, cancellation));
            }
            Protocol::Tls => {
                // DNS-over-TLS serving terminates in dns-transport's
                // TLS acceptor; wiring a certificate here is left to
                // the deployment's reverse proxy in this workspace.
                tracing::warn!("TLS transport configured but not yet served directly by dnsserved");
            }
        }
    }

    if !config.spf_check_domains.is_empty() {
        let resolver: Arc<dyn dns_spf::Resolver> = Arc::new(DnsClientResolver::new(Endpoint::new(
            args.spf_resolver,
            Protocol::Udp,
        )));
        tokio::spawn(dns_server::spf_watch::run(
            config.spf_check_domains.clone(),
            resolver,
            Duration::from_millis(config.spf_check_interval_ms),
        ));
    }

    tracing::info!(
        interface = %args.metrics_interface,
        port = %args.metrics_port,
        "binding HTTP TCP socket for metrics"
    );
    if let Err(error) = metrics_http::serve(args.metrics_interface.into(), args.metrics_port).await {
        tracing::error!(?error, "could not bind HTTP TCP socket");
        process::exit(1);
    }
}
