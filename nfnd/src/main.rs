use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use clap::{value_parser, Arg, ArgMatches, Command};
use log::{error, info};
use nfn_core::Suite;

mod config;
mod daemon;
mod prepopulate;
mod transport;

use config::{Config, InterfaceConfig};
use daemon::Daemon;

fn cli() -> Command {
    Command::new("nfnd")
        .version("0.1.0")
        .about("NFN relay - forwards named data and evaluates named-function expressions")
        .arg(
            Arg::new("config")
                .short('f')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/nfn/nfnd.toml"),
        )
        .arg(
            Arg::new("udp-port")
                .short('u')
                .long("udp-port")
                .value_name("PORT")
                .help("Listen for UDP datagrams on this port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("unix-path")
                .short('x')
                .long("unix-path")
                .value_name("PATH")
                .help("Listen on a Unix datagram socket at this path")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Pre-populate the cache from encoded Content packets in this directory")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("suite")
                .short('s')
                .long("suite")
                .value_name("SUITE")
                .help("Wire suite (ndn2013)"),
        )
        .arg(
            Arg::new("cache-entries")
                .short('c')
                .long("cache-entries")
                .value_name("N")
                .help("Maximum cache entries, 0 disables caching")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("inter-packet-interval")
                .short('g')
                .long("inter-packet-interval")
                .value_name("USEC")
                .help("Minimum gap between datagrams on an interface")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("inter-interest-interval")
                .short('i')
                .long("inter-interest-interval")
                .value_name("USEC")
                .help("Minimum gap between packets sent to a face")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbosity")
                .value_name("LEVEL")
                .help("Log level (error, warn, info, debug, trace)"),
        )
}

/// Command line flags take precedence over the configuration file
fn apply_overrides(config: &mut Config, matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(suite) = matches.get_one::<String>("suite") {
        config.relay.suite = suite.parse::<Suite>()?;
    }
    if let Some(entries) = matches.get_one::<usize>("cache-entries") {
        config.relay.max_cache_entries = Some(*entries);
    }
    if let Some(interval) = matches.get_one::<u64>("inter-packet-interval") {
        config.relay.inter_packet_interval_us = *interval;
    }
    if let Some(interval) = matches.get_one::<u64>("inter-interest-interval") {
        config.relay.inter_interest_interval_us = *interval;
    }
    if let Some(dir) = matches.get_one::<PathBuf>("data-dir") {
        config.data_dir = Some(dir.clone());
    }
    if let Some(port) = matches.get_one::<u16>("udp-port") {
        config.interfaces.push(InterfaceConfig::Udp {
            bind: SocketAddr::from(([0, 0, 0, 0], *port)),
        });
    }
    if let Some(path) = matches.get_one::<PathBuf>("unix-path") {
        config.interfaces.push(InterfaceConfig::Unix { path: path.clone() });
    }
    if let Some(level) = matches.get_one::<String>("verbosity") {
        config.logging.level = level.clone();
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let matches = cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .cloned()
        .unwrap_or_default();
    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };
    if let Err(e) = apply_overrides(&mut config, &matches) {
        eprintln!("Invalid arguments: {:#}", e);
        process::exit(1);
    }

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level));
    if let Some(level) = matches.get_one::<String>("verbosity") {
        logger.parse_filters(level);
    }
    logger.init();

    info!("Starting NFN relay daemon");
    info!("Config file: {}", config_path);
    info!("Using suite {}", config.relay.suite);

    let mut daemon = match Daemon::new(config) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = daemon.start().await {
        error!("Failed to start daemon: {:#}", e);
        process::exit(1);
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
        }
    };
    if let Err(e) = daemon.run_until(shutdown).await {
        error!("Relay stopped: {:#}", e);
    }

    info!("Shutting down NFN relay daemon");
    daemon.stop();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let matches = cli()
            .try_get_matches_from(["nfnd", "-c", "0", "-g", "250", "-i", "1000", "-u", "9001", "-x", "/tmp/nfn.sock", "-d", "/srv/nfn"])
            .unwrap();
        let mut config = Config::default();
        apply_overrides(&mut config, &matches).unwrap();

        assert_eq!(config.relay.max_cache_entries, Some(0));
        assert!(!config.relay.caching_enabled());
        assert_eq!(config.relay.inter_packet_interval_us, 250);
        assert_eq!(config.relay.inter_interest_interval_us, 1000);
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/nfn")));
        assert_eq!(
            config.interfaces,
            vec![
                InterfaceConfig::Udp {
                    bind: "0.0.0.0:9001".parse().unwrap()
                },
                InterfaceConfig::Unix {
                    path: PathBuf::from("/tmp/nfn.sock")
                },
            ]
        );
    }

    #[test]
    fn test_unknown_suite() {
        let matches = cli().try_get_matches_from(["nfnd", "-s", "morse"]).unwrap();
        assert!(apply_overrides(&mut Config::default(), &matches).is_err());
    }

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }
}
