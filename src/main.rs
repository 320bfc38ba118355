//! Keyscope - Bounded Keyspace Sampling
//!
//! Command-line entry point. Samples one store, prints the report as JSON on
//! stdout and logs progress on stderr.

use anyhow::{bail, Context};
use keyscope::config::{Credentials, NodeAddr, ScanConfig, Topology};
use keyscope::connection::TcpConnector;
use keyscope::sampler::Sampler;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable read when `--password` is not given
const PASSWORD_ENV: &str = "KEYSCOPE_PASSWORD";

/// Parsed command line
#[derive(Debug)]
struct Cli {
    host: String,
    port: u16,
    cluster: Vec<NodeAddr>,
    sentinels: Vec<NodeAddr>,
    master_name: String,
    username: Option<String>,
    password: Option<String>,
    connect_timeout: Option<Duration>,
    scan: ScanConfig,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            host: keyscope::DEFAULT_HOST.to_string(),
            port: keyscope::DEFAULT_PORT,
            cluster: Vec::new(),
            sentinels: Vec::new(),
            master_name: String::new(),
            username: None,
            password: None,
            connect_timeout: None,
            scan: ScanConfig::default(),
        }
    }
}

/// What the command line asks for
#[derive(Debug)]
enum Action {
    Sample(Box<Cli>),
    Help,
    Version,
}

fn parse_list<T, E>(value: &str, flag: &str) -> anyhow::Result<Vec<T>>
where
    T: std::str::FromStr<Err = E>,
    E: std::error::Error + Send + Sync + 'static,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("invalid value for {}: {:?}", flag, s)))
        .collect()
}

fn parse_num<T>(value: &str, flag: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value for {}: {:?}", flag, value))
}

impl Cli {
    /// Parse the command line (without the program name)
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Action> {
        let mut cli = Cli::default();
        let mut dbs: Vec<u32> = Vec::new();
        let mut args = args.into_iter();

        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--help" => return Ok(Action::Help),
                "--version" | "-v" => return Ok(Action::Version),
                "--no-discovery" => {
                    cli.scan.discover_cluster_nodes = false;
                    continue;
                }
                _ => {}
            }

            let Some(value) = args.next() else {
                bail!("{} requires a value", flag);
            };
            match flag.as_str() {
                "--host" | "-h" => cli.host = value,
                "--port" | "-p" => cli.port = parse_num(&value, &flag)?,
                "--db" | "-n" => dbs.extend(parse_list::<u32, _>(&value, &flag)?),
                "--cluster" => cli.cluster = parse_list(&value, &flag)?,
                "--sentinel" => cli.sentinels = parse_list(&value, &flag)?,
                "--master-name" => cli.master_name = value,
                "--user" => cli.username = Some(value),
                "--password" | "-a" => cli.password = Some(value),
                "--limit" => cli.scan.sample_limit = parse_num(&value, &flag)?,
                "--count" => cli.scan.scan_count = parse_num(&value, &flag)?,
                "--top" => cli.scan.size_top_n = parse_num(&value, &flag)?,
                "--depth" => cli.scan.max_depth = parse_num(&value, &flag)?,
                "--delimiter" => cli.scan.delimiter = value,
                "--stride" => cli.scan.size_stride = parse_num(&value, &flag)?,
                "--match" => cli.scan.match_pattern = Some(value),
                "--ttl-buckets" => cli.scan.ttl_buckets = parse_list::<u64, _>(&value, &flag)?,
                "--idle-buckets" => cli.scan.idle_buckets = parse_list::<u64, _>(&value, &flag)?,
                "--timeout-ms" => {
                    let ms: u64 = parse_num(&value, &flag)?;
                    cli.scan.deadline = Some(Duration::from_millis(ms));
                }
                "--connect-timeout-ms" => {
                    let ms: u64 = parse_num(&value, &flag)?;
                    cli.connect_timeout = Some(Duration::from_millis(ms));
                }
                other => bail!("unknown argument: {}", other),
            }
        }

        if !dbs.is_empty() {
            cli.scan.dbs = dbs;
        }
        Ok(Action::Sample(Box::new(cli)))
    }

    /// Cluster seeds win over sentinels, sentinels over a single host.
    fn topology(&self) -> Topology {
        if !self.cluster.is_empty() {
            Topology::Cluster {
                nodes: self.cluster.clone(),
            }
        } else if !self.sentinels.is_empty() {
            Topology::Sentinel {
                sentinels: self.sentinels.clone(),
                master_name: self.master_name.clone(),
            }
        } else {
            Topology::Standalone {
                node: NodeAddr::new(self.host.clone(), self.port),
            }
        }
    }

    fn credentials(&self) -> Option<Credentials> {
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV).ok())?;
        Some(Credentials {
            username: self.username.clone(),
            password,
        })
    }
}

fn print_help() {
    println!(
        r#"
Keyscope - Bounded keyspace sampling for Redis-compatible stores

USAGE:
    keyscope [OPTIONS]

CONNECTION:
    -h, --host <HOST>              Standalone host (default: 127.0.0.1)
    -p, --port <PORT>              Standalone port (default: 6379)
    -n, --db <N[,N...]>            Databases to scan (default: 0)
        --cluster <ADDR[,ADDR...]> Cluster seed nodes, host:port
        --no-discovery             Scan the seeds as given, skip CLUSTER NODES
        --sentinel <ADDR[,ADDR...]> Sentinels, host:port
        --master-name <NAME>       Master monitored by the sentinels
        --user <USER>              ACL user name
    -a, --password <PASSWORD>      Password (or ${env})
        --connect-timeout-ms <MS>  TCP connect timeout (default: 5000)

SAMPLING:
        --limit <N>                Maximum keys sampled (default: 10000)
        --count <N>                SCAN COUNT hint (default: 500)
        --match <GLOB>             SCAN MATCH pattern
        --stride <N>               Estimate size of every Nth key (default: 10)
        --timeout-ms <MS>          Stop after this long, keep partial results

AGGREGATION:
        --delimiter <STR>          Key segment separator (default: ":")
        --depth <N>                Deepest prefix level (default: 3)
        --top <N>                  Largest keys kept per type (default: 20)
        --ttl-buckets <S[,S...]>   TTL histogram bounds in seconds
        --idle-buckets <S[,S...]>  Idle histogram bounds in seconds

    -v, --version                  Print version information
        --help                     Print this help message

Logging goes to stderr and follows RUST_LOG (default: info).

EXAMPLES:
    keyscope --limit 50000 --match 'session:*'
    keyscope --cluster 10.0.0.1:7000,10.0.0.2:7000 --timeout-ms 30000
    keyscope --sentinel 10.0.0.9:26379 --master-name mymaster
"#,
        env = PASSWORD_ENV
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::parse(std::env::args().skip(1))? {
        Action::Sample(cli) => cli,
        Action::Help => {
            print_help();
            return Ok(());
        }
        Action::Version => {
            println!("keyscope version {}", keyscope::VERSION);
            return Ok(());
        }
    };

    // Set up logging; stdout is reserved for the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let topology = cli.topology();
    let mut connector = TcpConnector::new(cli.credentials());
    if let Some(timeout) = cli.connect_timeout {
        connector = connector.with_connect_timeout(timeout);
    }
    let stats = Arc::clone(connector.stats());
    let sampler = Sampler::new(connector, cli.scan);

    let report = tokio::select! {
        report = sampler.sample(&topology) => report.context("invalid configuration")?,
        _ = signal::ctrl_c() => bail!("interrupted"),
    };

    info!(
        sessions = stats.sessions_opened.load(Ordering::Relaxed),
        round_trips = stats.round_trips.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        "Connection totals"
    );
    for error in &report.sample_stats.errors {
        warn!("{}", error);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
