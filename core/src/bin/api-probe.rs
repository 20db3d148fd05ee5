//! Resolve a service's configuration and send one request against it.
//!
//! ```text
//! ACCOUNT_API_BASE_URI=https://x.test api-probe -s account POST /account \
//!     -H X-Trace:1 --data '{"actions":[]}'
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use harness_core::{
    ConfigResolver, ConfigSources, LastResponseStore, Overrides, PropertySource, RequestExecutor,
    RequestSpec,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "api-probe", about = "Send one configured request and print the response")]
struct Args {
    /// Service name (e.g. `account`). Without it the global `API_*`
    /// configuration is used.
    #[arg(short, long)]
    service: Option<String>,

    /// HTTP method: GET, POST, PUT, PATCH or DELETE.
    method: String,

    /// Resource path, may contain `{name}` placeholders.
    resource: String,

    /// Header as `Name:Value`. Repeatable.
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Query parameter as `name=value`. Repeatable.
    #[arg(short = 'q', long = "query", value_parser = parse_pair)]
    query: Vec<(String, String)>,

    /// Path parameter as `name=value`. Repeatable.
    #[arg(short = 'p', long = "path-param", value_parser = parse_pair)]
    path_params: Vec<(String, String)>,

    /// Request body, sent verbatim.
    #[arg(long)]
    data: Option<String>,

    /// Override as `api.key=value`. Repeatable.
    #[arg(short = 'D', value_parser = parse_pair)]
    overrides: Vec<(String, String)>,

    /// Properties file (default: `$API_PROPERTIES_FILE` or `api.properties`).
    #[arg(long)]
    properties: Option<PathBuf>,
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{s}'"))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected Name:Value, got '{s}'"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> anyhow::Result<u16> {
    let overrides = args
        .overrides
        .iter()
        .fold(Overrides::new(), |o, (k, v)| o.set(k.as_str(), v.as_str()));
    let mut sources = ConfigSources::from_process()?.with_overrides(overrides);
    if let Some(path) = &args.properties {
        sources = sources.with_properties(PropertySource::load(path)?);
    }
    let resolver = ConfigResolver::new(Arc::new(sources));

    let config = match &args.service {
        Some(service) => resolver.resolve(service),
        None => resolver.resolve_global(),
    };
    let store = Arc::new(LastResponseStore::new());
    let executor = RequestExecutor::from_config(&config, Arc::clone(&store))?;

    let mut spec = RequestSpec::new(args.method, args.resource);
    spec.headers.extend(args.headers);
    spec.query_params.extend(args.query);
    spec.path_params.extend(args.path_params);
    spec.body = args.data;

    let record = executor.execute(spec).context("request failed")?;
    println!("{} {}", record.status(), record.url());
    for (name, value) in record.headers() {
        println!("{name}: {value}");
    }
    println!();
    println!("{}", record.text());
    Ok(record.status())
}

fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()) {
        Ok(status) if status < 400 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
