use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use fde_engine::{plan_offline, Engine, EngineConfig};
use fde_graph::TapConfig;
use fde_telemetry::{ServerConfig, TelemetryServer};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("fde-engine")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fault diagnosis engine for distributed control applications")
        .arg_required_else_help(true)
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("serve")
                .about("Run a standalone telemetry server")
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .help("Address to listen on"),
                )
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_parser(value_parser!(u16))
                        .help("Port to listen on"),
                )
                .arg(
                    Arg::new("max-instances")
                        .long("max-instances")
                        .value_parser(value_parser!(u32))
                        .help("Highest tap instance id accepted"),
                )
                .arg(
                    Arg::new("duration")
                        .long("duration")
                        .value_parser(value_parser!(u64))
                        .help("Stop after this many seconds"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Instrument a graph and print its deployment plan")
                .arg(
                    Arg::new("graph")
                        .long("graph")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Application graph (JSON)"),
                )
                .arg(
                    Arg::new("requests")
                        .long("requests")
                        .value_parser(value_parser!(PathBuf))
                        .help("Tap request list (JSON)"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the plan here instead of stdout"),
                )
                .arg(
                    Arg::new("tap-address")
                        .long("tap-address")
                        .help("Telemetry address baked into tap nodes"),
                )
                .arg(
                    Arg::new("tap-port")
                        .long("tap-port")
                        .value_parser(value_parser!(u16))
                        .help("Telemetry port baked into tap nodes"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Run the diagnostic team described by a config file")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Engine config (TOML)"),
                )
                .arg(
                    Arg::new("duration")
                        .long("duration")
                        .value_parser(value_parser!(u64))
                        .help("Stop after this many seconds"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("json-logs"));

    match matches.subcommand() {
        Some(("serve", args)) => serve(args).await,
        Some(("plan", args)) => plan(args),
        Some(("run", args)) => run(args).await,
        _ => Ok(()),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn duration_arg(args: &ArgMatches) -> Option<Duration> {
    args.get_one::<u64>("duration").map(|s| Duration::from_secs(*s))
}

async fn serve(args: &ArgMatches) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(bind) = args.get_one::<String>("bind") {
        config.bind_address.clone_from(bind);
    }
    if let Some(port) = args.get_one::<u16>("port") {
        config.port = *port;
    }
    if let Some(max) = args.get_one::<u32>("max-instances") {
        config.max_instances = *max;
    }

    let mut server = TelemetryServer::new(config);
    let addr = server.start_configured().context("starting telemetry server")?;
    let hub = server.hub();
    println!("Telemetry server listening on {addr}");

    let limit = async {
        match duration_arg(args) {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(limit);
    let mut ticker = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = &mut limit => break,
            _ = ticker.tick() => {
                let queued: usize = (1..=hub.max_instances()).map(|id| hub.in_queue_size(id)).sum();
                info!(connections = hub.connection_count(), queued, "telemetry status");
            }
        }
    }

    server.shutdown();
    Ok(())
}

fn plan(args: &ArgMatches) -> anyhow::Result<()> {
    let graph = args
        .get_one::<PathBuf>("graph")
        .context("--graph is required")?;
    let requests = args.get_one::<PathBuf>("requests");

    let mut tap = TapConfig::default();
    if let Some(address) = args.get_one::<String>("tap-address") {
        tap.server_address.clone_from(address);
    }
    if let Some(port) = args.get_one::<u16>("tap-port") {
        tap.server_port = *port;
    }

    let (plan, result) = plan_offline(graph, requests.map(PathBuf::as_path), tap)?;
    let json = plan.to_json()?;
    match args.get_one::<PathBuf>("output") {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing plan to {}", path.display()))?,
        None => println!("{json}"),
    }

    for failure in &result.failures {
        eprintln!(
            "{}.{}: {}",
            failure.request.node, failure.request.signal, failure.error
        );
    }
    eprintln!(
        "{} taps spliced, {} requests failed, {} commands",
        result.taps.len(),
        result.failures.len(),
        plan.len()
    );
    std::process::exit(if result.is_complete() { 0 } else { 1 });
}

async fn run(args: &ArgMatches) -> anyhow::Result<()> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("--config is required")?;
    let config = EngineConfig::load(path)?;
    let limit = duration_arg(args);

    let engine = Engine::start(&config)?;
    for endpoint in engine.endpoints() {
        println!("{} -> {}", endpoint.worker, endpoint.local_addr);
    }

    let stop = engine.stop_handle();
    let interrupt = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping team");
            interrupt.store(true, Ordering::Release);
        }
    });

    tokio::task::spawn_blocking(move || {
        let mut engine = engine;
        engine.run(limit);
        engine.shutdown();
    })
    .await
    .context("engine thread failed")?;

    stop.store(true, Ordering::Release);
    Ok(())
}
