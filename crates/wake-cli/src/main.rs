mod platform;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use wake_nav::background::KeepAliveSwitch;
use wake_nav::doctor as nav_doctor;
use wake_nav::engine::{Collaborators, ProximityEngine, Target};
use wake_nav::geo::{destination_point, distance_m};
use wake_nav::gnss::{Authorization, GnssSource, SimulatedTrack};
use wake_nav::policy::{AlertDuration, AlertModality, Radius};
use wake_nav::Coordinate;
use wake_proto::events::EngineEvent;
use wake_store::{DestinationStore, KvStore, SavedDestination, SettingsStore};

use platform::{TerminalAlert, TerminalNotifier};

#[derive(Debug, Parser)]
#[command(name = "wakepoint", version, about = "WakePoint - wake me when I arrive")]
struct Cli {
    #[arg(long, default_value = "wakepoint.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate config, store and settings.
    Doctor,
    /// Arm a destination and watch the location stream until arrival.
    Run(RunArgs),
    Destinations { #[command(subcommand)] cmd: DestCmd },
    Settings { #[command(subcommand)] cmd: SettingsCmd },
    /// Great-circle distance in meters between two points.
    #[command(allow_negative_numbers = true)]
    Distance { lat1: f64, lon1: f64, lat2: f64, lon2: f64 },
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Saved destination id.
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    dest: Option<String>,
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
    #[arg(long)]
    name: Option<String>,
    /// Exit once the alert has finished.
    #[arg(long)]
    exit_on_arrival: bool,
    /// Print engine events as JSON lines on stdout.
    #[arg(long)]
    events_json: bool,
}

#[derive(Debug, Subcommand)]
enum DestCmd {
    List,
    Add {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        name: Option<String>,
    },
    Rename { id: String, name: String },
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
enum SettingsCmd {
    Show,
    Set {
        /// 250, 500, 750, 1000 or 1500
        #[arg(long)]
        radius: Option<u32>,
        /// 5, 10 or 15
        #[arg(long)]
        duration: Option<u32>,
        /// vibration or sound
        #[arg(long)]
        modality: Option<AlertModality>,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    store: StoreCfg,
    location: LocationCfg,
    #[serde(default)]
    alert: AlertCfg,
}

#[derive(Debug, serde::Deserialize)]
struct StoreCfg {
    path: String,
}

#[derive(Debug, serde::Deserialize)]
struct LocationCfg {
    source: String,
    nmea_device: Option<String>,
    nmea_file: Option<String>,
    #[serde(default = "default_baud")]
    baud: u32,
    sim_start: Option<Coordinate>,
    #[serde(default = "default_sim_speed")]
    sim_speed_mps: f64,
    #[serde(default = "default_sim_interval")]
    sim_interval_ms: u64,
}

#[derive(Debug, Default, serde::Deserialize)]
struct AlertCfg {
    #[serde(default)]
    bell: bool,
}

fn default_baud() -> u32 { 9600 }
fn default_sim_speed() -> f64 { 15.0 }
fn default_sim_interval() -> u64 { 1000 }

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Distance needs no config.
    if let Command::Distance { lat1, lon1, lat2, lon2 } = cli.cmd {
        let d = distance_m(Coordinate::new(lat1, lon1), Coordinate::new(lat2, lon2));
        println!("{:.1}", d);
        return Ok(());
    }

    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run(args) => run(&cfg, args).await?,
        Command::Destinations { cmd } => destinations(&cfg, cmd)?,
        Command::Settings { cmd } => settings(&cfg, cmd)?,
        Command::Distance { .. } => unreachable!(),
    }
    Ok(())
}

fn open_kv(cfg: &Config) -> Result<KvStore> {
    KvStore::open(&cfg.store.path).with_context(|| format!("open store {}", cfg.store.path))
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    let loc = &cfg.location;
    nav_doctor::check_location_source(&loc.source, loc.nmea_device.as_deref(), loc.nmea_file.as_deref(), loc.baud)?;
    if loc.source == "simulated" {
        nav_doctor::check_simulation(loc.sim_speed_mps, loc.sim_interval_ms)?;
        if let Some(start) = loc.sim_start {
            nav_doctor::check_coordinate(start).context("location.sim_start")?;
        }
    }

    let dests = DestinationStore::new(open_kv(cfg)?);
    for d in dests.load_all() {
        if let Err(e) = nav_doctor::check_coordinate(d.coordinate) {
            warn!("doctor: saved destination {} looks wrong: {:#}", d.id, e);
        }
    }
    let settings = SettingsStore::new(open_kv(cfg)?);
    let p = settings.policy();
    info!(
        "doctor: {} saved destination(s), radius={}m duration={}s modality={}",
        dests.load_all().len(),
        p.radius.meters(),
        p.duration.seconds(),
        p.modality
    );

    info!("doctor: OK");
    Ok(())
}

fn destinations(cfg: &Config, cmd: DestCmd) -> Result<()> {
    let mut store = DestinationStore::new(open_kv(cfg)?);
    match cmd {
        DestCmd::List => {
            for d in store.load_all() {
                println!(
                    "{}  {:.5},{:.5}  {}",
                    d.id,
                    d.coordinate.lat,
                    d.coordinate.lon,
                    d.name.as_deref().unwrap_or("-")
                );
            }
        }
        DestCmd::Add { lat, lon, name } => {
            let d = SavedDestination::new(Coordinate::new(lat, lon), name);
            let id = d.id.clone();
            store.save(d)?;
            println!("{}", id);
        }
        DestCmd::Rename { id, name } => {
            if !store.rename(&id, &name)? {
                warn!("destinations: no entry with id {}", id);
            }
        }
        DestCmd::Delete { id } => {
            if !store.delete(&id)? {
                warn!("destinations: no entry with id {}", id);
            }
        }
    }
    Ok(())
}

fn settings(cfg: &Config, cmd: SettingsCmd) -> Result<()> {
    let store = SettingsStore::new(open_kv(cfg)?);
    match cmd {
        SettingsCmd::Show => {}
        SettingsCmd::Set { radius, duration, modality } => {
            if let Some(m) = radius {
                store.set_radius(Radius::try_from(m)?)?;
            }
            if let Some(s) = duration {
                store.set_duration(AlertDuration::try_from(s)?)?;
            }
            if let Some(m) = modality {
                store.set_modality(m)?;
            }
        }
    }
    let p = store.policy();
    println!("radius_m={}", p.radius.meters());
    println!("duration_s={}", p.duration.seconds());
    println!("modality={}", p.modality);
    Ok(())
}

fn resolve_target(cfg: &Config, args: &RunArgs) -> Result<Target> {
    let mut target = match (&args.dest, args.lat, args.lon) {
        (Some(id), _, _) => {
            let store = DestinationStore::new(open_kv(cfg)?);
            store.get(id).with_context(|| format!("no saved destination {}", id))?.to_target()
        }
        (None, Some(lat), Some(lon)) => Target::new(Coordinate::new(lat, lon)),
        _ => anyhow::bail!("run needs --dest <id> or --lat/--lon"),
    };
    if let Some(n) = &args.name {
        target.name = Some(n.clone());
    }
    if let Err(e) = nav_doctor::check_coordinate(target.coord) {
        warn!("run: {:#}", e);
    }
    Ok(target)
}

fn open_source(cfg: &Config, target: Coordinate) -> Result<GnssSource> {
    let loc = &cfg.location;
    let src = match loc.source.as_str() {
        "nmea-serial" => GnssSource::serial(loc.nmea_device.as_deref().context("location.nmea_device missing")?, loc.baud),
        "nmea-file" => GnssSource::file(loc.nmea_file.as_deref().context("location.nmea_file missing")?),
        "simulated" => {
            let start = loc.sim_start.unwrap_or_else(|| destination_point(target, 0.0, 2_000.0));
            let interval = Duration::from_millis(loc.sim_interval_ms);
            Ok(GnssSource::simulated(SimulatedTrack::new(start, target, loc.sim_speed_mps, interval)))
        }
        other => anyhow::bail!("unknown location.source: {}", other),
    };
    match src {
        Ok(s) => Ok(s),
        Err(e) => {
            if Authorization::from_error(&e) == Authorization::Denied {
                eprintln!("Location access denied. Grant access to the GNSS receiver and try again.");
            }
            Err(e).context("open location source")
        }
    }
}

fn print_event(ev: &EngineEvent) {
    match serde_json::to_string(ev) {
        Ok(s) => println!("{}", s),
        Err(e) => warn!("events: encode failed: {}", e),
    }
}

async fn run(cfg: &Config, args: RunArgs) -> Result<()> {
    info!("run: starting");

    let target = resolve_target(cfg, &args)?;
    let mut src = open_source(cfg, target.coord)?;
    info!("run: location source {}", cfg.location.source);
    let settings = Arc::new(SettingsStore::new(open_kv(cfg)?));

    let mut engine = ProximityEngine::new(Collaborators {
        policy: settings.clone(),
        notifier: Arc::new(TerminalNotifier),
        alert: Arc::new(TerminalAlert::new(cfg.alert.bell)),
        background: Arc::new(KeepAliveSwitch::default()),
    });

    let mut events = engine.subscribe();
    let events_json = args.events_json;
    let printer = tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            if events_json {
                print_event(&ev);
            } else {
                debug!("event: {:?}", ev);
            }
        }
    });

    engine.arm(target);

    let mut interrupted = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("run: interrupted");
                interrupted = true;
                break;
            }
            next = src.next_sample() => {
                let sample = match next {
                    Ok(Some(s)) => s,
                    Ok(None) => { info!("run: location stream ended"); break; }
                    Err(e) => {
                        // engine keeps its state; nothing to retry here
                        warn!("run: location updates stalled: {:#}", e);
                        break;
                    }
                };
                if let Err(e) = settings.refresh_if_changed() {
                    warn!("run: settings reload failed: {}", e);
                }
                if let Some(out) = engine.on_location_update(sample) {
                    info!("{}", out.message);
                    if out.fired && args.exit_on_arrival {
                        break;
                    }
                }
            }
        }
    }

    if !interrupted && engine.is_alerting() {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("run: interrupted"),
            _ = async {
                while engine.is_alerting() {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            } => {}
        }
    }

    if engine.is_reached() {
        info!("run: arrived");
    }
    engine.disarm();
    // closes the event channel so the printer drains and exits
    drop(engine);
    if let Err(e) = printer.await {
        warn!("run: event printer failed: {}", e);
    }
    Ok(())
}
