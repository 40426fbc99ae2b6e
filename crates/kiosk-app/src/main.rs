//! Exhibit kiosk runtime entry point.
//!
//! Runs the synchronization session headless: polls the helper, pings the
//! control server once one is configured, and logs what the display layer
//! would do. A switch to another app prints that app's page path on stdout
//! and exits so the launcher can start it.
//!
//! Usage: `kiosk-app [QUERY]`, where QUERY is the launch query string
//! (`?standalone=true&definition=<id>`).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use kiosk_core::config::KioskConfig;
use kiosk_core::launch::LaunchParams;
use kiosk_core::net::HttpTransport;
use kiosk_core::{Session, SessionEvent};

/// Environment variable naming the config file.
const ENV_CONFIG: &str = "KIOSK_CONFIG";

/// Config file used when `KIOSK_CONFIG` is unset.
const DEFAULT_CONFIG: &str = "kiosk.toml";

/// Roughly 60 ticks per second.
const FRAME: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::var(ENV_CONFIG).ok().map(PathBuf::from);
    let mut config = load_config(config_path.as_deref())?;
    config
        .apply_env_overrides()
        .context("applying environment overrides")?;

    let launch = std::env::args()
        .nth(1)
        .map(|q| LaunchParams::from_query(&q))
        .unwrap_or_default();

    log::info!(
        "Starting kiosk runtime v{} as {}",
        env!("CARGO_PKG_VERSION"),
        config.app_id
    );

    // A page reload rebuilds the session from defaults.
    loop {
        match run(&config, &launch) {
            Exit::Reload => log::info!("Reloading"),
            Exit::Navigate(path) => {
                println!("{path}");
                return Ok(());
            },
        }
    }
}

/// Why a session ended.
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Reload,
    Navigate(String),
}

fn run(config: &KioskConfig, launch: &LaunchParams) -> Exit {
    let mut session = Session::new(config.clone(), launch.clone(), HttpTransport::new())
        .with_update_parser(|raw| {
            log::trace!("Raw update: {raw}");
            Ok(())
        })
        .with_definition_loader(|definition| {
            log::info!(
                "Rendering definition {}",
                definition.uuid().unwrap_or("<no uuid>")
            );
            Ok(())
        });

    loop {
        let frame_start = Instant::now();
        session.tick(frame_start);

        for event in session.drain_events() {
            if let Some(exit) = handle_event(event) {
                return exit;
            }
        }

        let elapsed = frame_start.elapsed();
        if elapsed < FRAME {
            std::thread::sleep(FRAME - elapsed);
        }
    }
}

fn handle_event(event: SessionEvent) -> Option<Exit> {
    match event {
        SessionEvent::HelperUnreachable => {
            log::warn!("Cannot reach the helper; showing banner");
            None
        },
        SessionEvent::HelperReachable => {
            log::info!("Helper reachable again; hiding banner");
            None
        },
        SessionEvent::DefinitionLoaded(definition) => {
            log::debug!("Definition loaded: {}", definition.as_value());
            None
        },
        SessionEvent::ReloadPage => Some(Exit::Reload),
        SessionEvent::Navigate { path } => Some(Exit::Navigate(path)),
    }
}

/// Load `path`, or `kiosk.toml` when present, or fall back to defaults.
fn load_config(path: Option<&Path>) -> Result<KioskConfig> {
    if let Some(path) = path {
        return KioskConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()));
    }
    let default = Path::new(DEFAULT_CONFIG);
    if default.exists() {
        return KioskConfig::load(default).context("loading kiosk.toml");
    }
    log::info!("No {DEFAULT_CONFIG} found; using defaults");
    Ok(KioskConfig::default())
}
