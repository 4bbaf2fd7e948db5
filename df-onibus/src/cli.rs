//! Définition et implémentation des commandes CLI
//!
//! - `serve` : pont stdio avec la surface de rendu
//! - `snapshot` : export GeoJSON ponctuel des trois couches
//! - `route` : recherche des tracés d'une linha

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{debug, info};

use semob_wfs::transform::BusFilter;
use semob_wfs::MapBounds;

use crate::bridge::{stdio, Dispatcher};
use crate::coordinator::{CoordinatorConfig, RefreshCoordinator};
use crate::export::export_snapshot;
use crate::fetch::{FetchClient, FetchPolicy, ReqwestTransport};
use crate::geodata::GeodataService;
use crate::Config;

/// Intervalle de purge des entrées expirées du cache
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Subcommand)]
pub enum Commands {
    /// Run the map bridge over stdin/stdout (one JSON message per line)
    Serve {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Fetch buses, stops and lines once and write them as GeoJSON
    Snapshot {
        /// Output directory for GeoJSON files
        #[arg(short, long)]
        output: PathBuf,

        /// Restrict buses and stops to a bounding box: west,south,east,north
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the route geometries matching a line code
    Route {
        /// Line code (zero padding is ignored, e.g. 110 matches 0.110)
        code: String,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Options communes de configuration
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Path to a JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Geoserver base URL (défaut : env DFBUS_BASE_URL / geoserver SEMOB)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Bus polling interval in seconds (défaut : env DFBUS_POLL_SECS / 10)
    #[arg(long)]
    pub poll_secs: Option<u64>,

    /// Hide buses without a line
    #[arg(long)]
    pub only_active: bool,

    /// Only show buses of these lines (repeatable)
    #[arg(long = "line")]
    pub lines: Vec<String>,
}

impl ConfigArgs {
    /// Configuration finale : fichier, environnement puis options
    pub fn resolve(&self) -> Result<Config> {
        let mut config = Config::resolve(self.config.as_deref())?;
        if let Some(url) = &self.base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = self.poll_secs {
            config.poll_interval_secs = secs;
        }
        if self.only_active {
            config.show_only_active_buses = true;
        }
        if !self.lines.is_empty() {
            config.selected_lines = self.lines.clone();
        }
        Ok(config)
    }
}

fn build_service(config: &Config) -> Result<(FetchClient<ReqwestTransport>, GeodataService<ReqwestTransport>)> {
    let transport = ReqwestTransport::new().context("Failed to build HTTP client")?;
    let client = FetchClient::new(transport, FetchPolicy::from_config(config));
    let service = GeodataService::new(client.clone(), config.base_url.clone(), config.endpoints.clone());
    Ok((client, service))
}

/// Exécute la commande serve
pub async fn cmd_serve(config: Config) -> Result<()> {
    info!(
        base_url = %config.base_url,
        poll_secs = config.poll_interval_secs,
        only_active = config.show_only_active_buses,
        "Starting map bridge on stdio"
    );

    let (client, service) = build_service(&config)?;
    let stdio::BridgeChannels {
        commands,
        events,
        reader,
        writer,
    } = stdio::spawn(tokio::io::stdin(), tokio::io::stdout());

    let purge = {
        let client = client.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                let purged = client.purge_expired();
                if purged > 0 {
                    debug!(purged, "Expired cache entries removed");
                }
            }
        })
    };

    let dispatcher = Dispatcher::new(commands, client).with_proxy_timeout(config.bridge_timeout());
    let mut coordinator =
        RefreshCoordinator::new(Arc::new(service), dispatcher, CoordinatorConfig::from(&config));
    coordinator.run(events).await;

    // Fermer le canal de commandes laisse l'écrivain vider sa file
    drop(coordinator);
    purge.abort();
    reader.abort();
    writer
        .await
        .context("Bridge writer task failed")?
        .context("Failed to write to stdout")?;

    info!("Map bridge stopped");
    Ok(())
}

/// Exécute la commande snapshot
pub async fn cmd_snapshot(config: Config, output: &Path, bbox: Option<&str>) -> Result<()> {
    let bounds = bbox.map(parse_bbox).transpose()?;
    info!(output = %output.display(), bbox = ?bounds, "Snapshot export");

    let (_client, service) = build_service(&config)?;
    let (buses, stops, lines) = tokio::join!(
        service.get_buses_with_operators(bounds.as_ref()),
        service.get_stops(bounds.as_ref()),
        service.get_lines(),
    );
    let mut buses = buses.context("Failed to fetch buses")?;
    let stops = stops.context("Failed to fetch stops")?;
    let lines = lines.context("Failed to fetch lines")?;

    service.fill_fares(&mut buses).await;
    let filter = BusFilter {
        only_active: config.show_only_active_buses,
        selected_lines: config.selected_lines.clone(),
    };
    let buses = filter.apply(buses);

    let summary = export_snapshot(output, &buses, &stops, &lines)?;
    info!(
        buses = summary.buses,
        stops = summary.stops,
        lines = summary.lines,
        "Snapshot written"
    );
    Ok(())
}

/// Exécute la commande route
pub async fn cmd_route(config: Config, code: &str) -> Result<()> {
    let (_client, service) = build_service(&config)?;
    let lines = service
        .lines_for_code(code)
        .await
        .context(format!("Failed to look up line {}", code))?;

    if lines.is_empty() {
        anyhow::bail!("No route found for line {}", code);
    }

    for line in &lines {
        let fare = line
            .fare
            .map(|f| format!("R$ {:.2}", f))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{} vertices\t{}",
            line.code,
            line.service_label,
            line.coordinates.len(),
            fare
        );
    }
    Ok(())
}

/// Valide une bbox `west,south,east,north` en degrés
fn parse_bbox(s: &str) -> Result<MapBounds> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| anyhow::anyhow!("Invalid number in bbox: '{}'", v.trim()))
        })
        .collect::<Result<_>>()?;

    let &[west, south, east, north] = values.as_slice() else {
        anyhow::bail!(
            "Invalid bbox: '{}'. Expected west,south,east,north (e.g., -48.0,-15.9,-47.8,-15.7)",
            s
        );
    };

    if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
        anyhow::bail!("Latitude out of range in bbox: {}", s);
    }
    if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
        anyhow::bail!("Longitude out of range in bbox: {}", s);
    }

    Ok(MapBounds::new(north, south, east, west))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let b = parse_bbox("-48.0, -15.9, -47.8, -15.7").unwrap();
        assert_eq!(b, MapBounds::new(-15.7, -15.9, -47.8, -48.0));

        assert!(parse_bbox("-48.0,-15.9,-47.8").is_err());
        assert!(parse_bbox("-48.0,-15.9,-47.8,abc").is_err());
        assert!(parse_bbox("-48.0,-95,-47.8,-15.7").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = ConfigArgs {
            base_url: Some("http://localhost:8080/ows/".into()),
            poll_secs: Some(8),
            only_active: true,
            lines: vec!["0.110".into()],
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/ows");
        assert_eq!(config.poll_interval_secs, 8);
        assert!(config.show_only_active_buses);
        assert_eq!(config.selected_lines, vec!["0.110"]);
    }
}
