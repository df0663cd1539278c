//! `show` command: apply properties to a headless map and print its state.

use std::sync::Arc;

use clap::Args;
use mapwidget::config::ConfigFile;
use mapwidget::markers::{LogicalMarker, MarkerList};
use mapwidget::provider::{HeadlessLibrary, HeadlessLoader, StaticGeocoder};
use mapwidget::{Coordinate, MapState, MapWidget, WidgetConfig};

use super::block_on;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Center latitude
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<String>,

    /// Center longitude
    #[arg(long, allow_hyphen_values = true)]
    pub lng: Option<String>,

    /// Zoom level (leading integer is used)
    #[arg(long)]
    pub zoom: Option<String>,

    /// Hide the default map controls
    #[arg(long)]
    pub disable_default_ui: bool,

    /// Marker position as LAT,LNG; repeatable
    #[arg(long = "marker", value_name = "LAT,LNG", allow_hyphen_values = true)]
    pub markers: Vec<String>,
}

pub fn run(config: &ConfigFile, args: ShowArgs) -> Result<(), CliError> {
    let state = block_on(render(config, args))??;
    let json = serde_json::to_string_pretty(&state)
        .map_err(|e| CliError::Input(format!("cannot serialize map state: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn parse_markers(raw: &[String]) -> Result<Vec<LogicalMarker>, CliError> {
    raw.iter()
        .map(|m| {
            m.parse::<Coordinate>()
                .map(LogicalMarker::from)
                .map_err(|e| CliError::Input(format!("marker '{}': {}", m, e)))
        })
        .collect()
}

async fn render(config: &ConfigFile, args: ShowArgs) -> Result<MapState, CliError> {
    let markers = parse_markers(&args.markers)?;

    // No network: everything stays in memory
    let library = Arc::new(HeadlessLibrary::new(Arc::new(StaticGeocoder::new())));
    let loader = Arc::new(HeadlessLoader::already_loaded(library));
    let widget = MapWidget::new(WidgetConfig::from_config_file(config), loader);
    widget.attach("map").await?;

    if let Some(lat) = args.lat {
        widget.set_latitude(lat);
    }
    if let Some(lng) = args.lng {
        widget.set_longitude(lng);
    }
    if let Some(zoom) = args.zoom {
        widget.set_zoom(zoom);
    }
    if args.disable_default_ui {
        widget.set_disable_default_ui(true);
    }
    if !markers.is_empty() {
        widget.set_markers(Arc::new(MarkerList::from_vec(markers)));
    }
    widget.flush().await;

    widget
        .snapshot()
        .ok_or_else(|| CliError::Input("map was not created".to_string()))
}
