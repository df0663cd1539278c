//! `geocode` command: resolve an address with the Geocoding API.

use std::sync::Arc;

use mapwidget::config::ConfigFile;
use mapwidget::provider::{AsyncReqwestClient, HttpScriptLoader};
use mapwidget::{MapWidget, WidgetConfig};
use tracing::info;

use super::block_on;
use crate::error::CliError;

pub fn run(config: &ConfigFile, address: &str, api_key: Option<String>) -> Result<(), CliError> {
    let mut widget_config = WidgetConfig::from_config_file(config);
    if api_key.is_some() {
        widget_config.api_key = api_key;
    }

    let loader = HttpScriptLoader::new(AsyncReqwestClient::new()?);
    let widget = MapWidget::new(widget_config, Arc::new(loader));

    block_on(async {
        widget.attach("map").await?;
        let location = widget.geocode(address).await?;
        info!(address, %location, "Geocoded");

        println!("{}", location);
        if let Some(state) = widget.snapshot() {
            println!("center:  {}", state.center);
            println!("markers: {}", state.markers.len());
        }
        Ok::<(), CliError>(())
    })?
}
