use anyhow::{Context, Result};
use geojson::GeoJson;
use metroscope_transit::export::network_to_geojson;
use metroscope_transit::TransitNetwork;
use serde::Serialize;
use std::path::Path;

/// Write the network as a GeoJSON FeatureCollection
pub fn write_network_geojson(network: &TransitNetwork, output_path: &Path) -> Result<()> {
    tracing::info!(
        "Writing {} bus stops, {} stations and {} lines to {}",
        network.bus_stops.len(),
        network.all_stations().count(),
        network.all_lines().count(),
        output_path.display()
    );

    let geojson = GeoJson::from(network_to_geojson(network));
    let json_string =
        serde_json::to_string_pretty(&geojson).context("Failed to serialize GeoJSON")?;

    std::fs::write(output_path, json_string)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    Ok(())
}

/// Write any serializable report as pretty JSON, or print it when no path is given
pub fn write_json<T: Serialize>(value: &T, output_path: Option<&Path>) -> Result<()> {
    let json_string = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;

    match output_path {
        Some(path) => {
            tracing::info!("Writing {}", path.display());
            std::fs::write(path, json_string)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{json_string}"),
    }

    Ok(())
}
