//! Dive retrieval commands: `divelog get <id>` and `divelog dives`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::{DiveLogEntry, DiveSummary};
use crate::store::DiveStore;

/// One-line summary used by list and search output.
pub fn format_dive_line(dive: &DiveLogEntry) -> String {
    let place = [dive.area.as_deref(), dive.country.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{}  {:<24} {:<28} {:>5.1}m {:>4}min  {}",
        dive.date.as_deref().unwrap_or("undated   "),
        dive.site,
        if place.is_empty() { "-".to_string() } else { place },
        dive.depth_max,
        dive.length_minutes,
        dive.dive_type
    )
}

/// Print a single entry in full.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = DiveStore::open(config).await?;
    let dive = store.get(id).await?;
    store.close().await;

    let Some(dive) = dive else {
        bail!("dive log not found: {}", id);
    };

    println!("--- Dive ---");
    println!("id:          {}", dive.id);
    println!("site:        {}", dive.site);
    if let Some(ref area) = dive.area {
        println!("area:        {}", area);
    }
    if let Some(ref country) = dive.country {
        println!("country:     {}", country);
    }
    println!(
        "when:        {} {}",
        dive.date.as_deref().unwrap_or("undated"),
        dive.time.as_deref().unwrap_or("")
    );
    match dive.depth_avg {
        Some(avg) => println!("depth:       {}m max, {}m avg", dive.depth_max, avg),
        None => println!("depth:       {}m max", dive.depth_max),
    }
    println!("length:      {} min", dive.length_minutes);
    println!("type:        {}", dive.dive_type);
    if !dive.equipment.is_empty() {
        println!("equipment:   {}", dive.equipment.join(", "));
    }
    println!(
        "logged:      {}",
        dive.created_at.format("%Y-%m-%dT%H:%M:%SZ")
    );
    if let Some(ref highlights) = dive.highlights {
        println!();
        println!("--- Highlights ---");
        println!("{}", highlights);
    }
    println!();
    println!("--- Narrative ---");
    println!("{}", dive.narrative);

    Ok(())
}

/// List every entry, most recent first, followed by totals.
pub async fn run_list(config: &Config) -> Result<()> {
    let store = DiveStore::open(config).await?;
    let dives = store.get_all().await?;
    store.close().await;

    if dives.is_empty() {
        println!("No dives logged yet.");
        return Ok(());
    }

    for dive in &dives {
        println!("{}", format_dive_line(dive));
        println!("            id: {}", dive.id);
    }

    let summary = DiveSummary::from_entries(&dives);
    println!();
    println!(
        "{} dives, {} minutes underwater",
        summary.total_dives, summary.total_minutes
    );
    if let Some(deepest) = summary.deepest_dive {
        println!("deepest: {} ({}m)", deepest.site, deepest.depth_max);
    }
    if !summary.countries.is_empty() {
        println!("countries: {}", summary.countries.join(", "));
    }

    Ok(())
}
