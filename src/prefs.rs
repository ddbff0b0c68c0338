//! Preference commands: `divelog pref get|set|list`.

use anyhow::Result;

use crate::config::Config;
use crate::store::DiveStore;

pub async fn run_pref_get(config: &Config, key: &str) -> Result<()> {
    let store = DiveStore::open(config).await?;
    let value = store.get_preference(key).await?;
    store.close().await;

    match value {
        Some(value) => println!("{} = {}", key.trim(), value),
        None => println!("{} is not set", key.trim()),
    }
    Ok(())
}

pub async fn run_pref_set(config: &Config, key: &str, value: &str) -> Result<()> {
    let store = DiveStore::open(config).await?;
    store.set_preference(key, value).await?;
    store.close().await;

    println!("{} = {}", key.trim(), value);
    Ok(())
}

pub async fn run_pref_list(config: &Config) -> Result<()> {
    let store = DiveStore::open(config).await?;
    let prefs = store.list_preferences().await?;
    store.close().await;

    if prefs.is_empty() {
        println!("No preferences stored.");
        return Ok(());
    }
    for pref in prefs {
        println!(
            "{} = {}  (updated {})",
            pref.key,
            pref.value,
            pref.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
