use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use gatt_inspector::config::AppConfig;
use gatt_inspector::core::bluetooth::ScanResults;
use gatt_inspector::core::formatter::NOT_AVAILABLE;
use gatt_inspector::core::gatt::ServiceInfo;
use gatt_inspector::{AppState, logging};
use log::{info, warn};
use tokio::time::{Instant, timeout_at};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = AppConfig::default_path();
    let config = AppConfig::load_config(&config_path).await?;
    logging::init(config.log_level(), None);
    let (level, report) = AppConfig::load_report(&config_path);
    log::log!(level, "{}", report);

    let app_state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    let result = match std::env::args().nth(1) {
        Some(address) => inspect(&app_state, &address).await,
        None => scan(&app_state).await,
    };

    app_state.shutdown().await?;
    result
}

/// Scans for the configured time and lists what was seen
async fn scan(app_state: &AppState) -> Result<()> {
    let mut results = ScanResults::new(&app_state.config.scan);
    let deadline = Instant::now() + Duration::from_secs(app_state.config.scan.timeout_secs);

    let mut peripherals = app_state.scanner.lock().await.start_scan().await?;
    while let Ok(Some(peripheral)) = timeout_at(deadline, peripherals.recv()).await {
        results.upsert(peripheral);
    }
    app_state.scanner.lock().await.stop_scan().await?;

    if results.devices().is_empty() {
        println!("No peripherals found");
    }
    for device in results.devices() {
        println!("{}  {:>4} dBm  {}", device.address, device.rssi, device.display_name());
    }
    Ok(())
}

/// Connects, waits for the initial reads and prints the topology
async fn inspect(app_state: &AppState, address: &str) -> Result<()> {
    let manager = &app_state.bluetooth_manager;
    manager.connect(address).await?;

    let deadline = Instant::now() + Duration::from_secs(app_state.config.connection.ready_timeout_secs);
    let services = match timeout_at(deadline, manager.wait_until_ready()).await {
        Ok(services) => services?,
        Err(_) => {
            warn!("Timed out in state {:?}", manager.current_state());
            manager.disconnect().await?;
            return Err(anyhow!("{} did not become ready in time", address));
        }
    };

    info!("{} ready with {} services", address, services.len());
    print_services(&services);

    manager.disconnect().await?;
    Ok(())
}

fn print_services(services: &[ServiceInfo]) {
    for service in services {
        println!("Service {}", service.uuid);
        for characteristic in &service.characteristics {
            let properties: Vec<&str> = characteristic.properties.iter().map(|p| p.label()).collect();
            println!("  Characteristic {} [{}]", characteristic.uuid, properties.join(", "));
            let value = characteristic.formatted_value.as_deref().unwrap_or(NOT_AVAILABLE);
            for line in value.lines() {
                println!("    {}", line);
            }
        }
    }
}
