//! Startup device registration from `SEED_DEVICES`.

use fleetwatch_db::models::device::CreateDevice;
use fleetwatch_pipeline::Store;

/// Parse `name:type` pairs separated by commas.
pub fn parse_seed_devices(raw: &str) -> Result<Vec<CreateDevice>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, device_type) = entry
                .split_once(':')
                .ok_or_else(|| format!("'{entry}' is not in name:type form"))?;
            Ok(CreateDevice {
                name: name.trim().to_string(),
                device_type: device_type.trim().to_string(),
            })
        })
        .collect()
}

/// Register every seed device whose name is not taken yet.
///
/// Returns the number of devices created. Invalid entries are logged and
/// skipped.
pub async fn register_seed_devices(
    store: &dyn Store,
    devices: &[CreateDevice],
) -> anyhow::Result<usize> {
    if devices.is_empty() {
        return Ok(0);
    }

    let existing = store.get_all_devices().await?;
    let mut created = 0;

    for input in devices {
        if existing.iter().any(|d| d.name == input.name) {
            tracing::debug!(name = %input.name, "Seed device already registered");
            continue;
        }
        match store.create_device(input).await {
            Ok(device) => {
                created += 1;
                tracing::info!(
                    device_id = device.id,
                    name = %device.name,
                    device_type = %device.device_type,
                    "Registered seed device"
                );
            }
            Err(e) => {
                tracing::warn!(name = %input.name, error = %e, "Skipping seed device");
            }
        }
    }

    Ok(created)
}
