use anyhow::{bail, Result};
use candle_core::Device;
use tracing::info;

/// Pick the compute device for `preference` (`auto`, `cpu` or `metal`).
///
/// `auto` falls back to the CPU when no accelerator is usable; an explicit
/// `metal` that cannot be opened is an error.
pub fn select_device(preference: &str) -> Result<Device> {
    match preference.trim().to_ascii_lowercase().as_str() {
        "cpu" => {
            info!("embedding device: CPU");
            Ok(Device::Cpu)
        }
        "metal" => open_metal(),
        "auto" | "" => Ok(open_metal().unwrap_or_else(|e| {
            info!(reason = %e, "embedding device: CPU");
            Device::Cpu
        })),
        other => bail!("unknown embedding device '{other}', expected auto, cpu or metal"),
    }
}

#[cfg(feature = "metal")]
fn open_metal() -> Result<Device> {
    match Device::new_metal(0) {
        Ok(dev) => {
            info!("embedding device: Metal");
            Ok(dev)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Metal device unavailable");
            Err(e.into())
        }
    }
}

#[cfg(not(feature = "metal"))]
fn open_metal() -> Result<Device> {
    bail!("metal support not compiled in")
}
