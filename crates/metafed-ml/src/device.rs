// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Device
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
//! Startup-time compute device resolution. Only the CPU backend exists;
//! accelerator requests fall back to it.

use metafed_types::config::DeviceKind;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
        }
    }
}

/// Resolve the configured device once; the result is fixed for the process lifetime.
pub fn select_device(requested: DeviceKind) -> ComputeDevice {
    if requested == DeviceKind::Accelerator {
        warn!("No accelerator backend compiled in, falling back to CPU");
    }
    let device = ComputeDevice::Cpu;
    info!(?requested, %device, "Compute device selected");
    device
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_request_resolves_to_cpu() {
        for kind in [DeviceKind::Auto, DeviceKind::Cpu, DeviceKind::Accelerator] {
            assert_eq!(select_device(kind), ComputeDevice::Cpu);
        }
        assert_eq!(ComputeDevice::Cpu.to_string(), "cpu");
    }
}
