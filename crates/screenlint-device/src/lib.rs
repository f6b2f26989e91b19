//! # screenlint-device
//!
//! Everything that talks to a device through the platform tools: the process
//! execution contract, device readiness and boot, app (un)installation and the
//! exploration tool run.

mod explorer;
mod lifecycle;
mod shell;

pub use explorer::{ExplorationReport, ExplorationRunner, OUTPUT_TAIL_LINES};
pub use lifecycle::{device_state, parse_avd_list, AvdInfo, DeviceLifecycleManager};
pub use shell::{MockShell, ProcessShell, ShellExecutor, ShellOutput};
