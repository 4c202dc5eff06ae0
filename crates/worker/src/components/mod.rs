pub mod registry_maintenance;

pub use registry_maintenance::{MaintenanceListener, MaintenanceReport, RegistryMaintenance};
