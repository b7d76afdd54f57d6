//! Shared primitive types used across the entire simulation.

/// Meter number, e.g. "MTR-ISL-0042137".
pub type MeterId = String;

/// Consumer account id, e.g. "CON-ISL-0042137".
pub type ConsumerId = String;

/// Transformer id, e.g. "TR-D-00017".
pub type TransformerId = String;

/// The canonical run identifier.
pub type RunId = String;

pub type Kwh = f64;
pub type Rupees = f64;
