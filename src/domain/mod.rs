// Domain layer: launcher models and the process port. No dependencies beyond std, serde and chrono.

pub mod model;
pub mod ports;
