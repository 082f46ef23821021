pub mod api;
pub mod bundles;
pub mod cluster;
pub mod config;
pub mod crds;
pub mod discovery;
pub mod error;
pub mod flags;
pub mod identity;
pub mod instances;
pub mod naming;
pub mod provisioner;
pub mod quota;
pub mod reconciler;
pub mod resources;
pub mod store;
pub mod telemetry;
pub mod token;
