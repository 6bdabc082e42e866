pub mod k8s;
pub mod snapshot;
pub mod views;
