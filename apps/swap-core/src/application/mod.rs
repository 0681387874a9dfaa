//! Application layer: driven ports and the use-case services that depend
//! only on them. No module here performs I/O directly; every external
//! effect goes through a trait in `ports`.

pub mod ports;
pub mod services;
