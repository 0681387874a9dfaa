//! Turso-backed persistence adapters implementing the repository ports in
//! `application::ports::repository` (spec §3, §6 "Persisted state layout").

mod admin_repository;
mod dca_repository;
mod db;
mod limit_order_repository;
mod order_repository;
mod price_repository;
mod user_repository;

pub use admin_repository::{AdminLedgerPort, CoinGiftAction, TursoAdminLedger};
pub use db::SwapDatabase;
pub use dca_repository::TursoDcaPlanRepository;
pub use limit_order_repository::TursoLimitOrderRepository;
pub use order_repository::TursoOrderRepository;
pub use price_repository::TursoPriceSnapshotRepository;
pub use user_repository::{TursoUserRepository, UserSettings};
