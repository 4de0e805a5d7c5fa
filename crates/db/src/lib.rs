//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Postgres implementations of the closure engine's collaborators
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod repositories;

use std::sync::Arc;

pub use repositories::{
    ClosureRunRepository, ClosureSourceRepository, LedgerRepository, PeriodLockRepository,
};

use closure_core::closure::ClosureSources;
use closure_shared::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a connection pool to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}

/// Wires every step source to the database.
#[must_use]
pub fn closure_sources(db: &DatabaseConnection) -> ClosureSources {
    let ledger = Arc::new(LedgerRepository::new(db.clone()));
    let registers = Arc::new(ClosureSourceRepository::new(db.clone()));
    ClosureSources {
        ledger: ledger.clone(),
        chart: ledger,
        assets: registers.clone(),
        foreign_balances: registers.clone(),
        rates: registers.clone(),
        vat_settings: registers,
    }
}
