//! Database migrations for the Dealer Sync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_05_18_100000_create_dealers;
mod m2026_05_18_100100_create_sync_jobs;
mod m2026_05_18_100200_create_fetch_logs;
mod m2026_05_19_090000_create_work_orders;
mod m2026_05_19_090100_create_work_order_services;
mod m2026_05_19_090200_create_work_order_parts;
mod m2026_05_20_113000_create_prospects;
mod m2026_05_20_113100_create_prospect_activities;
mod m2026_05_21_084500_create_billings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_05_18_100000_create_dealers::Migration),
            Box::new(m2026_05_18_100100_create_sync_jobs::Migration),
            Box::new(m2026_05_18_100200_create_fetch_logs::Migration),
            Box::new(m2026_05_19_090000_create_work_orders::Migration),
            Box::new(m2026_05_19_090100_create_work_order_services::Migration),
            Box::new(m2026_05_19_090200_create_work_order_parts::Migration),
            Box::new(m2026_05_20_113000_create_prospects::Migration),
            Box::new(m2026_05_20_113100_create_prospect_activities::Migration),
            Box::new(m2026_05_21_084500_create_billings::Migration),
        ]
    }
}
