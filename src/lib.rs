//! # Steam Harvest
//!
//! Harvests the Steam app catalog, store pages, news feeds and achievement
//! percentages, then normalizes them into a relational SQLite schema.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────────┐
//! │ Steam API /  │──▶│  Harvester   │──▶│ harvest_checkpoints │
//! │ store pages  │   │ retry + ckpt │   │ harvest_artifacts   │
//! └──────────────┘   └──────────────┘   └─────────┬──────────┘
//!                                                 ▼
//!                    ┌──────────────┐   ┌────────────────────┐
//!                    │ normalize +  │──▶│ games, companies,  │
//!                    │ load (core)  │   │ tags, news, ...    │
//!                    └──────────────┘   └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init                 # create database
//! harvest catalog              # fetch the app list
//! harvest fetch details        # scrape store pages (resumable)
//! harvest fetch news           # fetch news per app (resumable)
//! harvest fetch achievements   # fetch achievement percentages (resumable)
//! harvest load                 # normalize and load
//! harvest status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`traits`] | Fetcher and checkpoint-store seams |
//! | [`harvest`] | Resumable harvest loop |
//! | [`checkpoint`] | SQLite and in-memory checkpoint stores |
//! | [`steam_api`] | Catalog, news and achievements over the Steam Web API |
//! | [`store_page`] | Store-page scraper |
//! | [`sqlite_store`] | Relational store for the load coordinator |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod fetch_cmd;
pub mod harvest;
pub mod load_cmd;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod sqlite_store;
pub mod stats;
pub mod steam_api;
pub mod store_page;
pub mod traits;
