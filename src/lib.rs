//! SMARTRASH Backend Library
//!
//! Wallet ledger, smart bin monitoring, collection workflow, pricing and
//! notification dispatch for the SMARTRASH waste-management portal.

pub mod app_state;
pub mod auth;
pub mod bins;
pub mod collection;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod pricing;
pub mod routes;
pub mod store;
