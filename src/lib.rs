// Library for tests to access modules

pub mod aggregator;
pub mod collector;
pub mod config;
pub mod error;
pub mod maintenance_worker;
pub mod models;
pub mod routes;
pub mod service;
pub mod store;
pub mod telemetry;
