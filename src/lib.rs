// Library for tests to access modules

pub mod auth;
pub mod backup;
pub mod bootstrap;
pub mod broadcaster;
pub mod config;
pub mod discovery;
pub mod error;
pub mod files;
pub mod java;
pub mod minecraft;
pub mod models;
pub mod notifications;
pub mod registry;
pub mod routes;
pub mod servers;
pub mod store;
pub mod supervisor;
pub mod version;
pub mod worker;
