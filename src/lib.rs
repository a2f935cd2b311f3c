pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod forecast;
pub mod ml;
pub mod observer;
pub mod optimizer;
pub mod telemetry;
