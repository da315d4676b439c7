pub mod analytics;
pub mod api;
pub mod auth;
pub mod data;
pub mod database;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod pages;
pub mod pipeline;
pub mod remote;
pub mod report;
pub mod session;
