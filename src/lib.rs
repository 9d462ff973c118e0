#[macro_use]
extern crate diesel;

pub mod app;
pub mod commands;
pub mod config;
pub mod dialogs;
pub mod discord;
pub mod emoji;
pub mod error;
pub mod gateway;
pub mod leaguepedia;
pub mod matches;
pub mod models;
pub mod reconcile;
pub mod render;
pub mod schema;
pub mod scoring;
pub mod store;
pub mod teams;
pub mod tournaments;
pub mod votes;

#[cfg(test)]
mod testing;
