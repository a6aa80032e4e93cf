//! Library crate for trivia-live-back, exposing modules for the binary and
//! integration tests.

pub mod auth;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
