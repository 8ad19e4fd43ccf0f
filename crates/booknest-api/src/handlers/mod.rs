pub mod admin;
pub mod auth;
pub mod catalog;
pub mod files;
pub mod health;
pub mod inbox;
pub mod novels;
pub mod settings;
pub mod social;
pub mod tags;
