//! Web front end for running flash checks from a browser

mod server;

pub use server::{start_web_server, AppState};
