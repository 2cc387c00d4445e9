mod client;
pub mod operations;
mod ws;

pub use client::HasuraClient;
