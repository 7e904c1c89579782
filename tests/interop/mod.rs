//! Integration tests for the banner interop scenarios.
//!
//! `client` and `server` pair our SSH stack with OpenSSH and skip when the binaries are missing,
//! `loopback` pairs our client with our server, and `cli` drives the `banner-interop` binary.

mod cli;
mod client;
mod fixtures;
mod loopback;
mod server;
