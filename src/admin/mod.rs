//! Admin Bridge (C6): the HTTP control plane. Thin handlers over
//! C1/C2/C5 — no mutation logic lives here, only request parsing and
//! status-code mapping.

pub mod handlers;
pub mod middleware;
pub mod server;
pub mod types;

pub use server::build_router;
