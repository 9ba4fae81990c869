// handlers/mod.rs - Server-level endpoints
//
// Record endpoints are generated per collection by rest::RecordEndpointMaker;
// the handlers here cover what is not tied to a collection.
pub mod server;

pub use server::{health, root, version, ServerState};
