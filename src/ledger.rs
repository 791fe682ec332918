mod client;
mod fee;
mod http;
mod memory;
mod queue;
mod request;
mod signer;
mod submitter;
mod transaction;

pub use client::*;
pub use fee::*;
pub use http::*;
pub use memory::*;
pub use queue::*;
pub use request::*;
pub use signer::*;
pub use submitter::*;
pub use transaction::*;
