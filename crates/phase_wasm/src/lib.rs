//! WASM bindings for the phase portrait core library.
//!
//! Every binding is a thin wrapper: the work happens in an `anyhow::Result`
//! helper that native tests can call, and the error chain is flattened into
//! a single message string at the JavaScript boundary.

mod lorenz;
mod payload;
mod portrait;
mod system;

pub use lorenz::integrate_lorenz;
pub use portrait::{compute_portrait, PortraitRequest, PortraitResponse, TrajectoryOutcome};
pub use system::WasmSystem;

use phase_core::expression::{compile, AllowList};
use wasm_bindgen::prelude::*;

/// `None` when `expr` compiles over `{x, y, t}`, otherwise the message to show.
#[wasm_bindgen]
pub fn validate_expression(expr: &str) -> Option<String> {
    compile(expr, &AllowList::planar())
        .err()
        .map(|err| err.to_string())
}
