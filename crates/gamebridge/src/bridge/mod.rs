//! The host bridge: WASM runtime, import table, and frame driver.
//!
//! A game module runs in a sandboxed linear-memory address space and can only
//! exchange numbers with the host. The bridge supplies the module's import
//! table (drawing, diagnostics, storage) and drives the module's exported
//! entry points (`init`, `draw(delta)`, `handle_click(x, y)`,
//! `set_size(w, h)`).
//!
//! ## Marshaling discipline
//!
//! - Strings cross the boundary as (pointer, length) pairs and are copied out
//!   and decoded immediately; the bridge never aliases module memory beyond
//!   the current call.
//! - The memory view is re-fetched on every host call because module-side
//!   allocation can grow memory and invalidate earlier views.
//!
//! ## Fault model
//!
//! A module-raised fault reports its location, trips a one-way panic latch,
//! and traps out of the current call. The frame driver observes the latch and
//! halts permanently; the last drawn frame stays visible and the session
//! cannot resume.

mod config;
mod host;
mod runtime;

pub use config::BridgeConfig;
pub use host::{FaultLocation, HostFunctions, HostState, PanicLatch};
pub use runtime::{rescale, Bridge, DriverState, GameModule, Session, Tick};
