//! # gamebridge
//!
//! Host bridge between sandboxed WASM game modules and host capabilities:
//! 2D drawing, persistent key-value storage, pointer input, and a per-frame
//! scheduling loop.
//!
//! The module cannot call host APIs directly. The bridge exposes a fixed
//! table of numeric-only imports and drives the module's exported entry
//! points:
//!
//! | Direction | Functions |
//! |-----------|-----------|
//! | host -> module | `init()`, `draw(delta)`, `handle_click(x, y)`, `set_size(w, h)` |
//! | module -> host (`drawing`) | `draw_line`, `draw_ellipse`, `canvas_width`, `canvas_height`, `clear_canvas`, `set_stroke_color`, `set_stroke_thickness`, `set_fill_color`, `fill_rect`, `stroke_rect`, `set_font`, `fill_text`, `set_line_join`, `print`, `print_number`, `print_panic_location`, `handle_panic` |
//! | module -> host (`storage`) | `save`, `load` |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gamebridge::{Bridge, BridgeConfig, MemoryStorage, RecordingSurface, Tick};
//!
//! let bridge = Bridge::new(BridgeConfig::default())?;
//! let module = bridge.load_module("game.wasm")?;
//! let mut session = bridge.instantiate(
//!     &module,
//!     RecordingSurface::new(800.0, 600.0),
//!     MemoryStorage::new(),
//! )?;
//!
//! session.start()?;
//! let mut timestamp_ms = 0.0;
//! loop {
//!     match session.tick(timestamp_ms)? {
//!         Tick::Halted => break, // module faulted; last frame stays visible
//!         _ => {}
//!     }
//!     timestamp_ms += 1000.0 / 60.0;
//! }
//! ```
//!
//! Hosts with a real renderer implement [`Surface`]; hosts with durable
//! storage implement [`StorageBackend`] or use [`FileStorage`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod error;
pub mod storage;
pub mod surface;

// Re-export main types
pub use bridge::{
    rescale, Bridge, BridgeConfig, DriverState, FaultLocation, GameModule, HostFunctions,
    HostState, PanicLatch, Session, Tick,
};
pub use error::{BridgeError, Result};
pub use storage::{
    decode_value, encode_value, FileStorage, MemoryStorage, StorageBackend, ENCODE_CHUNK,
};
pub use surface::{Color, DrawCommand, LineJoin, RecordingSurface, Surface};
