//! Host functions imported by game modules.
//!
//! WASM imports only carry numeric parameters, so every function here takes
//! plain numbers; text and byte blobs arrive as (pointer, length) pairs into
//! the module's linear memory. The memory export is re-fetched from the
//! [`Caller`] on every invocation: module-side allocation may grow memory
//! between calls and invalidate any earlier view, so no view is ever held
//! across a call boundary.
//!
//! ## Import namespaces
//!
//! - `drawing`: surface primitives and diagnostics (`draw_line`,
//!   `fill_text`, `print`, `handle_panic`, ...)
//! - `storage`: `save` / `load` with the byte <-> string persistence codec

use wasmtime::{Caller, Linker, Memory, StoreLimits};

use crate::error::{BridgeError, Result};
use crate::storage::{decode_value, encode_value, StorageBackend};
use crate::surface::{Color, LineJoin, Surface};

/// Sentinel for `fill_text`: no width constraint.
const NO_WIDTH_LIMIT: f64 = -1.0;

/// Source location reported by a panicking module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultLocation {
    /// Module source file path
    pub path: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

/// One-way fault latch for a session.
///
/// Created unlatched; `trip` makes the `false -> true` transition permanent
/// for the session. The frame driver reads it on every tick and stops
/// scheduling once it is set.
#[derive(Debug, Default)]
pub struct PanicLatch {
    latched: bool,
    location: Option<FaultLocation>,
}

impl PanicLatch {
    /// Whether the latch has been tripped.
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Location of the fault, if the module reported one before tripping.
    pub fn location(&self) -> Option<&FaultLocation> {
        self.location.as_ref()
    }

    pub(crate) fn trip(&mut self) {
        self.latched = true;
    }

    pub(crate) fn record_location(&mut self, location: FaultLocation) {
        // First report wins; a panic inside the panic path must not clobber it.
        if self.location.is_none() {
            self.location = Some(location);
        }
    }
}

/// Per-session host state threaded through every host function call.
///
/// This is the session object: surface, storage, and the panic latch live
/// here rather than in process-wide globals, so independent sessions (and
/// tests) never share state.
pub struct HostState<S, B> {
    pub(crate) surface: S,
    pub(crate) storage: B,
    pub(crate) panic: PanicLatch,
    pub(crate) limits: StoreLimits,
}

impl<S, B> HostState<S, B> {
    pub(crate) fn new(surface: S, storage: B, limits: StoreLimits) -> Self {
        Self {
            surface,
            storage,
            panic: PanicLatch::default(),
            limits,
        }
    }
}

/// The import table exposed to game modules.
///
/// Marker struct for organizing host function registration.
pub struct HostFunctions;

impl HostFunctions {
    /// Register the full import table with the linker.
    pub fn register<S, B>(linker: &mut Linker<HostState<S, B>>) -> Result<()>
    where
        S: Surface + 'static,
        B: StorageBackend + 'static,
    {
        Self::register_drawing(linker)?;
        Self::register_text_drawing(linker)?;
        Self::register_diagnostics(linker)?;
        Self::register_storage(linker)?;
        Ok(())
    }

    /// Numeric-only drawing primitives: straight relay to the surface.
    fn register_drawing<S, B>(linker: &mut Linker<HostState<S, B>>) -> Result<()>
    where
        S: Surface + 'static,
        B: StorageBackend + 'static,
    {
        linker
            .func_wrap(
                "drawing",
                "draw_line",
                |mut caller: Caller<'_, HostState<S, B>>, x1: f64, y1: f64, x2: f64, y2: f64| {
                    caller.data_mut().surface.line(x1, y1, x2, y2);
                },
            )
            .map_err(register_err("draw_line"))?;

        linker
            .func_wrap(
                "drawing",
                "draw_ellipse",
                |mut caller: Caller<'_, HostState<S, B>>,
                 x: f64,
                 y: f64,
                 radius_x: f64,
                 radius_y: f64,
                 rotation: f64,
                 start_angle: f64,
                 end_angle: f64,
                 counterclockwise: i32| {
                    caller.data_mut().surface.ellipse(
                        x,
                        y,
                        radius_x,
                        radius_y,
                        rotation,
                        start_angle,
                        end_angle,
                        counterclockwise != 0,
                    );
                },
            )
            .map_err(register_err("draw_ellipse"))?;

        linker
            .func_wrap(
                "drawing",
                "canvas_width",
                |caller: Caller<'_, HostState<S, B>>| -> f64 { caller.data().surface.width() },
            )
            .map_err(register_err("canvas_width"))?;

        linker
            .func_wrap(
                "drawing",
                "canvas_height",
                |caller: Caller<'_, HostState<S, B>>| -> f64 { caller.data().surface.height() },
            )
            .map_err(register_err("canvas_height"))?;

        linker
            .func_wrap(
                "drawing",
                "clear_canvas",
                |mut caller: Caller<'_, HostState<S, B>>| {
                    caller.data_mut().surface.clear();
                },
            )
            .map_err(register_err("clear_canvas"))?;

        linker
            .func_wrap(
                "drawing",
                "set_stroke_color",
                |mut caller: Caller<'_, HostState<S, B>>, r: i32, g: i32, b: i32, a: i32| {
                    let color = Color::rgba(r as u8, g as u8, b as u8, a as u8);
                    caller.data_mut().surface.set_stroke_color(color);
                },
            )
            .map_err(register_err("set_stroke_color"))?;

        linker
            .func_wrap(
                "drawing",
                "set_stroke_thickness",
                |mut caller: Caller<'_, HostState<S, B>>, px: f64| {
                    caller.data_mut().surface.set_stroke_thickness(px);
                },
            )
            .map_err(register_err("set_stroke_thickness"))?;

        linker
            .func_wrap(
                "drawing",
                "set_fill_color",
                |mut caller: Caller<'_, HostState<S, B>>, r: i32, g: i32, b: i32, a: i32| {
                    let color = Color::rgba(r as u8, g as u8, b as u8, a as u8);
                    caller.data_mut().surface.set_fill_color(color);
                },
            )
            .map_err(register_err("set_fill_color"))?;

        linker
            .func_wrap(
                "drawing",
                "fill_rect",
                |mut caller: Caller<'_, HostState<S, B>>, x: f64, y: f64, w: f64, h: f64| {
                    caller.data_mut().surface.fill_rect(x, y, w, h);
                },
            )
            .map_err(register_err("fill_rect"))?;

        linker
            .func_wrap(
                "drawing",
                "stroke_rect",
                |mut caller: Caller<'_, HostState<S, B>>, x: f64, y: f64, w: f64, h: f64| {
                    caller.data_mut().surface.stroke_rect(x, y, w, h);
                },
            )
            .map_err(register_err("stroke_rect"))?;

        linker
            .func_wrap(
                "drawing",
                "set_line_join",
                |mut caller: Caller<'_, HostState<S, B>>, code: i32| {
                    let join = match LineJoin::from_code(code) {
                        Some(join) => join,
                        None => {
                            tracing::warn!("unknown line join code {code}, defaulting to miter");
                            LineJoin::Miter
                        }
                    };
                    caller.data_mut().surface.set_line_join(join);
                },
            )
            .map_err(register_err("set_line_join"))?;

        Ok(())
    }

    /// Drawing primitives that carry (pointer, length) text arguments.
    fn register_text_drawing<S, B>(linker: &mut Linker<HostState<S, B>>) -> Result<()>
    where
        S: Surface + 'static,
        B: StorageBackend + 'static,
    {
        linker
            .func_wrap(
                "drawing",
                "set_font",
                |mut caller: Caller<'_, HostState<S, B>>,
                 pixel_size: f64,
                 ptr: i32,
                 len: i32|
                 -> wasmtime::Result<()> {
                    let memory = get_memory(&mut caller)?;
                    let family = decode_text(&memory, &caller, ptr, len)?;
                    caller.data_mut().surface.set_font(pixel_size, &family);
                    Ok(())
                },
            )
            .map_err(register_err("set_font"))?;

        linker
            .func_wrap(
                "drawing",
                "fill_text",
                |mut caller: Caller<'_, HostState<S, B>>,
                 ptr: i32,
                 len: i32,
                 x: f64,
                 y: f64,
                 max_width: f64|
                 -> wasmtime::Result<()> {
                    let memory = get_memory(&mut caller)?;
                    let text = decode_text(&memory, &caller, ptr, len)?;
                    let max_width = if max_width == NO_WIDTH_LIMIT {
                        None
                    } else {
                        Some(max_width)
                    };
                    caller.data_mut().surface.fill_text(&text, x, y, max_width);
                    Ok(())
                },
            )
            .map_err(register_err("fill_text"))?;

        Ok(())
    }

    /// Diagnostics and the panic latch. None of these fail the caller.
    fn register_diagnostics<S, B>(linker: &mut Linker<HostState<S, B>>) -> Result<()>
    where
        S: Surface + 'static,
        B: StorageBackend + 'static,
    {
        linker
            .func_wrap(
                "drawing",
                "print",
                |mut caller: Caller<'_, HostState<S, B>>,
                 ptr: i32,
                 len: i32|
                 -> wasmtime::Result<()> {
                    let memory = get_memory(&mut caller)?;
                    let text = decode_text(&memory, &caller, ptr, len)?;
                    tracing::info!(target: "module", "{text}");
                    Ok(())
                },
            )
            .map_err(register_err("print"))?;

        linker
            .func_wrap(
                "drawing",
                "print_number",
                |_caller: Caller<'_, HostState<S, B>>, n: f64| {
                    tracing::info!(target: "module", "{n}");
                },
            )
            .map_err(register_err("print_number"))?;

        linker
            .func_wrap(
                "drawing",
                "print_panic_location",
                |mut caller: Caller<'_, HostState<S, B>>,
                 path_ptr: i32,
                 path_len: i32,
                 line: f64,
                 column: f64|
                 -> wasmtime::Result<()> {
                    let memory = get_memory(&mut caller)?;
                    let path = decode_text(&memory, &caller, path_ptr, path_len)?;
                    let location = FaultLocation {
                        path,
                        line: line as u32,
                        column: column as u32,
                    };
                    tracing::error!(
                        "module panic at {}:{}:{}",
                        location.path,
                        location.line,
                        location.column
                    );
                    caller.data_mut().panic.record_location(location);
                    Ok(())
                },
            )
            .map_err(register_err("print_panic_location"))?;

        linker
            .func_wrap(
                "drawing",
                "handle_panic",
                |mut caller: Caller<'_, HostState<S, B>>| {
                    let panic = &mut caller.data_mut().panic;
                    if !panic.is_latched() {
                        tracing::error!("module signalled a panic, stopping the frame loop");
                    }
                    panic.trip();
                },
            )
            .map_err(register_err("handle_panic"))?;

        Ok(())
    }

    /// The save/load pair backed by the persistence codec.
    fn register_storage<S, B>(linker: &mut Linker<HostState<S, B>>) -> Result<()>
    where
        S: Surface + 'static,
        B: StorageBackend + 'static,
    {
        linker
            .func_wrap(
                "storage",
                "save",
                |mut caller: Caller<'_, HostState<S, B>>,
                 key_ptr: i32,
                 key_len: i32,
                 val_ptr: i32,
                 val_len: i32|
                 -> wasmtime::Result<i32> {
                    let memory = get_memory(&mut caller)?;
                    let key = decode_text(&memory, &caller, key_ptr, key_len)?;
                    let value = read_bytes(
                        &memory,
                        &caller,
                        val_ptr as u32 as usize,
                        val_len as u32 as usize,
                    )?;
                    let encoded = encode_value(&value);
                    match caller.data_mut().storage.set(&key, &encoded) {
                        Ok(()) => Ok(1),
                        Err(e) => {
                            tracing::warn!("save of key {key:?} rejected: {e}");
                            Ok(0)
                        }
                    }
                },
            )
            .map_err(register_err("save"))?;

        linker
            .func_wrap(
                "storage",
                "load",
                |mut caller: Caller<'_, HostState<S, B>>,
                 key_ptr: i32,
                 key_len: i32,
                 out_ptr: i32,
                 out_capacity: i32,
                 presence_ptr: i32|
                 -> wasmtime::Result<()> {
                    let memory = get_memory(&mut caller)?;
                    let key = decode_text(&memory, &caller, key_ptr, key_len)?;
                    let stored = caller.data().storage.get(&key).map(decode_value);
                    match stored {
                        None => {
                            write_bytes(&memory, &mut caller, presence_ptr as u32 as usize, &[0])?;
                        }
                        Some(bytes) => {
                            // Bound by the stored length as well as the
                            // capacity; bytes past the stored value are left
                            // untouched in module memory.
                            let count = bytes.len().min(out_capacity as u32 as usize);
                            write_bytes(
                                &memory,
                                &mut caller,
                                out_ptr as u32 as usize,
                                &bytes[..count],
                            )?;
                            write_bytes(&memory, &mut caller, presence_ptr as u32 as usize, &[1])?;
                        }
                    }
                    Ok(())
                },
            )
            .map_err(register_err("load"))?;

        Ok(())
    }
}

fn register_err(name: &'static str) -> impl Fn(wasmtime::Error) -> BridgeError {
    move |e| BridgeError::Wasm(format!("failed to register {name}: {e}"))
}

// ============================================================================
// Memory Access Helpers
// ============================================================================

/// Get the memory export from the caller. Fetched fresh on every host call.
fn get_memory<T>(caller: &mut Caller<'_, T>) -> Result<Memory> {
    caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| BridgeError::Memory("no memory export found".to_string()))
}

/// Copy a (pointer, length) range out of module memory and decode it as text.
///
/// The returned string owns its bytes; nothing aliases module memory after
/// this returns. Malformed UTF-8 is replaced rather than failing, so
/// untrusted module output cannot fault the bridge.
fn decode_text<T>(memory: &Memory, caller: &Caller<'_, T>, ptr: i32, len: i32) -> Result<String> {
    let bytes = read_bytes(memory, caller, ptr as u32 as usize, len as u32 as usize)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Copy raw bytes out of module memory with bounds checking.
fn read_bytes<T>(
    memory: &Memory,
    caller: &Caller<'_, T>,
    offset: usize,
    len: usize,
) -> Result<Vec<u8>> {
    let data = memory.data(caller);
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            BridgeError::Memory(format!("read of {len} bytes at offset {offset} out of bounds"))
        })?;
    Ok(data[offset..end].to_vec())
}

/// Write raw bytes into module memory with bounds checking.
fn write_bytes<T>(
    memory: &Memory,
    caller: &mut Caller<'_, T>,
    offset: usize,
    data: &[u8],
) -> Result<()> {
    let mem = memory.data_mut(caller);
    let end = offset
        .checked_add(data.len())
        .filter(|&end| end <= mem.len())
        .ok_or_else(|| {
            BridgeError::Memory(format!(
                "write of {} bytes at offset {offset} out of bounds",
                data.len()
            ))
        })?;
    mem[offset..end].copy_from_slice(data);
    Ok(())
}
