//! Bridge runtime implementation using wasmtime.

use super::config::BridgeConfig;
use super::host::{FaultLocation, HostFunctions, HostState};
use crate::error::{BridgeError, Result};
use crate::storage::StorageBackend;
use crate::surface::Surface;

use std::path::Path;
use std::time::Instant;

use wasmtime::*;

/// The bridge: a configured WASM engine that loads and instantiates game
/// modules.
pub struct Bridge {
    engine: Engine,
    config: BridgeConfig,
}

/// A compiled game module.
pub struct GameModule {
    module: Module,
    name: String,
}

/// Lifecycle state of a session's frame driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Instance constructed, `init` not yet run
    Uninitialized,
    /// `init` has run; ticks drive `draw`
    Running,
    /// Fault latch observed; terminal, the session cannot resume
    Halted,
}

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// First tick: only the timestamp was recorded, no draw call was made
    Skipped,
    /// The module drew a frame
    Drawn {
        /// Time delta handed to `draw`, in seconds
        delta_seconds: f64,
        /// Wall time spent inside the module's `draw`, in microseconds
        draw_time_us: u64,
    },
    /// The session is halted; nothing was scheduled
    Halted,
}

/// Timestamp bookkeeping for the frame driver.
///
/// The first tick has no previous timestamp, so it yields no delta; the
/// driver records the timestamp and skips the draw instead of handing the
/// module an undefined (and typically huge) initial delta.
#[derive(Debug, Default)]
pub(crate) struct FrameClock {
    last_ms: Option<f64>,
}

impl FrameClock {
    /// Advance to `timestamp_ms`, returning the elapsed time in seconds
    /// since the previous tick, or `None` on the first tick.
    pub(crate) fn advance(&mut self, timestamp_ms: f64) -> Option<f64> {
        let delta = self.last_ms.map(|last| (timestamp_ms - last) / 1000.0);
        self.last_ms = Some(timestamp_ms);
        delta
    }
}

/// Linearly rescale `value` from `[in_min, in_max]` to `[out_min, out_max]`.
///
/// Used to map pointer-event coordinates from the on-screen element box to
/// logical surface space.
pub fn rescale(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// An instantiated game module plus its frame driver.
///
/// All session state (surface, storage, panic latch, frame clock) lives in
/// this object; constructing two sessions gives two fully independent games.
pub struct Session<S, B> {
    store: Store<HostState<S, B>>,
    instance: Instance,
    state: DriverState,
    clock: FrameClock,
}

impl Bridge {
    /// Create a bridge with the given configuration.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let mut engine_config = Config::new();

        engine_config.cranelift_opt_level(match config.optimization_level {
            0 => OptLevel::None,
            _ => OptLevel::Speed,
        });

        if config.fuel_limit.is_some() {
            engine_config.consume_fuel(true);
        }

        let engine = Engine::new(&engine_config)
            .map_err(|e| BridgeError::Wasm(format!("engine creation failed: {e}")))?;

        Ok(Self { engine, config })
    }

    /// Load a game module from a file.
    pub fn load_module(&self, path: impl AsRef<Path>) -> Result<GameModule> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let module = Module::from_file(&self.engine, path)
            .map_err(|e| BridgeError::Wasm(format!("module load failed: {e}")))?;

        Ok(GameModule { module, name })
    }

    /// Load a game module from bytes (binary WASM or WAT text).
    pub fn load_module_bytes(&self, name: &str, bytes: &[u8]) -> Result<GameModule> {
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| BridgeError::Wasm(format!("module creation failed: {e}")))?;

        Ok(GameModule {
            module,
            name: name.to_string(),
        })
    }

    /// Instantiate a module against a drawing surface and a storage backend.
    ///
    /// The returned session is `Uninitialized`; call [`Session::start`] to
    /// run the module's `init` and arm the frame driver.
    pub fn instantiate<S, B>(
        &self,
        module: &GameModule,
        surface: S,
        storage: B,
    ) -> Result<Session<S, B>>
    where
        S: Surface + 'static,
        B: StorageBackend + 'static,
    {
        let limits = StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory)
            .build();
        let state = HostState::new(surface, storage, limits);
        let mut store = Store::new(&self.engine, state);

        store.limiter(|state| &mut state.limits);

        if let Some(fuel) = self.config.fuel_limit {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::Wasm(format!("fuel setup failed: {e}")))?;
        }

        let mut linker: Linker<HostState<S, B>> = Linker::new(&self.engine);
        HostFunctions::register(&mut linker)?;

        let instance = linker
            .instantiate(&mut store, &module.module)
            .map_err(|e| BridgeError::Wasm(format!("instantiation failed: {e}")))?;

        Ok(Session {
            store,
            instance,
            state: DriverState::Uninitialized,
            clock: FrameClock::default(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl GameModule {
    /// Get the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get exported function names.
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.module.exports().filter_map(|e| {
            if matches!(e.ty(), ExternType::Func(_)) {
                Some(e.name())
            } else {
                None
            }
        })
    }
}

impl<S, B> Session<S, B>
where
    S: Surface + 'static,
    B: StorageBackend + 'static,
{
    /// Run the module's `init` entry point and arm the frame driver.
    ///
    /// `init` runs exactly once per session; a second call is a state error.
    pub fn start(&mut self) -> Result<()> {
        if self.state != DriverState::Uninitialized {
            return Err(BridgeError::State(format!(
                "init already ran (session is {:?})",
                self.state
            )));
        }

        let init = self.get_typed_func::<(), ()>("init")?;
        init.call(&mut self.store, ())
            .map_err(|e| BridgeError::Wasm(format!("init failed: {e}")))?;

        self.state = DriverState::Running;
        Ok(())
    }

    /// Run one scheduler tick at `timestamp_ms`.
    ///
    /// Checks the panic latch, computes the frame delta, clears the surface,
    /// and calls the module's `draw(delta)`. Once halted, every further tick
    /// returns [`Tick::Halted`] and nothing is scheduled.
    pub fn tick(&mut self, timestamp_ms: f64) -> Result<Tick> {
        match self.state {
            DriverState::Uninitialized => {
                Err(BridgeError::State("tick before start".to_string()))
            }
            DriverState::Halted => Ok(Tick::Halted),
            DriverState::Running => {
                if self.store.data().panic.is_latched() {
                    self.state = DriverState::Halted;
                    return Ok(Tick::Halted);
                }

                let Some(delta_seconds) = self.clock.advance(timestamp_ms) else {
                    return Ok(Tick::Skipped);
                };

                self.store.data_mut().surface.clear();

                let draw = self.get_typed_func::<f64, ()>("draw")?;
                let started = Instant::now();
                match draw.call(&mut self.store, delta_seconds) {
                    Ok(()) => Ok(Tick::Drawn {
                        delta_seconds,
                        draw_time_us: started.elapsed().as_micros() as u64,
                    }),
                    // A module panic ends in a trap after tripping the
                    // latch; that is the normal fault path, not a bridge
                    // error. The last drawn frame stays visible.
                    Err(e) if self.store.data().panic.is_latched() => {
                        tracing::debug!("draw trapped after panic signal: {e}");
                        self.state = DriverState::Halted;
                        Ok(Tick::Halted)
                    }
                    Err(e) => Err(BridgeError::Wasm(format!("draw failed: {e}"))),
                }
            }
        }
    }

    /// Forward a pointer click to the module.
    ///
    /// `(x, y)` are device coordinates relative to the surface's on-screen
    /// box of `box_width` x `box_height`; they are rescaled into logical
    /// surface space before the module's `handle_click` runs. Ignored unless
    /// the session is running.
    pub fn pointer_click(
        &mut self,
        x: f64,
        y: f64,
        box_width: f64,
        box_height: f64,
    ) -> Result<()> {
        if self.state != DriverState::Running {
            return Ok(());
        }

        let (width, height) = {
            let surface = &self.store.data().surface;
            (surface.width(), surface.height())
        };
        let scaled_x = rescale(x, 0.0, box_width, 0.0, width);
        let scaled_y = rescale(y, 0.0, box_height, 0.0, height);

        let handle_click = self.get_typed_func::<(f64, f64), ()>("handle_click")?;
        handle_click
            .call(&mut self.store, (scaled_x, scaled_y))
            .map_err(|e| BridgeError::Wasm(format!("handle_click failed: {e}")))
    }

    /// Resize the surface and inform the module via `set_size`.
    pub fn resize(&mut self, width: f64, height: f64) -> Result<()> {
        self.store.data_mut().surface.resize(width, height);

        // Report the dimensions the surface actually took, in case the
        // backend clamps them.
        let (width, height) = {
            let surface = &self.store.data().surface;
            (surface.width(), surface.height())
        };

        let set_size = self.get_typed_func::<(f64, f64), ()>("set_size")?;
        set_size
            .call(&mut self.store, (width, height))
            .map_err(|e| BridgeError::Wasm(format!("set_size failed: {e}")))
    }

    /// Call an additional module export with typed parameters.
    ///
    /// The bridge itself only calls the four contract entry points; this is
    /// the escape hatch for module-specific exports.
    pub fn call<P, R>(&mut self, name: &str, params: P) -> Result<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self.get_typed_func::<P, R>(name)?;
        func.call(&mut self.store, params)
            .map_err(|e| BridgeError::Wasm(format!("call to '{name}' failed: {e}")))
    }

    /// Current driver state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Whether the panic latch has been tripped.
    pub fn panicked(&self) -> bool {
        self.store.data().panic.is_latched()
    }

    /// Fault location reported by the module, if any.
    pub fn fault_location(&self) -> Option<&FaultLocation> {
        self.store.data().panic.location()
    }

    /// The drawing surface.
    pub fn surface(&self) -> &S {
        &self.store.data().surface
    }

    /// The drawing surface, mutable.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.store.data_mut().surface
    }

    /// The storage backend.
    pub fn storage(&self) -> &B {
        &self.store.data().storage
    }

    /// The storage backend, mutable.
    pub fn storage_mut(&mut self) -> &mut B {
        &mut self.store.data_mut().storage
    }

    /// Get remaining fuel (if fuel limiting is enabled).
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    /// Write bytes into module memory at the given offset.
    pub fn write_memory(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let memory = self.get_memory()?;
        let mem_data = memory.data_mut(&mut self.store);

        if offset + data.len() > mem_data.len() {
            return Err(BridgeError::Memory("memory write out of bounds".to_string()));
        }

        mem_data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read bytes from module memory at the given offset.
    pub fn read_memory(&mut self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let memory = self.get_memory()?;
        let mem_data = memory.data(&self.store);

        if offset + len > mem_data.len() {
            return Err(BridgeError::Memory("memory read out of bounds".to_string()));
        }

        Ok(mem_data[offset..offset + len].to_vec())
    }

    /// Get a typed function from the instance.
    fn get_typed_func<P, R>(&mut self, name: &str) -> Result<TypedFunc<P, R>>
    where
        P: WasmParams,
        R: WasmResults,
    {
        self.instance
            .get_typed_func::<P, R>(&mut self.store, name)
            .map_err(|e| BridgeError::Wasm(format!("function '{name}' not found: {e}")))
    }

    /// Get the memory export.
    fn get_memory(&mut self) -> Result<Memory> {
        self.instance
            .get_memory(&mut self.store, "memory")
            .ok_or_else(|| BridgeError::Memory("no memory export found".to_string()))
    }
}
