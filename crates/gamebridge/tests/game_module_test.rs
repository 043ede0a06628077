//! Integration tests driving a real game module through the bridge.
//!
//! The guest is a small WAT module that exercises the import table and the
//! four entry points. Scratch layout used to observe the module from the
//! host side:
//!
//! ```text
//!   0..11    panic location path ("src/game.rs")
//!  16..28    text drawn every frame ("hello bridge")
//!  32..42    font family ("sans-serif")
//!  64, 72    f64 click x / y as seen by handle_click
//!  80, 88    f64 width / height as seen by set_size
//!  96        f64 canvas_width sampled during draw
//! 104        i32 frame counter
//! 108        i32 panic-on-next-draw flag
//! ```

use gamebridge::{
    Bridge, BridgeConfig, DrawCommand, DriverState, LineJoin, MemoryStorage, RecordingSurface,
    StorageBackend, Surface, Tick,
};

const GAME_WAT: &str = r#"
(module
  (import "drawing" "draw_line" (func $draw_line (param f64 f64 f64 f64)))
  (import "drawing" "canvas_width" (func $canvas_width (result f64)))
  (import "drawing" "set_fill_color" (func $set_fill_color (param i32 i32 i32 i32)))
  (import "drawing" "fill_rect" (func $fill_rect (param f64 f64 f64 f64)))
  (import "drawing" "set_line_join" (func $set_line_join (param i32)))
  (import "drawing" "set_font" (func $set_font (param f64 i32 i32)))
  (import "drawing" "fill_text" (func $fill_text (param i32 i32 f64 f64 f64)))
  (import "drawing" "print" (func $print (param i32 i32)))
  (import "drawing" "print_number" (func $print_number (param f64)))
  (import "drawing" "print_panic_location"
    (func $print_panic_location (param i32 i32 f64 f64)))
  (import "drawing" "handle_panic" (func $handle_panic))
  (import "storage" "save" (func $save (param i32 i32 i32 i32) (result i32)))
  (import "storage" "load" (func $load (param i32 i32 i32 i32 i32)))

  (memory (export "memory") 1)

  (data (i32.const 0) "src/game.rs")
  (data (i32.const 16) "hello bridge")
  (data (i32.const 32) "sans-serif")

  (func (export "init")
    (call $set_fill_color (i32.const 16) (i32.const 32) (i32.const 64) (i32.const 255))
    (call $set_line_join (i32.const 1))
    (call $set_font (f64.const 14) (i32.const 32) (i32.const 10))
    (call $print (i32.const 16) (i32.const 12)))

  (func (export "draw") (param $delta f64)
    (if (i32.load (i32.const 108))
      (then
        (call $print_panic_location
          (i32.const 0) (i32.const 11) (f64.const 42) (f64.const 7))
        (call $handle_panic)
        (unreachable)))
    (i32.store (i32.const 104)
      (i32.add (i32.load (i32.const 104)) (i32.const 1)))
    (f64.store (i32.const 96) (call $canvas_width))
    (call $print_number (local.get $delta))
    (call $draw_line (f64.const 0) (f64.const 0) (f64.const 10) (f64.const 10))
    (call $fill_rect (f64.const 1) (f64.const 2) (f64.const 3) (f64.const 4))
    (call $fill_text
      (i32.const 16) (i32.const 12)
      (f64.const 5) (f64.const 20) (f64.const -1)))

  (func (export "handle_click") (param $x f64) (param $y f64)
    (f64.store (i32.const 64) (local.get $x))
    (f64.store (i32.const 72) (local.get $y)))

  (func (export "set_size") (param $w f64) (param $h f64)
    (f64.store (i32.const 80) (local.get $w))
    (f64.store (i32.const 88) (local.get $h)))

  (func (export "poke_line_join") (param i32)
    (call $set_line_join (local.get 0)))

  (func (export "save_blob") (param i32 i32 i32 i32) (result i32)
    (call $save (local.get 0) (local.get 1) (local.get 2) (local.get 3)))

  (func (export "load_blob") (param i32 i32 i32 i32 i32)
    (call $load
      (local.get 0) (local.get 1) (local.get 2) (local.get 3) (local.get 4))))
"#;

type GameSession = gamebridge::Session<RecordingSurface, MemoryStorage>;

fn new_session() -> GameSession {
    new_session_with(BridgeConfig::default(), MemoryStorage::new())
}

fn new_session_with(config: BridgeConfig, storage: MemoryStorage) -> GameSession {
    let bridge = Bridge::new(config).expect("failed to create bridge");
    let module = bridge
        .load_module_bytes("game", GAME_WAT.as_bytes())
        .expect("failed to load module");
    bridge
        .instantiate(&module, RecordingSurface::new(400.0, 300.0), storage)
        .expect("failed to instantiate")
}

fn read_f64(session: &mut GameSession, offset: usize) -> f64 {
    let bytes = session.read_memory(offset, 8).expect("read_memory failed");
    f64::from_le_bytes(bytes.try_into().unwrap())
}

/// Writes the key at 2048 and calls the module's save pass-through.
fn save_blob(session: &mut GameSession, value_ptr: i32, value_len: i32) -> i32 {
    session.write_memory(2048, b"slot").expect("write key failed");
    session
        .call("save_blob", (2048_i32, 4_i32, value_ptr, value_len))
        .expect("save_blob failed")
}

fn load_blob(session: &mut GameSession, out_ptr: i32, out_capacity: i32, presence_ptr: i32) {
    session.write_memory(2048, b"slot").expect("write key failed");
    session
        .call::<(i32, i32, i32, i32, i32), ()>(
            "load_blob",
            (2048, 4, out_ptr, out_capacity, presence_ptr),
        )
        .expect("load_blob failed")
}

#[test]
fn test_module_exports() {
    let bridge = Bridge::new(BridgeConfig::default()).expect("failed to create bridge");
    let module = bridge
        .load_module_bytes("game", GAME_WAT.as_bytes())
        .expect("failed to load module");

    assert_eq!(module.name(), "game");

    let exports: Vec<&str> = module.exports().collect();
    for name in ["init", "draw", "handle_click", "set_size"] {
        assert!(exports.contains(&name), "should export '{name}'");
    }
    // The memory export is not a function.
    assert!(!exports.contains(&"memory"));
}

#[test]
fn test_first_tick_skips_then_draws_with_delta() {
    let mut session = new_session();
    session.start().expect("start failed");

    assert_eq!(session.tick(1000.0).unwrap(), Tick::Skipped);

    let Tick::Drawn { delta_seconds, .. } = session.tick(1016.0).unwrap() else {
        panic!("second tick should draw");
    };
    assert!((delta_seconds - 0.016).abs() < 1e-12);

    let frames = session.read_memory(104, 4).unwrap();
    assert_eq!(i32::from_le_bytes(frames.try_into().unwrap()), 1);
}

#[test]
fn test_draw_relays_commands_to_surface() {
    let mut session = new_session();
    session.start().expect("start failed");
    session.tick(0.0).unwrap();
    session.tick(16.0).unwrap();

    let commands = session.surface().commands();

    // init ran before the frame: fill color, round join, font.
    assert!(commands.contains(&DrawCommand::FillColor(gamebridge::Color::rgba(
        16, 32, 64, 255
    ))));
    assert!(commands.contains(&DrawCommand::LineJoin(LineJoin::Round)));
    assert!(commands.contains(&DrawCommand::Font {
        pixel_size: 14.0,
        family: "sans-serif".to_string(),
    }));

    // The frame driver clears before draw issues its commands.
    let clear_at = commands
        .iter()
        .position(|c| *c == DrawCommand::Clear)
        .expect("driver should clear the surface");
    let tail = &commands[clear_at + 1..];
    assert!(tail.contains(&DrawCommand::Line {
        x1: 0.0,
        y1: 0.0,
        x2: 10.0,
        y2: 10.0
    }));
    assert!(tail.contains(&DrawCommand::FillRect {
        x: 1.0,
        y: 2.0,
        w: 3.0,
        h: 4.0
    }));
    // The -1 sentinel becomes an unconstrained width.
    assert!(tail.contains(&DrawCommand::FillText {
        text: "hello bridge".to_string(),
        x: 5.0,
        y: 20.0,
        max_width: None
    }));
}

#[test]
fn test_canvas_dimension_query() {
    let mut session = new_session();
    session.start().unwrap();
    session.tick(0.0).unwrap();
    session.tick(16.0).unwrap();

    assert_eq!(read_f64(&mut session, 96), 400.0);
}

#[test]
fn test_init_runs_exactly_once() {
    let mut session = new_session();
    assert_eq!(session.state(), DriverState::Uninitialized);

    session.start().expect("first start failed");
    assert_eq!(session.state(), DriverState::Running);

    assert!(session.start().is_err());
}

#[test]
fn test_tick_before_start_errors() {
    let mut session = new_session();
    assert!(session.tick(0.0).is_err());
}

#[test]
fn test_click_is_rescaled_to_surface_space() {
    let mut session = new_session();
    session.start().unwrap();

    // 800x600 on-screen box over the 400x300 logical surface.
    session.pointer_click(400.0, 300.0, 800.0, 600.0).unwrap();
    assert_eq!(read_f64(&mut session, 64), 200.0);
    assert_eq!(read_f64(&mut session, 72), 150.0);

    session.pointer_click(0.0, 0.0, 800.0, 600.0).unwrap();
    assert_eq!(read_f64(&mut session, 64), 0.0);
    assert_eq!(read_f64(&mut session, 72), 0.0);

    session.pointer_click(800.0, 600.0, 800.0, 600.0).unwrap();
    assert_eq!(read_f64(&mut session, 64), 400.0);
    assert_eq!(read_f64(&mut session, 72), 300.0);
}

#[test]
fn test_resize_updates_surface_then_module() {
    let mut session = new_session();
    session.start().unwrap();

    session.resize(1024.0, 768.0).unwrap();

    assert_eq!(session.surface().width(), 1024.0);
    assert_eq!(session.surface().height(), 768.0);
    assert_eq!(read_f64(&mut session, 80), 1024.0);
    assert_eq!(read_f64(&mut session, 88), 768.0);
}

#[test]
fn test_panic_latches_and_halts_permanently() {
    let mut session = new_session();
    session.start().unwrap();
    session.tick(0.0).unwrap();
    assert!(matches!(session.tick(16.0).unwrap(), Tick::Drawn { .. }));

    // Arm the panic path for the next draw.
    session.write_memory(108, &1_i32.to_le_bytes()).unwrap();

    assert_eq!(session.tick(32.0).unwrap(), Tick::Halted);
    assert_eq!(session.state(), DriverState::Halted);
    assert!(session.panicked());

    let location = session.fault_location().expect("location should be recorded");
    assert_eq!(location.path, "src/game.rs");
    assert_eq!(location.line, 42);
    assert_eq!(location.column, 7);

    // Halted is terminal: no further draw calls, indefinitely.
    for t in [48.0, 64.0, 80.0] {
        assert_eq!(session.tick(t).unwrap(), Tick::Halted);
    }
    let frames = session.read_memory(104, 4).unwrap();
    assert_eq!(i32::from_le_bytes(frames.try_into().unwrap()), 1);
}

#[test]
fn test_sessions_are_independent() {
    let bridge = Bridge::new(BridgeConfig::default()).unwrap();
    let module = bridge.load_module_bytes("game", GAME_WAT.as_bytes()).unwrap();

    let mut faulty = bridge
        .instantiate(&module, RecordingSurface::new(400.0, 300.0), MemoryStorage::new())
        .unwrap();
    let mut healthy = bridge
        .instantiate(&module, RecordingSurface::new(400.0, 300.0), MemoryStorage::new())
        .unwrap();

    faulty.start().unwrap();
    healthy.start().unwrap();

    faulty.write_memory(108, &1_i32.to_le_bytes()).unwrap();
    faulty.tick(0.0).unwrap();
    assert_eq!(faulty.tick(16.0).unwrap(), Tick::Halted);

    healthy.tick(0.0).unwrap();
    assert!(matches!(healthy.tick(16.0).unwrap(), Tick::Drawn { .. }));
    assert!(!healthy.panicked());
}

#[test]
fn test_storage_round_trip_across_chunk_boundary() {
    let mut session = new_session();
    session.start().unwrap();

    // 2500 bytes spans the 1024-byte encoding chunks and covers every value.
    let value: Vec<u8> = (0..2500_usize).map(|i| (i % 256) as u8).collect();
    session.write_memory(4096, &value).unwrap();

    assert_eq!(save_blob(&mut session, 4096, 2500), 1);
    assert!(session.storage().get("slot").is_some());

    load_blob(&mut session, 8192, 2500, 200);
    assert_eq!(session.read_memory(200, 1).unwrap(), vec![1]);
    assert_eq!(session.read_memory(8192, 2500).unwrap(), value);
}

#[test]
fn test_load_missing_key_reports_absence() {
    let mut session = new_session();
    session.start().unwrap();

    // Pre-fill the output range and presence byte with sentinels.
    session.write_memory(8192, &[0xAA; 16]).unwrap();
    session.write_memory(200, &[7]).unwrap();

    load_blob(&mut session, 8192, 16, 200);

    assert_eq!(session.read_memory(200, 1).unwrap(), vec![0]);
    assert_eq!(session.read_memory(8192, 16).unwrap(), vec![0xAA; 16]);
}

#[test]
fn test_load_truncates_to_capacity() {
    let mut session = new_session();
    session.start().unwrap();

    let value: Vec<u8> = (0..100_u8).collect();
    session.write_memory(4096, &value).unwrap();
    assert_eq!(save_blob(&mut session, 4096, 100), 1);

    session.write_memory(8192, &[0xEE; 20]).unwrap();
    load_blob(&mut session, 8192, 10, 200);

    assert_eq!(session.read_memory(200, 1).unwrap(), vec![1]);
    // Exactly `capacity` bytes are copied; the rest of the range is untouched.
    assert_eq!(session.read_memory(8192, 10).unwrap(), &value[..10]);
    assert_eq!(session.read_memory(8202, 10).unwrap(), vec![0xEE; 10]);
}

#[test]
fn test_load_with_capacity_beyond_stored_length() {
    let mut session = new_session();
    session.start().unwrap();

    session.write_memory(4096, &[1, 2, 3]).unwrap();
    assert_eq!(save_blob(&mut session, 4096, 3), 1);

    session.write_memory(8192, &[0xEE; 8]).unwrap();
    load_blob(&mut session, 8192, 8, 200);

    // Only the stored bytes are written; nothing is read past them.
    assert_eq!(
        session.read_memory(8192, 8).unwrap(),
        vec![1, 2, 3, 0xEE, 0xEE, 0xEE, 0xEE, 0xEE]
    );
}

#[test]
fn test_save_failure_returns_false_without_halting() {
    let mut session = new_session_with(BridgeConfig::default(), MemoryStorage::with_quota(8));
    session.start().unwrap();

    let value: Vec<u8> = (0..100_u8).collect();
    session.write_memory(4096, &value).unwrap();

    assert_eq!(save_blob(&mut session, 4096, 100), 0);
    assert!(!session.panicked());

    // The frame loop is unaffected by a storage rejection.
    session.tick(0.0).unwrap();
    assert!(matches!(session.tick(16.0).unwrap(), Tick::Drawn { .. }));
}

#[test]
fn test_unknown_line_join_defaults_to_miter() {
    let mut session = new_session();
    session.start().unwrap();

    session
        .call::<i32, ()>("poke_line_join", 9)
        .expect("poke_line_join failed");

    let last = session.surface().commands().last().cloned();
    assert_eq!(last, Some(DrawCommand::LineJoin(LineJoin::Miter)));
}

#[test]
fn test_fuel_limit_is_metered() {
    let mut session =
        new_session_with(BridgeConfig::default().fuel_limit(10_000_000), MemoryStorage::new());

    let initial = session.remaining_fuel().expect("fuel should be available");
    assert_eq!(initial, 10_000_000);

    session.start().unwrap();
    session.tick(0.0).unwrap();
    session.tick(16.0).unwrap();

    let remaining = session.remaining_fuel().expect("fuel should be available");
    assert!(remaining < initial, "fuel should have been consumed");
}
