//! Fake loader primitives shared by the integration tests.
//!
//! `FakeBackend` serves libraries from an in-memory table keyed by the exact
//! candidate string, and records every open attempt, open, close and vendor
//! entry-point call into one ordered log.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::Arc;

use osrkit_core::symbols::{
    ASYNC_EXECUTE, GET_ASSETS_DIR, INITIALIZE, SET_ASSETS_DIR, SYNC_EXECUTE, UNINITIALIZE,
};
use osrkit_core::{LoaderBackend, LoaderConfig, RawSymbol, SharingMode};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Attempt(String),
    Open(String, SharingMode),
    Close(String),
    Vendor(&'static str),
}

type Log = Arc<Mutex<Vec<Event>>>;

thread_local! {
    static VENDOR_LOG: RefCell<Option<Log>> = const { RefCell::new(None) };
    static INIT_PANICS: Cell<bool> = const { Cell::new(false) };
    static SET_ASSETS_PANICS: Cell<bool> = const { Cell::new(false) };
    static SYNC_RESULT: Cell<bool> = const { Cell::new(true) };
    static LAST_TIMEOUT: Cell<c_int> = const { Cell::new(0) };
    static LAST_ASSETS_DIR: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn record(event: Event) {
    VENDOR_LOG.with(|log| {
        if let Some(log) = log.borrow().as_ref() {
            log.lock().push(event);
        }
    });
}

pub fn set_init_panics(value: bool) {
    INIT_PANICS.with(|c| c.set(value));
}

pub fn set_assets_panics(value: bool) {
    SET_ASSETS_PANICS.with(|c| c.set(value));
}

pub fn set_sync_result(value: bool) {
    SYNC_RESULT.with(|c| c.set(value));
}

pub fn last_timeout() -> c_int {
    LAST_TIMEOUT.with(Cell::get)
}

pub fn last_assets_dir() -> Option<String> {
    LAST_ASSETS_DIR.with(|c| c.borrow().clone())
}

extern "C-unwind" fn fake_initialize() {
    record(Event::Vendor(INITIALIZE));
    if INIT_PANICS.with(Cell::get) {
        panic!("vendor init exploded");
    }
}

extern "C-unwind" fn fake_uninitialize() {
    record(Event::Vendor(UNINITIALIZE));
}

extern "C-unwind" fn fake_set_assets_dir(dir: *const c_char) {
    record(Event::Vendor(SET_ASSETS_DIR));
    if SET_ASSETS_PANICS.with(Cell::get) {
        panic!("assets missing");
    }
    let dir = unsafe { CStr::from_ptr(dir) }.to_string_lossy().into_owned();
    LAST_ASSETS_DIR.with(|c| *c.borrow_mut() = Some(dir));
}

static ASSETS_REPLY: &[u8] = b"/vendor/assets/osr\0";

extern "C-unwind" fn fake_get_assets_dir() -> *const c_char {
    record(Event::Vendor(GET_ASSETS_DIR));
    ASSETS_REPLY.as_ptr().cast()
}

extern "C-unwind" fn fake_sync_execute(
    _input: *const c_void,
    _output: *const c_void,
    timeout_ms: c_int,
) -> bool {
    record(Event::Vendor(SYNC_EXECUTE));
    LAST_TIMEOUT.with(|c| c.set(timeout_ms));
    SYNC_RESULT.with(Cell::get)
}

extern "C-unwind" fn fake_async_execute(
    _input: *const c_void,
    _output: *const c_void,
    _callback: *mut c_void,
) -> bool {
    record(Event::Vendor(ASYNC_EXECUTE));
    true
}

/// Every entry point the plugin can export.
pub fn full_plugin() -> Vec<(&'static str, usize)> {
    let initialize: extern "C-unwind" fn() = fake_initialize;
    let uninitialize: extern "C-unwind" fn() = fake_uninitialize;
    let set_assets_dir: extern "C-unwind" fn(*const c_char) = fake_set_assets_dir;
    let get_assets_dir: extern "C-unwind" fn() -> *const c_char = fake_get_assets_dir;
    let sync_execute: extern "C-unwind" fn(*const c_void, *const c_void, c_int) -> bool =
        fake_sync_execute;
    let async_execute: extern "C-unwind" fn(*const c_void, *const c_void, *mut c_void) -> bool =
        fake_async_execute;
    vec![
        (INITIALIZE, initialize as usize),
        (UNINITIALIZE, uninitialize as usize),
        (SET_ASSETS_DIR, set_assets_dir as usize),
        (GET_ASSETS_DIR, get_assets_dir as usize),
        (SYNC_EXECUTE, sync_execute as usize),
        (ASYNC_EXECUTE, async_execute as usize),
    ]
}

/// Only the required entry points.
pub fn minimal_plugin() -> Vec<(&'static str, usize)> {
    full_plugin()
        .into_iter()
        .filter(|(name, _)| [INITIALIZE, SET_ASSETS_DIR, SYNC_EXECUTE].contains(name))
        .collect()
}

/// `full_plugin` without `name`.
pub fn plugin_without(name: &str) -> Vec<(&'static str, usize)> {
    full_plugin().into_iter().filter(|(n, _)| *n != name).collect()
}

pub struct FakeModule {
    path: String,
    log: Log,
}

impl Drop for FakeModule {
    fn drop(&mut self) {
        self.log.lock().push(Event::Close(self.path.clone()));
    }
}

#[derive(Clone)]
pub struct FakeBackend {
    files: Arc<Mutex<HashMap<String, HashMap<String, usize>>>>,
    log: Log,
}

impl FakeBackend {
    /// New backend; vendor calls made on this thread log into it and the
    /// vendor behavior switches are reset.
    pub fn new() -> Self {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        VENDOR_LOG.with(|l| *l.borrow_mut() = Some(Arc::clone(&log)));
        set_init_panics(false);
        set_assets_panics(false);
        set_sync_result(true);
        LAST_TIMEOUT.with(|c| c.set(0));
        LAST_ASSETS_DIR.with(|c| *c.borrow_mut() = None);
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            log,
        }
    }

    /// Make `path` openable, exporting `symbols`.
    pub fn install(&self, path: &str, symbols: &[(&'static str, usize)]) {
        let table = symbols.iter().map(|(n, a)| (n.to_string(), *a)).collect();
        self.files.lock().insert(path.to_string(), table);
    }

    /// Make `path` openable with no exports.
    pub fn install_empty(&self, path: &str) {
        self.install(path, &[]);
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().clone()
    }

    pub fn clear_events(&self) {
        self.log.lock().clear();
    }

    pub fn attempts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Attempt(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn opens(&self) -> Vec<(String, SharingMode)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Open(p, m) => Some((p, m)),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Close(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn vendor_calls(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Vendor(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Opens without a matching close.
    pub fn open_count(&self) -> usize {
        self.opens().len() - self.closes().len()
    }
}

impl LoaderBackend for FakeBackend {
    type Module = FakeModule;

    fn open(&self, candidate: &str, mode: SharingMode) -> Result<FakeModule, String> {
        self.log.lock().push(Event::Attempt(candidate.to_string()));
        if !self.files.lock().contains_key(candidate) {
            return Err(format!("dlopen failed: \"{}\" not found", candidate));
        }
        self.log
            .lock()
            .push(Event::Open(candidate.to_string(), mode));
        Ok(FakeModule {
            path: candidate.to_string(),
            log: Arc::clone(&self.log),
        })
    }

    fn symbol(&self, module: &FakeModule, name: &str) -> Option<RawSymbol> {
        let files = self.files.lock();
        let addr = *files.get(&module.path)?.get(name)?;
        RawSymbol::from_ptr(addr as *mut c_void)
    }
}

pub const SYSTEM_A: &str = "/system/lib64";
pub const SYSTEM_B: &str = "/vendor/lib64";
pub const APP_A: &str = "/data/app/osr/lib/arm64";
pub const APP_B: &str = "/data/data/osr/lib";
pub const PRIMARY: &str = "libosr_plugin.so";
pub const ASSETS: &str = "/data/data/osr/assets";

/// Configuration used across the session tests.
pub fn test_config() -> LoaderConfig {
    LoaderConfig::default()
        .with_primary_library(PRIMARY)
        .with_system_paths([SYSTEM_A, SYSTEM_B])
        .with_app_paths([APP_A, APP_B])
        .with_auxiliary_libraries(["libaux_a.so", "libaux_b.so", "libaux_c.so"])
        .with_assets_dir(ASSETS)
}

pub fn at(dir: &str, name: &str) -> String {
    format!("{}/{}", dir, name)
}
