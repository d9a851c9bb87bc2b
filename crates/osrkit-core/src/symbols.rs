//! Entry-point resolution for the primary plugin.
//!
//! Every symbol name the loader depends on is declared here, so ABI drift
//! surfaces at a single lookup point instead of at each call site.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;

use crate::backend::{LoaderBackend, RawSymbol};
use crate::error::{LoadError, Result};
use crate::handle::LibraryHandle;

/// Version of [`OSR_SYMBOLS`]. Bump when the set changes.
pub const SYMBOL_SET_VERSION: u32 = 1;

pub const INITIALIZE: &str = "CInitialize";
pub const UNINITIALIZE: &str = "CUninitialize";
pub const SET_ASSETS_DIR: &str = "CSetAssetsDir";
pub const GET_ASSETS_DIR: &str = "CGetAssetsDir";
pub const SYNC_EXECUTE: &str = "CSuperSamplingSyncExecute";
pub const ASYNC_EXECUTE: &str = "CSuperSamplingAsyncExecute";

pub type InitializeFn = unsafe extern "C-unwind" fn();
pub type UninitializeFn = unsafe extern "C-unwind" fn();
pub type SetAssetsDirFn = unsafe extern "C-unwind" fn(*const c_char);
pub type GetAssetsDirFn = unsafe extern "C-unwind" fn() -> *const c_char;
pub type SyncExecuteFn = unsafe extern "C-unwind" fn(*const c_void, *const c_void, c_int) -> bool;
pub type AsyncExecuteFn =
    unsafe extern "C-unwind" fn(*const c_void, *const c_void, *mut c_void) -> bool;

/// A symbol the loader asks for, and whether its absence is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolSpec {
    pub name: &'static str,
    pub required: bool,
}

impl SymbolSpec {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
        }
    }
}

/// Entry points of the offline super-resolution plugin.
pub const OSR_SYMBOLS: &[SymbolSpec] = &[
    SymbolSpec::required(INITIALIZE),
    SymbolSpec::optional(UNINITIALIZE),
    SymbolSpec::required(SET_ASSETS_DIR),
    SymbolSpec::optional(GET_ASSETS_DIR),
    SymbolSpec::required(SYNC_EXECUTE),
    SymbolSpec::optional(ASYNC_EXECUTE),
];

/// One resolved (or absent) symbol.
#[derive(Debug, Clone, Copy)]
pub struct SymbolBinding {
    pub spec: SymbolSpec,
    pub resolved: Option<RawSymbol>,
}

/// Symbol availability, without addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolStatus {
    pub name: String,
    pub required: bool,
    pub present: bool,
}

/// Immutable table of bindings resolved from one library handle.
///
/// The table is the only source of callable entry points: every vendor call
/// goes through [`SymbolTable::entry_points`] on the table owned by the
/// session, so no address outlives the table that resolved it.
#[derive(Debug)]
pub struct SymbolTable {
    bindings: Vec<SymbolBinding>,
}

impl SymbolTable {
    /// Resolve every spec against `handle`.
    ///
    /// Fails on the first missing required symbol; missing optional symbols
    /// are recorded as absent.
    pub fn resolve_all<B>(
        backend: &B,
        handle: &LibraryHandle<B::Module>,
        specs: &[SymbolSpec],
    ) -> Result<Self>
    where
        B: LoaderBackend,
    {
        let mut bindings = Vec::with_capacity(specs.len());
        for spec in specs {
            let resolved = handle.symbol(backend, spec.name);
            match (resolved, spec.required) {
                (None, true) => {
                    tracing::error!(
                        "Required symbol {} missing from {}",
                        spec.name,
                        handle.identity().resolved
                    );
                    return Err(LoadError::MissingRequiredSymbol(spec.name.to_string()));
                }
                (None, false) => {
                    tracing::debug!("Optional symbol {} absent", spec.name);
                }
                (Some(_), _) => {}
            }
            bindings.push(SymbolBinding {
                spec: *spec,
                resolved,
            });
        }
        Ok(Self { bindings })
    }

    /// Address of `name`, if it was requested and found.
    pub fn get(&self, name: &str) -> Option<RawSymbol> {
        self.bindings
            .iter()
            .find(|b| b.spec.name == name)
            .and_then(|b| b.resolved)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Optional symbols that were not found.
    pub fn absent_optional(&self) -> Vec<&'static str> {
        self.bindings
            .iter()
            .filter(|b| b.resolved.is_none())
            .map(|b| b.spec.name)
            .collect()
    }

    pub fn status(&self) -> Vec<SymbolStatus> {
        self.bindings
            .iter()
            .map(|b| SymbolStatus {
                name: b.spec.name.to_string(),
                required: b.spec.required,
                present: b.resolved.is_some(),
            })
            .collect()
    }

    /// Typed view of the plugin entry points.
    pub(crate) fn entry_points(&self) -> Result<VendorEntryPoints> {
        let required = |name: &'static str| {
            self.get(name)
                .ok_or_else(|| LoadError::MissingRequiredSymbol(name.to_string()))
        };

        // SAFETY: each address was looked up by the name whose C signature
        // is declared next to it above. Pointer and function pointer sizes
        // match on every supported target.
        unsafe {
            Ok(VendorEntryPoints {
                initialize: std::mem::transmute::<*mut c_void, InitializeFn>(
                    required(INITIALIZE)?.as_ptr(),
                ),
                set_assets_dir: std::mem::transmute::<*mut c_void, SetAssetsDirFn>(
                    required(SET_ASSETS_DIR)?.as_ptr(),
                ),
                sync_execute: std::mem::transmute::<*mut c_void, SyncExecuteFn>(
                    required(SYNC_EXECUTE)?.as_ptr(),
                ),
                uninitialize: self
                    .get(UNINITIALIZE)
                    .map(|s| std::mem::transmute::<*mut c_void, UninitializeFn>(s.as_ptr())),
                get_assets_dir: self
                    .get(GET_ASSETS_DIR)
                    .map(|s| std::mem::transmute::<*mut c_void, GetAssetsDirFn>(s.as_ptr())),
                async_execute: self
                    .get(ASYNC_EXECUTE)
                    .map(|s| std::mem::transmute::<*mut c_void, AsyncExecuteFn>(s.as_ptr())),
            })
        }
    }
}

/// Typed plugin entry points. Only valid while the owning library is open.
#[derive(Clone, Copy)]
pub(crate) struct VendorEntryPoints {
    initialize: InitializeFn,
    set_assets_dir: SetAssetsDirFn,
    sync_execute: SyncExecuteFn,
    uninitialize: Option<UninitializeFn>,
    get_assets_dir: Option<GetAssetsDirFn>,
    async_execute: Option<AsyncExecuteFn>,
}

impl std::fmt::Debug for VendorEntryPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorEntryPoints")
            .field("uninitialize", &self.uninitialize.is_some())
            .field("get_assets_dir", &self.get_assets_dir.is_some())
            .field("async_execute", &self.async_execute.is_some())
            .finish_non_exhaustive()
    }
}

/// Run a vendor call, turning an unwind into an error message.
fn guarded<T>(what: &str, call: impl FnOnce() -> T) -> std::result::Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        format!("{} unwound: {}", what, detail)
    })
}

// The methods below are unsafe because they call into unverified foreign
// code; callers must guarantee the owning library is still open.
impl VendorEntryPoints {
    pub(crate) unsafe fn initialize(&self) -> std::result::Result<(), String> {
        guarded(INITIALIZE, || unsafe { (self.initialize)() })
    }

    pub(crate) unsafe fn set_assets_dir(&self, dir: &str) -> std::result::Result<(), String> {
        let dir = CString::new(dir).map_err(|e| format!("invalid assets dir: {}", e))?;
        guarded(SET_ASSETS_DIR, || unsafe { (self.set_assets_dir)(dir.as_ptr()) })
    }

    /// Returns `Ok(false)` when the plugin exports no uninit entry point.
    pub(crate) unsafe fn uninitialize(&self) -> std::result::Result<bool, String> {
        match self.uninitialize {
            Some(f) => guarded(UNINITIALIZE, || unsafe { f() }).map(|_| true),
            None => Ok(false),
        }
    }

    pub(crate) unsafe fn assets_dir(&self) -> std::result::Result<Option<String>, String> {
        let Some(f) = self.get_assets_dir else {
            return Ok(None);
        };
        let ptr = guarded(GET_ASSETS_DIR, || unsafe { f() })?;
        if ptr.is_null() {
            return Ok(None);
        }
        Ok(Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()))
    }

    pub(crate) unsafe fn sync_execute(
        &self,
        input: *const c_void,
        output: *const c_void,
        timeout_ms: c_int,
    ) -> std::result::Result<bool, String> {
        guarded(SYNC_EXECUTE, || unsafe { (self.sync_execute)(input, output, timeout_ms) })
    }

    pub(crate) unsafe fn async_execute(
        &self,
        input: *const c_void,
        output: *const c_void,
        callback: *mut c_void,
    ) -> std::result::Result<bool, String> {
        match self.async_execute {
            Some(f) => guarded(ASYNC_EXECUTE, || unsafe { f(input, output, callback) }),
            None => Err(format!("{} not exported by plugin", ASYNC_EXECUTE)),
        }
    }
}
