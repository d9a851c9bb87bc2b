//! OS loader primitives.
//!
//! [`LoaderBackend`] is the seam between acquisition logic and the platform
//! dynamic loader. Closing a module is expressed by dropping it, so a module
//! can only ever be released once.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

/// How an opened library publishes its symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharingMode {
    /// Symbols stay private to the module (`RTLD_LOCAL`).
    Private,
    /// Symbols are published into the process-wide namespace (`RTLD_GLOBAL`).
    Global,
}

impl fmt::Display for SharingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharingMode::Private => write!(f, "private"),
            SharingMode::Global => write!(f, "global"),
        }
    }
}

/// Address of a resolved symbol. Never null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSymbol(NonNull<c_void>);

// SAFETY: a RawSymbol is an immutable code address inside a loaded module.
// It is only dereferenced through SymbolTable while the owning module is
// alive, and the address itself carries no thread affinity.
unsafe impl Send for RawSymbol {}
unsafe impl Sync for RawSymbol {}

impl RawSymbol {
    /// Wrap a looked-up address; null means absent.
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Platform loader operations.
pub trait LoaderBackend {
    /// An opened module. Dropping it closes the module.
    type Module;

    /// Attempt one open of `candidate`. The error string is the platform's
    /// own diagnostic for this attempt.
    fn open(&self, candidate: &str, mode: SharingMode) -> Result<Self::Module, String>;

    /// Look up `name` in `module`.
    fn symbol(&self, module: &Self::Module, name: &str) -> Option<RawSymbol>;
}

/// Module opened by [`DlopenBackend`].
pub struct NativeModule {
    #[cfg(unix)]
    library: libloading::os::unix::Library,
    #[cfg(not(unix))]
    library: libloading::Library,
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule").finish_non_exhaustive()
    }
}

/// Production backend built on `libloading`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DlopenBackend;

impl DlopenBackend {
    pub fn new() -> Self {
        Self
    }
}

impl LoaderBackend for DlopenBackend {
    type Module = NativeModule;

    #[cfg(unix)]
    fn open(&self, candidate: &str, mode: SharingMode) -> Result<NativeModule, String> {
        use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_LOCAL, RTLD_NOW};

        let flags = match mode {
            SharingMode::Global => RTLD_NOW | RTLD_GLOBAL,
            SharingMode::Private => RTLD_NOW | RTLD_LOCAL,
        };
        // libloading reads dlerror() right after its own dlopen call, so the
        // message always belongs to this attempt.
        let library = unsafe { Library::open(Some(candidate), flags) }.map_err(|e| e.to_string())?;
        Ok(NativeModule { library })
    }

    #[cfg(not(unix))]
    fn open(&self, candidate: &str, _mode: SharingMode) -> Result<NativeModule, String> {
        let library = unsafe { libloading::Library::new(candidate) }.map_err(|e| e.to_string())?;
        Ok(NativeModule { library })
    }

    fn symbol(&self, module: &NativeModule, name: &str) -> Option<RawSymbol> {
        let symbol = unsafe { module.library.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        RawSymbol::from_ptr(*symbol)
    }
}
