//! Plugin session state machine.
//!
//! A session primes the symbol namespace, opens the primary plugin, binds its
//! entry points, runs vendor initialization, and owns the teardown of all of
//! it. Teardown always runs in reverse acquisition order:
//! vendor uninit, primary library, then primed libraries newest first.
//!
//! Globally shared opens are never undone by the platform loader, so repeated
//! load/unload cycles do not return the process namespace to its original
//! state.

use std::ffi::c_void;
use std::fmt;

use serde::Serialize;

use crate::backend::{DlopenBackend, LoaderBackend, SharingMode};
use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::handle::{self, LibraryHandle, LibraryIdentity};
use crate::primer::{NamespacePrimer, PrimedLibraries};
use crate::redirect::NameRedirector;
use crate::symbols::{
    SymbolStatus, SymbolTable, VendorEntryPoints, ASYNC_EXECUTE, OSR_SYMBOLS, SYMBOL_SET_VERSION,
};

/// Lifecycle state of a [`PluginSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unloaded,
    Priming,
    LoadingPrimary,
    ResolvingSymbols,
    Initializing,
    Ready,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unloaded => "unloaded",
            SessionState::Priming => "priming",
            SessionState::LoadingPrimary => "loading_primary",
            SessionState::ResolvingSymbols => "resolving_symbols",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// What the most recent load attempt acquired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub symbol_set_version: u32,
    /// Auxiliary libraries that opened, in acquisition order.
    pub primed: Vec<LibraryIdentity>,
    /// Auxiliary libraries that could not be opened.
    pub primed_misses: Vec<String>,
    pub primary: Option<LibraryIdentity>,
    pub symbols: Vec<SymbolStatus>,
    /// Error that ended the attempt, if any.
    pub error: Option<String>,
}

/// Drives the plugin chain from unloaded to ready and back.
///
/// `load` and `unload` take `&mut self`; hosts that need to share a session
/// across threads use [`crate::shared::SharedPluginSession`].
pub struct PluginSession<B: LoaderBackend = DlopenBackend> {
    config: LoaderConfig,
    redirector: NameRedirector,
    backend: B,
    state: SessionState,
    table: Option<SymbolTable>,
    primary: Option<LibraryHandle<B::Module>>,
    primed: Option<PrimedLibraries<B::Module>>,
    vendor_initialized: bool,
    report: LoadReport,
}

impl PluginSession<DlopenBackend> {
    /// Session backed by the platform loader.
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_backend(config, DlopenBackend::new())
    }
}

impl<B: LoaderBackend> PluginSession<B> {
    pub fn with_backend(config: LoaderConfig, backend: B) -> Self {
        let redirector = NameRedirector::builtin().with_entries(&config.extra_redirects);
        Self {
            config,
            redirector,
            backend,
            state: SessionState::Unloaded,
            table: None,
            primary: None,
            primed: None,
            vendor_initialized: false,
            report: LoadReport::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready && self.table.is_some()
    }

    /// Report of the last load attempt.
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// Identity of the open primary library.
    pub fn primary_identity(&self) -> Option<&LibraryIdentity> {
        self.primary.as_ref().map(|p| p.identity())
    }

    /// Whether the optional asynchronous entry point resolved.
    pub fn supports_async(&self) -> bool {
        self.table.as_ref().is_some_and(|t| t.contains(ASYNC_EXECUTE))
    }

    /// Bring the plugin chain to Ready.
    ///
    /// Calling this while Ready does nothing and succeeds. After a failure
    /// every resource acquired by the attempt has been released, and a new
    /// call starts over from priming.
    pub fn load(&mut self) -> Result<()> {
        match self.state {
            SessionState::Ready => {
                tracing::info!("Plugin already loaded");
                return Ok(());
            }
            SessionState::Unloaded => {}
            _ => {
                self.teardown();
                self.state = SessionState::Unloaded;
            }
        }

        tracing::info!("Loading plugin {}", self.config.primary_library);
        self.report = LoadReport {
            symbol_set_version: SYMBOL_SET_VERSION,
            ..LoadReport::default()
        };

        match self.acquire() {
            Ok(()) => {
                tracing::info!("Plugin initialized successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Plugin load failed: {}", e);
                self.report.error = Some(e.to_string());
                self.teardown();
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    fn acquire(&mut self) -> Result<()> {
        self.transition(SessionState::Priming);
        let primed = NamespacePrimer::prime(
            &self.backend,
            &self.redirector,
            &self.config.auxiliary_libraries,
            &self.config.system_paths,
        );
        if primed.is_empty() && !self.config.auxiliary_libraries.is_empty() {
            tracing::warn!(
                "No auxiliary library could be primed; this device may not ship the vendor runtime"
            );
        }
        self.report.primed = primed.identities();
        self.report.primed_misses = primed.misses().to_vec();
        self.primed = Some(primed);

        self.transition(SessionState::LoadingPrimary);
        let primary = handle::open(
            &self.backend,
            &self.redirector,
            &self.config.primary_library,
            &self.config.app_paths,
            SharingMode::Private,
        )?;
        tracing::info!("Primary library {} opened ({})", primary.identity(), primary.mode());
        self.report.primary = Some(primary.identity().clone());

        self.transition(SessionState::ResolvingSymbols);
        let table = SymbolTable::resolve_all(&self.backend, &primary, OSR_SYMBOLS)?;
        let entry = table.entry_points()?;
        self.report.symbols = table.status();
        self.primary = Some(primary);
        self.table = Some(table);

        self.transition(SessionState::Initializing);
        // SAFETY: the entry points were resolved from `self.primary`, which
        // stays open until teardown clears `self.table` first.
        unsafe { entry.initialize() }.map_err(LoadError::VendorInitFailed)?;
        self.vendor_initialized = true;
        tracing::info!("Vendor initialize completed");

        unsafe { entry.set_assets_dir(&self.config.assets_dir) }
            .map_err(LoadError::VendorInitFailed)?;
        tracing::info!("Vendor assets dir set to {}", self.config.assets_dir);

        self.transition(SessionState::Ready);
        Ok(())
    }

    /// Release everything and return to Unloaded.
    pub fn unload(&mut self) {
        if self.state == SessionState::Unloaded {
            return;
        }
        self.teardown();
        self.transition(SessionState::Unloaded);
    }

    /// Reverse-order release; tolerates partially built state.
    fn teardown(&mut self) {
        let table = self.table.take();
        if self.vendor_initialized {
            if let Some(entry) = table.as_ref().and_then(|t| t.entry_points().ok()) {
                // SAFETY: the primary library is still open at this point.
                match unsafe { entry.uninitialize() } {
                    Ok(true) => tracing::info!("Vendor uninitialize completed"),
                    Ok(false) => tracing::debug!("Plugin exports no uninitialize entry point"),
                    Err(e) => tracing::error!("Vendor uninitialize failed: {}", e),
                }
            }
        }
        self.vendor_initialized = false;
        drop(table);

        if let Some(primary) = self.primary.take() {
            tracing::info!("Releasing primary library {}", primary.identity().resolved);
            drop(primary);
        }
        if let Some(mut primed) = self.primed.take() {
            primed.release();
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("Session state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Typed entry points of the bound table, only while Ready.
    fn ready_entry(&self) -> Result<VendorEntryPoints> {
        match (&self.table, self.state) {
            (Some(table), SessionState::Ready) => table.entry_points(),
            _ => {
                tracing::error!("Plugin not available, session is {}", self.state);
                Err(LoadError::NotReady)
            }
        }
    }

    /// Run one synchronous super-sampling pass.
    ///
    /// `timeout_ms` is passed to the plugin verbatim and not enforced here.
    /// A failed call leaves the session Ready.
    ///
    /// # Safety
    ///
    /// `input` and `output` must point to buffers laid out as the plugin ABI
    /// expects and stay valid for the duration of the call.
    pub unsafe fn super_sample(
        &self,
        input: *const c_void,
        output: *const c_void,
        timeout_ms: i32,
    ) -> Result<()> {
        let entry = self.ready_entry()?;
        match unsafe { entry.sync_execute(input, output, timeout_ms) } {
            Ok(true) => Ok(()),
            Ok(false) => Err(LoadError::CallFailed(
                "synchronous super-sampling reported failure".to_string(),
            )),
            Err(e) => Err(LoadError::CallFailed(e)),
        }
    }

    /// Submit one asynchronous super-sampling pass.
    ///
    /// Completion is signalled by the plugin through `callback`.
    ///
    /// # Safety
    ///
    /// The buffers must satisfy the same contract as [`Self::super_sample`]
    /// and remain valid until the plugin invokes `callback`, which must be a
    /// callback object of the shape the plugin ABI defines.
    pub unsafe fn super_sample_async(
        &self,
        input: *const c_void,
        output: *const c_void,
        callback: *mut c_void,
    ) -> Result<()> {
        let entry = self.ready_entry()?;
        match unsafe { entry.async_execute(input, output, callback) } {
            Ok(true) => Ok(()),
            Ok(false) => Err(LoadError::CallFailed(
                "asynchronous super-sampling reported failure".to_string(),
            )),
            Err(e) => Err(LoadError::CallFailed(e)),
        }
    }

    /// Assets directory as reported by the plugin, when it exports a getter.
    pub fn assets_dir(&self) -> Result<Option<String>> {
        let entry = self.ready_entry()?;
        // SAFETY: Ready implies the primary library is open.
        unsafe { entry.assets_dir() }.map_err(LoadError::CallFailed)
    }
}

impl<B: LoaderBackend> Drop for PluginSession<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<B: LoaderBackend> fmt::Debug for PluginSession<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSession")
            .field("state", &self.state)
            .field("primary", &self.primary_identity())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}
