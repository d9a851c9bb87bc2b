//! Thread-shareable session wrapper.

use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{DlopenBackend, LoaderBackend};
use crate::config::LoaderConfig;
use crate::error::Result;
use crate::session::{LoadReport, PluginSession, SessionState};

/// A [`PluginSession`] behind a read/write lock.
///
/// `load`/`unload` take the write lock, so they are serialized against each
/// other and against in-flight calls. Execute calls share the read lock and
/// may run concurrently; whether that is safe depends on the plugin's own
/// entry points being reentrant, which cannot be checked from here.
pub struct SharedPluginSession<B: LoaderBackend = DlopenBackend> {
    inner: Arc<RwLock<PluginSession<B>>>,
}

impl<B: LoaderBackend> Clone for SharedPluginSession<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SharedPluginSession<DlopenBackend> {
    pub fn new(config: LoaderConfig) -> Self {
        Self::from_session(PluginSession::new(config))
    }
}

impl<B: LoaderBackend> SharedPluginSession<B> {
    pub fn from_session(session: PluginSession<B>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    pub fn load(&self) -> Result<()> {
        self.inner.write().load()
    }

    pub fn unload(&self) {
        self.inner.write().unload();
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().is_ready()
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state()
    }

    pub fn load_report(&self) -> LoadReport {
        self.inner.read().load_report().clone()
    }

    /// # Safety
    ///
    /// See [`PluginSession::super_sample`].
    pub unsafe fn super_sample(
        &self,
        input: *const c_void,
        output: *const c_void,
        timeout_ms: i32,
    ) -> Result<()> {
        unsafe { self.inner.read().super_sample(input, output, timeout_ms) }
    }

    /// # Safety
    ///
    /// See [`PluginSession::super_sample_async`].
    pub unsafe fn super_sample_async(
        &self,
        input: *const c_void,
        output: *const c_void,
        callback: *mut c_void,
    ) -> Result<()> {
        unsafe { self.inner.read().super_sample_async(input, output, callback) }
    }

    /// Run `f` with shared access to the session.
    pub fn with_session<R>(&self, f: impl FnOnce(&PluginSession<B>) -> R) -> R {
        f(&self.inner.read())
    }
}
