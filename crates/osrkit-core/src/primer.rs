//! Best-effort priming of the process-wide symbol namespace.
//!
//! Auxiliary libraries are opened with global sharing before the primary
//! plugin so that its own dependency lookups find their symbols. A missing
//! auxiliary library degrades capability but never blocks the primary load.

use crate::backend::{LoaderBackend, SharingMode};
use crate::handle::{self, LibraryHandle, LibraryIdentity};
use crate::redirect::NameRedirector;

/// Auxiliary handles held for the lifetime of a session.
///
/// Handles are released newest first, both on drop and on [`release`].
///
/// [`release`]: PrimedLibraries::release
pub struct PrimedLibraries<M> {
    handles: Vec<LibraryHandle<M>>,
    misses: Vec<String>,
}

impl<M> PrimedLibraries<M> {
    /// Identities of every library that opened, in acquisition order.
    pub fn identities(&self) -> Vec<LibraryIdentity> {
        self.handles.iter().map(|h| h.identity().clone()).collect()
    }

    /// Requested names that failed to open.
    pub fn misses(&self) -> &[String] {
        &self.misses
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Close every held handle in reverse acquisition order.
    pub fn release(&mut self) {
        while let Some(handle) = self.handles.pop() {
            tracing::info!("Releasing primed library {}", handle.identity().resolved);
            drop(handle);
        }
    }
}

impl<M> Drop for PrimedLibraries<M> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Opens auxiliary libraries ahead of the primary plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamespacePrimer;

impl NamespacePrimer {
    /// Attempt every name in `names` with global sharing.
    ///
    /// Each entry is independent: a failure is logged and priming continues.
    pub fn prime<B, N, S>(
        backend: &B,
        redirector: &NameRedirector,
        names: &[N],
        search_paths: &[S],
    ) -> PrimedLibraries<B::Module>
    where
        B: LoaderBackend,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        let mut primed = PrimedLibraries {
            handles: Vec::with_capacity(names.len()),
            misses: Vec::new(),
        };

        for name in names {
            let name = name.as_ref();
            match handle::open(backend, redirector, name, search_paths, SharingMode::Global) {
                Ok(handle) => {
                    tracing::info!(
                        "Namespace link established: {} ({})",
                        handle.identity(),
                        handle.mode()
                    );
                    primed.handles.push(handle);
                }
                Err(e) => {
                    tracing::warn!("{} not primed, continuing without it: {}", name, e);
                    primed.misses.push(name.to_string());
                }
            }
        }

        primed
    }
}
