//! Owned library handles and the multi-candidate open sequence.

use std::fmt;

use serde::Serialize;

use crate::backend::{LoaderBackend, RawSymbol, SharingMode};
use crate::error::{LoadError, Result};
use crate::redirect::NameRedirector;
use crate::resolver::PathResolver;

/// Requested and actually opened names of a library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryIdentity {
    /// Logical name asked for by the caller.
    pub requested: String,
    /// Name after redirection.
    pub resolved: String,
    /// Candidate string that opened successfully.
    pub location: String,
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requested == self.resolved {
            write!(f, "{} ({})", self.resolved, self.location)
        } else {
            write!(f, "{} -> {} ({})", self.requested, self.resolved, self.location)
        }
    }
}

/// One successfully opened native module.
///
/// The handle is move-only; the module closes when the handle drops.
pub struct LibraryHandle<M> {
    identity: LibraryIdentity,
    mode: SharingMode,
    module: M,
}

impl<M> LibraryHandle<M> {
    pub fn identity(&self) -> &LibraryIdentity {
        &self.identity
    }

    pub fn mode(&self) -> SharingMode {
        self.mode
    }

    /// Look up a symbol through `backend`.
    pub fn symbol<B>(&self, backend: &B, name: &str) -> Option<RawSymbol>
    where
        B: LoaderBackend<Module = M>,
    {
        backend.symbol(&self.module, name)
    }
}

impl<M> fmt::Debug for LibraryHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("identity", &self.identity)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<M> Drop for LibraryHandle<M> {
    fn drop(&mut self) {
        tracing::debug!("Closing {}", self.identity.resolved);
    }
}

/// Open `name` from the first candidate that succeeds.
///
/// Redirection is applied once; every candidate is built from the redirected
/// name. When nothing opens, the error carries every attempted candidate and
/// the platform error of the last one.
pub fn open<B, S>(
    backend: &B,
    redirector: &NameRedirector,
    name: &str,
    search_paths: &[S],
    mode: SharingMode,
) -> Result<LibraryHandle<B::Module>>
where
    B: LoaderBackend,
    S: AsRef<str>,
{
    let resolved = redirector.redirect(name).to_string();
    let candidates = PathResolver::resolve(&resolved, search_paths);

    if mode == SharingMode::Global {
        tracing::info!("Loading {} with global symbol sharing", resolved);
    }

    let mut last_error = String::from("unknown error");
    for candidate in &candidates {
        match backend.open(candidate, mode) {
            Ok(module) => {
                tracing::info!("Loaded {} from {}", resolved, candidate);
                return Ok(LibraryHandle {
                    identity: LibraryIdentity {
                        requested: name.to_string(),
                        resolved,
                        location: candidate.clone(),
                    },
                    mode,
                    module,
                });
            }
            Err(e) => {
                tracing::warn!("Failed to load {} from {}: {}", resolved, candidate, e);
                last_error = e;
            }
        }
    }

    tracing::error!(
        "Failed to load {} from any location, last error: {}",
        resolved,
        last_error
    );
    Err(LoadError::NotFound {
        name: resolved,
        attempted: candidates,
        last_error,
    })
}
