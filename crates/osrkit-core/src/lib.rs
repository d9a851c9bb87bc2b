//! Dynamic acquisition of the vendor offline super-resolution plugin.
//!
//! The plugin is not bundled with the host and depends on device libraries
//! that may or may not exist. This crate finds those libraries, primes the
//! process symbol namespace with them, opens the plugin, binds its entry
//! points, and exposes the execute calls once the plugin has initialized.
//!
//! ```no_run
//! use osrkit_core::{LoaderConfig, PluginSession};
//!
//! let mut session = PluginSession::new(LoaderConfig::default().with_env_overrides());
//! if session.load().is_ok() {
//!     assert!(session.is_ready());
//! }
//! session.unload();
//! ```

pub mod backend;
pub mod config;
pub mod elf;
pub mod error;
pub mod handle;
pub mod primer;
pub mod redirect;
pub mod resolver;
pub mod session;
pub mod shared;
pub mod symbols;

pub use backend::{DlopenBackend, LoaderBackend, NativeModule, RawSymbol, SharingMode};
pub use config::LoaderConfig;
pub use error::{ConfigError, LoadError, Result};
pub use handle::{LibraryHandle, LibraryIdentity};
pub use primer::{NamespacePrimer, PrimedLibraries};
pub use redirect::NameRedirector;
pub use resolver::PathResolver;
pub use session::{LoadReport, PluginSession, SessionState};
pub use shared::SharedPluginSession;
pub use symbols::{SymbolSpec, SymbolStatus, SymbolTable, OSR_SYMBOLS, SYMBOL_SET_VERSION};
