//! Candidate location enumeration for a library name.

/// Enumerates where a library may be opened from.
///
/// Resolution never touches the filesystem; whether a candidate exists is
/// decided by the open attempt itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    /// Build the ordered candidate list for `name`.
    ///
    /// The bare name always comes first so the OS loader can apply its own
    /// default search rules, followed by `path/name` for every configured
    /// path in the order given. Duplicated paths yield duplicated candidates.
    pub fn resolve<S: AsRef<str>>(name: &str, search_paths: &[S]) -> Vec<String> {
        let mut candidates = Vec::with_capacity(search_paths.len() + 1);
        candidates.push(name.to_string());
        for path in search_paths {
            candidates.push(format!("{}/{}", path.as_ref(), name));
        }
        candidates
    }
}
