//! Candidate filtering for discovered files.
//!
//! Filters run before a tracker is spawned, for pre-existing entries and for
//! newly created paths alike. A rejected path never gets a notification
//! subscription.
//!
//! # Examples
//!
//! ```
//! use sw_watcher::{CompositeFilter, ExtensionFilter, FileFilter, HiddenFileFilter};
//! use camino::Utf8Path;
//!
//! let filter = CompositeFilter::new()
//!     .and(ExtensionFilter::new(&["mp4", "mkv"]))
//!     .and(HiddenFileFilter);
//!
//! assert!(filter.should_process(Utf8Path::new("/srv/incoming/show.mkv")));
//! assert!(!filter.should_process(Utf8Path::new("/srv/incoming/.show.mkv.part")));
//! assert!(!filter.should_process(Utf8Path::new("/srv/incoming/notes.txt")));
//! ```

use camino::Utf8Path;
use smallvec::SmallVec;
use sw_core::WatchConfig;

/// A predicate deciding which discovered files get tracked.
///
/// Filters must be [`Send`] + [`Sync`] + `'static`: one instance is shared
/// by the monitor task for the lifetime of the watcher.
///
/// # Examples
///
/// ```
/// use sw_watcher::FileFilter;
/// use camino::Utf8Path;
///
/// struct NoPartials;
///
/// impl FileFilter for NoPartials {
///     fn should_process(&self, path: &Utf8Path) -> bool {
///         path.extension() != Some("part")
///     }
/// }
/// ```
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if a tracker should be started for `path`.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Accepts files whose extension is in a fixed set.
///
/// Matching ignores ASCII case and a leading dot in the configured
/// extensions, so `"MP4"`, `".mp4"` and `"mp4"` are equivalent.
///
/// # Examples
///
/// ```
/// use sw_watcher::{ExtensionFilter, FileFilter};
/// use camino::Utf8Path;
///
/// let filter = ExtensionFilter::new(&["mp4", ".MOV"]);
/// assert!(filter.should_process(Utf8Path::new("clip.MP4")));
/// assert!(filter.should_process(Utf8Path::new("clip.mov")));
/// assert!(!filter.should_process(Utf8Path::new("clip")));
/// ```
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: SmallVec<[String; 8]>,
}

impl ExtensionFilter {
    /// Creates a new extension filter.
    #[must_use]
    pub fn new(extensions: &[&str]) -> Self {
        Self::from_owned(extensions.iter().map(|s| (*s).to_owned()).collect())
    }

    /// Creates an extension filter from owned strings.
    #[must_use]
    pub fn from_owned(extensions: Vec<String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl FileFilter for ExtensionFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

/// Rejects dot-files.
///
/// Upload and copy tools commonly write to a hidden temporary name and rename
/// on completion; those temporaries are never worth tracking.
#[derive(Debug, Clone, Copy, Default)]
pub struct HiddenFileFilter;

impl FileFilter for HiddenFileFilter {
    #[inline]
    fn should_process(&self, path: &Utf8Path) -> bool {
        !path.file_name().is_some_and(|name| name.starts_with('.'))
    }
}

/// A composite filter that combines multiple filters with AND logic.
///
/// An empty composite accepts everything.
pub struct CompositeFilter {
    filters: Vec<Box<dyn FileFilter>>,
}

impl CompositeFilter {
    /// Creates a new empty composite filter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Adds a filter to the composite.
    #[must_use]
    pub fn and<F: FileFilter>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Returns the number of filters combined.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if no filters have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for CompositeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompositeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeFilter")
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl FileFilter for CompositeFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        self.filters.iter().all(|f| f.should_process(path))
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

/// Builds the filter described by a [`WatchConfig`].
///
/// With no extensions configured and hidden files allowed, the result
/// accepts every path.
#[must_use]
pub fn filter_from_config(config: &WatchConfig) -> CompositeFilter {
    let mut filter = CompositeFilter::new();
    if !config.extensions.is_empty() {
        filter = filter.and(ExtensionFilter::from_owned(config.extensions.clone()));
    }
    if config.ignore_hidden {
        filter = filter.and(HiddenFileFilter);
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all_filter() {
        let filter = AcceptAllFilter;
        assert!(filter.should_process(Utf8Path::new("anything.txt")));
        assert!(filter.should_process(Utf8Path::new(".hidden")));
        assert!(filter.should_process(Utf8Path::new("")));
    }

    #[test]
    fn test_extension_filter() {
        let filter = ExtensionFilter::new(&["mp4", "mkv"]);

        assert!(filter.should_process(Utf8Path::new("/srv/in/a.mp4")));
        assert!(filter.should_process(Utf8Path::new("/srv/in/b.MKV")));
        assert!(!filter.should_process(Utf8Path::new("/srv/in/a.mp4.part")));
        assert!(!filter.should_process(Utf8Path::new("/srv/in/README")));
    }

    #[test]
    fn test_extension_filter_normalizes_configured_extensions() {
        let filter = ExtensionFilter::from_owned(vec![".MOV".to_owned()]);
        assert!(filter.should_process(Utf8Path::new("clip.mov")));
    }

    #[test]
    fn test_hidden_file_filter() {
        let filter = HiddenFileFilter;
        assert!(filter.should_process(Utf8Path::new("/srv/in/a.mp4")));
        assert!(filter.should_process(Utf8Path::new("/srv/.cache/a.mp4")));
        assert!(!filter.should_process(Utf8Path::new("/srv/in/.a.mp4.tmp")));
    }

    #[test]
    fn test_composite_filter_empty() {
        let filter = CompositeFilter::new();
        assert!(filter.is_empty());
        assert!(filter.should_process(Utf8Path::new("anything")));
    }

    #[test]
    fn test_composite_filter_and() {
        let filter = CompositeFilter::new()
            .and(ExtensionFilter::new(&["mp4"]))
            .and(HiddenFileFilter);

        assert_eq!(filter.len(), 2);
        assert!(filter.should_process(Utf8Path::new("a.mp4")));
        assert!(!filter.should_process(Utf8Path::new(".a.mp4")));
        assert!(!filter.should_process(Utf8Path::new("a.mov")));
    }

    #[test]
    fn test_filter_from_default_config_accepts_all() {
        let filter = filter_from_config(&WatchConfig::default());
        assert!(filter.is_empty());
        assert!(filter.should_process(Utf8Path::new(".anything")));
    }

    #[test]
    fn test_filter_from_config() {
        let config = WatchConfig {
            extensions: vec!["mp4".to_owned()],
            ignore_hidden: true,
            ..WatchConfig::default()
        };
        let filter = filter_from_config(&config);
        assert_eq!(filter.len(), 2);
        assert!(filter.should_process(Utf8Path::new("a.mp4")));
        assert!(!filter.should_process(Utf8Path::new(".a.mp4")));
    }

    #[test]
    fn test_boxed_and_arc_filters() {
        let boxed: Box<dyn FileFilter> = Box::new(HiddenFileFilter);
        assert!(!boxed.should_process(Utf8Path::new(".x")));

        let shared = std::sync::Arc::new(ExtensionFilter::new(&["mp4"]));
        assert!(shared.should_process(Utf8Path::new("a.mp4")));
    }
}
