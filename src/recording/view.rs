//! Filtered, restartable views over a recording's signal set.

use super::signal::Signal;
use super::Recording;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Live view of the signals matching an optional region and tag.
///
/// The view reads the recording's current signal set on every step rather
/// than taking a snapshot. While any view is alive the recording rejects
/// adding or removing signals; loading or evicting data is fine.
pub struct SignalView<'a> {
    recording: &'a Recording,
    region: Option<String>,
    tag: Option<String>,
}

impl<'a> SignalView<'a> {
    pub(super) fn new(recording: &'a Recording, region: Option<&str>, tag: Option<&str>) -> Self {
        {
            // pairs with the write lock taken by add/remove
            let _guard = recording.signals.read().unwrap_or_else(|e| e.into_inner());
            recording.active_views.fetch_add(1, Ordering::SeqCst);
        }
        Self {
            recording,
            region: region.map(String::from),
            tag: tag.map(String::from),
        }
    }

    fn matches(&self, signal: &Signal) -> bool {
        let region_ok = self.region.as_deref().map_or(true, |r| signal.region() == r);
        let tag_ok = self.tag.as_deref().map_or(true, |t| signal.tag() == Some(t));
        region_ok && tag_ok
    }

    /// Start a fresh pass over the matching signals.
    pub fn iter(&self) -> SignalIter<'_, 'a> {
        SignalIter { view: self, next: 0 }
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl Drop for SignalView<'_> {
    fn drop(&mut self) {
        self.recording.active_views.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<'v, 'a> IntoIterator for &'v SignalView<'a> {
    type Item = Arc<Signal>;
    type IntoIter = SignalIter<'v, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`SignalView`].
pub struct SignalIter<'v, 'a> {
    view: &'v SignalView<'a>,
    next: usize,
}

impl Iterator for SignalIter<'_, '_> {
    type Item = Arc<Signal>;

    fn next(&mut self) -> Option<Self::Item> {
        let signals = self
            .view
            .recording
            .signals
            .read()
            .unwrap_or_else(|e| e.into_inner());
        while self.next < signals.len() {
            let candidate = &signals[self.next];
            self.next += 1;
            if self.view.matches(candidate) {
                return Some(candidate.clone());
            }
        }
        None
    }
}
