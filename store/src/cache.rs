use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Memoized answers about nodes, valid for the lifetime of a [crate::Session].
#[derive(Debug, Default)]
pub struct StalenessCache {
    impression_consult: HashMap<PathBuf, (SystemTime, bool)>,
    status_consult: HashMap<PathBuf, (u64, String)>,
}

impl StalenessCache {
    /// When `path` was last checked and whether it was impressed then.
    pub fn impression(&self, path: &Path) -> Option<(SystemTime, bool)> {
        self.impression_consult.get(path).copied()
    }

    pub fn record_impression(&mut self, path: &Path, checked_at: SystemTime, impressed: bool) {
        self.impression_consult
            .insert(path.to_path_buf(), (checked_at, impressed));
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.impression_consult.remove(path);
        self.status_consult.remove(path);
    }

    pub fn clear_impressions(&mut self) {
        self.impression_consult.clear();
    }

    /// The status recorded for `path` during consult `consult_id`, if any.
    pub fn status(&self, path: &Path, consult_id: u64) -> Option<&str> {
        self.status_consult
            .get(path)
            .filter(|(id, _)| *id == consult_id)
            .map(|(_, status)| status.as_str())
    }

    pub fn record_status(&mut self, path: &Path, consult_id: u64, status: impl Into<String>) {
        self.status_consult
            .insert(path.to_path_buf(), (consult_id, status.into()));
    }

    pub fn reset(&mut self) {
        self.impression_consult.clear();
        self.status_consult.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::SystemTime;

    use super::StalenessCache;

    #[test]
    fn status_is_scoped_to_consult() {
        let mut cache = StalenessCache::default();
        let path = Path::new("/p/tasks/t1");
        cache.record_status(path, 3, "running");

        assert_eq!(Some("running"), cache.status(path, 3));
        assert_eq!(None, cache.status(path, 4));
    }

    #[test]
    fn invalidate_and_reset() {
        let mut cache = StalenessCache::default();
        let a = Path::new("/p/a");
        let b = Path::new("/p/b");
        let now = SystemTime::now();
        cache.record_impression(a, now, true);
        cache.record_impression(b, now, false);
        cache.record_status(b, 1, "queued");

        cache.invalidate(a);
        assert_eq!(None, cache.impression(a));
        assert_eq!(Some((now, false)), cache.impression(b));

        cache.reset();
        assert_eq!(None, cache.impression(b));
        assert_eq!(None, cache.status(b, 1));
    }
}
