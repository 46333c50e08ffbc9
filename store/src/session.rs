use std::cell::{Cell, RefCell};

use tokio::runtime::Handle;

use crate::cache::StalenessCache;
use crate::config::LocalConfig;
use crate::object::Project;
use crate::Error;

/// State carried through one interactive session: the staleness cache, the
/// consult counter and the runtime driving archive and network I/O.
///
/// The core is synchronous. Async work is driven with [Handle::block_on], so a
/// Session must not be used from within a runtime worker thread.
pub struct Session {
    cache: RefCell<StalenessCache>,
    consult_id: Cell<u64>,
    tokio_handle: Handle,
    local_config: LocalConfig,
}

impl Session {
    pub fn new(tokio_handle: Handle, local_config: LocalConfig) -> Self {
        Self {
            cache: RefCell::new(StalenessCache::default()),
            consult_id: Cell::new(0),
            tokio_handle,
            local_config,
        }
    }

    pub fn tokio_handle(&self) -> &Handle {
        &self.tokio_handle
    }

    pub fn local_config(&self) -> &LocalConfig {
        &self.local_config
    }

    /// The project currently selected in the [LocalConfig], if it still exists.
    pub fn current_project(&self) -> Result<Option<Project>, Error> {
        let Some(name) = self.local_config.current_project()? else {
            return Ok(None);
        };
        match self.local_config.project_path(&name)? {
            Some(path) => Project::open(&path).map(Some),
            None => Ok(None),
        }
    }

    pub fn cache(&self) -> &RefCell<StalenessCache> {
        &self.cache
    }

    /// Starts a new consult. Status answers cached under older consults are ignored.
    pub fn begin_consult(&self) -> u64 {
        let id = self.consult_id.get() + 1;
        self.consult_id.set(id);
        id
    }

    pub fn consult_id(&self) -> u64 {
        self.consult_id.get()
    }

    /// Arc and alias edits only touch `.chern/`, which the mtime shortcut
    /// does not see, so every memoized impression answer is dropped.
    pub fn graph_changed(&self) {
        self.cache.borrow_mut().clear_impressions();
    }

    pub fn reset(&self) {
        self.cache.borrow_mut().reset();
    }
}
