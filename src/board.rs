//! The task and user stores plus their coordinator, opened together.

use std::sync::Arc;

use tracing::debug;

use crate::assign::Coordinator;
use crate::config::Config;
use crate::error::Result;
use crate::storage::{DataDir, FileStore, KeyValueStore, MemoryStore};
use crate::store::{EntityStore, StoreOptions};
use crate::task::TaskStore;
use crate::user::UserStore;

pub struct Board {
    tasks: Arc<TaskStore>,
    users: Arc<UserStore>,
    coordinator: Coordinator,
}

impl Board {
    /// Open file-backed stores under `<data-dir>/<namespace>/`.
    pub fn open(config: &Config, data_dir: &DataDir) -> Result<Self> {
        let store = FileStore::new(data_dir.namespace_dir(&config.storage.namespace))
            .with_lock_timeout(config.storage.lock_timeout_ms);
        store.init()?;
        debug!(dir = %store.dir().display(), "opening board");
        Self::with_store(Arc::new(store), config)
    }

    /// Memory-backed board; nothing outlives the process.
    pub fn in_memory(config: &Config) -> Result<Self> {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    /// Open both stores over one key-value store.
    pub fn with_store(kv: Arc<dyn KeyValueStore>, config: &Config) -> Result<Self> {
        let options = StoreOptions {
            seed_demo_data: config.storage.seed_demo_data,
        };
        let tasks: Arc<TaskStore> = Arc::new(EntityStore::open(Arc::clone(&kv), options)?);
        let users: Arc<UserStore> = Arc::new(EntityStore::open(kv, options)?);
        let coordinator = Coordinator::new(
            Arc::clone(&tasks),
            Arc::clone(&users),
            config.assignment.policy,
        );
        Ok(Self {
            tasks,
            users,
            coordinator,
        })
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Persist both collections and counters once more.
    pub fn close(self) -> Result<()> {
        self.tasks.flush()?;
        self.users.flush()?;
        debug!("board closed");
        Ok(())
    }
}
