//! The per-process service context.
//!
//! Built once in `main` from an opened [`Store`] and handed to the router as
//! its state; every handler receives a clone.

use tracing::info;

use crate::blog::BlogRepository;
use crate::config::CollectionNames;
use crate::counter::CounterService;
use crate::error::Error;
use crate::store::Store;
use crate::user::UserRegistry;

#[derive(Clone)]
pub struct Services {
    store: Store,
    pub blogs: BlogRepository,
    pub users: UserRegistry,
    pub counters: CounterService,
}

impl Services {
    /// Binds the repositories to their collections and ensures the unique
    /// indexes they rely on.
    pub async fn init(store: Store, names: &CollectionNames) -> Result<Self, Error> {
        let services = Self {
            blogs: BlogRepository::new(store.collection(&names.blogs)),
            users: UserRegistry::new(store.collection(&names.users)),
            counters: CounterService::new(store.collection(&names.counters)),
            store,
        };
        services.users.init().await?;
        services.counters.init().await?;
        info!(store = ?services.store, "services initialized");
        Ok(services)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Closes the store. Call after the server has drained.
    pub async fn close(self) {
        self.store.close().await;
        info!("store closed");
    }
}
