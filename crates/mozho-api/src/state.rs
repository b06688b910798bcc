use std::sync::Arc;

use mozho_chat::{
    BrokerConfig, ChatResult, DiskObjectStore, MessageBroker, RoomDirectory, run_blocking,
};
use mozho_db::Database;

pub type Broker = MessageBroker<Database, Database, DiskObjectStore>;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub broker: Broker,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        objects: Arc<DiskObjectStore>,
        config: BrokerConfig,
        jwt_secret: String,
    ) -> Self {
        Self {
            broker: MessageBroker::new(db.clone(), db, objects, config),
            jwt_secret,
        }
    }

    /// Run room directory calls off the async runtime, under the storage timeout.
    pub async fn with_rooms<T, F>(&self, f: F) -> ChatResult<T>
    where
        F: FnOnce(&RoomDirectory<Database>) -> ChatResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let rooms = self.broker.rooms().clone();
        run_blocking(self.broker.config().storage_timeout, move || f(&rooms)).await
    }
}
