use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::Mutex;

use crate::auth::SessionStore;
use crate::blog::{BlogRepository, SqliteBlogRepository, UploadStore};
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repo: Arc<dyn BlogRepository>,
    pub uploads: UploadStore,
    pub sessions: Arc<Mutex<SessionStore>>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let session_ttl = config.auth.session_ttl();
        Self {
            repo: Arc::new(SqliteBlogRepository::new(db)),
            uploads: UploadStore::new(config.uploads_path()),
            sessions: Arc::new(Mutex::new(SessionStore::new(session_ttl))),
            config,
        }
    }
}
