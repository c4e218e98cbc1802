use std::sync::Arc;

use crate::api::FisteinApi;
use crate::auth::{SessionSigner, SessionStore};
use crate::config::Config;
use crate::draft::DraftStore;

pub struct AppState {
    pub config: Config,
    pub api: Arc<dyn FisteinApi>,
    pub signer: SessionSigner,
    pub sessions: SessionStore,
    pub drafts: DraftStore,
}

impl AppState {
    pub fn new(config: Config, api: Arc<dyn FisteinApi>, signer: SessionSigner) -> Self {
        Self {
            config,
            api,
            signer,
            sessions: SessionStore::new(),
            drafts: DraftStore::new(),
        }
    }
}
