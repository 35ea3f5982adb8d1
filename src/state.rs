// src/state.rs

use axum::extract::FromRef;

use crate::{
    config::Config,
    services::{AttemptTracker, SetPacker},
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub packer: SetPacker,
    pub tracker: AttemptTracker,
}

impl AppState {
    /// Wires the services onto one shared store so their locks cover every request.
    pub fn new(store: Store, config: Config) -> Self {
        Self {
            packer: SetPacker::new(store.clone()),
            tracker: AttemptTracker::new(store.clone()),
            store,
            config,
        }
    }
}

impl FromRef<AppState> for Store {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
