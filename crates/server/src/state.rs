use mixloop_core::{Config, Mixer, ProgressBroadcaster};

/// Shared application state
pub struct AppState {
    config: Config,
    mixer: Mixer,
}

impl AppState {
    pub fn new(config: Config, mixer: Mixer) -> Self {
        Self { config, mixer }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        self.mixer.broadcaster()
    }
}
