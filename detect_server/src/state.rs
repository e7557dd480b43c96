//! Application state shared by the HTTP endpoints and the data socket.
//!
use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinError};

use crate::{
    annotate::Annotator,
    config::ModelConfig,
    nn::Detector,
    session::{Event, Phase, Session},
};

pub struct AppState {
    session: Mutex<Session>,
    detector: Arc<dyn Detector>,
    annotator: Annotator,
}

impl AppState {
    pub fn new(config: ModelConfig, detector: Arc<dyn Detector>, annotator: Annotator) -> Self {
        Self {
            session: Mutex::new(Session::new(config)),
            detector,
            annotator,
        }
    }

    /// Handle an event on the calling thread. Blocks for the duration of the detection.
    ///
    /// Must not be called from within the async runtime, use [`AppState::dispatch`] there.
    pub fn handle(&self, event: Event) -> Phase {
        self.session
            .blocking_lock()
            .handle(event, self.detector.as_ref(), &self.annotator)
    }

    /// Handle an event on a blocking worker so the async runtime stays responsive.
    pub async fn dispatch(self: &Arc<Self>, event: Event) -> Result<Phase, JoinError> {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || state.handle(event)).await
    }

    /// Read access to the session, waiting for a running detection to finish.
    pub async fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&*self.session.lock().await)
    }
}
