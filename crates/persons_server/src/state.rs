use persons_core::{PersonService, PersonStore};
use std::sync::Arc;
use std::time::Duration;

pub type SharedService = Arc<PersonService<Arc<dyn PersonStore>>>;

#[derive(Clone)]
pub struct AppState {
    pub service: SharedService,
    /// Deadline applied to every store call made on behalf of a request.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn PersonStore>, request_timeout: Duration) -> Self {
        Self {
            service: Arc::new(PersonService::new(store)),
            request_timeout,
        }
    }
}
