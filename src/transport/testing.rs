//! Scripted transport used by the unit tests of every component.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use super::{TransportError, TransportRequest, TransportResponse};
use crate::core::Transport;

type Handler =
    Arc<dyn Fn(&TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;

pub(crate) struct ScriptedTransport {
    handler: Handler,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&TransportRequest) -> Result<TransportResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Arc::new(handler),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always(response: TransportResponse) -> Self {
        Self::new(move |_| Ok(response.clone()))
    }

    /// Sleep before answering, to exercise timeouts
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: TransportRequest,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(&request)
    }
}
