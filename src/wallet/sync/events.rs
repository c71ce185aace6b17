//! Lifecycle event routing.
//!
//! Providers broadcast lifecycle events on a channel. The `EventDispatcher` maps event kinds to
//! registered handlers, the same way a provider's `on(event, handler)` registration would, and
//! `listen` pumps a provider's channel into the dispatcher until the provider goes away.
//!
//! Handlers are synchronous and must not block: the synchronizer's handler only spawns a
//! re-sync task and returns.

use crate::provider::ProviderEvent;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Why a re-sync was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncTrigger {
    /// First re-sync after initialization
    Initialize,
    /// A lifecycle event from the provider
    Event(ProviderEvent),
    /// The listener fell behind and lost this many events
    Lagged(u64),
    /// Requested by the application
    Manual,
    /// Retry after a provider failure
    Retry { attempt: u32 },
}

impl fmt::Display for ResyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncTrigger::Initialize => write!(f, "initialize"),
            ResyncTrigger::Event(event) => write!(f, "{:?} event", event),
            ResyncTrigger::Lagged(missed) => write!(f, "{} missed events", missed),
            ResyncTrigger::Manual => write!(f, "manual refresh"),
            ResyncTrigger::Retry { attempt } => write!(f, "retry #{}", attempt),
        }
    }
}

/// Trait for reacting to provider lifecycle events.
pub trait TriggerHandler: Send + Sync {
    /// React to a trigger. Must return without waiting on the provider.
    fn handle(&self, trigger: ResyncTrigger);

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Routes provider events to the handlers registered for their kind.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ProviderEvent, Vec<Arc<dyn TriggerHandler>>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of kind `event`.
    ///
    /// Handlers for the same kind are called in registration order.
    pub fn on(&mut self, event: ProviderEvent, handler: Arc<dyn TriggerHandler>) {
        self.handlers.entry(event).or_default().push(handler);
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: ProviderEvent) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Dispatch a provider event to its handlers. Returns how many handlers ran.
    pub fn dispatch(&self, event: ProviderEvent) -> usize {
        let Some(handlers) = self.handlers.get(&event) else {
            debug!("Ignoring {:?} event, no handlers registered", event);
            return 0;
        };
        for handler in handlers {
            debug!("Dispatching {:?} event to {}", event, handler.name());
            handler.handle(ResyncTrigger::Event(event));
        }
        handlers.len()
    }

    /// Notify every distinct registered handler once that events were lost.
    pub fn dispatch_lagged(&self, missed: u64) -> usize {
        let mut notified: Vec<&Arc<dyn TriggerHandler>> = Vec::new();
        for handler in self.handlers.values().flatten() {
            if !notified.iter().any(|seen| Arc::ptr_eq(seen, handler)) {
                handler.handle(ResyncTrigger::Lagged(missed));
                notified.push(handler);
            }
        }
        notified.len()
    }
}

/// Pump provider events into `dispatcher` until the provider closes its channel.
pub async fn listen(mut events: broadcast::Receiver<ProviderEvent>, dispatcher: EventDispatcher) {
    loop {
        match events.recv().await {
            Ok(event) => {
                dispatcher.dispatch(event);
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Event listener lagged behind, {} events lost", missed);
                dispatcher.dispatch_lagged(missed);
            }
            Err(RecvError::Closed) => {
                info!("Provider event channel closed, stopping event listener");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ResyncTrigger>>,
    }

    impl TriggerHandler for Recorder {
        fn handle(&self, trigger: ResyncTrigger) {
            self.seen.lock().unwrap().push(trigger);
        }

        fn name(&self) -> &'static str {
            "Recorder"
        }
    }

    fn dispatcher_for(recorder: &Arc<Recorder>) -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new();
        for event in ProviderEvent::RESYNC_TRIGGERS {
            dispatcher.on(event, recorder.clone());
        }
        dispatcher
    }

    #[test]
    fn test_dispatch_only_registered_kinds() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher_for(&recorder);

        assert_eq!(dispatcher.dispatch(ProviderEvent::CurrentAccount), 1);
        assert_eq!(dispatcher.dispatch(ProviderEvent::Connectors), 0);
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![ResyncTrigger::Event(ProviderEvent::CurrentAccount)]
        );
    }

    #[test]
    fn test_lagged_notifies_each_handler_once() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher_for(&recorder);

        assert_eq!(dispatcher.dispatch_lagged(12), 1);
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![ResyncTrigger::Lagged(12)]
        );
    }

    #[tokio::test]
    async fn test_listen_stops_when_channel_closes() {
        let recorder = Arc::new(Recorder::default());
        let (sender, receiver) = broadcast::channel(8);
        let task = tokio::spawn(listen(receiver, dispatcher_for(&recorder)));

        sender.send(ProviderEvent::Networks).unwrap();
        sender.send(ProviderEvent::CurrentConnector).unwrap();
        drop(sender);
        task.await.unwrap();

        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![ResyncTrigger::Event(ProviderEvent::Networks)]
        );
    }

    #[tokio::test]
    async fn test_listen_recovers_from_lag() {
        let recorder = Arc::new(Recorder::default());
        let (sender, receiver) = broadcast::channel(2);
        for _ in 0..5 {
            sender.send(ProviderEvent::Accounts).unwrap();
        }
        drop(sender);
        listen(receiver, dispatcher_for(&recorder)).await;

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0], ResyncTrigger::Lagged(3));
        assert_eq!(seen.len(), 3);
    }
}
