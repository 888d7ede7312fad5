//! Status listener registry and fan-out
//!
//! Listeners live in an immutable snapshot. Writers take a lock, copy the
//! snapshot, modify the copy and swap it in; notification reads the current
//! snapshot without locking, so delivery never observes a half-modified
//! set. Statuses are queued to a single dispatcher task, so listeners are
//! called off the state machine task and always in notification order.

use std::sync::Arc;

use arc_swap::ArcSwap;
use log::debug;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::state::ClientStatus;

/// Receives Smart Energy client status changes
pub trait StatusListener: Send + Sync + 'static {
    fn sep_status_update(&self, status: ClientStatus);
}

impl<F> StatusListener for F
where
    F: Fn(ClientStatus) + Send + Sync + 'static,
{
    fn sep_status_update(&self, status: ClientStatus) {
        self(status)
    }
}

type ListenerList = Vec<Arc<dyn StatusListener>>;

/// A status and the listeners registered when it was raised
type Delivery = (ClientStatus, Arc<ListenerList>);

struct Registry {
    listeners: ArcSwap<ListenerList>,
    writer: Mutex<()>,
    dispatcher: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
}

/// Shared listener registry. Clones refer to the same registry.
#[derive(Clone)]
pub struct StatusNotifier {
    registry: Arc<Registry>,
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusNotifier {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                listeners: ArcSwap::from_pointee(Vec::new()),
                writer: Mutex::new(()),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    /// Register a listener. Adding the same listener twice has no effect.
    pub fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        let _guard = self.registry.writer.lock();
        let current = self.registry.listeners.load();
        if current.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            return;
        }
        let mut modified = ListenerList::clone(&current);
        modified.push(listener);
        self.registry.listeners.store(Arc::new(modified));
    }

    /// Unregister a listener by identity
    pub fn remove_listener(&self, listener: &Arc<dyn StatusListener>) {
        let _guard = self.registry.writer.lock();
        let current = self.registry.listeners.load();
        let modified: ListenerList = current
            .iter()
            .filter(|known| !Arc::ptr_eq(known, listener))
            .cloned()
            .collect();
        self.registry.listeners.store(Arc::new(modified));
    }

    pub fn listener_count(&self) -> usize {
        self.registry.listeners.load().len()
    }

    /// Deliver `status` to every registered listener.
    ///
    /// Delivery runs on a dispatcher task on the current tokio runtime,
    /// started on first use and restarted if its runtime has gone away.
    /// Outside a runtime listeners are called inline.
    pub fn notify(&self, status: ClientStatus) {
        let snapshot = self.registry.listeners.load_full();
        if snapshot.is_empty() {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            debug!("SEP status {}: no runtime, notifying inline", status);
            deliver(status, &snapshot);
            return;
        };

        let mut dispatcher = self.registry.dispatcher.lock();
        let delivery = match dispatcher.as_ref() {
            Some(queue) => match queue.send((status, snapshot)) {
                Ok(()) => return,
                Err(mpsc::error::SendError(delivery)) => delivery,
            },
            None => (status, snapshot),
        };

        debug!("SEP status: starting listener dispatcher");
        let (queue, deliveries) = mpsc::unbounded_channel();
        runtime.spawn(dispatch(deliveries));
        // Receiver is held by the task just spawned
        let _ = queue.send(delivery);
        *dispatcher = Some(queue);
    }
}

async fn dispatch(mut deliveries: mpsc::UnboundedReceiver<Delivery>) {
    while let Some((status, listeners)) = deliveries.recv().await {
        deliver(status, &listeners);
    }
}

fn deliver(status: ClientStatus, listeners: &ListenerList) {
    for listener in listeners {
        listener.sep_status_update(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn channel_listener() -> (Arc<dyn StatusListener>, mpsc::UnboundedReceiver<ClientStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener: Arc<dyn StatusListener> = Arc::new(move |status: ClientStatus| {
            let _ = tx.send(status);
        });
        (listener, rx)
    }

    #[test]
    fn test_add_remove_by_identity() {
        let notifier = StatusNotifier::new();
        let (first, _rx1) = channel_listener();
        let (second, _rx2) = channel_listener();

        notifier.add_listener(first.clone());
        notifier.add_listener(first.clone());
        notifier.add_listener(second.clone());
        assert_eq!(notifier.listener_count(), 2);

        notifier.remove_listener(&first);
        assert_eq!(notifier.listener_count(), 1);
        notifier.remove_listener(&first);
        assert_eq!(notifier.listener_count(), 1);
    }

    #[test]
    fn test_inline_delivery_without_runtime() {
        let notifier = StatusNotifier::new();
        let (listener, mut rx) = channel_listener();
        notifier.add_listener(listener);

        notifier.notify(ClientStatus::Initializing);
        assert_eq!(rx.try_recv().unwrap(), ClientStatus::Initializing);
    }

    #[tokio::test]
    async fn test_async_delivery() {
        let notifier = StatusNotifier::new();
        let (first, mut rx1) = channel_listener();
        let (second, mut rx2) = channel_listener();
        notifier.add_listener(first);
        notifier.add_listener(second);

        notifier.notify(ClientStatus::Connected);
        assert_eq!(rx1.recv().await, Some(ClientStatus::Connected));
        assert_eq!(rx2.recv().await, Some(ClientStatus::Connected));
    }

    #[test]
    fn test_snapshot_survives_concurrent_writers() {
        let notifier = StatusNotifier::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let notifier = notifier.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let (listener, _rx) = channel_listener();
                        notifier.add_listener(listener.clone());
                        notifier.notify(ClientStatus::Initializing);
                        notifier.remove_listener(&listener);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_listener_keeps_order() {
        let notifier = StatusNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Arc<dyn StatusListener> = Arc::new(move |status: ClientStatus| {
            if status == ClientStatus::Initializing {
                std::thread::sleep(Duration::from_millis(50));
            }
            sink.lock().push(status);
        });
        notifier.add_listener(listener);

        notifier.notify(ClientStatus::Initializing);
        notifier.notify(ClientStatus::Disconnected);
        notifier.notify(ClientStatus::Initializing);
        notifier.notify(ClientStatus::Connected);

        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().len() < 4 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("all statuses delivered");

        assert_eq!(
            seen.lock().clone(),
            vec![
                ClientStatus::Initializing,
                ClientStatus::Disconnected,
                ClientStatus::Initializing,
                ClientStatus::Connected,
            ]
        );
    }

    #[test]
    fn test_dispatcher_restarts_on_new_runtime() {
        let notifier = StatusNotifier::new();
        let (listener, mut rx) = channel_listener();
        notifier.add_listener(listener);

        for status in [ClientStatus::Initializing, ClientStatus::Connected] {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                notifier.notify(status);
                assert_eq!(rx.recv().await, Some(status));
            });
        }
    }
}
