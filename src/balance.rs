//! Provider client handles and load balancing across a pool.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::LoadBalancingStrategy;
use crate::error::{EngineError, EngineResult};

/// Opaque handle to a configured provider client.
///
/// The engine never looks inside the connection; processors downcast it to
/// whatever client type they were built with.
#[derive(Clone)]
pub struct ClientHandle {
    name: Arc<str>,
    connection: Arc<dyn Any + Send + Sync>,
}

impl ClientHandle {
    pub fn new<C>(name: impl Into<String>, connection: C) -> Self
    where
        C: Any + Send + Sync,
    {
        Self {
            name: Arc::from(name.into()),
            connection: Arc::new(connection),
        }
    }

    /// A handle identified only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, ())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection<C: Any + Send + Sync>(&self) -> Option<&C> {
        self.connection.downcast_ref::<C>()
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Where a dispatch gets its clients from.
#[derive(Debug, Clone)]
pub enum ClientSource {
    /// Every task uses the same client.
    Single(ClientHandle),
    /// Each task picks a client from the pool using the configured
    /// [`LoadBalancingStrategy`].
    Pool(Vec<ClientHandle>),
}

impl ClientSource {
    pub fn pool(clients: Vec<ClientHandle>) -> Self {
        ClientSource::Pool(clients)
    }
}

#[derive(Debug, Clone)]
enum Selection {
    Fixed,
    RoundRobin(Arc<AtomicUsize>),
    Random,
}

/// Picks a client for each task of one run.
///
/// Clones share the round-robin counter, so every worker of a dispatch
/// advances the same rotation. A new selector starts at the first client.
/// A single client is always selected regardless of strategy.
#[derive(Debug, Clone)]
pub struct ClientSelector {
    clients: Arc<[ClientHandle]>,
    selection: Selection,
}

impl ClientSelector {
    /// Build a selector, rejecting an empty pool.
    pub fn new(source: &ClientSource, strategy: LoadBalancingStrategy) -> EngineResult<Self> {
        match source {
            ClientSource::Single(client) => Ok(Self {
                clients: Arc::from(vec![client.clone()]),
                selection: Selection::Fixed,
            }),
            ClientSource::Pool(clients) => {
                if clients.is_empty() {
                    return Err(EngineError::Validation(
                        "client pool must not be empty".to_string(),
                    ));
                }
                let selection = match strategy {
                    LoadBalancingStrategy::RoundRobin => {
                        Selection::RoundRobin(Arc::new(AtomicUsize::new(0)))
                    }
                    LoadBalancingStrategy::Random => Selection::Random,
                };
                Ok(Self {
                    clients: Arc::from(clients.clone()),
                    selection,
                })
            }
        }
    }

    /// Pick the client for the next task.
    pub fn select(&self) -> &ClientHandle {
        let index = match &self.selection {
            Selection::Fixed => 0,
            Selection::RoundRobin(counter) => {
                counter.fetch_add(1, Ordering::Relaxed) % self.clients.len()
            }
            Selection::Random => rand::random_range(0..self.clients.len()),
        };
        let client = &self.clients[index];
        debug!(client = client.name(), index, "Selected client");
        client
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn selector(names: &[&str], strategy: LoadBalancingStrategy) -> EngineResult<ClientSelector> {
        let source =
            ClientSource::pool(names.iter().map(|name| ClientHandle::named(*name)).collect());
        ClientSelector::new(&source, strategy)
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        let err = selector(&[], LoadBalancingStrategy::RoundRobin).expect_err("empty pool");
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_single_client_always_selected() {
        let selector = ClientSelector::new(
            &ClientSource::Single(ClientHandle::named("only")),
            LoadBalancingStrategy::Random,
        )
        .expect("selector");
        for _ in 0..3 {
            assert_eq!(selector.select().name(), "only");
        }
    }

    #[test]
    fn test_round_robin_rotates_from_first() {
        let selector =
            selector(&["a", "b", "c"], LoadBalancingStrategy::RoundRobin).expect("selector");
        let names: Vec<String> = (0..7).map(|_| selector.select().name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_round_robin_is_fair_across_threads() {
        let selector =
            selector(&["a", "b", "c"], LoadBalancingStrategy::RoundRobin).expect("selector");

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let selector = selector.clone();
                std::thread::spawn(move || {
                    (0..30)
                        .map(|_| selector.select().name().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for thread in threads {
            for name in thread.join().expect("join") {
                *counts.entry(name).or_default() += 1;
            }
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|count| *count == 40));
    }

    #[test]
    fn test_new_selector_restarts_rotation() {
        let first = selector(&["a", "b"], LoadBalancingStrategy::RoundRobin).expect("selector");
        first.select();
        let second = selector(&["a", "b"], LoadBalancingStrategy::RoundRobin).expect("selector");
        assert_eq!(second.select().name(), "a");
    }

    #[test]
    fn test_random_selects_from_pool() {
        let selector = selector(&["a", "b"], LoadBalancingStrategy::Random).expect("selector");
        for _ in 0..20 {
            let name = selector.select().name();
            assert!(name == "a" || name == "b");
        }
    }

    #[test]
    fn test_connection_downcast() {
        let handle = ClientHandle::new("typed", 42u32);
        assert_eq!(handle.connection::<u32>(), Some(&42));
        assert!(handle.connection::<String>().is_none());
    }
}
