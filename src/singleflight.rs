//! Collapses concurrent calls for the same key into a single execution.
//!
//! A [SingleFlight] keeps a table of the calls which are currently in flight. The first caller
//! for a key registers a call and executes the given function. Each caller arriving for the same
//! key while this call is running subscribes to it and receives a clone of its result once it is
//! done. The call is removed from the table as soon as the function returns, therefore a later
//! caller starts a fresh execution - results (and especially errors) are never kept around.
//!
//! The table is guarded by a plain mutex which is only held to look up, register or remove a
//! call. Waiting for a result happens on a **tokio::sync::watch** channel per call.
//!
//! If the future which executes a call is dropped before it completes, the call is removed and
//! its waiters compete for the key again, so that one of them performs the execution instead.
//!
//! # Examples
//!
//! ```
//! # use peercache::singleflight::SingleFlight;
//! # use std::sync::Arc;
//! # use std::sync::atomic::{AtomicUsize, Ordering};
//! # #[tokio::main]
//! # async fn main() {
//! let flights = SingleFlight::new();
//! let invocations = Arc::new(AtomicUsize::new(0));
//!
//! let lookups = (0..8).map(|_| {
//!     flights.run("expensive", || async {
//!         let _ = invocations.fetch_add(1, Ordering::SeqCst);
//!         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!         42
//!     })
//! });
//!
//! let results = futures::future::join_all(lookups).await;
//! assert_eq!(results, vec![42; 8]);
//! assert_eq!(invocations.load(Ordering::SeqCst), 1);
//! # }
//! ```
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;

/// Deduplicates concurrent executions per key.
///
/// The result type has to be **Clone** as each waiting caller receives its own copy.
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, PendingCall<T>>>,
    next_id: AtomicU64,
    shared: AtomicU64,
}

struct PendingCall<T> {
    id: u64,
    result: watch::Receiver<Option<T>>,
}

enum Role<'a, T> {
    Leader(watch::Sender<Option<T>>, CallGuard<'a, T>),
    Waiter(watch::Receiver<Option<T>>),
}

/// Removes a call from the table once its execution is over - or abandoned.
struct CallGuard<'a, T> {
    flights: &'a SingleFlight<T>,
    key: &'a str,
    id: u64,
}

impl<T> Drop for CallGuard<'_, T> {
    fn drop(&mut self) {
        let mut calls = self.flights.calls.lock().unwrap();
        if calls.get(self.key).map(|call| call.id) == Some(self.id) {
            let _ = calls.remove(self.key);
        }
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        SingleFlight::new()
    }
}

impl<T: Clone> SingleFlight<T> {
    /// Creates a new and empty call table.
    pub fn new() -> Self {
        SingleFlight {
            calls: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shared: AtomicU64::new(0),
        }
    }

    /// Executes the given function unless a call for the same key is already in flight.
    ///
    /// In the latter case, this waits for the running call and returns a clone of its result.
    /// The function is invoked at most once per invocation of **run** and never while the call
    /// table is locked.
    pub async fn run<F, Fut>(&self, key: &str, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let (sender, guard) = loop {
            match self.join_or_lead(key) {
                Role::Leader(sender, guard) => break (sender, guard),
                Role::Waiter(mut receiver) => {
                    let outcome = match receiver.wait_for(Option::is_some).await {
                        Ok(result) => (*result).clone(),
                        Err(_) => None,
                    };
                    if let Some(result) = outcome {
                        let _ = self.shared.fetch_add(1, Ordering::Relaxed);
                        return result;
                    }

                    log::debug!("The in-flight call for '{}' was abandoned. Retrying...", key);
                }
            }
        };

        let result = task().await;

        // Remove the call before publishing the result so that a new caller starts over...
        drop(guard);
        let _ = sender.send_replace(Some(result.clone()));

        result
    }

    fn join_or_lead<'a>(&'a self, key: &'a str) -> Role<'a, T> {
        let mut calls = self.calls.lock().unwrap();
        if let Some(call) = calls.get(key) {
            return Role::Waiter(call.result.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(None);
        let _ = calls.insert(
            key.to_owned(),
            PendingCall {
                id,
                result: receiver,
            },
        );

        Role::Leader(
            sender,
            CallGuard {
                flights: self,
                key,
                id,
            },
        )
    }

    /// Returns the number of calls which are currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Returns how many callers received the result of a call executed by another caller.
    pub fn shared_results(&self) -> u64 {
        self.shared.load(Ordering::Relaxed)
    }
}
