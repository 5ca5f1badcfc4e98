#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::{FutureExt, future::BoxFuture};
use lookin_core::{
    ItemId, Package,
    details_handler::{FetchError, Fetcher, RunOutcome, RunTicket},
};
use tokio::{sync::oneshot, time::timeout};

pub(crate) const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct Script {
    dispatched: Mutex<Vec<u64>>,
    gates: Mutex<HashMap<u64, oneshot::Receiver<()>>>,
    failures: Mutex<HashSet<u64>>,
    panics: Mutex<HashSet<u64>>,
    call_panics: Mutex<HashSet<u64>>,
}

/// Fetcher whose answers are held back by gates and can be told to fail.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedFetcher {
    script: Arc<Script>,
}

impl ScriptedFetcher {
    /// Holds `item`'s fetch until the returned sender fires or is dropped.
    pub(crate) fn gate(&self, item: u64) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.gates.lock().unwrap().insert(item, rx);
        tx
    }

    pub(crate) fn fail(&self, item: u64) {
        self.script.failures.lock().unwrap().insert(item);
    }

    /// Makes `item`'s fetch future panic when polled.
    pub(crate) fn panic_in_future(&self, item: u64) {
        self.script.panics.lock().unwrap().insert(item);
    }

    /// Makes the `fetch_detail` call for `item` itself panic.
    pub(crate) fn panic_on_call(&self, item: u64) {
        self.script.call_panics.lock().unwrap().insert(item);
    }

    /// Items handed to the fetcher, in dispatch order.
    pub(crate) fn dispatched(&self) -> Vec<u64> {
        self.script.dispatched.lock().unwrap().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    type Detail = String;

    fn fetch_detail(&self, item_id: ItemId) -> BoxFuture<'static, Result<String, FetchError>> {
        let raw = item_id.get();
        self.script.dispatched.lock().unwrap().push(raw);
        let gate = self.script.gates.lock().unwrap().remove(&raw);
        let fails = self.script.failures.lock().unwrap().contains(&raw);
        let panics = self.script.panics.lock().unwrap().contains(&raw);
        if self.script.call_panics.lock().unwrap().contains(&raw) {
            panic!("fetcher refused {item_id}");
        }

        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if panics {
                panic!("fetch of {item_id} blew up");
            }

            if fails {
                Err(FetchError::new(item_id, "scripted failure"))
            } else {
                Ok(detail(raw))
            }
        }
        .boxed()
    }
}

pub(crate) fn detail(item: u64) -> String {
    format!("detail-{item}")
}

pub(crate) fn details(items: &[u64]) -> Vec<String> {
    items.iter().copied().map(detail).collect()
}

pub(crate) fn package(index: i64, items: &[u64]) -> Package {
    Package::new(index, items.iter().copied().map(ItemId::new))
}

pub(crate) async fn outcome(ticket: RunTicket<String>) -> Option<RunOutcome<String>> {
    timeout(WAIT, ticket.wait())
        .await
        .expect("run did not finish in time")
}
