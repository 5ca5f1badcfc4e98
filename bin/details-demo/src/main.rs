//! Drives a details handler against a simulated inspected process.

use std::time::Duration;

use futures_util::{FutureExt, future::BoxFuture};
use lookin_core::{
    ItemId, Package,
    details_handler::{DetailsConfig, DetailsHandler, FetchError, Fetcher, HandlerError},
};
use lookin_observability::init_tracing;
use tokio::time::sleep;
use tracing::{info, warn};

/// Answers after a delay derived from the item id; one item always fails.
struct SimulatedProcess {
    broken_item: ItemId,
}

impl Fetcher for SimulatedProcess {
    type Detail = String;

    fn fetch_detail(&self, item_id: ItemId) -> BoxFuture<'static, Result<String, FetchError>> {
        let broken = item_id == self.broken_item;
        let delay = Duration::from_millis(50 + (item_id.get() * 37) % 200);

        async move {
            sleep(delay).await;
            if broken {
                return Err(FetchError::new(item_id, "view was deallocated"));
            }
            Ok(format!("attributes of {item_id}"))
        }
        .boxed()
    }
}

fn package(index: i64, items: impl IntoIterator<Item = u64>) -> Package {
    Package::new(index, items.into_iter().map(ItemId::new))
}

fn report(label: &'static str) -> impl FnOnce(Vec<String>, Option<FetchError>) + Send + 'static {
    move |details, error| match error {
        None => info!(run = label, details = details.len(), "run delivered details"),
        Some(error) => warn!(run = label, details = details.len(), %error, "run failed"),
    }
}

#[tokio::main]
async fn main() -> Result<(), HandlerError> {
    init_tracing();

    info!("starting details demo");

    let handler = DetailsHandler::spawn(
        SimulatedProcess {
            broken_item: ItemId::new(404),
        },
        DetailsConfig::default(),
    );

    // Visible screen first, then the long tail of the hierarchy.
    let visible = package(10, 1..=4);
    let backlog: Vec<Package> = (0..5).map(|i| package(i, (100 + i as u64 * 10)..(105 + i as u64 * 10))).collect();
    let focused = backlog[0].clone();

    let mut packages = backlog;
    packages.push(visible);
    handler.start(packages, report("initial")).await?;

    // The user selects an item deep in the tree.
    sleep(Duration::from_millis(100)).await;
    handler.bring_forward(vec![focused]).await?;
    let snapshot = handler.snapshot().await?;
    info!(?snapshot, "after bring forward");

    // The user reloads the hierarchy before the first run finished.
    sleep(Duration::from_millis(300)).await;
    handler
        .start(vec![package(1, 200..204), package(0, 204..206)], report("reload"))
        .await?;

    sleep(Duration::from_secs(2)).await;

    // One of these items is gone in the inspected process.
    handler
        .start(vec![package(2, [300, 301]), package(1, [404, 302]), package(0, [303])], report("stale"))
        .await?;

    sleep(Duration::from_secs(2)).await;
    let stats = handler.snapshot().await?.stats;
    info!(?stats, "final statistics");

    handler.shutdown().await;
    Ok(())
}
