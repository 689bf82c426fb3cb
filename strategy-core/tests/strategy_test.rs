use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use strategy_core::{
    push_stream, start, CoreError, EventStream, StopSource, StopToken, Strategy, StrategyContext,
    Timestamped,
};

/// Watches two feeds until the book crosses, then records the crossing pair.
struct SpreadProbe {
    bids: EventStream<i64>,
    asks: EventStream<i64>,
    observed: Arc<Mutex<Vec<(i64, i64)>>>,
}

#[async_trait(?Send)]
impl Strategy for SpreadProbe {
    async fn run(self, ctx: StrategyContext, stop: StopToken) -> Result<()> {
        let book = Rc::new(RefCell::new((0i64, 0i64)));

        let bid_book = book.clone();
        let bids = ctx.bind(self.bids, move |tick: Timestamped<i64>| {
            bid_book.borrow_mut().0 = tick.value;
            Ok(())
        });
        let ask_book = book.clone();
        let asks = ctx.bind(self.asks, move |tick: Timestamped<i64>| {
            ask_book.borrow_mut().1 = tick.value;
            Ok(())
        });

        let mut joined = bids.combine(asks)?;
        joined.start()?;

        let watch_book = book.clone();
        let crossed = joined
            .watch(
                move || {
                    let (bid, ask) = *watch_book.borrow();
                    ask != 0 && bid > ask
                },
                &stop,
            )
            .await?;
        if crossed {
            let snapshot = *book.borrow();
            self.observed.lock().unwrap().push(snapshot);
        }
        Ok(())
    }
}

#[tokio::test]
async fn strategy_runs_on_its_own_host_until_the_book_crosses() {
    let (bid_handle, bids) = push_stream::<i64>();
    let (ask_handle, asks) = push_stream::<i64>();
    let observed = Arc::new(Mutex::new(Vec::new()));

    let handle = start(
        SpreadProbe {
            bids,
            asks,
            observed: observed.clone(),
        },
        StopToken::never(),
    )
    .await
    .unwrap();

    // First pair is uncrossed, second crosses.
    bid_handle.push(99);
    ask_handle.push(101);
    bid_handle.push(102);
    ask_handle.push(100);

    handle.join().await.unwrap();
    assert_eq!(*observed.lock().unwrap(), vec![(102, 100)]);
}

/// Blocks forever unless canceled, and treats cancellation as a clean exit.
struct IdleUntilStopped {
    feed: EventStream<i64>,
}

#[async_trait(?Send)]
impl Strategy for IdleUntilStopped {
    async fn run(self, ctx: StrategyContext, stop: StopToken) -> Result<()> {
        let mut sentinel = ctx.bind(self.feed, |_tick: Timestamped<i64>| Ok(()));
        sentinel.start()?;
        match sentinel.watch(|| false, &stop).await {
            Err(CoreError::Canceled) => Ok(()),
            Err(other) => Err(other.into()),
            Ok(_) => Ok(()),
        }
    }
}

#[tokio::test]
async fn external_stop_winds_a_strategy_down_cleanly() {
    let (_feed_handle, feed) = push_stream::<i64>();
    let source = StopSource::new();

    let handle = start(IdleUntilStopped { feed }, source.token()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    source.stop();

    handle.join().await.unwrap();
}

struct FailsOnLaunch;

#[async_trait(?Send)]
impl Strategy for FailsOnLaunch {
    async fn run(self, _ctx: StrategyContext, _stop: StopToken) -> Result<()> {
        Err(anyhow!("refused to trade"))
    }
}

#[tokio::test]
async fn a_body_fault_surfaces_through_the_handle() {
    let handle = start(FailsOnLaunch, StopToken::never()).await.unwrap();
    let outcome = handle.join().await;
    assert!(outcome.is_err());
    assert!(outcome.unwrap_err().to_string().contains("refused to trade"));
}
