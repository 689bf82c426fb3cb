//! A synthetic two-venue arbitrage watcher.
//!
//! Generates a random-walk quote feed per venue, runs an [`ArbStrategy`] on
//! its own host thread, and logs every time the books cross by more than the
//! configured edge. Ctrl-C stops the strategy cleanly.

use std::cell::RefCell;
use std::pin::pin;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use log::info;
use rand::Rng;
use strategy_core::{
    push_stream, start, CoreError, EventStream, PushHandle, StopSource, StopToken, Strategy,
    StrategyContext, Timestamped,
};

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Quotes to generate per venue before the feeds complete.
    #[arg(long, default_value_t = 200)]
    ticks: u32,

    /// Milliseconds between quotes on each venue.
    #[arg(long, default_value_t = 25)]
    interval_ms: u64,

    /// Minimum cross between the venues to count as an opportunity.
    #[arg(long, default_value_t = 0.05)]
    edge: f64,
}

#[derive(Debug, Clone, Copy)]
struct Quote {
    bid: f64,
    ask: f64,
}

#[derive(Default)]
struct Books {
    alpha: Option<Quote>,
    beta: Option<Quote>,
}

impl Books {
    /// Best cross between the venues, in either direction.
    fn cross(&self) -> f64 {
        match (self.alpha, self.beta) {
            (Some(alpha), Some(beta)) => (beta.bid - alpha.ask).max(alpha.bid - beta.ask),
            _ => f64::MIN,
        }
    }
}

struct ArbStrategy {
    alpha: EventStream<Quote>,
    beta: EventStream<Quote>,
    edge: f64,
}

#[async_trait(?Send)]
impl Strategy for ArbStrategy {
    async fn run(self, ctx: StrategyContext, stop: StopToken) -> Result<()> {
        let books = Rc::new(RefCell::new(Books::default()));

        let alpha_books = books.clone();
        let alpha = ctx.bind(self.alpha, move |quote: Timestamped<Quote>| {
            alpha_books.borrow_mut().alpha = Some(quote.value);
            Ok(())
        });
        let beta_books = books.clone();
        let beta = ctx.bind(self.beta, move |quote: Timestamped<Quote>| {
            beta_books.borrow_mut().beta = Some(quote.value);
            Ok(())
        });

        let mut book = alpha.combine(beta)?;
        book.start()?;

        let edge = self.edge;
        let mut opportunities = 0u32;
        loop {
            let opened = books.clone();
            match book.watch(move || opened.borrow().cross() > edge, &stop).await {
                Ok(true) => {
                    opportunities += 1;
                    info!(
                        "opportunity {opportunities}: cross {:.4} exceeds edge {edge}",
                        books.borrow().cross()
                    );
                }
                Ok(false) => break,
                Err(CoreError::Canceled) => break,
                Err(err) => return Err(err.into()),
            }

            // Wait for the edge to close again before rearming.
            let closed = books.clone();
            match book.watch(move || closed.borrow().cross() <= edge, &stop).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(CoreError::Canceled) => break,
                Err(err) => return Err(err.into()),
            }
        }

        info!("strategy done after {opportunities} opportunities");
        Ok(())
    }
}

/// Random-walk quote generator for one venue.
fn run_venue(venue: &'static str, handle: PushHandle<Quote>, ticks: u32, interval: Duration) {
    let mut rng = rand::thread_rng();
    let mut mid = 100.0f64;

    for _ in 0..ticks {
        mid *= 1.0 + rng.gen_range(-0.005..0.005);
        mid = mid.max(0.01);
        let quote = Quote {
            bid: mid * 0.9995,
            ask: mid * 1.0005,
        };
        if !handle.push(quote) {
            return;
        }
        std::thread::sleep(interval);
    }
    info!("venue {venue} feed complete");
    handle.complete();
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let interval = Duration::from_millis(args.interval_ms);

    let (alpha_handle, alpha) = push_stream::<Quote>();
    let (beta_handle, beta) = push_stream::<Quote>();
    std::thread::spawn(move || run_venue("alpha", alpha_handle, args.ticks, interval));
    std::thread::spawn(move || run_venue("beta", beta_handle, args.ticks, interval));

    let source = StopSource::new();
    let handle = start(
        ArbStrategy {
            alpha,
            beta,
            edge: args.edge,
        },
        source.token(),
    )
    .await?;
    info!("strategy launched, watching for an edge over {}", args.edge);

    let mut joined = pin!(handle.join());
    tokio::select! {
        outcome = &mut joined => outcome?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupt received, stopping the strategy");
            source.stop();
            joined.await?;
        }
    }

    Ok(())
}
