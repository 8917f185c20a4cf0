//! Top-level polling loops - one task per symbol plus the treasury
//!
//! This is the process's only concurrency: independent, uncoordinated,
//! fault-isolated loops. A failed cycle is logged and the loop continues;
//! nothing here ever terminates the process.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::Settings;
use crate::exchange::SpotExchange;
use crate::grid::SymbolGridEngine;
use crate::notify::Notifier;
use crate::treasury::BalanceManager;

/// Wires engines and the balance manager to their polling loops
pub struct Runner<E, N> {
    exchange: Arc<E>,
    notifier: Arc<N>,
}

impl<E, N> Runner<E, N>
where
    E: SpotExchange + 'static,
    N: Notifier + 'static,
{
    /// Create a runner over shared exchange and notifier capabilities
    pub fn new(exchange: Arc<E>, notifier: Arc<N>) -> Self {
        Self { exchange, notifier }
    }

    /// Spawn every polling task and run until the process is killed.
    ///
    /// Engines and the balance manager are constructed from the settings;
    /// each task owns its component exclusively.
    pub async fn run(self, settings: &Settings) -> crate::grid::GridResult<()> {
        let poll = Duration::from_secs(settings.runner.poll_interval_secs);
        let balance_poll = Duration::from_secs(settings.runner.balance_poll_interval_secs);
        let buffer = settings.treasury.balance_buffer;

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for symbol_config in &settings.symbols {
            let engine = SymbolGridEngine::new(symbol_config.clone(), buffer)?;
            handles.push(tokio::spawn(engine_loop(
                engine,
                self.exchange.clone(),
                self.notifier.clone(),
                poll,
            )));
        }

        let manager = BalanceManager::new(settings.symbols.clone(), settings.treasury.clone());
        handles.push(tokio::spawn(balance_loop(
            manager,
            self.exchange.clone(),
            self.notifier.clone(),
            balance_poll,
        )));

        info!(
            "Runner started: {} grid engines + balance manager",
            settings.symbols.len()
        );

        // The loops run forever; propagate only a panic/abort of a task
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Polling task terminated abnormally: {e}");
            }
        }

        Ok(())
    }
}

/// Drive one symbol's engine forever
async fn engine_loop<E, N>(
    mut engine: SymbolGridEngine,
    exchange: Arc<E>,
    notifier: Arc<N>,
    poll: Duration,
) where
    E: SpotExchange,
    N: Notifier,
{
    let symbol = engine.config().symbol.clone();
    info!("Starting grid loop for {symbol}");

    // Cold start: adopt whatever of ours is still resting on the book
    if let Err(e) = engine.adopt_open_orders(exchange.as_ref()).await {
        error!("{symbol}: startup order adoption failed, starting empty: {e}");
    }

    loop {
        if let Err(e) = engine
            .reconcile_and_replenish(exchange.as_ref(), notifier.as_ref())
            .await
        {
            error!("{symbol}: cycle failed: {e}");
        }
        sleep(poll).await;
    }
}

/// Drive the balance manager forever
async fn balance_loop<E, N>(
    mut manager: BalanceManager,
    exchange: Arc<E>,
    notifier: Arc<N>,
    poll: Duration,
) where
    E: SpotExchange,
    N: Notifier,
{
    info!("Starting balance manager loop");

    loop {
        if let Err(e) = manager
            .manage_balance(exchange.as_ref(), notifier.as_ref())
            .await
        {
            error!("Balance cycle failed: {e}");
        }
        sleep(poll).await;
    }
}
