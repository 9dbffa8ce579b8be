use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinError};
use tracing::{info, warn};

use crate::{
    domain::command::{Command, CommandKind},
    ledger::{
        LedgerStore,
        client::{DeadLetter, LedgerClient, Outcome},
    },
    queue::CommandSource,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub received: usize,
    pub malformed: usize,
    pub committed: usize,
    pub rejected: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub deposit: LoopStats,
    pub withdraw: LoopStats,
}

/// Pulls commands off their streams and drives them through the ledger client.
/// Nothing is reported back to producers; the transaction log is the only result.
pub struct Dispatcher<S> {
    client: Arc<LedgerClient<S>>,
    dead_letters: Option<mpsc::UnboundedSender<DeadLetter>>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Dispatcher {
            client: self.client.clone(),
            dead_letters: self.dead_letters.clone(),
        }
    }
}

impl<S: LedgerStore + 'static> Dispatcher<S> {
    pub fn new(client: Arc<LedgerClient<S>>) -> Self {
        Dispatcher {
            client,
            dead_letters: None,
        }
    }

    /// Dropped commands are forwarded to `sink`.
    pub fn with_dead_letters(mut self, sink: mpsc::UnboundedSender<DeadLetter>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Runs the deposit and withdraw loops side by side until both sources close.
    pub async fn run<D, W>(self, deposits: D, withdrawals: W) -> Result<DispatchStats, JoinError>
    where
        D: CommandSource + 'static,
        W: CommandSource + 'static,
    {
        let deposit_loop = tokio::spawn({
            let dispatcher = self.clone();
            async move { dispatcher.consume(CommandKind::Deposit, deposits).await }
        });
        let withdraw_loop = tokio::spawn({
            let dispatcher = self.clone();
            async move { dispatcher.consume(CommandKind::Withdraw, withdrawals).await }
        });
        drop(self);

        let (deposit, withdraw) = tokio::try_join!(deposit_loop, withdraw_loop)?;

        Ok(DispatchStats { deposit, withdraw })
    }

    /// One command at a time, in arrival order. No failure stops the loop.
    pub async fn consume<Src: CommandSource>(&self, kind: CommandKind, mut source: Src) -> LoopStats {
        info!("Consuming {} commands from {}", kind, kind.stream());
        let mut stats = LoopStats::default();

        while let Some(body) = source.next().await {
            stats.received += 1;

            let command = match Command::decode(kind, &body) {
                Ok(command) => command,
                Err(e) => {
                    warn!("Failed to decode {} request: {}", kind, e);
                    stats.malformed += 1;
                    continue;
                }
            };

            match self.client.apply(command).await {
                Outcome::Committed(_) => stats.committed += 1,
                Outcome::Rejected(..) => stats.rejected += 1,
                Outcome::Dropped(dead) => {
                    stats.dropped += 1;
                    if let Some(sink) = &self.dead_letters {
                        if let Err(unsent) = sink.send(dead) {
                            let dead = unsent.0;
                            warn!(
                                "Dead letter sink closed, lost {} of {} for wallet {}: {}",
                                dead.command.kind,
                                dead.command.amount,
                                dead.command.wallet_id,
                                dead.reason
                            );
                        }
                    }
                }
            }
        }

        info!("Stopped consuming {} commands: {:?}", kind, stats);
        stats
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::{Decimal, dec};
    use tokio::sync::mpsc;

    use crate::{
        domain::{
            command::{Command, CommandKind, DEPOSIT_STREAM, WITHDRAW_STREAM},
            props::WalletId,
        },
        ledger::{
            LedgerStore,
            client::{Consistency, LedgerClient, RetryPolicy, Stage},
            sqlite::SqliteLedgerStore,
            testing::{count_records, memory_store},
        },
        queue::{Broker, Subscription},
    };

    use super::*;

    async fn dispatcher(wallets: &[(i64, Decimal)]) -> Dispatcher<SqliteLedgerStore> {
        let retry = RetryPolicy {
            attempts: 2,
            backoff: Duration::from_millis(1),
        };
        Dispatcher::new(Arc::new(LedgerClient::new(
            memory_store(wallets).await,
            Consistency::Versioned,
            retry,
        )))
    }

    /// Publishes the bodies, closes both streams and hands back the subscriptions.
    async fn streams(deposits: Vec<Vec<u8>>, withdrawals: Vec<Vec<u8>>) -> (Subscription, Subscription) {
        let mut broker = Broker::new(64);
        broker.declare(DEPOSIT_STREAM);
        broker.declare(WITHDRAW_STREAM);

        for (stream, bodies) in [(DEPOSIT_STREAM, deposits), (WITHDRAW_STREAM, withdrawals)] {
            let publisher = broker.publisher(stream).unwrap();
            for body in bodies {
                publisher.publish(body).await.unwrap();
            }
        }

        let subs = (
            broker.subscribe(DEPOSIT_STREAM).unwrap(),
            broker.subscribe(WITHDRAW_STREAM).unwrap(),
        );
        drop(broker);
        subs
    }

    fn body(wallet_id: i64, amount: Decimal) -> Vec<u8> {
        serde_json::to_vec(&Command::new(CommandKind::Deposit, wallet_id, amount).payload()).unwrap()
    }

    #[tokio::test]
    async fn runs_both_loops_until_streams_close() {
        let dispatcher = dispatcher(&[(1, dec!(100.00)), (2, dec!(50.00))]).await;
        let client = dispatcher.client.clone();
        let (deposits, withdrawals) = streams(
            vec![body(1, dec!(25)), body(2, dec!(10))],
            vec![body(1, dec!(50.00)), body(2, dec!(100.00))],
        )
        .await;

        let stats = dispatcher.run(deposits, withdrawals).await.unwrap();

        assert_eq!(stats.deposit.committed, 2);
        assert_eq!(stats.withdraw.committed, 1);
        assert_eq!(stats.withdraw.rejected, 1);
        let store = client.store();
        assert_eq!(store.read_balance(WalletId(1)).await.unwrap().balance, dec!(75.00));
        assert_eq!(store.read_balance(WalletId(2)).await.unwrap().balance, dec!(60.00));
        assert_eq!(count_records(store).await, 4);
    }

    #[tokio::test]
    async fn malformed_payloads_are_discarded_without_record() {
        let dispatcher = dispatcher(&[(1, dec!(10))]).await;
        let client = dispatcher.client.clone();
        let (deposits, withdrawals) = streams(
            vec![
                b"garbage".to_vec(),
                br#"{"wallet_id": 1}"#.to_vec(),
                body(1, dec!(1)),
            ],
            vec![br#"{"wallet_id": 1, "amount": "lots"}"#.to_vec()],
        )
        .await;

        let stats = dispatcher.run(deposits, withdrawals).await.unwrap();

        assert_eq!(stats.deposit.received, 3);
        assert_eq!(stats.deposit.malformed, 2);
        assert_eq!(stats.deposit.committed, 1);
        assert_eq!(stats.withdraw.malformed, 1);
        assert_eq!(count_records(client.store()).await, 1);
    }

    #[tokio::test]
    async fn commands_are_processed_in_arrival_order() {
        let dispatcher = dispatcher(&[(1, dec!(999999990.00)), (2, dec!(100))]).await;
        let client = dispatcher.client.clone();
        let (deposits, withdrawals) = streams(
            vec![body(1, dec!(10)), body(1, dec!(0.01))],
            vec![body(2, dec!(100)), body(2, dec!(1))],
        )
        .await;

        let stats = dispatcher.run(deposits, withdrawals).await.unwrap();

        assert_eq!((stats.deposit.committed, stats.deposit.rejected), (1, 1));
        assert_eq!((stats.withdraw.committed, stats.withdraw.rejected), (1, 1));
        let store = client.store();
        assert_eq!(
            store.read_balance(WalletId(1)).await.unwrap().balance,
            dec!(1000000000.00)
        );
        assert_eq!(store.read_balance(WalletId(2)).await.unwrap().balance, dec!(0));
    }

    #[tokio::test]
    async fn every_well_formed_command_yields_one_record_or_a_dead_letter() {
        let (sink, mut dead_letters) = mpsc::unbounded_channel();
        let dispatcher = dispatcher(&[(1, dec!(5))]).await.with_dead_letters(sink);
        let client = dispatcher.client.clone();
        let (deposits, withdrawals) = streams(
            vec![body(1, dec!(-1)), body(1, dec!(2)), body(7, dec!(2))],
            vec![body(1, dec!(0)), body(1, dec!(3)), body(1, dec!(30))],
        )
        .await;

        let stats = dispatcher.run(deposits, withdrawals).await.unwrap();

        let mut dead = vec![];
        while let Some(letter) = dead_letters.recv().await {
            dead.push(letter);
        }
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].command.wallet_id, WalletId(7));
        assert_eq!(dead[0].stage, Stage::Validated);

        let handled = stats.deposit.committed
            + stats.deposit.rejected
            + stats.withdraw.committed
            + stats.withdraw.rejected;
        assert_eq!(handled, 5);
        assert_eq!(stats.deposit.dropped + stats.withdraw.dropped, 1);
        assert_eq!(count_records(client.store()).await, 5);
    }

    #[tokio::test]
    async fn closed_dead_letter_sink_does_not_stop_the_loop() {
        let (sink, dead_letters) = mpsc::unbounded_channel();
        drop(dead_letters);
        let dispatcher = dispatcher(&[(1, dec!(5))]).await.with_dead_letters(sink);
        let client = dispatcher.client.clone();
        let (deposits, withdrawals) = streams(
            vec![body(7, dec!(1)), body(1, dec!(1))],
            vec![body(8, dec!(1))],
        )
        .await;

        let stats = dispatcher.run(deposits, withdrawals).await.unwrap();

        assert_eq!((stats.deposit.dropped, stats.deposit.committed), (1, 1));
        assert_eq!(stats.withdraw.dropped, 1);
        assert_eq!(count_records(client.store()).await, 1);
    }
}
