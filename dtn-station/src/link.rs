//! Station run loop: one task owns the core and drives the once-a-second
//! tick, console lines, connection checks and the dispatch exchange.

use std::future::Future;
use std::time::Duration;

use dtn_core::{BackupStore, CycleEvent, LinkCore};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::console::{Console, Control};
use crate::transport::Connection;

const TICK: Duration = Duration::from_secs(1);

pub struct Station {
    core: LinkCore,
    link: Connection<TcpStream>,
    backup: BackupStore,
    console: Console,
    receive_timeout: Duration,
    connection_check: Duration,
    connection_lost: bool,
}

impl Station {
    pub fn new(
        core: LinkCore,
        link: Connection<TcpStream>,
        backup: BackupStore,
        receive_timeout: Duration,
        connection_check: Duration,
    ) -> Self {
        Self {
            core,
            link,
            backup,
            console: Console::new(),
            receive_timeout,
            connection_check,
            connection_lost: false,
        }
    }

    /// Run until `quit`, end of input, or `shutdown` resolves. The history
    /// is saved before returning.
    pub async fn run<R, F>(mut self, input: R, shutdown: F) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        let mut ticker = time::interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut checker = time::interval_at(Instant::now() + self.connection_check, self.connection_check);
        checker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(role = %self.core.role(), interval = self.core.countdown().interval(), "station running");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(CycleEvent::TimeToSendDispatch) = self.core.tick() {
                        self.exchange().await;
                        // Time spent exchanging is not counted.
                        ticker.reset();
                    }
                }
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => match self.console.handle_line(&mut self.core, &line) {
                        Control::Reply(text) => print_reply(&text),
                        Control::Changed(text) => {
                            print_reply(&text);
                            self.save();
                        }
                        Control::Quit => break,
                    },
                    Ok(None) => {
                        info!("console input closed");
                        input_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "console read failed");
                        input_open = false;
                    }
                },
                _ = checker.tick() => self.check_connection().await,
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }
        self.save();
        Ok(())
    }

    /// One full exchange cycle. Transport failures are reported and the
    /// cycle still opens a new outbound dispatch.
    pub async fn exchange(&mut self) {
        let seq = self.core.cycle();
        let received = match self.core.begin_exchange() {
            Ok(bytes) => match self.link.exchange(&bytes, seq, self.receive_timeout).await {
                Ok(dispatches) => dispatches,
                Err(e) => {
                    warn!(error = %e, seq, "dispatch exchange failed");
                    println!("Dispatch exchange failed: {e}");
                    Vec::new()
                }
            },
            Err(e) => {
                error!(error = %e, "cannot send outbound dispatch");
                Vec::new()
            }
        };
        let outcome = self.core.finish_exchange(received);
        match outcome.received {
            0 => println!("No dispatch received this cycle."),
            1 => println!("Dispatch received with {} message(s).", outcome.messages),
            n => println!("{n} dispatches received with {} message(s) in total.", outcome.messages),
        }
        if outcome.undecodable {
            println!("Some messages could not be decoded and stay hidden.");
        }
        self.save();
    }

    fn save(&self) {
        if let Err(e) = self.backup.save(self.core.history()) {
            error!(path = %self.backup.path().display(), error = %e, "backup failed");
        }
    }

    async fn check_connection(&mut self) {
        let closed = self.link.is_closed().await;
        if closed && !self.connection_lost {
            warn!("connection lost");
            println!("Connection to the {} lost.", self.core.role().peer());
        }
        self.connection_lost = closed;
    }
}

fn print_reply(text: &str) {
    if !text.is_empty() {
        println!("{text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtn_core::{Config, Draft, PartyDirectory, PartyId, Role};
    use tokio::net::TcpListener;

    async fn stations(dir: &std::path::Path, timeout: Duration) -> (Station, Station) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (c, s) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let cfg = Config::default();
        let make = |role: Role, stream: TcpStream| {
            let core = LinkCore::new(role, cfg, PartyDirectory::builtin(cfg.dispatch_capacity)).unwrap();
            let backup = BackupStore::new(dir.join(format!("{role}_backup.bin")));
            Station::new(core, Connection::new(stream), backup, timeout, Duration::from_secs(1))
        };
        (make(Role::Client, c.unwrap()), make(Role::Server, s.unwrap().0))
    }

    #[tokio::test]
    async fn exchange_moves_dispatches_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let (mut crew, mut earth) = stations(dir.path(), Duration::from_secs(5)).await;
        crew.core.login(PartyId(3)).unwrap();
        crew.core
            .compose(&Draft {
                subject: "hello".into(),
                body: "from orbit".into(),
                recipient: None,
            })
            .unwrap();

        tokio::join!(crew.exchange(), earth.exchange());

        let got = &earth.core.history().records()[1].dispatch;
        assert_eq!(got.messages()[0].body(), "from orbit");
        assert!(crew.core.outbound().is_empty());

        let saved = BackupStore::new(dir.path().join("server_backup.bin")).restore().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].dispatch.len(), 1);
    }

    #[tokio::test]
    async fn failed_exchange_still_opens_new_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let (mut crew, earth) = stations(dir.path(), Duration::from_millis(50)).await;
        drop(earth);
        let before = crew.core.outbound().id();
        crew.exchange().await;
        assert_ne!(crew.core.outbound().id(), before);
        assert_eq!(crew.core.phase(), dtn_core::Phase::Composing);
    }

    #[tokio::test]
    async fn quit_saves_and_returns() {
        let dir = tempfile::tempdir().unwrap();
        let (crew, _earth) = stations(dir.path(), Duration::from_secs(5)).await;
        let input: &[u8] = "login éééééééééš\nwrite s | b\nquit\n".as_bytes();
        crew.run(input, std::future::pending::<()>()).await.unwrap();
        let saved = BackupStore::new(dir.path().join("client_backup.bin")).restore().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].dispatch.messages()[0].subject(), "s");
    }
}
