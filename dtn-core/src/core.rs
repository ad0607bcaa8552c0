//! Host-driven API: LinkCore receives events from the host, returns what the host must do.
//!
//! The core never touches sockets or files. The host ticks it once per
//! second, hands it console input, moves the frame returned by
//! [`LinkCore::begin_exchange`] to the peer, and passes back whatever
//! arrived through [`LinkCore::finish_exchange`]. Because every mutation
//! goes through `&mut self`, the capacity check and the append it guards
//! cannot interleave with an exchange.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::capacity::{self, CapacityError};
use crate::config::{Config, ConfigError};
use crate::countdown::Countdown;
use crate::dispatch::Dispatch;
use crate::history::{Direction, ExchangeHistory, ExchangeRecord};
use crate::message::{Message, ValidationError};
use crate::party::{Party, PartyDirectory, PartyId};
use crate::protocol::Frame;
use crate::role::Role;
use crate::session::Session;
use crate::wire::{self, FrameEncodeError};

/// Exchange cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Countdown running, outbound dispatch accepts messages.
    Composing,
    /// Outbound dispatch handed to the host; waiting for the peer's.
    Exchanging,
}

/// Event for the host to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    /// The countdown expired: call [`LinkCore::begin_exchange`].
    TimeToSendDispatch,
}

/// Message as typed at the console, before the role resolves parties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub subject: String,
    pub body: String,
    /// Directory key or numeric id. Only the server uses it.
    pub recipient: Option<String>,
}

/// What an exchange changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// Dispatches recorded from the peer, late ones included.
    pub received: usize,
    /// Messages across those dispatches.
    pub messages: usize,
    /// Whether any message body could not be decoded and stayed encoded.
    pub undecodable: bool,
}

/// Main coordinator for one end of the link.
pub struct LinkCore {
    role: Role,
    config: Config,
    directory: PartyDirectory,
    session: Session,
    countdown: Countdown,
    phase: Phase,
    history: ExchangeHistory,
    /// Exchanges started since construction; sent as the frame sequence.
    cycle: u64,
}

impl LinkCore {
    pub fn new(role: Role, config: Config, directory: PartyDirectory) -> Result<Self, ConfigError> {
        Self::with_history(role, config, directory, Vec::new())
    }

    /// Resume from restored records. They are re-normalised for an
    /// unauthenticated viewer before anything is shown.
    pub fn with_history(
        role: Role,
        config: Config,
        directory: PartyDirectory,
        restored: Vec<ExchangeRecord>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let session = role.initial_session(&directory);
        let mut history = ExchangeHistory::resume(restored, config.dispatch_capacity);
        for dispatch in history.dispatches_mut() {
            dispatch.refresh_parties(&directory);
            if let Err(e) = role.apply_view_policy(dispatch, session.current()) {
                warn!(dispatch = %dispatch.id(), error = %e, "restored dispatch has undecodable messages");
            }
        }
        Ok(Self {
            role,
            countdown: Countdown::new(config.seconds_between_dispatches),
            config,
            directory,
            session,
            phase: Phase::Composing,
            history,
            cycle: 0,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn directory(&self) -> &PartyDirectory {
        &self.directory
    }

    pub fn current_party(&self) -> &Party {
        self.session.current()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn history(&self) -> &ExchangeHistory {
        &self.history
    }

    pub fn outbound(&self) -> &Dispatch {
        self.history.outbound()
    }

    /// Sequence number of the current (or next) exchange.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// One time unit passed. No ticks are counted while exchanging.
    pub fn tick(&mut self) -> Option<CycleEvent> {
        if self.phase == Phase::Exchanging {
            return None;
        }
        if self.countdown.tick() {
            return Some(CycleEvent::TimeToSendDispatch);
        }
        None
    }

    /// Validate a draft, apply the capacity policy and append it to the
    /// outbound dispatch. Nothing changes on error.
    pub fn compose(&mut self, draft: &Draft) -> Result<(), ComposeError> {
        if self.phase == Phase::Exchanging {
            return Err(ComposeError::LinkBusy);
        }
        self.role.validate(draft, &self.config.limits)?;
        let (sender, recipient) = self.role.author(draft, &self.session, &self.directory)?;
        capacity::check(self.history.outbound(), &sender)?;
        let message = Message::create(
            sender,
            recipient,
            draft.subject.as_str(),
            draft.body.as_str(),
            Utc::now(),
            &self.config.limits,
        )?;
        info!(
            dispatch = %self.history.outbound().id(),
            sender = %message.sender().id(),
            recipient = %message.recipient().id(),
            "message added to dispatch"
        );
        if !self.history.outbound_mut().append_batch([message]) {
            // Only reachable if the capacity check and append_batch disagree.
            return Err(ComposeError::Capacity(CapacityError::DispatchFull {
                capacity: self.config.dispatch_capacity,
            }));
        }
        Ok(())
    }

    /// Card login. Reveals the party's own messages in the whole history.
    pub fn login(&mut self, id: PartyId) -> Result<&Party, SessionError> {
        if !self.role.supports_login() {
            return Err(SessionError::LoginUnsupported(self.role));
        }
        let party = self
            .directory
            .get(id)
            .filter(|p| !p.is_anonymous())
            .cloned()
            .ok_or(SessionError::UnknownParty(id))?;
        for dispatch in self.history.dispatches_mut() {
            if let Err(e) = dispatch.decode_all_of(&party) {
                warn!(dispatch = %dispatch.id(), error = %e, "could not decode message on login");
            }
        }
        let previous = self.session.switch_to(party);
        if !previous.is_anonymous() && previous != *self.session.current() {
            self.hide_messages_of(&previous);
        }
        info!(party = %self.session.current(), "logged in");
        Ok(self.session.current())
    }

    /// Hide the current party's messages again (if they prefer encoding)
    /// and return to the unauthenticated party.
    pub fn logout(&mut self) -> Result<Party, SessionError> {
        if !self.session.is_authenticated() || !self.role.supports_login() {
            return Err(SessionError::NotLoggedIn);
        }
        let anonymous = self.directory.no_account().clone();
        let previous = self.session.switch_to(anonymous);
        self.hide_messages_of(&previous);
        info!(party = %previous, "logged out");
        Ok(previous)
    }

    fn hide_messages_of(&mut self, party: &Party) {
        if !party.encryption_preference() {
            return;
        }
        for dispatch in self.history.dispatches_mut() {
            dispatch.encode_all_of(party);
        }
    }

    /// Enter EXCHANGING and return the encoded outbound dispatch for the
    /// host to transmit. The phase changes even if encoding fails; the host
    /// must still call [`LinkCore::finish_exchange`].
    pub fn begin_exchange(&mut self) -> Result<Vec<u8>, ExchangeError> {
        if self.phase == Phase::Exchanging {
            return Err(ExchangeError::AlreadyExchanging);
        }
        self.phase = Phase::Exchanging;
        let outbound = self.history.outbound();
        debug!(dispatch = %outbound.id(), messages = outbound.len(), seq = self.cycle, "exchange started");
        let frame = wire::encode_frame(&Frame::Dispatch {
            seq: self.cycle,
            dispatch: outbound.clone(),
        })?;
        Ok(frame)
    }

    /// Leave EXCHANGING: record whatever the peer's dispatches the host got
    /// (none after a transport failure), open a new outbound dispatch, and
    /// go back to COMPOSING.
    ///
    /// Parties inside received messages are re-resolved against the local
    /// directory before the view policy runs, so encoding follows this
    /// station's preferences rather than the peer's copies.
    pub fn finish_exchange(&mut self, received: impl IntoIterator<Item = Dispatch>) -> ExchangeOutcome {
        let mut outcome = ExchangeOutcome {
            received: 0,
            messages: 0,
            undecodable: false,
        };
        let mut recorded = Vec::new();
        for mut dispatch in received {
            dispatch.refresh_parties(&self.directory);
            if let Err(e) = self
                .role
                .apply_view_policy(&mut dispatch, self.session.current())
            {
                warn!(dispatch = %dispatch.id(), error = %e, "received dispatch has undecodable messages");
                outcome.undecodable = true;
            }
            info!(dispatch = %dispatch.id(), messages = dispatch.len(), "dispatch received");
            outcome.received += 1;
            outcome.messages += dispatch.len();
            recorded.push(dispatch);
        }
        self.history
            .record_exchange(recorded, self.config.dispatch_capacity);
        self.cycle += 1;
        self.phase = Phase::Composing;
        outcome
    }

    /// The whole history rendered for this role, oldest first.
    pub fn render_history(&self) -> String {
        let mut out = String::new();
        for (i, record) in self.history.records().iter().enumerate() {
            let last = i + 1 == self.history.records().len();
            let title = match (record.direction, last) {
                (_, true) => "Outbound dispatch (composing)",
                (Direction::Sent, false) => "Sent dispatch",
                (Direction::Received, false) => "Received dispatch",
            };
            out.push_str(&format!(
                "== {} {} ({}/{}) ==\n",
                title,
                record.dispatch.id(),
                record.dispatch.len(),
                record.dispatch.capacity()
            ));
            out.push_str(&self.role.render(&record.dispatch));
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error("the message does not have any recipient")]
    MissingRecipient,
    #[error("unknown recipient {0:?}")]
    UnknownRecipient(String),
    #[error("a dispatch exchange is in progress")]
    LinkBusy,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("the card is invalid: no party with id {0}")]
    UnknownParty(PartyId),
    #[error("nobody is logged in")]
    NotLoggedIn,
    #[error("the {0} has no card login")]
    LoginUnsupported(Role),
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("an exchange is already in progress")]
    AlreadyExchanging,
    #[error("outbound dispatch cannot be framed: {0}")]
    Encode(#[from] FrameEncodeError),
}
