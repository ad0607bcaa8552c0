//! Console commands: parse a typed line and apply it to the core.

use dtn_core::card::{self, CARD_ID_LEN};
use dtn_core::{CardInput, CardReader, Draft, LinkCore, Role};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Arm the card reader; symbols may follow on the same line.
    Login(Option<String>),
    Logout,
    Write(Draft),
    Show,
    Status,
    Users,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command {0:?}, type `help`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

const CLIENT_WRITE: &str = "write <subject> | <body>";
const SERVER_WRITE: &str = "write <recipient> | <subject> | <body>";

/// `None` for a blank line.
pub fn parse(line: &str, role: Role) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let cmd = match word {
        "login" => Command::Login((!rest.is_empty()).then(|| rest.to_string())),
        "logout" => Command::Logout,
        "write" => Command::Write(parse_draft(rest, role)?),
        "show" => Command::Show,
        "status" => Command::Status,
        "users" => Command::Users,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}

fn parse_draft(rest: &str, role: Role) -> Result<Draft, ParseError> {
    let parts: Vec<&str> = rest.splitn(role_fields(role), '|').map(str::trim).collect();
    match (role, parts.as_slice()) {
        (Role::Client, [subject, body]) => Ok(Draft {
            subject: subject.to_string(),
            body: body.to_string(),
            recipient: None,
        }),
        (Role::Server, [recipient, subject, body]) => Ok(Draft {
            subject: subject.to_string(),
            body: body.to_string(),
            recipient: (!recipient.is_empty()).then(|| recipient.to_string()),
        }),
        (Role::Client, _) => Err(ParseError::Usage(CLIENT_WRITE)),
        (Role::Server, _) => Err(ParseError::Usage(SERVER_WRITE)),
    }
}

fn role_fields(role: Role) -> usize {
    match role {
        Role::Client => 2,
        Role::Server => 3,
    }
}

/// Result of one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Text for the operator; history unchanged.
    Reply(String),
    /// Text for the operator; history changed and should be saved.
    Changed(String),
    Quit,
}

/// Console state that lives outside the core: the card reader.
#[derive(Debug, Default)]
pub struct Console {
    card: CardReader,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_line(&mut self, core: &mut LinkCore, line: &str) -> Control {
        // While the reader is armed, a line of card symbols is a swipe.
        // Anything else cancels the read and runs as a command.
        if self.card.is_armed() {
            let swipe = line.trim();
            if swipe.is_empty() {
                return Control::Reply(String::new());
            }
            if swipe.chars().all(|c| card::digit_for(c).is_some()) {
                return self.read_card(core, swipe);
            }
            self.card.disarm();
            debug!("card read cancelled");
        }
        match parse(line, core.role()) {
            Ok(None) => Control::Reply(String::new()),
            Ok(Some(cmd)) => self.apply(core, cmd),
            Err(e) => Control::Reply(e.to_string()),
        }
    }

    fn apply(&mut self, core: &mut LinkCore, cmd: Command) -> Control {
        match cmd {
            Command::Login(symbols) => {
                if !core.role().supports_login() {
                    return Control::Reply(format!("the {} has no card login", core.role()));
                }
                self.card.arm();
                match symbols {
                    Some(s) => self.read_card(core, &s),
                    None => Control::Reply("swipe your card".to_string()),
                }
            }
            Command::Logout => match core.logout() {
                Ok(party) => Control::Changed(format!("{} logged out", party.display_name())),
                Err(e) => Control::Reply(e.to_string()),
            },
            Command::Write(draft) => match core.compose(&draft) {
                Ok(()) => Control::Changed(format!(
                    "message added ({}/{} in the outbound dispatch)",
                    core.outbound().len(),
                    core.outbound().capacity()
                )),
                Err(e) => Control::Reply(e.to_string()),
            },
            Command::Show => Control::Reply(core.render_history()),
            Command::Status => Control::Reply(status(core)),
            Command::Users => Control::Reply(users(core)),
            Command::Help => Control::Reply(help(core.role())),
            Command::Quit => Control::Quit,
        }
    }

    fn read_card(&mut self, core: &mut LinkCore, symbols: &str) -> Control {
        let mut last = CardInput::Ignored;
        for symbol in symbols.chars() {
            last = self.card.feed(symbol);
            if let CardInput::Complete(_) = last {
                break;
            }
        }
        match last {
            CardInput::Complete(id) => match core.login(id) {
                Ok(party) => Control::Changed(format!("welcome, {}", party.display_name())),
                Err(e) => {
                    info!(card = %id, "card rejected");
                    Control::Reply(e.to_string())
                }
            },
            CardInput::Pending(n) => {
                debug!(read = n, "partial card read");
                Control::Reply(format!("card read {n}/{CARD_ID_LEN}, keep swiping"))
            }
            CardInput::Reset => Control::Reply("card not recognised, swipe again".to_string()),
            CardInput::Ignored => Control::Reply(String::new()),
        }
    }
}

fn status(core: &LinkCore) -> String {
    format!(
        "role: {}\nlogged in: {}\nphase: {:?}\nnext dispatch in: {}\noutbound: {}/{} messages",
        core.role(),
        core.current_party(),
        core.phase(),
        core.countdown().remaining_hms(),
        core.outbound().len(),
        core.outbound().capacity()
    )
}

fn users(core: &LinkCore) -> String {
    core.directory()
        .iter()
        .map(|(key, p)| {
            format!(
                "{key}: {} (id {}, quota {}, encodes: {})",
                p.display_name(),
                p.id(),
                p.message_quota(),
                if p.encryption_preference() { "yes" } else { "no" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn help(role: Role) -> String {
    let write = match role {
        Role::Client => CLIENT_WRITE,
        Role::Server => SERVER_WRITE,
    };
    let mut out = String::new();
    if role.supports_login() {
        out.push_str("login [card]    identify with your card\nlogout          end your session\n");
    }
    out.push_str(&format!("{write}\n"));
    out.push_str("show            print every dispatch\nstatus          countdown and session\nusers           list known parties\nquit            save and exit");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtn_core::{Config, PartyDirectory, PartyId};

    fn core(role: Role) -> LinkCore {
        let cfg = Config::default();
        LinkCore::new(role, cfg, PartyDirectory::builtin(cfg.dispatch_capacity)).unwrap()
    }

    #[test]
    fn parses_client_write() {
        assert_eq!(
            parse("write hi there | all good", Role::Client).unwrap(),
            Some(Command::Write(Draft {
                subject: "hi there".into(),
                body: "all good".into(),
                recipient: None,
            }))
        );
        // The body may contain the separator.
        match parse("write s | a | b", Role::Client).unwrap() {
            Some(Command::Write(d)) => assert_eq!(d.body, "a | b"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_server_write() {
        match parse("write test_encrypted_user | s | b", Role::Server).unwrap() {
            Some(Command::Write(d)) => assert_eq!(d.recipient.as_deref(), Some("test_encrypted_user")),
            other => panic!("unexpected {other:?}"),
        }
        match parse("write  | s | b", Role::Server).unwrap() {
            Some(Command::Write(d)) => assert_eq!(d.recipient, None),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            parse("write s | b", Role::Server),
            Err(ParseError::Usage(SERVER_WRITE))
        );
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(parse("   ", Role::Client).unwrap(), None);
        assert_eq!(
            parse("launch", Role::Client),
            Err(ParseError::Unknown("launch".into()))
        );
        assert_eq!(
            parse("login éééžíýššýý", Role::Client).unwrap(),
            Some(Command::Login(Some("éééžíýššýý".into())))
        );
    }

    #[test]
    fn login_on_one_line() {
        let mut core = core(Role::Client);
        let mut console = Console::new();
        // Card 0000000003.
        let reply = console.handle_line(&mut core, "login éééééééééš");
        assert_eq!(reply, Control::Changed("welcome, Test unencrypted user".into()));
        assert_eq!(core.current_party().id(), PartyId(3));
    }

    #[test]
    fn login_then_swipe_across_lines() {
        let mut core = core(Role::Client);
        let mut console = Console::new();
        assert_eq!(
            console.handle_line(&mut core, "login"),
            Control::Reply("swipe your card".into())
        );
        assert!(matches!(console.handle_line(&mut core, "ééééé"), Control::Reply(_)));
        assert!(matches!(console.handle_line(&mut core, "ééééě"), Control::Changed(_)));
        assert_eq!(core.current_party().id(), PartyId(2));
        // Reader disarmed: the next line is a command again.
        assert!(matches!(console.handle_line(&mut core, "logout"), Control::Changed(_)));
    }

    #[test]
    fn commands_still_work_while_waiting_for_card() {
        let mut core = core(Role::Client);
        let mut console = Console::new();
        console.handle_line(&mut core, "login");
        assert_eq!(console.handle_line(&mut core, "quit"), Control::Quit);

        console.handle_line(&mut core, "login");
        console.handle_line(&mut core, "ééé");
        match console.handle_line(&mut core, "help") {
            Control::Reply(text) => assert!(text.contains("write <subject> | <body>")),
            other => panic!("unexpected {other:?}"),
        }
        // The partial read was dropped with the cancel.
        console.handle_line(&mut core, "login");
        assert!(matches!(console.handle_line(&mut core, "éééééééé+"), Control::Reply(_)));
        assert!(core.current_party().is_anonymous());
    }

    #[test]
    fn unknown_card_is_rejected() {
        let mut core = core(Role::Client);
        let mut console = Console::new();
        let reply = console.handle_line(&mut core, "login éééžíýššýý");
        assert!(matches!(reply, Control::Reply(ref s) if s.contains("6973377")));
        assert!(core.current_party().is_anonymous());
    }

    #[test]
    fn server_write_and_no_login() {
        let mut core = core(Role::Server);
        let mut console = Console::new();
        assert!(matches!(
            console.handle_line(&mut core, "write 3 | status | all nominal"),
            Control::Changed(_)
        ));
        assert_eq!(core.outbound().len(), 1);
        assert_eq!(
            console.handle_line(&mut core, "login +"),
            Control::Reply("the server has no card login".into())
        );
        assert_eq!(console.handle_line(&mut core, "quit"), Control::Quit);
    }
}
