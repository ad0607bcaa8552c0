//! Plain-text rendering of dispatches for the console and for printing.

use crate::dispatch::Dispatch;
use crate::message::Message;
use crate::party::Party;

/// Body wrap width in columns.
pub const WRAP_WIDTH: usize = 70;

/// How parties are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyLabel {
    Id,
    NameAndId,
}

impl PartyLabel {
    fn label(&self, party: &Party) -> String {
        match self {
            PartyLabel::Id => party.id().to_string(),
            PartyLabel::NameAndId => party.to_string(),
        }
    }
}

pub fn render_dispatch(dispatch: &Dispatch, label: PartyLabel) -> String {
    dispatch
        .messages()
        .iter()
        .map(|m| render_message(m, label))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One message as a bordered record.
pub fn render_message(message: &Message, label: PartyLabel) -> String {
    let mut lines = vec![
        format!("Sender: {}", label.label(message.sender())),
        format!("Recipient: {}", label.label(message.recipient())),
        format!("Subject: {}", message.subject()),
        format!(
            "Time added: {}",
            message.created_at().format("%Y-%m-%d %H:%M:%S UTC")
        ),
        String::new(),
    ];
    lines.extend(wrap(message.body(), WRAP_WIDTH));

    let inner = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .max(WRAP_WIDTH);
    let border = format!("+{}+", "-".repeat(inner + 2));
    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    for line in &lines {
        let pad = inner - line.chars().count();
        out.push_str(&format!("| {}{} |\n", line, " ".repeat(pad)));
    }
    out.push_str(&border);
    out.push('\n');
    out
}

/// Greedy word wrap. Words longer than `width` (encoded bodies, mostly)
/// are split hard.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_len = 0usize;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            if word.is_empty() {
                continue;
            }
            if line_len > 0 && line_len + 1 + word.len() > width {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line_len += word.len();
            line.extend(word);
        }
        lines.push(line);
    }
    lines
}
