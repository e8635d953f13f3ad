//! Wire format of the notifier protocol.
//!
//! One message per line. Client to server: `<msg_id>\t<command>[\t<arg>]`.
//! Server to client: `<msg_id>\t<payload>`. A `GET_ID` payload is either
//! `<id>\t<dn>\t<command_char>` (legacy servers) or bare `<id>` (modern
//! servers, details come from the directory change log); the client detects
//! the version from the shape of the first reply. A payload starting with
//! `ERROR` reports a semantic failure for the request, e.g. an id below the
//! server's retention window.

use crate::model::Announcement;
use crate::model::ChangeCommand;
use crate::model::Dn;
use crate::NotifierError;
use crate::Result;

/// Protocol variant, detected from the first `GET_ID` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// `GET_ID` replies carry dn and command inline.
    Legacy,
    /// `GET_ID` replies carry only the id.
    Modern,
}

pub fn format_request(
    msg_id: u32,
    command: &str,
    arg: Option<&str>,
) -> String {
    match arg {
        Some(arg) => format!("{msg_id}\t{command}\t{arg}\n"),
        None => format!("{msg_id}\t{command}\n"),
    }
}

/// Splits a reply line into message id and payload.
pub fn parse_reply(line: &str) -> Result<(u32, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (msg_id, payload) = line
        .split_once('\t')
        .ok_or_else(|| NotifierError::Desync(format!("unframed reply {line:?}")))?;
    let msg_id = msg_id
        .parse::<u32>()
        .map_err(|_| NotifierError::Desync(format!("bad message id in {line:?}")))?;
    Ok((msg_id, payload))
}

/// Parses a `GET_ID` payload; `requested` is the id the request asked for
/// and is only used for error reporting.
pub fn parse_announcement(
    payload: &str,
    requested: u64,
) -> Result<(Announcement, ProtocolVersion)> {
    if payload.starts_with("ERROR") {
        return Err(NotifierError::BelowRetention(requested).into());
    }

    let fields: Vec<&str> = payload.split('\t').collect();
    let id = fields[0]
        .parse::<u64>()
        .map_err(|_| NotifierError::Desync(format!("bad transaction id in {payload:?}")))?;

    match fields.as_slice() {
        [_] => Ok((Announcement { id, detail: None }, ProtocolVersion::Modern)),
        [_, dn, command] => {
            let mut chars = command.chars();
            let command = chars
                .next()
                .and_then(ChangeCommand::from_char)
                .filter(|_| chars.next().is_none())
                .ok_or_else(|| {
                    NotifierError::Desync(format!("bad command char in {payload:?}"))
                })?;
            Ok((
                Announcement {
                    id,
                    detail: Some((Dn::new(dn), command)),
                },
                ProtocolVersion::Legacy,
            ))
        }
        _ => Err(NotifierError::Desync(format!("bad GET_ID payload {payload:?}")).into()),
    }
}

/// Parses a `GET_SCHEMA_ID` payload.
pub fn parse_schema_id(payload: &str) -> Result<u64> {
    payload
        .trim()
        .parse::<u64>()
        .map_err(|_| NotifierError::Desync(format!("bad schema id {payload:?}")).into())
}
