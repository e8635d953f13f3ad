use serde::Deserialize;
use serde::Serialize;

use super::Dn;

/// The four change commands carried by the authoritative change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeCommand {
    Add,
    Modify,
    Delete,
    ModRdn,
}

impl ChangeCommand {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'a' => Some(ChangeCommand::Add),
            'm' => Some(ChangeCommand::Modify),
            'd' => Some(ChangeCommand::Delete),
            'r' => Some(ChangeCommand::ModRdn),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            ChangeCommand::Add => 'a',
            ChangeCommand::Modify => 'm',
            ChangeCommand::Delete => 'd',
            ChangeCommand::ModRdn => 'r',
        }
    }
}

/// One authoritative mutation, as announced by the notifier.
///
/// Ids are strictly monotonic within a notifier epoch; the pipeline refuses
/// gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: u64,
    pub dn: Dn,
    pub command: ChangeCommand,
}

/// A notifier announcement. Modern protocol versions carry only the id; the
/// dn/command pair is then resolved from the directory's change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub id: u64,
    pub detail: Option<(Dn, ChangeCommand)>,
}
