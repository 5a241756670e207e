use std::str::FromStr;

/// Host feedback received on the feedback topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `ENTRADA_OK`: the host recorded an entry.
    EntryAck,
    /// `SAIDA_OK`: the host recorded an exit.
    ExitAck,
    /// `ERRO`
    Error,
    /// `AGUARDANDO`
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let cmd = if token.eq_ignore_ascii_case("ENTRADA_OK") {
            Command::EntryAck
        } else if token.eq_ignore_ascii_case("SAIDA_OK") {
            Command::ExitAck
        } else if token.eq_ignore_ascii_case("ERRO") {
            Command::Error
        } else if token.eq_ignore_ascii_case("AGUARDANDO") {
            Command::Waiting
        } else {
            return Err(UnknownCommand(token.to_owned()));
        };
        Ok(cmd)
    }
}

impl Command {
    /// Parse a raw payload; non-UTF-8 payloads are unknown commands.
    pub fn from_payload(payload: &[u8]) -> Result<Self, UnknownCommand> {
        match std::str::from_utf8(payload) {
            Ok(s) => s.parse(),
            Err(_) => Err(UnknownCommand(String::from_utf8_lossy(payload).into_owned())),
        }
    }
}
