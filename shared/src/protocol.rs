//! Tunnel-manager line protocol
//!
//! One command per newline-terminated ASCII line, whitespace tokenized:
//!
//! ```text
//! tunnel <id> mm-tunnelclient|mm-tunnelserver <args...>   spawn, track under <id>
//! tunnel <id> python <line>                                forward <line> to child <id>
//! tunnel <id> readline                                     reply with one line of child <id>
//! tunnel <id> halt                                         kill child <id> and forget it
//! prompt <text>                                            set logging label
//! halt                                                     kill all children, exit 0
//! ```
//!
//! Only `readline` produces a reply. The manager announces itself with
//! [`READY_LINE`] before reading its first command.

use std::fmt;

use crate::errors::{SharedError, SharedResult};

/// Unsolicited line written by a tunnel manager once it accepts commands
pub const READY_LINE: &str = "tunnel manager is running";

/// Marker a tunnel client prints once its server accepted the connection
pub const CONNECTED_MARKER: &str = "got connection";

/// Tunnel endpoint binaries a manager is allowed to spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelProgram {
    Client,
    Server,
}

impl TunnelProgram {
    pub fn binary(self) -> &'static str {
        match self {
            TunnelProgram::Client => "mm-tunnelclient",
            TunnelProgram::Server => "mm-tunnelserver",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "mm-tunnelclient" => Some(TunnelProgram::Client),
            "mm-tunnelserver" => Some(TunnelProgram::Server),
            _ => None,
        }
    }
}

/// A parsed tunnel-manager command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelCommand {
    Start {
        id: u32,
        program: TunnelProgram,
        args: Vec<String>,
    },
    Forward {
        id: u32,
        line: String,
    },
    ReadLine {
        id: u32,
    },
    Stop {
        id: u32,
    },
    Prompt(String),
    Halt,
}

impl TunnelCommand {
    /// Parse one input line
    pub fn parse(line: &str) -> SharedResult<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = tokens.first() else {
            return Err(SharedError::protocol("empty command"));
        };

        match head {
            "tunnel" => Self::parse_tunnel(line, &tokens),
            "prompt" => {
                let text = rest_after(line, 1);
                if text.is_empty() {
                    return Err(SharedError::protocol("usage: prompt PROMPT"));
                }
                Ok(TunnelCommand::Prompt(text.to_string()))
            }
            "halt" => {
                if tokens.len() != 1 {
                    return Err(SharedError::protocol("usage: halt"));
                }
                Ok(TunnelCommand::Halt)
            }
            _ => Err(SharedError::protocol(format!("unknown command: {}", line.trim()))),
        }
    }

    fn parse_tunnel(line: &str, tokens: &[&str]) -> SharedResult<Self> {
        if tokens.len() < 3 {
            return Err(SharedError::protocol("not enough arguments; usage: tunnel ID CMD..."));
        }

        let id = match tokens[1].parse::<u32>() {
            Ok(id) if id > 0 => id,
            _ => {
                return Err(SharedError::protocol(format!(
                    "tunnel id must be a positive integer, got {:?}; usage: tunnel ID CMD...",
                    tokens[1]
                )))
            }
        };

        if let Some(program) = TunnelProgram::from_token(tokens[2]) {
            let args = tokens[3..].iter().map(|t| t.to_string()).collect();
            return Ok(TunnelCommand::Start { id, program, args });
        }

        match tokens[2] {
            "python" => {
                let forwarded = rest_after(line, 3);
                if forwarded.is_empty() {
                    return Err(SharedError::protocol("usage: tunnel ID python LINE"));
                }
                Ok(TunnelCommand::Forward {
                    id,
                    line: forwarded.to_string(),
                })
            }
            "readline" => {
                if tokens.len() != 3 {
                    return Err(SharedError::protocol("usage: tunnel ID readline"));
                }
                Ok(TunnelCommand::ReadLine { id })
            }
            "halt" => {
                if tokens.len() != 3 {
                    return Err(SharedError::protocol("usage: tunnel ID halt"));
                }
                Ok(TunnelCommand::Stop { id })
            }
            _ => Err(SharedError::protocol(format!(
                "unknown command after \"tunnel ID\": {}",
                rest_after(line, 2)
            ))),
        }
    }

    /// Whether the manager answers this command with a line
    pub fn expects_reply(&self) -> bool {
        matches!(self, TunnelCommand::ReadLine { .. })
    }

    pub fn tunnel_id(&self) -> Option<u32> {
        match self {
            TunnelCommand::Start { id, .. }
            | TunnelCommand::Forward { id, .. }
            | TunnelCommand::ReadLine { id }
            | TunnelCommand::Stop { id } => Some(*id),
            TunnelCommand::Prompt(_) | TunnelCommand::Halt => None,
        }
    }
}

impl fmt::Display for TunnelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelCommand::Start { id, program, args } => {
                write!(f, "tunnel {id} {}", program.binary())?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            TunnelCommand::Forward { id, line } => write!(f, "tunnel {id} python {line}"),
            TunnelCommand::ReadLine { id } => write!(f, "tunnel {id} readline"),
            TunnelCommand::Stop { id } => write!(f, "tunnel {id} halt"),
            TunnelCommand::Prompt(text) => write!(f, "prompt {text}"),
            TunnelCommand::Halt => write!(f, "halt"),
        }
    }
}

/// Text following the first `n` whitespace-separated tokens, without the
/// line terminator
fn rest_after(line: &str, n: usize) -> &str {
    let mut rest = line.trim_end_matches(['\n', '\r']);
    for _ in 0..n {
        rest = rest.trim_start();
        match rest.find(char::is_whitespace) {
            Some(end) => rest = &rest[end..],
            None => return "",
        }
    }
    rest.trim_start()
}
