//! `open` offers.
//!
//! The body of an `open` frame is a list of `key=value` lines:
//!
//! ```text
//! relp_version=0
//! relp_software=librelp,1.2.16,http://librelp.adiscon.com
//! commands=syslog
//! ```
//!
//! The server requires `relp_version` to match exactly and a non-empty
//! `commands` list made only of commands it supports.

use std::collections::HashMap;

use crate::{RELP_COMMANDS, RELP_VERSION, error::HandshakeError};

/// Parsed `open` offers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Offers {
    entries: HashMap<String, String>,
}

/// Result of a successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// The client's `commands` offer, echoed back verbatim
    pub commands: String,
}

impl Offers {
    /// Parse an `open` body.
    ///
    /// Lines without `=` are kept with an empty value. Later duplicates win.
    pub fn parse(body: &str) -> Self {
        let entries = body
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(|line| match line.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (line.to_string(), String::new()),
            })
            .collect();

        Self { entries }
    }

    /// Value of an offer, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Validate the offers against what this server supports.
    pub fn negotiate(&self) -> Result<Negotiated, HandshakeError> {
        let version = self.get("relp_version");
        if version != Some(RELP_VERSION) {
            return Err(HandshakeError::VersionMismatch {
                required: RELP_VERSION,
                provided: version.map(str::to_string),
            });
        }

        let commands = match self.get("commands") {
            Some(commands) if !commands.is_empty() => commands,
            _ => return Err(HandshakeError::MissingCommands),
        };

        for command in commands.split(',') {
            let command = command.trim().to_lowercase();
            if !RELP_COMMANDS.contains(&command.as_str()) {
                return Err(HandshakeError::UnsupportedCommand(command));
            }
        }

        Ok(Negotiated { commands: commands.to_string() })
    }
}

impl Negotiated {
    /// Body of the positive `open` response.
    pub fn response_body(&self, software: &str) -> String {
        format!(
            "200 OK relp_version={RELP_VERSION}\nrelp_software={software}\ncommands={}",
            self.commands
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offer_lines() {
        let offers = Offers::parse("relp_version=0\nrelp_software=librelp,1.2.16,x=y\ncommands=syslog");

        assert_eq!(offers.get("relp_version"), Some("0"));
        assert_eq!(offers.get("relp_software"), Some("librelp,1.2.16,x=y"));
        assert_eq!(offers.get("commands"), Some("syslog"));
        assert_eq!(offers.get("missing"), None);
    }

    #[test]
    fn accepts_supported_commands() {
        let offers = Offers::parse("relp_version=0\ncommands= Syslog ,close");
        let negotiated = offers.negotiate().unwrap();

        assert_eq!(negotiated.commands, " Syslog ,close");
        assert_eq!(
            negotiated.response_body("sw"),
            "200 OK relp_version=0\nrelp_software=sw\ncommands= Syslog ,close"
        );
    }

    #[test]
    fn rejects_wrong_version() {
        let err = Offers::parse("relp_version=1\ncommands=syslog").negotiate().unwrap_err();

        assert_eq!(
            err,
            HandshakeError::VersionMismatch { required: "0", provided: Some("1".to_string()) }
        );
        assert_eq!(err.to_string(), "Insufficient version\n0 required, 1 provided");
    }

    #[test]
    fn rejects_missing_version() {
        let err = Offers::parse("commands=syslog").negotiate().unwrap_err();
        assert_eq!(err.to_string(), "Insufficient version\n0 required, none provided");
    }

    #[test]
    fn rejects_missing_commands() {
        assert_eq!(
            Offers::parse("relp_version=0").negotiate(),
            Err(HandshakeError::MissingCommands)
        );
        assert_eq!(
            Offers::parse("relp_version=0\ncommands=").negotiate(),
            Err(HandshakeError::MissingCommands)
        );
    }

    #[test]
    fn names_first_unsupported_command() {
        let err =
            Offers::parse("relp_version=0\ncommands=syslog,starttls,foo").negotiate().unwrap_err();

        assert_eq!(err, HandshakeError::UnsupportedCommand("starttls".to_string()));
        assert_eq!(err.to_string(), "Invalid command\nstarttls is not supported");
    }
}
