// secure_chat/shared_crypto/src/models.rs

//! Wire records exchanged between client and server.
//!
//! Every record is one line of ASCII text. Control records start with a
//! keyword followed by whitespace separated integers; during the message
//! phase a record is a bare ciphertext integer, and an empty line closes the
//! current message.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// One parsed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// `CA <e> <n>`: the CA public key, in the clear.
    CaKey { e: u64, n: u64 },
    /// `PUBLIC_KEY <e'> <n'>`: the server public key signed by the CA.
    PublicKey { e: u64, n: u64 },
    /// `ACK <code>`.
    Ack(u32),
    /// `NONCE <value>`: the session nonce under the server public key.
    Nonce(u64),
    /// `<integer>`: one encrypted character.
    CipherChar(u64),
    /// Empty line: end of the current message.
    EndOfMessage,
}

impl Record {
    /// Short name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Record::CaKey { .. } => "CA",
            Record::PublicKey { .. } => "PUBLIC_KEY",
            Record::Ack(_) => "ACK",
            Record::Nonce(_) => "NONCE",
            Record::CipherChar(_) => "cipher character",
            Record::EndOfMessage => "end-of-message",
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::CaKey { e, n } => write!(f, "CA {} {}", e, n),
            Record::PublicKey { e, n } => write!(f, "PUBLIC_KEY {} {}", e, n),
            Record::Ack(code) => write!(f, "ACK {}", code),
            Record::Nonce(value) => write!(f, "NONCE {}", value),
            Record::CipherChar(value) => write!(f, "{}", value),
            Record::EndOfMessage => Ok(()),
        }
    }
}

impl FromStr for Record {
    type Err = ProtocolError;

    /// Parses a line with its terminator already removed. Carriage returns
    /// are ignored wherever they appear.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line: String = line.chars().filter(|&c| c != '\r').collect();
        let mut tokens = line.split_whitespace();
        let Some(head) = tokens.next() else {
            return Ok(Record::EndOfMessage);
        };
        let args: Vec<&str> = tokens.collect();

        match head {
            "CA" => {
                let [e, n] = integers::<2>("CA", &args)?;
                Ok(Record::CaKey { e, n })
            }
            "PUBLIC_KEY" => {
                let [e, n] = integers::<2>("PUBLIC_KEY", &args)?;
                Ok(Record::PublicKey { e, n })
            }
            "ACK" => {
                let [code] = integers::<1>("ACK", &args)?;
                let code =
                    u32::try_from(code).map_err(|_| ProtocolError::InvalidInteger(args[0].to_string()))?;
                Ok(Record::Ack(code))
            }
            "NONCE" => {
                let [value] = integers::<1>("NONCE", &args)?;
                Ok(Record::Nonce(value))
            }
            _ if args.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) => head
                .parse()
                .map(Record::CipherChar)
                .map_err(|_| ProtocolError::InvalidInteger(head.to_string())),
            _ => Err(ProtocolError::UnknownRecord(line.clone())),
        }
    }
}

fn integers<const N: usize>(keyword: &'static str, args: &[&str]) -> Result<[u64; N], ProtocolError> {
    if args.len() != N {
        return Err(ProtocolError::MalformedRecord {
            keyword,
            expected: N,
            got: args.len(),
        });
    }
    let mut values = [0u64; N];
    for (slot, token) in values.iter_mut().zip(args) {
        *slot = token
            .parse()
            .map_err(|_| ProtocolError::InvalidInteger(token.to_string()))?;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_records() {
        assert_eq!("CA 5003 120853".parse::<Record>().unwrap(), Record::CaKey { e: 5003, n: 120853 });
        assert_eq!(
            "PUBLIC_KEY 17 3233".parse::<Record>().unwrap(),
            Record::PublicKey { e: 17, n: 3233 }
        );
        assert_eq!("ACK 226".parse::<Record>().unwrap(), Record::Ack(226));
        assert_eq!("NONCE 4242".parse::<Record>().unwrap(), Record::Nonce(4242));
    }

    #[test]
    fn test_parse_message_records() {
        assert_eq!("2790".parse::<Record>().unwrap(), Record::CipherChar(2790));
        assert_eq!("".parse::<Record>().unwrap(), Record::EndOfMessage);
        assert_eq!("\r".parse::<Record>().unwrap(), Record::EndOfMessage);
    }

    #[test]
    fn test_carriage_returns_are_ignored() {
        assert_eq!("ACK 220\r".parse::<Record>().unwrap(), Record::Ack(220));
        assert_eq!("27\r90".parse::<Record>().unwrap(), Record::CipherChar(2790));
    }

    #[test]
    fn test_missing_ca_modulus_is_malformed() {
        let err = "CA 123".parse::<Record>().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedRecord { keyword: "CA", expected: 2, got: 1 }
        ));
    }

    #[test]
    fn test_extra_argument_is_malformed() {
        let err = "ACK 226 1".parse::<Record>().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedRecord { keyword: "ACK", expected: 1, got: 2 }
        ));
    }

    #[test]
    fn test_non_numeric_arguments() {
        assert!(matches!(
            "NONCE abc".parse::<Record>(),
            Err(ProtocolError::InvalidInteger(token)) if token == "abc"
        ));
        assert!(matches!(
            "PUBLIC_KEY -5 10".parse::<Record>(),
            Err(ProtocolError::InvalidInteger(_))
        ));
        assert!(matches!(
            "99999999999999999999999".parse::<Record>(),
            Err(ProtocolError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_unknown_record() {
        assert!(matches!("HELLO 1".parse::<Record>(), Err(ProtocolError::UnknownRecord(_))));
        assert!(matches!("12 34".parse::<Record>(), Err(ProtocolError::UnknownRecord(_))));
    }

    #[test]
    fn test_display_matches_wire_format() {
        assert_eq!(Record::CaKey { e: 7, n: 143 }.to_string(), "CA 7 143");
        assert_eq!(Record::PublicKey { e: 1, n: 2 }.to_string(), "PUBLIC_KEY 1 2");
        assert_eq!(Record::Ack(220).to_string(), "ACK 220");
        assert_eq!(Record::Nonce(9).to_string(), "NONCE 9");
        assert_eq!(Record::CipherChar(2790).to_string(), "2790");
        assert_eq!(Record::EndOfMessage.to_string(), "");
    }
}
