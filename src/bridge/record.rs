use std::fmt;
use std::str::FromStr;

use crate::Result;
use crate::engine::TransportFailure;
use crate::error::Error;

pub const STATUS_PREFIX: &str = "STATUS:";
pub const ERROR_PREFIX: &str = "ERROR:";

/// Outcome the worker leaves in the result file.
///
/// `STATUS:<code>,<body>` on a completed exchange, `ERROR:<json failure>`
/// when the transport failed.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BridgeRecord {
    Status { code: u16, body: String },
    Error(TransportFailure),
}

impl BridgeRecord {
    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            BridgeRecord::Status { code, body } => format!("{STATUS_PREFIX}{code},{body}"),
            BridgeRecord::Error(failure) => {
                format!("{ERROR_PREFIX}{}", serde_json::to_string(failure)?)
            }
        })
    }

    pub fn parse(text: &str) -> Result<BridgeRecord> {
        if let Some(rest) = text.strip_prefix(STATUS_PREFIX) {
            let (code, body) = rest.split_once(',').unwrap_or((rest, ""));
            let code = code
                .trim()
                .parse::<u16>()
                .map_err(|e| Error::validation(format!("invalid status in bridge record: {e}")))?;
            return Ok(BridgeRecord::Status {
                code,
                body: body.to_owned(),
            });
        }

        if let Some(rest) = text.strip_prefix(ERROR_PREFIX) {
            // A worker that could not serialize its failure still leaves text.
            let failure = serde_json::from_str::<TransportFailure>(rest)
                .unwrap_or_else(|_| TransportFailure::new(rest));
            return Ok(BridgeRecord::Error(failure));
        }

        let preview: String = text.chars().take(32).collect();
        Err(Error::validation(format!(
            "bridge record has no known prefix: `{preview}`"
        )))
    }
}

impl fmt::Display for BridgeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeRecord::Status { code, body } => {
                write!(f, "status {code} ({} body bytes)", body.len())
            }
            BridgeRecord::Error(failure) => write!(f, "error: {failure}"),
        }
    }
}

impl FromStr for BridgeRecord {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BridgeRecord::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;

    #[test]
    fn status_body_may_contain_commas() {
        let record = BridgeRecord::parse(r#"STATUS:200,{"rooms":[1,2,3]}"#).unwrap();
        assert_eq!(
            record,
            BridgeRecord::Status {
                code: 200,
                body: r#"{"rooms":[1,2,3]}"#.to_owned(),
            }
        );
    }

    #[test]
    fn status_without_body() {
        let record: BridgeRecord = "STATUS:204".parse().unwrap();
        assert_eq!(
            record,
            BridgeRecord::Status {
                code: 204,
                body: String::new(),
            }
        );
    }

    #[test]
    fn error_record_carries_failure() {
        let failure = TransportFailure {
            message: "connection refused".to_owned(),
            trace: "connection refused\ncaused by: os error 111".to_owned(),
        };
        let encoded = BridgeRecord::Error(failure.clone()).encode().unwrap();

        assert!(encoded.starts_with(ERROR_PREFIX));
        assert_eq!(BridgeRecord::parse(&encoded).unwrap(), BridgeRecord::Error(failure));
    }

    #[test]
    fn error_record_with_plain_text() {
        let record = BridgeRecord::parse("ERROR:worker panicked").unwrap();
        assert_eq!(
            record,
            BridgeRecord::Error(TransportFailure::new("worker panicked"))
        );
    }

    #[test]
    fn rejects_unknown_prefix_and_bad_status() {
        assert_eq!(
            BridgeRecord::parse("HELLO").unwrap_err().kind(),
            Kind::Validation
        );
        assert_eq!(
            BridgeRecord::parse("STATUS:abc,body").unwrap_err().kind(),
            Kind::Validation
        );
    }
}
