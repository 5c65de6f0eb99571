//! Request, response and field-name grammar.
//!
//! Requests: `GET <field>` and `PUT <field> <value>`, single spaces, exact
//! token counts. Responses: `<field>=<value>`, or the literal `FAIL`.
//! A field may carry a four-hex-digit mesh address prefix, `00a1:rgb`.

use std::fmt;

use crate::serial::error::{FieldParseError, TransportError};

/// A field name, optionally qualified with the mesh address of the device
/// it belongs to. Unqualified names address the serving node itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldName {
    pub addr: Option<u16>,
    pub name: String,
}

impl FieldName {
    pub fn local(name: &str) -> Self {
        Self {
            addr: None,
            name: name.to_string(),
        }
    }

    pub fn addressed(addr: u16, name: &str) -> Self {
        Self {
            addr: Some(addr),
            name: name.to_string(),
        }
    }

    /// Strict parse; the exact inverse of `to_string`.
    pub fn parse(s: &str) -> Result<Self, FieldParseError> {
        if s.is_empty() {
            return Err(FieldParseError::Empty);
        }
        if s.bytes().any(|b| b.is_ascii_whitespace()) {
            return Err(FieldParseError::EmbeddedSeparator(s.to_string()));
        }
        match s.split_once(':') {
            None => Ok(Self::local(s)),
            Some((prefix, name)) => {
                if prefix.len() != 4 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(FieldParseError::MalformedAddress(s.to_string()));
                }
                if name.is_empty() {
                    return Err(FieldParseError::Empty);
                }
                let addr = u16::from_str_radix(prefix, 16)
                    .map_err(|_| FieldParseError::MalformedAddress(s.to_string()))?;
                Ok(Self {
                    addr: Some(addr),
                    name: name.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            Some(addr) => write!(f, "{:04x}:{}", addr, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A command frame sent toward the serving node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialRequest {
    Get { field: FieldName },
    Put { field: FieldName, value: String },
}

impl SerialRequest {
    pub fn parse(frame: &str) -> Result<Self, TransportError> {
        let mut tokens = frame.split(' ');
        let command = tokens
            .next()
            .ok_or_else(|| TransportError::MalformedFrame(frame.to_string()))?;
        match command {
            "GET" => {
                let field = tokens
                    .next()
                    .ok_or_else(|| TransportError::MalformedFrame(frame.to_string()))?;
                if tokens.next().is_some() {
                    return Err(TransportError::MalformedFrame(frame.to_string()));
                }
                Ok(Self::Get {
                    field: FieldName::parse(field)?,
                })
            }
            "PUT" => {
                let field = tokens
                    .next()
                    .ok_or_else(|| TransportError::MalformedFrame(frame.to_string()))?;
                let value = tokens
                    .next()
                    .ok_or_else(|| TransportError::MalformedFrame(frame.to_string()))?;
                if tokens.next().is_some() {
                    return Err(TransportError::MalformedFrame(frame.to_string()));
                }
                Ok(Self::Put {
                    field: FieldName::parse(field)?,
                    value: value.to_string(),
                })
            }
            _ => Err(TransportError::MalformedFrame(frame.to_string())),
        }
    }
}

impl fmt::Display for SerialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get { field } => write!(f, "GET {field}"),
            Self::Put { field, value } => write!(f, "PUT {field} {value}"),
        }
    }
}

/// A frame sent back toward the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialResponse {
    Value { field: FieldName, value: String },
    Fail,
}

impl SerialResponse {
    pub fn parse(frame: &str) -> Result<Self, TransportError> {
        if frame == "FAIL" {
            return Ok(Self::Fail);
        }
        let (field, value) = frame
            .split_once('=')
            .ok_or_else(|| TransportError::MalformedFrame(frame.to_string()))?;
        Ok(Self::Value {
            field: FieldName::parse(field)?,
            value: value.to_string(),
        })
    }
}

impl fmt::Display for SerialResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value { field, value } => write!(f, "{field}={value}"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_name_with_address_prefix() {
        let field = FieldName::parse("00a1:rgb").unwrap();
        assert_eq!(field.addr, Some(0x00a1));
        assert_eq!(field.name, "rgb");
        assert_eq!(field.to_string(), "00a1:rgb");
    }

    #[test]
    fn test_field_name_without_prefix() {
        let field = FieldName::parse("rgb").unwrap();
        assert_eq!(field.addr, None);
        assert_eq!(field.to_string(), "rgb");
    }

    #[test]
    fn test_field_name_rejects_malformed() {
        assert_eq!(
            FieldName::parse("0a1:rgb"),
            Err(FieldParseError::MalformedAddress("0a1:rgb".to_string()))
        );
        assert_eq!(FieldName::parse(""), Err(FieldParseError::Empty));
        assert_eq!(FieldName::parse("00a1:"), Err(FieldParseError::Empty));
        assert!(matches!(
            FieldName::parse("rg b"),
            Err(FieldParseError::EmbeddedSeparator(_))
        ));
        assert!(matches!(
            FieldName::parse("zzzz:rgb"),
            Err(FieldParseError::MalformedAddress(_))
        ));
    }

    #[test]
    fn test_request_round_trip() {
        for frame in ["GET 00a1:rgb", "GET loc", "PUT 00a1:rgb ff00aa", "PUT onoff ON"] {
            let request = SerialRequest::parse(frame).unwrap();
            assert_eq!(request.to_string(), frame);
        }
    }

    #[test]
    fn test_request_rejects_wrong_token_count() {
        assert!(SerialRequest::parse("GET").is_err());
        assert!(SerialRequest::parse("GET rgb extra").is_err());
        assert!(SerialRequest::parse("PUT rgb").is_err());
        assert!(SerialRequest::parse("PUT rgb ff00aa extra").is_err());
        assert!(SerialRequest::parse("STATUS rgb").is_err());
        assert!(SerialRequest::parse("").is_err());
    }

    #[test]
    fn test_response_round_trip() {
        let response = SerialResponse::parse("00a1:rgb=ff00aa").unwrap();
        assert_eq!(
            response,
            SerialResponse::Value {
                field: FieldName::addressed(0x00a1, "rgb"),
                value: "ff00aa".to_string(),
            }
        );
        assert_eq!(response.to_string(), "00a1:rgb=ff00aa");
        assert_eq!(SerialResponse::parse("FAIL").unwrap(), SerialResponse::Fail);
        assert!(SerialResponse::parse("no-equals-here").is_err());
    }
}
