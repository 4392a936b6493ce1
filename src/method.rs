//! HTTP method as a typed enum.
//!
//! Covers the RFC 9110 standard methods. Anything else (WebDAV, `PURGE`,
//! extension methods) is rejected by the router with
//! `405 Method Not Allowed` before it ever reaches a handler.

use std::fmt;
use std::str::FromStr;

/// A known HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
        }
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            _         => Err(()),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_methods_case_sensitively() {
        assert_eq!("PATCH".parse::<Method>(), Ok(Method::Patch));
        assert_eq!("patch".parse::<Method>(), Err(()));
        assert_eq!(Method::try_from(&http::Method::DELETE), Ok(Method::Delete));
    }

    #[test]
    fn rejects_extension_methods() {
        let purge = http::Method::from_bytes(b"PURGE").unwrap();
        assert_eq!(Method::try_from(&purge), Err(()));
    }
}
