//! Request line parsing and object identifier classification.

use crate::catalog::AddressFamily;
use crate::error::{CoreError, Result};
use ipnet::IpNet;
use std::net::IpAddr;

/// Flag reference written back to clients after a usage error.
pub const USAGE: &str = "  -q string\n    \t[version|sources|types] query specified server info\n";

/// One object identifier, normalised into every form the catalog inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedQuery {
    token: String,
    upper: String,
    lower: String,
    address: Option<IpAddr>,
}

impl ClassifiedQuery {
    /// Object token: the final path segment of the identifier.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn upper(&self) -> &str {
        &self.upper
    }

    #[must_use]
    pub fn lower(&self) -> &str {
        &self.lower
    }

    /// Parsed address, if the identifier is an IP address or CIDR block.
    ///
    /// For a CIDR block this is the address part as written, not the network base.
    #[must_use]
    pub const fn address(&self) -> Option<IpAddr> {
        self.address
    }

    #[must_use]
    pub const fn family(&self) -> Option<AddressFamily> {
        match self.address {
            Some(IpAddr::V4(_)) => Some(AddressFamily::V4),
            Some(IpAddr::V6(_)) => Some(AddressFamily::V6),
            None => None,
        }
    }
}

/// Classify a single object identifier.
///
/// Never fails: an identifier that is neither an address nor a CIDR block simply
/// carries no address.
#[must_use]
pub fn classify(arg: &str) -> ClassifiedQuery {
    let token = base_name(arg);
    ClassifiedQuery {
        token: token.to_owned(),
        upper: token.to_uppercase(),
        lower: token.to_lowercase(),
        address: parse_address(token, arg),
    }
}

/// Final `/`-separated segment, ignoring trailing slashes.
fn base_name(arg: &str) -> &str {
    if arg.is_empty() {
        return ".";
    }
    let trimmed = arg.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

fn parse_address(token: &str, arg: &str) -> Option<IpAddr> {
    let addr = token
        .parse::<IpAddr>()
        .ok()
        .or_else(|| arg.parse::<IpNet>().ok().map(|net| net.addr()))?;

    // IPv4-mapped IPv6 addresses are looked up as IPv4.
    Some(match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 @ IpAddr::V4(_) => v4,
    })
}

/// Server information directive selected with `-q`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerInfo {
    Version,
    Sources,
    Types,
    /// Anything else; answered with an "unknown option" line.
    Unknown(String),
}

impl ServerInfo {
    fn parse(value: &str) -> Self {
        match value {
            "version" => Self::Version,
            "sources" => Self::Sources,
            "types" => Self::Types,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    server_info: Option<ServerInfo>,
    objects: Vec<ClassifiedQuery>,
}

impl Request {
    /// Parse one request line (the trailing newline may or may not be present).
    ///
    /// Leading flags are consumed until the first non-flag word or `--`; every
    /// remaining word is classified as an object identifier.
    pub fn parse(line: &str) -> Result<Self> {
        let words = split_words(line.trim());
        let mut server_info = None;
        let mut idx = 0;

        while let Some(word) = words.get(idx) {
            if word.len() < 2 || !word.starts_with('-') {
                break;
            }
            idx += 1;

            let name = match word.strip_prefix("--") {
                Some("") => break,
                Some(name) => name,
                None => &word[1..],
            };
            if name.is_empty() || name.starts_with('-') || name.starts_with('=') {
                return Err(CoreError::BadSyntax(word.clone()));
            }

            let (name, inline) = match name.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (name, None),
            };

            match name {
                "q" => {
                    let value = match inline {
                        Some(value) => value,
                        None => {
                            let value = words
                                .get(idx)
                                .ok_or_else(|| CoreError::MissingValue(name.to_owned()))?;
                            idx += 1;
                            value.as_str()
                        }
                    };
                    server_info = (!value.is_empty()).then(|| ServerInfo::parse(value));
                }
                "h" | "help" => return Err(CoreError::HelpRequested),
                other => return Err(CoreError::UnknownFlag(other.to_owned())),
            }
        }

        let objects = words[idx..]
            .iter()
            .map(|arg| arg.trim())
            .filter(|arg| !arg.is_empty())
            .map(classify)
            .collect();

        Ok(Self {
            server_info,
            objects,
        })
    }

    #[must_use]
    pub const fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    #[must_use]
    pub fn objects(&self) -> &[ClassifiedQuery] {
        &self.objects
    }
}

/// Split on single spaces, joining `'…'` and `"…"` quoted runs into one word.
///
/// Empty words are dropped. An unterminated quote runs to the end of the line.
#[must_use]
pub fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut quoted: Option<(char, String)> = None;

    for part in line.split(' ') {
        match quoted.take() {
            None => {
                let Some(quote) = part.chars().next().filter(|c| matches!(c, '\'' | '"')) else {
                    if !part.is_empty() {
                        words.push(part.to_owned());
                    }
                    continue;
                };
                let rest = &part[1..];
                match rest.strip_suffix(quote) {
                    Some(inner) => words.push(inner.to_owned()),
                    None => quoted = Some((quote, rest.to_owned())),
                }
            }
            Some((quote, mut block)) => {
                block.push(' ');
                if let Some(last) = part.strip_suffix(quote) {
                    block.push_str(last);
                    words.push(block);
                } else {
                    block.push_str(part);
                    quoted = Some((quote, block));
                }
            }
        }
    }

    if let Some((_, block)) = quoted {
        words.push(block);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_classify_name() {
        let query = classify("Foo-MNT");
        assert_eq!(query.token(), "Foo-MNT");
        assert_eq!(query.upper(), "FOO-MNT");
        assert_eq!(query.lower(), "foo-mnt");
        assert_eq!(query.address(), None);
        assert_eq!(query.family(), None);
    }

    #[test]
    fn test_classify_strips_path_prefix() {
        let query = classify("data/mntner/foo-mnt");
        assert_eq!(query.token(), "foo-mnt");
        assert_eq!(classify("aut-num/AS4242420000/").upper(), "AS4242420000");
        assert_eq!(classify("/").token(), "/");
    }

    #[test]
    fn test_classify_ipv4() {
        let query = classify("172.23.136.1");
        assert_eq!(
            query.address(),
            Some(IpAddr::V4(Ipv4Addr::new(172, 23, 136, 1)))
        );
        assert_eq!(query.family(), Some(AddressFamily::V4));
    }

    #[test]
    fn test_classify_ipv6() {
        let query = classify("fd42:4242:2601::1");
        assert_eq!(query.family(), Some(AddressFamily::V6));
    }

    #[test]
    fn test_classify_cidr_keeps_written_address() {
        // The token is "23" here; the address comes from the whole argument.
        let query = classify("172.23.136.1/23");
        assert_eq!(query.token(), "23");
        assert_eq!(
            query.address(),
            Some(IpAddr::V4(Ipv4Addr::new(172, 23, 136, 1)))
        );

        let query = classify("fd42:d42:d42::/48");
        assert_eq!(
            query.address(),
            Some(IpAddr::V6("fd42:d42:d42::".parse::<Ipv6Addr>().unwrap()))
        );
    }

    #[test]
    fn test_classify_mapped_ipv4() {
        let query = classify("::ffff:172.20.0.1");
        assert_eq!(query.family(), Some(AddressFamily::V4));
        assert_eq!(
            query.address(),
            Some(IpAddr::V4(Ipv4Addr::new(172, 20, 0, 1)))
        );
    }

    #[test]
    fn test_classify_garbage_has_no_address() {
        assert_eq!(classify("300.1.1.1").address(), None);
        assert_eq!(classify("10.0.0.0/33").address(), None);
        assert_eq!(classify("").token(), ".");
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("a b  c"), ["a", "b", "c"]);
        assert_eq!(split_words("-q 'a b' c"), ["-q", "a b", "c"]);
        assert_eq!(split_words("\"one\" two"), ["one", "two"]);
        assert_eq!(split_words("'open ended"), ["open ended"]);
    }

    #[test]
    fn test_parse_objects() {
        let request = Request::parse("AS4242420000 foo-mnt\r\n").unwrap();
        assert_eq!(request.server_info(), None);
        let tokens: Vec<_> = request.objects().iter().map(ClassifiedQuery::token).collect();
        assert_eq!(tokens, ["AS4242420000", "foo-mnt"]);
    }

    #[test]
    fn test_parse_server_info() {
        let request = Request::parse("-q types\n").unwrap();
        assert_eq!(request.server_info(), Some(&ServerInfo::Types));
        assert!(request.objects().is_empty());

        let request = Request::parse("-q=version").unwrap();
        assert_eq!(request.server_info(), Some(&ServerInfo::Version));

        let request = Request::parse("--q sources").unwrap();
        assert_eq!(request.server_info(), Some(&ServerInfo::Sources));

        let request = Request::parse("-q bogus").unwrap();
        assert_eq!(
            request.server_info(),
            Some(&ServerInfo::Unknown("bogus".into()))
        );
    }

    #[test]
    fn test_parse_flag_terminators() {
        let request = Request::parse("-- -q").unwrap();
        assert_eq!(request.server_info(), None);
        assert_eq!(request.objects()[0].token(), "-q");

        let request = Request::parse("foo-mnt -q types").unwrap();
        assert_eq!(request.server_info(), None);
        assert_eq!(request.objects().len(), 3);
    }

    #[test]
    fn test_parse_flag_errors() {
        assert_eq!(
            Request::parse("-x foo"),
            Err(CoreError::UnknownFlag("x".into()))
        );
        assert_eq!(
            Request::parse("-q"),
            Err(CoreError::MissingValue("q".into()))
        );
        assert_eq!(
            Request::parse("-=q"),
            Err(CoreError::BadSyntax("-=q".into()))
        );
        assert!(Request::parse("-help").unwrap_err().is_help());
    }

    #[test]
    fn test_parse_empty_line() {
        let request = Request::parse("\n").unwrap();
        assert!(request.objects().is_empty());
        assert_eq!(request.server_info(), None);
    }
}
