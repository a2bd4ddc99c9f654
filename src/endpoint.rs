use std::fmt;

pub const DEFAULT_PORT: u16 = 4953;

/// Where the remote sink listens. Resolved again on every reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new<S>(host: S, port: u16) -> Self
    where
        S: Into<String>,
    {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Accepts `tcp://host:port`, `host:port`, `host` and `[v6addr]:port`.
    pub fn from_str(spec: &str) -> anyhow::Result<Self> {
        let spec = spec.trim();
        let rest = match spec.find("://") {
            Some(pos) => {
                let scheme = &spec[..pos];
                if !scheme.eq_ignore_ascii_case("tcp") {
                    anyhow::bail!("unsupported endpoint scheme {:?}", scheme);
                }
                &spec[pos + 3..]
            }
            None => spec,
        };
        // anything after the authority is meaningless for a raw stream
        let rest = rest.split(|c| c == '/' || c == '?').next().unwrap_or("");
        if rest.is_empty() {
            anyhow::bail!("endpoint has no host");
        }

        let (host, port) = if let Some(inner) = rest.strip_prefix('[') {
            let close = inner
                .find(']')
                .ok_or_else(|| anyhow::anyhow!("unterminated IPv6 address in endpoint"))?;
            let after = &inner[close + 1..];
            let port = match after.strip_prefix(':') {
                Some(p) => Some(p),
                None if after.is_empty() => None,
                None => anyhow::bail!("garbage after IPv6 address in endpoint"),
            };
            (&inner[..close], port)
        } else {
            match rest.rfind(':') {
                Some(pos) if !rest[..pos].contains(':') => (&rest[..pos], Some(&rest[pos + 1..])),
                Some(_) => anyhow::bail!("IPv6 endpoints must be bracketed"),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            anyhow::bail!("endpoint has no host");
        }
        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("bad port in endpoint: {:?}", p))?,
            None => DEFAULT_PORT,
        };
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` in the form address lookups expect.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}", self.authority())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn full_uri() {
        let ep = Endpoint::from_str("tcp://snapserver.local:1705").unwrap();
        assert_eq!(ep.host(), "snapserver.local");
        assert_eq!(ep.port(), 1705);
        assert_eq!(ep.to_string(), "tcp://snapserver.local:1705");
    }

    #[test]
    fn default_port() {
        assert_eq!(Endpoint::from_str("tcp://10.0.0.2").unwrap().port(), 4953);
        assert_eq!(Endpoint::from_str("10.0.0.2").unwrap().port(), 4953);
        assert_eq!(Endpoint::from_str("tcp://10.0.0.2/").unwrap().port(), 4953);
    }

    #[test]
    fn bracketed_v6() {
        let ep = Endpoint::from_str("tcp://[::1]:9000").unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.port(), 9000);
        assert_eq!(ep.authority(), "[::1]:9000");
        assert_eq!(Endpoint::from_str("[::1]").unwrap().port(), DEFAULT_PORT);
    }

    #[test]
    fn rejects() {
        assert!(Endpoint::from_str("udp://host:1").is_err());
        assert!(Endpoint::from_str("tcp://").is_err());
        assert!(Endpoint::from_str("host:99999").is_err());
        assert!(Endpoint::from_str("::1").is_err());
        assert!(Endpoint::from_str("[::1").is_err());
        assert!(Endpoint::from_str(":4953").is_err());
    }
}
