//! VPN Profiles
//!
//! The structured profile handed to the VPN engine, and the parser that
//! turns rendered OpenVPN configuration text into one.
//!
//! # Parsed Subset
//!
//! - `remote <host> [port] [proto]` → one [`Connection`] each
//! - `route <network> [netmask] [gateway]` → [`Route`]
//! - `proto` / `port` → defaults for remotes that omit them
//! - `<tag>...</tag>` inline blocks (`ca`, `key`, `cert`, ...)
//! - every other directive is kept verbatim, in order

use crate::capability::TransportType;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Address of the local pluggable-transport dispatcher
pub const DISPATCHER_IP: &str = "127.0.0.1";
/// Port of the local pluggable-transport dispatcher
pub const DISPATCHER_PORT: u16 = 4430;
/// SOCKS port of the local obfs4 client
pub const OBFS4_PROXY_PORT: u16 = 4430;
/// SOCKS port of the local port-hopping client
pub const HOPPING_PROXY_PORT: u16 = 8080;

const DEFAULT_PORT: u16 = 1194;

/// Local SOCKS5 proxy a connection is routed through
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocksProxy {
    pub host: String,
    pub port: u16,
}

/// One remote endpoint of a profile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection {
    pub server_name: String,
    pub server_port: u16,
    pub use_udp: bool,
    pub proxy: Option<SocksProxy>,
}

impl Connection {
    /// Connection through the local obfuscation client
    pub fn obfuscated(options: &Obfs4Options) -> Self {
        let (use_udp, proxy_port) = match options.transport_type {
            TransportType::Obfs4Hop => (true, HOPPING_PROXY_PORT),
            _ => (options.use_kcp, OBFS4_PROXY_PORT),
        };

        Self {
            server_name: options.gateway_ip.clone(),
            server_port: options.port,
            use_udp,
            proxy: Some(SocksProxy {
                host: DISPATCHER_IP.to_string(),
                port: proxy_port,
            }),
        }
    }

    /// Protocol name as OpenVPN spells it
    pub fn protocol(&self) -> &'static str {
        if self.use_udp { "udp" } else { "tcp" }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.server_name, self.server_port, self.protocol())?;
        if let Some(proxy) = &self.proxy {
            write!(f, " via socks5://{}:{}", proxy.host, proxy.port)?;
        }
        Ok(())
    }
}

/// Static route
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub network: String,
    pub netmask: String,
    pub gateway: Option<String>,
}

/// A directive kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
}

/// Connection parameters for obfuscated transports
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Obfs4Options {
    /// Address the obfuscation client dials
    pub gateway_ip: String,
    pub port: u16,
    /// Bridge certificate
    pub cert: String,
    /// Inter-arrival-time mode
    pub iat_mode: String,
    /// Frame over KCP (UDP) instead of TCP
    pub use_kcp: bool,
    pub transport_type: TransportType,
}

/// Structured VPN profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnProfile {
    /// Location display name
    pub name: String,
    /// IP of the owning gateway
    pub gateway_ip: String,
    pub transport_type: TransportType,
    pub use_pluggable_transports: bool,
    pub connections: Vec<Connection>,
    pub routes: Vec<Route>,
    pub directives: Vec<Directive>,
    /// Inline blocks by tag
    pub inline_blocks: BTreeMap<String, String>,
    pub obfs4_options: Option<Obfs4Options>,
    /// Apps that bypass the tunnel
    pub excluded_apps: BTreeSet<String>,
    config: String,
}

impl VpnProfile {
    /// Configuration text this profile was parsed from
    pub fn config(&self) -> &str {
        &self.config
    }

    /// A profile without remotes cannot connect anywhere
    pub fn is_usable(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn ca(&self) -> Option<&str> {
        self.inline_blocks.get("ca").map(String::as_str)
    }

    pub fn key(&self) -> Option<&str> {
        self.inline_blocks.get("key").map(String::as_str)
    }

    pub fn cert(&self) -> Option<&str> {
        self.inline_blocks.get("cert").map(String::as_str)
    }

    /// Look up the first directive with this name
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }
}

/// OpenVPN configuration parser
#[derive(Debug, Default)]
pub struct ConfigParser {
    directives: Vec<Directive>,
    inline_blocks: BTreeMap<String, String>,
    obfs4_options: Option<Obfs4Options>,
    config: String,
}

impl ConfigParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration text
    pub fn parse_config(&mut self, content: &str) -> Result<(), ConfigParseError> {
        let mut lines = content.lines().enumerate();

        while let Some((number, line)) = lines.next() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(tag) = line.strip_prefix("</").and_then(|l| l.strip_suffix('>')) {
                return Err(ConfigParseError::UnexpectedClosingTag {
                    line: number + 1,
                    tag: tag.to_string(),
                });
            }

            if let Some(tag) = line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) {
                let closing = format!("</{}>", tag);
                let mut body = Vec::new();
                let mut closed = false;
                for (_, inner) in lines.by_ref() {
                    if inner.trim() == closing {
                        closed = true;
                        break;
                    }
                    body.push(inner);
                }
                if !closed {
                    return Err(ConfigParseError::UnterminatedBlock(tag.to_string()));
                }
                self.inline_blocks.insert(tag.to_string(), body.join("\n"));
                continue;
            }

            let mut words = line.split_whitespace().map(str::to_owned);
            if let Some(name) = words.next() {
                self.directives.push(Directive {
                    name,
                    args: words.collect(),
                });
            }
        }

        if !self.config.is_empty() {
            self.config.push('\n');
        }
        self.config.push_str(content);
        Ok(())
    }

    /// Attach obfuscation parameters for pluggable transports
    pub fn set_obfs4_options(&mut self, options: Obfs4Options) {
        self.obfs4_options = Some(options);
    }

    /// Build the profile for `transport`
    pub fn convert_profile(self, transport: TransportType) -> Result<VpnProfile, ConfigParseError> {
        let mut default_udp = true;
        let mut default_port = DEFAULT_PORT;
        for directive in &self.directives {
            match (directive.name.as_str(), directive.args.first()) {
                ("proto", Some(proto)) => default_udp = !proto.starts_with("tcp"),
                ("port", Some(port)) => default_port = parse_port(port)?,
                _ => {}
            }
        }

        let mut connections = Vec::new();
        let mut routes = Vec::new();
        let mut directives = Vec::new();
        for directive in self.directives {
            match directive.name.as_str() {
                "remote" => {
                    let host = directive
                        .args
                        .first()
                        .ok_or(ConfigParseError::MissingArgument("remote"))?;
                    let server_port = match directive.args.get(1) {
                        Some(port) => parse_port(port)?,
                        None => default_port,
                    };
                    let use_udp = directive
                        .args
                        .get(2)
                        .map(|proto| !proto.starts_with("tcp"))
                        .unwrap_or(default_udp);
                    connections.push(Connection {
                        server_name: host.clone(),
                        server_port,
                        use_udp,
                        proxy: None,
                    });
                }
                "route" => {
                    let network = directive
                        .args
                        .first()
                        .ok_or(ConfigParseError::MissingArgument("route"))?;
                    routes.push(Route {
                        network: network.clone(),
                        netmask: directive
                            .args
                            .get(1)
                            .cloned()
                            .unwrap_or_else(|| "255.255.255.255".to_string()),
                        gateway: directive.args.get(2).cloned(),
                    });
                }
                _ => directives.push(directive),
            }
        }

        let obfs4_options = if transport.is_pluggable() {
            let options = self
                .obfs4_options
                .ok_or(ConfigParseError::MissingTransportOptions(transport))?;
            connections = vec![Connection::obfuscated(&options)];
            Some(options)
        } else {
            None
        };

        debug!(
            "Parsed {} profile with {} connection(s), {} route(s)",
            transport,
            connections.len(),
            routes.len()
        );

        Ok(VpnProfile {
            name: String::new(),
            gateway_ip: String::new(),
            transport_type: transport,
            use_pluggable_transports: transport.is_pluggable(),
            connections,
            routes,
            directives,
            inline_blocks: self.inline_blocks,
            obfs4_options,
            excluded_apps: BTreeSet::new(),
            config: self.config,
        })
    }
}

fn parse_port(port: &str) -> Result<u16, ConfigParseError> {
    port.parse()
        .map_err(|_| ConfigParseError::InvalidPort(port.to_string()))
}

/// Configuration parse errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigParseError {
    #[error("Api version ({0}) did not match required JSON fields: {1}")]
    Capabilities(i32, String),

    #[error("Unterminated inline block <{0}>")]
    UnterminatedBlock(String),

    #[error("Unexpected closing tag </{tag}> on line {line}")]
    UnexpectedClosingTag { line: usize, tag: String },

    #[error("Missing argument for {0}")]
    MissingArgument(&'static str),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Missing {0} transport options")]
    MissingTransportOptions(TransportType),

    #[error("Missing transport field: {0}")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "\
auth SHA1
proto udp
client
remote 198.51.100.1 443 tcp
remote 198.51.100.1 1195
route 198.51.100.1 255.255.255.255 net_gateway
persist-tun
<ca>
-----BEGIN CERTIFICATE-----
MIIB
-----END CERTIFICATE-----
</ca>";

    fn obfs4_options(transport_type: TransportType) -> Obfs4Options {
        Obfs4Options {
            gateway_ip: "198.51.100.1".to_string(),
            port: 23050,
            cert: "cert".to_string(),
            iat_mode: "0".to_string(),
            use_kcp: false,
            transport_type,
        }
    }

    #[test]
    fn test_parse_openvpn_profile() {
        let mut parser = ConfigParser::new();
        parser.parse_config(CONFIG).unwrap();
        let profile = parser.convert_profile(TransportType::Openvpn).unwrap();

        assert_eq!(profile.connections.len(), 2);
        assert!(!profile.connections[0].use_udp);
        assert!(profile.connections[1].use_udp);
        assert_eq!(profile.connections[1].server_port, 1195);
        assert_eq!(profile.routes[0].gateway.as_deref(), Some("net_gateway"));
        assert!(profile.ca().unwrap().contains("MIIB"));
        assert!(profile.directive("persist-tun").is_some());
        assert!(profile.directive("remote").is_none());
        assert!(!profile.use_pluggable_transports);
        assert_eq!(profile.config(), CONFIG);
    }

    #[test]
    fn test_parse_errors() {
        let mut parser = ConfigParser::new();
        assert!(matches!(
            parser.parse_config("client\n<ca>\nMIIB"),
            Err(ConfigParseError::UnterminatedBlock(tag)) if tag == "ca"
        ));

        let mut parser = ConfigParser::new();
        assert!(matches!(
            parser.parse_config("client\n</key>"),
            Err(ConfigParseError::UnexpectedClosingTag { line: 2, .. })
        ));

        let mut parser = ConfigParser::new();
        parser.parse_config("remote 198.51.100.1 http").unwrap();
        assert!(matches!(
            parser.convert_profile(TransportType::Openvpn),
            Err(ConfigParseError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_obfs4_profile_uses_local_proxy() {
        let mut parser = ConfigParser::new();
        parser.parse_config(CONFIG).unwrap();
        parser.set_obfs4_options(obfs4_options(TransportType::Obfs4));
        let profile = parser.convert_profile(TransportType::Obfs4).unwrap();

        assert!(profile.use_pluggable_transports);
        assert_eq!(profile.connections.len(), 1);
        let connection = &profile.connections[0];
        assert_eq!(connection.server_port, 23050);
        assert!(!connection.use_udp);
        assert_eq!(connection.proxy.as_ref().unwrap().port, OBFS4_PROXY_PORT);
    }

    #[test]
    fn test_hopping_connection_is_udp() {
        let connection = Connection::obfuscated(&obfs4_options(TransportType::Obfs4Hop));
        assert!(connection.use_udp);
        assert_eq!(connection.proxy.unwrap().port, HOPPING_PROXY_PORT);
    }

    #[test]
    fn test_pluggable_profile_requires_options() {
        let mut parser = ConfigParser::new();
        parser.parse_config(CONFIG).unwrap();
        assert!(matches!(
            parser.convert_profile(TransportType::Obfs4),
            Err(ConfigParseError::MissingTransportOptions(TransportType::Obfs4))
        ));
    }
}
