//! IP protocol sets and the application-layer protocol table.
//!
//! A rule header names either an IP protocol (tcp, udp, ...) or an
//! application protocol (http, dns, ...). IP protocols become a bitmap over
//! protocol numbers; app protocols resolve through the table below, which
//! also knows each protocol's transaction progress states and whether the
//! parser can hand files to the detection engine.

/// Direction of traffic relative to the flow initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToServer,
    ToClient,
}

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_GRE: u8 = 47;
pub const IPPROTO_ESP: u8 = 50;
pub const IPPROTO_ICMPV6: u8 = 58;
pub const IPPROTO_SCTP: u8 = 132;

pub const PROTO_ANY: u8 = 0x01;
pub const PROTO_ONLY_PKT: u8 = 0x02;
pub const PROTO_ONLY_STREAM: u8 = 0x04;

/// Bitmap over the 256 IP protocol numbers, plus qualifier flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtoSet {
    bits: [u8; 32],
    pub flags: u8,
}

impl ProtoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, proto: u8) {
        self.bits[proto as usize / 8] |= 1 << (proto % 8);
    }

    pub fn contains(&self, proto: u8) -> bool {
        self.bits[proto as usize / 8] & (1 << (proto % 8)) != 0
    }

    pub fn set_all(&mut self) {
        self.bits = [0xff; 32];
    }

    pub fn clear(&mut self) {
        self.bits = [0; 32];
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    /// Parse an IP protocol name into the set. Returns false when the name
    /// is not an IP protocol (the caller then tries the app-layer table).
    pub fn parse(&mut self, name: &str) -> bool {
        match name.to_ascii_lowercase().as_str() {
            "tcp" => self.set(IPPROTO_TCP),
            "tcp-pkt" => {
                self.set(IPPROTO_TCP);
                self.flags |= PROTO_ONLY_PKT;
            }
            "tcp-stream" => {
                self.set(IPPROTO_TCP);
                self.flags |= PROTO_ONLY_STREAM;
            }
            "udp" => self.set(IPPROTO_UDP),
            "icmp" => {
                self.set(IPPROTO_ICMP);
                self.set(IPPROTO_ICMPV6);
            }
            "icmpv4" => self.set(IPPROTO_ICMP),
            "icmpv6" => self.set(IPPROTO_ICMPV6),
            "sctp" => self.set(IPPROTO_SCTP),
            "esp" => self.set(IPPROTO_ESP),
            "gre" => self.set(IPPROTO_GRE),
            "ip" | "ip4" | "ip6" => {
                self.flags |= PROTO_ANY;
                self.set_all();
            }
            _ => return false,
        }
        true
    }
}

/// Application-layer protocols known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppProto {
    #[default]
    Unknown,
    Http1,
    Http2,
    Tls,
    Dns,
    Smtp,
    Smb,
    Ftp,
    Ssh,
    Quic,
}

/// Maximum number of alternative app protocols a single rule can carry.
pub const SIG_ALPROTO_MAX: usize = 4;

struct AppProtoInfo {
    proto: AppProto,
    names: &'static [&'static str],
    ipprotos: &'static [u8],
    /// Named to-server progress states and their progress values.
    ts_states: &'static [(&'static str, u8)],
    tc_states: &'static [(&'static str, u8)],
    completion_ts: u8,
    completion_tc: u8,
    supports_files: bool,
}

static APP_PROTOS: &[AppProtoInfo] = &[
    AppProtoInfo {
        proto: AppProto::Http1,
        names: &["http", "http1"],
        ipprotos: &[IPPROTO_TCP],
        ts_states: &[("request_line", 1), ("request_headers", 2), ("request_body", 3)],
        tc_states: &[("response_line", 1), ("response_headers", 2), ("response_body", 3)],
        completion_ts: 4,
        completion_tc: 4,
        supports_files: true,
    },
    AppProtoInfo {
        proto: AppProto::Http2,
        names: &["http2"],
        ipprotos: &[IPPROTO_TCP],
        ts_states: &[("headers", 1)],
        tc_states: &[("headers", 1)],
        completion_ts: 2,
        completion_tc: 2,
        supports_files: true,
    },
    AppProtoInfo {
        proto: AppProto::Tls,
        names: &["tls", "ssl"],
        ipprotos: &[IPPROTO_TCP],
        ts_states: &[("client_hello", 1)],
        tc_states: &[("server_hello", 1), ("certificate", 2)],
        completion_ts: 3,
        completion_tc: 3,
        supports_files: false,
    },
    AppProtoInfo {
        proto: AppProto::Dns,
        names: &["dns"],
        ipprotos: &[IPPROTO_TCP, IPPROTO_UDP],
        ts_states: &[],
        tc_states: &[],
        completion_ts: 1,
        completion_tc: 1,
        supports_files: false,
    },
    AppProtoInfo {
        proto: AppProto::Smtp,
        names: &["smtp"],
        ipprotos: &[IPPROTO_TCP],
        ts_states: &[("command", 1), ("data", 2)],
        tc_states: &[],
        completion_ts: 3,
        completion_tc: 1,
        supports_files: true,
    },
    AppProtoInfo {
        proto: AppProto::Smb,
        names: &["smb"],
        ipprotos: &[IPPROTO_TCP],
        ts_states: &[],
        tc_states: &[],
        completion_ts: 1,
        completion_tc: 1,
        supports_files: true,
    },
    AppProtoInfo {
        proto: AppProto::Ftp,
        names: &["ftp"],
        ipprotos: &[IPPROTO_TCP],
        ts_states: &[],
        tc_states: &[],
        completion_ts: 1,
        completion_tc: 1,
        supports_files: false,
    },
    AppProtoInfo {
        proto: AppProto::Ssh,
        names: &["ssh"],
        ipprotos: &[IPPROTO_TCP],
        ts_states: &[("banner", 1)],
        tc_states: &[("banner", 1)],
        completion_ts: 2,
        completion_tc: 2,
        supports_files: false,
    },
    AppProtoInfo {
        proto: AppProto::Quic,
        names: &["quic"],
        ipprotos: &[IPPROTO_UDP],
        ts_states: &[],
        tc_states: &[],
        completion_ts: 1,
        completion_tc: 1,
        supports_files: false,
    },
];

fn info(proto: AppProto) -> Option<&'static AppProtoInfo> {
    APP_PROTOS.iter().find(|i| i.proto == proto)
}

impl AppProto {
    pub fn from_name(name: &str) -> Option<AppProto> {
        let lower = name.to_ascii_lowercase();
        APP_PROTOS
            .iter()
            .find(|i| i.names.iter().any(|n| *n == lower))
            .map(|i| i.proto)
    }

    pub fn name(self) -> &'static str {
        match info(self) {
            Some(i) => i.names[0],
            None => "unknown",
        }
    }

    pub fn is_valid(self) -> bool {
        self != AppProto::Unknown
    }

    /// Merge this protocol's supported IP protocols into the set.
    pub fn supported_ipprotos(self, set: &mut ProtoSet) {
        if let Some(i) = info(self) {
            for p in i.ipprotos {
                set.set(*p);
            }
        }
    }

    /// Progress value at which a transaction is complete in `dir`.
    pub fn completion_progress(self, dir: Direction) -> u8 {
        match info(self) {
            Some(i) => match dir {
                Direction::ToServer => i.completion_ts,
                Direction::ToClient => i.completion_tc,
            },
            None => 0,
        }
    }

    /// Look up a named progress state in `dir`.
    pub fn state_by_name(self, name: &str, dir: Direction) -> Option<u8> {
        let i = info(self)?;
        let states = match dir {
            Direction::ToServer => i.ts_states,
            Direction::ToClient => i.tc_states,
        };
        states.iter().find(|(n, _)| *n == name).map(|(_, p)| *p)
    }

    /// Named progress states for `dir`, used to register generic hook lists.
    pub fn states(self, dir: Direction) -> &'static [(&'static str, u8)] {
        match info(self) {
            Some(i) => match dir {
                Direction::ToServer => i.ts_states,
                Direction::ToClient => i.tc_states,
            },
            None => &[],
        }
    }

    pub fn supports_files(self) -> bool {
        info(self).map(|i| i.supports_files).unwrap_or(false)
    }

    pub fn all() -> impl Iterator<Item = AppProto> {
        APP_PROTOS.iter().map(|i| i.proto)
    }
}
