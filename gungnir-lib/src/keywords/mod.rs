//! Built-in rule keyword modules. Each module owns its context type and
//! setup callbacks; registration happens through [`builtin_specs`].

pub mod content;
pub mod file;
pub mod flow;
pub mod http;
pub mod meta;
pub mod packet;
pub mod requires;

use crate::keyword::{Kw, KeywordSpec, QuoteMode, ValueMode};
use crate::signature::DetectTable;

const PACKET_TABLES: u8 = DetectTable::PacketPreFlow.as_flag()
    | DetectTable::PacketPreStream.as_flag()
    | DetectTable::PacketFilter.as_flag()
    | DetectTable::PacketTd.as_flag();

/// The built-in keyword table, in dense-id order.
pub fn builtin_specs() -> Vec<KeywordSpec> {
    vec![
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Sid, "sid", meta::setup_sid)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Gid, "gid", meta::setup_gid)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Rev, "rev", meta::setup_rev)
        },
        KeywordSpec {
            quoting: QuoteMode::Mandatory,
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Msg, "msg", meta::setup_msg)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Priority, "priority", meta::setup_priority)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Classtype, "classtype", meta::setup_classtype)
        },
        KeywordSpec {
            quoting: QuoteMode::Optional,
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Metadata, "metadata", meta::setup_metadata)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Reference, "reference", meta::setup_reference)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Requires, "requires", requires::setup_requires)
        },
        KeywordSpec {
            firewall_ok: true,
            tables: PACKET_TABLES,
            supports_prefilter: Some(packet::dsize_supports_prefilter),
            packet_match: true,
            ..KeywordSpec::new(Kw::Dsize, "dsize", packet::setup_dsize)
        },
        KeywordSpec {
            firewall_ok: true,
            packet_match: true,
            ..KeywordSpec::new(Kw::Flow, "flow", flow::setup_flow)
        },
        KeywordSpec {
            tables: PACKET_TABLES,
            packet_match: true,
            ..KeywordSpec::new(Kw::StreamSize, "stream_size", packet::setup_stream_size)
        },
        KeywordSpec {
            quoting: QuoteMode::Mandatory,
            negation: true,
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Content, "content", content::setup_content)
        },
        KeywordSpec {
            value: ValueMode::None,
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Nocase, "nocase", content::setup_nocase)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Offset, "offset", content::setup_offset)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Depth, "depth", content::setup_depth)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Distance, "distance", content::setup_distance)
        },
        KeywordSpec {
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Within, "within", content::setup_within)
        },
        KeywordSpec {
            value: ValueMode::None,
            ..KeywordSpec::new(Kw::Rawbytes, "rawbytes", content::setup_rawbytes)
        },
        KeywordSpec {
            value: ValueMode::None,
            firewall_ok: true,
            ..KeywordSpec::new(Kw::FastPattern, "fast_pattern", content::setup_fast_pattern)
        },
        KeywordSpec {
            value: ValueMode::None,
            firewall_ok: true,
            ..KeywordSpec::new(Kw::Prefilter, "prefilter", content::setup_prefilter_marker)
        },
        KeywordSpec {
            alias: Some("file_data"),
            value: ValueMode::Optional,
            direction: true,
            ..KeywordSpec::new(Kw::FileData, "file.data", file::setup_file_data)
        },
        KeywordSpec {
            value: ValueMode::None,
            ..KeywordSpec::new(Kw::FileName, "file.name", file::setup_file_name)
        },
        KeywordSpec {
            value: ValueMode::None,
            firewall_ok: true,
            ..KeywordSpec::new(Kw::HttpUri, "http.uri", http::setup_http_uri)
        },
        KeywordSpec {
            value: ValueMode::None,
            deprecated: true,
            alternative: Some(Kw::HttpUri),
            ..KeywordSpec::new(Kw::HttpUriModifier, "http_uri", http::setup_http_uri_modifier)
        },
    ]
}
