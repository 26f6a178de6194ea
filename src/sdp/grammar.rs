//! Table driven SDP grammar.
//!
//! One rule per line shape: a regex with named capture positions for
//! parsing and a tagged format spec for writing. Adding a line type is a
//! table entry, not new code. Unmatched a= lines land verbatim in the
//! "invalid" bucket so they survive a parse/write round trip.

use once_cell::sync::Lazy;
use regex::Regex;

use super::model::{Fields, Record, SdpMedia, SdpSession, Value};
use super::SdpError;
use crate::rtp::Parameters;

/// One piece of a line's write format.
enum Seg {
    /// Literal text.
    Lit(&'static str),
    /// The value captured under this name.
    Var(&'static str),
    /// Emitted only when the record has the `when` key.
    Opt {
        when: &'static str,
        segs: &'static [Seg],
    },
}

use Seg::{Lit, Var};

/// One line rule.
///
/// `push` appends a record to a list, `name` with `names` stores a single
/// record, `name` alone stores a scalar. The m= rule has only `names`:
/// its captures attach directly onto the media section.
struct Rule {
    name: Option<&'static str>,
    push: Option<&'static str>,
    reg: &'static str,
    names: &'static [&'static str],
    format: &'static [Seg],
}

const SCALAR: &[Seg] = &[Var("")];

#[rustfmt::skip]
static RULES: &[(char, &[Rule])] = &[
    ('v', &[Rule {
        // v=0
        name: Some("version"), push: None,
        reg: r"^(\d*)$",
        names: &[],
        format: SCALAR,
    }]),
    ('o', &[Rule {
        // o=- 20518 0 IN IP4 203.0.113.1
        // NB: sessionId stays a string when it is huge.
        name: Some("origin"), push: None,
        reg: r"^(\S*) (\d*) (\d*) (\S*) IP(\d) (\S*)",
        names: &["username", "sessionId", "sessionVersion", "netType", "ipVer", "address"],
        format: &[
            Var("username"), Lit(" "), Var("sessionId"), Lit(" "), Var("sessionVersion"),
            Lit(" "), Var("netType"), Lit(" IP"), Var("ipVer"), Lit(" "), Var("address"),
        ],
    }]),
    ('s', &[Rule { name: Some("name"), push: None, reg: "(.*)", names: &[], format: SCALAR }]),
    ('i', &[Rule { name: Some("description"), push: None, reg: "(.*)", names: &[], format: SCALAR }]),
    ('u', &[Rule { name: Some("uri"), push: None, reg: "(.*)", names: &[], format: SCALAR }]),
    ('e', &[Rule { name: Some("email"), push: None, reg: "(.*)", names: &[], format: SCALAR }]),
    ('p', &[Rule { name: Some("phone"), push: None, reg: "(.*)", names: &[], format: SCALAR }]),
    ('z', &[Rule { name: Some("timezones"), push: None, reg: "(.*)", names: &[], format: SCALAR }]),
    ('r', &[Rule { name: Some("repeats"), push: None, reg: "(.*)", names: &[], format: SCALAR }]),
    ('t', &[Rule {
        // t=0 0
        name: Some("timing"), push: None,
        reg: r"^(\d*) (\d*)",
        names: &["start", "stop"],
        format: &[Var("start"), Lit(" "), Var("stop")],
    }]),
    ('c', &[Rule {
        // c=IN IP4 10.47.197.26
        name: Some("connection"), push: None,
        reg: r"^IN IP(\d) (\S*)",
        names: &["version", "ip"],
        format: &[Lit("IN IP"), Var("version"), Lit(" "), Var("ip")],
    }]),
    ('b', &[Rule {
        // b=AS:4000
        name: None, push: Some("bandwidth"),
        reg: r"^(TIAS|AS|CT|RR|RS):(\d*)",
        names: &["type", "limit"],
        format: &[Var("type"), Lit(":"), Var("limit")],
    }]),
    ('m', &[Rule {
        // m=video 51744 RTP/AVP 126 97 98 34 31
        // NB: special, attaches directly to the media section.
        name: None, push: None,
        reg: r"^(\w*) (\d*) ([\w/]*)(?: (.*))?",
        names: &["type", "port", "protocol", "payloads"],
        format: &[Var("type"), Lit(" "), Var("port"), Lit(" "), Var("protocol"), Lit(" "), Var("payloads")],
    }]),
    ('a', &[
        Rule {
            // a=rtpmap:110 opus/48000/2
            name: None, push: Some("rtp"),
            reg: r"^rtpmap:(\d*) ([\w\-.]*)(?:\s*/(\d*)(?:\s*/(\S*))?)?",
            names: &["payload", "codec", "rate", "encoding"],
            format: &[
                Lit("rtpmap:"), Var("payload"), Lit(" "), Var("codec"),
                Seg::Opt { when: "rate", segs: &[
                    Lit("/"), Var("rate"),
                    Seg::Opt { when: "encoding", segs: &[Lit("/"), Var("encoding")] },
                ]},
            ],
        },
        Rule {
            // a=fmtp:111 minptime=10;useinbandfec=1
            name: None, push: Some("fmtp"),
            reg: r"^fmtp:(\d*) ([\S| ]*)",
            names: &["payload", "config"],
            format: &[Lit("fmtp:"), Var("payload"), Lit(" "), Var("config")],
        },
        Rule {
            // a=rtcp:65179 IN IP4 193.84.77.194
            name: Some("rtcp"), push: None,
            reg: r"^rtcp:(\d*)(?: (\S*) IP(\d) (\S*))?",
            names: &["port", "netType", "ipVer", "address"],
            format: &[
                Lit("rtcp:"), Var("port"),
                Seg::Opt { when: "address", segs: &[
                    Lit(" "), Var("netType"), Lit(" IP"), Var("ipVer"), Lit(" "), Var("address"),
                ]},
            ],
        },
        Rule {
            // a=rtcp-fb:98 trr-int 100
            name: None, push: Some("rtcpFbTrrInt"),
            reg: r"^rtcp-fb:(\*|\d*) trr-int (\d*)",
            names: &["payload", "value"],
            format: &[Lit("rtcp-fb:"), Var("payload"), Lit(" trr-int "), Var("value")],
        },
        Rule {
            // a=rtcp-fb:98 nack rpsi
            name: None, push: Some("rtcpFb"),
            reg: r"^rtcp-fb:(\*|\d*) ([\w\-_]*)(?: ([\w\-_]*))?",
            names: &["payload", "type", "subtype"],
            format: &[
                Lit("rtcp-fb:"), Var("payload"), Lit(" "), Var("type"),
                Seg::Opt { when: "subtype", segs: &[Lit(" "), Var("subtype")] },
            ],
        },
        Rule {
            // a=extmap:2 urn:ietf:params:rtp-hdrext:toffset
            // a=extmap:1/recvonly URI-gps-string
            name: None, push: Some("ext"),
            reg: r"^extmap:(\d+)(?:/(\w+))?(?: (urn:ietf:params:rtp-hdrext:encrypt))? (\S*)(?: (\S*))?",
            names: &["value", "direction", "encrypt-uri", "uri", "config"],
            format: &[
                Lit("extmap:"), Var("value"),
                Seg::Opt { when: "direction", segs: &[Lit("/"), Var("direction")] },
                Seg::Opt { when: "encrypt-uri", segs: &[Lit(" "), Var("encrypt-uri")] },
                Lit(" "), Var("uri"),
                Seg::Opt { when: "config", segs: &[Lit(" "), Var("config")] },
            ],
        },
        Rule {
            // a=extmap-allow-mixed
            name: Some("extmapAllowMixed"), push: None,
            reg: r"^(extmap-allow-mixed)",
            names: &[],
            format: SCALAR,
        },
        Rule {
            // a=setup:actpass
            name: Some("setup"), push: None,
            reg: r"^setup:(\w*)",
            names: &[],
            format: &[Lit("setup:"), Var("")],
        },
        Rule {
            // a=mid:1
            name: Some("mid"), push: None,
            reg: r"^mid:([^\s]*)",
            names: &[],
            format: &[Lit("mid:"), Var("")],
        },
        Rule {
            // a=msid:0c8b064d-d807 98178685-d409
            name: Some("msid"), push: None,
            reg: r"^msid:(.*)",
            names: &[],
            format: &[Lit("msid:"), Var("")],
        },
        Rule {
            // a=ptime:20
            name: Some("ptime"), push: None,
            reg: r"^ptime:(\d*(?:\.\d*)*)",
            names: &[],
            format: &[Lit("ptime:"), Var("")],
        },
        Rule {
            // a=maxptime:60
            name: Some("maxptime"), push: None,
            reg: r"^maxptime:(\d*(?:\.\d*)*)",
            names: &[],
            format: &[Lit("maxptime:"), Var("")],
        },
        Rule {
            // a=sendrecv
            name: Some("direction"), push: None,
            reg: r"^(sendrecv|recvonly|sendonly|inactive)",
            names: &[],
            format: SCALAR,
        },
        Rule {
            // a=ice-lite
            name: Some("icelite"), push: None,
            reg: r"^(ice-lite)",
            names: &[],
            format: SCALAR,
        },
        Rule {
            // a=ice-ufrag:F7gI
            name: Some("iceUfrag"), push: None,
            reg: r"^ice-ufrag:(\S*)",
            names: &[],
            format: &[Lit("ice-ufrag:"), Var("")],
        },
        Rule {
            // a=ice-pwd:x9cml/YzichV2+XlhiMu8g
            name: Some("icePwd"), push: None,
            reg: r"^ice-pwd:(\S*)",
            names: &[],
            format: &[Lit("ice-pwd:"), Var("")],
        },
        Rule {
            // a=fingerprint:SHA-1 00:11:22:...
            name: Some("fingerprint"), push: None,
            reg: r"^fingerprint:(\S*) (\S*)",
            names: &["type", "hash"],
            format: &[Lit("fingerprint:"), Var("type"), Lit(" "), Var("hash")],
        },
        Rule {
            // a=candidate:0 1 UDP 2113667327 203.0.113.1 54400 typ host
            name: None, push: Some("candidates"),
            reg: r"^candidate:(\S*) (\d*) (\S*) (\d*) (\S*) (\d*) typ (\S*)(?: raddr (\S*) rport (\d*))?(?: tcptype (\S*))?(?: generation (\d*))?(?: network-id (\d*))?(?: network-cost (\d*))?",
            names: &["foundation", "component", "transport", "priority", "ip", "port", "type", "raddr", "rport", "tcptype", "generation", "network-id", "network-cost"],
            format: &[
                Lit("candidate:"), Var("foundation"), Lit(" "), Var("component"),
                Lit(" "), Var("transport"), Lit(" "), Var("priority"),
                Lit(" "), Var("ip"), Lit(" "), Var("port"), Lit(" typ "), Var("type"),
                Seg::Opt { when: "raddr", segs: &[Lit(" raddr "), Var("raddr"), Lit(" rport "), Var("rport")] },
                Seg::Opt { when: "tcptype", segs: &[Lit(" tcptype "), Var("tcptype")] },
                Seg::Opt { when: "generation", segs: &[Lit(" generation "), Var("generation")] },
                Seg::Opt { when: "network-id", segs: &[Lit(" network-id "), Var("network-id")] },
                Seg::Opt { when: "network-cost", segs: &[Lit(" network-cost "), Var("network-cost")] },
            ],
        },
        Rule {
            // a=end-of-candidates
            name: Some("endOfCandidates"), push: None,
            reg: r"^(end-of-candidates)",
            names: &[],
            format: SCALAR,
        },
        Rule {
            // a=ice-options:renomination
            name: Some("iceOptions"), push: None,
            reg: r"^ice-options:(\S*)",
            names: &[],
            format: &[Lit("ice-options:"), Var("")],
        },
        Rule {
            // a=ssrc:2566107569 cname:t9YU8M1UxTF8Y1A1
            name: None, push: Some("ssrcs"),
            reg: r"^ssrc:(\d*) ([\w_-]*)(?::(.*))?",
            names: &["id", "attribute", "value"],
            format: &[
                Lit("ssrc:"), Var("id"),
                Seg::Opt { when: "attribute", segs: &[
                    Lit(" "), Var("attribute"),
                    Seg::Opt { when: "value", segs: &[Lit(":"), Var("value")] },
                ]},
            ],
        },
        Rule {
            // a=ssrc-group:FID 3004364195 1080772241
            name: None, push: Some("ssrcGroups"),
            // token-char = %x21 / %x23-27 / %x2A-2B / %x2D-2E / %x30-39 / %x41-5A / %x5E-7E
            reg: r"^ssrc-group:([\x21\x23\x24\x25\x26\x27\x2A\x2B\x2D\x2E\w]*) (.*)",
            names: &["semantics", "ssrcs"],
            format: &[Lit("ssrc-group:"), Var("semantics"), Lit(" "), Var("ssrcs")],
        },
        Rule {
            // a=msid-semantic: WMS Jvlam5X3SX1OP6pn20zWogvaKJz5Hjf9OnlV
            name: Some("msidSemantic"), push: None,
            reg: r"^msid-semantic:\s?(\w*) (\S*)",
            names: &["semantic", "token"],
            // The space after the colon is not accidental.
            format: &[Lit("msid-semantic: "), Var("semantic"), Lit(" "), Var("token")],
        },
        Rule {
            // a=group:BUNDLE audio video
            name: None, push: Some("groups"),
            reg: r"^group:(\w*) (.*)",
            names: &["type", "mids"],
            format: &[Lit("group:"), Var("type"), Lit(" "), Var("mids")],
        },
        Rule {
            // a=rtcp-mux
            name: Some("rtcpMux"), push: None,
            reg: r"^(rtcp-mux)",
            names: &[],
            format: SCALAR,
        },
        Rule {
            // a=rtcp-rsize
            name: Some("rtcpRsize"), push: None,
            reg: r"^(rtcp-rsize)",
            names: &[],
            format: SCALAR,
        },
        Rule {
            // a=sctpmap:5000 webrtc-datachannel 1024
            name: Some("sctpmap"), push: None,
            reg: r"^sctpmap:([\w_/]*) (\S*)(?: (\S*))?",
            names: &["sctpmapNumber", "app", "maxMessageSize"],
            format: &[
                Lit("sctpmap:"), Var("sctpmapNumber"), Lit(" "), Var("app"),
                Seg::Opt { when: "maxMessageSize", segs: &[Lit(" "), Var("maxMessageSize")] },
            ],
        },
        Rule {
            // a=x-google-flag:conference
            name: Some("xGoogleFlag"), push: None,
            reg: r"^x-google-flag:([^\s]*)",
            names: &[],
            format: &[Lit("x-google-flag:"), Var("")],
        },
        Rule {
            // a=rid:1 send max-width=1280;max-height=720
            name: None, push: Some("rids"),
            reg: r"^rid:([\d\w]+) (\w+)(?: ([\S| ]*))?",
            names: &["id", "direction", "params"],
            format: &[
                Lit("rid:"), Var("id"), Lit(" "), Var("direction"),
                Seg::Opt { when: "params", segs: &[Lit(" "), Var("params")] },
            ],
        },
        Rule {
            // a=simulcast:send 1,2,3;~4,~5 recv 6;~7,~8
            name: Some("simulcast"), push: None,
            reg: r"^simulcast:(send|recv) ([a-zA-Z0-9\-_~;,]+)(?:\s?(send|recv) ([a-zA-Z0-9\-_~;,]+))?$",
            names: &["dir1", "list1", "dir2", "list2"],
            format: &[
                Lit("simulcast:"), Var("dir1"), Lit(" "), Var("list1"),
                Seg::Opt { when: "dir2", segs: &[Lit(" "), Var("dir2"), Lit(" "), Var("list2")] },
            ],
        },
        Rule {
            // Old simulcast draft 03, as implemented by Firefox.
            //   https://tools.ietf.org/html/draft-ietf-mmusic-sdp-simulcast-03
            // a=simulcast: send rid=5;6;7 paused=6,7
            name: Some("simulcast_03"), push: None,
            reg: r"^simulcast:[\s\t]+([\S+\s\t]+)$",
            names: &["value"],
            format: &[Lit("simulcast: "), Var("value")],
        },
        Rule {
            // a=framerate:29.97
            name: Some("framerate"), push: None,
            reg: r"^framerate:(\d+(?:$|\.\d+))",
            names: &[],
            format: &[Lit("framerate:"), Var("")],
        },
        Rule {
            // a=bundle-only
            name: Some("bundleOnly"), push: None,
            reg: r"^(bundle-only)",
            names: &[],
            format: SCALAR,
        },
        Rule {
            // a=label:1
            name: Some("label"), push: None,
            reg: r"^label:(.+)",
            names: &[],
            format: &[Lit("label:"), Var("")],
        },
        Rule {
            // https://tools.ietf.org/html/draft-ietf-mmusic-sctp-sdp-26#section-5
            name: Some("sctpPort"), push: None,
            reg: r"^sctp-port:(\d+)$",
            names: &[],
            format: &[Lit("sctp-port:"), Var("")],
        },
        Rule {
            // https://tools.ietf.org/html/draft-ietf-mmusic-sctp-sdp-26#section-6
            name: Some("maxMessageSize"), push: None,
            reg: r"^max-message-size:(\d+)$",
            names: &[],
            format: &[Lit("max-message-size:"), Var("")],
        },
        Rule {
            // Any a= we don't understand is kept verbatim under "invalid".
            name: None, push: Some("invalid"),
            reg: "(.*)",
            names: &["value"],
            format: &[Var("value")],
        },
    ]),
];

static COMPILED: Lazy<Vec<(char, Vec<Regex>)>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|(field, rules)| {
            let regs = rules
                .iter()
                .map(|r| Regex::new(r.reg).expect("valid grammar regex"))
                .collect();
            (*field, regs)
        })
        .collect()
});

fn rules_for(field: char) -> Option<(&'static [Rule], &'static [Regex])> {
    let idx = RULES.iter().position(|(f, _)| *f == field)?;
    Some((RULES[idx].1, &COMPILED[idx].1))
}

fn attach(rule: &Rule, caps: &regex::Captures<'_>, fields: &mut Fields) {
    let captured_record = |names: &[&str]| {
        let mut rec = Record::new();
        for (i, name) in names.iter().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                rec.insert(name.to_string(), Value::coerce(m.as_str()));
            }
        }
        rec
    };

    if let Some(push) = rule.push {
        fields.push_record(push, captured_record(rule.names));
    } else if let Some(name) = rule.name {
        if rule.names.is_empty() {
            if let Some(m) = caps.get(1) {
                fields.set(name, Value::coerce(m.as_str()));
            }
        } else {
            fields.set_record(name, captured_record(rule.names));
        }
    } else {
        // The m= rule: captures attach directly as scalars.
        for (i, name) in rule.names.iter().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                fields.set(name, Value::coerce(m.as_str()));
            }
        }
    }
}

/// Parse a session description.
///
/// Parsing does not fail: lines that fit no rule are dropped (a= lines are
/// kept under "invalid") which mirrors how lenient SDP consumers behave.
pub fn parse(sdp: &str) -> SdpSession {
    let mut session = SdpSession::default();

    for raw in sdp.lines() {
        let line = raw.trim_end_matches('\r');
        let bytes = line.as_bytes();
        if bytes.len() < 2 || !bytes[0].is_ascii_lowercase() || bytes[1] != b'=' {
            continue;
        }
        let field = bytes[0] as char;
        let content = &line[2..];

        if field == 'm' {
            session.media.push(SdpMedia::new());
        }

        let Some((rules, regexes)) = rules_for(field) else {
            continue;
        };

        let fields = match session.media.last_mut() {
            Some(media) => &mut media.fields,
            None => &mut session.fields,
        };

        for (rule, re) in rules.iter().zip(regexes.iter()) {
            if let Some(caps) = re.captures(content) {
                attach(rule, &caps, fields);
                break;
            }
        }
    }

    session
}

enum Scope<'a> {
    Scalar(&'a Value),
    Record(&'a Record),
}

fn render(segs: &[Seg], scope: &Scope<'_>, line: &mut String) -> Result<(), SdpError> {
    use std::fmt::Write;

    for seg in segs {
        match seg {
            Lit(s) => line.push_str(s),
            Var(name) => {
                let value = match scope {
                    Scope::Scalar(v) => v,
                    Scope::Record(r) => r
                        .get(*name)
                        .ok_or_else(|| SdpError::Malformed(format!("missing field {}", name)))?,
                };
                // Writing to a String cannot fail.
                let _ = write!(line, "{}", value);
            }
            Seg::Opt { when, segs } => {
                let present = matches!(scope, Scope::Record(r) if r.contains_key(*when));
                if present {
                    render(segs, scope, line)?;
                }
            }
        }
    }

    Ok(())
}

fn make_line(field: char, rule: &Rule, scope: &Scope<'_>) -> Result<String, SdpError> {
    let mut line = format!("{}=", field);
    render(rule.format, scope, &mut line)?;
    Ok(line)
}

fn write_fields(out: &mut Vec<String>, fields: &Fields, order: &[char]) -> Result<(), SdpError> {
    for field in order {
        let Some((rules, _)) = rules_for(*field) else {
            continue;
        };

        for rule in rules {
            if let Some(name) = rule.name {
                if rule.names.is_empty() {
                    if let Some(v) = fields.scalar(name) {
                        out.push(make_line(*field, rule, &Scope::Scalar(v))?);
                    }
                } else if let Some(r) = fields.record(name) {
                    out.push(make_line(*field, rule, &Scope::Record(r))?);
                }
            } else if let Some(push) = rule.push {
                let Some(list) = fields.list(push) else {
                    continue;
                };
                for rec in list {
                    out.push(make_line(*field, rule, &Scope::Record(rec))?);
                }
            }
        }
    }

    Ok(())
}

const OUTER_ORDER: &[char] = &[
    'v', 'o', 's', 'i', 'u', 'e', 'p', 'c', 'b', 't', 'r', 'z', 'a',
];

const INNER_ORDER: &[char] = &['i', 'c', 'b', 'a'];

/// Serialize a session description, CRLF separated.
///
/// Fails with [`SdpError::Malformed`] when a line misses a mandatory
/// value for its rule.
pub fn write(session: &SdpSession) -> Result<String, SdpError> {
    let mut fields = session.fields.clone();
    // "v=0" must be there (only defined version atm), and "s= " if no
    // meaningful name is set.
    if fields.scalar("version").is_none() {
        fields.set("version", 0i64);
    }
    if fields.scalar("name").is_none() {
        fields.set("name", " ");
    }

    let mut out: Vec<String> = vec![];
    write_fields(&mut out, &fields, OUTER_ORDER)?;

    let (m_rules, _) = rules_for('m').expect("m rule");
    let m_rule = &m_rules[0];

    for media in &session.media {
        let mut m_record = Record::new();
        for name in m_rule.names {
            match media.fields.scalar(name) {
                Some(v) => {
                    m_record.insert(name.to_string(), v.clone());
                }
                // An application section may carry no payloads.
                None if *name == "payloads" => {
                    m_record.insert(name.to_string(), Value::Str(String::new()));
                }
                None => {
                    return Err(SdpError::Malformed(format!("media missing {}", name)));
                }
            }
        }
        out.push(make_line('m', m_rule, &Scope::Record(&m_record))?);

        write_fields(&mut out, &media.fields, INNER_ORDER)?;
    }

    Ok(out.join("\r\n") + "\r\n")
}

/// Parse an a=fmtp style config string ("minptime=10;useinbandfec=1").
///
/// Numeric values coerce to integers, bare keys get an empty value.
pub fn parse_params(config: &str) -> Parameters {
    let mut params = Parameters::new();

    for expr in config.split(';') {
        let expr = expr.trim();
        let mut split = expr.splitn(2, '=');
        let key = split.next().unwrap_or_default();
        match split.next() {
            Some(value) => {
                params.insert(key.to_string(), Value::coerce(value));
            }
            None if expr.len() > 1 => {
                params.insert(key.to_string(), Value::Str(String::new()));
            }
            None => {}
        }
    }

    params
}

/// The inverse of [`parse_params`].
pub fn write_params(params: &Parameters) -> String {
    params
        .iter()
        .map(|(k, v)| match v {
            Value::Str(s) if s.is_empty() => k.clone(),
            _ => format!("{}={}", k, v),
        })
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_session_header() {
        let sdp = "v=0\r\n\
                   o=- 20518 0 IN IP4 203.0.113.1\r\n\
                   s=-\r\n\
                   t=0 0\r\n\
                   a=ice-lite\r\n\
                   a=msid-semantic: WMS *\r\n";

        let session = parse(sdp);
        assert_eq!(session.fields.int_of("version"), Some(0));

        let origin = session.fields.record("origin").unwrap();
        assert_eq!(origin.get("username"), Some(&Value::Str("-".into())));
        assert_eq!(origin.get("sessionId"), Some(&Value::Int(20518)));
        assert_eq!(origin.get("ipVer"), Some(&Value::Int(4)));

        assert_eq!(session.fields.str_of("icelite").as_deref(), Some("ice-lite"));
        let msid_semantic = session.fields.record("msidSemantic").unwrap();
        assert_eq!(msid_semantic.get("semantic"), Some(&Value::Str("WMS".into())));
        assert_eq!(msid_semantic.get("token"), Some(&Value::Str("*".into())));
    }

    #[test]
    fn parse_media_section() {
        let sdp = "v=0\r\n\
                   o=- 1 1 IN IP4 0.0.0.0\r\n\
                   s=-\r\n\
                   t=0 0\r\n\
                   m=audio 54400 UDP/TLS/RTP/SAVPF 111 103\r\n\
                   c=IN IP4 203.0.113.1\r\n\
                   a=mid:0\r\n\
                   a=rtpmap:111 opus/48000/2\r\n\
                   a=rtpmap:103 ISAC/16000\r\n\
                   a=fmtp:111 minptime=10;useinbandfec=1\r\n\
                   a=rtcp-fb:111 transport-cc\r\n\
                   a=sendrecv\r\n";

        let session = parse(sdp);
        assert_eq!(session.media.len(), 1);

        let media = &session.media[0];
        assert_eq!(media.typ().as_deref(), Some("audio"));
        assert_eq!(media.port(), Some(54400));
        assert_eq!(
            media.fields.str_of("protocol").as_deref(),
            Some("UDP/TLS/RTP/SAVPF")
        );
        assert_eq!(media.fields.str_of("payloads").as_deref(), Some("111 103"));
        assert_eq!(media.mid().as_deref(), Some("0"));

        let rtp = media.fields.list("rtp").unwrap();
        assert_eq!(rtp.len(), 2);
        assert_eq!(rtp[0].get("payload"), Some(&Value::Int(111)));
        assert_eq!(rtp[0].get("codec"), Some(&Value::Str("opus".into())));
        assert_eq!(rtp[0].get("rate"), Some(&Value::Int(48000)));
        assert_eq!(rtp[0].get("encoding"), Some(&Value::Int(2)));
        // No channel part on the second one.
        assert_eq!(rtp[1].get("encoding"), None);

        let fb = media.fields.list("rtcpFb").unwrap();
        assert_eq!(fb[0].get("type"), Some(&Value::Str("transport-cc".into())));
        assert_eq!(fb[0].get("subtype"), None);

        assert_eq!(media.fields.str_of("direction").as_deref(), Some("sendrecv"));
    }

    #[test]
    fn parse_candidates_with_optional_tail() {
        let sdp = "m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
                   a=candidate:0 1 UDP 2113667327 203.0.113.1 54400 typ host\r\n\
                   a=candidate:3289912957 2 udp 1845501695 193.84.77.194 60017 typ srflx raddr 192.168.34.75 rport 60017 generation 0 network-id 3 network-cost 10\r\n";

        let session = parse(sdp);
        let candidates = session.media[0].fields.list("candidates").unwrap();
        assert_eq!(candidates.len(), 2);

        assert_eq!(candidates[0].get("type"), Some(&Value::Str("host".into())));
        assert_eq!(candidates[0].get("raddr"), None);

        assert_eq!(candidates[1].get("type"), Some(&Value::Str("srflx".into())));
        assert_eq!(
            candidates[1].get("raddr"),
            Some(&Value::Str("192.168.34.75".into()))
        );
        assert_eq!(candidates[1].get("generation"), Some(&Value::Int(0)));
        assert_eq!(candidates[1].get("network-cost"), Some(&Value::Int(10)));
    }

    #[test]
    fn unknown_attribute_goes_to_invalid() {
        let sdp = "m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
                   a=something-unknown:foo bar\r\n";

        let session = parse(sdp);
        let invalid = session.media[0].fields.list("invalid").unwrap();
        assert_eq!(
            invalid[0].get("value"),
            Some(&Value::Str("something-unknown:foo bar".into()))
        );

        // And it survives writing.
        let out = write(&session).unwrap();
        assert!(out.contains("a=something-unknown:foo bar\r\n"));
    }

    #[test]
    fn write_requires_mandatory_fields() {
        let mut session = SdpSession::default();
        let mut origin = Record::new();
        origin.insert("username".into(), "-".into());
        // No sessionId etc.
        session.fields.set_record("origin", origin);

        assert!(write(&session).is_err());
    }

    #[test]
    fn write_defaults_version_and_name() {
        let session = SdpSession::default();
        let out = write(&session).unwrap();
        assert!(out.starts_with("v=0\r\n"));
        assert!(out.contains("s= \r\n"));
    }

    #[test]
    fn simulcast_both_forms() {
        let sdp = "m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
                   a=simulcast:recv r0;r1;r2\r\n";
        let session = parse(sdp);
        let simulcast = session.media[0].fields.record("simulcast").unwrap();
        assert_eq!(simulcast.get("dir1"), Some(&Value::Str("recv".into())));
        assert_eq!(simulcast.get("list1"), Some(&Value::Str("r0;r1;r2".into())));
        assert_eq!(simulcast.get("dir2"), None);

        let sdp = "m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
                   a=simulcast: recv rid=r0;r1;r2\r\n";
        let session = parse(sdp);
        let simulcast = session.media[0].fields.record("simulcast_03").unwrap();
        assert_eq!(
            simulcast.get("value"),
            Some(&Value::Str("recv rid=r0;r1;r2".into()))
        );
        let out = write(&session).unwrap();
        assert!(out.contains("a=simulcast: recv rid=r0;r1;r2\r\n"));
    }

    #[test]
    fn params_round_trip() {
        let params = parse_params("minptime=10;useinbandfec=1;profile-level-id=42e01f");
        assert_eq!(params.get("minptime"), Some(&Value::Int(10)));
        assert_eq!(params.get("useinbandfec"), Some(&Value::Int(1)));
        assert_eq!(
            params.get("profile-level-id"),
            Some(&Value::Str("42e01f".into()))
        );

        let written = write_params(&params);
        assert_eq!(parse_params(&written), params);
    }

    #[test]
    fn params_bare_key() {
        let params = parse_params("stereo=1; sprop-stereo");
        assert_eq!(params.get("stereo"), Some(&Value::Int(1)));
        assert_eq!(params.get("sprop-stereo"), Some(&Value::Str("".into())));

        let written = write_params(&params);
        assert!(written.contains("sprop-stereo"));
        assert!(!written.contains("sprop-stereo="));
    }

    #[test]
    fn full_round_trip_is_stable() {
        let sdp = "v=0\r\n\
                   o=sigrtc-client 10000 2 IN IP4 0.0.0.0\r\n\
                   s=-\r\n\
                   t=0 0\r\n\
                   a=ice-lite\r\n\
                   a=fingerprint:sha-256 A9:F4:E0:D2:74:D3:0F:D9\r\n\
                   a=msid-semantic: WMS *\r\n\
                   a=group:BUNDLE 0 1\r\n\
                   m=audio 7 UDP/TLS/RTP/SAVPF 100\r\n\
                   c=IN IP4 127.0.0.1\r\n\
                   a=mid:0\r\n\
                   a=rtpmap:100 opus/48000/2\r\n\
                   a=fmtp:100 useinbandfec=1\r\n\
                   a=rtcp-fb:100 transport-cc\r\n\
                   a=setup:actpass\r\n\
                   a=recvonly\r\n\
                   a=ice-ufrag:h3hk1iz6qqlnqlne\r\n\
                   a=ice-pwd:yku5ej8nvfaor28lvtrabcx0wkrpkztz\r\n\
                   a=candidate:udpcandidate 1 udp 1078862079 9.9.9.9 40533 typ host\r\n\
                   a=end-of-candidates\r\n\
                   a=ice-options:renomination\r\n\
                   a=ssrc:46687003 cname:wB4Ql4lrsxYLjzuN\r\n\
                   a=rtcp-mux\r\n\
                   a=rtcp-rsize\r\n\
                   m=application 5000 UDP/DTLS/SCTP webrtc-datachannel\r\n\
                   a=mid:1\r\n\
                   a=sctp-port:5000\r\n\
                   a=max-message-size:2000000\r\n";

        let first = parse(sdp);
        let written = write(&first).unwrap();
        let second = parse(&written);
        assert_eq!(first, second);

        // Writing the reparse gives the same text again.
        assert_eq!(write(&second).unwrap(), written);
    }
}
