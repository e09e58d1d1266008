//! Pure, network-free IRC/CTCP/DCC protocol helpers.
//!
//! Kept separate from `signaling::SignalingClient` so the line-parsing
//! and encoding rules — the part most worth unit-testing in isolation —
//! don't need a live socket to exercise.

use std::net::Ipv4Addr;

use rand::distributions::{Distribution, Uniform};
use rand::thread_rng;

/// Length of the random nick generated after a `nicknameinuse` collision.
const RANDOM_NICK_LEN: usize = 12;

/// A parsed IRC line: `[:prefix] COMMAND param0 param1 ... :trailing`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParsedLine {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

/// Parses one IRC protocol line (without its trailing `\r\n`).
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let mut rest = line;
    let mut prefix = None;
    if let Some(stripped) = rest.strip_prefix(':') {
        let (p, r) = stripped.split_once(' ')?;
        prefix = Some(p.to_owned());
        rest = r;
    }

    let (head, trailing) = match rest.split_once(" :") {
        Some((h, t)) => (h, Some(t)),
        None => (rest, None),
    };

    let mut parts = head.split(' ').filter(|s| !s.is_empty());
    let command = parts.next()?.to_owned();
    let mut params: Vec<String> = parts.map(str::to_owned).collect();
    if let Some(t) = trailing {
        params.push(t.to_owned());
    }

    Some(ParsedLine {
        prefix,
        command,
        params,
    })
}

/// Extracts the nick portion of an IRC prefix (`nick!user@host` or bare
/// `nick`).
pub fn nick_from_prefix(prefix: &str) -> &str {
    prefix.split('!').next().unwrap_or(prefix)
}

/// Wraps `text` as a CTCP message of the given `kind` (e.g. `DCC`).
pub fn wrap_ctcp(kind: &str, text: &str) -> String {
    format!("\u{1}{} {}\u{1}", kind, text)
}

/// Strips the CTCP `\x01 ... \x01` envelope, if present.
fn unwrap_ctcp(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('\u{1}')?;
    inner.strip_suffix('\u{1}').or(Some(inner))
}

/// Parses a CTCP `DCC CHAT <base64-synack> <numeric-ip> <port>` payload,
/// returning `(synack_b64, ip, port)`. Returns `None` for anything else
/// (other CTCP kinds, malformed DCC subcommands) — unrecognized CTCP is
/// silently ignored per spec's "dispatch... silently ignore" posture.
pub fn parse_ctcp_dcc_chat(text: &str) -> Option<(String, Ipv4Addr, u16)> {
    let inner = unwrap_ctcp(text)?;
    let mut parts = inner.split(' ').filter(|s| !s.is_empty());
    if parts.next()? != "DCC" {
        return None;
    }
    if parts.next()? != "CHAT" {
        return None;
    }
    let synack_b64 = parts.next()?.to_owned();
    let ip = decode_numeric_ip(parts.next()?)?;
    let port: u16 = parts.next()?.parse().ok()?;
    Some((synack_b64, ip, port))
}

/// Encodes an IPv4 address the way IRC DCC traditionally does: a single
/// decimal integer, big-endian.
pub fn encode_numeric_ip(ip: Ipv4Addr) -> String {
    u32::from(ip).to_string()
}

/// Inverse of `encode_numeric_ip`.
pub fn decode_numeric_ip(s: &str) -> Option<Ipv4Addr> {
    s.parse::<u32>().ok().map(Ipv4Addr::from)
}

/// Generates a fresh random alphabetic nick, used after a
/// `nicknameinuse` collision.
pub fn random_nick() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let dist = Uniform::from(0..ALPHABET.len());
    let mut rng = thread_rng();
    (0..RANDOM_NICK_LEN)
        .map(|_| ALPHABET[dist.sample(&mut rng)] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_privmsg_with_prefix_and_trailing() {
        let parsed = parse_line(":alice!u@h PRIVMSG #chan :hello there").unwrap();
        assert_eq!(parsed.prefix.as_deref(), Some("alice!u@h"));
        assert_eq!(parsed.command, "PRIVMSG");
        assert_eq!(parsed.params, vec!["#chan", "hello there"]);
    }

    #[test]
    fn parses_line_without_prefix() {
        let parsed = parse_line("PING :relay.example").unwrap();
        assert_eq!(parsed.prefix, None);
        assert_eq!(parsed.command, "PING");
        assert_eq!(parsed.params, vec!["relay.example"]);
    }

    #[test]
    fn nick_from_prefix_strips_user_host() {
        assert_eq!(nick_from_prefix("alice!u@h"), "alice");
        assert_eq!(nick_from_prefix("alice"), "alice");
    }

    #[test]
    fn numeric_ip_roundtrips() {
        let ip: Ipv4Addr = "127.0.0.1".parse().unwrap();
        let encoded = encode_numeric_ip(ip);
        assert_eq!(decode_numeric_ip(&encoded), Some(ip));
    }

    #[test]
    fn ctcp_dcc_chat_roundtrips() {
        let ip: Ipv4Addr = "10.0.0.5".parse().unwrap();
        let wrapped = wrap_ctcp("DCC", &format!("CHAT b64payload {} 4000", encode_numeric_ip(ip)));
        let (b64, parsed_ip, port) = parse_ctcp_dcc_chat(&wrapped).expect("parses");
        assert_eq!(b64, "b64payload");
        assert_eq!(parsed_ip, ip);
        assert_eq!(port, 4000);
    }

    #[test]
    fn non_dcc_ctcp_is_ignored() {
        assert!(parse_ctcp_dcc_chat("\u{1}VERSION\u{1}").is_none());
    }

    #[test]
    fn random_nick_has_expected_length_and_alphabet() {
        let nick = random_nick();
        assert_eq!(nick.len(), RANDOM_NICK_LEN);
        assert!(nick.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
