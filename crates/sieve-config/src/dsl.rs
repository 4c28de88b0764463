//! Endpoint DSL - source/output declaration strings
//!
//! Grammar (case-insensitive on scheme):
//!
//! ```text
//! endpoints   = endpoint ("," endpoint)*
//! endpoint    = uri [";" topic_map] ("!" option)*
//! uri         = scheme "://" authority [path] ["?" query]
//! topic_map   = topic_spec (";" topic_spec)*
//! topic_spec  = [src_topic ">"] dst_topic | "*"
//! option      = key ["=" value]
//! ```
//!
//! Trailing `?` on the authority marks an ephemeral consumer, `??` a doubly
//! ephemeral one. The parser is permissive about option keys: unknown keys
//! are preserved, recognized keys are type-checked.

use std::fmt;

use crate::error::ConfigError;
use crate::Result;

/// The wildcard topic: subscribe to every topic a source offers
pub const WILDCARD_TOPIC: &str = "*";

/// Default topic when an endpoint declares no mapping
const DEFAULT_TOPIC: &str = "main";

/// Ephemerality of a source subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EphemeralMode {
    /// Normal consumer: handshakes and applies backpressure
    #[default]
    None,
    /// Joins without flow control; may lose frames, never blocks upstream
    Ephemeral,
    /// Silent: upstream is not even informed of its presence
    DoublyEphemeral,
}

impl EphemeralMode {
    /// True for either ephemeral flavor
    #[inline]
    pub fn is_ephemeral(self) -> bool {
        !matches!(self, EphemeralMode::None)
    }
}

/// A parsed endpoint URI
///
/// Wire endpoints (`tcp://`) are split into host and port; external schemes
/// (`file://`, `rtsp://`, ...) are preserved opaquely for their collaborator
/// plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUri {
    raw: String,
    scheme: String,
    authority: String,
    path: Option<String>,
    query: Option<String>,
}

impl EndpointUri {
    fn parse(text: &str, pos: usize) -> Result<Self> {
        let sep = text
            .find("://")
            .ok_or_else(|| ConfigError::malformed(pos, "missing '://'"))?;
        let scheme = text[..sep].to_ascii_lowercase();
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::malformed(pos, "invalid scheme"));
        }

        let rest = &text[sep + 3..];
        if rest.is_empty() {
            return Err(ConfigError::malformed(pos + sep + 3, "missing authority"));
        }

        let (before_query, query) = match rest.split_once('?') {
            Some((head, q)) => (head, Some(q.to_string())),
            None => (rest, None),
        };
        let (authority, path) = match before_query.find('/') {
            Some(slash) => (
                &before_query[..slash],
                Some(before_query[slash..].to_string()),
            ),
            None => (before_query, None),
        };
        if authority.is_empty() {
            return Err(ConfigError::malformed(pos + sep + 3, "missing authority"));
        }

        Ok(Self {
            raw: text.to_string(),
            scheme,
            authority: authority.to_string(),
            path,
            query,
        })
    }

    /// The full URI as written (ephemeral marks stripped)
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Lowercased scheme
    #[inline]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The authority component (`host:port` for wire endpoints)
    #[inline]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Path component, if any
    #[inline]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Query component, if any
    #[inline]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// True for the wire transport scheme (`tcp`)
    #[inline]
    pub fn is_wire(&self) -> bool {
        self.scheme == "tcp"
    }

    /// Host part of a wire authority (`*` means all interfaces)
    pub fn host(&self) -> &str {
        match self.authority.rsplit_once(':') {
            Some((host, _)) => host,
            None => &self.authority,
        }
    }

    /// Port part of a wire authority
    pub fn port(&self) -> Option<u16> {
        self.authority
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }
}

impl fmt::Display for EndpointUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One topic mapping on an endpoint
///
/// A plain topic maps to itself; `a>b` renames; `*` matches any topic from
/// any producer and maps it unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMap {
    pub src: String,
    pub dst: String,
}

impl TopicMap {
    /// The identity mapping for a topic
    pub fn identity(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            src: topic.clone(),
            dst: topic,
        }
    }

    /// The wildcard mapping
    pub fn wildcard() -> Self {
        Self::identity(WILDCARD_TOPIC)
    }

    /// True if this is the wildcard mapping
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        self.src == WILDCARD_TOPIC
    }

    /// Map an incoming topic name, if this entry covers it
    ///
    /// The wildcard passes every topic through unchanged.
    pub fn map<'a>(&'a self, topic: &'a str) -> Option<&'a str> {
        if self.is_wildcard() {
            Some(topic)
        } else if self.src == topic {
            Some(&self.dst)
        } else {
            None
        }
    }
}

/// Check a topic name against `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_topic(name: &str) -> bool {
    if name == WILDCARD_TOPIC {
        return true;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Recognized option value kinds
#[derive(Debug, Clone, Copy)]
enum OptionKind {
    Bool,
    Int,
    Enum(&'static [&'static str]),
}

/// Option keys the runtime understands; everything else is preserved
/// verbatim for collaborator plugins.
const RECOGNIZED_OPTIONS: &[(&str, OptionKind)] = &[
    ("sync", OptionKind::Enum(&["loose", "strict", "by_id"])),
    ("window_ms", OptionKind::Int),
    ("outbox", OptionKind::Int),
    ("timeout_ms", OptionKind::Int),
    ("keepalive", OptionKind::Bool),
    ("required", OptionKind::Bool),
    ("log", OptionKind::Enum(&["none", "basic", "pretty"])),
];

/// Key/value options attached to an endpoint with `!key=value`
///
/// A bare `!key` stores the key with no value; boolean getters read it as
/// `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOptions {
    entries: Vec<(String, Option<String>)>,
}

impl EndpointOptions {
    /// Number of options
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no options were given
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if the key is present (with or without a value)
    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// String value of a key, if present with a value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Boolean value of a key; a bare flag reads as `true`
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.entries.iter().find(|(k, _)| k == key) {
            None => Ok(None),
            Some((_, None)) => Ok(Some(true)),
            Some((_, Some(v))) => crate::coerce::parse_bool(v)
                .map(Some)
                .map_err(|reason| ConfigError::invalid_option(key, reason)),
        }
    }

    /// Integer value of a key
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get_str(key) {
            None => Ok(None),
            Some(v) => crate::coerce::parse_i64(v)
                .map(Some)
                .map_err(|reason| ConfigError::invalid_option(key, reason)),
        }
    }

    /// Iterate options in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Keys not in the recognized set
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| !RECOGNIZED_OPTIONS.iter().any(|(name, _)| name == k))
            .collect()
    }

    fn push(&mut self, key: String, value: Option<String>) {
        self.entries.push((key, value));
    }

    /// Type-check recognized keys; unknown keys pass
    fn validate(&self) -> Result<()> {
        for (key, value) in self.iter() {
            let Some((_, kind)) = RECOGNIZED_OPTIONS.iter().find(|(name, _)| *name == key) else {
                continue;
            };
            match (kind, value) {
                (OptionKind::Bool, None) => {}
                (OptionKind::Bool, Some(v)) => {
                    crate::coerce::parse_bool(v)
                        .map_err(|reason| ConfigError::invalid_option(key, reason))?;
                }
                (OptionKind::Int, Some(v)) => {
                    crate::coerce::parse_i64(v)
                        .map_err(|reason| ConfigError::invalid_option(key, reason))?;
                }
                (OptionKind::Int, None) => {
                    return Err(ConfigError::invalid_option(key, "expected an integer value"));
                }
                (OptionKind::Enum(variants), Some(v)) => {
                    crate::coerce::parse_enum_index(v, variants)
                        .map_err(|reason| ConfigError::invalid_option(key, reason))?;
                }
                (OptionKind::Enum(variants), None) => {
                    return Err(ConfigError::invalid_option(
                        key,
                        format!("expected one of: {}", variants.join(", ")),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A declared inbound endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub endpoint: EndpointUri,
    pub ephemeral: EphemeralMode,
    /// Subscribed topics with optional remaps; defaults to `main`
    pub topics: Vec<TopicMap>,
    pub options: EndpointOptions,
}

impl Source {
    /// True if this source subscribes to every topic
    pub fn subscribes_all(&self) -> bool {
        self.topics.iter().any(TopicMap::is_wildcard)
    }

    /// Map a topic arriving on the wire to its local name
    pub fn map_topic<'a>(&'a self, topic: &'a str) -> Option<&'a str> {
        self.topics.iter().find_map(|m| m.map(topic))
    }
}

/// A declared outbound endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub endpoint: EndpointUri,
    /// Published topics with optional rewrites; defaults to `main`
    pub topics: Vec<TopicMap>,
    pub options: EndpointOptions,
}

impl Output {
    /// Map a produced topic to its published name, if this output carries it
    pub fn map_topic<'a>(&'a self, topic: &'a str) -> Option<&'a str> {
        self.topics.iter().find_map(|m| m.map(topic))
    }
}

struct ParsedEndpoint {
    uri: EndpointUri,
    ephemeral: EphemeralMode,
    topics: Vec<TopicMap>,
    options: EndpointOptions,
}

fn parse_topic_spec(spec: &str, pos: usize) -> Result<TopicMap> {
    if spec == WILDCARD_TOPIC {
        return Ok(TopicMap::wildcard());
    }
    let (src, dst) = match spec.split_once('>') {
        Some((src, dst)) => (src.trim(), dst.trim()),
        None => {
            let t = spec.trim();
            (t, t)
        }
    };
    if src.is_empty() || dst.is_empty() {
        return Err(ConfigError::malformed(pos, "empty topic in mapping"));
    }
    for name in [src, dst] {
        if !is_valid_topic(name) {
            return Err(ConfigError::BadTopic {
                name: name.to_string(),
            });
        }
    }
    if src == WILDCARD_TOPIC || dst == WILDCARD_TOPIC {
        // '*' cannot appear on one side of a remap
        return Err(ConfigError::malformed(pos, "wildcard cannot be remapped"));
    }
    Ok(TopicMap {
        src: src.to_string(),
        dst: dst.to_string(),
    })
}

fn parse_endpoint(text: &str, pos: usize) -> Result<ParsedEndpoint> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ConfigError::malformed(pos, "empty endpoint"));
    }

    // Options split off first: everything after the first '!'
    let mut parts = text.split('!');
    let head = parts.next().unwrap_or_default();
    let mut options = EndpointOptions::default();
    for opt in parts {
        if opt.is_empty() {
            return Err(ConfigError::malformed(pos, "empty option"));
        }
        match opt.split_once('=') {
            Some((key, value)) => options.push(key.trim().to_string(), Some(value.to_string())),
            None => options.push(opt.trim().to_string(), None),
        }
    }
    options.validate()?;

    // Topic mappings: segments after the first ';'
    let mut segments = head.split(';');
    let mut uri_text = segments.next().unwrap_or_default().trim().to_string();

    // Ephemerality markers trail the authority
    let ephemeral = if uri_text.ends_with("??") {
        uri_text.truncate(uri_text.len() - 2);
        EphemeralMode::DoublyEphemeral
    } else if uri_text.ends_with('?') {
        uri_text.truncate(uri_text.len() - 1);
        EphemeralMode::Ephemeral
    } else {
        EphemeralMode::None
    };

    let uri = EndpointUri::parse(&uri_text, pos)?;
    if uri.is_wire() && uri.port().is_none() {
        return Err(ConfigError::malformed(pos, "wire endpoint needs host:port"));
    }

    let mut topics = Vec::new();
    for spec in segments {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ConfigError::malformed(pos, "empty topic mapping"));
        }
        topics.push(parse_topic_spec(spec, pos)?);
    }
    if topics.is_empty() {
        topics.push(TopicMap::identity(DEFAULT_TOPIC));
    }

    Ok(ParsedEndpoint {
        uri,
        ephemeral,
        topics,
        options,
    })
}

fn split_endpoints(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == ',' {
            out.push((start, &text[start..i]));
            start = i + 1;
        }
    }
    out.push((start, &text[start..]));
    out
}

/// Parse a comma-separated sources declaration
///
/// Order is preserved; duplicate URIs with different options are distinct
/// sources.
pub fn parse_sources(text: &str) -> Result<Vec<Source>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let mut sources = Vec::new();
    for (pos, part) in split_endpoints(text) {
        let parsed = parse_endpoint(part, pos)?;
        sources.push(Source {
            endpoint: parsed.uri,
            ephemeral: parsed.ephemeral,
            topics: parsed.topics,
            options: parsed.options,
        });
    }
    Ok(sources)
}

/// Parse a list of source declarations, one endpoint per element
pub fn parse_sources_list<S: AsRef<str>>(items: &[S]) -> Result<Vec<Source>> {
    let mut sources = Vec::new();
    for item in items {
        sources.extend(parse_sources(item.as_ref())?);
    }
    Ok(sources)
}

/// Parse a comma-separated outputs declaration
///
/// Ephemerality markers are a consumer concept and are rejected here.
pub fn parse_outputs(text: &str) -> Result<Vec<Output>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let mut outputs = Vec::new();
    for (pos, part) in split_endpoints(text) {
        let parsed = parse_endpoint(part, pos)?;
        if parsed.ephemeral.is_ephemeral() {
            return Err(ConfigError::malformed(
                pos,
                "ephemeral marker is not valid on an output",
            ));
        }
        outputs.push(Output {
            endpoint: parsed.uri,
            topics: parsed.topics,
            options: parsed.options,
        });
    }
    Ok(outputs)
}

/// Parse a list of output declarations, one endpoint per element
pub fn parse_outputs_list<S: AsRef<str>>(items: &[S]) -> Result<Vec<Output>> {
    let mut outputs = Vec::new();
    for item in items {
        outputs.extend(parse_outputs(item.as_ref())?);
    }
    Ok(outputs)
}
