//! `server.properties` reader
//!
//! Java properties syntax: `key=value` or `key:value`, `#`/`!` comments,
//! backslash escapes (including `\uXXXX`) and trailing-backslash line
//! continuations.

use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;

pub const FILE_NAME: &str = "server.properties";

/// Parsed `server.properties` with typed accessors for the keys we report.
#[derive(Debug, Clone, Default)]
pub struct ServerProperties {
    values: HashMap<String, String>,
}

impl ServerProperties {
    /// Read `<dir>/server.properties`. A missing file yields empty properties.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::parse(&raw))
    }

    pub fn parse(raw: &str) -> Self {
        Self {
            values: parse_properties(raw),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn get_or<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.get(key).filter(|v| !v.is_empty()).unwrap_or(fallback)
    }

    fn get_bool(&self, key: &str, fallback: bool) -> bool {
        match self.get(key).map(str::trim) {
            Some("true") => true,
            Some("false") => false,
            _ => fallback,
        }
    }

    pub fn motd(&self) -> &str {
        self.get_or("motd", "A Minecraft Server")
    }

    pub fn server_port(&self) -> u16 {
        self.get("server-port")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(25565)
    }

    pub fn max_players(&self) -> Option<u32> {
        self.get("max-players").and_then(|v| v.trim().parse().ok())
    }

    pub fn gamemode(&self) -> &str {
        self.get_or("gamemode", "survival")
    }

    pub fn difficulty(&self) -> &str {
        self.get_or("difficulty", "easy")
    }

    pub fn pvp(&self) -> bool {
        self.get_bool("pvp", true)
    }

    pub fn white_list(&self) -> bool {
        self.get_bool("white-list", false)
    }

    pub fn level_name(&self) -> &str {
        self.get_or("level-name", "world")
    }
}

/// Parse Java properties text into a key/value map. Later keys win.
pub fn parse_properties(raw: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut logical = String::new();

    for line in raw.lines() {
        // Leading whitespace is insignificant, continuation lines included.
        let line = line.trim_start();

        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        if ends_with_continuation(line) {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }
        logical.push_str(line);

        let (key, value) = split_entry(&logical);
        map.insert(unescape(key), unescape(value));
        logical.clear();
    }

    if !logical.is_empty() {
        let (key, value) = split_entry(&logical);
        map.insert(unescape(key), unescape(value));
    }

    map
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
    line.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}

/// Split at the first unescaped `=`, `:` or whitespace.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..i], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{0c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"#Minecraft server properties
#Mon Jan 01 00:00:00 UTC 2024
enable-command-block=false
gamemode=creative
motd=§aWelcome\! to the server
pvp=false
difficulty=hard
max-players=64
server-port=25570
white-list=true
level-name=my world
";

    #[test]
    fn reads_typed_fields() {
        let props = ServerProperties::parse(SAMPLE);
        assert_eq!(props.gamemode(), "creative");
        assert_eq!(props.difficulty(), "hard");
        assert_eq!(props.motd(), "\u{00A7}aWelcome! to the server");
        assert!(!props.pvp());
        assert!(props.white_list());
        assert_eq!(props.max_players(), Some(64));
        assert_eq!(props.server_port(), 25570);
        assert_eq!(props.level_name(), "my world");
    }

    #[test]
    fn missing_keys_fall_back() {
        let props = ServerProperties::parse("");
        assert_eq!(props.server_port(), 25565);
        assert_eq!(props.level_name(), "world");
        assert_eq!(props.max_players(), None);
        assert!(props.pvp());
    }

    #[test]
    fn separators_and_continuations() {
        let map = parse_properties("a : 1\nb 2\nc=long \\\n    value\nd\\=x=3\n");
        assert_eq!(map["a"], "1");
        assert_eq!(map["b"], "2");
        assert_eq!(map["c"], "long value");
        assert_eq!(map["d=x"], "3");
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let props = ServerProperties::load(dir.path()).unwrap();
        assert!(props.get("motd").is_none());
    }
}
