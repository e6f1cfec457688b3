//! Script command parsing
//!
//! One line of script text becomes one `Command`. String-argument commands
//! keep the remainder of the line after the keyword (internal spaces
//! preserved), which is why they slice by character offset instead of
//! re-joining tokens. Numeric arguments are parsed strictly; any failure
//! demotes the line to `Unknown` rather than erroring out.

use std::fmt;

/// One of the two byte channels driven by a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    /// Channel A - the instrument under test
    A,
    /// Channel B - the test fixture
    B,
}

impl ChannelId {
    /// Index into channel arrays (A = 0, B = 1)
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "a" | "A" | "0" => Some(Self::A),
            "b" | "B" | "1" => Some(Self::B),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// What a parsed script line means
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// Declared script version (`scriptVersion <text>`)
    ScriptVersion(String),
    /// Start of a named test section (`test <name>`)
    Test(String),
    /// Test description (`desc <text>`)
    Desc(String),
    /// Units used by subsequent `expect` checks (`units <text>`)
    Units(String),
    /// Send a line to a channel (`sendline_a <text>` / `sendline_b <text>`)
    SendLine(ChannelId, String),
    /// Read one line from a channel (`readline_a` / `readline_b`)
    ReadLine(ChannelId),
    /// Discard pending input on a channel (`flush_a` / `flush_b`)
    Flush(ChannelId),
    /// Range check on a numeric response field (`expect <field> <min> <max>`)
    ExpectRange { field: usize, min: f64, max: f64 },
    /// Character check on a response field (`expect_char <field> <pos> <char>`)
    ExpectChar {
        field: usize,
        pos: usize,
        expected: char,
    },
    /// Exact string check on a response field (`expect_str <field> <text>`)
    ExpectString { field: usize, expected: String },
    /// Poll a channel until a substring is seen (`waitfor <a|b> <ms> <text>`)
    WaitFor {
        channel: ChannelId,
        timeout_ms: u64,
        needle: String,
    },
    /// Suspend execution (`sleep <ms>`)
    Sleep(u64),
    /// Ask the operator a yes/no question (`prompt <text>`)
    Prompt(String),
    /// Show text and wait for acknowledgement (`pause <text>`)
    Pause(String),
    /// Stop the test here if an earlier command failed (`end_on_error`)
    EndOnError,
    /// Blank line or `#`/`//` comment
    Comment,
    /// Anything the parser could not make sense of
    Unknown,
}

/// A parsed script line
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// What the line means
    pub kind: CommandKind,
    /// The trimmed source line, kept for diagnostics and log echo
    pub line: String,
    /// 1-based line number in the script file
    pub line_number: usize,
}

impl Command {
    /// Parse one raw script line
    ///
    /// Never fails: unparseable or structurally invalid input yields
    /// `Unknown` with the original line preserved.
    pub fn parse(raw: &str, line_number: usize) -> Self {
        let line = raw.trim().to_string();
        let kind = parse_kind(&line);
        Self {
            kind,
            line,
            line_number,
        }
    }

    /// True if this command opens a new test section
    pub fn is_test(&self) -> bool {
        matches!(self.kind, CommandKind::Test(_))
    }
}

fn parse_kind(line: &str) -> CommandKind {
    if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
        return CommandKind::Comment;
    }

    let tokens: Vec<&str> = line.split([' ', '\t']).filter(|t| !t.is_empty()).collect();
    let keyword = tokens[0];

    // The remainder of the line after the keyword, trimmed. Valid because
    // the trimmed line always starts with its first token.
    let rest = || line[keyword.len()..].trim().to_string();

    match keyword {
        "scriptVersion" => CommandKind::ScriptVersion(rest()),
        "test" => CommandKind::Test(rest()),
        "desc" => CommandKind::Desc(rest()),
        "units" => CommandKind::Units(rest()),
        "prompt" => CommandKind::Prompt(rest()),
        "pause" => CommandKind::Pause(rest()),
        "sendline_a" => CommandKind::SendLine(ChannelId::A, rest()),
        "sendline_b" => CommandKind::SendLine(ChannelId::B, rest()),
        "readline_a" => CommandKind::ReadLine(ChannelId::A),
        "readline_b" => CommandKind::ReadLine(ChannelId::B),
        "flush_a" => CommandKind::Flush(ChannelId::A),
        "flush_b" => CommandKind::Flush(ChannelId::B),
        "end_on_error" => CommandKind::EndOnError,
        "sleep" => parse_sleep(&tokens),
        "expect" => parse_expect(&tokens),
        "expect_char" => parse_expect_char(&tokens),
        "expect_str" => parse_expect_str(&tokens),
        "waitfor" => parse_waitfor(&tokens),
        _ => CommandKind::Unknown,
    }
}

fn parse_field(token: Option<&&str>) -> Option<usize> {
    let field: usize = token?.parse().ok()?;
    if field < 1 {
        return None;
    }
    Some(field)
}

fn parse_sleep(tokens: &[&str]) -> CommandKind {
    match tokens.get(1).and_then(|t| t.parse::<u64>().ok()) {
        Some(ms) => CommandKind::Sleep(ms),
        None => CommandKind::Unknown,
    }
}

fn parse_expect(tokens: &[&str]) -> CommandKind {
    let field = parse_field(tokens.get(1));
    let min = tokens.get(2).and_then(|t| t.parse::<f64>().ok());
    let max = tokens.get(3).and_then(|t| t.parse::<f64>().ok());
    match (field, min, max) {
        (Some(field), Some(min), Some(max)) => CommandKind::ExpectRange { field, min, max },
        _ => CommandKind::Unknown,
    }
}

fn parse_expect_char(tokens: &[&str]) -> CommandKind {
    let field = parse_field(tokens.get(1));
    let pos = parse_field(tokens.get(2));
    let expected = tokens.get(3).and_then(|t| t.chars().next());
    match (field, pos, expected) {
        (Some(field), Some(pos), Some(expected)) => CommandKind::ExpectChar {
            field,
            pos,
            expected,
        },
        _ => CommandKind::Unknown,
    }
}

fn parse_expect_str(tokens: &[&str]) -> CommandKind {
    let field = parse_field(tokens.get(1));
    match (field, tokens.get(2)) {
        (Some(field), Some(expected)) => CommandKind::ExpectString {
            field,
            expected: expected.to_string(),
        },
        _ => CommandKind::Unknown,
    }
}

fn parse_waitfor(tokens: &[&str]) -> CommandKind {
    let channel = tokens.get(1).and_then(|t| ChannelId::from_token(t));
    let timeout_ms = tokens
        .get(2)
        .and_then(|t| t.parse::<i64>().ok())
        .filter(|ms| *ms > 0);
    let needle = tokens.get(3);
    match (channel, timeout_ms, needle) {
        (Some(channel), Some(timeout_ms), Some(needle)) => CommandKind::WaitFor {
            channel,
            timeout_ms: timeout_ms as u64,
            needle: needle.to_string(),
        },
        _ => CommandKind::Unknown,
    }
}
