/// Inline markup parser. Strips `<...>` tags out of a sentence and records
/// the commands they trigger, keyed by position in the visible text.
///
/// Tag syntax (keywords are case-insensitive, values split at the first `=`):
/// - Commands: `<hidesprite>`, `<closebgconversations>` (or `<closebg>`)
/// - Simple: `<speed=0.5>`, `<wait=1>`, `<action=name>`, `<log=text>`,
///   `<logwarning=text>`, `<logerror=text>`, `<changetheme=name>`,
///   `<removevariable=name>`, `<bgconversation=name>`
/// - Complex: `<sendmessage=target>message</sendmessage>`,
///   `<changesprite=set>sprite</changesprite>`,
///   `<actionwithmessage=action>message</actionwithmessage>`,
///   `<actionwithtarget=action>target</actionwithtarget>`
/// - Variables: `<registerint=name>42</registerint>` stores a value,
///   `<retrieveint=name>` substitutes one (for every variable type)
///
/// Unknown tags are left in the text verbatim.

use thiserror::Error;
use tracing::warn;

use crate::core::variables::VariableStore;
use crate::schema::value::VariableKind;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TagError {
    #[error("tag <{0}> needs a value after '='")]
    MissingValue(String),
    #[error("tag <{tag}> expects a number, found '{value}'")]
    BadNumber { tag: String, value: String },
    #[error("tag <{0}> is never closed")]
    Unclosed(String),
    #[error("closing tag </{0}> has no matching opening tag")]
    StrayClose(String),
    #[error("tag <{tag}> could not store '{value}'")]
    BadLiteral { tag: String, value: String },
}

/// How a tag is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Bare keyword.
    Command,
    /// `keyword=value`.
    Simple,
    /// `keyword=value`, content, closing tag.
    Complex,
}

/// A side effect scheduled at a position in the visible text.
#[derive(Debug, Clone, PartialEq)]
pub enum TagCommand {
    HideSprite,
    CloseBackgroundConversations,
    Speed(f32),
    RemoveVariable(String),
    Wait(f32),
    Action(String),
    Log(String),
    LogWarning(String),
    LogError(String),
    ChangeTheme(String),
    StartBackgroundConversation(String),
    SendMessage { target: String, message: String },
    ChangeSprite { set: String, sprite: String },
    ActionWithMessage { action: String, message: String },
    ActionWithTarget { action: String, target: String },
}

impl TagCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::HideSprite | Self::CloseBackgroundConversations => CommandKind::Command,
            Self::SendMessage { .. }
            | Self::ChangeSprite { .. }
            | Self::ActionWithMessage { .. }
            | Self::ActionWithTarget { .. } => CommandKind::Complex,
            _ => CommandKind::Simple,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTag {
    /// Character index in the stripped text; fires before that character is revealed.
    pub index: usize,
    pub command: TagCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    HideSprite,
    CloseBackground,
    Speed,
    RemoveVariable,
    Wait,
    Action,
    Log,
    LogWarning,
    LogError,
    ChangeTheme,
    StartBackground,
    SendMessage,
    ChangeSprite,
    ActionWithMessage,
    ActionWithTarget,
    Register(VariableKind),
    Retrieve(VariableKind),
}

impl Keyword {
    /// Exact match against the lowercased keyword.
    fn lookup(word: &str) -> Option<Self> {
        let keyword = match word {
            "hidesprite" => Self::HideSprite,
            "closebgconversations" | "closebg" => Self::CloseBackground,
            "speed" => Self::Speed,
            "removevariable" => Self::RemoveVariable,
            "wait" => Self::Wait,
            "action" => Self::Action,
            "log" => Self::Log,
            "logwarning" => Self::LogWarning,
            "logerror" => Self::LogError,
            "changetheme" => Self::ChangeTheme,
            "bgconversation" => Self::StartBackground,
            "sendmessage" => Self::SendMessage,
            "changesprite" => Self::ChangeSprite,
            "actionwithmessage" => Self::ActionWithMessage,
            "actionwithtarget" => Self::ActionWithTarget,
            _ => {
                if let Some(kind) = word.strip_prefix("register") {
                    Self::Register(VariableKind::from_name(kind).ok()?)
                } else if let Some(kind) = word.strip_prefix("retrieve") {
                    Self::Retrieve(VariableKind::from_name(kind).ok()?)
                } else {
                    return None;
                }
            }
        };
        Some(keyword)
    }

    fn is_complex(&self) -> bool {
        matches!(
            self,
            Self::SendMessage
                | Self::ChangeSprite
                | Self::ActionWithMessage
                | Self::ActionWithTarget
                | Self::Register(_)
        )
    }
}

/// A complex tag waiting for its closing tag.
struct OpenTag {
    keyword: Keyword,
    word: String,
    value: String,
    content: String,
}

/// A sentence with markup removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSentence {
    pub text: String,
    /// Sorted by `index`.
    pub tags: Vec<ParsedTag>,
    /// Malformed markup that was dropped. Each one was also logged.
    pub issues: Vec<TagError>,
}

impl ParsedSentence {
    /// Strip markup from `raw`.
    ///
    /// Variable tags act on `variables` immediately: registrations are
    /// stored and retrievals are substituted into the text.
    pub fn parse(raw: &str, variables: &mut VariableStore) -> ParsedSentence {
        let mut scanner = Scanner {
            variables,
            out: ParsedSentence::default(),
            len: 0,
            open: None,
        };
        let chars: Vec<char> = raw.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            if chars[i] != '<' {
                scanner.push_char(chars[i]);
                i += 1;
                continue;
            }

            let Some(end) = chars[i + 1..]
                .iter()
                .position(|c| *c == '<' || *c == '>')
                .map(|p| i + 1 + p)
            else {
                // No closing bracket: the rest is plain text.
                for c in &chars[i..] {
                    scanner.push_char(*c);
                }
                break;
            };
            if chars[end] == '<' {
                // Only the later '<' can open a tag.
                for c in &chars[i..end] {
                    scanner.push_char(*c);
                }
                i = end;
                continue;
            }
            let body: String = chars[i + 1..end].iter().collect();
            scanner.tag(&body);
            i = end + 1;
        }

        scanner.finish()
    }

    /// Number of visible characters.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

}

struct Scanner<'a> {
    variables: &'a mut VariableStore,
    out: ParsedSentence,
    /// Visible characters emitted so far.
    len: usize,
    open: Option<OpenTag>,
}

impl Scanner<'_> {
    fn push_char(&mut self, c: char) {
        match &mut self.open {
            Some(open) => open.content.push(c),
            None => {
                self.out.text.push(c);
                self.len += 1;
            }
        }
    }

    fn push_str(&mut self, s: &str) {
        for c in s.chars() {
            self.push_char(c);
        }
    }

    fn record(&mut self, command: TagCommand) {
        self.out.tags.push(ParsedTag {
            index: self.len,
            command,
        });
    }

    fn issue(&mut self, issue: TagError) {
        warn!("{}, dropping it", issue);
        self.out.issues.push(issue);
    }

    fn tag(&mut self, body: &str) {
        let trimmed = body.trim();

        if let Some(rest) = trimmed.strip_prefix('/') {
            let word = rest.trim().to_ascii_lowercase();
            if let Some(open) = self.open.take() {
                if word.is_empty() || word == open.word {
                    self.close(open);
                } else {
                    // Someone else's closer is part of the content.
                    self.open = Some(open);
                    self.verbatim(body);
                }
                return;
            }
            if Keyword::lookup(&word).is_some() {
                self.issue(TagError::StrayClose(word));
            } else {
                self.verbatim(body);
            }
            return;
        }

        if self.open.is_some() {
            // Markup inside complex content is content.
            self.verbatim(body);
            return;
        }

        let (word, value) = match trimmed.split_once('=') {
            Some((w, v)) => (w.trim().to_ascii_lowercase(), Some(v.trim())),
            None => (trimmed.to_ascii_lowercase(), None),
        };
        let Some(keyword) = Keyword::lookup(&word) else {
            self.verbatim(body);
            return;
        };

        if matches!(keyword, Keyword::HideSprite | Keyword::CloseBackground) {
            self.record(match keyword {
                Keyword::HideSprite => TagCommand::HideSprite,
                _ => TagCommand::CloseBackgroundConversations,
            });
            return;
        }

        let Some(value) = value.filter(|v| !v.is_empty()) else {
            self.issue(TagError::MissingValue(word));
            return;
        };

        if keyword.is_complex() {
            self.open = Some(OpenTag {
                keyword,
                word,
                value: value.to_string(),
                content: String::new(),
            });
            return;
        }

        let command = match keyword {
            Keyword::Speed | Keyword::Wait => {
                let Ok(number) = value.parse::<f32>() else {
                    self.issue(TagError::BadNumber {
                        tag: word,
                        value: value.to_string(),
                    });
                    return;
                };
                if keyword == Keyword::Speed {
                    TagCommand::Speed(number)
                } else {
                    TagCommand::Wait(number)
                }
            }
            Keyword::RemoveVariable => TagCommand::RemoveVariable(value.to_string()),
            Keyword::Action => TagCommand::Action(value.to_string()),
            Keyword::Log => TagCommand::Log(value.to_string()),
            Keyword::LogWarning => TagCommand::LogWarning(value.to_string()),
            Keyword::LogError => TagCommand::LogError(value.to_string()),
            Keyword::ChangeTheme => TagCommand::ChangeTheme(value.to_string()),
            Keyword::StartBackground => TagCommand::StartBackgroundConversation(value.to_string()),
            Keyword::Retrieve(kind) => {
                let text = self.variables.retrieve_as(value, kind).to_string();
                self.push_str(&text);
                return;
            }
            _ => return,
        };
        self.record(command);
    }

    fn verbatim(&mut self, body: &str) {
        self.push_char('<');
        self.push_str(body);
        self.push_char('>');
    }

    fn close(&mut self, open: OpenTag) {
        let OpenTag {
            keyword,
            word,
            value,
            content,
        } = open;
        let command = match keyword {
            Keyword::SendMessage => TagCommand::SendMessage {
                target: value,
                message: content,
            },
            Keyword::ChangeSprite => TagCommand::ChangeSprite {
                set: value,
                sprite: content,
            },
            Keyword::ActionWithMessage => TagCommand::ActionWithMessage {
                action: value,
                message: content,
            },
            Keyword::ActionWithTarget => TagCommand::ActionWithTarget {
                action: value,
                target: content,
            },
            Keyword::Register(kind) => {
                if self.variables.register_parsed(&value, &content, kind).is_err() {
                    self.out.issues.push(TagError::BadLiteral {
                        tag: word,
                        value: content,
                    });
                }
                return;
            }
            _ => return,
        };
        self.record(command);
    }

    fn finish(mut self) -> ParsedSentence {
        if let Some(open) = self.open.take() {
            self.issue(TagError::Unclosed(open.word));
        }
        debug_assert_eq!(self.len, self.out.char_count());
        self.out
    }
}
