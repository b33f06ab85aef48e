use std::str::FromStr;

use strum::EnumString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
pub enum Bracket {
    #[strum(serialize = "[")]
    Open,
    #[strum(serialize = "]")]
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Bracket(Bracket),
    Literal(&'a str),
}

impl<'a> Token<'a> {
    /// Only a token that is exactly `[` or `]` is a bracket; `[[`, `]]`, `[x`
    /// and friends are plain words.
    pub fn classify(raw: &'a str) -> Self {
        match Bracket::from_str(raw) {
            Ok(bracket) => Self::Bracket(bracket),
            Err(_) => Self::Literal(raw),
        }
    }

    pub fn as_str(&self) -> &'a str {
        match *self {
            Self::Bracket(Bracket::Open) => "[",
            Self::Bracket(Bracket::Close) => "]",
            Self::Literal(raw) => raw,
        }
    }
}
