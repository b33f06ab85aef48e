use tracing::instrument;

use crate::{cmd::Command, error::ParseError};

use self::token::{Bracket, Token};

pub mod token;

/// Scan state for one bracket group.
#[derive(Debug, Default)]
struct GroupScanner {
    depth: usize,
    expect_executable: bool,
    opened_at: usize,
    arguments: Vec<String>,
}

enum Step {
    Continue,
    Done,
}

impl GroupScanner {
    fn feed(&mut self, index: usize, token: Token<'_>) -> Result<Step, ParseError> {
        match token {
            Token::Bracket(Bracket::Open) => {
                if self.depth == 0 {
                    self.expect_executable = true;
                    self.opened_at = index;
                } else {
                    self.push(token.as_str());
                }
                self.depth += 1;
            }
            Token::Bracket(Bracket::Close) => match self.depth {
                0 => return Err(ParseError::UnmatchedClose { index }),
                1 => {
                    self.depth = 0;
                    return Ok(Step::Done);
                }
                _ => {
                    self.push(token.as_str());
                    self.depth -= 1;
                }
            },
            Token::Literal(raw) => {
                if self.depth == 0 {
                    return Err(ParseError::StrayToken {
                        index,
                        token: raw.to_owned(),
                    });
                }
                self.push(raw);
            }
        }

        Ok(Step::Continue)
    }

    fn push(&mut self, raw: &str) {
        // argument 0 doubles as the executable name
        if std::mem::take(&mut self.expect_executable) {
            trace!(executable = raw, "found executable");
        }
        self.arguments.push(raw.to_owned());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BracketParser {
    max_arguments: usize,
}

impl Default for BracketParser {
    fn default() -> Self {
        Self::new(8192)
    }
}

impl BracketParser {
    pub fn new(max_arguments: usize) -> Self {
        Self { max_arguments }
    }

    /// Parses the bracket group starting at `tokens[start]`.
    ///
    /// Returns the command and the index of the first token after its
    /// closing bracket. `group` is the 1-based position of the command, used
    /// in errors. Indices in errors are positions within `tokens`.
    #[instrument(level = "trace", skip(self, tokens))]
    pub fn parse_command<S: AsRef<str>>(
        &self,
        tokens: &[S],
        start: usize,
        group: usize,
    ) -> Result<(Command, usize), ParseError> {
        let mut scanner = GroupScanner::default();

        for (index, raw) in tokens.iter().enumerate().skip(start) {
            match scanner.feed(index, Token::classify(raw.as_ref()))? {
                Step::Continue => {}
                Step::Done => {
                    let command = Command::from_tokens(scanner.arguments);
                    trace!(%command, next = index + 1, "parsed command");
                    return Ok((command, index + 1));
                }
            }

            if scanner.arguments.len() > self.max_arguments {
                return Err(ParseError::TooManyArguments {
                    group,
                    limit: self.max_arguments,
                });
            }
        }

        Err(ParseError::UnmatchedOpen {
            index: if scanner.depth > 0 {
                scanner.opened_at
            } else {
                start
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn parse(tokens: &[&str]) -> Result<(Command, usize), ParseError> {
        BracketParser::default().parse_command(tokens, 0, 1)
    }

    fn args(command: &Command) -> Vec<&str> {
        command.arguments().iter().map(String::as_str).collect()
    }

    #[test]
    fn simple_group() {
        let (command, next) = parse(&["[", "echo", "hello", "]", "["]).unwrap();

        assert_eq!(command.executable(), "echo");
        assert_eq!(args(&command), ["echo", "hello"]);
        assert_eq!(next, 4);
    }

    #[test]
    fn nested_brackets_are_literal_arguments() {
        let (command, next) = parse(&["[", "echo", "[", "hi", "]", "]"]).unwrap();

        assert_eq!(args(&command), ["echo", "[", "hi", "]"]);
        assert_eq!(next, 6);
    }

    #[test]
    fn literal_bracket_in_executable_position_is_the_executable() {
        let (command, _) = parse(&["[", "[", "-f", "x", "]", "]"]).unwrap();

        assert_eq!(command.executable(), "[");
        assert_eq!(args(&command), ["[", "-f", "x", "]"]);
    }

    #[test]
    fn empty_group_parses_to_empty_executable() {
        let (command, next) = parse(&["[", "]"]).unwrap();

        assert_eq!(command.executable(), "");
        assert_eq!(next, 2);
        assert!(command.validate(1).is_err());
    }

    #[test]
    fn leading_close_is_unmatched() {
        assert_eq!(parse(&["]", "ls"]), Err(ParseError::UnmatchedClose { index: 0 }));
    }

    #[test]
    fn running_off_the_end_is_unmatched_open() {
        assert_eq!(
            parse(&["[", "ls", "]]"]),
            Err(ParseError::UnmatchedOpen { index: 0 })
        );
        assert_eq!(
            parse(&["[", "echo", "[", "x", "]"]),
            Err(ParseError::UnmatchedOpen { index: 0 })
        );
    }

    #[test]
    fn words_outside_a_group_are_stray() {
        assert_eq!(
            parse(&["ls", "[", "x", "]"]),
            Err(ParseError::StrayToken {
                index: 0,
                token: "ls".into()
            })
        );
    }

    #[test]
    fn start_offsets_are_respected() {
        let tokens = ["[", "a", "]", "[", "b", "c", "]"];
        let parser = BracketParser::default();

        let (first, next) = parser.parse_command(&tokens, 0, 1).unwrap();
        let (second, end) = parser.parse_command(&tokens, next, 2).unwrap();

        assert_eq!(args(&first), ["a"]);
        assert_eq!(args(&second), ["b", "c"]);
        assert_eq!(end, tokens.len());
    }

    #[test]
    fn argument_limit() {
        let parser = BracketParser::new(2);

        assert!(parser.parse_command(&["[", "a", "b", "]"], 0, 1).is_ok());
        assert_eq!(
            parser.parse_command(&["[", "a", "b", "c", "]"], 0, 2),
            Err(ParseError::TooManyArguments { group: 2, limit: 2 })
        );
    }

    #[test]
    fn empty_input_is_unmatched_open() {
        let tokens: [&str; 0] = [];
        assert_eq!(parse(&tokens), Err(ParseError::UnmatchedOpen { index: 0 }));
    }

    fn word() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_./=-]{1,8}"
    }

    proptest! {
        #[test]
        fn two_groups_always_parse(
            a in prop::collection::vec(word(), 1..8),
            b in prop::collection::vec(word(), 1..8),
        ) {
            let mut tokens = vec!["[".to_string()];
            tokens.extend(a.iter().cloned());
            tokens.push("]".into());
            tokens.push("[".into());
            tokens.extend(b.iter().cloned());
            tokens.push("]".into());

            let parser = BracketParser::default();
            let (first, next) = parser.parse_command(&tokens, 0, 1).unwrap();
            let (second, end) = parser.parse_command(&tokens, next, 2).unwrap();

            prop_assert_eq!(first.executable(), a[0].as_str());
            prop_assert_eq!(first.arguments(), a.as_slice());
            prop_assert_eq!(second.executable(), b[0].as_str());
            prop_assert_eq!(second.arguments(), b.as_slice());
            prop_assert_eq!(end, tokens.len());
        }

        #[test]
        fn missing_close_never_parses(a in prop::collection::vec(word(), 0..8)) {
            let mut tokens = vec!["[".to_string()];
            tokens.extend(a);

            prop_assert!(parse_owned(&tokens).is_err());
        }

        #[test]
        fn close_before_open_never_parses(a in prop::collection::vec(word(), 0..8)) {
            let mut tokens = vec!["]".to_string(), "[".to_string()];
            tokens.extend(a);
            tokens.push("]".into());

            prop_assert_eq!(parse_owned(&tokens), Err(ParseError::UnmatchedClose { index: 0 }));
        }
    }

    fn parse_owned(tokens: &[String]) -> Result<(Command, usize), ParseError> {
        BracketParser::default().parse_command(tokens, 0, 1)
    }
}
