use std::{ffi::OsString, path::PathBuf};

use crate::{
    cmd::Command,
    error::{PipeTeeError, UsageError},
    parse::{token::Token, BracketParser},
};

pub const USAGE: &str = "usage: pipetee OUTFILE [ EXE ARGS... ] [ EXE ARGS... ]";

/// A fully parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub output: PathBuf,
    pub source: Command,
    pub sink: Command,
}

impl Invocation {
    /// `args` excludes the program name. Both commands are validated, so an
    /// `Invocation` is safe to act on before any file is touched.
    pub fn from_args<S: AsRef<str>>(
        args: &[S],
        parser: &BracketParser,
    ) -> Result<Self, PipeTeeError> {
        let output = match args.first().map(|arg| Token::classify(arg.as_ref())) {
            Some(Token::Literal(path)) if !path.is_empty() => PathBuf::from(path),
            _ => return Err(UsageError::MissingOutfile.into()),
        };

        let mut next = 1;
        let mut parse_group = |group: usize| -> Result<Command, PipeTeeError> {
            if next >= args.len() {
                return Err(UsageError::MissingCommand { found: group - 1 }.into());
            }
            let (command, after) = parser.parse_command(args, next, group)?;
            next = after;
            Ok(command)
        };

        let source = parse_group(1)?;
        let sink = parse_group(2)?;

        if let Some(extra) = args.get(next) {
            let token = extra.as_ref();
            debug!(index = next, token, "trailing arguments after the second command");
            return Err(UsageError::TrailingArguments {
                index: next,
                token: token.to_owned(),
            }
            .into());
        }

        source.validate(1)?;
        sink.validate(2)?;

        Ok(Self {
            output,
            source,
            sink,
        })
    }
}

/// Converts the raw argument vector, rejecting anything that is not UTF-8.
pub fn collect_args<I>(args: I) -> Result<Vec<String>, UsageError>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(index, arg)| arg.into_string().map_err(|_| UsageError::NotUnicode { index }))
        .collect()
}
