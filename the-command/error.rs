//! Error types shared by argument parsing and command dispatch.
//!
//! Parse failures are values: an [`ArgumentError`] carries an
//! [`ArgumentErrorKind`] and callers decide whether a failure may be replaced
//! by a default by asking [`ArgumentError::is_silenceable`]. Everything that
//! can go wrong while dispatching or registering commands is folded into
//! [`CommandError`].

use thiserror::Error;

/// What went wrong while reading a single argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentErrorKind {
  /// No token was present where one was expected.
  Missing,
  /// A token was present but could not be parsed as the requested type.
  InvalidFormat,
  /// The last token opens a quote that is never closed.
  UnmatchedQuote,
  /// Tokens were left over after a command claimed to be fully parsed.
  TooManyArguments,
  /// A flag name that the command does not declare.
  UndefinedFlag,
  /// A flag received fewer arguments than its declared minimum.
  FlagArityMismatch,
}

impl ArgumentErrorKind {
  /// Only a missing argument may be replaced by a caller supplied default.
  pub const fn is_silenceable(self) -> bool {
    matches!(self, Self::Missing)
  }
}

/// A user facing argument failure.
///
/// `command` holds the part of the command line that was successfully parsed
/// before the failure, which makes the message point at the offending
/// argument: `/tp Steve [destination] invalid: Argument not present`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("/{command} [{arg}] invalid: {reason}")]
pub struct ArgumentError {
  pub command: String,
  pub arg:     String,
  pub kind:    ArgumentErrorKind,
  pub reason:  String,
}

impl ArgumentError {
  pub fn is_silenceable(&self) -> bool {
    self.kind.is_silenceable()
  }
}

#[derive(Debug, Error)]
pub enum CommandError {
  #[error(transparent)]
  Argument(#[from] ArgumentError),
  #[error("Not enough permissions to execute this command.")]
  InsufficientPermission { command: String, permission: String },
  #[error("Unknown subcommand '{name}' of /{parent}")]
  UnknownSubcommand { parent: String, name: String },
  /// A filter or executor refused to run the command. The message is meant to
  /// be shown to the sender as is.
  #[error("{0}")]
  Rejected(String),
  /// The arguments were well formed but the command could not make sense of
  /// them anyway.
  #[error("\"/{command}\" - couldn't parse argument [{arg}]: {reason}")]
  Parse {
    command: String,
    arg:     String,
    reason:  String,
  },
  #[error("child already exists for name {name} in command {parent}")]
  ChildAlreadyExists { parent: String, name: String },
  #[error("alias already created for name {name} in command {parent}")]
  AliasAlreadyExists { parent: String, name: String },
  #[error("invalid command name '{0}', expected a full name like 'provider:name'")]
  InvalidName(String),
  #[error("alias '{0}' resolves through too many aliases")]
  AliasCycle(String),
  #[error("command {0} belongs to a different manager")]
  ForeignCommand(String),
  #[error("failed to parse command configuration: {0}")]
  ConfigParse(#[from] toml::de::Error),
  #[error("failed to write command configuration: {0}")]
  ConfigWrite(#[from] toml::ser::Error),
  #[error("invalid command configuration: {0}")]
  Config(String),
  #[error("invalid tokenizer pattern: {0}")]
  Pattern(#[from] regex::Error),
}

impl CommandError {
  pub fn rejected(message: impl Into<String>) -> Self {
    Self::Rejected(message.into())
  }

  /// Whether the error describes a mistake of the sender (and its message can
  /// be shown to them) rather than a mistake of whoever registered commands.
  pub fn is_user_friendly(&self) -> bool {
    matches!(
      self,
      Self::Argument(_)
        | Self::InsufficientPermission { .. }
        | Self::UnknownSubcommand { .. }
        | Self::Rejected(_)
        | Self::Parse { .. }
    )
  }

  /// The argument failure wrapped by this error, if any.
  pub fn as_argument_error(&self) -> Option<&ArgumentError> {
    match self {
      Self::Argument(err) => Some(err),
      _ => None,
    }
  }
}

pub type Result<T, E = CommandError> = std::result::Result<T, E>;

/// Result of reading arguments off a [`crate::CommandArguments`].
pub type ArgResult<T> = std::result::Result<T, ArgumentError>;
