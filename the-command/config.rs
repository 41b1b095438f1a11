use std::sync::Arc;

use serde::{
  Deserialize,
  Serialize,
};

use crate::{
  error::Result,
  flag_syntax::{
    DefaultFlagSyntax,
    UnknownFlagPolicy,
  },
  syntax::{
    DefaultSyntax,
    RegexSyntax,
    Syntax,
  },
};

/// Tokenizer used for command lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxKind {
  /// Shell-like quoting with backslash escapes.
  #[default]
  Default,
  /// Regex driven quoting with single-value flags.
  Spout,
}

/// What dispatch does with a subcommand token that names nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownSubcommand {
  #[default]
  Error,
  Ignore,
}

/// Options of a [`crate::CommandManager`].
///
/// ```toml
/// case-sensitive = false
/// root = "server:root"
/// syntax = "default"
/// unknown-flags = "error"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CommandsConfig {
  /// Whether child and alias names are matched case-sensitively. Full command
  /// names are always case-insensitive.
  pub case_sensitive:     bool,
  /// Full name of the root command.
  pub root:               String,
  pub syntax:             SyntaxKind,
  /// Only used by the default syntax.
  pub unknown_flags:      UnknownFlagPolicy,
  /// Whether `--` ends the flags. Only used by the default syntax.
  pub end_of_flags:       bool,
  pub unknown_subcommand: UnknownSubcommand,
}

impl Default for CommandsConfig {
  fn default() -> Self {
    Self {
      case_sensitive:     true,
      root:               "flow:root".to_string(),
      syntax:             SyntaxKind::Default,
      unknown_flags:      UnknownFlagPolicy::Stop,
      end_of_flags:       true,
      unknown_subcommand: UnknownSubcommand::Error,
    }
  }
}

impl CommandsConfig {
  pub fn from_toml_str(source: &str) -> Result<Self> {
    Ok(toml::from_str(source)?)
  }

  pub fn build_syntax(&self) -> Result<Arc<dyn Syntax>> {
    Ok(match self.syntax {
      SyntaxKind::Default => {
        Arc::new(DefaultSyntax::with_flag_syntax(Arc::new(DefaultFlagSyntax::new(
          self.unknown_flags,
          self.end_of_flags,
        ))))
      },
      SyntaxKind::Spout => {
        if self.unknown_flags != UnknownFlagPolicy::default() {
          tracing::warn!(
            unknown_flags = ?self.unknown_flags,
            "the spout syntax ignores the unknown flag policy"
          );
        }
        Arc::new(RegexSyntax::spout()?)
      },
    })
  }
}
