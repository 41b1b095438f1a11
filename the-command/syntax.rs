//! Tokenization rules for command lines.
//!
//! A [`Syntax`] splits a raw line into tokens and knows how to escape and
//! unescape the text of a single token. Tokens are kept in their escaped
//! ("raw") form: quotes and backslashes stay in the token text until the token
//! is read through [`Syntax::unescape`]. Keeping the raw form around is what
//! allows [`crate::CommandArguments`] to map cursor offsets in the original
//! line to arguments and back.
//!
//! Two syntaxes are provided:
//!
//! | Syntax            | Quoting                                          |
//! |-------------------|--------------------------------------------------|
//! | [`DefaultSyntax`] | `'..'` and `".."` anywhere in a token, `\x` escapes any char |
//! | [`RegexSyntax`]   | pattern driven; [`RegexSyntax::spout`] is the legacy engine syntax |
//!
//! Consecutive separators never produce empty arguments. They are folded into
//! the padding of the token that follows them, see [`Tokens`].

use std::{
  collections::HashMap,
  fmt,
  mem,
  sync::Arc,
};

use parking_lot::Mutex;
use regex::Regex;

use crate::flag_syntax::{
  DefaultFlagSyntax,
  FlagSyntax,
  SpoutFlagSyntax,
};

/// A quote that was opened but never closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnclosedQuote {
  pub quote: char,
  /// Byte offset of the opening quote in the original line.
  pub start: usize,
}

/// The result of splitting a line with [`Syntax::split_no_empties`].
///
/// `paddings[i]` is the number of separators in front of `tokens[i]` beyond
/// the single separator that normally precedes it. For the first token it is
/// the number of leading separators. A line ending in a separator yields a
/// trailing empty token, which is where a completion cursor at the end of the
/// line points to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens {
  pub tokens:         Vec<String>,
  pub paddings:       Vec<usize>,
  pub unclosed_quote: Option<UnclosedQuote>,
}

impl Tokens {
  /// Rebuilds the text the tokens were split from.
  pub fn join(&self, separator: &str) -> String {
    let mut out = String::new();
    for (i, (token, padding)) in self.tokens.iter().zip(&self.paddings).enumerate() {
      if i > 0 {
        out.push_str(separator);
      }
      for _ in 0..*padding {
        out.push_str(separator);
      }
      out.push_str(token);
    }
    out
  }
}

pub trait Syntax: fmt::Debug + Send + Sync {
  fn separator(&self) -> &str;

  /// Splits `input` on separators, keeping quoted text together.
  ///
  /// Empty pieces are kept, so joining the output with the separator yields
  /// `input` again.
  fn split(&self, input: &str) -> (Vec<String>, Option<UnclosedQuote>);

  /// Removes quoting and escaping from a single raw token.
  fn unescape(&self, input: &str) -> String;

  /// Escapes `input` so that it is read back as a single token equal to
  /// `input`.
  fn escape(&self, input: &str) -> String;

  /// The flag syntax used by flag registries that don't pick their own.
  fn default_flag_syntax(&self) -> Option<Arc<dyn FlagSyntax>> {
    None
  }

  /// Like [`Syntax::split`] but folds empty pieces into paddings.
  fn split_no_empties(&self, input: &str) -> Tokens {
    let (pieces, unclosed_quote) = self.split(input);
    let count = pieces.len();
    let mut tokens = Tokens {
      tokens: Vec::with_capacity(count),
      paddings: Vec::with_capacity(count),
      unclosed_quote,
    };

    let mut pending = 0;
    for (i, piece) in pieces.into_iter().enumerate() {
      if piece.is_empty() && i + 1 < count {
        pending += 1;
        continue;
      }
      tokens.tokens.push(piece);
      tokens.paddings.push(pending);
      pending = 0;
    }
    tokens
  }
}

/// Space separated tokens with shell-like quoting.
///
/// Quotes (`'` or `"`) may start anywhere inside a token and group everything
/// up to the matching quote, separators included. A backslash escapes the
/// following character, whatever it is, so `\"` never opens or closes a quote
/// and `\ ` does not separate. A trailing lone backslash is kept literally.
#[derive(Clone)]
pub struct DefaultSyntax {
  flag_syntax: Arc<dyn FlagSyntax>,
}

impl DefaultSyntax {
  pub const SEPARATOR: &'static str = " ";

  pub fn new() -> Self {
    Self::with_flag_syntax(Arc::new(DefaultFlagSyntax::default()))
  }

  pub fn with_flag_syntax(flag_syntax: Arc<dyn FlagSyntax>) -> Self {
    Self { flag_syntax }
  }

  fn parse(&self, input: &str, unescape: bool, split: bool) -> (Vec<String>, Option<UnclosedQuote>) {
    let mut output = Vec::new();
    let mut current = String::new();
    let mut quote: Option<UnclosedQuote> = None;

    let mut chars = input.char_indices();
    while let Some((pos, ch)) = chars.next() {
      if split && ch == ' ' && quote.is_none() {
        output.push(mem::take(&mut current));
        continue;
      }

      if ch == '\\' {
        match chars.next() {
          Some((_, escaped)) => {
            if !unescape {
              current.push(ch);
            }
            current.push(escaped);
          },
          None => current.push(ch),
        }
        continue;
      }

      match quote {
        Some(open) if open.quote == ch => {
          quote = None;
          if !unescape {
            current.push(ch);
          }
        },
        None if matches!(ch, '\'' | '"') => {
          quote = Some(UnclosedQuote {
            quote: ch,
            start: pos,
          });
          if !unescape {
            current.push(ch);
          }
        },
        _ => current.push(ch),
      }
    }
    output.push(current);

    (output, quote)
  }
}

impl Default for DefaultSyntax {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for DefaultSyntax {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DefaultSyntax")
      .field("flag_syntax", &self.flag_syntax)
      .finish()
  }
}

impl Syntax for DefaultSyntax {
  fn separator(&self) -> &str {
    Self::SEPARATOR
  }

  fn split(&self, input: &str) -> (Vec<String>, Option<UnclosedQuote>) {
    self.parse(input, false, true)
  }

  fn unescape(&self, input: &str) -> String {
    let (mut out, _) = self.parse(input, true, false);
    out.pop().unwrap_or_default()
  }

  fn escape(&self, input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
      if matches!(ch, ' ' | '"' | '\'' | '\\') {
        out.push('\\');
      }
      out.push(ch);
    }
    out
  }

  fn default_flag_syntax(&self) -> Option<Arc<dyn FlagSyntax>> {
    Some(self.flag_syntax.clone())
  }
}

/// A syntax described by regular expressions.
///
/// * `quote_start` must capture the opening quote in group 1.
/// * `quote_end` is a pattern template where `%s` is replaced by the escaped
///   quote; group 1 must capture the closing quote.
/// * `separator_pattern` must capture the separator in group 1.
/// * `unescape` is replaced by its group 1 after quotes have been stripped.
/// * every match of `escape_match` is replaced by `escape_replace` (regex
///   replacement syntax, `${0}` is the match).
pub struct RegexSyntax {
  quote_start:       Regex,
  quote_end:         String,
  separator:         String,
  separator_pattern: Regex,
  unescape:          Regex,
  escape_match:      Regex,
  escape_replace:    String,
  flag_syntax:       Option<Arc<dyn FlagSyntax>>,
  quote_ends:        Mutex<HashMap<String, Regex>>,
}

impl RegexSyntax {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    flag_syntax: Option<Arc<dyn FlagSyntax>>,
    quote_start: &str,
    quote_end: &str,
    separator: &str,
    separator_pattern: &str,
    unescape: &str,
    escape_match: &str,
    escape_replace: &str,
  ) -> Result<Self, regex::Error> {
    Ok(Self {
      quote_start: Regex::new(quote_start)?,
      quote_end: quote_end.to_string(),
      separator: separator.to_string(),
      separator_pattern: Regex::new(separator_pattern)?,
      unescape: Regex::new(unescape)?,
      escape_match: Regex::new(escape_match)?,
      escape_replace: escape_replace.to_string(),
      flag_syntax,
      quote_ends: Mutex::new(HashMap::new()),
    })
  }

  /// The syntax of the old Spout engine: quotes only open at the start of a
  /// word and only close at the end of one, `\"` and `\'` escape quotes.
  pub fn spout() -> Result<Self, regex::Error> {
    Self::new(
      Some(Arc::new(SpoutFlagSyntax::new(false))),
      r#"(?:^| )(['"])"#,
      r"[^\\](%s)(?: |$)",
      " ",
      "( )",
      r#"\\(["'])"#,
      r#"['"]"#,
      r"\${0}",
    )
  }

  /// A broken `quote_end` template never closes quotes.
  fn quote_end_pattern(&self, quote: &str) -> Option<Regex> {
    let mut cache = self.quote_ends.lock();
    if let Some(pattern) = cache.get(quote) {
      return Some(pattern.clone());
    }
    let source = self.quote_end.replacen("%s", &regex::escape(quote), 1);
    match Regex::new(&source) {
      Ok(pattern) => {
        cache.insert(quote.to_string(), pattern.clone());
        Some(pattern)
      },
      Err(err) => {
        tracing::warn!(%err, quote, "invalid quote end pattern");
        None
      },
    }
  }

  fn split_ignore_quotes(&self, input: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut index = 0;
    while let Some(sep) = self
      .separator_pattern
      .captures_at(input, index)
      .and_then(|caps| caps.get(1))
    {
      if sep.end() == sep.start() {
        break;
      }
      result.push(input[index..sep.start()].to_string());
      index = sep.end();
    }
    result.push(input[index..].to_string());
    result
  }

  fn append_split(&self, args: &mut Vec<String>, text: &str) {
    let mut pieces = self.split_ignore_quotes(text).into_iter();
    if let (Some(first), Some(last)) = (pieces.next(), args.last_mut()) {
      last.push_str(&first);
    }
    args.extend(pieces);
  }
}

impl fmt::Debug for RegexSyntax {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RegexSyntax")
      .field("quote_start", &self.quote_start.as_str())
      .field("quote_end", &self.quote_end)
      .field("separator", &self.separator)
      .finish_non_exhaustive()
  }
}

impl Syntax for RegexSyntax {
  fn separator(&self) -> &str {
    &self.separator
  }

  fn split(&self, input: &str) -> (Vec<String>, Option<UnclosedQuote>) {
    let mut args = vec![String::new()];
    let mut unclosed = None;
    let mut index = 0;

    while let Some(quote) = self
      .quote_start
      .captures_at(input, index)
      .and_then(|caps| caps.get(1))
    {
      let start = quote.start();
      self.append_split(&mut args, &input[index..start]);

      let end = self
        .quote_end_pattern(quote.as_str())
        .and_then(|pattern| pattern.captures_at(input, start + quote.len()))
        .and_then(|caps| caps.get(1));
      index = match end {
        Some(end) => end.end(),
        None => {
          unclosed = quote.as_str().chars().next().map(|quote| UnclosedQuote { quote, start });
          input.len()
        },
      };

      if let Some(last) = args.last_mut() {
        last.push_str(&input[start..index]);
      }
      if index >= input.len() {
        break;
      }
    }

    if index < input.len() {
      self.append_split(&mut args, &input[index..]);
    }
    (args, unclosed)
  }

  fn unescape(&self, input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut index = 0;

    while let Some(caps) = self.quote_start.captures_at(input, index) {
      let Some(quote) = caps.get(1) else {
        break;
      };
      out.push_str(&input[index..quote.start()]);
      let end = self
        .quote_end_pattern(quote.as_str())
        .and_then(|pattern| pattern.captures_at(input, quote.end()))
        .and_then(|caps| caps.get(1));
      match end {
        Some(end) => {
          out.push_str(&input[quote.end()..end.start()]);
          index = end.end();
        },
        None => {
          out.push_str(&input[quote.end()..]);
          index = input.len();
        },
      }
      if index >= input.len() {
        break;
      }
    }
    if index < input.len() {
      out.push_str(&input[index..]);
    }

    self.unescape.replace_all(&out, "${1}").into_owned()
  }

  fn escape(&self, input: &str) -> String {
    self
      .escape_match
      .replace_all(input, self.escape_replace.as_str())
      .into_owned()
  }

  fn default_flag_syntax(&self) -> Option<Arc<dyn FlagSyntax>> {
    self.flag_syntax.clone()
  }
}
