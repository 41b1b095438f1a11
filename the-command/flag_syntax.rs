//! Surface grammars for flags.
//!
//! | Syntax               | Forms                                                    |
//! |----------------------|----------------------------------------------------------|
//! | [`DefaultFlagSyntax`] | `--name [args..]`, `--name=value`, `-abc [args..]`, `--` |
//! | [`SpoutFlagSyntax`]   | `--name [value]`, `--name=value`, `-abc [value]`         |
//!
//! Tokens that read as numbers (`-5`, `-0.25`) are never flags.

use std::{
  collections::{
    BTreeSet,
    HashMap,
  },
  fmt,
};

use serde::{
  Deserialize,
  Serialize,
};
use smallvec::SmallVec;

use crate::{
  arguments::{
    ArgPos,
    CommandArguments,
    Completion,
  },
  error::{
    ArgResult,
    ArgumentErrorKind,
  },
  flags::{
    CommandFlags,
    CompletionScope,
    FLAG_ARG_NAME,
    Flag,
    FlagCompletion,
    ParsedFlags,
  },
};

pub trait FlagSyntax: fmt::Debug + Send + Sync {
  /// Reads flags at the cursor of `args` into `parsed`, consuming every token
  /// that belongs to them.
  fn parse(
    &self,
    flags: &CommandFlags,
    args: &mut CommandArguments,
    name: &str,
    parsed: &mut ParsedFlags,
  ) -> ArgResult<()>;

  fn complete(
    &self,
    flags: &CommandFlags,
    scope: CompletionScope<'_>,
    args: &mut CommandArguments,
    name: &str,
    cursor: usize,
    candidates: &mut Vec<String>,
  ) -> ArgResult<Completion>;
}

/// What to do with a flag token whose name is not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFlagPolicy {
  /// Consume the token and go on parsing flags.
  Skip,
  /// Stop parsing flags and leave the token to positional parsing.
  #[default]
  Stop,
  /// Fail with [`ArgumentErrorKind::UndefinedFlag`].
  Error,
}

fn is_word_char(ch: char) -> bool {
  ch.is_ascii_alphanumeric() || ch == '_'
}

fn is_numeric(token: &str) -> bool {
  let digits = token.strip_prefix('-').unwrap_or(token);
  digits.starts_with(|ch: char| ch.is_ascii_digit() || ch == '.') && token.parse::<f64>().is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FlagToken<'a> {
  Long { name: &'a str, value: Option<&'a str> },
  Short(&'a str),
}

/// `--name`, `--name=value` or `-abc`.
fn flag_token(token: &str) -> Option<FlagToken<'_>> {
  if is_numeric(token) {
    return None;
  }
  if let Some(long) = token.strip_prefix("--") {
    let (name, value) = match long.split_once('=') {
      Some((name, value)) => (name, Some(value)),
      None => (long, None),
    };
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(is_word_char) && chars.all(|ch| is_word_char(ch) || ch == '-');
    return valid.then_some(FlagToken::Long { name, value });
  }
  let short = token.strip_prefix('-')?;
  (!short.is_empty() && short.chars().all(is_word_char)).then_some(FlagToken::Short(short))
}

fn flag_arg_name(name: &str, i: usize) -> String {
  format!("{FLAG_ARG_NAME}{name}:{i}")
}

enum FlagHit {
  Found {
    label: String,
    index: usize,
    value: Option<String>,
    /// Every flag named by the token, `index` included.
    named: SmallVec<[usize; 4]>,
  },
  Skipped,
  End,
}

/// The flag syntax of [`crate::DefaultSyntax`].
///
/// A short bundle (`-abc`) may only end with a flag that takes arguments.
/// Flag arguments are collected up to the flag's maximum and stop early at
/// anything that looks like a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultFlagSyntax {
  pub unknown_flags: UnknownFlagPolicy,
  /// Treat `--` as the end of the flags.
  pub end_of_flags:  bool,
}

impl Default for DefaultFlagSyntax {
  fn default() -> Self {
    Self {
      unknown_flags: UnknownFlagPolicy::Stop,
      end_of_flags:  true,
    }
  }
}

impl DefaultFlagSyntax {
  pub fn new(unknown_flags: UnknownFlagPolicy, end_of_flags: bool) -> Self {
    Self {
      unknown_flags,
      end_of_flags,
    }
  }

  fn is_end_of_flags(&self, token: &str) -> bool {
    self.end_of_flags && token == "--"
  }

  fn is_flag_like(&self, token: &str) -> bool {
    self.is_end_of_flags(token) || flag_token(token).is_some()
  }

  fn unknown(&self, args: &mut CommandArguments, arg_name: &str, token: String) -> ArgResult<FlagHit> {
    match self.unknown_flags {
      UnknownFlagPolicy::Skip => {
        tracing::debug!(token, "skipping unknown flag");
        args.success(arg_name, token);
        Ok(FlagHit::Skipped)
      },
      UnknownFlagPolicy::Stop => Ok(FlagHit::End),
      UnknownFlagPolicy::Error => {
        Err(args.failure(
          arg_name,
          ArgumentErrorKind::UndefinedFlag,
          format!("Undefined flag presented: {token}"),
        ))
      },
    }
  }

  /// Reads one flag token.
  fn parse_flag(
    &self,
    flags: &CommandFlags,
    args: &mut CommandArguments,
    name: &str,
    arg_name: &str,
  ) -> ArgResult<FlagHit> {
    let current = args.current(arg_name)?;
    if self.is_end_of_flags(&current) {
      args.success(arg_name, current);
      return Ok(FlagHit::End);
    }

    match flag_token(&current) {
      Some(FlagToken::Long { name: long, value }) => {
        let Some(index) = flags.long_index(long) else {
          return self.unknown(args, arg_name, current);
        };
        let label = long.to_string();
        let value = value.map(str::to_string);
        args.success(arg_name, current);
        Ok(FlagHit::Found {
          label,
          index,
          value,
          named: SmallVec::from_slice(&[index]),
        })
      },
      Some(FlagToken::Short(bundle)) => {
        let mut indices = SmallVec::<[(char, usize); 4]>::new();
        for short in bundle.chars() {
          match flags.short_index(short) {
            Some(index) => indices.push((short, index)),
            None => return self.unknown(args, arg_name, current),
          }
        }
        let Some(&(last, last_index)) = indices.last() else {
          return Ok(FlagHit::End);
        };
        for &(short, index) in &indices[..indices.len() - 1] {
          let flag = &flags.flags()[index];
          if flag.min_args() != 0 {
            return Err(args.failure(
              name,
              ArgumentErrorKind::FlagArityMismatch,
              format!(
                "Flag {short} requires {} arguments, but none were present.",
                flag.min_args()
              ),
            ));
          }
        }
        args.success(arg_name, current);
        Ok(FlagHit::Found {
          label: last.to_string(),
          index: last_index,
          value: None,
          named: indices.iter().map(|&(_, index)| index).collect(),
        })
      },
      None => Ok(FlagHit::End),
    }
  }

  /// Collects the arguments of `flag` into a view of their own.
  fn parse_flag_args(
    &self,
    args: &mut CommandArguments,
    name: &str,
    arg_name: &str,
    label: &str,
    flag: &Flag,
    completing: bool,
  ) -> ArgResult<CommandArguments> {
    let begin = args.index();
    let mut overrides = HashMap::new();
    let mut count = 0;
    while count < flag.max_args() && (args.has_input() || (completing && args.has_more())) {
      let flag_arg_name = format!("{arg_name}:{count}");
      let current = args.current_argument(&flag_arg_name, completing, true)?;
      if self.is_flag_like(&current) {
        break;
      }
      if let Some(value) = args.override_for(&flag_arg_name) {
        overrides.insert(count, value.to_string());
      }
      count += 1;
      args.success(&flag_arg_name, current);
    }

    if !completing && count < flag.min_args() {
      return Err(args.failure(
        name,
        ArgumentErrorKind::FlagArityMismatch,
        format!(
          "Flag {label} requires {} arguments, but only {count} was present.",
          flag.min_args()
        ),
      ));
    }
    Ok(args.sub_args(begin, args.index()).with_positional_overrides(overrides))
  }

  fn inline_args(
    &self,
    args: &CommandArguments,
    name: &str,
    label: &str,
    flag: &Flag,
    value: String,
  ) -> ArgResult<CommandArguments> {
    if flag.max_args() == 0 || flag.min_args() > 1 {
      return Err(args.failure(
        name,
        ArgumentErrorKind::FlagArityMismatch,
        format!(
          "Flag {label} takes {}-{} arguments, but one was given inline.",
          flag.min_args(),
          flag.max_args()
        ),
      ));
    }
    Ok(CommandArguments::from_tokens([value]))
  }

  fn complete_flag(
    &self,
    flags: &CommandFlags,
    args: &CommandArguments,
    arg_name: &str,
    pos: ArgPos,
    candidates: &mut Vec<String>,
  ) -> ArgResult<Completion> {
    let current = args.current_argument(arg_name, true, true)?;
    // Parsing would stop at this token too.
    if !current.is_empty() && !current.starts_with('-') {
      return Ok(Completion::Exhausted);
    }
    if let Some(FlagToken::Short(bundle)) = flag_token(&current) {
      let Some(flag) = bundle.chars().last().and_then(|last| flags.short_flag(last)) else {
        return Ok(Completion::None);
      };
      let mut potential = BTreeSet::new();
      if flag.min_args() == 0 {
        potential.extend(flags.short_names().map(String::from));
      }
      if flag.max_args() > 0 {
        potential.insert(String::new());
      }
      // Candidates only extend what is typed, so they are relative to the
      // cursor.
      let offset = pos.offset.max(0) as usize;
      args.complete(arg_name, pos, &potential, offset, candidates);
      return Ok(Completion::At(args.argument_to_offset(pos).max(0) as usize));
    }

    Ok(args.complete(arg_name, pos, &flags.flag_candidates(), 0, candidates))
  }
}

impl FlagSyntax for DefaultFlagSyntax {
  fn parse(
    &self,
    flags: &CommandFlags,
    args: &mut CommandArguments,
    name: &str,
    parsed: &mut ParsedFlags,
  ) -> ArgResult<()> {
    let mut i = 0;
    while args.has_input() {
      let arg_name = flag_arg_name(name, i);
      i += 1;
      let (label, index, value) = match self.parse_flag(flags, args, name, &arg_name)? {
        FlagHit::Found {
          label,
          index,
          value,
          named,
        } => {
          for index in named {
            parsed.mark_present(index);
          }
          (label, index, value)
        },
        FlagHit::Skipped => continue,
        FlagHit::End => break,
      };

      let flag = &flags.flags()[index];
      let flag_args = match value {
        Some(value) => self.inline_args(args, name, &label, flag, value)?,
        None => self.parse_flag_args(args, name, &arg_name, &label, flag, false)?,
      };
      parsed.push_args(index, flag_args);
    }
    Ok(())
  }

  fn complete(
    &self,
    flags: &CommandFlags,
    scope: CompletionScope<'_>,
    args: &mut CommandArguments,
    name: &str,
    cursor: usize,
    candidates: &mut Vec<String>,
  ) -> ArgResult<Completion> {
    let mut i = 0;
    while args.has_more() {
      let arg_name = flag_arg_name(name, i);
      i += 1;
      let pos = args.offset_to_argument(cursor);
      if pos.arg <= 0 && !args.has_override(&arg_name) {
        return self.complete_flag(flags, args, &arg_name, pos, candidates);
      }

      let (label, index) = match self.parse_flag(flags, args, name, &arg_name)? {
        FlagHit::Found { value: Some(_), .. } | FlagHit::Skipped => continue,
        FlagHit::Found { label, index, .. } => (label, index),
        FlagHit::End => return Ok(Completion::Exhausted),
      };

      let flag = &flags.flags()[index];
      if pos.arg > flag.max_args() as isize {
        self.parse_flag_args(args, name, &arg_name, &label, flag, false)?;
        continue;
      }

      // The cursor may be inside this flag's arguments.
      let flag_args = self.parse_flag_args(args, name, &arg_name, &label, flag, true)?;
      if flag_args.remaining() as isize >= pos.arg {
        let ctx = FlagCompletion {
          scope,
          flags,
          flag,
          args,
          flag_args: &flag_args,
        };
        return Ok(match flag.complete(&ctx, cursor, candidates) {
          Completion::Exhausted => Completion::None,
          result => result,
        });
      }
    }
    Ok(Completion::Exhausted)
  }
}

/// The flag syntax of the old Spout engine.
///
/// Flags take at most one value. In overriding mode every flag value is also
/// installed as a named override on the arguments, so a later
/// `pop_string("name")` returns the value given with `--name=value`. In that
/// mode `--name=value` is accepted for names that are not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpoutFlagSyntax {
  override_args: bool,
}

impl SpoutFlagSyntax {
  pub fn new(override_args: bool) -> Self {
    Self { override_args }
  }

  fn handle_flag(
    &self,
    flags: &CommandFlags,
    args: &mut CommandArguments,
    parsed: &mut ParsedFlags,
    arg_name: &str,
    name: &str,
    value: Option<&str>,
  ) -> ArgResult<()> {
    let index = flags.index_of(name);
    let undefined = index.is_none() && (value.is_none() || !self.override_args);
    if undefined {
      return Err(args.failure(
        name,
        ArgumentErrorKind::UndefinedFlag,
        "Undefined flag presented",
      ));
    }
    let name = index.map_or_else(|| name.to_string(), |index| flags.flags()[index].primary_name());

    if self.override_args && args.has(&name) {
      return Err(args.failure(
        &name,
        ArgumentErrorKind::InvalidFormat,
        "This argument has already been provided",
      ));
    }

    if let Some(value) = value {
      if self.override_args {
        args.set_arg_override(name.as_str(), value);
        args.success_fallback(&name, value.to_string());
      }
      if let Some(index) = index {
        parsed.push_args(index, CommandArguments::from_tokens([value]));
        parsed.mark_present(index);
      }
      return Ok(());
    }

    // Undefined flags always come with a value.
    let Some(index) = index else {
      return Ok(());
    };
    let flag = &flags.flags()[index];
    if flag.min_args() > 1 {
      return Err(args.failure(
        &name,
        ArgumentErrorKind::FlagArityMismatch,
        format!(
          "Flag {name} requires {} arguments, but at most one is supported.",
          flag.min_args()
        ),
      ));
    }
    if flag.min_args() == 1 {
      if !args.has_input() {
        return Err(args.failure(
          &name,
          ArgumentErrorKind::FlagArityMismatch,
          "No value for flag requiring value!",
        ));
      }
      let value_arg_name = format!("{arg_name}:1");
      let value = args.current(&value_arg_name)?;
      if self.override_args {
        args.set_arg_override(name.as_str(), value.as_str());
        args.success_fallback(&name, value.clone());
      }
      parsed.push_args(index, CommandArguments::from_tokens([value.as_str()]));
      args.success(&value_arg_name, value);
    } else if self.override_args {
      args.set_arg_override(name.as_str(), "true");
      args.success_fallback(&name, true);
    }

    parsed.mark_present(index);
    Ok(())
  }
}

impl FlagSyntax for SpoutFlagSyntax {
  fn parse(
    &self,
    flags: &CommandFlags,
    args: &mut CommandArguments,
    name: &str,
    parsed: &mut ParsedFlags,
  ) -> ArgResult<()> {
    let mut i = 0;
    while args.has_input() {
      let arg_name = flag_arg_name(name, i);
      i += 1;
      let current = args.current(&arg_name)?;
      let Some(token) = flag_token(&current) else {
        break;
      };
      args.success(&arg_name, current.clone());

      match token {
        FlagToken::Long { name: long, value } => {
          self.handle_flag(flags, args, parsed, &arg_name, long, value)?;
        },
        FlagToken::Short(bundle) => {
          for short in bundle.chars() {
            self.handle_flag(flags, args, parsed, &arg_name, &short.to_string(), None)?;
          }
        },
      }
    }
    Ok(())
  }

  fn complete(
    &self,
    _flags: &CommandFlags,
    _scope: CompletionScope<'_>,
    _args: &mut CommandArguments,
    _name: &str,
    _cursor: usize,
    _candidates: &mut Vec<String>,
  ) -> ArgResult<Completion> {
    Ok(Completion::None)
  }
}
