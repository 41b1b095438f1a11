//! Flag grammars and flag parse results.
//!
//! A [`CommandFlags`] only describes which flags exist and how many arguments
//! each takes. Reading flags off a [`CommandArguments`] is left to a
//! [`FlagSyntax`] and produces a [`ParsedFlags`] value, so one grammar can be
//! shared by every invocation of a command.

use std::{
  collections::{
    BTreeSet,
    HashMap,
  },
  fmt,
  sync::Arc,
};

use smallvec::SmallVec;

use crate::{
  arguments::{
    CommandArguments,
    Completion,
  },
  command::Command,
  error::ArgResult,
  flag_syntax::{
    DefaultFlagSyntax,
    FlagSyntax,
  },
  sender::CommandSender,
};

/// Prefix of the argument names used for flag tokens: the `i`th flag token
/// parsed under `name` is recorded as `flags.<name>:<i>` and its arguments as
/// `flags.<name>:<i>:<n>`.
pub const FLAG_ARG_NAME: &str = "flags.";

/// Who asked for a completion. Either part is absent when completing outside
/// of a dispatch.
#[derive(Clone, Copy, Default)]
pub struct CompletionScope<'a> {
  pub command: Option<&'a Command>,
  pub sender:  Option<&'a dyn CommandSender>,
}

/// Everything a [`FlagArgCompleter`] may look at.
pub struct FlagCompletion<'a> {
  pub scope:     CompletionScope<'a>,
  pub flags:     &'a CommandFlags,
  pub flag:      &'a Flag,
  /// The arguments the flags were parsed from.
  pub args:      &'a CommandArguments,
  /// The arguments collected for the flag so far.
  pub flag_args: &'a CommandArguments,
}

/// Completes the arguments of one flag.
pub trait FlagArgCompleter: Send + Sync {
  fn complete(&self, ctx: &FlagCompletion<'_>, cursor: usize, candidates: &mut Vec<String>) -> Completion;
}

impl<F> FlagArgCompleter for F
where
  F: Fn(&FlagCompletion<'_>, usize, &mut Vec<String>) -> Completion + Send + Sync,
{
  fn complete(&self, ctx: &FlagCompletion<'_>, cursor: usize, candidates: &mut Vec<String>) -> Completion {
    self(ctx, cursor, candidates)
  }
}

/// A flag definition: its names and how many arguments it takes.
#[derive(Clone)]
pub struct Flag {
  long:      SmallVec<[String; 1]>,
  short:     SmallVec<[char; 2]>,
  min_args:  usize,
  max_args:  usize,
  completer: Option<Arc<dyn FlagArgCompleter>>,
}

impl Flag {
  pub fn new(min_args: usize, max_args: usize) -> Self {
    if max_args < min_args {
      tracing::warn!(min_args, max_args, "flag takes fewer arguments than it requires");
    }
    Self {
      long: SmallVec::new(),
      short: SmallVec::new(),
      min_args,
      max_args: max_args.max(min_args),
      completer: None,
    }
  }

  /// A flag without arguments.
  pub fn boolean() -> Self {
    Self::new(0, 0)
  }

  /// A flag with exactly one argument.
  pub fn value() -> Self {
    Self::new(1, 1)
  }

  pub fn long(mut self, name: impl Into<String>) -> Self {
    self.long.push(name.into());
    self
  }

  pub fn short(mut self, name: char) -> Self {
    self.short.push(name);
    self
  }

  pub fn with_completer(mut self, completer: impl FlagArgCompleter + 'static) -> Self {
    self.completer = Some(Arc::new(completer));
    self
  }

  pub fn long_names(&self) -> &[String] {
    &self.long
  }

  pub fn short_names(&self) -> &[char] {
    &self.short
  }

  pub fn min_args(&self) -> usize {
    self.min_args
  }

  pub fn max_args(&self) -> usize {
    self.max_args
  }

  /// The first long name, or the first short name.
  pub fn primary_name(&self) -> String {
    match (self.long.first(), self.short.first()) {
      (Some(long), _) => long.clone(),
      (None, Some(short)) => short.to_string(),
      (None, None) => String::new(),
    }
  }

  pub fn complete(&self, ctx: &FlagCompletion<'_>, cursor: usize, candidates: &mut Vec<String>) -> Completion {
    match &self.completer {
      Some(completer) => completer.complete(ctx, cursor, candidates),
      None => Completion::None,
    }
  }
}

impl fmt::Debug for Flag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Flag")
      .field("long", &self.long)
      .field("short", &self.short)
      .field("min_args", &self.min_args)
      .field("max_args", &self.max_args)
      .field("completer", &self.completer.is_some())
      .finish()
  }
}

/// A registry of long and short flags parsed from the same position.
pub struct CommandFlags {
  flags:    Vec<Flag>,
  long:     HashMap<String, usize>,
  short:    HashMap<char, usize>,
  syntax:   Option<Arc<dyn FlagSyntax>>,
  fallback: Arc<dyn FlagSyntax>,
}

impl CommandFlags {
  pub fn new() -> Self {
    Self {
      flags:    Vec::new(),
      long:     HashMap::new(),
      short:    HashMap::new(),
      syntax:   None,
      fallback: Arc::new(DefaultFlagSyntax::default()),
    }
  }

  /// Always parse with `syntax`, whatever the arguments' syntax prefers.
  pub fn with_syntax(mut self, syntax: Arc<dyn FlagSyntax>) -> Self {
    self.syntax = Some(syntax);
    self
  }

  /// The syntax used when neither this registry nor the arguments pick one.
  pub fn with_fallback(mut self, syntax: Arc<dyn FlagSyntax>) -> Self {
    self.fallback = syntax;
    self
  }

  /// Registers `flag` under all of its names. Names already taken are
  /// reassigned to `flag`.
  pub fn add(mut self, flag: Flag) -> Self {
    self.insert(flag);
    self
  }

  fn insert(&mut self, flag: Flag) {
    let index = self.flags.len();
    for name in &flag.long {
      self.long.insert(name.clone(), index);
    }
    for name in &flag.short {
      self.short.insert(*name, index);
    }
    self.flags.push(flag);
  }

  /// Registers every flag of `other`.
  pub fn add_all(mut self, other: &CommandFlags) -> Self {
    for flag in &other.flags {
      self.insert(flag.clone());
    }
    self
  }

  pub fn bool_flag(self, long: &str, short: Option<char>) -> Self {
    self.ranged_flag(0, 0, long, short)
  }

  pub fn value_flag(self, long: &str, short: Option<char>) -> Self {
    self.ranged_flag(1, 1, long, short)
  }

  pub fn ranged_flag(self, min_args: usize, max_args: usize, long: &str, short: Option<char>) -> Self {
    let mut flag = Flag::new(min_args, max_args).long(long);
    if let Some(short) = short {
      flag = flag.short(short);
    }
    self.add(flag)
  }

  pub fn flags(&self) -> &[Flag] {
    &self.flags
  }

  pub fn long_names(&self) -> impl Iterator<Item = &str> {
    self.long.keys().map(String::as_str)
  }

  pub fn short_names(&self) -> impl Iterator<Item = char> + '_ {
    self.short.keys().copied()
  }

  pub fn long_index(&self, name: &str) -> Option<usize> {
    self.long.get(name).copied()
  }

  pub fn short_index(&self, name: char) -> Option<usize> {
    self.short.get(&name).copied()
  }

  /// Looks `name` up as a long name, then as a single char short name.
  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.long_index(name).or_else(|| {
      let mut chars = name.chars();
      match (chars.next(), chars.next()) {
        (Some(short), None) => self.short_index(short),
        _ => None,
      }
    })
  }

  pub fn long_flag(&self, name: &str) -> Option<&Flag> {
    self.long_index(name).map(|index| &self.flags[index])
  }

  pub fn short_flag(&self, name: char) -> Option<&Flag> {
    self.short_index(name).map(|index| &self.flags[index])
  }

  pub fn flag(&self, name: &str) -> Option<&Flag> {
    self.index_of(name).map(|index| &self.flags[index])
  }

  pub fn has_flag(&self, name: &str) -> bool {
    self.index_of(name).is_some()
  }

  fn find_syntax(&self, args: &CommandArguments) -> Arc<dyn FlagSyntax> {
    self
      .syntax
      .clone()
      .or_else(|| args.syntax().default_flag_syntax())
      .unwrap_or_else(|| self.fallback.clone())
  }

  /// Parses flags at the cursor of `args`. The result is also recorded in
  /// `args` under `name` without moving the cursor.
  pub fn parse(self: &Arc<Self>, args: &mut CommandArguments, name: &str) -> ArgResult<ParsedFlags> {
    let syntax = self.find_syntax(args);
    let mut parsed = ParsedFlags::new(self.clone());
    syntax.parse(self, args, name, &mut parsed)?;
    tracing::trace!(name, present = ?parsed.present().map(Flag::primary_name).collect::<Vec<_>>(), "parsed flags");
    Ok(args.success_fallback(name, parsed))
  }

  /// Completes the flags at `cursor`. [`Completion::Exhausted`] means the
  /// cursor lies past the flags.
  pub fn complete(
    &self,
    scope: CompletionScope<'_>,
    args: &mut CommandArguments,
    name: &str,
    cursor: usize,
    candidates: &mut Vec<String>,
  ) -> ArgResult<Completion> {
    let syntax = self.find_syntax(args);
    syntax.complete(self, scope, args, name, cursor, candidates)
  }

  /// Candidates for a flag token: `--long` and `-s` for every name.
  pub(crate) fn flag_candidates(&self) -> BTreeSet<String> {
    self
      .long_names()
      .map(|name| format!("--{name}"))
      .chain(self.short_names().map(|name| format!("-{name}")))
      .collect()
  }
}

impl Default for CommandFlags {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for CommandFlags {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CommandFlags")
      .field("flags", &self.flags)
      .field("syntax", &self.syntax)
      .finish_non_exhaustive()
  }
}

#[derive(Debug, Clone, Default)]
struct Occurrences {
  times: usize,
  args:  Vec<CommandArguments>,
}

/// The flags found by one parse.
#[derive(Clone)]
pub struct ParsedFlags {
  flags:       Arc<CommandFlags>,
  occurrences: Vec<Occurrences>,
}

impl ParsedFlags {
  pub fn new(flags: Arc<CommandFlags>) -> Self {
    let occurrences = vec![Occurrences::default(); flags.flags.len()];
    Self { flags, occurrences }
  }

  pub fn flags(&self) -> &Arc<CommandFlags> {
    &self.flags
  }

  /// Counts one more occurrence of the flag at `index`.
  pub fn mark_present(&mut self, index: usize) {
    if let Some(occurrences) = self.occurrences.get_mut(index) {
      occurrences.times += 1;
    }
  }

  /// Stores the arguments of one occurrence of the flag at `index`.
  pub fn push_args(&mut self, index: usize, args: CommandArguments) {
    if let Some(occurrences) = self.occurrences.get_mut(index) {
      occurrences.args.push(args);
    }
  }

  fn occurrences(&self, name: &str) -> Option<&Occurrences> {
    self.occurrences.get(self.flags.index_of(name)?)
  }

  pub fn is_present(&self, name: &str) -> bool {
    self.times_present(name) > 0
  }

  pub fn times_present(&self, name: &str) -> usize {
    self.occurrences(name).map_or(0, |occurrences| occurrences.times)
  }

  /// The arguments of the last occurrence of the flag.
  pub fn args(&self, name: &str) -> Option<&CommandArguments> {
    self.occurrences(name)?.args.last()
  }

  pub fn all_args(&self, name: &str) -> &[CommandArguments] {
    self
      .occurrences(name)
      .map_or(&[][..], |occurrences| &occurrences.args)
  }

  /// Every flag that occurred at least once.
  pub fn present(&self) -> impl Iterator<Item = &Flag> {
    self
      .flags
      .flags
      .iter()
      .zip(&self.occurrences)
      .filter(|(_, occurrences)| occurrences.times > 0)
      .map(|(flag, _)| flag)
  }
}

impl fmt::Debug for ParsedFlags {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_map()
      .entries(
        self
          .flags
          .flags
          .iter()
          .zip(&self.occurrences)
          .filter(|(_, occurrences)| occurrences.times > 0)
          .map(|(flag, occurrences)| (flag.primary_name(), occurrences.times)),
      )
      .finish()
  }
}
