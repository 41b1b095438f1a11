//! The argument cursor handed to command executors.
//!
//! [`CommandArguments`] owns the tokens of a line and a cursor into them.
//! Values are read with the `pop_*` family; every successful pop goes through
//! [`CommandArguments::success`], which records the typed value under its
//! argument name, extends the "command so far" string used in error messages
//! and advances the cursor. A pop that fails with a silenceable error
//! ([`ArgumentErrorKind::Missing`]) can be turned into a default with
//! [`CommandArguments::potential_default`]; every other failure is final.
//!
//! Overrides stand in for tokens. A named override (see
//! [`CommandArguments::set_arg_override`]) answers every read of that name
//! without consuming input, a positional override (see
//! [`CommandArguments::with_positional_overrides`]) answers the read at a
//! given cursor position.

use std::{
  any::Any,
  collections::{
    BTreeSet,
    HashMap,
    hash_map::Entry,
  },
  fmt,
  sync::Arc,
};

use crate::{
  converters::{
    ArgumentEnum,
    FromArgs,
  },
  error::{
    ArgResult,
    ArgumentError,
    ArgumentErrorKind,
    CommandError,
  },
  flags::{
    CommandFlags,
    ParsedFlags,
  },
  syntax::{
    DefaultSyntax,
    Syntax,
    UnclosedQuote,
  },
  vector::Vector3,
};

/// Prefix of the argument names used for subcommand tokens.
pub const SUBCOMMAND_ARG_NAME: &str = "subcommand:";

/// Type erased parsed value.
pub type ParsedValue = Arc<dyn Any + Send + Sync>;

/// A position inside the line expressed as (argument, offset in argument).
///
/// Both components are signed: a cursor inside the padding in front of a
/// token has a negative offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArgPos {
  pub arg:    isize,
  pub offset: isize,
}

impl ArgPos {
  pub const fn new(arg: isize, offset: isize) -> Self {
    Self { arg, offset }
  }
}

/// Result of a completion request.
///
/// On [`Completion::At`] the candidates replace the text of the line starting
/// at that byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
  At(usize),
  /// Nothing to complete here.
  None,
  /// Flag completion reached the end of the flags; the caller should go on
  /// completing positional arguments.
  Exhausted,
}

impl Completion {
  /// The integer protocol used by line editors: the offset, `-1` or `-2`.
  pub fn as_raw(self) -> isize {
    match self {
      Self::At(offset) => offset as isize,
      Self::None => -1,
      Self::Exhausted => -2,
    }
  }

  pub fn from_raw(raw: isize) -> Self {
    match raw {
      -2 => Self::Exhausted,
      raw if raw < 0 => Self::None,
      raw => Self::At(raw as usize),
    }
  }

  pub fn offset(self) -> Option<usize> {
    match self {
      Self::At(offset) => Some(offset),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
enum Overrides {
  Named(HashMap<String, String>),
  Positional {
    values:   HashMap<usize, String>,
    consumed: usize,
  },
}

#[derive(Clone)]
pub struct CommandArguments {
  tokens:         Vec<String>,
  paddings:       Vec<usize>,
  index:          usize,
  depth:          usize,
  parsed:         HashMap<String, ParsedValue>,
  overrides:      Overrides,
  command_string: String,
  syntax:         Arc<dyn Syntax>,
  /// Tokens were supplied already unescaped and are read as is.
  unescaped:      bool,
  /// Byte offset of the first token in the line this view was taken from.
  origin:         usize,
  unclosed_quote: Option<UnclosedQuote>,
}

impl CommandArguments {
  /// Splits `line` with `syntax`.
  pub fn parse(line: &str, syntax: Arc<dyn Syntax>) -> Self {
    let split = syntax.split_no_empties(line);
    Self {
      tokens: split.tokens,
      paddings: split.paddings,
      index: 0,
      depth: 0,
      parsed: HashMap::new(),
      overrides: Overrides::Named(HashMap::new()),
      command_string: String::new(),
      syntax,
      unescaped: false,
      origin: 0,
      unclosed_quote: split.unclosed_quote,
    }
  }

  /// Wraps tokens that were split and unescaped elsewhere.
  pub fn from_tokens<I>(tokens: I) -> Self
  where
    I: IntoIterator,
    I::Item: Into<String>,
  {
    let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
    Self {
      paddings: vec![0; tokens.len()],
      tokens,
      index: 0,
      depth: 0,
      parsed: HashMap::new(),
      overrides: Overrides::Named(HashMap::new()),
      command_string: String::new(),
      syntax: Arc::new(DefaultSyntax::new()),
      unescaped: true,
      origin: 0,
      unclosed_quote: None,
    }
  }

  /// Switches to positional overrides: the override stored at `i` answers
  /// the read at cursor `i + <overrides consumed so far>`.
  pub fn with_positional_overrides(mut self, values: HashMap<usize, String>) -> Self {
    self.overrides = Overrides::Positional {
      values,
      consumed: 0,
    };
    self
  }

  pub fn syntax(&self) -> &Arc<dyn Syntax> {
    &self.syntax
  }

  pub fn separator(&self) -> &str {
    self.syntax.separator()
  }

  pub fn len(&self) -> usize {
    self.tokens.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tokens.is_empty()
  }

  pub fn index(&self) -> usize {
    self.index
  }

  pub fn depth(&self) -> usize {
    self.depth
  }

  pub fn remaining(&self) -> usize {
    self.tokens.len().saturating_sub(self.index)
  }

  pub fn has_more(&self) -> bool {
    self.index < self.tokens.len()
  }

  /// Whether the cursor stands on the empty token left by a line ending in
  /// a separator.
  pub fn at_trailing_empty(&self) -> bool {
    self.index + 1 == self.tokens.len() && self.tokens[self.index].is_empty()
  }

  /// Whether a token remains that parsing reads as input. The trailing empty
  /// token only exists for completion.
  pub fn has_input(&self) -> bool {
    self.has_more() && !self.at_trailing_empty()
  }

  /// Whether reading `name` now would find something: a token or an
  /// override.
  pub fn has_next(&self, name: &str) -> bool {
    self.has_input() || self.has_override(name)
  }

  /// The tokens that were not consumed yet, in raw form.
  pub fn remaining_tokens(&self) -> &[String] {
    &self.tokens[self.index.min(self.tokens.len())..]
  }

  /// All tokens, consumed or not, in raw form.
  pub fn all(&self) -> &[String] {
    &self.tokens
  }

  pub fn paddings(&self) -> &[usize] {
    &self.paddings
  }

  pub fn unclosed_quote(&self) -> Option<UnclosedQuote> {
    self.unclosed_quote
  }

  /// What was parsed so far, as shown in error messages.
  pub fn past_command_string(&self) -> &str {
    self.command_string.trim()
  }

  /// Rebuilds the text the tokens were split from.
  pub fn raw_string(&self) -> String {
    let separator = self.separator();
    let mut out = String::new();
    for (i, (token, padding)) in self.tokens.iter().zip(&self.paddings).enumerate() {
      if i > 0 {
        out.push_str(separator);
      }
      out.push_str(&separator.repeat(*padding));
      out.push_str(token);
    }
    out
  }

  pub fn unescape(&self, input: &str) -> String {
    self.syntax.unescape(input)
  }

  pub fn escape(&self, input: &str) -> String {
    self.syntax.escape(input)
  }

  /// An independent view of the tokens in `begin..end`.
  ///
  /// Offsets of the view still refer to the line this view was taken from.
  /// Parsed values and named overrides are not carried over.
  pub fn sub_args(&self, begin: usize, end: usize) -> Self {
    let end = end.min(self.tokens.len());
    let begin = begin.min(end);
    let mut paddings = self.paddings[begin..end].to_vec();
    if let Some(first) = paddings.first_mut() {
      *first = 0;
    }
    let origin = self
      .absolute_argument_to_offset(ArgPos::new(begin as isize, 0))
      .max(0) as usize;
    let overrides = match self.overrides {
      Overrides::Named(_) => Overrides::Named(HashMap::new()),
      Overrides::Positional { .. } => {
        Overrides::Positional {
          values:   HashMap::new(),
          consumed: 0,
        }
      },
    };

    Self {
      tokens: self.tokens[begin..end].to_vec(),
      paddings,
      index: 0,
      depth: 0,
      parsed: HashMap::new(),
      overrides,
      command_string: String::new(),
      syntax: self.syntax.clone(),
      unescaped: self.unescaped,
      origin,
      unclosed_quote: if end == self.tokens.len() {
        self.unclosed_quote
      } else {
        None
      },
    }
  }

  // Offsets

  pub fn offset_to_absolute_argument(&self, cursor: usize) -> ArgPos {
    let separator = self.separator().len() as isize;
    let cursor = cursor as isize - self.origin as isize;
    let mut length = 0;
    let mut word = 0;
    while word < self.tokens.len() {
      length += separator * self.paddings[word] as isize;
      let word_length = self.tokens[word].len() as isize + separator;
      if cursor < length + word_length {
        break;
      }
      length += word_length;
      word += 1;
    }
    ArgPos::new(word as isize, cursor - length)
  }

  pub fn offset_to_argument(&self, cursor: usize) -> ArgPos {
    let pos = self.offset_to_absolute_argument(cursor);
    ArgPos::new(pos.arg - self.index as isize, pos.offset)
  }

  pub fn absolute_argument_to_offset(&self, pos: ArgPos) -> isize {
    let separator = self.separator().len() as isize;
    let words = pos.arg.clamp(0, self.tokens.len() as isize) as usize;
    let mut length = self.origin as isize;
    for i in 0..words {
      length += self.tokens[i].len() as isize + separator * (self.paddings[i] as isize + 1);
    }
    if let Some(padding) = self.paddings.get(words) {
      length += separator * *padding as isize;
    }
    length + pos.offset
  }

  pub fn argument_to_offset(&self, pos: ArgPos) -> isize {
    self.absolute_argument_to_offset(ArgPos::new(pos.arg + self.index as isize, pos.offset))
  }

  // Overrides

  pub fn has_override(&self, name: &str) -> bool {
    self.override_for(name).is_some()
  }

  pub fn override_for(&self, name: &str) -> Option<&str> {
    match &self.overrides {
      Overrides::Named(values) => values.get(name),
      Overrides::Positional { values, consumed } => values.get(&(self.index + consumed)),
    }
    .map(String::as_str)
  }

  /// Sets the value read for `name`. The first writer wins.
  ///
  /// Always refused when the arguments use positional overrides.
  pub fn set_arg_override(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
    let Overrides::Named(values) = &mut self.overrides else {
      return false;
    };
    match values.entry(name.into()) {
      Entry::Occupied(_) => false,
      Entry::Vacant(entry) => {
        entry.insert(value.into());
        true
      },
    }
  }

  /// Positional counterpart of [`Self::set_arg_override`]; refused when the
  /// arguments use named overrides.
  pub fn set_positional_override(&mut self, index: usize, value: impl Into<String>) -> bool {
    let Overrides::Positional { values, .. } = &mut self.overrides else {
      return false;
    };
    if values.contains_key(&index) {
      return false;
    }
    values.insert(index, value.into());
    true
  }

  // State control

  /// Reads the current argument without consuming it.
  pub fn current_argument(
    &self,
    name: &str,
    ignore_unclosed_quote: bool,
    unescape: bool,
  ) -> ArgResult<String> {
    if let Some(value) = self.override_for(name) {
      return Ok(value.to_string());
    }

    let Some(current) = self.tokens.get(self.index) else {
      return Err(self.failure(name, ArgumentErrorKind::Missing, "Argument not present"));
    };
    if !ignore_unclosed_quote && self.at_trailing_empty() {
      return Err(self.failure(name, ArgumentErrorKind::Missing, "Argument not present"));
    }

    if !ignore_unclosed_quote && self.index + 1 == self.tokens.len() {
      if let Some(quote) = self.unclosed_quote {
        return Err(self.failure(
          name,
          ArgumentErrorKind::UnmatchedQuote,
          format!("Unmatched quoted string! Quote char: {}", quote.quote),
        ));
      }
    }

    if self.unescaped || !unescape {
      return Ok(current.clone());
    }
    Ok(self.syntax.unescape(current))
  }

  /// [`Self::current_argument`] unescaped and refusing unclosed quotes.
  pub fn current(&self, name: &str) -> ArgResult<String> {
    self.current_argument(name, false, true)
  }

  pub fn failure(
    &self,
    name: &str,
    kind: ArgumentErrorKind,
    reason: impl Into<String>,
  ) -> ArgumentError {
    ArgumentError {
      command: self.past_command_string().to_string(),
      arg: name.to_string(),
      kind,
      reason: reason.into(),
    }
  }

  /// An error for arguments that are well formed but could not be used.
  pub fn error(&self, name: &str, reason: impl Into<String>) -> CommandError {
    CommandError::Parse {
      command: self.past_command_string().to_string(),
      arg:     name.to_string(),
      reason:  reason.into(),
    }
  }

  /// Records `value` for `name` and consumes the current argument.
  pub fn success<T>(&mut self, name: &str, value: T) -> T
  where
    T: Clone + Send + Sync + 'static,
  {
    self.record(name, value, false)
  }

  /// Records `value` for `name` without consuming anything.
  pub fn success_fallback<T>(&mut self, name: &str, value: T) -> T
  where
    T: Clone + Send + Sync + 'static,
  {
    self.record(name, value, true)
  }

  fn record<T>(&mut self, name: &str, value: T, fallback: bool) -> T
  where
    T: Clone + Send + Sync + 'static,
  {
    self
      .parsed
      .insert(name.to_string(), Arc::new(value.clone()) as ParsedValue);

    if let Some(value) = self.override_for(name).map(str::to_string) {
      self.command_string.push(' ');
      self.command_string.push_str(&value);
      if let Overrides::Positional { consumed, .. } = &mut self.overrides {
        *consumed += 1;
      }
    } else if self.index >= self.tokens.len() || (fallback && self.at_trailing_empty()) {
      self.command_string.push_str(" [");
      self.command_string.push_str(name);
      self.command_string.push(']');
    } else if !fallback {
      self.command_string.push(' ');
      self.command_string.push_str(&self.tokens[self.index]);
      self.index += 1;
    }
    value
  }

  /// Turns a silenceable failure into `default`; any other failure is
  /// returned as is.
  pub fn potential_default<T>(&mut self, err: ArgumentError, default: T) -> ArgResult<T>
  where
    T: Clone + Send + Sync + 'static,
  {
    if err.is_silenceable() {
      Ok(self.success_fallback(&err.arg, default))
    } else {
      Err(err)
    }
  }

  /// Skips the current argument without recording anything. Returns whether
  /// an argument is present at the new position.
  pub fn advance(&mut self) -> bool {
    self.index = (self.index + 1).min(self.tokens.len());
    self.has_more()
  }

  /// Fails when unconsumed arguments remain. A single trailing empty token,
  /// left by a line ending in a separator, is not counted.
  pub fn assert_completely_parsed(&self) -> ArgResult<()> {
    if self.index >= self.tokens.len() {
      return Ok(());
    }
    if self.at_trailing_empty() {
      return Ok(());
    }
    Err(self.failure(
      "...",
      ArgumentErrorKind::TooManyArguments,
      "Too many arguments are present!",
    ))
  }

  // Typed pops

  /// Pops any type that knows how to read itself.
  pub fn pop<T: FromArgs>(&mut self, name: &str) -> ArgResult<T> {
    T::pop(self, name)
  }

  pub fn pop_or<T: FromArgs>(&mut self, name: &str, default: T) -> ArgResult<T> {
    match T::pop(self, name) {
      Ok(value) => Ok(value),
      Err(err) => self.potential_default(err, default),
    }
  }

  fn pop_parsed<T>(&mut self, name: &str, what: &str) -> ArgResult<T>
  where
    T: std::str::FromStr + Clone + Send + Sync + 'static,
  {
    let arg = self.current(name)?;
    match arg.parse::<T>() {
      Ok(value) => Ok(self.success(name, value)),
      Err(_) => {
        Err(self.failure(
          name,
          ArgumentErrorKind::InvalidFormat,
          format!("Input '{arg}' is not {what}"),
        ))
      },
    }
  }

  pub fn pop_string(&mut self, name: &str) -> ArgResult<String> {
    let arg = self.current(name)?;
    Ok(self.success(name, arg))
  }

  pub fn pop_string_or(&mut self, name: &str, default: &str) -> ArgResult<String> {
    self.pop_or(name, default.to_string())
  }

  pub fn pop_integer(&mut self, name: &str) -> ArgResult<i32> {
    self.pop_parsed(name, "an integer")
  }

  pub fn pop_integer_or(&mut self, name: &str, default: i32) -> ArgResult<i32> {
    self.pop_or(name, default)
  }

  pub fn pop_long(&mut self, name: &str) -> ArgResult<i64> {
    self.pop_parsed(name, "an integer")
  }

  pub fn pop_float(&mut self, name: &str) -> ArgResult<f32> {
    self.pop_parsed(name, "a float")
  }

  pub fn pop_float_or(&mut self, name: &str, default: f32) -> ArgResult<f32> {
    self.pop_or(name, default)
  }

  pub fn pop_double(&mut self, name: &str) -> ArgResult<f64> {
    self.pop_parsed(name, "a double")
  }

  pub fn pop_double_or(&mut self, name: &str, default: f64) -> ArgResult<f64> {
    self.pop_or(name, default)
  }

  pub fn pop_boolean(&mut self, name: &str) -> ArgResult<bool> {
    let arg = self.current(name)?;
    let value = if arg.eq_ignore_ascii_case("true") {
      true
    } else if arg.eq_ignore_ascii_case("false") {
      false
    } else {
      return Err(self.failure(
        name,
        ArgumentErrorKind::InvalidFormat,
        format!("Value '{arg}' is not a boolean"),
      ));
    };
    Ok(self.success(name, value))
  }

  pub fn pop_boolean_or(&mut self, name: &str, default: bool) -> ArgResult<bool> {
    self.pop_or(name, default)
  }

  /// Pops an enum variant given either by its index or by its name, ignoring
  /// case.
  pub fn pop_enum_value<T: ArgumentEnum>(&mut self, name: &str) -> ArgResult<T> {
    let key = self.current(name)?;
    let value = match key.parse::<i64>() {
      Ok(index) => {
        usize::try_from(index)
          .ok()
          .and_then(|index| T::VARIANTS.get(index))
          .copied()
      },
      Err(_) => {
        T::VARIANTS
          .iter()
          .find(|variant| variant.name().eq_ignore_ascii_case(&key))
          .copied()
      },
    };
    match value {
      Some(value) => Ok(self.success(name, value)),
      None => {
        Err(self.failure(
          name,
          ArgumentErrorKind::InvalidFormat,
          crate::converters::enum_error::<T>(),
        ))
      },
    }
  }

  pub fn pop_enum_value_or<T: ArgumentEnum>(&mut self, name: &str, default: T) -> ArgResult<T> {
    match self.pop_enum_value(name) {
      Ok(value) => Ok(value),
      Err(err) => self.potential_default(err, default),
    }
  }

  /// Pops a vector written either as one `x,y,z` token or as three float
  /// tokens.
  ///
  /// Components of the spaced form are recorded as `<name>:x`, `<name>:y`
  /// and `<name>:z`. On failure nothing is consumed and the error is reported
  /// for `name`, keeping its kind.
  pub fn pop_vector3(&mut self, name: &str) -> ArgResult<Vector3> {
    let current = self.current(name)?;
    if current.contains(',') {
      return match current.parse::<Vector3>() {
        Ok(vector) => Ok(self.success(name, vector)),
        Err(err) => Err(self.failure(name, ArgumentErrorKind::InvalidFormat, err.to_string())),
      };
    }

    let index = self.index;
    let command_string = self.command_string.len();
    let consumed = match self.overrides {
      Overrides::Positional { consumed, .. } => consumed,
      Overrides::Named(_) => 0,
    };

    let components = ["x", "y", "z"].map(|axis| format!("{name}:{axis}"));
    let mut values = [0.0; 3];
    for (value, component) in values.iter_mut().zip(&components) {
      match self.pop_float(component) {
        Ok(parsed) => *value = parsed,
        Err(err) => {
          self.index = index;
          self.command_string.truncate(command_string);
          if let Overrides::Positional { consumed: c, .. } = &mut self.overrides {
            *c = consumed;
          }
          for component in &components {
            self.parsed.remove(component);
          }
          return Err(self.failure(name, err.kind, err.reason));
        },
      }
    }

    // The components already advanced the cursor.
    let vector = Vector3::from(values);
    self.parsed.insert(name.to_string(), Arc::new(vector) as ParsedValue);
    Ok(vector)
  }

  pub fn pop_vector3_or(&mut self, name: &str, default: Vector3) -> ArgResult<Vector3> {
    self.pop_or(name, default)
  }

  /// Pops every remaining argument as one string, unescaped, with the
  /// separators between them kept.
  pub fn pop_remaining_strings(&mut self, name: &str) -> ArgResult<String> {
    if self.has_override(name) {
      let value = self.current(name)?;
      return Ok(self.success(name, value));
    }
    if !self.has_input() {
      return Err(self.failure(name, ArgumentErrorKind::Missing, "No arguments present"));
    }

    let separator = self.separator().to_string();
    let mut value = String::new();
    let mut raw = String::new();
    for i in self.index..self.tokens.len() {
      if i > self.index {
        let gap = separator.repeat(self.paddings[i] + 1);
        value.push_str(&gap);
        raw.push_str(&gap);
      }
      let token = &self.tokens[i];
      raw.push_str(token);
      if self.unescaped {
        value.push_str(token);
      } else {
        value.push_str(&self.syntax.unescape(token));
      }
    }

    self.index = self.tokens.len();
    self
      .parsed
      .insert(name.to_string(), Arc::new(value.clone()) as ParsedValue);
    self.command_string.push(' ');
    self.command_string.push_str(&raw);
    Ok(value)
  }

  pub fn pop_remaining_strings_or(&mut self, name: &str, default: &str) -> ArgResult<String> {
    match self.pop_remaining_strings(name) {
      Ok(value) => Ok(value),
      Err(err) => self.potential_default(err, default.to_string()),
    }
  }

  /// Pops the next subcommand name. Each call moves one level deeper.
  pub fn pop_sub_command(&mut self) -> ArgResult<String> {
    let name = format!("{SUBCOMMAND_ARG_NAME}{}", self.depth);
    self.depth += 1;
    self.pop_string(&name)
  }

  /// Parses flags at the cursor with the `flags` grammar.
  pub fn pop_flags(&mut self, name: &str, flags: &Arc<CommandFlags>) -> ArgResult<ParsedFlags> {
    CommandFlags::parse(flags, self, name)
  }

  // Parsed values

  pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
    self.parsed.get(name)?.downcast_ref::<T>()
  }

  pub fn has(&self, name: &str) -> bool {
    self.parsed.contains_key(name)
  }

  pub fn get_string(&self, name: &str) -> Option<&str> {
    self.get::<String>(name).map(String::as_str)
  }

  pub fn get_integer(&self, name: &str, default: i32) -> i32 {
    self.get::<i32>(name).copied().unwrap_or(default)
  }

  pub fn get_float(&self, name: &str, default: f32) -> f32 {
    self.get::<f32>(name).copied().unwrap_or(default)
  }

  pub fn get_flags(&self, name: &str) -> Option<&ParsedFlags> {
    self.get::<ParsedFlags>(name)
  }

  // Completion

  /// The quote char to close if the unclosed quote starts in the current or
  /// an earlier argument, or an empty string.
  pub fn reached_unclosed_quote(&self) -> String {
    match self.unclosed_quote {
      Some(quote) if self.offset_to_argument(quote.start).arg <= 0 => quote.quote.to_string(),
      _ => String::new(),
    }
  }

  /// Completes the current argument from `potential`.
  ///
  /// `pos` is the cursor relative to the current argument; the first
  /// `potential_offset` bytes of the argument are not part of the completed
  /// text.
  pub fn complete(
    &self,
    name: &str,
    pos: ArgPos,
    potential: &BTreeSet<String>,
    potential_offset: usize,
    candidates: &mut Vec<String>,
  ) -> Completion {
    if self.has_override(name) {
      tracing::debug!(name, "skipping completion of an overridden argument");
      return Completion::None;
    }
    let Ok(current) = self.current_argument(name, true, false) else {
      tracing::debug!(?pos, "completion position is outside of the arguments");
      return Completion::None;
    };
    let end = pos.offset.max(potential_offset as isize) as usize;
    let raw_start = current.get(potential_offset..end.min(current.len())).unwrap_or_default();

    let arg = pos.arg + self.index as isize;
    let anchor = self.absolute_argument_to_offset(ArgPos::new(arg, potential_offset as isize));
    let cursor = self.absolute_argument_to_offset(ArgPos::new(arg, pos.offset));
    self.complete_raw(raw_start, anchor, cursor, potential, false, candidates)
  }

  /// [`Self::complete`] for a cursor offset in the line.
  pub fn complete_at(
    &self,
    name: &str,
    cursor: usize,
    potential: &BTreeSet<String>,
    candidates: &mut Vec<String>,
  ) -> Completion {
    self.complete(name, self.offset_to_argument(cursor), potential, 0, candidates)
  }

  /// Adds every element of `potential` starting with `raw_start` (compared
  /// unescaped). Candidates replace the line from `anchor`; when nothing
  /// matches but a quote is open, the closing quote is offered at `cursor`.
  pub fn complete_raw(
    &self,
    raw_start: &str,
    anchor: isize,
    cursor: isize,
    potential: &BTreeSet<String>,
    potential_raw: bool,
    candidates: &mut Vec<String>,
  ) -> Completion {
    let start = self.unescape(raw_start);
    let quote = self.reached_unclosed_quote();
    let separator = self.separator();

    let before = candidates.len();
    for candidate in potential
      .range(start.clone()..)
      .take_while(|candidate| candidate.starts_with(&start))
    {
      let rest = &candidate[start.len()..];
      let rest = if potential_raw {
        rest.to_string()
      } else {
        self.escape(rest)
      };
      candidates.push(format!("{raw_start}{rest}{quote}{separator}"));
    }

    if candidates.len() > before {
      return Completion::At(anchor.max(0) as usize);
    }
    if quote.is_empty() {
      return Completion::None;
    }
    candidates.push(format!("{quote}{separator}"));
    Completion::At(cursor.max(0) as usize)
  }

  /// Merges two completions of the current argument into `out`, rebasing the
  /// candidates of the later one on the earlier offset.
  pub fn merge_completions(
    &self,
    name: &str,
    first: Completion,
    first_candidates: Vec<String>,
    second: Completion,
    second_candidates: Vec<String>,
    out: &mut Vec<String>,
  ) -> Completion {
    let diff = second.as_raw() - first.as_raw();
    if diff < 0 {
      return self.merge_completions(name, second, second_candidates, first, first_candidates, out);
    }
    let Completion::At(first_offset) = first else {
      out.extend(second_candidates);
      return second;
    };

    out.extend(first_candidates);
    if diff == 0 {
      out.extend(second_candidates);
      return first;
    }

    // A lone closing quote means the later completion had nothing to offer.
    let closing = format!("{}{}", self.reached_unclosed_quote(), self.separator());
    if second_candidates.len() == 1 && second_candidates[0] == closing {
      return first;
    }

    let pos = self.offset_to_argument(first_offset);
    let prefix = self
      .current_argument(name, true, false)
      .ok()
      .and_then(|current| {
        let start = pos.offset.max(0) as usize;
        current.get(start..start + diff as usize).map(str::to_string)
      })
      .unwrap_or_default();
    out.extend(second_candidates.into_iter().map(|candidate| format!("{prefix}{candidate}")));
    first
  }

  pub fn complete_and_merge(
    &self,
    name: &str,
    pos: ArgPos,
    potential: &BTreeSet<String>,
    second: Completion,
    second_candidates: Vec<String>,
    out: &mut Vec<String>,
  ) -> Completion {
    let mut first_candidates = Vec::new();
    let first = self.complete(name, pos, potential, 0, &mut first_candidates);
    self.merge_completions(name, first, first_candidates, second, second_candidates, out)
  }

  /// Completes a [`Self::pop_remaining_strings`] argument: the text from the
  /// current argument up to `cursor` is matched against `potential`, which
  /// holds raw strings.
  pub fn complete_remaining_strings(
    &self,
    name: &str,
    cursor: usize,
    potential: &BTreeSet<String>,
    potential_offset: usize,
    candidates: &mut Vec<String>,
  ) -> Completion {
    if self.has_override(name) {
      return Completion::None;
    }
    let pos = self.offset_to_argument(cursor);
    if pos.arg < 0 || pos.arg as usize >= self.remaining() {
      tracing::debug!(?pos, cursor, "completion position is outside of the arguments");
      return Completion::None;
    }

    let separator = self.separator();
    let last = self.index + pos.arg as usize;
    let mut text = String::new();
    for i in self.index..=last {
      if i > self.index {
        text.push_str(&separator.repeat(self.paddings[i] + 1));
      }
      text.push_str(&self.tokens[i]);
    }

    let base = self.argument_to_offset(ArgPos::default());
    let end = (cursor as isize - base).max(potential_offset as isize) as usize;
    let raw_start = text.get(potential_offset..end.min(text.len())).unwrap_or_default();
    self.complete_raw(
      raw_start,
      base + potential_offset as isize,
      cursor as isize,
      potential,
      true,
      candidates,
    )
  }
}

impl fmt::Display for CommandArguments {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for token in &self.tokens[..self.index.min(self.tokens.len())] {
      write!(f, "{token} ")?;
    }
    f.write_str("^")?;
    for token in self.remaining_tokens() {
      write!(f, "{token} ")?;
    }
    Ok(())
  }
}

impl fmt::Debug for CommandArguments {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CommandArguments")
      .field("tokens", &self.tokens)
      .field("paddings", &self.paddings)
      .field("index", &self.index)
      .field("depth", &self.depth)
      .field("parsed", &self.parsed.keys().collect::<Vec<_>>())
      .field("overrides", &self.overrides)
      .field("origin", &self.origin)
      .field("unclosed_quote", &self.unclosed_quote)
      .finish()
  }
}

#[cfg(test)]
mod test {
  use quickcheck::quickcheck;

  use super::*;

  fn args(line: &str) -> CommandArguments {
    CommandArguments::parse(line, Arc::new(DefaultSyntax::new()))
  }

  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  enum Mode {
    Survival,
    Creative,
    Adventure,
  }

  impl ArgumentEnum for Mode {
    const TYPE_NAME: &'static str = "Mode";
    const VARIANTS: &'static [Self] = &[Self::Survival, Self::Creative, Self::Adventure];

    fn name(&self) -> &'static str {
      match self {
        Self::Survival => "SURVIVAL",
        Self::Creative => "CREATIVE",
        Self::Adventure => "ADVENTURE",
      }
    }
  }

  #[test]
  fn pop_typed_values() {
    let mut args = args("Steve 42 1.5 TRUE creative");
    assert_eq!(args.pop_string("player").unwrap(), "Steve");
    assert_eq!(args.pop_integer("count").unwrap(), 42);
    assert_eq!(args.pop_float("speed").unwrap(), 1.5);
    assert!(args.pop_boolean("force").unwrap());
    assert_eq!(args.pop_enum_value::<Mode>("mode").unwrap(), Mode::Creative);
    assert!(!args.has_more());
    assert_eq!(args.past_command_string(), "Steve 42 1.5 TRUE creative");

    assert_eq!(args.get_string("player"), Some("Steve"));
    assert_eq!(args.get_integer("count", 0), 42);
    assert_eq!(args.get_float("speed", 0.0), 1.5);
    assert_eq!(args.get::<Mode>("mode"), Some(&Mode::Creative));
    assert_eq!(args.get::<i32>("player"), None);
  }

  #[test]
  fn invalid_values_are_not_silenceable() {
    let mut args = args("abc");
    let err = args.pop_integer_or("count", 3).unwrap_err();
    assert_eq!(err.kind, ArgumentErrorKind::InvalidFormat);
    assert_eq!(err.to_string(), "/ [count] invalid: Input 'abc' is not an integer");
    assert_eq!(args.index(), 0);

    let err = args.pop_boolean("force").unwrap_err();
    assert_eq!(err.kind, ArgumentErrorKind::InvalidFormat);
  }

  #[test]
  fn enum_by_index_and_errors() {
    let mut args = args("2 7 flying");
    assert_eq!(args.pop_enum_value::<Mode>("a").unwrap(), Mode::Adventure);
    let err = args.pop_enum_value::<Mode>("b").unwrap_err();
    assert_eq!(
      err.reason,
      "Invalid Mode; Must be 0-2 or 'SURVIVAL', 'CREATIVE', 'ADVENTURE'."
    );
    args.advance();
    assert!(args.pop_enum_value::<Mode>("c").is_err());
  }

  #[test]
  fn missing_argument_defaults() {
    let mut args = args("");
    // The only token of an empty line is the trailing empty one.
    assert_eq!(args.len(), 1);
    assert!(args.pop_string("first").unwrap_err().is_silenceable());

    let value = args.pop_integer_or("count", 7).unwrap();
    assert_eq!(value, 7);
    assert_eq!(args.get_integer("count", 0), 7);
    assert_eq!(args.past_command_string(), "[count]");

    let err = args.pop_integer("other").unwrap_err();
    assert!(err.is_silenceable());
    assert_eq!(err.reason, "Argument not present");
  }

  #[test]
  fn defaulting_is_idempotent() {
    let mut args = args("a");
    args.pop_string("a").unwrap();
    let index = args.index();
    assert_eq!(args.pop_string_or("b", "x").unwrap(), "x");
    assert_eq!(args.pop_string_or("b", "x").unwrap(), "x");
    assert_eq!(args.index(), index);
  }

  #[test]
  fn unmatched_quote() {
    let mut args = args(r#"say "hello"#);
    assert_eq!(args.pop_string("cmd").unwrap(), "say");
    let err = args.pop_string_or("msg", "x").unwrap_err();
    assert_eq!(err.kind, ArgumentErrorKind::UnmatchedQuote);
    assert_eq!(err.reason, "Unmatched quoted string! Quote char: \"");
    assert_eq!(args.current_argument("msg", true, true).unwrap(), "hello");
  }

  #[test]
  fn quoted_argument_is_unescaped() {
    let mut args = args(r#"say "hello world""#);
    assert_eq!(args.all(), ["say", r#""hello world""#]);
    args.pop_sub_command().unwrap();
    assert_eq!(args.pop_string("msg").unwrap(), "hello world");
    assert_eq!(args.depth(), 1);
    assert!(args.has(&format!("{SUBCOMMAND_ARG_NAME}0")));
  }

  #[test]
  fn vector_forms() {
    let mut args = args("1,2,3 4 5 6");
    assert_eq!(args.pop_vector3("a").unwrap(), Vector3::new(1.0, 2.0, 3.0));
    assert_eq!(args.pop_vector3("b").unwrap(), Vector3::new(4.0, 5.0, 6.0));
    assert_eq!(args.get::<f32>("b:y"), Some(&5.0));
    assert_eq!(args.get::<Vector3>("b"), Some(&Vector3::new(4.0, 5.0, 6.0)));
    assert_eq!(args.remaining(), 0);

    let mut args = self::args("1,2");
    let err = args.pop_vector3("a").unwrap_err();
    assert_eq!(err.kind, ArgumentErrorKind::InvalidFormat);
    assert_eq!(err.reason, "Must provide 3 coordinates");
  }

  #[test]
  fn vector_failure_rewinds() {
    let mut args = args("1 2");
    let err = args.pop_vector3("dest").unwrap_err();
    assert_eq!(err.kind, ArgumentErrorKind::Missing);
    assert_eq!(err.arg, "dest");
    assert_eq!(args.index(), 0);
    assert_eq!(args.past_command_string(), "");
    assert!(!args.has("dest:x"));

    let default = Vector3::new(9.0, 9.0, 9.0);
    assert_eq!(args.pop_vector3_or("dest", default).unwrap(), default);

    let mut args = self::args("1 x 3");
    let err = args.pop_vector3_or("dest", default).unwrap_err();
    assert_eq!(err.kind, ArgumentErrorKind::InvalidFormat);
    assert_eq!(args.index(), 0);
  }

  #[test]
  fn remaining_strings() {
    let mut args = args(r#"msg Steve hello  "big world""#);
    args.pop_string("cmd").unwrap();
    args.pop_string("player").unwrap();
    assert_eq!(args.pop_remaining_strings("text").unwrap(), "hello  big world");
    assert!(!args.has_more());
    assert_eq!(args.past_command_string(), r#"msg Steve hello  "big world""#);

    let err = args.pop_remaining_strings("more").unwrap_err();
    assert!(err.is_silenceable());
    assert_eq!(args.pop_remaining_strings_or("more", "none").unwrap(), "none");
  }

  #[test]
  fn completely_parsed() {
    let mut args = args("a b ");
    args.pop_string("a").unwrap();
    assert_eq!(
      args.assert_completely_parsed().unwrap_err().kind,
      ArgumentErrorKind::TooManyArguments
    );
    args.pop_string("b").unwrap();
    // Trailing empty token.
    args.assert_completely_parsed().unwrap();
  }

  #[test]
  fn trailing_separator_is_not_input() {
    let mut args = args("give ");
    args.pop_string("cmd").unwrap();
    assert!(args.has_more());
    assert!(!args.has_input());
    assert!(!args.has_next("amount"));

    let err = args.pop_integer("amount").unwrap_err();
    assert_eq!(err.kind, ArgumentErrorKind::Missing);
    assert_eq!(args.pop_integer_or("amount", 1).unwrap(), 1);
    assert_eq!(args.pop_string_or("reason", "none").unwrap(), "none");
    assert!(args.pop_remaining_strings("text").unwrap_err().is_silenceable());
    assert_eq!(args.index(), 1);
    assert_eq!(args.past_command_string(), "give [amount] [reason]");

    // Completion still sees the empty token.
    assert_eq!(args.current_argument("amount", true, true).unwrap(), "");
  }

  #[test]
  fn fallback_leaves_no_gap_in_messages() {
    let mut args = args("ban Steve");
    args.pop_string("cmd").unwrap();
    args.pop_flags("flags", &Arc::new(CommandFlags::new())).unwrap();
    args.pop_string("player").unwrap();
    assert_eq!(args.past_command_string(), "ban Steve");

    let err = args.pop_integer("days").unwrap_err();
    assert_eq!(err.to_string(), "/ban Steve [days] invalid: Argument not present");
  }

  #[test]
  fn named_overrides() {
    let mut args = args("x");
    assert!(args.set_arg_override("name", "Alex"));
    assert!(!args.set_arg_override("name", "Steve"));
    assert!(!args.set_positional_override(0, "nope"));
    assert_eq!(args.pop_string("name").unwrap(), "Alex");
    assert_eq!(args.index(), 0);
    assert_eq!(args.pop_string("next").unwrap(), "x");
    assert_eq!(args.past_command_string(), "Alex x");
  }

  #[test]
  fn positional_overrides() {
    let overrides = HashMap::from([(1, "forced".to_string())]);
    let mut args = args("a b").with_positional_overrides(overrides);
    assert!(!args.set_arg_override("name", "nope"));
    assert!(args.set_positional_override(3, "late"));
    assert_eq!(args.pop_string("first").unwrap(), "a");
    assert_eq!(args.pop_string("second").unwrap(), "forced");
    assert_eq!(args.index(), 1);
    // Position 1 is consumed; the next read looks at index 1 + 1 consumed.
    assert_eq!(args.pop_string("third").unwrap(), "b");
  }

  #[test]
  fn offsets() {
    let args = args("ab  cd e");
    assert_eq!(args.paddings(), [0, 1, 0]);
    assert_eq!(args.offset_to_absolute_argument(0), ArgPos::new(0, 0));
    assert_eq!(args.offset_to_absolute_argument(2), ArgPos::new(0, 2));
    assert_eq!(args.offset_to_absolute_argument(3), ArgPos::new(1, -1));
    assert_eq!(args.offset_to_absolute_argument(4), ArgPos::new(1, 0));
    assert_eq!(args.offset_to_absolute_argument(7), ArgPos::new(2, 0));
    assert_eq!(args.offset_to_absolute_argument(8), ArgPos::new(2, 1));
    assert_eq!(args.absolute_argument_to_offset(ArgPos::new(1, 1)), 5);
  }

  #[test]
  fn sub_args_keep_line_offsets() {
    let mut args = args("cmd  a b");
    args.pop_string("cmd").unwrap();
    let sub = args.sub_args(1, 3);
    assert_eq!(sub.all(), ["a", "b"]);
    assert_eq!(sub.paddings(), [0, 0]);
    assert_eq!(sub.absolute_argument_to_offset(ArgPos::new(0, 0)), 5);
    assert_eq!(sub.offset_to_absolute_argument(7), ArgPos::new(1, 0));
  }

  #[test]
  fn sub_args_drop_unclosed_quote_before_end() {
    let args = args(r#"a b "c"#);
    assert!(args.sub_args(0, 2).unclosed_quote().is_none());
    assert!(args.sub_args(1, 3).unclosed_quote().is_some());
  }

  #[test]
  fn complete_candidates() {
    let potential: BTreeSet<String> = ["alpha", "alps", "beta", "al pine"]
      .into_iter()
      .map(String::from)
      .collect();

    let mut args = args("give al");
    args.pop_string("cmd").unwrap();
    let mut candidates = Vec::new();
    let result = args.complete_at("item", 7, &potential, &mut candidates);
    assert_eq!(result, Completion::At(5));
    assert_eq!(candidates, [r"al\ pine ", "alpha ", "alps "]);

    let mut candidates = Vec::new();
    assert_eq!(
      args.complete_at("item", 7, &BTreeSet::new(), &mut candidates),
      Completion::None
    );
    assert!(candidates.is_empty());
  }

  #[test]
  fn complete_closes_quote() {
    let potential: BTreeSet<String> = ["hello world"].into_iter().map(String::from).collect();
    let mut args = args(r#"say "hel"#);
    args.pop_string("cmd").unwrap();

    let mut candidates = Vec::new();
    let result = args.complete_at("msg", 8, &potential, &mut candidates);
    assert_eq!(result, Completion::At(4));
    assert_eq!(candidates, [r#""hello\ world" "#]);

    let mut candidates = Vec::new();
    let result = args.complete_at("msg", 8, &BTreeSet::new(), &mut candidates);
    assert_eq!(result, Completion::At(8));
    assert_eq!(candidates, ["\" "]);
  }

  #[test]
  fn merge_rebases_later_candidates() {
    let mut args = args("tp ab");
    args.pop_string("cmd").unwrap();
    let mut out = Vec::new();
    let result = args.merge_completions(
      "target",
      Completion::At(4),
      vec!["bc ".to_string()],
      Completion::At(3),
      vec!["abc ".to_string()],
      &mut out,
    );
    assert_eq!(result, Completion::At(3));
    assert_eq!(out, ["abc ", "abc "]);

    let mut out = Vec::new();
    let result = args.merge_completions(
      "target",
      Completion::None,
      Vec::new(),
      Completion::At(3),
      vec!["abc ".to_string()],
      &mut out,
    );
    assert_eq!(result, Completion::At(3));
    assert_eq!(out, ["abc "]);
  }

  #[test]
  fn complete_remaining_text() {
    let potential: BTreeSet<String> = ["hello there", "hello world"].into_iter().map(String::from).collect();
    let mut args = args("say hello w");
    args.pop_string("cmd").unwrap();
    let mut candidates = Vec::new();
    let result = args.complete_remaining_strings("text", 11, &potential, 0, &mut candidates);
    assert_eq!(result, Completion::At(4));
    assert_eq!(candidates, ["hello world "]);
  }

  #[test]
  fn display_marks_cursor() {
    let mut args = args("a b c");
    args.pop_string("a").unwrap();
    assert_eq!(args.to_string(), "a ^b c ");
  }

  #[test]
  fn completion_raw_protocol() {
    assert_eq!(Completion::At(4).as_raw(), 4);
    assert_eq!(Completion::None.as_raw(), -1);
    assert_eq!(Completion::Exhausted.as_raw(), -2);
    assert_eq!(Completion::from_raw(-2), Completion::Exhausted);
    assert_eq!(Completion::from_raw(-7), Completion::None);
    assert_eq!(Completion::from_raw(3), Completion::At(3));
  }

  quickcheck! {
    fn raw_string_round_trip(line: String) -> bool {
      self::args(&line).raw_string() == line
    }

    fn offsets_invert(line: String) -> bool {
      let args = self::args(&line);
      (0..=line.len()).all(|cursor| {
        let pos = args.offset_to_absolute_argument(cursor);
        args.absolute_argument_to_offset(pos) == cursor as isize
      })
    }

    fn relative_offsets_invert(line: String, skip: u8) -> bool {
      let mut args = self::args(&line);
      for _ in 0..skip % 4 {
        args.advance();
      }
      (0..=line.len()).all(|cursor| {
        let pos = args.offset_to_argument(cursor);
        args.argument_to_offset(pos) == cursor as isize
      })
    }
  }
}
