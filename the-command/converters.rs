//! Typed extraction on top of [`CommandArguments`].
//!
//! [`FromArgs`] lets executors write `args.pop::<i64>("amount")` for any
//! supported type. User enums opt in through [`ArgumentEnum`] and are read
//! with [`CommandArguments::pop_enum_value`].

use crate::{
  arguments::CommandArguments,
  error::ArgResult,
  vector::Vector3,
};

/// Enum variant lists beyond this size are not spelled out in errors.
const MAX_LISTED_VARIANTS: usize = 5;

/// A type that can be popped off the argument cursor.
///
/// Implementations read with [`CommandArguments::current`] and finish with
/// [`CommandArguments::success`] so that overrides, defaults and the error
/// context keep working.
pub trait FromArgs: Clone + Send + Sync + Sized + 'static {
  fn pop(args: &mut CommandArguments, name: &str) -> ArgResult<Self>;
}

impl FromArgs for String {
  fn pop(args: &mut CommandArguments, name: &str) -> ArgResult<Self> {
    args.pop_string(name)
  }
}

impl FromArgs for i32 {
  fn pop(args: &mut CommandArguments, name: &str) -> ArgResult<Self> {
    args.pop_integer(name)
  }
}

impl FromArgs for i64 {
  fn pop(args: &mut CommandArguments, name: &str) -> ArgResult<Self> {
    args.pop_long(name)
  }
}

impl FromArgs for f32 {
  fn pop(args: &mut CommandArguments, name: &str) -> ArgResult<Self> {
    args.pop_float(name)
  }
}

impl FromArgs for f64 {
  fn pop(args: &mut CommandArguments, name: &str) -> ArgResult<Self> {
    args.pop_double(name)
  }
}

impl FromArgs for bool {
  fn pop(args: &mut CommandArguments, name: &str) -> ArgResult<Self> {
    args.pop_boolean(name)
  }
}

impl FromArgs for Vector3 {
  fn pop(args: &mut CommandArguments, name: &str) -> ArgResult<Self> {
    args.pop_vector3(name)
  }
}

/// A fieldless enum whose variants can be typed by index or by name.
pub trait ArgumentEnum: Copy + Send + Sync + 'static {
  const TYPE_NAME: &'static str;
  /// Every variant, in index order.
  const VARIANTS: &'static [Self];

  fn name(&self) -> &'static str;
}

pub(crate) fn enum_error<T: ArgumentEnum>() -> String {
  let variants = if T::VARIANTS.len() > MAX_LISTED_VARIANTS {
    format!("an element of {}", T::TYPE_NAME)
  } else {
    T::VARIANTS
      .iter()
      .map(|variant| format!("'{}'", variant.name()))
      .collect::<Vec<_>>()
      .join(", ")
  };
  format!(
    "Invalid {}; Must be 0-{} or {variants}.",
    T::TYPE_NAME,
    T::VARIANTS.len().saturating_sub(1)
  )
}

#[cfg(test)]
mod test {
  use std::sync::Arc;

  use super::*;
  use crate::syntax::DefaultSyntax;

  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  enum Direction {
    North,
    East,
    South,
    West,
    Up,
    Down,
  }

  impl ArgumentEnum for Direction {
    const TYPE_NAME: &'static str = "Direction";
    const VARIANTS: &'static [Self] = &[
      Self::North,
      Self::East,
      Self::South,
      Self::West,
      Self::Up,
      Self::Down,
    ];

    fn name(&self) -> &'static str {
      match self {
        Self::North => "NORTH",
        Self::East => "EAST",
        Self::South => "SOUTH",
        Self::West => "WEST",
        Self::Up => "UP",
        Self::Down => "DOWN",
      }
    }
  }

  #[test]
  fn pop_generic() {
    let mut args = CommandArguments::parse("5 9000000000 0.25 0.5 false 1,2,3 word", Arc::new(DefaultSyntax::new()));
    assert_eq!(args.pop::<i32>("a").unwrap(), 5);
    assert_eq!(args.pop::<i64>("b").unwrap(), 9_000_000_000);
    assert_eq!(args.pop::<f32>("c").unwrap(), 0.25);
    assert_eq!(args.pop::<f64>("d").unwrap(), 0.5);
    assert!(!args.pop::<bool>("e").unwrap());
    assert_eq!(args.pop::<Vector3>("f").unwrap(), Vector3::new(1.0, 2.0, 3.0));
    assert_eq!(args.pop::<String>("g").unwrap(), "word");
    assert_eq!(args.pop_or::<i64>("h", -1).unwrap(), -1);
  }

  #[test]
  fn long_enum_error_names_the_type() {
    assert_eq!(
      enum_error::<Direction>(),
      "Invalid Direction; Must be 0-5 or an element of Direction."
    );
    let mut args = CommandArguments::from_tokens(["down", "sideways"]);
    assert_eq!(args.pop_enum_value::<Direction>("dir").unwrap(), Direction::Down);
    assert_eq!(
      args.pop_enum_value_or("dir2", Direction::Up).unwrap_err().reason,
      enum_error::<Direction>()
    );
  }
}
