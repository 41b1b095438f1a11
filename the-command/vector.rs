use std::{
  fmt,
  num::ParseFloatError,
  str::FromStr,
};

use thiserror::Error;

/// A point or direction in 3D space as typed by users, e.g. `10,64.5,-3`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
  pub x: f32,
  pub y: f32,
  pub z: f32,
}

impl Vector3 {
  pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

  pub const fn new(x: f32, y: f32, z: f32) -> Self {
    Self { x, y, z }
  }
}

impl From<[f32; 3]> for Vector3 {
  fn from([x, y, z]: [f32; 3]) -> Self {
    Self::new(x, y, z)
  }
}

impl fmt::Display for Vector3 {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{},{},{}", self.x, self.y, self.z)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseVectorError {
  #[error("Must provide 3 coordinates")]
  ComponentCount,
  #[error("Coordinate '{0}' is not a number")]
  Component(String, #[source] ParseFloatError),
}

impl FromStr for Vector3 {
  type Err = ParseVectorError;

  /// Parses the comma form `x,y,z`. Exactly three components are accepted.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut components = [0.0; 3];
    let mut parts = s.split(',');
    for component in &mut components {
      let part = parts.next().ok_or(ParseVectorError::ComponentCount)?;
      *component = part
        .trim()
        .parse()
        .map_err(|err| ParseVectorError::Component(part.to_string(), err))?;
    }
    if parts.next().is_some() {
      return Err(ParseVectorError::ComponentCount);
    }
    Ok(components.into())
  }
}
