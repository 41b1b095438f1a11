use std::{
  any::Any,
  fmt,
};

/// Whoever typed a command: a player, the console, a script.
///
/// Permission checks and message delivery are left to the embedding
/// application.
pub trait CommandSender: Send + Sync {
  fn name(&self) -> &str;

  fn has_permission(&self, permission: &str) -> bool;

  fn send_message(&self, message: &str);

  /// Allows filters to look at the concrete sender type.
  fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn CommandSender {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("CommandSender").field(&self.name()).finish()
  }
}
