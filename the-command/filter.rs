use std::{
  marker::PhantomData,
  sync::Arc,
};

use crate::{
  arguments::CommandArguments,
  command::Command,
  error::{
    CommandError,
    Result,
  },
  sender::CommandSender,
};

/// A check run before a command executes. Filters with a lower priority run
/// first; any filter may refuse the invocation.
pub trait CommandFilter: Send + Sync {
  fn priority(&self) -> i32 {
    0
  }

  fn validate(
    &self,
    command: &Command,
    sender: &Arc<dyn CommandSender>,
    args: &CommandArguments,
  ) -> Result<()>;
}

/// Only lets senders of type `T` through.
pub struct SenderTypeFilter<T> {
  type_name: &'static str,
  _sender:   PhantomData<fn() -> T>,
}

impl<T: CommandSender + 'static> SenderTypeFilter<T> {
  /// `type_name` is what the refusal message calls `T`.
  pub fn new(type_name: &'static str) -> Self {
    Self {
      type_name,
      _sender: PhantomData,
    }
  }
}

impl<T: CommandSender + 'static> CommandFilter for SenderTypeFilter<T> {
  fn validate(
    &self,
    _command: &Command,
    sender: &Arc<dyn CommandSender>,
    _args: &CommandArguments,
  ) -> Result<()> {
    if sender.as_any().is::<T>() {
      Ok(())
    } else {
      Err(CommandError::rejected(format!(
        "You must be a {} to execute this command.",
        self.type_name
      )))
    }
  }
}

/// A filter made of a closure.
pub struct FnFilter<F> {
  priority: i32,
  check:    F,
}

impl<F> FnFilter<F>
where
  F: Fn(&Command, &Arc<dyn CommandSender>, &CommandArguments) -> Result<()> + Send + Sync,
{
  pub fn new(priority: i32, check: F) -> Self {
    Self { priority, check }
  }
}

impl<F> CommandFilter for FnFilter<F>
where
  F: Fn(&Command, &Arc<dyn CommandSender>, &CommandArguments) -> Result<()> + Send + Sync,
{
  fn priority(&self) -> i32 {
    self.priority
  }

  fn validate(
    &self,
    command: &Command,
    sender: &Arc<dyn CommandSender>,
    args: &CommandArguments,
  ) -> Result<()> {
    (self.check)(command, sender, args)
  }
}
