use std::sync::Arc;

use crossbeam::queue::SegQueue;

use crate::{
  arguments::CommandArguments,
  command::{
    Command,
    CommandExecutor,
    Execute,
  },
  error::Result,
  sender::CommandSender,
};

struct Invocation {
  command: Arc<Command>,
  sender:  Arc<dyn CommandSender>,
  args:    CommandArguments,
}

/// Defers a command to another thread.
///
/// Installed as the executor of a command, it queues every invocation and
/// reports it handled. The thread that owns the work calls
/// [`CommandDelegator::process_one`] to run queued invocations, in order,
/// with the executor it replaced.
pub struct CommandDelegator {
  queue:    SegQueue<Invocation>,
  executor: Option<Arc<dyn CommandExecutor>>,
}

impl CommandDelegator {
  pub fn new(executor: Option<Arc<dyn CommandExecutor>>) -> Self {
    Self {
      queue: SegQueue::new(),
      executor,
    }
  }

  /// Wraps the current executor of `command` and takes its place.
  pub fn delegate(command: &Arc<Command>) -> Arc<Self> {
    let delegator = Arc::new(Self::new(command.executor()));
    command.replace_executor(Some(delegator.clone()));
    delegator
  }

  pub fn pending(&self) -> usize {
    self.queue.len()
  }

  /// Runs the oldest queued invocation. Returns `false` if there was none.
  ///
  /// When the wrapped executor does not handle the invocation, dispatch goes
  /// on with the command's children.
  pub fn process_one(&self) -> Result<bool> {
    let Some(Invocation {
      command,
      sender,
      mut args,
    }) = self.queue.pop()
    else {
      return Ok(false);
    };

    let handled = match &self.executor {
      Some(executor) => executor.execute(&command, &sender, &mut args)?,
      None => false,
    };
    if !handled {
      let mut mode = Execute::new(sender.clone());
      command.process_child(Some(&sender), &mut args, &mut mode)?;
    }
    Ok(true)
  }

  /// Runs queued invocations until the queue is empty or one fails. Returns
  /// how many ran successfully.
  pub fn process_all(&self) -> Result<usize> {
    let mut count = 0;
    while self.process_one()? {
      count += 1;
    }
    Ok(count)
  }
}

impl CommandExecutor for CommandDelegator {
  fn execute(
    &self,
    command: &Arc<Command>,
    sender: &Arc<dyn CommandSender>,
    args: &mut CommandArguments,
  ) -> Result<bool> {
    tracing::trace!(command = %command.name(), "queueing invocation");
    self.queue.push(Invocation {
      command: command.clone(),
      sender:  sender.clone(),
      args:    args.clone(),
    });
    Ok(true)
  }
}
