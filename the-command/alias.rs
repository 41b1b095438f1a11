use std::{
  cell::Cell,
  fmt,
  sync::{
    Arc,
    Weak,
  },
};

use crate::{
  arguments::{
    CommandArguments,
    Completion,
  },
  command::{
    Command,
    ProcessingMode,
  },
  error::{
    CommandError,
    Result,
  },
  sender::CommandSender,
};

const MAX_RESOLVE_DEPTH: usize = 32;

thread_local! {
  static RESOLVING: Cell<usize> = const { Cell::new(0) };
}

/// A name under a command that stands for another path below the same
/// command.
///
/// The path is resolved on every use, so an alias follows whatever is
/// registered at its destination at that time.
pub struct Alias {
  path:   Vec<String>,
  parent: Weak<Command>,
}

impl Alias {
  pub fn new(path: Vec<String>, parent: &Arc<Command>) -> Arc<Self> {
    Arc::new(Self {
      path,
      parent: Arc::downgrade(parent),
    })
  }

  /// Path of the destination, relative to the parent.
  pub fn path(&self) -> &[String] {
    &self.path
  }

  pub fn parent(&self) -> Option<Arc<Command>> {
    self.parent.upgrade()
  }

  /// The command the alias currently points at.
  pub fn resolve(&self) -> Result<Option<Arc<Command>>> {
    let Some(parent) = self.parent.upgrade() else {
      return Ok(None);
    };
    let depth = RESOLVING.get();
    if depth >= MAX_RESOLVE_DEPTH {
      return Err(CommandError::AliasCycle(self.path.join(" ")));
    }
    RESOLVING.set(depth + 1);
    let target = parent.get_descendant(&self.path);
    RESOLVING.set(depth);
    target
  }

  /// Continues dispatch at the destination.
  pub fn process(
    &self,
    sender: Option<&Arc<dyn CommandSender>>,
    args: &mut CommandArguments,
    mode: &mut dyn ProcessingMode,
  ) -> Result<()> {
    if let Some(target) = self.resolve()? {
      return target.process(sender, args, mode);
    }
    tracing::debug!(path = ?self.path, "alias points at nothing");
    if !mode.reports_unknown() {
      return Ok(());
    }
    Err(CommandError::UnknownSubcommand {
      parent: self.parent.upgrade().map(|p| p.name().to_string()).unwrap_or_default(),
      name:   self.path.join(" "),
    })
  }

  pub fn complete(
    &self,
    sender: Option<&Arc<dyn CommandSender>>,
    args: &mut CommandArguments,
    cursor: usize,
    candidates: &mut Vec<String>,
  ) -> Result<Completion> {
    match self.resolve()? {
      Some(target) => target.complete(sender, args, cursor, candidates),
      None => Ok(Completion::None),
    }
  }
}

impl PartialEq for Alias {
  fn eq(&self, other: &Self) -> bool {
    self.path == other.path && Weak::ptr_eq(&self.parent, &other.parent)
  }
}

impl Eq for Alias {}

impl fmt::Debug for Alias {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Alias").field("path", &self.path).finish_non_exhaustive()
  }
}
