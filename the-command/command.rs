//! Nodes of the command tree and their dispatch.
//!
//! A [`Command`] maps child names to other commands and alias names to
//! [`Alias`]es. Dispatching a line walks the tree one token at a time:
//! every node checks the sender's permission, runs its filters and lets the
//! current [`ProcessingMode`] act on it. If the mode is not done, the next
//! token names the child to continue with.
//!
//! Children and aliases sit behind separate reader/writer locks. Dispatch
//! holds a read lock only for a single lookup, never across the recursive
//! call, so a slow executor never blocks registration on its ancestors.
//! Tree listeners are notified after the write lock is released.

use std::{
  collections::{
    BTreeSet,
    HashMap,
  },
  fmt,
  hash::{
    Hash,
    Hasher,
  },
  sync::{
    Arc,
    Weak,
  },
};

use parking_lot::RwLock;

use crate::{
  alias::Alias,
  arguments::{
    CommandArguments,
    Completion,
    SUBCOMMAND_ARG_NAME,
  },
  config::UnknownSubcommand,
  error::{
    CommandError,
    Result,
  },
  filter::CommandFilter,
  manager::{
    CommandManager,
    ManagerShared,
  },
  sender::CommandSender,
};

/// Runs a command.
pub trait CommandExecutor: Send + Sync {
  /// Returns whether the invocation was handled. An unhandled invocation goes
  /// on with the child named by the next argument.
  fn execute(
    &self,
    command: &Arc<Command>,
    sender: &Arc<dyn CommandSender>,
    args: &mut CommandArguments,
  ) -> Result<bool>;

  /// Completes the arguments of the command at `cursor`.
  ///
  /// [`Completion::Exhausted`] hands completion on to the children, which is
  /// what executors that don't complete anything return.
  fn complete(
    &self,
    _command: &Arc<Command>,
    _sender: Option<&Arc<dyn CommandSender>>,
    _args: &mut CommandArguments,
    _cursor: usize,
    _candidates: &mut Vec<String>,
  ) -> Result<Completion> {
    Ok(Completion::Exhausted)
  }
}

impl<F> CommandExecutor for F
where
  F: Fn(&Arc<Command>, &Arc<dyn CommandSender>, &mut CommandArguments) -> Result<bool> + Send + Sync,
{
  fn execute(
    &self,
    command: &Arc<Command>,
    sender: &Arc<dyn CommandSender>,
    args: &mut CommandArguments,
  ) -> Result<bool> {
    self(command, sender, args)
  }
}

/// What a dispatch does at every node it reaches.
pub trait ProcessingMode {
  /// Returns `true` once processing is done.
  fn step(&mut self, command: &Arc<Command>, args: &mut CommandArguments) -> Result<bool>;

  /// Whether a subcommand token that names nothing may be reported as an
  /// error.
  fn reports_unknown(&self) -> bool {
    false
  }
}

/// Runs executors.
pub struct Execute {
  sender: Arc<dyn CommandSender>,
}

impl Execute {
  pub fn new(sender: Arc<dyn CommandSender>) -> Self {
    Self { sender }
  }
}

impl ProcessingMode for Execute {
  fn step(&mut self, command: &Arc<Command>, args: &mut CommandArguments) -> Result<bool> {
    match command.executor() {
      Some(executor) => executor.execute(command, &self.sender, args),
      None => Ok(false),
    }
  }

  fn reports_unknown(&self) -> bool {
    true
  }
}

/// Finds the command at the end of a path.
#[derive(Default)]
pub struct Lookup {
  found: Option<Arc<Command>>,
}

impl Lookup {
  pub fn found(self) -> Option<Arc<Command>> {
    self.found
  }
}

impl ProcessingMode for Lookup {
  fn step(&mut self, command: &Arc<Command>, args: &mut CommandArguments) -> Result<bool> {
    if args.has_more() {
      return Ok(false);
    }
    self.found = Some(command.clone());
    Ok(true)
  }
}

/// Returns the last `.` separated segment of the name part of `provider:name`.
pub fn simple_name(full_name: &str) -> Result<String> {
  let mut parts = full_name.split(':');
  let (Some(_), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
    return Err(CommandError::InvalidName(full_name.to_string()));
  };
  Ok(name.rsplit('.').next().unwrap_or(name).to_string())
}

enum TreeEvent {
  Child {
    name:   String,
    before: Option<Arc<Command>>,
    after:  Option<Arc<Command>>,
  },
  Alias {
    name:   String,
    before: Option<Arc<Alias>>,
    after:  Option<Arc<Alias>>,
  },
}

pub struct Command {
  name:        String,
  simple_name: String,
  manager:     Weak<ManagerShared>,
  children:    RwLock<HashMap<String, Arc<Command>>>,
  aliases:     RwLock<HashMap<String, Arc<Alias>>>,
  filters:     RwLock<Vec<Arc<dyn CommandFilter>>>,
  executor:    RwLock<Option<Arc<dyn CommandExecutor>>>,
  permission:  RwLock<Option<String>>,
  help:        RwLock<Option<String>>,
  usage:       RwLock<Option<String>>,
  description: RwLock<Option<String>>,
}

impl Command {
  pub(crate) fn new(name: String, simple_name: String, manager: Weak<ManagerShared>) -> Self {
    Self {
      name,
      simple_name,
      manager,
      children: RwLock::new(HashMap::new()),
      aliases: RwLock::new(HashMap::new()),
      filters: RwLock::new(Vec::new()),
      executor: RwLock::new(None),
      permission: RwLock::new(None),
      help: RwLock::new(None),
      usage: RwLock::new(None),
      description: RwLock::new(None),
    }
  }

  /// The full `provider:name` name.
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn simple_name(&self) -> &str {
    &self.simple_name
  }

  pub fn manager(&self) -> Option<CommandManager> {
    self.manager.upgrade().map(CommandManager::from_shared)
  }

  pub(crate) fn same_manager(&self, other: &Command) -> bool {
    Weak::ptr_eq(&self.manager, &other.manager)
  }

  fn normalize(&self, name: &str) -> String {
    match self.manager.upgrade() {
      Some(manager) => manager.normalize_child_name(name),
      None => name.to_string(),
    }
  }

  fn unknown_subcommand(&self) -> UnknownSubcommand {
    self
      .manager
      .upgrade()
      .map_or(UnknownSubcommand::Error, |manager| manager.config.unknown_subcommand)
  }

  fn notify(self: &Arc<Self>, events: Vec<TreeEvent>) {
    let Some(manager) = self.manager.upgrade() else {
      return;
    };
    for event in events {
      match event {
        TreeEvent::Child { name, before, after } => {
          manager.on_child_change(self, &name, before.as_ref(), after.as_ref())
        },
        TreeEvent::Alias { name, before, after } => {
          manager.on_alias_change(self, &name, before.as_ref(), after.as_ref())
        },
      }
    }
  }

  fn ensure_same_manager(&self, command: &Command) -> Result<()> {
    if self.same_manager(command) {
      Ok(())
    } else {
      Err(CommandError::ForeignCommand(command.name.clone()))
    }
  }

  // Dispatch

  /// Checks permission, runs filters, lets `mode` act and then continues with
  /// the child named by the next argument.
  ///
  /// Permission and filters are skipped without a sender.
  pub fn process(
    self: &Arc<Self>,
    sender: Option<&Arc<dyn CommandSender>>,
    args: &mut CommandArguments,
    mode: &mut dyn ProcessingMode,
  ) -> Result<()> {
    if let Some(sender) = sender {
      if !self.has_permission(sender.as_ref()) {
        return Err(CommandError::InsufficientPermission {
          command:    self.name.clone(),
          permission: self.permission().unwrap_or_default(),
        });
      }
      for filter in self.filters() {
        filter.validate(self, sender, args)?;
      }
    }

    if mode.step(self, args)? {
      return Ok(());
    }
    self.process_child(sender, args, mode)
  }

  /// Continues dispatch with the child or alias named by the next argument.
  pub fn process_child(
    self: &Arc<Self>,
    sender: Option<&Arc<dyn CommandSender>>,
    args: &mut CommandArguments,
    mode: &mut dyn ProcessingMode,
  ) -> Result<()> {
    let Ok(name) = args.pop_sub_command() else {
      return Ok(());
    };
    if name.is_empty() {
      return Ok(());
    }

    if let Some(child) = self.get_child(&name) {
      tracing::trace!(parent = %self.name, child = %child.name, "dispatching to child");
      return child.process(sender, args, mode);
    }
    if let Some(alias) = self.alias(&name) {
      tracing::trace!(parent = %self.name, alias = %name, "dispatching through alias");
      return alias.process(sender, args, mode);
    }

    tracing::debug!(parent = %self.name, name, "unknown subcommand");
    if mode.reports_unknown() && self.unknown_subcommand() == UnknownSubcommand::Error {
      return Err(CommandError::UnknownSubcommand {
        parent: self.name.clone(),
        name,
      });
    }
    Ok(())
  }

  /// Runs the command, and its children as long as executors don't handle
  /// the invocation.
  pub fn execute(self: &Arc<Self>, sender: &Arc<dyn CommandSender>, args: &mut CommandArguments) -> Result<()> {
    let mut mode = Execute::new(sender.clone());
    self.process(Some(sender), args, &mut mode)
  }

  /// The command reached by following `path` through children and aliases.
  pub fn get_descendant<S: AsRef<str>>(self: &Arc<Self>, path: &[S]) -> Result<Option<Arc<Command>>> {
    let mut args = CommandArguments::from_tokens(path.iter().map(|segment| segment.as_ref().to_string()));
    let mut lookup = Lookup::default();
    self.process(None, &mut args, &mut lookup)?;
    Ok(lookup.found())
  }

  /// Completes the line at `cursor`: the executor completes its own
  /// arguments, then child and alias names are offered.
  pub fn complete(
    self: &Arc<Self>,
    sender: Option<&Arc<dyn CommandSender>>,
    args: &mut CommandArguments,
    cursor: usize,
    candidates: &mut Vec<String>,
  ) -> Result<Completion> {
    if sender.is_some_and(|sender| !self.has_permission(sender.as_ref())) {
      return Ok(Completion::None);
    }
    if let Some(executor) = self.executor() {
      match executor.complete(self, sender, args, cursor, candidates)? {
        Completion::Exhausted => {},
        result => return Ok(result),
      }
    }

    let pos = args.offset_to_argument(cursor);
    if pos.arg < 0 {
      return Ok(Completion::None);
    }
    if pos.arg == 0 {
      let name = format!("{SUBCOMMAND_ARG_NAME}{}", args.depth());
      let mut potential: BTreeSet<String> = self.children.read().keys().cloned().collect();
      potential.extend(self.aliases.read().keys().cloned());
      return Ok(args.complete(&name, pos, &potential, 0, candidates));
    }

    let Ok(name) = args.pop_sub_command() else {
      return Ok(Completion::None);
    };
    if let Some(child) = self.get_child(&name) {
      return child.complete(sender, args, cursor, candidates);
    }
    if let Some(alias) = self.alias(&name) {
      return alias.complete(sender, args, cursor, candidates);
    }
    Ok(Completion::None)
  }

  // Properties

  pub fn executor(&self) -> Option<Arc<dyn CommandExecutor>> {
    self.executor.read().clone()
  }

  pub fn set_executor(&self, executor: impl CommandExecutor + 'static) {
    *self.executor.write() = Some(Arc::new(executor));
  }

  /// Installs `executor` and returns the previous one.
  pub fn replace_executor(&self, executor: Option<Arc<dyn CommandExecutor>>) -> Option<Arc<dyn CommandExecutor>> {
    std::mem::replace(&mut *self.executor.write(), executor)
  }

  pub fn permission(&self) -> Option<String> {
    self.permission.read().clone()
  }

  pub fn set_permission(&self, permission: Option<String>) {
    *self.permission.write() = permission;
  }

  /// Senders may run the command if it requires no permission or if they
  /// hold it.
  pub fn has_permission(&self, sender: &dyn CommandSender) -> bool {
    match &*self.permission.read() {
      Some(permission) => sender.has_permission(permission),
      None => true,
    }
  }

  pub fn help(&self) -> Option<String> {
    self.help.read().clone()
  }

  pub fn set_help(&self, help: Option<String>) {
    *self.help.write() = help;
  }

  pub fn usage(&self) -> Option<String> {
    self.usage.read().clone()
  }

  pub fn set_usage(&self, usage: Option<String>) {
    *self.usage.write() = usage;
  }

  pub fn description(&self) -> Option<String> {
    self.description.read().clone()
  }

  pub fn set_description(&self, description: Option<String>) {
    *self.description.write() = description;
  }

  /// Filters in the order they run.
  pub fn filters(&self) -> Vec<Arc<dyn CommandFilter>> {
    self.filters.read().clone()
  }

  pub fn has_filter(&self, filter: &Arc<dyn CommandFilter>) -> bool {
    self.filters.read().iter().any(|f| Arc::ptr_eq(f, filter))
  }

  /// Adds `filter` after every filter of lower or equal priority. Returns
  /// `false` if it was already added.
  pub fn add_filter(&self, filter: Arc<dyn CommandFilter>) -> bool {
    let mut filters = self.filters.write();
    if filters.iter().any(|f| Arc::ptr_eq(f, &filter)) {
      return false;
    }
    let at = filters.partition_point(|f| f.priority() <= filter.priority());
    filters.insert(at, filter);
    true
  }

  pub fn remove_filter(&self, filter: &Arc<dyn CommandFilter>) -> bool {
    let mut filters = self.filters.write();
    let len = filters.len();
    filters.retain(|f| !Arc::ptr_eq(f, filter));
    filters.len() != len
  }

  /// Drops the executor and the filters. Children and aliases stay.
  pub fn clear(&self) {
    *self.executor.write() = None;
    self.filters.write().clear();
  }

  // Children

  pub fn children(&self) -> HashMap<String, Arc<Command>> {
    self.children.read().clone()
  }

  /// Looks `name` up as given, then, for a full `provider:name`, by its
  /// simple name.
  pub fn get_child(&self, name: &str) -> Option<Arc<Command>> {
    let key = self.normalize(name);
    let children = self.children.read();
    if let Some(child) = children.get(&key) {
      return Some(child.clone());
    }
    let simple = simple_name(name).ok()?;
    children.get(&self.normalize(&simple)).cloned()
  }

  pub fn has_child(&self, name: &str) -> bool {
    self.children.read().contains_key(&self.normalize(name))
  }

  /// Maps `command` to `name`. A different command previously mapped there
  /// moves to its full name.
  pub fn insert_child(self: &Arc<Self>, name: &str, command: Arc<Command>) -> Result<()> {
    self.ensure_same_manager(&command)?;
    let key = self.normalize(name);
    let mut events = Vec::with_capacity(2);
    {
      let mut children = self.children.write();
      let old = children.insert(key.clone(), command.clone());
      let displaced = old
        .clone()
        .filter(|old| !Arc::ptr_eq(old, &command) && self.normalize(&old.name) != key);
      events.push(TreeEvent::Child {
        name:   key,
        before: old,
        after:  Some(command),
      });
      if let Some(old) = displaced {
        let key = self.normalize(&old.name);
        let before = children.insert(key.clone(), old.clone());
        events.push(TreeEvent::Child {
          name: key,
          before,
          after: Some(old),
        });
      }
    }
    self.notify(events);
    Ok(())
  }

  /// Maps `command` to `name` unless something is mapped there already, in
  /// which case that command is returned.
  pub fn add_child_if_absent(self: &Arc<Self>, name: &str, command: Arc<Command>) -> Result<Option<Arc<Command>>> {
    self.ensure_same_manager(&command)?;
    let key = self.normalize(name);
    {
      let mut children = self.children.write();
      if let Some(previous) = children.get(&key) {
        return Ok(Some(previous.clone()));
      }
      children.insert(key.clone(), command.clone());
    }
    self.notify(vec![TreeEvent::Child {
      name:   key,
      before: None,
      after:  Some(command),
    }]);
    Ok(None)
  }

  pub fn add_child(self: &Arc<Self>, name: &str, command: Arc<Command>) -> Result<()> {
    match self.add_child_if_absent(name, command)? {
      None => Ok(()),
      Some(_) => {
        Err(CommandError::ChildAlreadyExists {
          parent: self.name.clone(),
          name:   name.to_string(),
        })
      },
    }
  }

  /// Maps `command` to its simple name, or to its full name when the simple
  /// name is taken.
  pub fn attach_child(self: &Arc<Self>, command: Arc<Command>) -> Result<()> {
    self.ensure_same_manager(&command)?;
    let simple = self.normalize(&command.simple_name);
    let event = {
      let mut children = self.children.write();
      if children.contains_key(&simple) {
        let key = self.normalize(&command.name);
        let before = children.insert(key.clone(), command.clone());
        TreeEvent::Child {
          name: key,
          before,
          after: Some(command),
        }
      } else {
        children.insert(simple.clone(), command.clone());
        TreeEvent::Child {
          name:   simple,
          before: None,
          after:  Some(command),
        }
      }
    };
    self.notify(vec![event]);
    Ok(())
  }

  pub fn remove_child(self: &Arc<Self>, name: &str) -> Option<Arc<Command>> {
    let key = self.normalize(name);
    let removed = self.children.write().remove(&key)?;
    self.notify(vec![TreeEvent::Child {
      name:   key,
      before: Some(removed.clone()),
      after:  None,
    }]);
    Some(removed)
  }

  // Aliases

  pub fn aliases(&self) -> HashMap<String, Arc<Alias>> {
    self.aliases.read().clone()
  }

  pub fn alias(&self, name: &str) -> Option<Arc<Alias>> {
    self.aliases.read().get(&self.normalize(name)).cloned()
  }

  pub fn has_alias(&self, name: &str) -> bool {
    self.aliases.read().contains_key(&self.normalize(name))
  }

  /// Maps `alias` to `name`, replacing whatever was there.
  pub fn overwrite_alias(self: &Arc<Self>, name: &str, alias: Arc<Alias>) -> Option<Arc<Alias>> {
    let key = self.normalize(name);
    let previous = self.aliases.write().insert(key.clone(), alias.clone());
    self.notify(vec![TreeEvent::Alias {
      name:   key,
      before: previous.clone(),
      after:  Some(alias),
    }]);
    previous
  }

  /// Maps `alias` to `name`. Fails if a different alias is mapped there.
  pub fn add_alias(self: &Arc<Self>, name: &str, alias: Arc<Alias>) -> Result<()> {
    let key = self.normalize(name);
    let previous = {
      let mut aliases = self.aliases.write();
      let previous = aliases.get(&key).cloned();
      if previous.as_ref().is_some_and(|previous| *previous != alias) {
        return Err(CommandError::AliasAlreadyExists {
          parent: self.name.clone(),
          name:   name.to_string(),
        });
      }
      aliases.insert(key.clone(), alias.clone());
      previous
    };
    self.notify(vec![TreeEvent::Alias {
      name: key,
      before: previous,
      after: Some(alias),
    }]);
    Ok(())
  }

  /// Maps `alias` to `name` unless an alias is mapped there already, in which
  /// case that alias is returned.
  pub fn add_alias_if_absent(self: &Arc<Self>, name: &str, alias: Arc<Alias>) -> Option<Arc<Alias>> {
    let key = self.normalize(name);
    {
      let mut aliases = self.aliases.write();
      if let Some(previous) = aliases.get(&key) {
        return Some(previous.clone());
      }
      aliases.insert(key.clone(), alias.clone());
    }
    self.notify(vec![TreeEvent::Alias {
      name:   key,
      before: None,
      after:  Some(alias),
    }]);
    None
  }

  pub fn remove_alias(self: &Arc<Self>, name: &str) -> Option<Arc<Alias>> {
    let key = self.normalize(name);
    let removed = self.aliases.write().remove(&key)?;
    self.notify(vec![TreeEvent::Alias {
      name:   key,
      before: Some(removed.clone()),
      after:  None,
    }]);
    Some(removed)
  }
}

impl PartialEq for Command {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
  }
}

impl Eq for Command {}

impl Hash for Command {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name.hash(state);
  }
}

impl fmt::Debug for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Command").field("name", &self.name).finish_non_exhaustive()
  }
}

#[cfg(test)]
mod test {
  use parking_lot::Mutex;

  use super::*;
  use crate::{
    filter::FnFilter,
    sender::test::RecordingSender,
  };

  fn sender(permissions: &[&str]) -> Arc<dyn CommandSender> {
    Arc::new(RecordingSender::new("Steve", permissions))
  }

  #[test]
  fn simple_names() {
    assert_eq!(simple_name("flow:root").unwrap(), "root");
    assert_eq!(simple_name("plugin:admin.ban").unwrap(), "ban");
    assert!(matches!(simple_name("root"), Err(CommandError::InvalidName(_))));
    assert!(matches!(simple_name("a:b:c"), Err(CommandError::InvalidName(_))));
  }

  #[test]
  fn executes_handled_command() {
    let manager = CommandManager::new();
    let root = manager.root();
    let say = manager.get_command("test", "say").unwrap();
    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = heard.clone();
    say.set_executor(move |_: &Arc<Command>, _: &Arc<dyn CommandSender>, args: &mut CommandArguments| -> Result<bool> {
      sink.lock().push(args.pop_remaining_strings("message")?);
      Ok(true)
    });
    root.attach_child(say).unwrap();

    let mut args = CommandArguments::from_tokens(["say", "hello", "there"]);
    root.execute(&sender(&[]), &mut args).unwrap();
    assert_eq!(*heard.lock(), ["hello there"]);
  }

  #[test]
  fn permission_is_checked_before_executor() {
    let manager = CommandManager::new();
    let ban = manager.get_command("test", "ban").unwrap();
    ban.set_permission(Some("test.ban".to_string()));
    ban.set_executor(|_: &Arc<Command>, _: &Arc<dyn CommandSender>, _: &mut CommandArguments| -> Result<bool> {
      panic!("executor must not run")
    });
    manager.root().attach_child(ban.clone()).unwrap();

    let err = manager.execute_command(&sender(&[]), "ban Steve").unwrap_err();
    assert!(matches!(err, CommandError::InsufficientPermission { ref permission, .. } if permission == "test.ban"));
    assert_eq!(err.to_string(), "Not enough permissions to execute this command.");
    // Lookups carry no sender and skip the check.
    assert_eq!(manager.command_by_path(&["ban"]).unwrap(), Some(ban));
  }

  #[test]
  fn filters_run_by_priority() {
    let manager = CommandManager::new();
    let command = manager.get_command("test", "cmd").unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    for priority in [3, 1, 2] {
      let order = order.clone();
      command.add_filter(Arc::new(FnFilter::new(
        priority,
        move |_: &Command, _: &Arc<dyn CommandSender>, _: &CommandArguments| -> Result<()> {
          order.lock().push(priority);
          Ok(())
        },
      )));
    }
    let mut args = CommandArguments::from_tokens(Vec::<String>::new());
    command.execute(&sender(&[]), &mut args).unwrap();
    assert_eq!(*order.lock(), [1, 2, 3]);

    let rejecting: Arc<dyn CommandFilter> = Arc::new(FnFilter::new(
      0,
      |_: &Command, _: &Arc<dyn CommandSender>, _: &CommandArguments| -> Result<()> {
        Err(CommandError::rejected("nope"))
      },
    ));
    assert!(command.add_filter(rejecting.clone()));
    assert!(!command.add_filter(rejecting.clone()));
    let mut args = CommandArguments::from_tokens(Vec::<String>::new());
    assert_eq!(command.execute(&sender(&[]), &mut args).unwrap_err().to_string(), "nope");
    assert!(command.remove_filter(&rejecting));
    assert!(!command.has_filter(&rejecting));
  }

  #[test]
  fn unhandled_falls_through_to_children() {
    let manager = CommandManager::new();
    let parent = manager.get_command("test", "parent").unwrap();
    let child = manager.get_command("test", "child").unwrap();
    let ran = Arc::new(Mutex::new(Vec::new()));
    for command in [&parent, &child] {
      let ran = ran.clone();
      command.set_executor(move |command: &Arc<Command>, _: &Arc<dyn CommandSender>, _: &mut CommandArguments| -> Result<bool> {
        ran.lock().push(command.simple_name().to_string());
        Ok(false)
      });
    }
    parent.attach_child(child).unwrap();
    manager.root().attach_child(parent).unwrap();

    manager.execute_command(&sender(&[]), "parent child").unwrap();
    assert_eq!(*ran.lock(), ["parent", "child"]);
  }

  #[test]
  fn unknown_subcommand_is_reported() {
    let manager = CommandManager::new();
    let err = manager.execute_command(&sender(&[]), "nothing here").unwrap_err();
    assert!(matches!(err, CommandError::UnknownSubcommand { ref name, .. } if name == "nothing"));
    // A trailing separator is not a subcommand.
    manager.execute_command(&sender(&[]), "").unwrap();
    assert_eq!(manager.command_by_path(&["nothing"]).unwrap(), None);
  }

  #[test]
  fn insert_child_moves_displaced_command() {
    let manager = CommandManager::new();
    let root = manager.root();
    let first = manager.get_command("one", "tp").unwrap();
    let second = manager.get_command("two", "tp").unwrap();
    root.insert_child("tp", first.clone()).unwrap();
    root.insert_child("tp", second.clone()).unwrap();
    assert_eq!(root.get_child("tp"), Some(second.clone()));
    assert_eq!(root.get_child("one:tp"), Some(first));
    // Re-inserting the same command displaces nothing.
    root.insert_child("tp", second).unwrap();
    assert_eq!(root.children().len(), 2);
  }

  #[test]
  fn insert_child_over_a_full_name_slot() {
    let manager = CommandManager::new();
    let root = manager.root();
    let first = manager.get_command("one", "tp").unwrap();
    let third = manager.get_command("three", "tp").unwrap();
    root.insert_child("one:tp", first).unwrap();
    root.insert_child("one:tp", third.clone()).unwrap();
    assert_eq!(root.get_child("one:tp"), Some(third));
    assert_eq!(root.children().len(), 1);
  }

  #[test]
  fn add_child_variants() {
    let manager = CommandManager::new();
    let root = manager.root();
    let a = manager.get_command("test", "a").unwrap();
    let b = manager.get_command("test", "b").unwrap();
    root.add_child("x", a.clone()).unwrap();
    assert!(matches!(
      root.add_child("x", b.clone()),
      Err(CommandError::ChildAlreadyExists { .. })
    ));
    assert_eq!(root.add_child_if_absent("x", b.clone()).unwrap(), Some(a.clone()));
    assert_eq!(root.remove_child("x"), Some(a));
    assert!(!root.has_child("x"));
    assert_eq!(root.remove_child("x"), None);

    let other = CommandManager::new();
    let foreign = other.get_command("test", "foreign").unwrap();
    assert!(matches!(root.add_child("f", foreign), Err(CommandError::ForeignCommand(_))));
  }

  #[test]
  fn attach_child_falls_back_to_full_name() {
    let manager = CommandManager::new();
    let root = manager.root();
    let mine = manager.get_command("mine", "home").unwrap();
    let theirs = manager.get_command("theirs", "admin.home").unwrap();
    root.attach_child(mine.clone()).unwrap();
    root.attach_child(theirs.clone()).unwrap();
    assert_eq!(root.get_child("home"), Some(mine));
    assert_eq!(root.get_child("theirs:admin.home"), Some(theirs));
  }

  #[test]
  fn alias_registration() {
    let manager = CommandManager::new();
    let root = manager.root();
    let first = Alias::new(vec!["a".into()], &root);
    let second = Alias::new(vec!["b".into()], &root);
    root.add_alias("x", first.clone()).unwrap();
    // The same alias again is fine.
    root.add_alias("x", Alias::new(vec!["a".into()], &root)).unwrap();
    assert!(matches!(
      root.add_alias("x", second.clone()),
      Err(CommandError::AliasAlreadyExists { .. })
    ));
    assert_eq!(root.add_alias_if_absent("x", second.clone()), Some(first.clone()));
    assert_eq!(root.overwrite_alias("x", second.clone()), Some(first));
    assert_eq!(root.alias("x"), Some(second.clone()));
    assert_eq!(root.remove_alias("x"), Some(second));
    assert!(!root.has_alias("x"));
  }

  #[test]
  fn clear_keeps_children() {
    let manager = CommandManager::new();
    let parent = manager.get_command("test", "parent").unwrap();
    parent.set_executor(|_: &Arc<Command>, _: &Arc<dyn CommandSender>, _: &mut CommandArguments| -> Result<bool> {
      Ok(true)
    });
    parent.add_filter(Arc::new(FnFilter::new(
      0,
      |_: &Command, _: &Arc<dyn CommandSender>, _: &CommandArguments| -> Result<()> { Ok(()) },
    )));
    parent.attach_child(manager.get_command("test", "child").unwrap()).unwrap();
    parent.clear();
    assert!(parent.executor().is_none());
    assert!(parent.filters().is_empty());
    assert!(parent.has_child("child"));
  }

  #[test]
  fn completes_child_names() {
    let manager = CommandManager::new();
    let root = manager.root();
    let parent = manager.get_command("test", "teleport").unwrap();
    root.attach_child(parent.clone()).unwrap();
    root.attach_child(manager.get_command("test", "tell").unwrap()).unwrap();
    parent.attach_child(manager.get_command("test", "here").unwrap()).unwrap();
    manager.add_alias(&["tp"], &["teleport"]).unwrap();

    let mut candidates = Vec::new();
    let result = manager.complete_command(None, "te", 2, &mut candidates).unwrap();
    assert_eq!(result, Completion::At(0));
    assert_eq!(candidates, ["teleport ", "tell "]);

    let mut candidates = Vec::new();
    let result = manager.complete_command(None, "tp h", 4, &mut candidates).unwrap();
    assert_eq!(result, Completion::At(3));
    assert_eq!(candidates, ["here "]);
  }

  #[test]
  fn equality_by_name() {
    let manager = CommandManager::new();
    let a = manager.get_command("test", "a").unwrap();
    let b = CommandManager::new().get_command("test", "a").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(*a, *b);
    let c = CommandManager::new().get_command("TEST", "a").unwrap();
    assert_ne!(*a, *c);
  }
}
