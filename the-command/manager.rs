//! The registry that owns every command of a tree.
//!
//! Full command names (`provider:name`) are unique per manager and matched
//! case-insensitively; [`CommandManager::get_command`] hands out exactly one
//! [`Command`] per name no matter how many threads ask at once. Commands keep
//! a weak reference back to the manager for configuration and tree listeners.

use std::{
  collections::HashMap,
  sync::Arc,
};

use parking_lot::RwLock;

use crate::{
  alias::Alias,
  arguments::{
    CommandArguments,
    Completion,
  },
  command::{
    self,
    Command,
  },
  config::CommandsConfig,
  error::{
    CommandError,
    Result,
  },
  sender::CommandSender,
  syntax::{
    DefaultSyntax,
    Syntax,
  },
};

/// Observes changes of the command tree.
///
/// Callbacks run after the change is visible and no tree lock is held, so
/// they may read or modify the tree.
pub trait TreeListener: Send + Sync {
  fn on_child_change(
    &self,
    _parent: &Arc<Command>,
    _name: &str,
    _before: Option<&Arc<Command>>,
    _after: Option<&Arc<Command>>,
  ) {
  }

  fn on_alias_change(
    &self,
    _parent: &Arc<Command>,
    _name: &str,
    _before: Option<&Arc<Alias>>,
    _after: Option<&Arc<Alias>>,
  ) {
  }
}

pub(crate) struct ManagerShared {
  pub(crate) config: CommandsConfig,
  syntax:            Arc<dyn Syntax>,
  commands:          RwLock<HashMap<String, Arc<Command>>>,
  providers:         RwLock<HashMap<String, HashMap<String, Arc<Command>>>>,
  root:              Arc<Command>,
  listeners:         RwLock<Vec<Arc<dyn TreeListener>>>,
}

impl ManagerShared {
  pub(crate) fn normalize_child_name(&self, name: &str) -> String {
    if self.config.case_sensitive {
      name.to_string()
    } else {
      name.to_lowercase()
    }
  }

  pub(crate) fn on_child_change(
    &self,
    parent: &Arc<Command>,
    name: &str,
    before: Option<&Arc<Command>>,
    after: Option<&Arc<Command>>,
  ) {
    tracing::trace!(parent = %parent.name(), name, "child changed");
    let listeners = self.listeners.read().clone();
    for listener in listeners {
      listener.on_child_change(parent, name, before, after);
    }
  }

  pub(crate) fn on_alias_change(
    &self,
    parent: &Arc<Command>,
    name: &str,
    before: Option<&Arc<Alias>>,
    after: Option<&Arc<Alias>>,
  ) {
    tracing::trace!(parent = %parent.name(), name, "alias changed");
    let listeners = self.listeners.read().clone();
    for listener in listeners {
      listener.on_alias_change(parent, name, before, after);
    }
  }
}

/// Handle to a command tree. Clones share the same tree.
#[derive(Clone)]
pub struct CommandManager {
  shared: Arc<ManagerShared>,
}

impl Default for CommandManager {
  fn default() -> Self {
    Self::new()
  }
}

impl CommandManager {
  /// A manager with the default configuration and a `flow:root` root.
  pub fn new() -> Self {
    Self::assemble(
      CommandsConfig::default(),
      Arc::new(DefaultSyntax::new()),
      "root".to_string(),
    )
  }

  pub fn with_config(config: CommandsConfig) -> Result<Self> {
    let root = command::simple_name(&config.root)?;
    let syntax = config.build_syntax()?;
    Ok(Self::assemble(config, syntax, root))
  }

  fn assemble(config: CommandsConfig, syntax: Arc<dyn Syntax>, root_simple: String) -> Self {
    let shared = Arc::new_cyclic(|manager| {
      let root = Arc::new(Command::new(config.root.clone(), root_simple, manager.clone()));
      let key = config.root.to_lowercase();
      let provider = key.split(':').next().unwrap_or_default().to_string();
      ManagerShared {
        commands: RwLock::new(HashMap::from([(key.clone(), root.clone())])),
        providers: RwLock::new(HashMap::from([(
          provider,
          HashMap::from([(key, root.clone())]),
        )])),
        root,
        listeners: RwLock::new(Vec::new()),
        syntax,
        config,
      }
    });
    Self { shared }
  }

  pub(crate) fn from_shared(shared: Arc<ManagerShared>) -> Self {
    Self { shared }
  }

  pub fn config(&self) -> &CommandsConfig {
    &self.shared.config
  }

  /// Tokenizer for lines given to [`Self::execute_command`].
  pub fn syntax(&self) -> Arc<dyn Syntax> {
    self.shared.syntax.clone()
  }

  pub fn root(&self) -> Arc<Command> {
    self.shared.root.clone()
  }

  /// Returns the command named `provider:name`, creating it on first use.
  pub fn get_command(&self, provider: &str, name: &str) -> Result<Arc<Command>> {
    let full_name = format!("{provider}:{name}");
    let key = full_name.to_lowercase();
    if let Some(command) = self.shared.commands.read().get(&key) {
      return Ok(command.clone());
    }
    let simple_name = command::simple_name(&full_name)?;

    let command = {
      let mut commands = self.shared.commands.write();
      if let Some(command) = commands.get(&key) {
        return Ok(command.clone());
      }
      let command = Arc::new(Command::new(
        full_name,
        simple_name,
        Arc::downgrade(&self.shared),
      ));
      commands.insert(key.clone(), command.clone());
      // Published to its provider before the name lock is released.
      self
        .shared
        .providers
        .write()
        .entry(provider.to_lowercase())
        .or_default()
        .insert(key, command.clone());
      command
    };
    tracing::debug!(name = %command.name(), "created command");
    Ok(command)
  }

  /// [`Self::get_command`] for a name of the form `provider:name`.
  pub fn get_command_by_full_name(&self, full_name: &str) -> Result<Arc<Command>> {
    match full_name.split_once(':') {
      Some((provider, name)) if !name.contains(':') => self.get_command(provider, name),
      _ => Err(CommandError::InvalidName(full_name.to_string())),
    }
  }

  /// The command with the given full name, if it was ever created.
  pub fn stored_command(&self, full_name: &str) -> Option<Arc<Command>> {
    self.shared.commands.read().get(&full_name.to_lowercase()).cloned()
  }

  /// Every command created for `provider`.
  pub fn provider_commands(&self, provider: &str) -> Vec<Arc<Command>> {
    self
      .shared
      .providers
      .read()
      .get(&provider.to_lowercase())
      .map(|commands| commands.values().cloned().collect())
      .unwrap_or_default()
  }

  /// Drops the executors and filters of every command of `provider`. Returns
  /// `false` if the provider never created a command.
  pub fn clear_commands(&self, provider: &str) -> bool {
    let commands = self.provider_commands(provider);
    if commands.is_empty() {
      return false;
    }
    tracing::debug!(provider, count = commands.len(), "clearing commands");
    for command in commands {
      command.clear();
    }
    true
  }

  pub fn command_by_path<S: AsRef<str>>(&self, path: &[S]) -> Result<Option<Arc<Command>>> {
    self.shared.root.get_descendant(path)
  }

  fn parent_of<'a, S: AsRef<str>>(&self, path: &'a [S]) -> Result<(Arc<Command>, &'a str)> {
    let Some((last, parents)) = path.split_last() else {
      return Err(CommandError::Config("empty command path".to_string()));
    };
    let parent = self.command_by_path(parents)?.ok_or_else(|| {
      CommandError::UnknownSubcommand {
        parent: self.shared.root.name().to_string(),
        name:   parents.iter().map(|segment| segment.as_ref()).collect::<Vec<_>>().join(" "),
      }
    })?;
    Ok((parent, last.as_ref()))
  }

  /// Makes `command` reachable at `path`.
  pub fn set_path<S: AsRef<str>>(&self, path: &[S], command: Arc<Command>) -> Result<()> {
    let (parent, name) = self.parent_of(path)?;
    parent.insert_child(name, command)
  }

  /// Unlinks whatever command is reachable at `path`.
  pub fn clear_path<S: AsRef<str>>(&self, path: &[S]) -> Result<Option<Arc<Command>>> {
    let (parent, name) = self.parent_of(path)?;
    Ok(parent.remove_child(name))
  }

  /// Adds an alias at `path` pointing at `destination`, relative to the
  /// parent of `path`.
  pub fn add_alias<S: AsRef<str>, D: AsRef<str>>(&self, path: &[S], destination: &[D]) -> Result<()> {
    let (parent, name) = self.parent_of(path)?;
    self.add_alias_at(&parent, name, destination)
  }

  pub fn add_alias_at<D: AsRef<str>>(&self, parent: &Arc<Command>, name: &str, destination: &[D]) -> Result<()> {
    let destination = destination.iter().map(|segment| segment.as_ref().to_string()).collect();
    parent.add_alias(name, Alias::new(destination, parent))
  }

  /// Tokenizes `line` and dispatches it from the root.
  pub fn execute_command(&self, sender: &Arc<dyn CommandSender>, line: &str) -> Result<()> {
    let mut args = CommandArguments::parse(line, self.syntax());
    self.execute_arguments(sender, &mut args)
  }

  pub fn execute_arguments(&self, sender: &Arc<dyn CommandSender>, args: &mut CommandArguments) -> Result<()> {
    tracing::trace!(sender = sender.name(), %args, "executing");
    self.shared.root.execute(sender, args)
  }

  /// Completes `line` at the byte offset `cursor`.
  pub fn complete_command(
    &self,
    sender: Option<&Arc<dyn CommandSender>>,
    line: &str,
    cursor: usize,
    candidates: &mut Vec<String>,
  ) -> Result<Completion> {
    let mut args = CommandArguments::parse(line, self.syntax());
    self.shared.root.complete(sender, &mut args, cursor, candidates)
  }

  /// Child and alias names are matched after this normalization.
  pub fn normalize_child_name(&self, name: &str) -> String {
    self.shared.normalize_child_name(name)
  }

  pub fn add_listener(&self, listener: Arc<dyn TreeListener>) {
    self.shared.listeners.write().push(listener);
  }

  pub fn remove_listener(&self, listener: &Arc<dyn TreeListener>) -> bool {
    let mut listeners = self.shared.listeners.write();
    let len = listeners.len();
    listeners.retain(|l| !Arc::ptr_eq(l, listener));
    listeners.len() != len
  }
}

#[cfg(test)]
mod test {
  use parking_lot::Mutex;

  use super::*;
  use crate::config::UnknownSubcommand;

  #[derive(Default)]
  struct Recorder {
    events: Mutex<Vec<String>>,
  }

  impl TreeListener for Recorder {
    fn on_child_change(
      &self,
      parent: &Arc<Command>,
      name: &str,
      before: Option<&Arc<Command>>,
      after: Option<&Arc<Command>>,
    ) {
      self.events.lock().push(format!(
        "{} {name}: {:?} -> {:?}",
        parent.simple_name(),
        before.map(|c| c.name()),
        after.map(|c| c.name()),
      ));
    }

    fn on_alias_change(
      &self,
      parent: &Arc<Command>,
      name: &str,
      _before: Option<&Arc<Alias>>,
      after: Option<&Arc<Alias>>,
    ) {
      self.events.lock().push(format!(
        "{} alias {name}: {:?}",
        parent.simple_name(),
        after.map(|a| a.path().to_vec()),
      ));
    }
  }

  #[test]
  fn one_command_per_name() {
    let manager = CommandManager::new();
    let a = manager.get_command("Test", "Cmd").unwrap();
    let b = manager.get_command("test", "cmd").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), "Test:Cmd");
    assert!(Arc::ptr_eq(&manager.stored_command("TEST:CMD").unwrap(), &a));
    assert!(Arc::ptr_eq(&manager.get_command("flow", "root").unwrap(), &manager.root()));
    assert!(matches!(
      manager.get_command("a:b", "c"),
      Err(CommandError::InvalidName(_))
    ));
    assert!(manager.get_command_by_full_name("test:cmd").is_ok());
    assert!(manager.get_command_by_full_name("cmd").is_err());
  }

  #[test]
  fn custom_root() {
    let config = CommandsConfig {
      root: "server:main".to_string(),
      ..Default::default()
    };
    let manager = CommandManager::with_config(config).unwrap();
    assert_eq!(manager.root().name(), "server:main");
    assert_eq!(manager.root().simple_name(), "main");

    let config = CommandsConfig {
      root: "main".to_string(),
      ..Default::default()
    };
    assert!(CommandManager::with_config(config).is_err());
  }

  #[test]
  fn paths() {
    let manager = CommandManager::new();
    let admin = manager.get_command("test", "admin").unwrap();
    let kick = manager.get_command("test", "kick").unwrap();
    manager.set_path(&["admin"], admin.clone()).unwrap();
    manager.set_path(&["admin", "kick"], kick.clone()).unwrap();
    assert_eq!(manager.command_by_path(&["admin", "kick"]).unwrap(), Some(kick.clone()));
    assert_eq!(manager.command_by_path(&[] as &[&str]).unwrap(), Some(manager.root()));

    assert!(matches!(
      manager.set_path(&["missing", "kick"], kick.clone()),
      Err(CommandError::UnknownSubcommand { .. })
    ));
    assert!(manager.set_path(&[] as &[&str], kick.clone()).is_err());

    assert_eq!(manager.clear_path(&["admin", "kick"]).unwrap(), Some(kick));
    assert_eq!(manager.command_by_path(&["admin", "kick"]).unwrap(), None);
  }

  #[test]
  fn clear_commands_by_provider() {
    let manager = CommandManager::new();
    let command = manager.get_command("Plugin", "cmd").unwrap();
    command.set_executor(|_: &Arc<Command>, _: &Arc<dyn CommandSender>, _: &mut CommandArguments| -> Result<bool> {
      Ok(true)
    });
    assert_eq!(manager.provider_commands("plugin").len(), 1);
    assert!(manager.clear_commands("PLUGIN"));
    assert!(command.executor().is_none());
    assert!(!manager.clear_commands("other"));
  }

  #[test]
  fn case_insensitive_children() {
    let config = CommandsConfig {
      case_sensitive: false,
      ..Default::default()
    };
    let manager = CommandManager::with_config(config).unwrap();
    let home = manager.get_command("test", "home").unwrap();
    manager.root().add_child("Home", home.clone()).unwrap();
    assert_eq!(manager.command_by_path(&["HOME"]).unwrap(), Some(home));
    assert_eq!(manager.normalize_child_name("HoMe"), "home");

    let manager = CommandManager::new();
    let home = manager.get_command("test", "home").unwrap();
    manager.root().add_child("Home", home).unwrap();
    assert_eq!(manager.command_by_path(&["home"]).unwrap(), None);
  }

  #[test]
  fn ignoring_unknown_subcommands() {
    let config = CommandsConfig {
      unknown_subcommand: UnknownSubcommand::Ignore,
      ..Default::default()
    };
    let manager = CommandManager::with_config(config).unwrap();
    let sender: Arc<dyn CommandSender> = Arc::new(crate::sender::test::RecordingSender::new("Steve", &[]));
    manager.execute_command(&sender, "nothing").unwrap();
  }

  #[test]
  fn listeners_see_changes() {
    let manager = CommandManager::new();
    let recorder = Arc::new(Recorder::default());
    let listener: Arc<dyn TreeListener> = recorder.clone();
    manager.add_listener(listener.clone());

    let root = manager.root();
    let first = manager.get_command("one", "tp").unwrap();
    let second = manager.get_command("two", "tp").unwrap();
    root.insert_child("tp", first).unwrap();
    root.insert_child("tp", second).unwrap();
    manager.add_alias(&["t"], &["tp"]).unwrap();
    root.remove_child("tp");

    assert_eq!(*recorder.events.lock(), [
      "root tp: None -> Some(\"one:tp\")",
      "root tp: Some(\"one:tp\") -> Some(\"two:tp\")",
      "root one:tp: None -> Some(\"one:tp\")",
      "root alias t: Some([\"tp\"])",
      "root tp: Some(\"two:tp\") -> None",
    ]);

    assert!(manager.remove_listener(&listener));
    root.remove_child("one:tp");
    assert_eq!(recorder.events.lock().len(), 5);
  }

  #[test]
  fn listeners_may_modify_the_tree() {
    struct Mirror;

    impl TreeListener for Mirror {
      fn on_child_change(
        &self,
        parent: &Arc<Command>,
        name: &str,
        _before: Option<&Arc<Command>>,
        after: Option<&Arc<Command>>,
      ) {
        if let Some(after) = after
          && !name.starts_with('_')
        {
          parent.add_child_if_absent(&format!("_{name}"), after.clone()).unwrap();
        }
      }
    }

    let manager = CommandManager::new();
    manager.add_listener(Arc::new(Mirror));
    let cmd = manager.get_command("test", "cmd").unwrap();
    manager.root().add_child("cmd", cmd.clone()).unwrap();
    assert_eq!(manager.root().get_child("_cmd"), Some(cmd));
  }
}
