//! Reading and writing the shape of a command tree as TOML.
//!
//! Every key of a table is a child or alias name of the command the table
//! belongs to; the top level table belongs to the root:
//!
//! ```toml
//! home = "essentials:home"        # child command, by full name
//! h = ["home"]                    # alias, by path relative to the parent
//!
//! [warp]
//! "=" = "essentials:warp"         # the child itself
//! set = "essentials:setwarp"      # and its children
//! ```

use std::{
  collections::HashSet,
  sync::{
    Arc,
    atomic::{
      AtomicBool,
      Ordering,
    },
  },
};

use parking_lot::Mutex;
use toml::{
  Table,
  Value,
};

use crate::{
  alias::Alias,
  command::Command,
  error::{
    CommandError,
    Result,
  },
  manager::{
    CommandManager,
    TreeListener,
  },
};

/// Key of the entry naming the command a table stands for.
pub const SELF_KEY: &str = "=";

/// Links the commands and aliases described by `table` into the tree of
/// `manager`. Entries that can't be applied are skipped; their errors are
/// returned.
pub fn apply(manager: &CommandManager, table: &Table) -> Vec<CommandError> {
  let mut errors = Vec::new();
  apply_entries(manager, &manager.root(), table, &mut errors);
  errors
}

fn apply_entries(manager: &CommandManager, parent: &Arc<Command>, table: &Table, errors: &mut Vec<CommandError>) {
  for (name, value) in table {
    if name == SELF_KEY {
      continue;
    }
    if let Err(err) = apply_entry(manager, parent, name, value, errors) {
      tracing::warn!(parent = %parent.name(), name, %err, "skipping command config entry");
      errors.push(err);
    }
  }
}

fn apply_entry(
  manager: &CommandManager,
  parent: &Arc<Command>,
  name: &str,
  value: &Value,
  errors: &mut Vec<CommandError>,
) -> Result<()> {
  let Value::Table(table) = value else {
    return link(manager, parent, name, value).map(|_| ());
  };
  let node = table.get(SELF_KEY).ok_or_else(|| {
    CommandError::Config(format!("'{name}' has children but no '{SELF_KEY}' entry"))
  })?;
  let target = match link(manager, parent, name, node)? {
    Some(command) => command,
    None => {
      let path = alias_path(name, node)?;
      parent.get_descendant(&path)?.ok_or_else(|| {
        CommandError::UnknownSubcommand {
          parent: parent.name().to_string(),
          name:   path.join(" "),
        }
      })?
    },
  };
  apply_entries(manager, &target, table, errors);
  Ok(())
}

/// Links a single child or alias. Returns the child command.
fn link(manager: &CommandManager, parent: &Arc<Command>, name: &str, value: &Value) -> Result<Option<Arc<Command>>> {
  match value {
    Value::String(full_name) => {
      let command = manager.get_command_by_full_name(full_name)?;
      parent.insert_child(name, command.clone())?;
      Ok(Some(command))
    },
    Value::Array(_) => {
      let path = alias_path(name, value)?;
      parent.overwrite_alias(name, Alias::new(path, parent));
      Ok(None)
    },
    other => {
      Err(CommandError::Config(format!(
        "'{name}' must be a command name, an alias path or a table, not {}",
        other.type_str()
      )))
    },
  }
}

fn alias_path(name: &str, value: &Value) -> Result<Vec<String>> {
  let Value::Array(items) = value else {
    return Err(CommandError::Config(format!("'{name}' is not an alias path")));
  };
  items
    .iter()
    .map(|item| {
      item
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CommandError::Config(format!("alias '{name}' has a non-string segment")))
    })
    .collect()
}

/// Describes the tree of `manager` in the format read by [`apply`].
pub fn snapshot(manager: &CommandManager) -> Table {
  let root = manager.root();
  let mut visited = HashSet::from([root.name().to_string()]);
  entries(&root, &mut visited)
}

fn entries(command: &Arc<Command>, visited: &mut HashSet<String>) -> Table {
  let mut table = Table::new();
  for (name, alias) in command.aliases() {
    table.insert(name, Value::Array(alias.path().iter().cloned().map(Value::String).collect()));
  }
  for (name, child) in command.children() {
    table.insert(name, node(&child, visited));
  }
  table
}

fn node(command: &Arc<Command>, visited: &mut HashSet<String>) -> Value {
  let name = command.name().to_string();
  if visited.contains(&name) {
    tracing::warn!(command = %name, "cycle in command tree");
    return Value::String(name);
  }
  if command.children().is_empty() && command.aliases().is_empty() {
    return Value::String(name);
  }

  visited.insert(name.clone());
  let mut table = entries(command, visited);
  visited.remove(&name);
  table.insert(SELF_KEY.to_string(), Value::String(name));
  Value::Table(table)
}

/// Keeps a TOML description of a tree current as the tree changes.
///
/// Register it with [`CommandManager::add_listener`].
#[derive(Default)]
pub struct ConfigMirror {
  table:   Mutex<Table>,
  loading: AtomicBool,
}

impl ConfigMirror {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn table(&self) -> Table {
    self.table.lock().clone()
  }

  pub fn to_toml_string(&self) -> Result<String> {
    Ok(toml::to_string(&*self.table.lock())?)
  }

  /// Applies `source` to the tree of `manager`. Errors of single entries are
  /// returned, a malformed document fails as a whole.
  pub fn load_str(&self, manager: &CommandManager, source: &str) -> Result<Vec<CommandError>> {
    let table: Table = toml::from_str(source)?;
    Ok(self.load(manager, &table))
  }

  pub fn load(&self, manager: &CommandManager, table: &Table) -> Vec<CommandError> {
    self.loading.store(true, Ordering::Release);
    let errors = apply(manager, table);
    self.loading.store(false, Ordering::Release);
    self.refresh(manager);
    errors
  }

  pub fn refresh(&self, manager: &CommandManager) {
    *self.table.lock() = snapshot(manager);
  }

  fn on_change(&self, parent: &Arc<Command>) {
    if self.loading.load(Ordering::Acquire) {
      return;
    }
    if let Some(manager) = parent.manager() {
      self.refresh(&manager);
    }
  }
}

impl TreeListener for ConfigMirror {
  fn on_child_change(
    &self,
    parent: &Arc<Command>,
    _name: &str,
    before: Option<&Arc<Command>>,
    after: Option<&Arc<Command>>,
  ) {
    if let (Some(before), Some(after)) = (before, after)
      && Arc::ptr_eq(before, after)
    {
      return;
    }
    self.on_change(parent);
  }

  fn on_alias_change(
    &self,
    parent: &Arc<Command>,
    _name: &str,
    before: Option<&Arc<Alias>>,
    after: Option<&Arc<Alias>>,
  ) {
    if before.is_some() && before == after {
      return;
    }
    self.on_change(parent);
  }
}
