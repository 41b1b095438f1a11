//! # the-command
//!
//! Command line parsing and dispatch for interactive applications.
//!
//! A line typed by a user is split into tokens by a [`Syntax`], wrapped in a
//! [`CommandArguments`] cursor and dispatched through a tree of [`Command`]s
//! owned by a [`CommandManager`]. Every command on the way checks permissions,
//! runs its filters and may hand the line to its [`CommandExecutor`], which
//! pops typed values off the cursor.
//!
//! ## Core Concepts
//!
//! - **Tokens and paddings**: splitting keeps quoted text together and
//!   remembers how many extra separators preceded each token, so the original
//!   line can be rebuilt and cursor offsets mapped to arguments.
//! - **Silenceable errors**: only a missing argument may be replaced by a
//!   default; malformed input always fails.
//! - **Flags**: a [`CommandFlags`] registry is a grammar, parsed by a
//!   [`FlagSyntax`] (`-abc`, `--name value`, `--name=value`).
//! - **Aliases**: names that redirect dispatch to another path of the tree.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::{
//!   any::Any,
//!   sync::Arc,
//! };
//!
//! use the_command::{
//!   Command,
//!   CommandArguments,
//!   CommandManager,
//!   CommandSender,
//!   Result,
//! };
//!
//! struct Console;
//!
//! impl CommandSender for Console {
//!   fn name(&self) -> &str {
//!     "console"
//!   }
//!
//!   fn has_permission(&self, _permission: &str) -> bool {
//!     true
//!   }
//!
//!   fn send_message(&self, message: &str) {
//!     println!("{message}");
//!   }
//!
//!   fn as_any(&self) -> &dyn Any {
//!     self
//!   }
//! }
//!
//! let manager = CommandManager::new();
//! let say = manager.get_command("demo", "say")?;
//! say.set_executor(
//!   |_: &Arc<Command>, sender: &Arc<dyn CommandSender>, args: &mut CommandArguments| -> Result<bool> {
//!     let message = args.pop_remaining_strings("message")?;
//!     sender.send_message(&message);
//!     Ok(true)
//!   },
//! );
//! manager.root().attach_child(say)?;
//!
//! let console: Arc<dyn CommandSender> = Arc::new(Console);
//! manager.execute_command(&console, r#"say "hello world""#)?;
//! # Ok::<(), the_command::CommandError>(())
//! ```

pub mod alias;
pub mod arguments;
pub mod command;
pub mod config;
pub mod converters;
pub mod delegator;
pub mod error;
pub mod filter;
pub mod flag_syntax;
pub mod flags;
pub mod manager;
pub mod sender;
pub mod syntax;
pub mod tree_config;
pub mod vector;

pub use alias::Alias;
pub use arguments::{
  ArgPos,
  CommandArguments,
  Completion,
};
pub use command::{
  Command,
  CommandExecutor,
  ProcessingMode,
};
pub use config::CommandsConfig;
pub use converters::{
  ArgumentEnum,
  FromArgs,
};
pub use delegator::CommandDelegator;
pub use error::{
  ArgResult,
  ArgumentError,
  ArgumentErrorKind,
  CommandError,
  Result,
};
pub use filter::CommandFilter;
pub use flag_syntax::{
  DefaultFlagSyntax,
  FlagSyntax,
  SpoutFlagSyntax,
  UnknownFlagPolicy,
};
pub use flags::{
  CommandFlags,
  Flag,
  ParsedFlags,
};
pub use manager::{
  CommandManager,
  TreeListener,
};
pub use sender::CommandSender;
pub use syntax::{
  DefaultSyntax,
  RegexSyntax,
  Syntax,
};
pub use vector::Vector3;
