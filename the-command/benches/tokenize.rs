//! Benchmarks for splitting and dispatching command lines.
//!
//! Run with: `cargo bench -p the-command --bench tokenize`

use std::{
  any::Any,
  sync::Arc,
};

use divan::{
  Bencher,
  black_box,
};
use the_command::{
  Command,
  CommandArguments,
  CommandManager,
  CommandSender,
  DefaultSyntax,
  RegexSyntax,
  Result,
  Syntax,
};

fn main() {
  divan::main();
}

const PLAIN: &str = "tp Steve 100 64 -200";
const QUOTED: &str = r#"say "hello world" 'and \'more\'' plain\ escaped"#;

fn make_line(words: usize) -> String {
  let mut line = String::new();
  for i in 0..words {
    if i % 4 == 0 {
      line.push_str(&format!("\"quoted word {i}\" "));
    } else {
      line.push_str(&format!("word{i}  "));
    }
  }
  line
}

// `Syntax::split` benchmarks.

mod split {
  use super::*;

  #[divan::bench]
  fn default_plain(bencher: Bencher) {
    let syntax = DefaultSyntax::new();
    bencher.bench(|| syntax.split(black_box(PLAIN)));
  }

  #[divan::bench]
  fn default_quoted(bencher: Bencher) {
    let syntax = DefaultSyntax::new();
    bencher.bench(|| syntax.split(black_box(QUOTED)));
  }

  #[divan::bench]
  fn spout_plain(bencher: Bencher) {
    let syntax = RegexSyntax::spout().unwrap();
    bencher.bench(|| syntax.split(black_box(PLAIN)));
  }

  #[divan::bench]
  fn spout_quoted(bencher: Bencher) {
    let syntax = RegexSyntax::spout().unwrap();
    bencher.bench(|| syntax.split(black_box(QUOTED)));
  }

  #[divan::bench(args = [8, 64, 512])]
  fn default_long(bencher: Bencher, words: usize) {
    let syntax = DefaultSyntax::new();
    let line = make_line(words);
    bencher.bench(|| syntax.split_no_empties(black_box(&line)));
  }
}

// Full dispatch from the root.

mod dispatch {
  use super::*;

  struct Console;

  impl CommandSender for Console {
    fn name(&self) -> &str {
      "console"
    }

    fn has_permission(&self, _permission: &str) -> bool {
      true
    }

    fn send_message(&self, _message: &str) {}

    fn as_any(&self) -> &dyn Any {
      self
    }
  }

  fn manager() -> CommandManager {
    let manager = CommandManager::new();
    let tp = manager.get_command("bench", "tp").unwrap();
    tp.set_executor(
      |_: &Arc<Command>, _: &Arc<dyn CommandSender>, args: &mut CommandArguments| -> Result<bool> {
        args.pop_string("player")?;
        black_box(args.pop_vector3("destination")?);
        Ok(true)
      },
    );
    manager.root().attach_child(tp).unwrap();
    manager
  }

  #[divan::bench]
  fn execute(bencher: Bencher) {
    let manager = manager();
    let sender: Arc<dyn CommandSender> = Arc::new(Console);
    bencher.bench(|| manager.execute_command(&sender, black_box(PLAIN)).unwrap());
  }

  #[divan::bench]
  fn complete(bencher: Bencher) {
    let manager = manager();
    bencher.bench(|| {
      let mut candidates = Vec::new();
      manager.complete_command(None, black_box("t"), 1, &mut candidates).unwrap();
      candidates
    });
  }
}
