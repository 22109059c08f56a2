//! Interactive command loop over a [`Session`].
//!
//! Each line is one command. Failures are reported and the loop keeps going;
//! only `exit` or end of input stops it.

use anyhow::{Context, Result, bail};
use blockbox_core::Session;
use std::io::{BufRead, Write};
use std::path::Path;

use crate::output::listing_text;

const HELP: &str = "\
Commands:
  copy-in, cpin <host-src> <name>    Store a host file in the current directory
  copy-out, cpout <name> <host-dest> Write a stored file to the host ('-' for stdout)
  remove, rm <name>                  Remove a stored file
  list, ls                           List the current directory
  make-dir, md <name>                Create a directory
  change-dir, cd <name|..|\\>         Change the current directory
  remove-dir, rd <name>              Remove a directory and every file under it
  pwd                                Print the current directory
  help                               Show this help
  exit                               Leave the shell
";

/// A parsed shell command.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    CopyIn { src: &'a str, name: &'a str },
    CopyOut { name: &'a str, dest: &'a str },
    Remove { name: &'a str },
    List,
    MakeDir { name: &'a str },
    ChangeDir { target: &'a str },
    RemoveDir { name: &'a str },
    Pwd,
    Help,
    Exit,
}

impl<'a> Command<'a> {
    /// Parse one input line. Blank lines yield `None`.
    fn parse(line: &'a str) -> Result<Option<Self>> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Ok(None);
        };

        let command = match (verb, args) {
            ("copy-in" | "cpin", &[src, name]) => Command::CopyIn { src, name },
            ("copy-out" | "cpout", &[name, dest]) => Command::CopyOut { name, dest },
            ("remove" | "rm", &[name]) => Command::Remove { name },
            ("list" | "ls", &[]) => Command::List,
            ("make-dir" | "md", &[name]) => Command::MakeDir { name },
            ("change-dir" | "cd", &[target]) => Command::ChangeDir { target },
            ("remove-dir" | "rd", &[name]) => Command::RemoveDir { name },
            ("pwd", &[]) => Command::Pwd,
            ("help" | "?", &[]) => Command::Help,
            ("exit" | "quit", &[]) => Command::Exit,
            (
                "copy-in" | "cpin" | "copy-out" | "cpout" | "remove" | "rm" | "list" | "ls"
                | "make-dir" | "md" | "change-dir" | "cd" | "remove-dir" | "rd" | "pwd" | "help"
                | "?" | "exit" | "quit",
                _,
            ) => bail!("Wrong number of arguments for '{}' (try 'help')", verb),
            _ => bail!("Unknown command '{}' (try 'help')", verb),
        };
        Ok(Some(command))
    }
}

/// Run the loop until `exit` or end of input.
///
/// The prompt is only written when `interactive` is set.
pub fn run<R: BufRead, W: Write>(
    session: &mut Session,
    input: R,
    mut out: W,
    interactive: bool,
) -> Result<()> {
    let mut lines = input.lines();
    loop {
        if interactive {
            write!(out, "blockbox:{}> ", session.cwd())?;
            out.flush()?;
        }

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read command")?;

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                writeln!(out, "Error: {:#}", err)?;
                continue;
            }
        };

        if command == Command::Exit {
            break;
        }
        if let Err(err) = execute(session, command, &mut out) {
            tracing::debug!(error = %err, "shell command failed");
            writeln!(out, "Error: {:#}", err)?;
        }
    }
    Ok(())
}

fn execute<W: Write>(session: &mut Session, command: Command<'_>, out: &mut W) -> Result<()> {
    match command {
        Command::CopyIn { src, name } => {
            let stored = session
                .copy_in(Path::new(src), name)
                .with_context(|| format!("Failed to copy {} in", src))?;
            writeln!(out, "Copied {} to {}", src, stored)?;
        }
        Command::CopyOut { name, dest: "-" } => {
            session
                .cat(name, &mut *out)
                .with_context(|| format!("Failed to read {}", name))?;
        }
        Command::CopyOut { name, dest } => {
            let size = session
                .copy_out(name, Path::new(dest))
                .with_context(|| format!("Failed to copy {} out", name))?;
            writeln!(out, "Copied {} to {} ({} bytes)", name, dest, size)?;
        }
        Command::Remove { name } => {
            session
                .remove(name)
                .with_context(|| format!("Failed to remove {}", name))?;
            writeln!(out, "Removed {}", name)?;
        }
        Command::List => {
            write!(out, "{}", listing_text(&session.list()))?;
        }
        Command::MakeDir { name } => {
            let created = session
                .make_dir(name)
                .with_context(|| format!("Failed to create directory {}", name))?;
            writeln!(out, "Created {}", created)?;
        }
        Command::ChangeDir { target } => {
            session
                .change_dir(target)
                .with_context(|| format!("Failed to change directory to {}", target))?;
        }
        Command::RemoveDir { name } => {
            let removed = session
                .remove_dir(name)
                .with_context(|| format!("Failed to remove directory {}", name))?;
            writeln!(out, "Removed {} ({} files)", name, removed)?;
        }
        Command::Pwd => {
            writeln!(out, "{}", session.cwd())?;
        }
        Command::Help => {
            write!(out, "{}", HELP)?;
        }
        Command::Exit => {}
    }
    Ok(())
}
