//! Interactive shell over one store.

use crate::cli::prompt_new_passphrase;
use crate::config::StoreConfig;
use crate::crypto::SymmetricEngine;
use crate::error::{Result, StoreError};
use crate::history::GitCli;
use crate::lock::{IdentityLock, LockState};
use crate::search::filter_tree;
use crate::security::{self, generate_password, ClipboardManager, GENERATED_PASSWORD_LENGTH};
use crate::sync::SyncCoordinator;
use crate::utils::{self, success, warning};
use chrono::Utc;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::task::JoinHandle;

/// Interactive store shell.
pub struct InteractiveStore {
    store: SyncCoordinator<GitCli>,
    lock: IdentityLock<SymmetricEngine>,
    editor: DefaultEditor,
    /// Pending clipboard clears, awaited before the shell returns.
    clipboard_clears: Vec<JoinHandle<()>>,
}

impl InteractiveStore {
    /// Open the store described by `config`.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let lock = IdentityLock::for_store(SymmetricEngine::new(), &config);
        if !lock.identity_path().exists() {
            return Err(StoreError::Config(format!(
                "no store at {}, run 'treepass init' or 'treepass clone'",
                config.store_dir.display()
            )));
        }
        for warn in security::check_permissions(lock.identity_path()) {
            warning(&warn);
        }

        let store = SyncCoordinator::open(config, GitCli::new())?;
        let editor =
            DefaultEditor::new().map_err(|e| StoreError::Config(format!("terminal: {e}")))?;

        Ok(Self {
            store,
            lock,
            editor,
            clipboard_clears: Vec::new(),
        })
    }

    /// Run the interactive loop.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let marker = if self.lock.is_unlocked() { "treepass*>" } else { "treepass>" };
            let prompt = format!("{} ", marker.cyan());
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line);

                    if self.lock.check_timeout(Utc::now()) {
                        warning("Identity locked after inactivity");
                    }

                    match self.execute_command(line).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => utils::error(&e.to_string()),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("\nUse 'exit' to quit");
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    utils::error(&format!("{err:?}"));
                    break;
                }
            }
        }

        self.lock.lock();
        self.finish_clipboard_clears().await;
        Ok(())
    }

    async fn finish_clipboard_clears(&mut self) {
        self.clipboard_clears.retain(|task| !task.is_finished());
        if self.clipboard_clears.is_empty() {
            return;
        }
        println!("Waiting to clear the clipboard...");
        for task in self.clipboard_clears.drain(..) {
            if task.await.is_err() {
                utils::error("Clipboard could not be cleared");
            }
        }
    }

    /// Execute one command line. Returns `true` when the shell should exit.
    async fn execute_command(&mut self, input: &str) -> Result<bool> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((&command, args)) = parts.split_first() else {
            return Ok(false);
        };

        match (command, args) {
            ("help" | "?", _) => self.show_help(),
            ("list" | "ls", _) => self.list_entries(&args.join(" ")),
            ("folders", []) => self.list_folders(),
            ("show", [path]) => self.show_entry(path, false).await?,
            ("copy" | "cp", [path]) => self.show_entry(path, true).await?,
            ("add", [folder, name]) => self.add_entry(folder, name, false)?,
            ("gen", [folder, name]) => self.add_entry(folder, name, true)?,
            ("mkdir", [folder, name]) => {
                self.store.add_folder(folder, name)?;
                success(&format!("Added folder: {name}"));
            }
            ("edit", [path]) => self.change_entry(path)?,
            ("mv", [path, folder, name]) => self.move_node(path, folder, name)?,
            ("rm", [path]) => self.remove_node(path)?,
            ("unlock", []) => self.unlock()?,
            ("lock", []) => {
                self.lock.lock();
                success("Identity locked");
            }
            ("pull", []) => {
                self.store.pull()?;
                success(&format!("Pulled, {} passwords", self.store.tree().password_count()));
            }
            ("push", []) => {
                self.store.push()?;
                success("Pushed");
            }
            ("status", []) => self.show_status(),
            ("log", []) => {
                for commit in self.store.log()? {
                    println!("{}", utils::format_commit(&commit));
                }
            }
            ("clear", []) => utils::clear_screen(),
            ("exit" | "quit", []) => return Ok(true),
            _ => eprintln!(
                "Unknown command or wrong arguments: {input}. Type 'help' for available commands."
            ),
        }
        Ok(false)
    }

    fn show_help(&self) {
        println!("\n{}", "Available Commands:".bold());
        println!("  {} [filter]             - List passwords", "list".cyan());
        println!("  {}                    - List folders", "folders".cyan());
        println!("  {} <path>                  - Show a password", "show".cyan());
        println!("  {} <path>                  - Copy a password to the clipboard", "copy".cyan());
        println!("  {} <folder> <name>          - Add a password", "add".cyan());
        println!("  {} <folder> <name>          - Add a generated password", "gen".cyan());
        println!("  {} <folder> <name>        - Add a folder", "mkdir".cyan());
        println!("  {} <path>                  - Change a password", "edit".cyan());
        println!("  {} <path> <folder> <name>    - Move or rename", "mv".cyan());
        println!("  {} <path>                    - Remove a password or folder", "rm".cyan());
        println!("  {} / {}                - Unlock or lock the identity", "unlock".cyan(), "lock".cyan());
        println!("  {} / {}                  - Sync with the remote", "pull".cyan(), "push".cyan());
        println!("  {} / {}                 - Show status or history", "status".cyan(), "log".cyan());
        println!("  {} / {}                - Clear screen or leave", "clear".cyan(), "exit".cyan());
        println!();
        println!(
            "The identity locks itself {} seconds after unlocking.",
            self.store.config().auto_lock_seconds
        );
        println!();
    }

    fn list_entries(&self, filter: &str) {
        let filtered = filter_tree(&self.store.tree(), filter);
        if filtered.password_count() == 0 && !filter.is_empty() {
            println!("No entries found");
            return;
        }
        for line in utils::format_tree(&filtered) {
            println!("  {line}");
        }
    }

    fn list_folders(&self) {
        for folder in self.store.tree().flat_folders() {
            println!("  {}", folder.relative_path());
        }
    }

    fn unlock(&mut self) -> Result<()> {
        use dialoguer::Password;

        let passphrase = Password::new()
            .with_prompt("Store passphrase")
            .interact()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        self.lock.unlock(passphrase)?;
        success("Identity unlocked");
        Ok(())
    }

    fn ensure_unlocked(&mut self) -> Result<()> {
        if self.lock.is_unlocked() {
            Ok(())
        } else {
            self.unlock()
        }
    }

    async fn show_entry(&mut self, path: &str, copy: bool) -> Result<()> {
        let node = crate::cli::entry_node(&self.store, path)?;
        self.ensure_unlocked()?;

        let timeout = self.store.config().clipboard_timeout;
        let Some(plaintext) = self.lock.decrypt(&node.relative_path())? else {
            return Ok(());
        };
        if copy {
            let clear = ClipboardManager::copy_with_timeout(plaintext, timeout).await?;
            self.clipboard_clears.push(clear);
            success(&format!("Copied (will clear in {timeout} seconds)"));
        } else {
            println!("{}: {}", node.display_path().bold(), plaintext);
        }
        self.lock.clear_plaintext();
        Ok(())
    }

    fn add_entry(&mut self, folder: &str, name: &str, generate: bool) -> Result<()> {
        let secret = if generate {
            generate_password(GENERATED_PASSWORD_LENGTH)
        } else {
            prompt_new_passphrase("Password to store")?
        };
        self.ensure_unlocked()?;
        self.store.add_entry(self.lock.engine(), folder, name, &secret)?;
        success(&format!("Added password: {name}"));
        Ok(())
    }

    fn change_entry(&mut self, path: &str) -> Result<()> {
        let node = crate::cli::entry_node(&self.store, path)?;
        let secret = prompt_new_passphrase("New password")?;
        self.ensure_unlocked()?;
        self.store.edit_entry(
            self.lock.engine(),
            &node.relative_path(),
            &node.parent_relative_path(),
            node.name(),
            Some(secret.as_str()),
        )?;
        success(&format!("Changed: {}", node.display_path()));
        Ok(())
    }

    fn move_node(&mut self, path: &str, folder: &str, name: &str) -> Result<()> {
        let node = self.store.resolve(path)?;
        if node.is_entry() {
            self.store
                .edit_entry(self.lock.engine(), &node.relative_path(), folder, name, None)?;
        } else {
            self.store.move_folder(&node.relative_path(), folder, name)?;
        }
        success(&format!("Moved: {}", node.display_path()));
        Ok(())
    }

    fn remove_node(&mut self, path: &str) -> Result<()> {
        let node = self.store.resolve(path)?;
        if !utils::prompt_yes_no(&format!("Remove '{}'?", node.display_path()), false)? {
            return Ok(());
        }
        self.store.remove(&node.relative_path())?;
        success(&format!("Removed: {}", node.display_path()));
        Ok(())
    }

    fn show_status(&self) {
        println!("{}: {}", "Store".bold(), self.store.root().display());
        println!(
            "{}: {}",
            "Passwords".bold(),
            self.store.tree().password_count()
        );
        match self.lock.state() {
            LockState::Locked => println!("{}: Locked", "Identity".bold()),
            LockState::Unlocked(at) => {
                let threshold = self.store.config().auto_lock_threshold();
                let remaining = (at + threshold - Utc::now()).num_seconds().max(0);
                println!("{}: Unlocked", "Identity".bold());
                println!("{}: {} seconds", "Time remaining".bold(), remaining);
            }
        }
        match self.store.local_head_matches_remote() {
            Ok(true) => println!("{}: {}", "Sync".bold(), "up to date".green()),
            Ok(false) => println!("{}: {}", "Sync".bold(), "local changes not pushed".yellow()),
            Err(e) => println!("{}: {}", "Sync".bold(), e.to_string().red()),
        }
    }

    fn print_welcome(&self) {
        println!("{}", "treepass interactive shell".bold().cyan());
        println!(
            "{} ({} passwords). Type 'help' for commands.\n",
            self.store.root().display(),
            self.store.tree().password_count()
        );
    }
}

impl Drop for InteractiveStore {
    fn drop(&mut self) {
        self.lock.lock();
    }
}
