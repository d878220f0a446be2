//! Command-line interface implementation.

use crate::config::StoreConfig;
use crate::crypto::SymmetricEngine;
use crate::error::{Result, StoreError};
use crate::history::GitCli;
use crate::lock::IdentityLock;
use crate::search::filter_tree;
use crate::security::{self, generate_password, ClipboardManager, GENERATED_PASSWORD_LENGTH};
use crate::sync::SyncCoordinator;
use crate::tree::PwNode;
use crate::utils::{self, success, warning};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

/// Git-backed password store with one encrypted file per entry.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Store directory
    #[arg(short = 's', long, global = true, env = "TREEPASS_STORE")]
    pub store: Option<PathBuf>,

    /// Config file (default: <config dir>/treepass/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        short = 'o',
        long,
        global = true,
        value_enum,
        default_value = "text",
        help = "Output format"
    )]
    pub output: OutputFormat,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run, the interactive shell when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new store with a fresh identity
    Init,

    /// Replace the local store with a copy of a remote one
    Clone {
        /// Repository URL, or file:// path to copy
        url: String,

        /// Do not ask before replacing an existing store
        #[arg(short, long)]
        force: bool,
    },

    /// List passwords, optionally filtered
    List {
        /// Case-insensitive name filter
        query: Option<String>,

        /// Show as tree structure
        #[arg(short, long)]
        tree: bool,
    },

    /// List folders
    Folders,

    /// Decrypt and display a password
    Show {
        /// Entry path, e.g. mail/work
        path: String,

        /// Copy to clipboard instead of displaying
        #[arg(short, long)]
        clipboard: bool,

        /// Seconds before the clipboard is cleared
        #[arg(short = 't', long)]
        timeout: Option<u64>,
    },

    /// Add a password or a folder
    Add {
        /// Folder to add to, "/" for the top level
        folder: String,

        /// Name of the new password or folder
        name: String,

        /// Create a folder instead of a password
        #[arg(long = "folder")]
        is_folder: bool,

        /// Generate a random password
        #[arg(short, long, conflicts_with = "stdin")]
        generate: bool,

        /// Read the password from the first line of stdin
        #[arg(short = 'i', long)]
        stdin: bool,
    },

    /// Move, rename or change a password
    Edit {
        /// Entry path, e.g. mail/work
        path: String,

        /// Destination folder
        #[arg(long)]
        to: Option<String>,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// Prompt for a new password
        #[arg(long)]
        secret: bool,
    },

    /// Move or rename a password or folder
    Mv {
        path: String,
        /// Destination folder, "/" for the top level
        folder: String,
        /// New name
        name: String,
    },

    /// Remove a password or a folder with everything in it
    Rm {
        path: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Fetch and merge remote changes
    Pull,

    /// Publish local commits
    Push,

    /// Show store and sync status
    Status,

    /// Show the change history
    Log,

    /// Start the interactive shell
    Shell,
}

impl Cli {
    /// Config file values overridden by `--store`.
    pub fn load_config(&self) -> Result<StoreConfig> {
        let mut config = StoreConfig::load(self.config.as_deref())?;
        if let Some(store) = &self.store {
            config.store_dir = store.clone();
        }
        Ok(config)
    }

    /// Execute a one-shot command. `Shell` and no command are handled by the
    /// binary.
    pub async fn execute(&self, command: &Commands) -> Result<()> {
        let config = self.load_config()?;
        match command {
            Commands::Init => self.init_store(config),
            Commands::Clone { url, force } => self.clone_store(config, url, *force),
            Commands::List { query, tree } => {
                self.list_entries(config, query.as_deref().unwrap_or(""), *tree)
            }
            Commands::Folders => self.list_folders(config),
            Commands::Show {
                path,
                clipboard,
                timeout,
            } => {
                let timeout = timeout.unwrap_or(config.clipboard_timeout);
                self.show_entry(config, path, *clipboard, timeout).await
            }
            Commands::Add {
                folder,
                name,
                is_folder,
                generate,
                stdin,
            } => {
                if *is_folder {
                    self.add_folder(config, folder, name)
                } else {
                    self.add_entry(config, folder, name, *generate, *stdin)
                }
            }
            Commands::Edit {
                path,
                to,
                name,
                secret,
            } => self.edit_entry(config, path, to.as_deref(), name.as_deref(), *secret),
            Commands::Mv { path, folder, name } => self.move_node(config, path, folder, name),
            Commands::Rm { path, force } => self.remove_node(config, path, *force),
            Commands::Pull => self.pull(config),
            Commands::Push => self.push(config),
            Commands::Status => self.show_status(config),
            Commands::Log => self.show_log(config),
            Commands::Shell => Err(StoreError::Config(
                "the shell is started by the treepass binary".to_string(),
            )),
        }
    }

    fn init_store(&self, config: StoreConfig) -> Result<()> {
        GitCli::new().check_available()?;
        let passphrase = prompt_new_passphrase("Choose a store passphrase")?;
        let engine = SymmetricEngine::new();
        let (identity, recipient) = engine
            .generate_identity(&passphrase)
            .map_err(StoreError::from)?;

        let identity_path = config.identity_path();
        let mut store = SyncCoordinator::new(config, GitCli::new());
        store.init_store(&identity, &recipient)?;

        success(&format!("Store initialized at {}", store.root().display()));
        for warn in security::check_permissions(&identity_path) {
            warning(&warn);
        }
        Ok(())
    }

    fn clone_store(&self, config: StoreConfig, url: &str, force: bool) -> Result<()> {
        let occupied = std::fs::read_dir(&config.store_dir)
            .map(|mut dir| dir.next().is_some())
            .unwrap_or(false);
        if occupied
            && !force
            && !utils::prompt_yes_no(
                &format!(
                    "Replace the existing store at {}?",
                    config.store_dir.display()
                ),
                false,
            )?
        {
            return Err(StoreError::Cancelled);
        }

        let git = GitCli::new();
        git.check_available()?;
        let mut store = SyncCoordinator::new(config, git);
        let spinner = spinner(&format!("Cloning {url}"));
        let result = store.clone_from(url);
        spinner.finish_and_clear();
        result?;

        success(&format!(
            "Cloned {} passwords into {}",
            store.tree().password_count(),
            store.root().display()
        ));
        Ok(())
    }

    fn list_entries(&self, config: StoreConfig, query: &str, tree: bool) -> Result<()> {
        let store = SyncCoordinator::open(config, GitCli::new())?;
        let filtered = filter_tree(&store.tree(), query);

        match self.output {
            OutputFormat::Json if tree => print_json(&filtered)?,
            OutputFormat::Json => {
                let paths: Vec<String> = filtered
                    .flat_entries()
                    .iter()
                    .map(|entry| entry.display_path())
                    .collect();
                print_json(&serde_json::json!({ "entries": paths }))?;
            }
            OutputFormat::Text if tree => {
                for line in utils::format_tree(&filtered) {
                    println!("{line}");
                }
            }
            OutputFormat::Text => {
                let entries = filtered.flat_entries();
                if entries.is_empty() {
                    println!("No entries found");
                }
                for entry in entries {
                    println!("{}", entry.display_path());
                }
            }
        }
        Ok(())
    }

    fn list_folders(&self, config: StoreConfig) -> Result<()> {
        let store = SyncCoordinator::open(config, GitCli::new())?;
        let tree = store.tree();
        let folders: Vec<String> = tree
            .flat_folders()
            .iter()
            .map(|folder| folder.relative_path())
            .collect();

        match self.output {
            OutputFormat::Json => print_json(&serde_json::json!({ "folders": folders }))?,
            OutputFormat::Text => {
                for folder in folders {
                    println!("{folder}");
                }
            }
        }
        Ok(())
    }

    async fn show_entry(
        &self,
        config: StoreConfig,
        path: &str,
        clipboard: bool,
        timeout: u64,
    ) -> Result<()> {
        let store = SyncCoordinator::open(config, GitCli::new())?;
        let node = entry_node(&store, path)?;

        let mut lock = unlock(store.config())?;
        let plaintext = lock
            .decrypt(&node.relative_path())?
            .ok_or_else(|| StoreError::Crypto(crate::crypto::CryptoError::Locked))?;

        if clipboard {
            let clear = ClipboardManager::copy_with_timeout(plaintext, timeout).await?;
            lock.lock();
            success(&format!(
                "Copied {} to clipboard (will clear in {timeout} seconds)",
                node.display_path()
            ));
            // The process must outlive the clear.
            let spinner = spinner(&format!("Clearing the clipboard in {timeout} seconds"));
            let result = clear.await;
            spinner.finish_and_clear();
            return result.map_err(|_| StoreError::ClipboardFailed);
        } else {
            match self.output {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "path": node.display_path(),
                    "password": plaintext,
                }))?,
                OutputFormat::Text => println!("{plaintext}"),
            }
        }
        lock.lock();
        Ok(())
    }

    fn add_folder(&self, config: StoreConfig, folder: &str, name: &str) -> Result<()> {
        let mut store = SyncCoordinator::open(config, GitCli::new())?;
        store.add_folder(folder, name)?;
        success(&format!("Added folder: {}", join_display(folder, name)));
        Ok(())
    }

    fn add_entry(
        &self,
        config: StoreConfig,
        folder: &str,
        name: &str,
        generate: bool,
        stdin: bool,
    ) -> Result<()> {
        let mut store = SyncCoordinator::open(config, GitCli::new())?;

        let secret = if generate {
            generate_password(GENERATED_PASSWORD_LENGTH)
        } else if stdin {
            utils::read_secret_line(&mut std::io::stdin().lock())?
        } else {
            prompt_new_passphrase("Password to store")?
        };

        let lock = unlock(store.config())?;
        store.add_entry(lock.engine(), folder, name, &secret)?;

        success(&format!("Added password: {}", join_display(folder, name)));
        if generate {
            println!("{}: {}", "Generated".bold(), secret.as_str());
        }
        Ok(())
    }

    fn edit_entry(
        &self,
        config: StoreConfig,
        path: &str,
        to: Option<&str>,
        name: Option<&str>,
        change_secret: bool,
    ) -> Result<()> {
        let mut store = SyncCoordinator::open(config, GitCli::new())?;
        let node = entry_node(&store, path)?;
        let folder = to
            .map(str::to_string)
            .unwrap_or_else(|| node.parent_relative_path());
        let name = name.unwrap_or_else(|| node.name()).to_string();

        let mut lock = IdentityLock::for_store(SymmetricEngine::new(), store.config());
        let secret = if change_secret {
            let secret = prompt_new_passphrase("New password")?;
            lock = unlock(store.config())?;
            Some(secret)
        } else {
            None
        };

        store.edit_entry(
            lock.engine(),
            &node.relative_path(),
            &folder,
            &name,
            secret.as_deref().map(String::as_str),
        )?;
        success(&format!("Updated password: {}", join_display(&folder, &name)));
        Ok(())
    }

    fn move_node(&self, config: StoreConfig, path: &str, folder: &str, name: &str) -> Result<()> {
        let mut store = SyncCoordinator::open(config, GitCli::new())?;
        let node = store.resolve(path)?;
        if node.is_entry() {
            // Renaming an entry never decrypts, the engine can stay locked.
            let lock = IdentityLock::for_store(SymmetricEngine::new(), store.config());
            store.edit_entry(lock.engine(), &node.relative_path(), folder, name, None)?;
        } else {
            store.move_folder(&node.relative_path(), folder, name)?;
        }
        success(&format!(
            "Moved {} to {}",
            node.display_path(),
            join_display(folder, name)
        ));
        Ok(())
    }

    fn remove_node(&self, config: StoreConfig, path: &str, force: bool) -> Result<()> {
        let mut store = SyncCoordinator::open(config, GitCli::new())?;
        let node = store.resolve(path)?;
        let what = if node.is_entry() {
            "password".to_string()
        } else {
            format!("folder and its {} passwords", node.password_count())
        };
        if !force
            && !utils::prompt_yes_no(
                &format!("Remove {what} '{}'?", node.display_path()),
                false,
            )?
        {
            return Err(StoreError::Cancelled);
        }

        store.remove(&node.relative_path())?;
        success(&format!("Removed: {}", node.display_path()));
        Ok(())
    }

    fn pull(&self, config: StoreConfig) -> Result<()> {
        let mut store = SyncCoordinator::open(config, GitCli::new())?;
        let spinner = spinner("Pulling");
        let result = store.pull();
        spinner.finish_and_clear();
        result?;
        success(&format!("Pulled, {} passwords", store.tree().password_count()));
        Ok(())
    }

    fn push(&self, config: StoreConfig) -> Result<()> {
        let store = SyncCoordinator::open(config, GitCli::new())?;
        let spinner = spinner("Pushing");
        let result = store.push();
        spinner.finish_and_clear();
        result?;
        success("Pushed");
        Ok(())
    }

    fn show_status(&self, config: StoreConfig) -> Result<()> {
        let store = SyncCoordinator::open(config, GitCli::new())?;
        let synced = store.local_head_matches_remote().unwrap_or(false);
        let identity_path = store.config().identity_path();

        match self.output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "store": store.root(),
                "passwords": store.tree().password_count(),
                "synced": synced,
                "identity": identity_path.exists(),
            }))?,
            OutputFormat::Text => {
                println!("{}: {}", "Store".bold(), store.root().display());
                println!("{}: {}", "Passwords".bold(), store.tree().password_count());
                if synced {
                    println!("{}: {}", "Sync".bold(), "up to date".green());
                } else {
                    println!("{}: {}", "Sync".bold(), "local changes not pushed".yellow());
                }
                if !identity_path.exists() {
                    warning("No identity file found, run 'treepass init' or 'treepass clone'");
                }
                for warn in security::check_permissions(&identity_path) {
                    warning(&warn);
                }
            }
        }
        Ok(())
    }

    fn show_log(&self, config: StoreConfig) -> Result<()> {
        let store = SyncCoordinator::open(config, GitCli::new())?;
        let commits = store.log()?;
        match self.output {
            OutputFormat::Json => print_json(&commits)?,
            OutputFormat::Text => {
                for commit in &commits {
                    println!("{}", utils::format_commit(commit));
                }
            }
        }
        Ok(())
    }
}

/// Resolve `path` and require an entry.
pub fn entry_node<H: crate::history::HistoryStore>(
    store: &SyncCoordinator<H>,
    path: &str,
) -> Result<PwNode> {
    let node = store.resolve(path)?;
    if node.is_entry() {
        Ok(node)
    } else {
        Err(StoreError::EntryNotFound(path.to_string()))
    }
}

/// Prompt for the store passphrase and unlock the identity.
pub fn unlock(config: &StoreConfig) -> Result<IdentityLock<SymmetricEngine>> {
    use dialoguer::Password;

    let mut lock = IdentityLock::for_store(SymmetricEngine::new(), config);
    let passphrase = Password::new()
        .with_prompt("Store passphrase")
        .interact()
        .map_err(|e| StoreError::Config(e.to_string()))?;
    if passphrase.is_empty() {
        return Err(StoreError::Cancelled);
    }
    lock.unlock(passphrase)?;
    Ok(lock)
}

/// Prompt twice for a new secret.
pub fn prompt_new_passphrase(prompt: &str) -> Result<Zeroizing<String>> {
    use dialoguer::Password;

    let secret = Zeroizing::new(
        Password::new()
            .with_prompt(prompt)
            .with_confirmation("Confirm", "Entries do not match")
            .interact()
            .map_err(|e| StoreError::Config(e.to_string()))?,
    );
    if secret.is_empty() {
        return Err(StoreError::Cancelled);
    }
    Ok(secret)
}

fn join_display(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| StoreError::Config(e.to_string()))?;
    println!("{json}");
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
