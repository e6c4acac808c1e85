use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use time::OffsetDateTime;

use crate::cache::TaskCache;
use crate::client::{ApiClient, ClientConfig};
use crate::models::{Task, UpdateTask};
use crate::session::SessionManager;
use crate::store::SessionStore;

#[derive(Parser)]
#[command(name = "checkoff")]
#[command(about = "Task tracking from the command line", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an account and sign in
    Register { username: String },

    /// Sign in with an existing account
    Login { username: String },

    /// Sign out and clear the stored session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List tasks
    List {
        /// Only completed tasks
        #[arg(long, conflicts_with = "active")]
        completed: bool,
        /// Only open tasks
        #[arg(long)]
        active: bool,
    },

    /// Add a task
    Add {
        title: String,
        /// Optional description
        #[arg(short = 'd', long)]
        description: Option<String>,
    },

    /// Show a single task
    Show { id: String },

    /// Edit a task's fields
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        completed: Option<bool>,
    },

    /// Toggle a task between open and done
    Toggle { id: String },

    /// Delete a task
    Rm { id: String },
}

pub async fn run(cli: Cli) -> Result<()> {
    let store = SessionStore::open(&store_path()?)?;
    let client = ApiClient::new(ClientConfig::new(base_url()), SessionManager::new(store))?;

    match cli.command {
        Command::Register { username } => {
            let password = prompt("Password: ")?;
            let confirm = prompt("Confirm password: ")?;
            if password != confirm {
                bail!("Passwords do not match");
            }
            let resp = client.register(&username, &password).await?;
            println!("registered and signed in as {}", resp.username);
        }

        Command::Login { username } => {
            let password = prompt("Password: ")?;
            let resp = client.login(&username, &password).await?;
            println!("signed in as {}", resp.username);
        }

        Command::Logout => {
            client.logout().await?;
            println!("signed out");
        }

        Command::Whoami => match client.session().session()? {
            Some(session) => {
                let now = OffsetDateTime::now_utc().unix_timestamp();
                let state = if client.session().is_authenticated(now)? {
                    "session valid"
                } else {
                    "session expired"
                };
                println!("{} ({}, {state})", session.username, session.user_id);
            }
            None => println!("not signed in"),
        },

        Command::List { completed, active } => {
            let filter = if completed {
                Some(true)
            } else if active {
                Some(false)
            } else {
                None
            };
            let resp = client.list_tasks(filter).await?;

            let mut cache = TaskCache::new();
            cache.replace_all(resp.tasks);
            for task in cache.tasks() {
                print_task_line(task);
            }
            println!("{} open · {} done", cache.active_count(), cache.completed_count());
        }

        Command::Add { title, description } => {
            let task = client.create_task(&title, description.as_deref()).await?;
            print_task_line(&task);
        }

        Command::Show { id } => {
            let task = client.get_task(&id).await?;
            print_task_line(&task);
            if let Some(description) = &task.description {
                println!("  {description}");
            }
            println!("  created {}, updated {}", task.created_at, task.updated_at);
        }

        Command::Edit {
            id,
            title,
            description,
            completed,
        } => {
            if title.is_none() && description.is_none() && completed.is_none() {
                bail!("nothing to change; pass --title, --description or --completed");
            }
            let update = UpdateTask {
                title,
                description,
                completed,
            };
            let task = client.update_task(&id, &update).await?;
            print_task_line(&task);
        }

        Command::Toggle { id } => {
            let task = client.toggle_task(&id).await?;
            print_task_line(&task);
        }

        Command::Rm { id } => {
            client.delete_task(&id).await?;
            println!("deleted {id}");
        }
    }

    Ok(())
}

fn print_task_line(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    println!("[{mark}] {}  {}", task.id, task.title);
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn base_url() -> String {
    std::env::var("CHECKOFF_URL").unwrap_or_else(|_| "http://localhost:8001".to_string())
}

fn store_path() -> Result<PathBuf> {
    let path = match std::env::var("CHECKOFF_DB") {
        Ok(path) => PathBuf::from(path),
        Err(_) => dirs::home_dir()
            .context("could not determine home directory")?
            .join(".config")
            .join("checkoff")
            .join("session.db"),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(path)
}
