//! CLI definition and dispatch.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::adapters::csv_adapter::CsvMarketDataAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::simulated_order_adapter::SimulatedOrderAdapter;
use crate::domain::catalog::{builtin_entries, load_directory, CatalogEntry};
use crate::domain::config_validation::{validate_runtime_config, RuntimeSettings, DEFAULT_LOG_FILTER};
use crate::domain::error::{CanvasError, CanvasOperationError};
use crate::domain::node::CanvasNode;
use crate::domain::node_ref::NodeRef;
use crate::domain::observer::CanvasObserver;
use crate::domain::path::CanvasPath;
use crate::domain::task::{StateEntry, Task, TaskEnvironment, TaskState};
use crate::domain::validator::validate;
use crate::domain::value::Value;
use crate::ports::market_data_port::MarketDataPort;

/// Ticks allowed for a task to unwind after it is canceled at the tick limit.
const UNWIND_TICKS: u64 = 10;

#[derive(Parser, Debug)]
#[command(name = "tradecanvas", about = "Run trading strategy canvases")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check a program for errors
    Validate {
        #[arg(short, long)]
        program: PathBuf,
    },
    /// Print a program's tree
    Show {
        #[arg(short, long)]
        program: PathBuf,
        /// Only show the subtree at this path
        #[arg(long)]
        path: Option<String>,
    },
    /// Execute a program against simulated order execution
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        program: PathBuf,
        /// Expression evaluated alongside the program
        #[arg(long)]
        observer: Option<PathBuf>,
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Work with catalog entries
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// List built-in entries and those saved in a directory
    List {
        #[arg(short, long)]
        directory: Option<PathBuf>,
    },
    /// Save a built-in entry to a directory
    Export {
        #[arg(long)]
        name: String,
        #[arg(short, long)]
        directory: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Validate { program } => {
            init_logging(DEFAULT_LOG_FILTER);
            run_validate(&program)
        }
        Command::Show { program, path } => {
            init_logging(DEFAULT_LOG_FILTER);
            run_show(&program, path.as_deref())
        }
        Command::Run {
            config,
            program,
            observer,
            max_ticks,
        } => run_program(&config, &program, observer.as_deref(), max_ticks),
        Command::Catalog { command } => {
            init_logging(DEFAULT_LOG_FILTER);
            match command {
                CatalogCommand::List { directory } => run_catalog_list(directory.as_deref()),
                CatalogCommand::Export { name, directory } => run_catalog_export(&name, &directory),
            }
        }
    }
}

/// `RUST_LOG` takes precedence over `filter`.
pub fn init_logging(filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn fail(err: &CanvasError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Read a program: either a bare node tree or a catalog entry, as JSON.
pub fn load_program(path: &Path) -> Result<CanvasNode, CanvasError> {
    let text = fs::read_to_string(path)?;
    match serde_json::from_str::<CanvasNode>(&text) {
        Ok(node) => Ok(node),
        Err(node_error) => match CatalogEntry::from_json(&text) {
            Ok(entry) => Ok(entry.node),
            Err(_) => Err(node_error.into()),
        },
    }
}

fn run_validate(program_path: &Path) -> ExitCode {
    eprintln!("Validating program: {}", program_path.display());
    let program = match load_program(program_path) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let errors = validate(&program);
    if errors.is_empty() {
        println!("OK: {} is valid ({})", program_path.display(), program.canvas_type());
        return ExitCode::SUCCESS;
    }
    for error in &errors {
        println!("{error}");
    }
    fail(&CanvasError::Validation { count: errors.len() })
}

/// One line per node, indented by depth: `name: text [type]`.
pub fn render_tree(root: &CanvasNode, path: &CanvasPath) -> Option<String> {
    let top = NodeRef::resolve(root, path)?;
    let base = top.depth();
    let mut out = String::new();
    for node in top.depth_first() {
        let indent = "  ".repeat(node.depth() - base);
        let name = if node.name().is_empty() { "<root>" } else { node.name() };
        let mut flags = String::new();
        if !node.is_visible() {
            flags.push_str(" hidden");
        }
        if node.is_read_only() {
            flags.push_str(" read-only");
        }
        out.push_str(&format!(
            "{indent}{name}: {} [{}]{flags}\n",
            node.text(),
            node.canvas_type()
        ));
    }
    Some(out)
}

fn run_show(program_path: &Path, path: Option<&str>) -> ExitCode {
    let program = match load_program(program_path) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let path = match path.map(CanvasPath::parse).transpose() {
        Ok(p) => p.unwrap_or_else(CanvasPath::root),
        Err(e) => {
            eprintln!("error: invalid path:\n{}", e.display_with_context(path.unwrap_or_default()));
            return fail(&CanvasError::PathParse(e));
        }
    };
    match show_tree(&program, &path) {
        Ok(tree) => {
            print!("{tree}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn show_tree(program: &CanvasNode, path: &CanvasPath) -> Result<String, CanvasError> {
    render_tree(program, path).ok_or_else(|| CanvasOperationError::NodeNotFound { path: path.clone() }.into())
}

fn run_program(
    config_path: &Path,
    program_path: &Path,
    observer_path: Option<&Path>,
    max_ticks: Option<u64>,
) -> ExitCode {
    // Stage 1: Load and validate config
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let settings = match validate_runtime_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    init_logging(&settings.log_filter);
    info!(config = %config_path.display(), account = settings.account.as_str(), "config loaded");

    // Stage 2: Load program and observer
    let program = match load_program(program_path) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let observer_node = match observer_path.map(load_program).transpose() {
        Ok(o) => o,
        Err(e) => return fail(&e),
    };

    // Stage 3: Wire ports
    let task = Rc::new(Task::new(&program, task_environment(&settings)));
    let entries: Rc<RefCell<Vec<StateEntry>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = entries.clone();
    task.publisher().monitor(move |entry: &StateEntry| {
        match &entry.message {
            Some(message) => eprintln!("state: {} ({message})", entry.state),
            None => eprintln!("state: {}", entry.state),
        }
        sink.borrow_mut().push(entry.clone());
    });
    let mut observer = observer_node.map(|node| {
        CanvasObserver::new(task.clone(), node, |value: &Value| println!("observer: {value}"))
    });
    if observer.as_ref().is_some_and(|o| !o.is_valid()) {
        eprintln!("warning: observer is invalid and will not run");
    }

    // Stage 4: Drive the task
    let max_ticks = max_ticks.unwrap_or(settings.max_ticks);
    let state = drive(&task, observer.as_mut(), &settings, max_ticks);

    match task.value() {
        Some(value) => println!("result: {value}"),
        None => println!("result: none"),
    }
    println!("state: {state}");
    info!(ticks = task.sequence(), transitions = entries.borrow().len(), "run finished");
    match state {
        TaskState::Complete => ExitCode::SUCCESS,
        TaskState::Failed => ExitCode::from(5),
        _ => ExitCode::from(1),
    }
}

fn task_environment(settings: &RuntimeSettings) -> TaskEnvironment {
    let market_data = settings
        .market_data_directory
        .clone()
        .map(|dir| Rc::new(CsvMarketDataAdapter::new(dir)) as Rc<dyn MarketDataPort>);
    TaskEnvironment {
        execution: Rc::new(SimulatedOrderAdapter::new(
            settings.fill_delay,
            settings.reject_above_quantity,
        )),
        account: settings.account.clone(),
        market_data,
    }
}

fn drive(task: &Task, mut observer: Option<&mut CanvasObserver>, settings: &RuntimeSettings, max_ticks: u64) -> TaskState {
    let interval = Duration::from_millis(settings.tick_interval_ms);
    let poll_every = (settings.poll_interval_ms / settings.tick_interval_ms.max(1)).max(1);
    task.execute();
    for tick in 0..max_ticks {
        if task.state().is_terminal() {
            break;
        }
        if tick % poll_every == 0 {
            if let Some(observer) = observer.as_deref_mut() {
                observer.poll();
            }
        }
        task.commit();
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
    if !task.state().is_terminal() {
        eprintln!("warning: tick limit of {max_ticks} reached, canceling");
        task.cancel();
        for _ in 0..UNWIND_TICKS {
            if task.commit().is_terminal() {
                break;
            }
        }
    }
    task.state()
}

fn run_catalog_list(directory: Option<&Path>) -> ExitCode {
    let mut entries = builtin_entries();
    if let Some(directory) = directory {
        match load_directory(directory) {
            Ok(saved) => entries.extend(saved),
            Err(e) => return fail(&e),
        }
    }
    for entry in &entries {
        println!("{}  {}  [{}]", entry.uid, entry.name, entry.node.canvas_type());
    }
    ExitCode::SUCCESS
}

fn run_catalog_export(name: &str, directory: &Path) -> ExitCode {
    let Some(entry) = builtin_entries().into_iter().find(|e| e.name.eq_ignore_ascii_case(name)) else {
        return fail(&CanvasError::Catalog {
            reason: format!("no built-in entry named {name}"),
        });
    };
    match entry.save(directory) {
        Ok(()) => {
            println!("{}", directory.join(format!("{}.json", entry.uid)).display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
