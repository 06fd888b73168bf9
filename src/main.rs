mod cli;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, CompleteArgs, NewArgs, PickArgs};
use forester_complete::app::{App, PickOutcome};
use forester_complete::complete::rank;
use forester_complete::forester::SystemBackend;
use forester_complete::model::config::AppConfig;
use forester_complete::model::document::Document;
use forester_complete::msg::Msg;
use forester_complete::notice::Notices;
use forester_complete::session::Session;
use forester_complete::watch::spawn_forest_watcher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log to file; stdout carries results.
    let log_dir = directories::ProjectDirs::from("", "", "forester-complete")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("forester-complete"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "forester-complete.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("forester_complete=info")),
        )
        .init();

    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("project root {}", root.display()))?;

    let mut config = AppConfig::load(&root)?;
    cli.apply(&mut config);
    tracing::info!(
        "forester-complete starting in {} with {}",
        root.display(),
        config.forester.executable
    );

    let runtime = Runtime::new()?;

    match cli.command {
        Command::Pick(args) => pick(&runtime, root, config, args),
        Command::Query => headless(root, config, |session, _| runtime.block_on(query(session))),
        Command::Complete(args) => headless(root, config, |session, _| {
            runtime.block_on(complete(session, &args))
        }),
        Command::New(args) => headless(root, config, |session, _| {
            runtime.block_on(new_tree(session, args))
        }),
        Command::Serve => headless(root, config, |session, notices| {
            runtime.block_on(serve(session, notices))
        }),
    }
}

/// Run a non-interactive command; notices go to stderr afterwards.
fn headless(
    root: PathBuf,
    config: AppConfig,
    command: impl FnOnce(&Session, &Notices) -> Result<()>,
) -> Result<()> {
    let notices = Arc::new(Notices::new());
    let session = Session::new(root, config, Arc::new(SystemBackend), notices.clone());
    let result = command(&session, &notices);

    print_notices(&notices);
    result
}

async fn query(session: &Session) -> Result<()> {
    let forest = session.cache().get().await;
    println!("{}", serde_json::to_string(&*forest)?);
    Ok(())
}

async fn complete(session: &Session, args: &CompleteArgs) -> Result<()> {
    let (line, cursor) = completion_input(args)?;
    let mut completion = session.complete(&line, cursor).await;
    if let Some(completion) = completion.as_mut().filter(|_| args.rank) {
        let candidates = std::mem::take(&mut completion.candidates);
        let limit = session.config().completion.max_results;
        completion.candidates = rank(candidates, &completion.partial, limit);
    }
    println!("{}", serde_json::to_string(&completion)?);
    Ok(())
}

async fn new_tree(session: &Session, args: NewArgs) -> Result<()> {
    if let Some(path) = session.new_tree(args.into()).await {
        println!("{}", path.display());
    }
    Ok(())
}

async fn serve(session: &Session, notices: &Notices) -> Result<()> {
    let forester = session.cache().forester();
    spawn_forest_watcher(
        forester.root().to_path_buf(),
        forester.config().config_file().map(str::to_string),
        session.cache().clone(),
    );
    // Warm the cache before the first request arrives.
    session.cache().refresh().await;
    forester_complete::serve::serve(session, notices).await
}

/// The line and character cursor to complete, from `--line` or from a
/// position in `--file`.
fn completion_input(args: &CompleteArgs) -> Result<(String, usize)> {
    if let Some(line) = &args.line {
        let cursor = args.cursor.unwrap_or_else(|| line.chars().count());
        return Ok((line.clone(), cursor));
    }

    let (Some(path), Some(row), Some(col)) = (&args.file, args.row, args.col) else {
        bail!("pass --line, or --file with --row and --col");
    };

    let document = Document::from_file(path)?;
    let Some(prefix) = document.prefix_at(row, col) else {
        bail!(
            "{} has {} lines, no row {row}",
            path.display(),
            document.line_count()
        );
    };
    let cursor = prefix.chars().count();
    Ok((prefix, cursor))
}

fn print_notices(notices: &Notices) {
    for notice in notices.drain() {
        eprintln!("{:?}: {}", notice.severity, notice.message);
    }
}

fn pick(runtime: &Runtime, root: PathBuf, config: AppConfig, args: PickArgs) -> Result<()> {
    let (tx, rx) = mpsc::channel::<Msg>();
    let session = Arc::new(Session::new(
        root,
        config,
        Arc::new(SystemBackend),
        Arc::new(tx.clone()),
    ));
    let mut app = App::new(
        session,
        runtime.handle().clone(),
        tx.clone(),
        args.query,
        args.new.into(),
    );

    // Terminal setup; draw on stderr so stdout stays clean for the result.
    enable_raw_mode()?;
    let mut stderr = io::stderr();
    execute!(stderr, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stderr);
    let mut terminal = Terminal::new(backend)?;

    let result = run_picker(&mut terminal, &mut app, tx, rx);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result?;
    match app.outcome {
        Some(PickOutcome::Chosen(address)) => println!("{address}"),
        Some(PickOutcome::Created(path)) => println!("{}", path.display()),
        None => tracing::info!("pick cancelled"),
    }

    Ok(())
}

fn run_picker(
    terminal: &mut Terminal<CrosstermBackend<io::Stderr>>,
    app: &mut App,
    tx: mpsc::Sender<Msg>,
    rx: mpsc::Receiver<Msg>,
) -> Result<()> {
    // Input thread: reads terminal events and forwards them as Msg.
    let tx_input = tx.clone();
    thread::spawn(move || {
        loop {
            if let Ok(event) = event::read() {
                let msg = match event {
                    Event::Key(k) if k.kind == KeyEventKind::Press => Msg::Key(k),
                    Event::Resize(w, h) => Msg::Resize(w, h),
                    _ => continue,
                };
                if tx_input.send(msg).is_err() {
                    break;
                }
            }
        }
    });

    // Tick thread: drives the spinner.
    thread::spawn(move || {
        loop {
            thread::sleep(Duration::from_millis(100));
            if tx.send(Msg::Tick).is_err() {
                break;
            }
        }
    });

    app.start();
    terminal.draw(|f| app.view(f))?;

    loop {
        // Batch-drain all pending messages
        let first = rx.recv()?;
        app.update(first)?;

        while let Ok(msg) = rx.try_recv() {
            app.update(msg)?;
        }

        if app.should_quit {
            break;
        }

        terminal.draw(|f| app.view(f))?;
    }

    Ok(())
}
