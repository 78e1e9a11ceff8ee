use clap::{ArgAction, Parser, Subcommand};
use gambit_engine::{
    GraphBuilder, Operation, OperationConfig, OperationEvent, OperationEventKind,
    OperationEventSink, OperationResult, OperationTask, RunContext, operation_event_channel,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod demo;

use demo::{DailyErrandsTask, WorldFixture, default_fixture};

#[derive(Parser, Debug)]
#[command(name = "gambit-cli")]
#[command(about = "Scripted host for the gambit operation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the demo operation against a scripted world.
    Run(RunArgs),
    /// Build and print the demo operation's graph.
    Validate,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// JSON world fixture; the built-in happy-path script when omitted.
    #[arg(long)]
    fixture: Option<PathBuf>,
    /// Whole-operation timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Directory diagnostic frames are written under.
    #[arg(long)]
    diagnostics_root: Option<PathBuf>,
    #[arg(long = "no-stream-events", action = ArgAction::SetTrue)]
    no_stream_events: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    event_json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::Validate => validate_command(),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

async fn run_command(args: RunArgs) -> Result<ExitCode, String> {
    let fixture = match args.fixture.as_deref() {
        Some(path) => WorldFixture::load(path)?,
        None => default_fixture(),
    };

    let (event_sink, event_task) = event_stream(!args.no_stream_events, args.event_json);

    let operation = Operation::new(
        Arc::new(DailyErrandsTask),
        fixture.services(),
        RunContext::new(),
    )
    .with_config(OperationConfig {
        timeout: args.timeout_secs.map(Duration::from_secs),
        diagnostics_root: args.diagnostics_root,
        ..OperationConfig::default()
    })
    .with_events(event_sink);

    let result = operation.execute().await;

    // Dropping the operation closes the event channel so the printer
    // drains and exits.
    drop(operation);
    if let Some(task) = event_task {
        task.await.map_err(|error| error.to_string())?;
    }

    print_run_summary(&result);
    Ok(exit_code_for_result(&result))
}

fn validate_command() -> Result<ExitCode, String> {
    let task = DailyErrandsTask;
    let mut builder = GraphBuilder::new();
    task.build_graph(&mut builder);
    let graph = builder
        .build(task.readiness_guard())
        .map_err(|error| error.to_string())?;

    println!("task: {}", task.display_name());
    println!("start: {}", graph.start());
    println!("nodes: {}", graph.node_count());
    for name in graph.node_names() {
        for edge in graph.outgoing(name) {
            println!(
                "  {} -> {} [{}{}{}]",
                edge.from,
                edge.to,
                if edge.requires_success {
                    "success"
                } else {
                    "failure"
                },
                edge.status
                    .as_deref()
                    .map(|status| format!(", status={status}"))
                    .unwrap_or_default(),
                if edge.fallback { ", fallback" } else { "" },
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn event_stream(
    stream_events: bool,
    event_json: bool,
) -> (OperationEventSink, Option<tokio::task::JoinHandle<()>>) {
    if !stream_events {
        return (OperationEventSink::default(), None);
    }

    let (tx, mut rx) = operation_event_channel();
    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if event_json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(_) => print_event_text(&event),
                }
            } else {
                print_event_text(&event);
            }
        }
    });
    (OperationEventSink::with_sender(tx), Some(task))
}

fn print_event_text(event: &OperationEvent) {
    let line = match &event.kind {
        OperationEventKind::RunStarted { task } => format!("run started: {task}"),
        OperationEventKind::RunFinished {
            task,
            success,
            status,
        } => format!(
            "run finished: {task} {} ({})",
            if *success { "succeeded" } else { "failed" },
            status.as_deref().unwrap_or("no status"),
        ),
        OperationEventKind::Transition { from, to, status } => format!(
            "node {from} -> {to} returned status {}",
            status.as_deref().unwrap_or("none"),
        ),
        OperationEventKind::Retrying {
            node,
            attempt,
            max_retries,
        } => format!("node {node} retrying ({attempt}/{max_retries})"),
        OperationEventKind::Paused { node } => format!("paused at {node}"),
        OperationEventKind::Resumed { node } => format!("resumed at {node}"),
    };
    println!("[event seq={}] {}", event.sequence_no, line);
}

fn print_run_summary(result: &OperationResult) {
    println!(
        "result: {}",
        if result.success { "success" } else { "fail" }
    );
    println!("status: {}", result.status.as_deref().unwrap_or("<none>"));
    if let Some(data) = result.data.as_ref() {
        println!("data: {data}");
    }
}

fn exit_code_for_result(result: &OperationResult) -> ExitCode {
    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
