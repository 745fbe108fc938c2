//! pi-ssh: run the agent's built-in tools against a remote host.

#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use asupersync::runtime::RuntimeBuilder;
use asupersync::runtime::reactor::create_reactor;
use clap::Parser;
use pi_ssh::cli::{Cli, Commands};
use pi_ssh::config::Config;
use pi_ssh::delegation::{DelegationController, NotifyLevel};
use pi_ssh::model::ContentBlock;
use pi_ssh::tools::{BUILTIN_TOOLS, ToolOutput, ToolRegistry};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = main_impl() {
        print_error_with_hints(&err);
        std::process::exit(1);
    }
}

fn main_impl() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cwd = match cli.cwd.as_deref() {
        Some(dir) => std::fs::canonicalize(dir)
            .with_context(|| format!("Working directory does not exist: {dir}"))?,
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let cwd = cwd
        .to_str()
        .ok_or_else(|| anyhow!("Working directory is not valid UTF-8: {}", cwd.display()))?
        .to_string();

    let mut remote = Config::load()?.remote_configuration();
    cli.apply_overrides(&mut remote);
    let controller = Arc::new(DelegationController::new(cwd, remote)?);

    let reactor = create_reactor()?;
    let runtime = RuntimeBuilder::multi_thread()
        .blocking_threads(1, 8)
        .with_reactor(reactor)
        .build()
        .map_err(|e| anyhow!(e.to_string()))?;
    let handle = runtime.handle();
    let join = handle.spawn(Box::pin(run(cli.command, controller)));
    runtime.block_on(join)
}

async fn run(command: Commands, controller: Arc<DelegationController>) -> Result<()> {
    for notification in controller.start_session().await {
        match notification.level {
            NotifyLevel::Info => eprintln!("{}", notification.message),
            NotifyLevel::Error => eprintln!("Error: {}", notification.message),
        }
    }

    let Some((name, input)) = command.tool_call() else {
        print_status(&controller);
        return Ok(());
    };

    let registry = ToolRegistry::new(&BUILTIN_TOOLS, &controller);
    let tool = registry
        .get(name)
        .ok_or_else(|| anyhow!("Unknown tool: {name}"))?;
    let output = tool.execute("cli", input, None).await?;
    print_output(&output);
    if let Some(status) = controller.debug_status() {
        eprintln!("{status}");
    }
    Ok(())
}

fn print_status(controller: &DelegationController) {
    println!(
        "{}",
        controller
            .status_line()
            .unwrap_or_else(|| "SSH: not configured".to_string())
    );
    if controller.inject_agents_context(&[]).is_some() {
        println!("Remote AGENTS.md loaded");
    }
}

fn print_output(output: &ToolOutput) {
    for block in &output.content {
        match block {
            ContentBlock::Text(text) => println!("{}", text.text),
            ContentBlock::Image(image) => {
                println!("[{} image, {} bytes base64]", image.mime_type, image.data.len());
            }
        }
    }
}

fn print_error_with_hints(err: &anyhow::Error) {
    for cause in err.chain() {
        if let Some(error) = cause.downcast_ref::<pi_ssh::Error>() {
            eprint!("{}", pi_ssh::error_hints::format_error_with_hints(error));
            return;
        }
    }

    eprintln!("{err}");
}
