use std::io::{IsTerminal, Write};
use std::path::Path;

use clap::Parser;
use color_eyre::eyre::{self, Context, OptionExt};
use config::Config;
use debugger::{DebugAdapterService, Event, OutputStream};
use launch_configuration::LaunchContext;
use tracing_subscriber::EnvFilter;

mod args;

use args::{Args, Commands};

fn init_logging() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .json()
            .try_init();
    }
}

fn context_for(file: &Path, workspace: Option<&Path>) -> eyre::Result<LaunchContext> {
    let file = std::path::absolute(file)
        .wrap_err_with(|| format!("resolving path {}", file.display()))?;
    let mut context = LaunchContext::new(file);
    if let Some(workspace) = workspace {
        let workspace = std::path::absolute(workspace).wrap_err("resolving workspace folder")?;
        context = context.with_workspace_folder(workspace);
    }
    Ok(context)
}

fn list(service: &DebugAdapterService, file: &Path) -> eyre::Result<()> {
    let context = context_for(file, None)?;
    let configurations = service.configurations(&context);
    let Some(path) = configurations.path() else {
        println!("no launch configurations for {}", context.file.display());
        return Ok(());
    };

    println!("{}", path.display());
    for configuration in &configurations {
        let marker = if configurations.is_active(configuration) {
            "*"
        } else {
            " "
        };
        println!("{marker} {configuration}");
    }
    Ok(())
}

fn launch(
    service: &DebugAdapterService,
    file: &Path,
    name: Option<&str>,
    workspace: Option<&Path>,
) -> eyre::Result<i32> {
    let context = context_for(file, workspace)?;
    let configuration = match name {
        Some(name) => service
            .configurations(&context)
            .find(name)
            .cloned()
            .ok_or_else(|| eyre::eyre!("no launch configuration named {name:?}"))?,
        None => service
            .active_configuration(&context, false)
            .ok_or_eyre("no launch configuration is active")?,
    };

    let session = service
        .launch(&configuration, &context)
        .wrap_err_with(|| format!("launching {configuration}"))?;

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    for event in session.events().iter() {
        match event {
            Event::Started => tracing::info!(configuration = configuration.name(), "target started"),
            Event::Output {
                stream: OutputStream::Stdout,
                text,
            } => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            Event::Output {
                stream: OutputStream::Stderr,
                text,
            } => {
                stderr.write_all(text.as_bytes())?;
            }
            Event::TargetExited { exit_code } => {
                tracing::info!(?exit_code, "target exited");
                return Ok(exit_code.and_then(|code| i32::try_from(code).ok()).unwrap_or(0));
            }
        }
    }
    eyre::bail!("session ended without an exit notification")
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    init_logging();

    let args = Args::parse();
    let config = match &args.settings {
        Some(path) => Config::from_path(path),
        None => Config::load(),
    }
    .wrap_err("loading settings")?;
    tracing::debug!(?config, "loaded settings");

    let service = DebugAdapterService::from_config(&config);
    match args.command {
        Commands::List { file } => list(&service, &file),
        Commands::Launch {
            file,
            name,
            workspace,
        } => {
            let code = launch(&service, &file, name.as_deref(), workspace.as_deref())?;
            service.stop();
            std::process::exit(code);
        }
    }
}
