//! Command-line driver for `kernelite_core`.
//!
//! # Responsibility
//! - Probe core linkage (`ping`).
//! - Extract package archives (`untar`).
//! - List the host export table (`exports`).
//! - Run cells through an echo kernel and print its outbound traffic (`run`).

use clap::{Parser, Subcommand};
use kernelite_core::kernel::{
    get_user_name, make_empty_context, make_host_server, make_in_memory_history_manager,
    FromParameters,
};
use kernelite_core::{
    core_version, default_exports, default_log_level, extract, init_logging, make_kernel,
    make_parameterized_kernel, ping, Channel, EchoInterpreter, HostValue, Kernel, KernelConfig,
};
use log::info;
use serde_json::{json, Value};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "kernelite")]
#[command(about = "Embeddable protocol kernel tools")]
struct Cli {
    /// Absolute directory for rolling log files; logging is off when omitted.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print core liveness and version.
    Ping,
    /// Extract a `.tar.gz` archive into a directory.
    Untar { archive: PathBuf, target: PathBuf },
    /// List exported kernel classes and functions.
    Exports,
    /// Execute cells with the echo kernel and print every outbound message.
    Run {
        /// Cell source; repeat for several cells.
        #[arg(long = "code", required = true)]
        cells: Vec<String>,
        /// JSON configuration handed to the interpreter.
        #[arg(long)]
        parameters: Option<String>,
        /// JSON connection file for the kernel configuration.
        #[arg(long)]
        connection_file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        if let Err(err) = init_logging(default_log_level(), &log_dir.to_string_lossy()) {
            eprintln!("kernelite: {err}");
            return ExitCode::FAILURE;
        }
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("kernelite: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Ping => {
            println!("kernelite_core ping={}", ping());
            println!("kernelite_core version={}", core_version());
        }
        Command::Untar { archive, target } => {
            let summary = extract(&archive, &target)?;
            println!(
                "extracted entries={} files={} directories={} links={} skipped={} bytes={}",
                summary.entries,
                summary.files,
                summary.directories,
                summary.links,
                summary.skipped,
                summary.bytes_written
            );
        }
        Command::Exports => {
            let registry = default_exports()?;
            for name in registry.class_names() {
                if let Some(class) = registry.class(name) {
                    println!(
                        "class {name} parameterizable={} methods={}",
                        class.is_parameterizable(),
                        class.method_names().join(",")
                    );
                }
            }
            for name in registry.function_names() {
                println!("function {name}");
            }
        }
        Command::Run {
            cells,
            parameters,
            connection_file,
        } => run_cells(&cells, parameters.as_deref(), connection_file)?,
    }
    Ok(())
}

fn run_cells(
    cells: &[String],
    parameters: Option<&str>,
    connection_file: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let parameters = parameters.map(serde_json::from_str::<Value>).transpose()?;

    let mut kernel: Box<Kernel> = match connection_file {
        Some(path) => {
            let interpreter = match parameters {
                Some(parameters) => EchoInterpreter::from_parameters(parameters),
                None => EchoInterpreter::default(),
            };
            Box::new(Kernel::new(
                KernelConfig::from_file(&path)?,
                get_user_name(),
                make_empty_context(),
                Box::new(interpreter),
                make_host_server,
                make_in_memory_history_manager()?,
                None,
            ))
        }
        None => {
            let handle = match parameters {
                Some(parameters) => make_parameterized_kernel::<EchoInterpreter>(parameters)?,
                None => make_kernel::<EchoInterpreter>()?,
            };
            handle.into_inner()
        }
    };

    let (tx, rx) = mpsc::channel();
    kernel
        .get_server()
        .set_host_listener(Box::new(move |channel, value| {
            let _ = tx.send((channel, value.to_json()));
        }));
    kernel.start()?;

    for (index, code) in cells.iter().enumerate() {
        let request = json!({
            "header": {
                "msg_id": format!("cli-{index}"),
                "msg_type": "execute_request",
                "session": "cli",
                "username": get_user_name(),
                "version": kernelite_core::message::PROTOCOL_VERSION,
            },
            "parent_header": {},
            "metadata": {},
            "content": {"code": code, "silent": false, "store_history": true},
        });
        kernel
            .get_server()
            .notify_listener(Channel::Shell, &HostValue::from_json(&request))?;
    }
    let processed = kernel.process_pending()?;
    info!("event=cli_run module=cli status=ok cells={} processed={}", cells.len(), processed);

    for (channel, message) in rx.try_iter() {
        let message = message?;
        let line = json!({
            "channel": channel.as_str(),
            "msg_type": message["header"]["msg_type"],
            "content": message["content"],
        });
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn run_accepts_repeated_code_arguments() {
        let cli = Cli::parse_from(["kernelite", "run", "--code", "a", "--code", "b"]);
        match cli.command {
            Command::Run { cells, parameters, .. } => {
                assert_eq!(cells, vec!["a".to_string(), "b".to_string()]);
                assert!(parameters.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn untar_requires_archive_and_target() {
        assert!(Cli::try_parse_from(["kernelite", "untar", "only.tar.gz"]).is_err());
    }
}
