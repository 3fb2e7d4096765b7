//! dbgkit CLI - コマンドラインインターフェース
//!
//! ローカルプロセスとリモートカーネルのためのデバッガ dbgkit のREPLインターフェース

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use dbgkit_core::remote::DEFAULT_PORT;
use dbgkit_core::{
    AttachTarget, BreakpointLocation, Command, DebuggerContract, InterruptRelay, Outcome,
    ProcessControlBackend, RemoteKernelBackend, Session, StopReason, TextProtocol,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::net::{Ipv4Addr, SocketAddr};
use tracing_subscriber::EnvFilter;

/// dbgkit - Native process and kernel debugger
#[derive(Parser)]
#[command(name = "dbgkit")]
#[command(version = "0.1.0")]
#[command(about = "Breakpoint debugger for local processes and remote kernels", long_about = None)]
struct Cli {
    /// Enable debug logging for dbgkit crates
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<DebugCommand>,
}

#[derive(Subcommand)]
enum DebugCommand {
    /// Launch and debug an executable
    Run {
        /// Path to the executable binary
        binary: String,

        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Attach to an existing process
    Attach {
        /// Process ID to attach to
        #[arg(short, long)]
        pid: i32,
    },

    /// Connect to a remote kernel debug agent
    Kernel {
        /// Path to the kernel image
        #[arg(short, long)]
        kernel: String,

        /// IPv4 address of the debug agent
        #[arg(long)]
        ip: Ipv4Addr,

        /// TCP port of the debug agent
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Command protocol spoken by the agent
        #[arg(long, value_enum, default_value_t = Protocol::Pending)]
        protocol: Protocol,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Protocol {
    /// No command protocol; every operation reports "not implemented"
    Pending,
    /// NeKernel text frames
    Text,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    println!("dbgkit - Native Debugger");
    println!("Version 0.1.0");
    println!();

    let relay = InterruptRelay::install()?;
    let mut session = init_session(cli.command, relay)?;
    run_repl(&mut session)?;

    Ok(())
}

/// ログ出力を初期化する（RUST_LOGが優先）
fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,dbgkit_core=debug,dbgkit_target=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// バックエンドを選んでセッションを作成し、必要ならアタッチする
fn init_session(command: Option<DebugCommand>, relay: InterruptRelay) -> Result<Session> {
    let session = match command {
        None => {
            println!("No target. Use 'run <program>' or 'attach <pid>' to start.");
            Session::new(Box::new(ProcessControlBackend::new())).with_relay(relay)
        }
        Some(DebugCommand::Run { binary, args }) => {
            let mut session = Session::new(Box::new(ProcessControlBackend::new())).with_relay(relay);
            let pid = session.attach(&AttachTarget::Spawn {
                program: binary.clone().into(),
                args,
            })?;
            println!("Process {} spawned from {} and stopped after exec", pid, binary);
            println!("Set breakpoints and use 'continue' to continue execution");
            session
        }
        Some(DebugCommand::Attach { pid }) => {
            let mut session = Session::new(Box::new(ProcessControlBackend::new())).with_relay(relay);
            session.attach(&AttachTarget::Process(pid))?;
            println!("Attached to process {}", pid);
            session
        }
        Some(DebugCommand::Kernel { kernel, ip, port, protocol }) => {
            let backend: Box<dyn DebuggerContract> = match protocol {
                Protocol::Pending => Box::new(RemoteKernelBackend::new()),
                Protocol::Text => Box::new(RemoteKernelBackend::with_protocol(TextProtocol)),
            };
            let mut session = Session::new(backend).with_relay(relay);
            let addr = SocketAddr::from((ip, port));

            println!("Kernel image: {}", kernel);
            session.attach(&AttachTarget::Remote { kernel, addr })?;
            println!("Connected to {}", addr);

            // カーネルのハンドオーバー開始で止める
            match session.debugger_mut().set_breakpoint(&BreakpointLocation::Entry) {
                Ok(_) => println!("Breakpoint requested at kernel entry"),
                Err(e) => println!("Error: {}", e),
            }
            session
        }
    };
    println!();

    Ok(session)
}

/// REPLループを実行する
fn run_repl(session: &mut Session) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        if session.poll_interrupt() {
            println!("Interrupted: stop requested");
        }

        let readline = rl.readline("(dbgkit) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(session, line) {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C (use 'quit' to exit)");
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                session.execute(Command::Quit)?;
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

/// コマンドを処理する（終了する場合はtrue）
fn handle_command(session: &mut Session, line: &str) -> Result<bool> {
    let Some(command) = Command::parse(line) else {
        println!("Unknown command: {}", line);
        println!("Type 'help' for available commands.");
        return Ok(false);
    };

    tracing::debug!("Executing {:?}", command);

    if command == Command::Continue {
        println!("Continuing execution...");
    }

    let outcome = session.execute(command)?;
    let quit = outcome == Outcome::Quit;
    print_outcome(outcome);
    Ok(quit)
}

fn print_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Attached(pid) => println!("Attached to process {}", pid),
        Outcome::BreakpointSet(Some(addr)) => println!("Breakpoint set at 0x{:x}", addr),
        Outcome::BreakpointSet(None) => println!("Breakpoint requested"),
        Outcome::BreakpointRemoved(addr) => println!("Breakpoint at 0x{:x} deleted", addr),
        Outcome::BreakpointDisabled(addr) => println!("Breakpoint at 0x{:x} disabled", addr),
        Outcome::Stopped(reason) => print_stop_reason(reason),
        Outcome::Detached => println!("Detached"),
        Outcome::Info { pid, state, breakpoints } => {
            match pid {
                Some(pid) => println!("Process {} ({:?})", pid, state),
                None => println!("No process ({:?})", state),
            }
            if breakpoints.is_empty() {
                println!("No breakpoints");
            }
            for (i, bp) in breakpoints.iter().enumerate() {
                let status = if bp.active { "enabled" } else { "disabled" };
                println!("  {}. 0x{:x} [{}] original: 0x{:016x}", i + 1, bp.address, status, bp.original_word);
            }
        }
        Outcome::Help => print_help(),
        Outcome::Quit => println!("Goodbye!"),
    }
}

fn print_stop_reason(reason: StopReason) {
    println!();
    match reason {
        StopReason::Breakpoint { address } => {
            println!("Breakpoint hit!");
            println!("Stopped at 0x{:x}", address);
        }
        StopReason::Trap { pc } => println!("Trace trap at 0x{:x}", pc),
        StopReason::Step { pc } => println!("Stepped to 0x{:x}", pc),
        StopReason::Interrupted => println!("Process interrupted"),
        StopReason::Signal(signal) => println!("Received signal: {:?}", signal),
        StopReason::Exited(code) => println!("Process exited with code {}", code),
        StopReason::Killed(signal) => println!("Process killed by signal {:?}", signal),
        StopReason::Unreported => println!("Request sent; the agent does not report stops"),
        StopReason::Other => println!("Process stopped (unknown reason)"),
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help (h, ?)        - Show this help message");
    println!("  quit (q, exit)     - Detach and exit the debugger");
    println!();
    println!("Target commands:");
    println!("  run <prog> [args]  - Launch a program under the debugger");
    println!("  attach <pid>       - Attach to a running process");
    println!("  detach (d)         - Restore breakpoints and detach");
    println!("  info (i)           - Show target state and breakpoints");
    println!();
    println!("Execution commands:");
    println!("  break (b) <loc>    - Set breakpoint at hex address, symbol or 'entry'");
    println!("  delete <addr>      - Remove a breakpoint");
    println!("  disable <addr>     - Disable a breakpoint, keeping it for re-arming");
    println!("  continue (c)       - Continue execution until the next stop");
    println!("  step (s)           - Execute a single instruction");
    println!();
    println!("Examples:");
    println!("  run /bin/true");
    println!("  break entry");
    println!("  break 0x401000");
    println!("  continue");
}
