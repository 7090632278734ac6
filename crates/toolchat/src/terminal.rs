use std::io::{self as std_io, BufRead as _, Write as _};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::signal::ctrl_c;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use toolchat_core::CancellationToken;
use toolchat_core::agent::BoxError;
use toolchat_core::conversation::{Frontend, TurnEvent};

const BAR_CHAR: &str = "▎";
const SEPARATOR_WIDTH: usize = 80;
const EXIT_INTERRUPTED: i32 = 130;

enum Input {
    Line(String),
    Interrupted,
    Closed,
}

/// What the session is busy with, as far as Ctrl+C is concerned.
#[derive(Debug)]
enum Phase {
    Prompt,
    Working,
    Answering(CancellationToken),
}

#[derive(Debug, PartialEq, Eq)]
enum InterruptAction {
    Quit,
    CancelAnswer,
    Exit,
}

/// Decides what each Ctrl+C of the session does.
#[derive(Clone, Debug)]
struct Interrupts {
    phase: Arc<Mutex<Phase>>,
}

impl Interrupts {
    fn new() -> Self {
        Self {
            phase: Arc::new(Mutex::new(Phase::Working)),
        }
    }

    fn enter(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Ctrl+C at the prompt quits, during an answer it stops the answer,
    /// and anywhere else it ends the process.
    fn interrupt(&self) -> InterruptAction {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        match mem::replace(&mut *phase, Phase::Working) {
            Phase::Prompt => {
                *phase = Phase::Prompt;
                InterruptAction::Quit
            }
            Phase::Answering(token) => {
                token.cancel();
                InterruptAction::CancelAnswer
            }
            Phase::Working => InterruptAction::Exit,
        }
    }
}

/// Talks to the user through stdin and stdout.
///
/// Lines are read on a dedicated thread, since a pending read on stdin
/// can't be cancelled and would keep the runtime from shutting down.
pub struct TerminalFrontend {
    input: UnboundedReceiver<Input>,
    interrupts: Interrupts,
    interrupt_listener: JoinHandle<()>,
    progress_style: ProgressStyle,
    progress_bar: Option<ProgressBar>,
}

impl TerminalFrontend {
    /// Starts reading stdin and listening for Ctrl+C. Must be called
    /// within the runtime.
    pub fn new() -> std_io::Result<Self> {
        let (tx, input) = mpsc::unbounded_channel();
        spawn_stdin_reader(tx.clone())?;
        let interrupts = Interrupts::new();
        let interrupt_listener = spawn_interrupt_listener(interrupts.clone(), tx);

        let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        Ok(Self {
            input,
            interrupts,
            interrupt_listener,
            progress_style,
            progress_bar: None,
        })
    }

    fn start_spinner(&mut self, message: &'static str) {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(self.progress_style.clone());
        progress_bar.set_message(message);
        progress_bar.enable_steady_tick(Duration::from_millis(100));
        self.progress_bar = Some(progress_bar);
    }

    fn stop_spinner(&mut self) {
        // Finish the progress bar before printing anything else.
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

fn spawn_stdin_reader(tx: UnboundedSender<Input>) -> std_io::Result<()> {
    thread::Builder::new()
        .name("stdin".to_owned())
        .spawn(move || {
            for line in std_io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(Input::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        error!("error reading input: {err}");
                        break;
                    }
                }
            }
            _ = tx.send(Input::Closed);
        })?;
    Ok(())
}

fn spawn_interrupt_listener(
    interrupts: Interrupts,
    tx: UnboundedSender<Input>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while ctrl_c().await.is_ok() {
            match interrupts.interrupt() {
                InterruptAction::Quit => {
                    if tx.send(Input::Interrupted).is_err() {
                        break;
                    }
                }
                InterruptAction::CancelAnswer => debug!("answer interrupted"),
                InterruptAction::Exit => {
                    println!("\n👋 Bye!");
                    std::process::exit(EXIT_INTERRUPTED);
                }
            }
        }
    })
}

impl Frontend for TerminalFrontend {
    async fn read_input(&mut self) -> Option<String> {
        println!("{}", "⏳ (Press Ctrl+C to interrupt an answer)".dimmed());
        print!("{} ", "✋ Query>".bright_green().bold());
        flush_stdout();

        self.interrupts.enter(Phase::Prompt);
        let input = self.input.recv().await;
        self.interrupts.enter(Phase::Working);
        match input? {
            Input::Line(line) => Some(line),
            Input::Interrupted => {
                println!();
                None
            }
            Input::Closed => None,
        }
    }

    fn on_event(&mut self, event: TurnEvent<'_>) {
        let bar = BAR_CHAR.bright_cyan();
        match event {
            TurnEvent::DetectingTools => {
                self.start_spinner("🚀 Detecting tools...");
            }
            TurnEvent::NoToolCalls => {
                self.stop_spinner();
                println!("{bar}✋ No function call");
            }
            TurnEvent::DetectionFailed(err) => {
                self.stop_spinner();
                println!("{bar}😡 Tools completion error: {}", err.red());
                println!();
            }
            TurnEvent::ToolsDetected(calls) => {
                self.stop_spinner();
                println!("{bar}🛠️  {} tool call(s) detected", calls.len());
            }
            TurnEvent::ToolCallStarted(call) => {
                println!(
                    "{bar}💡 {} {}",
                    call.name.bright_white().bold(),
                    call.arguments.dimmed()
                );
            }
            TurnEvent::ToolSucceeded { call, text } => {
                println!(
                    "{bar}✅ Tool {} executed successfully, result: {}",
                    call.name.bright_white(),
                    text.trim_end()
                );
            }
            TurnEvent::ToolFailed { call, error } => {
                println!(
                    "{}😡 Error calling tool {}: {}",
                    BAR_CHAR.bright_yellow(),
                    call.name.bright_white(),
                    error.red()
                );
            }
            TurnEvent::AnswerStarted => {
                println!("{bar}🤖 Starting chat completion...");
                println!("{}", "=".repeat(SEPARATOR_WIDTH).blue());
            }
            TurnEvent::AnswerFinished => {
                self.interrupts.enter(Phase::Working);
                println!("\n{}", "=".repeat(SEPARATOR_WIDTH).blue());
                println!();
            }
            TurnEvent::AnswerFailed(err) => {
                self.interrupts.enter(Phase::Working);
                println!();
                println!("{}😡 Chat completion error: {}", bar, err.red());
                println!("{}", "=".repeat(SEPARATOR_WIDTH).blue());
                println!();
            }
            TurnEvent::Farewell => {
                self.stop_spinner();
                println!("👋 Bye!");
            }
        }
    }

    fn on_answer_chunk(&mut self, chunk: &str) -> Result<(), BoxError> {
        let mut stdout = std_io::stdout().lock();
        stdout.write_all(chunk.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    fn interrupt_token(&mut self) -> CancellationToken {
        let token = CancellationToken::new();
        self.interrupts.enter(Phase::Answering(token.clone()));
        token
    }
}

impl Drop for TerminalFrontend {
    fn drop(&mut self) {
        self.stop_spinner();
        self.interrupt_listener.abort();
    }
}

fn flush_stdout() {
    if let Err(err) = std_io::stdout().flush() {
        warn!("failed to flush stdout: {err}");
    }
}
