//! Line-oriented terminal front-end. Renders transcript events and forwards
//! user intents into the orchestrator.

use std::cell::RefCell;
use std::future::Future;
use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, warn};

use crate::commands::{ConversationEvent, Orchestrator, SubmitOutcome};
use crate::db::models::{Author, Message, MessageStatus, TimeHorizon};
use crate::market::StockDataClient;

const HELP: &str = "\
Commands:
  /models            list available models
  /model <id>        switch model
  /stream on|off     toggle streaming replies
  /horizon <tag>     short_term | medium_term | long_term
  /history           print the conversation so far
  /prefs             show preferences and recent symbols
  /quote <SYMBOL>    look up a live quote
  /clear             clear the conversation
  /reset             clear conversation and preferences
  /quit              exit
Anything else is sent as a question. Ctrl-C cancels a running reply,
or exits when pressed at the prompt.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ask(String),
    Models,
    Model(String),
    Stream(bool),
    Horizon(TimeHorizon),
    History,
    Prefs,
    Quote(String),
    Clear,
    Reset,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Ask(line.to_string()));
    };
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next();

    match (name.as_str(), arg) {
        ("models", _) => Ok(Command::Models),
        ("model", Some(id)) => Ok(Command::Model(id.to_string())),
        ("stream", Some("on")) => Ok(Command::Stream(true)),
        ("stream", Some("off")) => Ok(Command::Stream(false)),
        ("horizon", Some(tag)) => TimeHorizon::parse(tag)
            .map(Command::Horizon)
            .ok_or_else(|| format!("unknown time horizon '{tag}'")),
        ("history", _) => Ok(Command::History),
        ("prefs", _) => Ok(Command::Prefs),
        ("quote", Some(symbol)) => Ok(Command::Quote(symbol.to_string())),
        ("clear", _) => Ok(Command::Clear),
        ("reset", _) => Ok(Command::Reset),
        ("help", _) => Ok(Command::Help),
        ("quit" | "exit", _) => Ok(Command::Quit),
        ("model" | "stream" | "horizon" | "quote", None) => {
            Err(format!("/{name} needs an argument; try /help"))
        }
        _ => Err(format!("unknown command '/{name}'; try /help")),
    }
}

/// Writes transcript events as they happen. Remembers what was streamed so
/// a finalized message only adds what the deltas did not already show.
struct Renderer<W: Write> {
    out: W,
    streamed: String,
}

impl<W: Write> Renderer<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            streamed: String::new(),
        }
    }

    fn render(&mut self, event: &ConversationEvent) -> std::io::Result<()> {
        match event {
            ConversationEvent::Appended(message) if message.author == Author::Assistant => {
                if message.status == MessageStatus::Final {
                    write_reply(&mut self.out, message)?;
                } else {
                    self.streamed.clear();
                    write!(self.out, "\nassistant> ")?;
                }
            }
            ConversationEvent::Delta { text, .. } => {
                self.streamed.push_str(text);
                write!(self.out, "{text}")?;
            }
            ConversationEvent::Finalized(message) => {
                match message.text.strip_prefix(self.streamed.as_str()) {
                    Some(rest) => write!(self.out, "{rest}")?,
                    None => write!(self.out, "\n{}", message.text)?,
                }
                self.streamed.clear();
                writeln!(self.out)?;
                write_suggestions(&mut self.out, &message.suggestions)?;
            }
            ConversationEvent::Cleared => writeln!(self.out, "(conversation cleared)")?,
            _ => {}
        }
        self.out.flush()
    }
}

fn write_reply(out: &mut impl Write, message: &Message) -> std::io::Result<()> {
    writeln!(out, "\nassistant> {}", message.text)?;
    write_suggestions(out, &message.suggestions)
}

fn write_suggestions(out: &mut impl Write, suggestions: &[String]) -> std::io::Result<()> {
    if suggestions.is_empty() {
        return Ok(());
    }
    writeln!(out, "\nYou could also ask:")?;
    for s in suggestions {
        writeln!(out, "  - {s}")?;
    }
    Ok(())
}

/// What the prompt produced.
#[derive(Debug, PartialEq)]
enum Input {
    Line(String),
    Eof,
    Interrupted,
}

async fn next_input<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> std::io::Result<Input> {
    tokio::select! {
        line = lines.next_line() => Ok(line?.map(Input::Line).unwrap_or(Input::Eof)),
        _ = interrupt => Ok(Input::Interrupted),
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

pub async fn run(orchestrator: Orchestrator, market: Option<StockDataClient>) -> anyhow::Result<()> {
    let renderer = RefCell::new(Renderer::new(std::io::stdout()));
    orchestrator.subscribe(move |event| {
        if let Err(e) = renderer.borrow_mut().render(event) {
            debug!(error = %e, "stdout write failed");
        }
    });
    println!(
        "Stock chat ({} model). Type /help for commands.",
        orchestrator.selected_model()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nyou> ");
        std::io::stdout().flush()?;
        let line = match next_input(&mut lines, ctrl_c()).await? {
            Input::Line(line) => line,
            Input::Eof => break,
            Input::Interrupted => {
                println!();
                break;
            }
        };

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            Command::Ask(text) => ask(&orchestrator, &text).await,
            Command::Models => {
                let selected = orchestrator.selected_model();
                for model in orchestrator.available_models() {
                    let marker = if model.id == selected { "*" } else { " " };
                    println!("{marker} {:<20} {}", model.id, model.description);
                }
            }
            Command::Model(id) => match orchestrator.change_model(&id) {
                Ok(()) => println!("Model set to {id}."),
                Err(e) => println!("{e}"),
            },
            Command::Stream(enabled) => {
                orchestrator.set_streaming(enabled);
                println!("Streaming {}.", if enabled { "on" } else { "off" });
            }
            Command::Horizon(horizon) => {
                orchestrator.set_time_horizon(horizon);
                println!("Time horizon set to {}.", horizon.describe());
            }
            Command::History => {
                for message in orchestrator.transcript() {
                    println!("[{}] {}> {}", message.id, message.author.as_str(), message.text);
                }
            }
            Command::Prefs => {
                let prefs = orchestrator.preferences();
                println!("model:          {}", prefs.selected_model);
                println!("streaming:      {}", prefs.streaming_enabled);
                println!("time horizon:   {}", prefs.time_horizon.describe());
                println!("recent symbols: {}", prefs.recent_symbols.join(", "));
                println!("recent queries:");
                for query in &prefs.recent_queries {
                    println!("  - {query}");
                }
            }
            Command::Quote(symbol) => match &market {
                Some(client) => match client.quote(&symbol).await {
                    Ok(q) => println!(
                        "{} {:.2} {} ({:+.2}, {:+.2}%)",
                        q.symbol,
                        q.price,
                        q.currency.as_deref().unwrap_or(""),
                        q.change,
                        q.change_percent
                    ),
                    Err(e) => println!("{e}"),
                },
                None => println!("Quotes are not configured (set STOCK_DATA_BASE_URL)."),
            },
            Command::Clear => orchestrator.clear_conversation(),
            Command::Reset => orchestrator.clear_session(),
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }
    Ok(())
}

async fn ask(orchestrator: &Orchestrator, text: &str) {
    let turn = orchestrator.submit(text);
    tokio::pin!(turn);
    let outcome = tokio::select! {
        outcome = &mut turn => outcome,
        _ = ctrl_c() => {
            orchestrator.cancel_turn();
            turn.await
        }
    };
    match outcome {
        SubmitOutcome::Failed(e) => warn!(error = %e, "turn failed"),
        SubmitOutcome::Cancelled => println!(),
        other => debug!(outcome = ?other, "turn finished"),
    }
}
