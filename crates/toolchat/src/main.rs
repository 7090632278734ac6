//! The terminal front-end of the assistant.

#[macro_use]
extern crate tracing;

mod terminal;

use anyhow::Context as _;
use clap::Parser;
use owo_colors::OwoColorize;
use toolchat::{SessionBuilder, Settings};
use toolchat_mcp::{Implementation, McpClient};
use toolchat_openai_model::OpenAIProvider;

use crate::terminal::TerminalFrontend;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, so they never mix with the streamed answers.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::parse();
    print_banner(&settings);

    let prompts = settings.prompts().context("failed to load the prompts")?;
    let model_provider = OpenAIProvider::new(settings.openai_config());

    let mut mcp_client = McpClient::new(
        &settings.mcp_host_url,
        Implementation::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    );
    if let Err(err) = mcp_client.connect().await {
        mcp_client.close().await;
        return Err(err).with_context(|| {
            format!("failed to connect to the tool host at {}", settings.mcp_host_url)
        });
    }
    info!("tool host session: {:?}", mcp_client.session_id());
    println!(
        "🔌 Connected to the tool host, {} tools available",
        mcp_client.tools().len()
    );

    let mut session = SessionBuilder::with_model_provider(model_provider, mcp_client)
        .with_chat_model(&settings.chat_model)
        .with_tools_model(&settings.tools_model)
        .with_chat_temperature(settings.chat_temperature)
        .with_tools_temperature(settings.tools_temperature)
        .with_prompts(prompts)
        .with_retention(settings.retention())
        .build();

    println!("🐙 hello, I'm here to improve your DX");
    println!("Type '/bye' to quit.");

    let mut frontend =
        TerminalFrontend::new().context("failed to start reading the terminal")?;
    session.run(&mut frontend).await;

    // Ctrl+C still ends the process while the session is being closed.
    session.into_tool_host().close().await;
    drop(frontend);
    Ok(())
}

fn print_banner(settings: &Settings) {
    let separator = "=".repeat(80);
    println!("{}", separator.blue());
    println!("{} {}", "Model Runner Base URL:".blue(), settings.model_runner_base_url);
    println!("{} {}", "Model Runner Chat Model:".blue(), settings.chat_model);
    println!("{} {}", "Model Runner Tools Model:".blue(), settings.tools_model);
    println!("{} {}", "MCP Host URL:".blue(), settings.mcp_host_url);
    if let Some(turns) = settings.history_turns {
        println!("{} {turns}", "Chat History Turns:".blue());
    }
    println!("{}", separator.blue());
}
