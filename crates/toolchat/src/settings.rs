use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use toolchat_core::conversation::HistoryRetention;
use toolchat_openai_model::{OpenAIConfig, OpenAIConfigBuilder};

use crate::Prompts;

/// Configuration, read from the command line or the environment.
#[derive(Clone, Debug, Parser)]
#[command(name = "toolchat", version, about = "Chat with a model that can use MCP tools")]
pub struct Settings {
    /// Base URL of the OpenAI-compatible model runner.
    #[arg(long, env = "MODEL_RUNNER_BASE_URL", value_parser = NonEmptyStringValueParser::new())]
    pub model_runner_base_url: String,

    /// API key of the model runner. Local runners usually need none.
    #[arg(long, env = "MODEL_RUNNER_API_KEY", default_value = "", hide_env_values = true)]
    pub model_runner_api_key: String,

    /// Model answering the user.
    #[arg(long, env = "MODEL_RUNNER_CHAT_MODEL", value_parser = NonEmptyStringValueParser::new())]
    pub chat_model: String,

    /// Model choosing the tools.
    #[arg(long, env = "MODEL_RUNNER_TOOLS_MODEL", value_parser = NonEmptyStringValueParser::new())]
    pub tools_model: String,

    /// Endpoint of the MCP tool host.
    #[arg(long, env = "MCP_HOST_URL", value_parser = NonEmptyStringValueParser::new())]
    pub mcp_host_url: String,

    /// Sampling temperature of the chat model.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value_t = 0.5)]
    pub chat_temperature: f32,

    /// Sampling temperature of the tools model.
    #[arg(long, env = "TOOLS_TEMPERATURE", default_value_t = 0.0)]
    pub tools_temperature: f32,

    /// Only send the most recent turns to the chat model.
    #[arg(long, env = "CHAT_HISTORY_TURNS")]
    pub history_turns: Option<NonZeroUsize>,

    /// Replaces the built-in system prompt of the chat model.
    #[arg(long, env = "SYSTEM_INSTRUCTIONS_FILE")]
    pub system_instructions_file: Option<PathBuf>,

    /// Replaces the built-in tool selection prompt.
    #[arg(long, env = "TOOLS_INSTRUCTIONS_FILE")]
    pub tools_instructions_file: Option<PathBuf>,

    /// Replaces the built-in prompt introducing tool output to the chat
    /// model.
    #[arg(long, env = "TOOLS_CONTEXT_INSTRUCTIONS_FILE")]
    pub tools_context_instructions_file: Option<PathBuf>,
}

impl Settings {
    /// Returns the model runner configuration. The chat model is the
    /// provider default.
    pub fn openai_config(&self) -> OpenAIConfig {
        OpenAIConfigBuilder::with_api_key(&self.model_runner_api_key)
            .with_base_url(&self.model_runner_base_url)
            .with_model(&self.chat_model)
            .build()
    }

    /// Returns the chat history policy.
    pub fn retention(&self) -> HistoryRetention {
        match self.history_turns {
            Some(turns) => HistoryRetention::LastTurns(turns),
            None => HistoryRetention::Unbounded,
        }
    }

    /// Loads the prompts, honoring the override files.
    pub fn prompts(&self) -> io::Result<Prompts> {
        Prompts::default().with_overrides(
            self.system_instructions_file.as_deref(),
            self.tools_instructions_file.as_deref(),
            self.tools_context_instructions_file.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 9] = [
        "toolchat",
        "--model-runner-base-url",
        "http://localhost:12434/engines/llama.cpp/v1",
        "--chat-model",
        "ai/qwen2.5",
        "--tools-model",
        "ai/qwen2.5:tools",
        "--mcp-host-url",
        "http://localhost:9011/mcp",
    ];

    #[test]
    fn test_parse() {
        let settings = Settings::try_parse_from(REQUIRED.iter().chain(&[
            "--chat-temperature",
            "0.7",
            "--history-turns",
            "4",
        ]))
        .unwrap();

        assert_eq!(settings.chat_model, "ai/qwen2.5");
        assert_eq!(settings.tools_model, "ai/qwen2.5:tools");
        assert_eq!(settings.chat_temperature, 0.7);
        assert_eq!(
            settings.retention(),
            HistoryRetention::LastTurns(NonZeroUsize::new(4).unwrap())
        );

        let config = settings.openai_config();
        assert_eq!(
            config.completions_url(),
            "http://localhost:12434/engines/llama.cpp/v1/chat/completions"
        );
    }

    #[test]
    fn test_reject_empty_values() {
        let mut args = REQUIRED;
        args[4] = "";
        assert!(Settings::try_parse_from(args).is_err());
    }

    #[test]
    fn test_reject_zero_history_turns() {
        let result = Settings::try_parse_from(
            REQUIRED.iter().chain(&["--history-turns", "0"]),
        );
        assert!(result.is_err());
    }
}
