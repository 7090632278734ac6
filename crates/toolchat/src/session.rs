use toolchat_core::conversation::{
    Conversation, ConversationConfig, HistoryRetention, Instructions,
};
use toolchat_core::tool::ToolHost;
use toolchat_core::{Agent, AgentConfig, ModelClient};
use toolchat_model::{ModelMessage, ModelProvider};

use crate::Prompts;

/// A chat session: the two agents and the tool host, ready to take turns.
pub type Session<H> = Conversation<H>;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder<H> {
    model_client: ModelClient,
    tool_host: H,
    chat: AgentConfig,
    tools: AgentConfig,
    prompts: Prompts,
    retention: HistoryRetention,
}

impl<H: ToolHost> SessionBuilder<H> {
    /// Creates a session builder with a specified model provider, shared by
    /// both agents, and the host whose tools they use.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
        tool_host: H,
    ) -> Self {
        let mut chat = AgentConfig::new("Chat Agent");
        chat.temperature = Some(0.5);
        let mut tools = AgentConfig::new("Tools Agent");
        tools.temperature = Some(0.0);
        tools.parallel_tool_calls = Some(false);
        Self {
            model_client: ModelClient::new(provider),
            tool_host,
            chat,
            tools,
            prompts: Prompts::default(),
            retention: HistoryRetention::default(),
        }
    }

    /// Sets the model answering the user.
    #[inline]
    pub fn with_chat_model<S: Into<String>>(mut self, model: S) -> Self {
        self.chat.model = Some(model.into());
        self
    }

    /// Sets the model choosing the tools.
    #[inline]
    pub fn with_tools_model<S: Into<String>>(mut self, model: S) -> Self {
        self.tools.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature of the chat model.
    #[inline]
    pub fn with_chat_temperature(mut self, temperature: f32) -> Self {
        self.chat.temperature = Some(temperature);
        self
    }

    /// Sets the sampling temperature of the tools model.
    #[inline]
    pub fn with_tools_temperature(mut self, temperature: f32) -> Self {
        self.tools.temperature = Some(temperature);
        self
    }

    /// Sets the instructions.
    #[inline]
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Sets the chat history policy.
    #[inline]
    pub fn with_retention(mut self, retention: HistoryRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Builds a new session.
    ///
    /// The tools agent is offered the tool host's current catalog.
    pub fn build(self) -> Session<H> {
        let Self {
            model_client,
            tool_host,
            mut chat,
            mut tools,
            prompts,
            retention,
        } = self;

        tools.tools = tool_host.tool_definitions();
        debug!("offering {} tools to the tools agent", tools.tools.len());
        chat.messages = vec![ModelMessage::System(prompts.system)];

        Conversation::new(
            Agent::new(model_client.clone(), tools),
            Agent::new(model_client, chat),
            tool_host,
            ConversationConfig {
                instructions: Instructions {
                    tool_selection: prompts.tool_selection,
                    tool_context: prompts.tool_context,
                },
                retention,
            },
        )
    }
}
