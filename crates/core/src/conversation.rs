//! The conversation loop.
//!
//! Each user utterance goes through the same turn: a tools agent decides
//! which tools to call, the calls run one after another against the tool
//! host, and a chat agent streams the answer with the tool output in its
//! context.


use std::num::NonZeroUsize;

use tokio_util::sync::CancellationToken;
use toolchat_model::{ModelMessage, ToolCallRequest};
use tracing::Instrument;

use crate::agent::{Agent, BoxError, Error as AgentError, StreamError};
use crate::tool::{Error as ToolError, ToolHost};

/// Typing this ends the conversation.
pub const QUIT_COMMAND: &str = "/bye";

/// Messages the chat agent receives per turn.
const MESSAGES_PER_TURN: usize = 3;

/// Where the loop currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Waiting for the next line from the user.
    #[default]
    AwaitingInput,
    /// The tools agent is choosing tools.
    DetectingTools,
    /// Tool calls are running.
    ExecutingTools,
    /// The chat agent is streaming its answer.
    StreamingAnswer,
    /// The user has left, the loop is done.
    Exiting,
}

/// How much of the chat history is sent with each request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HistoryRetention {
    /// Every turn is kept.
    #[default]
    Unbounded,
    /// Only the most recent turns are kept, next to the messages the chat
    /// agent was created with.
    LastTurns(NonZeroUsize),
}

/// The instructions injected into every turn.
#[derive(Clone, Debug, Default)]
pub struct Instructions {
    /// System prompt of the tools agent.
    pub tool_selection: String,
    /// Sent to the chat agent after the tool output.
    pub tool_context: String,
}

/// Settings of a [`Conversation`].
#[derive(Clone, Debug, Default)]
pub struct ConversationConfig {
    /// Per-turn instructions.
    pub instructions: Instructions,
    /// Chat history policy.
    pub retention: HistoryRetention,
}

/// Progress reports sent to the front-end during a turn.
#[derive(Debug)]
pub enum TurnEvent<'a> {
    /// The tools agent has been asked for tool calls.
    DetectingTools,
    /// The tools agent requested no tools.
    NoToolCalls,
    /// Tool detection failed, the turn is aborted.
    DetectionFailed(&'a AgentError),
    /// The tools agent requested these calls.
    ToolsDetected(&'a [ToolCallRequest]),
    /// A tool call is about to run.
    ToolCallStarted(&'a ToolCallRequest),
    /// A tool call returned text.
    ToolSucceeded {
        /// The call.
        call: &'a ToolCallRequest,
        /// The text it returned.
        text: &'a str,
    },
    /// A tool call failed and has been skipped.
    ToolFailed {
        /// The call.
        call: &'a ToolCallRequest,
        /// Why it failed.
        error: &'a ToolError,
    },
    /// The chat agent starts answering.
    AnswerStarted,
    /// The answer is complete.
    AnswerFinished,
    /// The answer broke off.
    AnswerFailed(&'a StreamError),
    /// The user has left.
    Farewell,
}

/// The user-facing side of the loop.
pub trait Frontend {
    /// Reads the next line. `None` means no more input will come.
    fn read_input(&mut self) -> impl Future<Output = Option<String>>;

    /// Reports turn progress.
    fn on_event(&mut self, event: TurnEvent<'_>);

    /// Shows a chunk of the answer. Failing stops the answer.
    fn on_answer_chunk(&mut self, chunk: &str) -> Result<(), BoxError>;

    /// Returns the token that cancels the next answer.
    ///
    /// Called right before each answer starts streaming.
    fn interrupt_token(&mut self) -> CancellationToken {
        CancellationToken::new()
    }
}

/// A conversation between the user and a pair of agents sharing one tool
/// host.
pub struct Conversation<H> {
    tools_agent: Agent,
    chat_agent: Agent,
    tool_host: H,
    instructions: Instructions,
    retention: HistoryRetention,
    pinned_messages: usize,
    state: LoopState,
}

impl<H: ToolHost> Conversation<H> {
    /// Creates a conversation.
    ///
    /// The messages the chat agent already has are kept in every request,
    /// whatever the retention policy.
    pub fn new(
        tools_agent: Agent,
        chat_agent: Agent,
        tool_host: H,
        config: ConversationConfig,
    ) -> Self {
        let pinned_messages = chat_agent.messages().len();
        Self {
            tools_agent,
            chat_agent,
            tool_host,
            instructions: config.instructions,
            retention: config.retention,
            pinned_messages,
            state: LoopState::AwaitingInput,
        }
    }

    /// Returns the current state.
    #[inline]
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Returns the agent choosing tools.
    #[inline]
    pub fn tools_agent(&self) -> &Agent {
        &self.tools_agent
    }

    /// Returns the agent answering the user.
    #[inline]
    pub fn chat_agent(&self) -> &Agent {
        &self.chat_agent
    }

    /// Returns the tool host.
    #[inline]
    pub fn tool_host(&self) -> &H {
        &self.tool_host
    }

    /// Consumes the conversation, returning the tool host so that its
    /// session can be closed.
    #[inline]
    pub fn into_tool_host(self) -> H {
        self.tool_host
    }

    /// Runs turns until the user quits or the input ends.
    pub async fn run<F: Frontend>(&mut self, frontend: &mut F) {
        while self.state != LoopState::Exiting {
            let Some(input) = frontend.read_input().await else {
                debug!("input closed");
                frontend.on_event(TurnEvent::Farewell);
                self.set_state(LoopState::Exiting);
                break;
            };
            self.handle_input(&input, frontend).await;
        }
    }

    /// Runs one turn for the given line and returns the resulting state.
    ///
    /// Blank lines are ignored. Failures are reported to the front-end and
    /// never end the conversation.
    pub async fn handle_input<F: Frontend>(
        &mut self,
        input: &str,
        frontend: &mut F,
    ) -> LoopState {
        if self.state == LoopState::Exiting {
            return self.state;
        }
        let input = input.trim();
        if input.is_empty() {
            return self.state;
        }
        if input == QUIT_COMMAND {
            frontend.on_event(TurnEvent::Farewell);
            self.set_state(LoopState::Exiting);
            return self.state;
        }

        let span = debug_span!("turn");
        async {
            if let Some(tool_output) = self.run_tools(input, frontend).await {
                self.stream_answer(input, tool_output, frontend).await;
            }
        }
        .instrument(span)
        .await;

        self.set_state(LoopState::AwaitingInput);
        self.state
    }

    /// Detects and runs tools, returning their aggregated output, or `None`
    /// if the turn has to be aborted.
    async fn run_tools<F: Frontend>(
        &mut self,
        input: &str,
        frontend: &mut F,
    ) -> Option<String> {
        self.set_state(LoopState::DetectingTools);
        frontend.on_event(TurnEvent::DetectingTools);
        self.tools_agent.replace_messages([
            ModelMessage::System(self.instructions.tool_selection.clone()),
            ModelMessage::User(input.to_owned()),
        ]);
        let calls = match self.tools_agent.complete_for_tool_calls().await {
            Ok(calls) => calls,
            Err(AgentError::NoToolCalls) => {
                frontend.on_event(TurnEvent::NoToolCalls);
                return Some(String::new());
            }
            Err(err) => {
                error!("tool detection failed: {err}");
                frontend.on_event(TurnEvent::DetectionFailed(&err));
                return None;
            }
        };
        frontend.on_event(TurnEvent::ToolsDetected(&calls));

        self.set_state(LoopState::ExecutingTools);
        let mut output = String::new();
        for call in &calls {
            frontend.on_event(TurnEvent::ToolCallStarted(call));
            match self.invoke(call).await {
                Ok(text) => {
                    frontend.on_event(TurnEvent::ToolSucceeded {
                        call,
                        text: &text,
                    });
                    output.push_str(&text);
                    output.push('\n');
                }
                Err(error) => {
                    warn!("tool `{}` failed: {error}", call.name);
                    frontend.on_event(TurnEvent::ToolFailed {
                        call,
                        error: &error,
                    });
                }
            }
        }
        Some(output)
    }

    async fn invoke(&self, call: &ToolCallRequest) -> Result<String, ToolError> {
        let output = self
            .tool_host
            .invoke_tool(&call.name, &call.arguments)
            .instrument(debug_span!("tool call", name = %call.name, id = %call.id))
            .await?;
        if output.is_error {
            warn!("tool `{}` reported an error", call.name);
        }
        output.first_text().map(str::to_owned)
    }

    async fn stream_answer<F: Frontend>(
        &mut self,
        input: &str,
        tool_output: String,
        frontend: &mut F,
    ) {
        self.set_state(LoopState::StreamingAnswer);
        self.chat_agent.messages_mut().extend([
            ModelMessage::System(tool_output),
            ModelMessage::System(self.instructions.tool_context.clone()),
            ModelMessage::User(input.to_owned()),
        ]);
        self.apply_retention();

        frontend.on_event(TurnEvent::AnswerStarted);
        let cancel = frontend.interrupt_token();
        let result = self
            .chat_agent
            .complete_streaming(&cancel, |_, chunk| frontend.on_answer_chunk(chunk))
            .await;
        match result {
            Ok(answer) => {
                debug!("answer finished ({} bytes)", answer.len());
                frontend.on_event(TurnEvent::AnswerFinished);
            }
            Err(err) => {
                warn!("answer failed: {err}");
                frontend.on_event(TurnEvent::AnswerFailed(&err));
            }
        }
    }

    fn apply_retention(&mut self) {
        let HistoryRetention::LastTurns(turns) = self.retention else {
            return;
        };
        let keep = turns.get().saturating_mul(MESSAGES_PER_TURN);
        let pinned = self.pinned_messages;
        let messages = self.chat_agent.messages_mut();
        let history = messages.len().saturating_sub(pinned);
        if history > keep {
            let dropped = history - keep;
            messages.drain(pinned..pinned + dropped);
            debug!("dropped {dropped} messages from the chat history");
        }
    }

    #[inline]
    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            debug!("{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}
