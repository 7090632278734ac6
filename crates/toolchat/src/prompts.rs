use std::fs;
use std::io;
use std::path::Path;

const SYSTEM_INSTRUCTIONS: &str = include_str!("./prompts/system_instructions.md");
const TOOLS_INSTRUCTIONS: &str = include_str!("./prompts/tools_instructions.md");
const TOOLS_CONTEXT_INSTRUCTIONS: &str =
    include_str!("./prompts/tools_context_instructions.md");

/// The instructions given to the agents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompts {
    /// System prompt of the chat agent, sent once at the start.
    pub system: String,
    /// System prompt of the tools agent, sent every turn.
    pub tool_selection: String,
    /// Sent to the chat agent after the tool output, every turn.
    pub tool_context: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            system: SYSTEM_INSTRUCTIONS.to_owned(),
            tool_selection: TOOLS_INSTRUCTIONS.to_owned(),
            tool_context: TOOLS_CONTEXT_INSTRUCTIONS.to_owned(),
        }
    }
}

impl Prompts {
    /// Replaces the prompts whose file is given with the file contents.
    pub fn with_overrides(
        mut self,
        system: Option<&Path>,
        tool_selection: Option<&Path>,
        tool_context: Option<&Path>,
    ) -> io::Result<Self> {
        for (path, prompt) in [
            (system, &mut self.system),
            (tool_selection, &mut self.tool_selection),
            (tool_context, &mut self.tool_context),
        ] {
            if let Some(path) = path {
                debug!("loading prompt from {}", path.display());
                *prompt = fs::read_to_string(path)?;
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::process;

    use super::*;

    #[test]
    fn test_builtin_prompts() {
        let prompts = Prompts::default();
        for prompt in [&prompts.system, &prompts.tool_selection, &prompts.tool_context] {
            assert!(!prompt.trim().is_empty());
        }
    }

    #[test]
    fn test_overrides() {
        let path = env::temp_dir()
            .join(format!("toolchat-prompt-{}.md", process::id()));
        fs::write(&path, "Only talk like a pirate.").unwrap();

        let prompts = Prompts::default()
            .with_overrides(Some(&path), None, None)
            .unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(prompts.system, "Only talk like a pirate.");
        assert_eq!(prompts.tool_selection, Prompts::default().tool_selection);

        let err = Prompts::default()
            .with_overrides(None, Some(&path), None)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
