use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::AzureOpenAi => "azure",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Local => "local",
        }
    }

    /// Accepts the config spellings; `None` for anything unknown.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "azure" | "azure_openai" | "azure-openai" => Some(LlmProvider::AzureOpenAi),
            "anthropic" | "claude" => Some(LlmProvider::Anthropic),
            "local" | "offline" => Some(LlmProvider::Local),
            _ => None,
        }
    }

    /// For Azure this is the deployment name.
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4o-mini",
            LlmProvider::AzureOpenAi => "gpt-4o",
            LlmProvider::Anthropic => "claude-3-5-sonnet-latest",
            LlmProvider::Local => "local",
        }
    }

    /// Environment variable holding the API key, if the provider needs one.
    pub(crate) fn key_var(&self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("OPENAI_API_KEY"),
            LlmProvider::AzureOpenAi => Some("AZURE_OPENAI_API_KEY"),
            LlmProvider::Anthropic => Some("ANTHROPIC_API_KEY"),
            LlmProvider::Local => None,
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
