use clap::ValueEnum;

/// OpenAI互換のChat Completions APIを提供するプロバイダ
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AiProvider {
    #[default]
    Groq,
    Openai,
}

impl AiProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            AiProvider::Groq => "https://api.groq.com/openai/v1",
            AiProvider::Openai => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            AiProvider::Groq => "llama-3.3-70b-versatile",
            AiProvider::Openai => "gpt-4o-mini",
        }
    }

    /// APIキーを読む環境変数名
    pub fn api_key_env(&self) -> &'static str {
        match self {
            AiProvider::Groq => "GROQ_API_KEY",
            AiProvider::Openai => "OPENAI_API_KEY",
        }
    }
}
