use clap::{ Parser, Subcommand };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (ollama, openai, anthropic, gemini, deepseek, xai, groq)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "ollama")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider (e.g., OpenAI, Anthropic)
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4-turbo, mistral)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- Embedding LLM Provider Args ---
    /// Type of LLM provider for text embedding (ollama, openai, ...)
    #[arg(long, env = "EMBEDDING_LLM_TYPE", default_value = "openai")]
    pub embedding_llm_type: String,

    /// Base URL for the Embedding LLM provider API
    #[arg(long, env = "EMBEDDING_BASE_URL")]
    pub embedding_base_url: Option<String>,

    /// API Key for the Embedding LLM provider
    #[arg(long, env = "EMBEDDING_API_KEY", default_value = "")]
    pub embedding_api_key: String,

    /// Model name for text embedding (e.g., text-embedding-3-small, nomic-embed-text)
    #[arg(long, env = "EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Expected embedding dimension. Defaults to the model's known dimension.
    #[arg(long, env = "EMBEDDING_DIMENSION")]
    pub embedding_dimension: Option<usize>,

    // --- Store Args ---
    /// Record store type (memory, redis)
    #[arg(long, env = "STORE_TYPE", default_value = "memory")]
    pub store_type: String,

    /// Store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "STORE_HOST", default_value = "redis://127.0.0.1:6379")]
    pub store_host: String,

    /// Prefix for Redis store keys.
    #[arg(long, env = "STORE_REDIS_PREFIX", default_value = "gateway:")]
    pub store_prefix: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Send a prompt and print the full reply
    Chat {
        prompt: String,

        /// System prompt sent ahead of the conversation
        #[arg(long)]
        system: Option<String>,

        #[arg(long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Continue a stored conversation; its history is replayed and extended
        #[arg(long)]
        conversation: Option<u64>,
    },

    /// Send a prompt and print the reply as it streams in
    Stream {
        prompt: String,

        #[arg(long)]
        system: Option<String>,
    },

    /// Ask for a JSON reply and pretty-print it
    Json {
        prompt: String,

        /// Shape of the expected reply (instructions or a JSON Schema)
        #[arg(long, default_value = "Respond with a JSON object.")]
        schema: String,
    },

    /// Embed each text and store it
    Embed {
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Embed the query and print the closest stored texts
    Search {
        query: String,

        #[arg(short = 'k', long, default_value_t = crate::store::DEFAULT_SEARCH_LIMIT, allow_hyphen_values = true)]
        limit: i64,
    },

    /// Cosine similarity between the embeddings of two texts
    Similarity {
        first: String,
        second: String,
    },

    /// Start a stored conversation
    NewConversation {
        #[arg(long)]
        title: Option<String>,

        /// Model name recorded with the conversation
        #[arg(long, default_value = crate::store::DEFAULT_CONVERSATION_MODEL)]
        model: String,
    },

    RenameConversation {
        id: u64,
        title: String,
    },

    /// List stored conversations
    Conversations,

    /// Print the messages of one conversation
    History {
        conversation: u64,
    },

    DeleteEmbedding {
        id: u64,
    },

    DeleteConversation {
        id: u64,
    },
}
